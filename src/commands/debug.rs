//! Debug port forwarding command

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cli::args::PortForwardArgs;
use crate::debug::PortForwarder;
use crate::platform::KubectlClient;

use super::common::ComponentContext;

pub async fn cmd_debug_port_forward(args: PortForwardArgs, context: &Path) -> Result<()> {
    let ctx = ComponentContext::load(context).await?;
    let identity = ctx.identity();

    // The local port defaults to the remote debug port; only an explicitly
    // requested port is allowed to fail when busy.
    let remote_port = ctx.env.debug_port();
    let requested_local = args.local_port.unwrap_or(remote_port);
    let port_explicit = args.local_port.is_some();

    let client = Arc::new(KubectlClient::new()?);
    let forwarder = PortForwarder::new(identity.clone(), client, ctx.devfile_path.clone());

    let mut session = forwarder.complete(requested_local, port_explicit, remote_port)?;
    info!(
        component = %identity,
        ports = %session.ports,
        "starting debug port forwarding, press Ctrl+C to stop"
    );

    if let Some(ready) = session.take_ready_receiver() {
        let ports = session.ports;
        tokio::spawn(async move {
            if ready.await.is_ok() {
                info!(ports = %ports, "debug session ready, attach your debugger to the local port");
            }
        });
    }

    forwarder.run(session).await
}
