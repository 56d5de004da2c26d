//! Debug port forwarding
//!
//! Owns the local<->remote tunnel used to attach a debugger: local port
//! selection (probe the requested port, fall back to an OS-assigned one for
//! defaults), the persisted session record other tooling uses to discover
//! the active tunnel, and the signal-driven forwarding loop.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use crate::paths;
use crate::platform::{ComponentIdentity, PlatformClient, PortPair};
use crate::util;

/// Reconnect attempts after the tunnel drops while the devfile still exists
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Durable record of an active debug port-forward session.
///
/// Created when forwarding starts and removed on every exit path, so a later
/// `log -f` or external tooling can discover the session without re-deriving
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugSessionRecord {
    pub name: String,
    pub application: String,
    pub namespace: String,
    pub ports: PortPair,
}

/// Path of the debug session record for a component
pub fn debug_record_path(identity: &ComponentIdentity) -> PathBuf {
    paths::debug_dir().join(format!(
        "{}-{}-{}-debug.json",
        identity.name, identity.application, identity.namespace
    ))
}

pub async fn create_debug_record(identity: &ComponentIdentity, ports: PortPair) -> Result<()> {
    let record = DebugSessionRecord {
        name: identity.name.clone(),
        application: identity.application.clone(),
        namespace: identity.namespace.clone(),
        ports,
    };
    fs::create_dir_all(paths::debug_dir())
        .await
        .context("creating debug record directory")?;
    let raw = serde_json::to_string_pretty(&record).context("serializing debug session record")?;
    fs::write(debug_record_path(identity), raw)
        .await
        .context("writing debug session record")?;
    Ok(())
}

pub async fn read_debug_record(identity: &ComponentIdentity) -> Result<DebugSessionRecord> {
    let path = debug_record_path(identity);
    let raw = fs::read_to_string(&path)
        .await
        .with_context(|| format!("no active debug session record at {}", path.display()))?;
    serde_json::from_str(&raw).context("parsing debug session record")
}

/// Remove the record, tolerating its absence
pub async fn remove_debug_record(identity: &ComponentIdentity) {
    let path = debug_record_path(identity);
    if let Err(e) = fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove debug session record");
        }
    }
}

/// Handle for cooperative cancellation of a forwarding session
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// A prepared forwarding session: ports selected, channels wired
#[derive(Debug)]
pub struct ForwardSession {
    pub ports: PortPair,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    ready_tx: Option<oneshot::Sender<()>>,
    ready_rx: Option<oneshot::Receiver<()>>,
}

impl ForwardSession {
    /// Cancellation handle usable from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// One-shot readiness notification, observable by a second task (for
    /// example a debugger launcher waiting for the tunnel). Can be taken
    /// once.
    pub fn take_ready_receiver(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ready_rx.take()
    }
}

/// Drives a local<->remote debug tunnel for one component
pub struct PortForwarder {
    identity: ComponentIdentity,
    client: Arc<dyn PlatformClient>,
    /// Descriptor location checked as a reconnect heuristic
    devfile_path: PathBuf,
}

impl PortForwarder {
    pub fn new(
        identity: ComponentIdentity,
        client: Arc<dyn PlatformClient>,
        devfile_path: PathBuf,
    ) -> Self {
        Self {
            identity,
            client,
            devfile_path,
        }
    }

    /// Select the local port and wire the session channels.
    ///
    /// Probes the requested local port by binding a listener and releasing
    /// it. A busy port fails the operation when the user picked it
    /// explicitly; for a default port a diagnostic is emitted and an
    /// OS-assigned free port is used instead. The probe is best-effort:
    /// nothing prevents another process from grabbing the port before the
    /// tunnel starts.
    pub fn complete(
        &self,
        requested_local_port: u16,
        port_explicit: bool,
        remote_port: u16,
    ) -> Result<ForwardSession> {
        let local_port = match util::probe_local_port(requested_local_port) {
            Ok(()) => requested_local_port,
            Err(e) if port_explicit => {
                return Err(e).with_context(|| {
                    format!("the local debug port {} is not free", requested_local_port)
                });
            }
            Err(e) => {
                error!(
                    port = requested_local_port,
                    cause = %e,
                    "the local debug port is not free"
                );
                let port = util::get_free_port()?;
                info!(port, "local port auto selected");
                port
            }
        };

        let ports = PortPair {
            local: local_port,
            remote: remote_port,
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();

        Ok(ForwardSession {
            ports,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            ready_tx: Some(ready_tx),
            ready_rx: Some(ready_rx),
        })
    }

    /// Run the tunnel until the remote side closes, a termination signal
    /// arrives, or the session's stop handle fires.
    ///
    /// The session record is removed on every exit path. Signal-driven
    /// termination is a clean, non-error exit. When the tunnel drops without
    /// a stop request and the devfile still exists on disk, reconnection is
    /// attempted a bounded number of times.
    pub async fn run(&self, mut session: ForwardSession) -> Result<()> {
        // Guard covers every exit path, including errors propagated with ?
        let _signal_task = AbortOnDrop(spawn_signal_listener(session.stop_handle())?);

        let mut ready_tx = session.ready_tx.take();
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            create_debug_record(&self.identity, session.ports).await?;

            // Readiness can only fire once; reconnect attempts get a
            // detached sender.
            let ready = ready_tx
                .take()
                .unwrap_or_else(|| oneshot::channel().0);

            let result = self
                .client
                .port_forward(
                    &self.identity,
                    session.ports,
                    session.stop_rx.clone(),
                    ready,
                )
                .await;

            // Deferred cleanup: the record never outlives the tunnel
            remove_debug_record(&self.identity).await;

            if *session.stop_rx.borrow() {
                info!(component = %self.identity, "port forwarding stopped");
                return Ok(());
            }

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if self.devfile_path.exists() && attempt < MAX_RECONNECT_ATTEMPTS {
                        warn!(
                            component = %self.identity,
                            attempt,
                            error = %e,
                            "port forwarding dropped, reconnecting"
                        );
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("port forwarding to {} failed", self.identity)))
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Funnel OS termination signals (interrupt, terminate, hangup, quit) into
/// the session's stop handle. Cancellation is cooperative: in-flight remote
/// I/O is not force-killed, readers observe the stop with bounded delay.
fn spawn_signal_listener(stop: StopHandle) -> Result<tokio::task::JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut sigquit = signal(SignalKind::quit()).context("installing SIGQUIT handler")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, stopping port forward"),
            _ = sigterm.recv() => info!("received SIGTERM, stopping port forward"),
            _ = sighup.recv() => info!("received SIGHUP, stopping port forward"),
            _ = sigquit.recv() => info!("received SIGQUIT, stopping port forward"),
        }
        stop.stop();
    }))
}
