//! Push a component: ensure the workload, sync source, run commands

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::path::Path;
use tracing::info;

use crate::adapter::PushParameters;
use crate::cli::args::PushArgs;
use crate::envinfo::RunMode;
use crate::machineoutput::MachineEventClient;

use super::common::ComponentContext;

pub async fn cmd_push(args: PushArgs, context: &Path, machine: bool) -> Result<()> {
    // In machine mode a push failure becomes a structured event plus a
    // non-zero exit, bypassing the generic error path which would corrupt
    // the JSON stream.
    let result = push_inner(&args, context).await;

    if let Err(err) = result {
        if machine {
            MachineEventClient::new().report_error(&err, Utc::now());
            std::process::exit(1);
        }
        return Err(err);
    }

    if machine {
        MachineEventClient::new().report_success("changes pushed to component", Utc::now());
    }
    Ok(())
}

async fn push_inner(args: &PushArgs, context: &Path) -> Result<()> {
    let mut ctx = ComponentContext::load(context).await?;
    let component_name = ctx.env.name().to_string();
    let adapter = ctx.adapter()?;

    let debug_port = ctx.env.debug_port();
    let mut env = Vec::new();
    if args.debug {
        env.push(("DEBUG_PORT".to_string(), debug_port.to_string()));
    }

    let params = PushParameters {
        path: ctx.context.clone(),
        ignored_files: args.ignore.clone(),
        force_build: args.force_build,
        show: args.show_log,
        devfile_build_cmd: lower(&args.build_command),
        devfile_run_cmd: lower(&args.run_command),
        devfile_debug_cmd: lower(&args.debug_command),
        debug: args.debug,
        debug_port,
        env,
        last_sync: ctx.env.last_sync(),
    };

    let sync_started = Utc::now();
    adapter
        .push(&params)
        .await
        .map_err(|e| anyhow!("failed to push component {:?}: {:#}", component_name, e))?;

    // Push succeeded: record what is now active remotely
    ctx.env.set_last_sync(sync_started).await?;
    let run_mode = if args.debug {
        RunMode::Debug
    } else {
        RunMode::Run
    };
    ctx.env.set_run_mode(run_mode).await?;

    info!(component = %component_name, "changes successfully pushed to component");
    Ok(())
}

fn lower(name: &Option<String>) -> String {
    name.as_deref().unwrap_or("").to_lowercase()
}
