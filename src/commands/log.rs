//! Fetch or follow component logs

use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::args::LogArgs;
use crate::devfile::command::{resolve_command, resolve_debug_command};
use crate::devfile::CommandKind;
use crate::util;

use super::common::ComponentContext;

pub async fn cmd_log(args: LogArgs, context: &Path) -> Result<()> {
    let ctx = ComponentContext::load(context).await?;

    // Resolution happens before any platform call: a missing debug command
    // fails here, without contacting the cluster.
    let command = if args.debug {
        match resolve_debug_command(&ctx.devfile, "")? {
            Some(cmd) => cmd,
            None => bail!(
                "no debug command found in devfile, please run \"devctl log\" for run command logs"
            ),
        }
    } else {
        resolve_command(&ctx.devfile, "", CommandKind::Run)?
    };

    let adapter = ctx.adapter()?;
    let rd = adapter.log(args.follow, &command).await?;

    let mut stdout = tokio::io::stdout();
    util::display_log(args.follow, rd, &mut stdout, -1).await
}
