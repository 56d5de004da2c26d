//! Execute an arbitrary command in the component's primary container

use anyhow::Result;
use std::path::Path;

use crate::cli::args::ExecArgs;

use super::common::ComponentContext;

pub async fn cmd_exec(args: ExecArgs, context: &Path) -> Result<()> {
    let ctx = ComponentContext::load(context).await?;
    let adapter = ctx.adapter()?;
    adapter.exec(&args.command).await
}
