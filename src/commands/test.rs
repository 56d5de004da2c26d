//! Run a devfile test command

use anyhow::Result;
use std::path::Path;

use crate::cli::args::TestArgs;

use super::common::ComponentContext;

pub async fn cmd_test(args: TestArgs, context: &Path) -> Result<()> {
    let ctx = ComponentContext::load(context).await?;
    let adapter = ctx.adapter()?;
    let name = args.test_command.as_deref().unwrap_or("").to_lowercase();
    adapter.test(&name, args.show_log).await
}
