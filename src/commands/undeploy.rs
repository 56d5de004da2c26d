//! Undeploy everything the component pushed, without waiting

use anyhow::Result;
use std::path::Path;

use super::common::ComponentContext;

pub async fn cmd_undeploy(context: &Path) -> Result<()> {
    let ctx = ComponentContext::load(context).await?;
    let adapter = ctx.adapter()?;
    adapter.undeploy().await
}
