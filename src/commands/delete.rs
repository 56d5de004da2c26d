//! Delete the component workload

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::cli::args::DeleteArgs;

use super::common::ComponentContext;

pub async fn cmd_delete(args: DeleteArgs, context: &Path) -> Result<()> {
    let ctx = ComponentContext::load(context).await?;
    let identity = ctx.identity();
    let adapter = ctx.adapter()?;
    adapter
        .delete(identity.labels(), args.show_log, args.wait)
        .await?;
    info!(component = %identity, "component deleted");
    Ok(())
}
