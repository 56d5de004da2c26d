//! Shared command-context assembly
//!
//! Every subcommand needs the same ingredients: the parsed devfile, the
//! component's environment info, and an adapter bound to the platform
//! context. This module builds them once per invocation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::adapter::{new_component_adapter, ComponentAdapter};
use crate::devfile::{self, Devfile};
use crate::envinfo::EnvSpecificInfo;
use crate::paths;
use crate::platform::{ComponentIdentity, PlatformContext};

pub struct ComponentContext {
    pub context: PathBuf,
    pub devfile_path: PathBuf,
    pub devfile: Devfile,
    pub env: EnvSpecificInfo,
}

impl ComponentContext {
    /// Load devfile and environment info for a component working directory
    pub async fn load(context: &Path) -> Result<Self> {
        let devfile_path = paths::devfile_location(context);
        let devfile = devfile::parse_and_validate(&devfile_path).await?;
        let env = EnvSpecificInfo::load(context).await?;
        Ok(Self {
            context: context.to_path_buf(),
            devfile_path,
            devfile,
            env,
        })
    }

    pub fn platform_context(&self) -> PlatformContext {
        PlatformContext {
            namespace: self.env.namespace().to_string(),
        }
    }

    pub fn identity(&self) -> ComponentIdentity {
        ComponentIdentity {
            name: self.env.name().to_string(),
            application: self.env.application().to_string(),
            namespace: self.env.namespace().to_string(),
        }
    }

    pub fn adapter(&self) -> Result<Box<dyn ComponentAdapter>> {
        new_component_adapter(
            self.env.name(),
            &self.context,
            self.env.application(),
            self.devfile.clone(),
            &self.platform_context(),
        )
        .with_context(|| {
            format!(
                "constructing platform adapter for component {:?}",
                self.env.name()
            )
        })
    }
}
