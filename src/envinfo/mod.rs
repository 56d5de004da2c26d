//! Environment-specific component info
//!
//! A small YAML record persisted in the component working directory under
//! `.devctl/env.yaml`. It carries the identity the component was created
//! with (name, application, namespace), the debug port, the run mode active
//! remotely after the last successful push, exposed URLs, and sync
//! bookkeeping.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::paths;

/// Default port the remote workload listens on for a debugger
pub const DEFAULT_DEBUG_PORT: u16 = 5858;

/// Which command set is currently active on the remote workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Run,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvInfoUrl {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvInfo {
    pub name: String,
    pub application: String,
    pub namespace: String,
    #[serde(default)]
    pub debug_port: Option<u16>,
    #[serde(default)]
    pub run_mode: Option<RunMode>,
    #[serde(default)]
    pub urls: Vec<EnvInfoUrl>,
    /// Completion time of the last successful source sync
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Handle over the persisted env info of one component working directory
#[derive(Debug, Clone)]
pub struct EnvSpecificInfo {
    context: PathBuf,
    info: EnvInfo,
}

impl EnvSpecificInfo {
    /// Load the record for a component working directory
    pub async fn load(context: &Path) -> Result<Self> {
        let file = paths::env_file(context);
        let raw = fs::read_to_string(&file).await.with_context(|| {
            format!(
                "reading component environment info at {} (did you create the component here?)",
                file.display()
            )
        })?;
        let info: EnvInfo =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
        Ok(Self {
            context: context.to_path_buf(),
            info,
        })
    }

    /// Create a fresh record (used by component-creation glue and tests)
    pub fn create(context: &Path, name: &str, application: &str, namespace: &str) -> Self {
        Self {
            context: context.to_path_buf(),
            info: EnvInfo {
                name: name.to_string(),
                application: application.to_string(),
                namespace: namespace.to_string(),
                debug_port: None,
                run_mode: None,
                urls: Vec::new(),
                last_sync: None,
            },
        }
    }

    pub async fn save(&self) -> Result<()> {
        let dir = paths::component_dir(&self.context);
        fs::create_dir_all(&dir)
            .await
            .context("creating component config directory")?;
        let raw = serde_yaml::to_string(&self.info).context("serializing environment info")?;
        fs::write(paths::env_file(&self.context), raw)
            .await
            .context("writing environment info")?;
        Ok(())
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn application(&self) -> &str {
        &self.info.application
    }

    pub fn namespace(&self) -> &str {
        &self.info.namespace
    }

    pub fn debug_port(&self) -> u16 {
        self.info.debug_port.unwrap_or(DEFAULT_DEBUG_PORT)
    }

    pub fn set_debug_port(&mut self, port: u16) {
        self.info.debug_port = Some(port);
    }

    pub fn run_mode(&self) -> Option<RunMode> {
        self.info.run_mode
    }

    /// Persist the run mode active remotely. Called only after a push
    /// completed successfully.
    pub async fn set_run_mode(&mut self, mode: RunMode) -> Result<()> {
        self.info.run_mode = Some(mode);
        self.save().await
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.info.last_sync
    }

    pub async fn set_last_sync(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.info.last_sync = Some(at);
        self.save().await
    }

    pub fn urls(&self) -> &[EnvInfoUrl] {
        &self.info.urls
    }
}
