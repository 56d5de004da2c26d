//! Component adapter
//!
//! The polymorphic entry point for lifecycle operations. An adapter is
//! constructed from a component identity, local source path, parsed devfile
//! and a platform context; the backend is selected by the context type at
//! construction time.

pub mod kubernetes;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::devfile::{Devfile, DevfileCommand};
use crate::platform::{
    ComponentIdentity, KubectlClient, LogStream, PlatformContext,
};

pub use kubernetes::KubernetesAdapter;

/// Parameters for one push invocation. Built fresh per push, never persisted.
#[derive(Debug, Clone, Default)]
pub struct PushParameters {
    pub path: PathBuf,
    pub ignored_files: Vec<String>,
    pub force_build: bool,
    pub show: bool,
    /// Explicit command names, already lower-cased; empty selects defaults
    pub devfile_build_cmd: String,
    pub devfile_run_cmd: String,
    pub devfile_debug_cmd: String,
    pub debug: bool,
    pub debug_port: u16,
    /// Environment snapshot exported into every executed command
    pub env: Vec<(String, String)>,
    /// Completion time of the previous successful sync, if any
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
}

/// Lifecycle operations over one component on one platform backend
#[async_trait]
pub trait ComponentAdapter: Send + Sync {
    /// Reconcile local source and command state with the remote workload
    async fn push(&self, params: &PushParameters) -> Result<()>;

    /// Attach to the remote process stream associated with `command`
    async fn log(&self, follow: bool, command: &DevfileCommand) -> Result<LogStream>;

    /// Run an arbitrary command in the component's primary container
    async fn exec(&self, command: &[String]) -> Result<()>;

    /// Look up and execute the named test command
    async fn test(&self, test_cmd: &str, show_log: bool) -> Result<()>;

    /// Remove the remote workload and associated resources matching `labels`
    async fn delete(
        &self,
        labels: BTreeMap<String, String>,
        show_log: bool,
        wait: bool,
    ) -> Result<()>;

    /// Remove everything this component deployed, fire-and-forget
    async fn undeploy(&self) -> Result<()>;
}

/// Construct the adapter matching the platform context.
///
/// Fails fast when the context cannot be matched to a supported backend.
pub fn new_component_adapter(
    component_name: &str,
    source_path: &Path,
    application: &str,
    devfile: Devfile,
    context: &PlatformContext,
) -> Result<Box<dyn ComponentAdapter>> {
    let identity = ComponentIdentity {
        name: component_name.to_string(),
        application: application.to_string(),
        namespace: context.namespace.clone(),
    };
    let client = Arc::new(KubectlClient::new()?);
    Ok(Box::new(KubernetesAdapter::new(
        identity,
        source_path.to_path_buf(),
        devfile,
        client,
    )))
}
