//! Platform abstraction
//!
//! The component adapter drives lifecycle operations through the
//! [`PlatformClient`] capability set. The shipped backend talks to a
//! Kubernetes cluster via kubectl; tests substitute an in-memory client.

pub mod kubectl;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;
use tokio::sync::{oneshot, watch};

pub use kubectl::KubectlClient;

/// Addressing information needed to reach the remote platform. Pure data.
#[derive(Debug, Clone)]
pub struct PlatformContext {
    pub namespace: String,
}

/// Identity of a component on the platform. Immutable once derived for a
/// given invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub name: String,
    pub application: String,
    pub namespace: String,
}

impl ComponentIdentity {
    /// Label set attached to every resource owned by this component
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "app.kubernetes.io/instance".to_string(),
                self.name.clone(),
            ),
            (
                "app.kubernetes.io/part-of".to_string(),
                self.application.clone(),
            ),
        ])
    }

    /// Name of the workload backing this component
    pub fn workload_name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Local and remote port bound together for a debug tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PortPair {
    pub local: u16,
    pub remote: u16,
}

impl std::fmt::Display for PortPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

/// Readable remote stream (logs)
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// Desired shape of the workload backing a component
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    /// Where synchronized sources land inside the container
    pub source_path: String,
    pub ports: Vec<u16>,
}

/// Capability set the orchestrator consumes from the remote platform.
///
/// One method per primitive: workload CRUD, in-container exec, log stream
/// attach, file transfer, and the port-forward transport. Implementations
/// must not retry on their own; retry policy belongs to the callers.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Namespace the platform considers current for this invocation
    async fn current_namespace(&self) -> Result<String>;

    async fn workload_exists(&self, identity: &ComponentIdentity) -> Result<bool>;

    /// Create the workload and block until it is observably running
    async fn create_workload(
        &self,
        identity: &ComponentIdentity,
        spec: &WorkloadSpec,
    ) -> Result<()>;

    /// Delete everything matching `labels`; `wait` blocks until deletion is
    /// observably complete, otherwise fire-and-forget.
    async fn delete_workload(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        wait: bool,
    ) -> Result<()>;

    /// Run a command inside a container, propagating a non-zero remote exit
    /// status as an error. `show` relays remote output to this process's
    /// stdout/stderr.
    async fn exec(
        &self,
        identity: &ComponentIdentity,
        container: &str,
        command: &[String],
        show: bool,
    ) -> Result<()>;

    async fn log_stream(
        &self,
        identity: &ComponentIdentity,
        container: &str,
        follow: bool,
    ) -> Result<LogStream>;

    /// Copy local files (paths relative to `source_base`) into the container
    async fn copy_files(
        &self,
        identity: &ComponentIdentity,
        container: &str,
        source_base: &Path,
        files: &[PathBuf],
        dest: &Path,
    ) -> Result<()>;

    /// Forward `ports.local` to `ports.remote` until the remote side closes
    /// or `stop` observes true. `ready` is dropped or fired exactly once,
    /// when the tunnel is accepting connections.
    async fn port_forward(
        &self,
        identity: &ComponentIdentity,
        ports: PortPair,
        stop: watch::Receiver<bool>,
        ready: oneshot::Sender<()>,
    ) -> Result<()>;
}
