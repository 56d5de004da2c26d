//! Shared test fixtures: an in-memory platform client and devfile builders

// Each integration test binary compiles its own copy of this module and
// uses a different subset of it.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{oneshot, watch};

use devctl::devfile::Devfile;
use devctl::platform::{
    ComponentIdentity, LogStream, PlatformClient, PortPair, WorkloadSpec,
};

pub const RUN_MARKER: &str = "DEVCTL_COMMAND_RUN";

pub const DEVFILE_WITH_RUN: &str = r#"
schemaVersion: 2.0.0
metadata:
  name: nodejs-app
components:
  - name: runtime
    container:
      image: registry.example.com/nodejs:16
      mountSources: true
commands:
  - id: install
    exec:
      commandLine: npm install
      component: runtime
      workingDir: /projects
      group:
        kind: build
        isDefault: true
  - id: devrun
    exec:
      commandLine: npm start
      component: runtime
      workingDir: /projects
      group:
        kind: run
        isDefault: true
"#;

pub const DEVFILE_WITH_DEBUG: &str = r#"
schemaVersion: 2.0.0
metadata:
  name: nodejs-app
components:
  - name: runtime
    container:
      image: registry.example.com/nodejs:16
commands:
  - id: devrun
    exec:
      commandLine: npm start
      component: runtime
      group:
        kind: run
        isDefault: true
  - id: debugrun
    exec:
      commandLine: npm run debug
      component: runtime
      group:
        kind: debug
        isDefault: true
"#;

pub fn devfile(yaml: &str) -> Devfile {
    serde_yaml::from_str(yaml).expect("test devfile parses")
}

pub fn identity(name: &str) -> ComponentIdentity {
    ComponentIdentity {
        name: name.to_string(),
        application: "app".to_string(),
        namespace: "test-ns".to_string(),
    }
}

/// Recorded platform interactions, one entry per client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    WorkloadExists,
    CreateWorkload,
    DeleteWorkload { wait: bool },
    Exec { container: String, script: String },
    LogStream { container: String, follow: bool },
    CopyFiles { files: Vec<PathBuf> },
    PortForward { ports: PortPair },
}

/// In-memory platform client: records calls, simulates workload existence,
/// and serves canned log output.
#[derive(Default)]
pub struct MockPlatform {
    pub calls: Mutex<Vec<Call>>,
    workload_exists: AtomicBool,
    pub log_output: Mutex<Vec<u8>>,
    /// When set, exec calls fail with this message
    pub fail_exec: Mutex<Option<String>>,
    /// When set, port_forward fails immediately after signalling readiness
    pub fail_forward: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_output(output: &str) -> Self {
        let mock = Self::default();
        *mock.log_output.lock().unwrap() = output.as_bytes().to_vec();
        mock
    }

    pub fn set_workload_exists(&self, exists: bool) {
        self.workload_exists.store(exists, Ordering::SeqCst);
    }

    pub fn set_fail_forward(&self) {
        self.fail_forward.store(true, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn current_namespace(&self) -> Result<String> {
        Ok("test-ns".to_string())
    }

    async fn workload_exists(&self, _identity: &ComponentIdentity) -> Result<bool> {
        self.record(Call::WorkloadExists);
        Ok(self.workload_exists.load(Ordering::SeqCst))
    }

    async fn create_workload(
        &self,
        _identity: &ComponentIdentity,
        _spec: &WorkloadSpec,
    ) -> Result<()> {
        self.record(Call::CreateWorkload);
        self.workload_exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_workload(
        &self,
        _namespace: &str,
        _labels: &BTreeMap<String, String>,
        wait: bool,
    ) -> Result<()> {
        self.record(Call::DeleteWorkload { wait });
        self.workload_exists.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn exec(
        &self,
        _identity: &ComponentIdentity,
        container: &str,
        command: &[String],
        _show: bool,
    ) -> Result<()> {
        self.record(Call::Exec {
            container: container.to_string(),
            script: command.last().cloned().unwrap_or_default(),
        });
        if let Some(msg) = self.fail_exec.lock().unwrap().clone() {
            bail!("{}", msg);
        }
        Ok(())
    }

    async fn log_stream(
        &self,
        _identity: &ComponentIdentity,
        container: &str,
        follow: bool,
    ) -> Result<LogStream> {
        self.record(Call::LogStream {
            container: container.to_string(),
            follow,
        });
        let output = self.log_output.lock().unwrap().clone();
        Ok(Box::new(std::io::Cursor::new(output)))
    }

    async fn copy_files(
        &self,
        _identity: &ComponentIdentity,
        _container: &str,
        _source_base: &Path,
        files: &[PathBuf],
        _dest: &Path,
    ) -> Result<()> {
        self.record(Call::CopyFiles {
            files: files.to_vec(),
        });
        Ok(())
    }

    async fn port_forward(
        &self,
        _identity: &ComponentIdentity,
        ports: PortPair,
        mut stop: watch::Receiver<bool>,
        ready: oneshot::Sender<()>,
    ) -> Result<()> {
        self.record(Call::PortForward { ports });
        let _ = ready.send(());

        if self.fail_forward.load(Ordering::SeqCst) {
            bail!("tunnel dropped");
        }

        // Block until the stop channel observes true or its sender is gone
        loop {
            if *stop.borrow() {
                return Ok(());
            }
            if stop.changed().await.is_err() {
                return Ok(());
            }
        }
    }
}
