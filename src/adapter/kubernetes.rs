//! Kubernetes component adapter and push pipeline

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::devfile::command::{resolve_command, resolve_debug_command, resolve_optional_command};
use crate::devfile::{CommandKind, Devfile, DevfileCommand};
use crate::paths;
use crate::platform::{
    ComponentIdentity, ContainerSpec, LogStream, PlatformClient, WorkloadSpec,
};
use crate::sync::{collect_files, IgnoreMatcher};

use super::{ComponentAdapter, PushParameters};

/// Pid file tracking the lifecycle command instance inside the container
const RUN_PID_FILE: &str = "/tmp/devctl-run.pid";

/// Default source mount point when the container does not specify one
const DEFAULT_SOURCE_PATH: &str = "/projects";

pub struct KubernetesAdapter {
    identity: ComponentIdentity,
    source: PathBuf,
    devfile: Devfile,
    client: Arc<dyn PlatformClient>,
}

impl KubernetesAdapter {
    pub fn new(
        identity: ComponentIdentity,
        source: PathBuf,
        devfile: Devfile,
        client: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            identity,
            source,
            devfile,
            client,
        }
    }

    fn workload_spec(&self) -> Result<WorkloadSpec> {
        let containers: Vec<ContainerSpec> = self
            .devfile
            .containers()
            .map(|(name, container)| ContainerSpec {
                name: name.to_string(),
                image: container.image.clone(),
                env: container
                    .env
                    .iter()
                    .map(|e| (e.name.clone(), e.value.clone()))
                    .collect(),
                source_path: container
                    .source_mapping
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
                ports: container.endpoints.iter().map(|e| e.target_port).collect(),
            })
            .collect();

        if containers.is_empty() {
            bail!(
                "devfile for component {:?} defines no container components",
                self.identity.name
            );
        }
        Ok(WorkloadSpec { containers })
    }

    /// Container the component's run command executes in; this is the
    /// primary container for exec and sync.
    fn primary_container(&self) -> Result<String> {
        if let Ok(run) = resolve_command(&self.devfile, "", CommandKind::Run) {
            return Ok(run.exec.component);
        }
        self.devfile
            .containers()
            .next()
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "devfile for component {:?} defines no container components",
                    self.identity.name
                )
            })
    }

    fn source_path_for(&self, container: &str) -> String {
        self.devfile
            .container(container)
            .and_then(|c| c.source_mapping.clone())
            .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string())
    }

    /// Wrap a devfile command into a shell invocation with working dir and
    /// environment applied.
    fn shell_command(cmd: &DevfileCommand, extra_env: &[(String, String)]) -> Vec<String> {
        let mut script = String::new();
        for (name, value) in extra_env {
            script.push_str(&format!("export {}={} && ", name, shell_quote(value)));
        }
        for env in &cmd.exec.env {
            script.push_str(&format!("export {}={} && ", env.name, shell_quote(&env.value)));
        }
        if let Some(dir) = &cmd.exec.working_dir {
            script.push_str(&format!("cd {} && ", shell_quote(dir)));
        }
        script.push_str(&cmd.exec.command_line);
        vec!["/bin/sh".to_string(), "-c".to_string(), script]
    }

    /// Start a run/debug command detached, its output tied to the container
    /// log stream, its pid recorded for the next push to stop.
    fn detached_command(cmd: &DevfileCommand, extra_env: &[(String, String)]) -> Vec<String> {
        let wrapped = Self::shell_command(cmd, extra_env);
        let script = format!(
            "{{ {}; }} > /proc/1/fd/1 2>&1 & echo $! > {}",
            wrapped[2], RUN_PID_FILE
        );
        vec!["/bin/sh".to_string(), "-c".to_string(), script]
    }

    fn stop_previous_command() -> Vec<String> {
        let script = format!(
            "[ -f {pid} ] && kill \"$(cat {pid})\" 2>/dev/null; rm -f {pid}; true",
            pid = RUN_PID_FILE
        );
        vec!["/bin/sh".to_string(), "-c".to_string(), script]
    }

    async fn sync_files(
        &self,
        params: &PushParameters,
        container: &str,
        full_sync: bool,
    ) -> Result<()> {
        let matcher = IgnoreMatcher::new(&params.ignored_files);
        // A freshly created workload has no sources yet, so the recorded
        // sync timestamp does not apply to it.
        let changed_since = if params.force_build || full_sync {
            None
        } else {
            params.last_sync
        };
        let files = collect_files(&params.path, &matcher, changed_since)
            .await
            .context("collecting source files")?;

        if files.is_empty() {
            info!(component = %self.identity, "no file changes to push");
            return Ok(());
        }

        info!(component = %self.identity, files = files.len(), "syncing files to component");
        let dest = PathBuf::from(self.source_path_for(container));
        self.client
            .copy_files(&self.identity, container, &params.path, &files, &dest)
            .await
            .context("syncing files to component")
    }
}

#[async_trait]
impl ComponentAdapter for KubernetesAdapter {
    async fn push(&self, params: &PushParameters) -> Result<()> {
        // One push at a time per component working directory
        let _lock = PushLock::acquire(&self.source, &self.identity.name)?;

        // Resolution errors surface before anything touches the cluster
        let build_cmd =
            resolve_optional_command(&self.devfile, &params.devfile_build_cmd, CommandKind::Build)?;
        let lifecycle_cmd = if params.debug {
            resolve_debug_command(&self.devfile, &params.devfile_debug_cmd)?
                .ok_or_else(|| anyhow::anyhow!("no debug command found in devfile"))?
        } else {
            resolve_command(&self.devfile, &params.devfile_run_cmd, CommandKind::Run)?
        };

        // Workload creation strictly precedes file sync
        let exists = self
            .client
            .workload_exists(&self.identity)
            .await
            .context("checking whether the component workload exists")?;
        if exists {
            debug!(component = %self.identity, "workload already exists");
        } else {
            info!(component = %self.identity, "creating component workload");
            let spec = self.workload_spec()?;
            self.client
                .create_workload(&self.identity, &spec)
                .await
                .context("creating component workload")?;
        }

        // File sync strictly precedes command execution
        self.sync_files(params, &lifecycle_cmd.exec.component, !exists)
            .await?;

        if let Some(build) = &build_cmd {
            info!(component = %self.identity, command = %build.id, "executing build command");
            self.client
                .exec(
                    &self.identity,
                    &build.exec.component,
                    &Self::shell_command(build, &params.env),
                    params.show,
                )
                .await
                .with_context(|| format!("executing build command {:?}", build.id))?;
        } else {
            warn!(component = %self.identity, "devfile has no build command, skipping build");
        }

        // Replace any previously started run/debug command
        self.client
            .exec(
                &self.identity,
                &lifecycle_cmd.exec.component,
                &Self::stop_previous_command(),
                false,
            )
            .await
            .context("stopping previous command instance")?;

        info!(
            component = %self.identity,
            command = %lifecycle_cmd.id,
            debug = params.debug,
            "executing command"
        );
        self.client
            .exec(
                &self.identity,
                &lifecycle_cmd.exec.component,
                &Self::detached_command(&lifecycle_cmd, &params.env),
                params.show,
            )
            .await
            .with_context(|| format!("executing command {:?}", lifecycle_cmd.id))?;

        Ok(())
    }

    async fn log(&self, follow: bool, command: &DevfileCommand) -> Result<LogStream> {
        self.client
            .log_stream(&self.identity, &command.exec.component, follow)
            .await
            .with_context(|| format!("attaching to logs of component {}", self.identity))
    }

    async fn exec(&self, command: &[String]) -> Result<()> {
        let container = self.primary_container()?;
        self.client
            .exec(&self.identity, &container, command, true)
            .await
    }

    async fn test(&self, test_cmd: &str, show_log: bool) -> Result<()> {
        let command = resolve_command(&self.devfile, test_cmd, CommandKind::Test)?;
        info!(component = %self.identity, command = %command.id, "executing test command");
        self.client
            .exec(
                &self.identity,
                &command.exec.component,
                &Self::shell_command(&command, &[]),
                show_log,
            )
            .await
            .with_context(|| format!("executing test command {:?}", command.id))
    }

    async fn delete(
        &self,
        labels: BTreeMap<String, String>,
        show_log: bool,
        wait: bool,
    ) -> Result<()> {
        if show_log {
            info!(component = %self.identity, wait, "deleting component resources");
        }
        self.client
            .delete_workload(&self.identity.namespace, &labels, wait)
            .await
            .with_context(|| format!("deleting component {}", self.identity))
    }

    async fn undeploy(&self) -> Result<()> {
        self.client
            .delete_workload(&self.identity.namespace, &self.identity.labels(), false)
            .await
            .with_context(|| format!("undeploying component {}", self.identity))
    }
}

/// Single-quote a value for /bin/sh, escaping embedded quotes
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Advisory lock serializing pushes for one component working directory.
///
/// Held for the duration of a push; released on drop. A second concurrent
/// push fails immediately instead of racing the first one's cluster-side
/// effects.
struct PushLock {
    file: std::fs::File,
}

impl PushLock {
    fn acquire(context: &Path, component: &str) -> Result<Self> {
        let dir = paths::component_dir(context);
        std::fs::create_dir_all(&dir).context("creating component config directory")?;
        let file = std::fs::File::create(paths::push_lock_file(context))
            .context("opening push lock file")?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "another push is already in progress for component {:?}",
                component
            )
        })?;
        Ok(Self { file })
    }
}

impl Drop for PushLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devfile::test_fixtures::basic_devfile;

    fn command(devfile: &Devfile, id: &str) -> DevfileCommand {
        devfile
            .commands
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_shell_command_includes_working_dir_and_env() {
        let devfile = basic_devfile();
        let cmd = command(&devfile, "devrun");
        let shell = KubernetesAdapter::shell_command(
            &cmd,
            &[("DEBUG_PORT".to_string(), "5858".to_string())],
        );
        assert_eq!(shell[0], "/bin/sh");
        assert_eq!(shell[1], "-c");
        assert!(shell[2].contains("export DEBUG_PORT='5858'"));
        assert!(shell[2].contains("cd '/projects'"));
        assert!(shell[2].ends_with("npm start"));
    }

    #[test]
    fn test_shell_command_escapes_single_quotes() {
        let devfile = basic_devfile();
        let cmd = command(&devfile, "devrun");
        let shell = KubernetesAdapter::shell_command(
            &cmd,
            &[("MSG".to_string(), "it's started".to_string())],
        );
        assert!(shell[2].contains("export MSG='it'\\''s started'"), "{}", shell[2]);
    }

    #[test]
    fn test_detached_command_records_pid() {
        let devfile = basic_devfile();
        let cmd = command(&devfile, "devrun");
        let shell = KubernetesAdapter::detached_command(&cmd, &[]);
        assert!(shell[2].contains("> /proc/1/fd/1"));
        assert!(shell[2].contains(RUN_PID_FILE));
    }

    #[test]
    fn test_push_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let first = PushLock::acquire(dir.path(), "web").unwrap();
        let second = PushLock::acquire(dir.path(), "web");
        assert!(second.is_err());
        drop(first);
        assert!(PushLock::acquire(dir.path(), "web").is_ok());
    }
}
