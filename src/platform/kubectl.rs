//! kubectl-backed platform client
//!
//! Shells out to kubectl for every platform primitive. The workload manifest
//! is rendered from typed k8s-openapi structs and applied through
//! `kubectl apply -f -`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::Poll;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{ComponentIdentity, LogStream, PlatformClient, PortPair, WorkloadSpec};

pub struct KubectlClient {
    kubectl: PathBuf,
}

impl KubectlClient {
    pub fn new() -> Result<Self> {
        let kubectl = which::which("kubectl").unwrap_or_else(|_| PathBuf::from("kubectl"));
        Ok(Self { kubectl })
    }

    fn command(&self) -> Command {
        Command::new(&self.kubectl)
    }

    /// Run kubectl to completion and return its stdout, failing on a
    /// non-zero exit with stderr attached.
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(args = ?args, "running kubectl");
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .with_context(|| format!("running kubectl {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("kubectl {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Name of a pod owned by the component, for pod-scoped operations
    async fn pod_name(&self, identity: &ComponentIdentity) -> Result<String> {
        let selector = label_selector(&identity.labels());
        let stdout = self
            .run(&[
                "get",
                "pods",
                "-n",
                &identity.namespace,
                "-l",
                &selector,
                "--field-selector=status.phase=Running",
                "-o",
                "jsonpath={.items[0].metadata.name}",
            ])
            .await
            .with_context(|| format!("finding a running pod for component {}", identity))?;
        let pod = stdout.trim();
        if pod.is_empty() {
            bail!("no running pod found for component {}", identity);
        }
        Ok(pod.to_string())
    }

    fn deployment_manifest(identity: &ComponentIdentity, spec: &WorkloadSpec) -> Deployment {
        let labels = identity.labels();
        let containers = spec
            .containers
            .iter()
            .map(|c| Container {
                name: c.name.clone(),
                image: Some(c.image.clone()),
                // Keep the pod alive; lifecycle commands are exec'd into it
                // and write to the container's stdout.
                command: Some(vec!["tail".to_string()]),
                args: Some(vec!["-f".to_string(), "/dev/null".to_string()]),
                env: Some(
                    c.env
                        .iter()
                        .map(|(name, value)| EnvVar {
                            name: name.clone(),
                            value: Some(value.clone()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ports: Some(
                    c.ports
                        .iter()
                        .map(|p| ContainerPort {
                            container_port: i32::from(*p),
                            ..Default::default()
                        })
                        .collect(),
                ),
                working_dir: Some(c.source_path.clone()),
                ..Default::default()
            })
            .collect();

        Deployment {
            metadata: ObjectMeta {
                name: Some(identity.workload_name().to_string()),
                namespace: Some(identity.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PlatformClient for KubectlClient {
    async fn current_namespace(&self) -> Result<String> {
        let stdout = self
            .run(&[
                "config",
                "view",
                "--minify",
                "--output",
                "jsonpath={..namespace}",
            ])
            .await
            .context("reading current namespace from kubeconfig")?;
        let ns = stdout.trim();
        if ns.is_empty() {
            return Ok("default".to_string());
        }
        Ok(ns.to_string())
    }

    async fn workload_exists(&self, identity: &ComponentIdentity) -> Result<bool> {
        let stdout = self
            .run(&[
                "get",
                "deployment",
                identity.workload_name(),
                "-n",
                &identity.namespace,
                "--ignore-not-found",
                "-o",
                "name",
            ])
            .await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn create_workload(
        &self,
        identity: &ComponentIdentity,
        spec: &WorkloadSpec,
    ) -> Result<()> {
        let manifest = render_manifest(&Self::deployment_manifest(identity, spec))
            .context("rendering workload manifest")?;

        let mut child = self
            .command()
            .args(["apply", "-n", &identity.namespace, "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawning kubectl apply")?;

        let mut stdin = child.stdin.take().context("no stdin on kubectl apply")?;
        stdin
            .write_all(manifest.as_bytes())
            .await
            .context("writing manifest to kubectl apply")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("waiting for kubectl apply")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("kubectl apply failed: {}", stderr.trim());
        }

        info!(component = %identity, "workload applied, waiting for rollout");
        self.run(&[
            "rollout",
            "status",
            &format!("deployment/{}", identity.workload_name()),
            "-n",
            &identity.namespace,
        ])
        .await
        .with_context(|| format!("waiting for workload rollout of {}", identity))?;
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        wait: bool,
    ) -> Result<()> {
        let selector = label_selector(labels);
        let wait_flag = format!("--wait={}", wait);
        self.run(&[
            "delete",
            "deployment,service",
            "-n",
            namespace,
            "-l",
            &selector,
            "--ignore-not-found",
            &wait_flag,
        ])
        .await?;
        Ok(())
    }

    async fn exec(
        &self,
        identity: &ComponentIdentity,
        container: &str,
        command: &[String],
        show: bool,
    ) -> Result<()> {
        let target = format!("deployment/{}", identity.workload_name());
        let mut cmd = self.command();
        cmd.args([
            "exec",
            &target,
            "-n",
            &identity.namespace,
            "-c",
            container,
            "--",
        ])
        .args(command);

        if show {
            let status = cmd
                .status()
                .await
                .with_context(|| format!("executing command in {}", identity))?;
            if !status.success() {
                bail!(
                    "command {:?} exited with {} in component {}",
                    command,
                    status,
                    identity
                );
            }
            return Ok(());
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("executing command in {}", identity))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "command {:?} exited with {} in component {}: {}",
                command,
                output.status,
                identity,
                stderr.trim()
            );
        }
        Ok(())
    }

    async fn log_stream(
        &self,
        identity: &ComponentIdentity,
        container: &str,
        follow: bool,
    ) -> Result<LogStream> {
        let target = format!("deployment/{}", identity.workload_name());
        let mut args = vec![
            "logs".to_string(),
            target,
            "-n".to_string(),
            identity.namespace.clone(),
            "-c".to_string(),
            container.to_string(),
        ];
        if follow {
            args.push("-f".to_string());
        }

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("spawning kubectl logs")?;

        let stdout = child.stdout.take().context("no stdout on kubectl logs")?;
        Ok(Box::new(ChildStream { _child: child, stdout }))
    }

    async fn copy_files(
        &self,
        identity: &ComponentIdentity,
        container: &str,
        source_base: &Path,
        files: &[PathBuf],
        dest: &Path,
    ) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let pod = self.pod_name(identity).await?;

        // Destination directories must exist before kubectl cp
        let mut dirs: Vec<String> = files
            .iter()
            .filter_map(|f| f.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| dest.join(p).to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        dirs.dedup();
        if !dirs.is_empty() {
            let mut mkdir = vec!["mkdir".to_string(), "-p".to_string()];
            mkdir.extend(dirs);
            self.exec(identity, container, &mkdir, false)
                .await
                .context("creating destination directories")?;
        }

        for file in files {
            let local = source_base.join(file);
            let remote = format!(
                "{}/{}:{}",
                identity.namespace,
                pod,
                dest.join(file).display()
            );
            self.run(&[
                "cp",
                &local.to_string_lossy(),
                &remote,
                "-c",
                container,
            ])
            .await
            .with_context(|| format!("copying {} to component {}", file.display(), identity))?;
        }
        debug!(files = files.len(), component = %identity, "files synchronized");
        Ok(())
    }

    async fn port_forward(
        &self,
        identity: &ComponentIdentity,
        ports: PortPair,
        mut stop: watch::Receiver<bool>,
        ready: oneshot::Sender<()>,
    ) -> Result<()> {
        let target = format!("deployment/{}", identity.workload_name());
        let pair = ports.to_string();
        let mut child = self
            .command()
            .args(["port-forward", &target, &pair, "-n", &identity.namespace])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("spawning kubectl port-forward")?;

        let stdout = child
            .stdout
            .take()
            .context("no stdout on kubectl port-forward")?;
        let mut lines = BufReader::new(stdout).lines();
        let mut ready = Some(ready);

        loop {
            tokio::select! {
                line = lines.next_line() => match line.context("reading port-forward output")? {
                    Some(line) => {
                        if line.contains("Forwarding from") {
                            info!(ports = %pair, component = %identity, "port forwarding established");
                            if let Some(tx) = ready.take() {
                                let _ = tx.send(());
                            }
                        }
                    }
                    None => {
                        // kubectl exited on its own: the remote side closed
                        let status = child.wait().await.context("reaping kubectl port-forward")?;
                        bail!("port forwarding to {} ended unexpectedly ({})", identity, status);
                    }
                },
                changed = stop.changed() => {
                    // A closed stop channel counts as a stop request
                    if changed.is_err() || *stop.borrow() {
                        debug!(component = %identity, "stopping port forward");
                        if let Err(e) = child.start_kill() {
                            warn!(error = %e, "failed to kill kubectl port-forward");
                        }
                        let _ = child.wait().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Render a typed manifest as YAML, injecting the apiVersion/kind pair that
/// k8s-openapi keeps as trait constants rather than struct fields.
fn render_manifest(deployment: &Deployment) -> Result<String> {
    use k8s_openapi::Resource;

    let mut doc = serde_yaml::to_value(deployment)?;
    if let serde_yaml::Value::Mapping(map) = &mut doc {
        map.insert(
            serde_yaml::Value::from("apiVersion"),
            serde_yaml::Value::from(Deployment::API_VERSION),
        );
        map.insert(
            serde_yaml::Value::from("kind"),
            serde_yaml::Value::from(Deployment::KIND),
        );
    }
    Ok(serde_yaml::to_string(&doc)?)
}

/// Render a label map as a kubectl `-l` selector
fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Child stdout wrapper that keeps the kubectl process alive for as long as
/// the stream is being read, and kills it when the stream is dropped.
struct ChildStream {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for ChildStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector_rendering() {
        let identity = ComponentIdentity {
            name: "web".to_string(),
            application: "app".to_string(),
            namespace: "ns".to_string(),
        };
        let selector = label_selector(&identity.labels());
        assert_eq!(
            selector,
            "app.kubernetes.io/instance=web,app.kubernetes.io/part-of=app"
        );
    }

    #[test]
    fn test_deployment_manifest_shape() {
        let identity = ComponentIdentity {
            name: "web".to_string(),
            application: "app".to_string(),
            namespace: "ns".to_string(),
        };
        let spec = WorkloadSpec {
            containers: vec![super::super::ContainerSpec {
                name: "runtime".to_string(),
                image: "node:16".to_string(),
                env: vec![("FOO".to_string(), "bar".to_string())],
                source_path: "/projects".to_string(),
                ports: vec![3000],
            }],
        };
        let manifest = KubectlClient::deployment_manifest(&identity, &spec);
        assert_eq!(manifest.metadata.name.as_deref(), Some("web"));
        let pod_spec = manifest.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.containers.len(), 1);
        assert_eq!(pod_spec.containers[0].image.as_deref(), Some("node:16"));
        assert_eq!(
            pod_spec.containers[0].working_dir.as_deref(),
            Some("/projects")
        );
    }

    #[test]
    fn test_rendered_manifest_has_api_version_and_kind() {
        let identity = ComponentIdentity {
            name: "web".to_string(),
            application: "app".to_string(),
            namespace: "ns".to_string(),
        };
        let spec = WorkloadSpec { containers: vec![] };
        let yaml = render_manifest(&KubectlClient::deployment_manifest(&identity, &spec)).unwrap();
        assert!(yaml.contains("apiVersion: apps/v1"), "{}", yaml);
        assert!(yaml.contains("kind: Deployment"), "{}", yaml);
    }
}
