//! Parsed devfile model
//!
//! Owns the in-memory form of a component descriptor: metadata, container
//! components, lifecycle commands and starter projects. Validation here is
//! limited to what command lookup and workload creation need; full schema
//! validation belongs to the descriptor author's tooling.

pub mod command;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub use command::{gather_name, CommandKind};

/// A parsed and validated devfile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devfile {
    pub schema_version: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub commands: Vec<DevfileCommand>,
    #[serde(default)]
    pub starter_projects: Vec<StarterProject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub container: Option<Container>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub mount_sources: Option<bool>,
    /// Where sources are mounted inside the container (default /projects)
    #[serde(default)]
    pub source_mapping: Option<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub target_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevfileCommand {
    pub id: String,
    pub exec: ExecCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCommand {
    pub command_line: String,
    /// Name of the container component the command runs in
    pub component: String,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub group: Option<CommandGroup>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandGroup {
    pub kind: CommandKind,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarterProject {
    pub name: String,
    #[serde(default)]
    pub git: Option<GitSource>,
    #[serde(default)]
    pub sub_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSource {
    #[serde(default)]
    pub checkout_from: Option<CheckoutFrom>,
    #[serde(default)]
    pub remotes: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutFrom {
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub remote: Option<String>,
}

/// Parse and validate a devfile from disk
pub async fn parse_and_validate(path: &Path) -> Result<Devfile> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading devfile at {}", path.display()))?;
    let devfile: Devfile = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing devfile at {}", path.display()))?;
    devfile.validate()?;
    Ok(devfile)
}

impl Devfile {
    /// Structural validation: unique non-empty command ids, exec bodies that
    /// name a real container component.
    pub fn validate(&self) -> Result<()> {
        let containers: HashSet<&str> = self
            .components
            .iter()
            .filter(|c| c.container.is_some())
            .map(|c| c.name.as_str())
            .collect();

        let mut seen = HashSet::new();
        for cmd in &self.commands {
            if cmd.id.is_empty() {
                bail!("devfile contains a command with an empty id");
            }
            if !seen.insert(cmd.id.to_lowercase()) {
                bail!("devfile contains duplicate command id {:?}", cmd.id);
            }
            if cmd.exec.command_line.is_empty() {
                bail!("command {:?} has an empty commandLine", cmd.id);
            }
            if !containers.contains(cmd.exec.component.as_str()) {
                bail!(
                    "command {:?} references unknown container component {:?}",
                    cmd.id,
                    cmd.exec.component
                );
            }
        }
        Ok(())
    }

    /// Container components, in declaration order
    pub fn containers(&self) -> impl Iterator<Item = (&str, &Container)> {
        self.components
            .iter()
            .filter_map(|c| c.container.as_ref().map(|ct| (c.name.as_str(), ct)))
    }

    /// Look up a container component by name
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    /// Look up a starter project by name
    pub fn starter_project(&self, name: &str) -> Result<&StarterProject> {
        self.starter_projects
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "starter project {:?} not found in devfile, available: [{}]",
                    name,
                    self.starter_projects
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub const BASIC_DEVFILE: &str = r#"
schemaVersion: 2.0.0
metadata:
  name: nodejs-app-
components:
  - name: runtime
    container:
      image: registry.example.com/nodejs:16
      mountSources: true
      endpoints:
        - name: http
          targetPort: 3000
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

    pub fn basic_devfile() -> Devfile {
        serde_yaml::from_str(BASIC_DEVFILE).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::basic_devfile;
    use super::*;

    #[test]
    fn test_parse_basic_devfile() {
        let devfile = basic_devfile();
        devfile.validate().unwrap();
        assert_eq!(devfile.schema_version, "2.0.0");
        assert_eq!(devfile.commands.len(), 2);
        assert_eq!(devfile.containers().count(), 1);
        assert!(devfile.container("runtime").is_some());
    }

    #[test]
    fn test_validate_rejects_unknown_container() {
        let mut devfile = basic_devfile();
        devfile.commands[0].exec.component = "missing".to_string();
        let err = devfile.validate().unwrap_err().to_string();
        assert!(err.contains("unknown container component"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut devfile = basic_devfile();
        let dup = devfile.commands[0].clone();
        devfile.commands.push(dup);
        assert!(devfile.validate().is_err());
    }

    #[test]
    fn test_starter_project_lookup() {
        let mut devfile = basic_devfile();
        devfile.starter_projects.push(StarterProject {
            name: "nodejs-starter".to_string(),
            git: None,
            sub_dir: None,
        });
        assert!(devfile.starter_project("nodejs-starter").is_ok());
        let err = devfile.starter_project("other").unwrap_err().to_string();
        assert!(err.contains("nodejs-starter"), "{}", err);
    }
}
