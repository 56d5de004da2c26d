//! Command resolution over a parsed devfile
//!
//! A caller either names a command explicitly (which must exist and match
//! the requested kind) or asks for the unique default-flagged command of a
//! kind. Debug is the one kind where "nothing configured" is a legitimate
//! state rather than a lookup failure, so it gets an Option-returning
//! variant.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{Devfile, DevfileCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Build,
    Run,
    Debug,
    Test,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandKind::Build => "build",
            CommandKind::Run => "run",
            CommandKind::Debug => "debug",
            CommandKind::Test => "test",
        };
        f.write_str(s)
    }
}

/// Resolve a command of `kind`, by explicit name or default flag.
///
/// With a non-empty `name` the command must exist and its group kind must
/// match. With an empty `name` exactly one command of `kind` must carry
/// `isDefault: true`.
pub fn resolve_command(devfile: &Devfile, name: &str, kind: CommandKind) -> Result<DevfileCommand> {
    if !name.is_empty() {
        return resolve_named(devfile, name, kind);
    }

    let defaults: Vec<&DevfileCommand> = devfile
        .commands
        .iter()
        .filter(|c| {
            c.exec
                .group
                .as_ref()
                .is_some_and(|g| g.kind == kind && g.is_default)
        })
        .collect();

    match defaults.len() {
        1 => Ok(defaults[0].clone()),
        0 => bail!("the devfile has no default {} command", kind),
        n => bail!("the devfile has {} default {} commands, expected one", n, kind),
    }
}

/// Resolve a command of `kind` where "nothing configured" is a legitimate
/// state: an empty `name` with no default of that kind yields `None` rather
/// than an error. An explicit name is still a hard lookup.
pub fn resolve_optional_command(
    devfile: &Devfile,
    name: &str,
    kind: CommandKind,
) -> Result<Option<DevfileCommand>> {
    if !name.is_empty() {
        return resolve_named(devfile, name, kind).map(Some);
    }

    let mut defaults = devfile.commands.iter().filter(|c| {
        c.exec
            .group
            .as_ref()
            .is_some_and(|g| g.kind == kind && g.is_default)
    });

    let first = defaults.next();
    if defaults.next().is_some() {
        bail!("the devfile has more than one default {} command", kind);
    }
    Ok(first.cloned())
}

/// Resolve the debug command. Callers must treat `None` as "no debug
/// configured", which is distinct from a lookup failure.
pub fn resolve_debug_command(devfile: &Devfile, name: &str) -> Result<Option<DevfileCommand>> {
    resolve_optional_command(devfile, name, CommandKind::Debug)
}

fn resolve_named(devfile: &Devfile, name: &str, kind: CommandKind) -> Result<DevfileCommand> {
    let found = devfile
        .commands
        .iter()
        .find(|c| c.id.eq_ignore_ascii_case(name));

    let Some(cmd) = found else {
        bail!("{} command {:?} not found in devfile", kind, name);
    };

    match &cmd.exec.group {
        Some(group) if group.kind == kind => Ok(cmd.clone()),
        _ => bail!(
            "command {:?} exists in the devfile but is not a {} command",
            name,
            kind
        ),
    }
}

/// Derive the component name for a devfile.
///
/// Uses `metadata.name` when present, stripping a trailing `-` (many
/// devfiles keep the v1 pattern of a dash suffix used to prefix container
/// names). Falls back to the name of the directory holding the devfile.
pub fn gather_name(devfile: &Devfile, devfile_dir: &Path) -> Result<String> {
    if let Some(name) = devfile.metadata.name.as_deref() {
        if !name.is_empty() {
            // Only the single conventional dash suffix is stripped
            return Ok(name.strip_suffix('-').unwrap_or(name).to_string());
        }
    }

    devfile_dir
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(devfile_dir)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "cannot derive a component name from directory {}",
                devfile_dir.display()
            )
        })
}
