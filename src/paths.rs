use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Base directory for all devctl data (debug session records, locks)
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "devctl")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("devctl"))
}

/// Directory for active debug session records
pub fn debug_dir() -> PathBuf {
    data_dir().join("debug")
}

/// Per-component config directory inside a component working directory
pub fn component_dir(context: &Path) -> PathBuf {
    context.join(".devctl")
}

/// Environment info file for a component working directory
pub fn env_file(context: &Path) -> PathBuf {
    component_dir(context).join("env.yaml")
}

/// Push lock file for a component working directory
pub fn push_lock_file(context: &Path) -> PathBuf {
    component_dir(context).join("push.lock")
}

/// Locate the devfile in a component working directory.
///
/// Checks `devfile.yaml` first, then the hidden `.devfile.yaml` variant.
/// Returns the primary path when neither exists so callers produce a
/// "no such file" error naming the conventional location.
pub fn devfile_location(context: &Path) -> PathBuf {
    let primary = context.join("devfile.yaml");
    if primary.exists() {
        return primary;
    }
    let hidden = context.join(".devfile.yaml");
    if hidden.exists() {
        return hidden;
    }
    primary
}
