//! Identity resolution for GitHub access.
//!
//! The pruner can run as a dedicated bot account or as whoever is logged in
//! to `gh`. Identity is resolved through a chain:
//!
//! 1. `--as <identity>`: explicit per-command override
//! 2. `PRUNER_IDENTITY` env var: process or session level
//! 3. `identity` in the config file: the usual setting for scheduled runs
//!
//! A resolved identity selects a gh credential directory,
//! `~/.pruner/gh-config/<identity>/`, passed to gh as `GH_CONFIG_DIR`.
//! With no identity, gh uses its own default login.

use std::env;
use std::path::{Path, PathBuf};

/// Resolve the acting identity, or `None` for gh's default login.
pub fn resolve_identity(explicit: Option<&str>, configured: Option<&str>) -> Option<String> {
    pick(explicit, env::var("PRUNER_IDENTITY").ok().as_deref(), configured)
}

fn pick(explicit: Option<&str>, from_env: Option<&str>, configured: Option<&str>) -> Option<String> {
    [explicit, from_env, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// The gh config directory for `identity`, which must already exist.
///
/// Set one up with `GH_CONFIG_DIR=~/.pruner/gh-config/<identity> gh auth login`.
pub fn gh_config_dir(identity: &str) -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("could not determine home directory")?;
    config_dir_under(&home, identity)
}

fn config_dir_under(home: &Path, identity: &str) -> Result<PathBuf, String> {
    if identity.contains(['/', '\\']) || identity.starts_with('.') {
        return Err(format!("invalid identity '{identity}'"));
    }
    let dir = home.join(".pruner").join("gh-config").join(identity);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(format!(
            "no gh credentials for '{identity}' at {}\n\
             Log in with: GH_CONFIG_DIR={} gh auth login",
            dir.display(),
            dir.display()
        ))
    }
}
