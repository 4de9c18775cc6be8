//! Installed inventory: an externally maintained YAML list of
//! `(marketplace, plugin)` pairs that `impact` compares against.

use crate::query::Selector;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default inventory location under the corpus root.
pub const INSTALLED_REL: &str = "installed.yaml";

#[derive(Debug, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub installed: Vec<InstalledEntry>,
}

#[derive(Debug, Deserialize)]
pub struct InstalledEntry {
    pub marketplace: String,
    /// Absent means the whole marketplace is installed.
    #[serde(default)]
    pub plugin: Option<String>,
}

/// Load the inventory; a missing file is an empty inventory (nothing
/// installed yet), a malformed one is fatal.
pub fn load(path: &Path) -> Result<Vec<InstalledEntry>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read inventory: {}", path.display()))?;
    let inventory: Inventory =
        serde_yaml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(inventory.installed)
}

pub fn to_selectors(entries: &[InstalledEntry]) -> Vec<Selector> {
    entries
        .iter()
        .map(|e| Selector {
            marketplace: e.marketplace.clone(),
            plugin: e.plugin.clone(),
        })
        .collect()
}
