//! Keyword filter over YAML frontmatter blocks in corpus files.

use crate::config::Config;
use crate::scan;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct FrontmatterHit {
    pub marketplace: String,
    pub plugin: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The YAML block between a leading `---` line and the next `---` line.
fn frontmatter(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

fn string_field(value: &serde_yaml::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Case-insensitive keyword grep over frontmatter text. Files without a
/// frontmatter block never match.
pub fn find(root: &Path, config: &Config, keyword: &str) -> Result<Vec<FrontmatterHit>> {
    let (files, _) = scan::discover(root, config)?;
    let needle = keyword.to_lowercase();
    let mut hits = Vec::new();
    for file in files {
        let Some(block) = frontmatter(&file.content) else {
            continue;
        };
        if !block.to_lowercase().contains(&needle) {
            continue;
        }
        let parsed: Option<serde_yaml::Value> = serde_yaml::from_str(block).ok();
        let (name, description) = parsed
            .map(|v| (string_field(&v, "name"), string_field(&v, "description")))
            .unwrap_or((None, None));
        hits.push(FrontmatterHit {
            marketplace: file.marketplace,
            plugin: file.plugin,
            path: file.path,
            name,
            description,
        });
    }
    Ok(hits)
}
