//! Queries over a loaded report: where, compare, impact, stats.
//!
//! Nothing here mutates the report; every query is a pure projection, so
//! concurrent readers need no coordination.

use crate::report::{Cluster, FileRecord, LoadedReport};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;

/// A subset of the corpus: everything in a marketplace, or one plugin of it.
/// Parsed from `marketplace` or `marketplace/plugin`.
#[derive(Debug, Clone, Serialize)]
pub struct Selector {
    pub marketplace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl Selector {
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            anyhow::bail!("empty selector; expected marketplace or marketplace/plugin");
        }
        match trimmed.split_once('/') {
            None => Ok(Self {
                marketplace: trimmed.to_string(),
                plugin: None,
            }),
            Some((marketplace, plugin)) => {
                if marketplace.is_empty() || plugin.is_empty() || plugin.contains('/') {
                    anyhow::bail!("bad selector '{}'; expected marketplace or marketplace/plugin", s);
                }
                Ok(Self {
                    marketplace: marketplace.to_string(),
                    plugin: Some(plugin.to_string()),
                })
            }
        }
    }

    pub fn matches(&self, file: &FileRecord) -> bool {
        file.marketplace == self.marketplace
            && self
                .plugin
                .as_ref()
                .map_or(true, |plugin| &file.plugin == plugin)
    }
}

fn matches_any(selectors: &[Selector], file: &FileRecord) -> bool {
    selectors.iter().any(|s| s.matches(file))
}

#[derive(Debug, Serialize)]
pub struct WhereResult {
    pub pattern: String,
    pub clusters: Vec<Cluster>,
    pub unclustered: Vec<FileRecord>,
}

/// Resolve `pattern` to files and report the distinct clusters they sit in.
/// A pattern with glob metacharacters matches basenames; anything else is a
/// substring match on the path.
pub fn where_query(loaded: &LoadedReport, pattern: &str) -> Result<WhereResult> {
    let is_glob = pattern.chars().any(|c| matches!(c, '*' | '?' | '['));
    let glob = if is_glob {
        Some(
            globset::Glob::new(pattern)
                .with_context(|| format!("invalid pattern: {}", pattern))?
                .compile_matcher(),
        )
    } else {
        None
    };

    let matched: Vec<&FileRecord> = loaded
        .files()
        .iter()
        .filter(|f| match &glob {
            Some(m) => m.is_match(&f.filename),
            None => f.path.contains(pattern),
        })
        .collect();

    let cluster_ids: BTreeSet<usize> = matched.iter().filter_map(|f| f.cluster_id).collect();
    let clusters = cluster_ids
        .into_iter()
        .filter_map(|id| loaded.cluster(id).cloned())
        .collect();
    let unclustered = matched
        .into_iter()
        .filter(|f| f.cluster_id.is_none())
        .cloned()
        .collect();
    Ok(WhereResult {
        pattern: pattern.to_string(),
        clusters,
        unclustered,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileClass {
    /// Shares a cluster with at least one reference file.
    RedundantWithReference,
    /// Shares a cluster with another target file, but with no reference file.
    RedundantInternal,
    /// Unclustered, or every cluster peer lies outside target and reference.
    Novel,
}

impl FileClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileClass::RedundantWithReference => "redundant-with-reference",
            FileClass::RedundantInternal => "redundant-internal",
            FileClass::Novel => "novel",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompareRow {
    pub marketplace: String,
    pub plugin: String,
    pub path: String,
    pub class: FileClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CompareOutcome {
    pub target_total: usize,
    pub redundant_with_reference: usize,
    pub redundant_internal: usize,
    pub novel: usize,
    pub rows: Vec<CompareRow>,
}

impl CompareOutcome {
    /// Fraction of target files that bring genuinely new content.
    pub fn novelty_ratio(&self) -> f64 {
        if self.target_total == 0 {
            return 0.0;
        }
        self.novel as f64 / self.target_total as f64
    }
}

/// Classify every target file against the reference subset. Reference is the
/// stable side; target is the candidate about to be installed.
pub fn compare(
    loaded: &LoadedReport,
    targets: &[Selector],
    references: &[Selector],
) -> Result<CompareOutcome> {
    let target_files: Vec<&FileRecord> = loaded
        .files()
        .iter()
        .filter(|f| matches_any(targets, f))
        .collect();
    if target_files.is_empty() {
        anyhow::bail!("no files match the target selector");
    }

    let mut rows = Vec::with_capacity(target_files.len());
    let mut redundant_with_reference = 0;
    let mut redundant_internal = 0;
    let mut novel = 0;
    for file in &target_files {
        let class = classify(loaded, file, targets, references);
        match class {
            FileClass::RedundantWithReference => redundant_with_reference += 1,
            FileClass::RedundantInternal => redundant_internal += 1,
            FileClass::Novel => novel += 1,
        }
        rows.push(CompareRow {
            marketplace: file.marketplace.clone(),
            plugin: file.plugin.clone(),
            path: file.path.clone(),
            class,
            cluster_id: file.cluster_id,
        });
    }
    Ok(CompareOutcome {
        target_total: target_files.len(),
        redundant_with_reference,
        redundant_internal,
        novel,
        rows,
    })
}

fn classify(
    loaded: &LoadedReport,
    file: &FileRecord,
    targets: &[Selector],
    references: &[Selector],
) -> FileClass {
    let Some(cluster) = loaded.cluster_for_file(file) else {
        return FileClass::Novel;
    };
    let mut shares_with_target = false;
    for &member in &cluster.members {
        if member == file.file_index {
            continue;
        }
        // the file table is sorted by file_index and members were validated
        // against it at load time
        let Ok(pos) = loaded
            .files()
            .binary_search_by_key(&member, |f| f.file_index)
        else {
            continue;
        };
        let peer = &loaded.files()[pos];
        if matches_any(references, peer) {
            return FileClass::RedundantWithReference;
        }
        if matches_any(targets, peer) {
            shares_with_target = true;
        }
    }
    if shares_with_target {
        FileClass::RedundantInternal
    } else {
        FileClass::Novel
    }
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub confidence: String,
    pub warnings: Vec<String>,
    pub total_files_scanned: usize,
    pub files_in_clusters: usize,
    pub unclustered_files: usize,
    pub unique_clusters: usize,
    pub unique_marketplaces: usize,
    pub by_type: Vec<(String, usize, usize)>,
    pub top_filenames: Vec<(String, usize)>,
}

/// Read-only projection of the report's aggregate numbers.
pub fn stats(loaded: &LoadedReport, top: usize) -> StatsView {
    let summary = &loaded.report.summary;
    let mut top_filenames: Vec<(String, usize)> = loaded
        .report
        .filename_index
        .iter()
        .map(|(name, ids)| (name.clone(), ids.len()))
        .collect();
    top_filenames.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_filenames.truncate(top);

    StatsView {
        confidence: loaded.report.metadata.confidence.as_str().to_string(),
        warnings: loaded.report.metadata.warnings.clone(),
        total_files_scanned: summary.total_files_scanned,
        files_in_clusters: summary.files_in_clusters,
        unclustered_files: summary.unclustered_files,
        unique_clusters: summary.unique_clusters,
        unique_marketplaces: summary.unique_marketplaces,
        by_type: summary
            .by_type
            .iter()
            .map(|(kind, t)| (kind.clone(), t.clusters, t.files))
            .collect(),
        top_filenames,
    }
}
