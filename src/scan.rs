//! Scan: walk a marketplace corpus, build signatures and clusters, write the
//! report artifact.

use crate::cluster;
use crate::config::Config;
use crate::lsh::{LshIndex, LshParams};
use crate::minhash::MinHasher;
use crate::report::{
    self, basename, Cluster, FileRecord, Metadata, Report, Summary, TypeStats, SCHEMA_VERSION,
};
use crate::sanity;
use crate::shingle;
use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// One corpus file: `<root>/<marketplace>/<plugin>/...`, content in memory.
pub struct ScanFile {
    pub marketplace: String,
    pub plugin: String,
    /// Relative to the marketplace directory.
    pub path: String,
    pub content: String,
}

/// Files that were seen but not indexed, tallied for the end-of-scan note.
#[derive(Debug, Default)]
pub struct ScanSkips {
    pub too_short: usize,
    pub unreadable: usize,
    pub outside_hierarchy: usize,
}

impl ScanSkips {
    pub fn total(&self) -> usize {
        self.too_short + self.unreadable + self.outside_hierarchy
    }
}

fn extension_matcher(extensions: &[String]) -> Result<globset::GlobSet> {
    let mut builder = globset::GlobSetBuilder::new();
    for ext in extensions {
        let pattern = format!("*.{}", ext);
        builder.add(
            globset::Glob::new(&pattern).with_context(|| format!("invalid pattern: {}", pattern))?,
        );
    }
    builder.build().context("build extension matcher")
}

/// Discover corpus files under `root`, sorted canonically by
/// `(marketplace, plugin, path)` so file indices are traversal-independent.
/// Unreadable and too-short files are counted and skipped, never fatal.
pub fn discover(root: &Path, config: &Config) -> Result<(Vec<ScanFile>, ScanSkips)> {
    let matcher = extension_matcher(&config.extensions)?;
    let mut files = Vec::new();
    let mut skips = ScanSkips::default();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let abs = entry.path();
        let rel = match abs.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let components: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if !matcher.is_match(components.last().map(String::as_str).unwrap_or_default()) {
            continue;
        }
        // two-level hierarchy: marketplace / plugin / file...
        if components.len() < 3 {
            skips.outside_hierarchy += 1;
            continue;
        }
        let content = match std::fs::read_to_string(abs) {
            Ok(c) => c,
            Err(_) => {
                skips.unreadable += 1;
                continue;
            }
        };
        if content.chars().count() < config.min_content_len {
            skips.too_short += 1;
            continue;
        }
        files.push(ScanFile {
            marketplace: components[0].clone(),
            plugin: components[1].clone(),
            path: components[1..].join("/"),
            content,
        });
    }

    files.sort_by(|a, b| {
        (&a.marketplace, &a.plugin, &a.path).cmp(&(&b.marketplace, &b.plugin, &b.path))
    });
    Ok((files, skips))
}

/// Run the full pipeline and write the report atomically. Returns the final
/// report plus the skip tallies for the caller to render.
pub fn run_scan(root: &Path, report_path: &Path, config: &Config) -> Result<(Report, ScanSkips)> {
    let (scan_files, skips) = discover(root, config)?;
    if scan_files.is_empty() {
        anyhow::bail!(
            "no corpus found under {} (expected <marketplace>/<plugin>/*.{})",
            root.display(),
            config.extensions.join("|")
        );
    }

    let mut files: Vec<FileRecord> = scan_files
        .iter()
        .enumerate()
        .map(|(file_index, f)| FileRecord {
            file_index,
            marketplace: f.marketplace.clone(),
            plugin: f.plugin.clone(),
            path: f.path.clone(),
            filename: basename(&f.path).to_string(),
            is_official: config.is_official(&f.marketplace),
            cluster_id: None,
            in_cluster: false,
        })
        .collect();

    // shingle + MinHash are pure per file: fan out, then gather in
    // file_index order so the report is traversal-independent
    let hasher = MinHasher::new(config.num_permutations, config.minhash_seed);
    let signatures: Vec<Vec<u32>> = scan_files
        .par_iter()
        .map(|f| hasher.signature(&shingle::shingle(&f.content, config.shingle_size)))
        .collect::<Result<_>>()?;

    let params = LshParams::choose(config.num_permutations, config.similarity_threshold);
    let mut index = LshIndex::new(params);
    for (file_index, signature) in signatures.iter().enumerate() {
        index.insert(file_index, signature);
    }

    let clusters = cluster::build_clusters(
        &mut files,
        &signatures,
        &index,
        config.similarity_threshold,
        config.scaffold_min_size,
    );

    let summary = summarize(&files, &clusters);
    let outcome = sanity::check(&summary, &files, &clusters, &config.sanity);
    let (marketplace_index, filename_index) = report::compute_indices(&clusters);

    let report = Report {
        metadata: Metadata {
            version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            similarity_threshold: config.similarity_threshold,
            num_permutations: config.num_permutations,
            shingle_size: config.shingle_size,
            lsh_bands: index.params().bands,
            lsh_rows: index.params().rows,
            confidence: outcome.confidence,
            warnings: outcome.warnings,
        },
        summary,
        file_index: files,
        marketplace_index,
        filename_index,
        clusters,
    };
    report::save(&report, report_path)?;
    Ok((report, skips))
}

fn summarize(files: &[FileRecord], clusters: &[Cluster]) -> Summary {
    let files_in_clusters = files.iter().filter(|f| f.in_cluster).count();
    let marketplaces: BTreeSet<&str> = files.iter().map(|f| f.marketplace.as_str()).collect();
    let mut by_type = std::collections::BTreeMap::new();
    for cluster in clusters {
        let entry: &mut TypeStats = by_type.entry(cluster.kind.as_str().to_string()).or_default();
        entry.clusters += 1;
        entry.files += cluster.size;
    }
    Summary {
        total_files_scanned: files.len(),
        files_in_clusters,
        unclustered_files: files.len() - files_in_clusters,
        unique_clusters: clusters.len(),
        unique_marketplaces: marketplaces.len(),
        by_type,
    }
}
