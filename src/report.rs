//! Report artifact: schema, atomic writes, and a validating loader.
//!
//! The report is the single structured document every query consumes. The
//! loader refuses inconsistent artifacts outright; a report that lies about
//! its own clusters is worse than no report.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Schema version written by this binary.
pub const SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterKind {
    CrossMarketplace,
    Internal,
    Scaffold,
}

impl ClusterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterKind::CrossMarketplace => "cross-marketplace",
            ClusterKind::Internal => "internal",
            ClusterKind::Scaffold => "scaffold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    None,
    /// Reports predating the sanity checker carry no confidence.
    Unknown,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
            Confidence::Unknown => "unknown",
        }
    }

    /// One step down the ladder; `none` is the floor.
    pub fn downgraded(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium => Confidence::Low,
            Confidence::Low | Confidence::None => Confidence::None,
            Confidence::Unknown => Confidence::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    pub generated_at: String,
    pub similarity_threshold: f64,
    pub num_permutations: usize,
    pub shingle_size: usize,
    pub lsh_bands: usize,
    pub lsh_rows: usize,
    pub confidence: Confidence,
    pub warnings: Vec<String>,
}

impl Default for Metadata {
    /// Stand-in for reports written before metadata existed.
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            generated_at: String::new(),
            similarity_threshold: 0.0,
            num_permutations: 0,
            shingle_size: 0,
            lsh_bands: 0,
            lsh_rows: 0,
            confidence: Confidence::Unknown,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeStats {
    pub clusters: usize,
    pub files: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_files_scanned: usize,
    pub files_in_clusters: usize,
    pub unclustered_files: usize,
    pub unique_clusters: usize,
    pub unique_marketplaces: usize,
    pub by_type: BTreeMap<String, TypeStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_index: usize,
    pub marketplace: String,
    pub plugin: String,
    /// Relative to the marketplace root, so it starts with the plugin dir.
    pub path: String,
    pub filename: String,
    pub is_official: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
    pub in_cluster: bool,
}

/// Projection of a member's file record carried inside its cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub file_index: usize,
    pub marketplace: String,
    pub plugin: String,
    pub path: String,
    pub is_official: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub file1_index: usize,
    pub file2_index: usize,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: usize,
    #[serde(rename = "type")]
    pub kind: ClusterKind,
    pub size: usize,
    pub avg_similarity: f64,
    pub has_official: bool,
    pub marketplaces: Vec<String>,
    /// Member file indices, ascending. Absent in v1.0 artifacts, where it is
    /// rebuilt from `locations`.
    #[serde(default)]
    pub members: Vec<usize>,
    pub locations: Vec<Location>,
    pub similarity_pairs: Vec<SimilarityPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub metadata: Metadata,
    pub summary: Summary,
    #[serde(default)]
    pub file_index: Vec<FileRecord>,
    #[serde(default)]
    pub marketplace_index: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    pub filename_index: BTreeMap<String, Vec<usize>>,
    pub clusters: Vec<Cluster>,
}

/// Marketplace and filename indices recomputed from the cluster table alone.
pub fn compute_indices(
    clusters: &[Cluster],
) -> (BTreeMap<String, Vec<usize>>, BTreeMap<String, Vec<usize>>) {
    let mut by_marketplace: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    let mut by_filename: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for cluster in clusters {
        for loc in &cluster.locations {
            by_marketplace
                .entry(loc.marketplace.clone())
                .or_default()
                .insert(cluster.cluster_id);
            let filename = basename(&loc.path);
            by_filename
                .entry(filename.to_string())
                .or_default()
                .insert(cluster.cluster_id);
        }
    }
    let flatten = |m: BTreeMap<String, BTreeSet<usize>>| {
        m.into_iter()
            .map(|(k, v)| (k, v.into_iter().collect::<Vec<_>>()))
            .collect()
    };
    (flatten(by_marketplace), flatten(by_filename))
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A report plus the lookup maps queries need, built in one O(n) pass.
#[derive(Debug)]
pub struct LoadedReport {
    pub report: Report,
    cluster_pos: HashMap<usize, usize>,
    /// True when the file table was rebuilt from a v1.0 artifact and only
    /// covers clustered files.
    pub partial_file_table: bool,
}

impl LoadedReport {
    pub fn cluster(&self, cluster_id: usize) -> Option<&Cluster> {
        self.cluster_pos
            .get(&cluster_id)
            .map(|&pos| &self.report.clusters[pos])
    }

    pub fn cluster_for_file(&self, file: &FileRecord) -> Option<&Cluster> {
        file.cluster_id.and_then(|id| self.cluster(id))
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.report.file_index
    }
}

/// Serialize and write atomically: temp file next to the destination, then
/// rename, so a failed write leaves any prior report intact.
pub fn save(report: &Report, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes()).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Parse, version-check, backfill v1.0 gaps, validate every invariant, and
/// build lookup maps. Any inconsistency is fatal; nothing is repaired.
pub fn load(path: &Path) -> Result<LoadedReport> {
    let s =
        std::fs::read_to_string(path).with_context(|| format!("read report: {}", path.display()))?;
    let mut report: Report =
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;

    let major = report
        .metadata
        .version
        .split('.')
        .next()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    if major > 2 {
        bail!(
            "report schema version {} is newer than supported ({})",
            report.metadata.version,
            SCHEMA_VERSION
        );
    }

    // v1.0 backfill: members from locations, file table from clusters,
    // indices from clusters.
    for cluster in &mut report.clusters {
        if cluster.members.is_empty() {
            cluster.members = cluster.locations.iter().map(|l| l.file_index).collect();
        }
    }
    let mut partial_file_table = false;
    if report.file_index.is_empty() && !report.clusters.is_empty() {
        partial_file_table = true;
        let mut rebuilt: BTreeMap<usize, FileRecord> = BTreeMap::new();
        for cluster in &report.clusters {
            for loc in &cluster.locations {
                rebuilt.insert(
                    loc.file_index,
                    FileRecord {
                        file_index: loc.file_index,
                        marketplace: loc.marketplace.clone(),
                        plugin: loc.plugin.clone(),
                        path: loc.path.clone(),
                        filename: basename(&loc.path).to_string(),
                        is_official: loc.is_official,
                        cluster_id: Some(cluster.cluster_id),
                        in_cluster: true,
                    },
                );
            }
        }
        report.file_index = rebuilt.into_values().collect();
    }
    let (marketplace_index, filename_index) = compute_indices(&report.clusters);
    if report.marketplace_index.is_empty() && report.filename_index.is_empty() {
        report.marketplace_index = marketplace_index;
        report.filename_index = filename_index;
    } else if report.marketplace_index != marketplace_index
        || report.filename_index != filename_index
    {
        bail!("report indices do not match the cluster table");
    }

    validate(&report, partial_file_table)?;

    let cluster_pos = report
        .clusters
        .iter()
        .enumerate()
        .map(|(pos, c)| (c.cluster_id, pos))
        .collect();
    Ok(LoadedReport {
        report,
        cluster_pos,
        partial_file_table,
    })
}

fn validate(report: &Report, partial_file_table: bool) -> Result<()> {
    let by_index: HashMap<usize, &FileRecord> = report
        .file_index
        .iter()
        .map(|f| (f.file_index, f))
        .collect();
    if by_index.len() != report.file_index.len() {
        bail!("duplicate file_index in file table");
    }

    let mut seen_clusters: BTreeSet<usize> = BTreeSet::new();
    let mut seen_members: BTreeSet<usize> = BTreeSet::new();
    for cluster in &report.clusters {
        if !seen_clusters.insert(cluster.cluster_id) {
            bail!("duplicate cluster id {}", cluster.cluster_id);
        }
        if cluster.size < 2 {
            bail!("cluster {} has size {} (< 2)", cluster.cluster_id, cluster.size);
        }
        if cluster.members.len() != cluster.size || cluster.locations.len() != cluster.size {
            bail!("cluster {} size does not match its members", cluster.cluster_id);
        }
        if !cluster.members.windows(2).all(|w| w[0] < w[1]) {
            bail!("cluster {} members are not strictly ascending", cluster.cluster_id);
        }
        for &member in &cluster.members {
            if !seen_members.insert(member) {
                bail!("file {} appears in more than one cluster", member);
            }
            let file = by_index.get(&member).ok_or_else(|| {
                anyhow::anyhow!(
                    "cluster {} references unknown file {}",
                    cluster.cluster_id,
                    member
                )
            })?;
            if file.cluster_id != Some(cluster.cluster_id) {
                bail!(
                    "file {} does not point back at cluster {}",
                    member,
                    cluster.cluster_id
                );
            }
        }
        let member_set: BTreeSet<usize> = cluster.members.iter().copied().collect();
        for pair in &cluster.similarity_pairs {
            if !member_set.contains(&pair.file1_index) || !member_set.contains(&pair.file2_index) {
                bail!(
                    "cluster {} records a similarity pair outside its members",
                    cluster.cluster_id
                );
            }
            if pair.similarity < report.metadata.similarity_threshold {
                bail!(
                    "cluster {} records a pair below the similarity threshold",
                    cluster.cluster_id
                );
            }
        }
    }

    for file in &report.file_index {
        if file.in_cluster != file.cluster_id.is_some() {
            bail!("file {} in_cluster flag contradicts cluster_id", file.file_index);
        }
        match file.cluster_id {
            Some(id) if !seen_members.contains(&file.file_index) => {
                bail!("file {} claims cluster {} but is not a member", file.file_index, id)
            }
            None if seen_members.contains(&file.file_index) => {
                bail!("file {} is a cluster member but claims none", file.file_index)
            }
            _ => {}
        }
    }

    // Summary arithmetic only checks out against a complete file table.
    if !partial_file_table {
        let s = &report.summary;
        if s.files_in_clusters + s.unclustered_files != s.total_files_scanned {
            bail!("summary file counts do not add up");
        }
        if s.unique_clusters != report.clusters.len() {
            bail!("summary cluster count does not match the cluster table");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_index: usize, marketplace: &str, path: &str, cluster_id: Option<usize>) -> FileRecord {
        FileRecord {
            file_index,
            marketplace: marketplace.to_string(),
            plugin: "p1".to_string(),
            path: path.to_string(),
            filename: basename(path).to_string(),
            is_official: false,
            cluster_id,
            in_cluster: cluster_id.is_some(),
        }
    }

    fn location(f: &FileRecord) -> Location {
        Location {
            file_index: f.file_index,
            marketplace: f.marketplace.clone(),
            plugin: f.plugin.clone(),
            path: f.path.clone(),
            is_official: f.is_official,
        }
    }

    fn two_file_report() -> Report {
        let files = vec![
            record(0, "mA", "p1/x.md", Some(0)),
            record(1, "mB", "p1/x.md", Some(0)),
            record(2, "mB", "p1/solo.md", None),
        ];
        let cluster = Cluster {
            cluster_id: 0,
            kind: ClusterKind::CrossMarketplace,
            size: 2,
            avg_similarity: 1.0,
            has_official: false,
            marketplaces: vec!["mA".to_string(), "mB".to_string()],
            members: vec![0, 1],
            locations: vec![location(&files[0]), location(&files[1])],
            similarity_pairs: vec![SimilarityPair {
                file1_index: 0,
                file2_index: 1,
                similarity: 1.0,
            }],
        };
        let (marketplace_index, filename_index) = compute_indices(std::slice::from_ref(&cluster));
        Report {
            metadata: Metadata {
                version: SCHEMA_VERSION.to_string(),
                generated_at: "2025-06-01T00:00:00Z".to_string(),
                similarity_threshold: 0.7,
                num_permutations: 128,
                shingle_size: 3,
                lsh_bands: 21,
                lsh_rows: 6,
                confidence: Confidence::High,
                warnings: Vec::new(),
            },
            summary: Summary {
                total_files_scanned: 3,
                files_in_clusters: 2,
                unclustered_files: 1,
                unique_clusters: 1,
                unique_marketplaces: 2,
                by_type: BTreeMap::from([(
                    "cross-marketplace".to_string(),
                    TypeStats { clusters: 1, files: 2 },
                )]),
            },
            file_index: files,
            marketplace_index,
            filename_index,
            clusters: vec![cluster],
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("librarian_report_tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn save_then_load_roundtrip() {
        let report = two_file_report();
        let path = temp_path("roundtrip.json");
        save(&report, &path).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.report.metadata.version, SCHEMA_VERSION);
        assert_eq!(loaded.report.file_index.len(), 3);
        assert_eq!(loaded.report.clusters.len(), 1);
        assert_eq!(loaded.report.marketplace_index["mA"], vec![0]);
        assert_eq!(loaded.report.filename_index["x.md"], vec![0]);
        assert!(!loaded.partial_file_table);
        let f = &loaded.report.file_index[0];
        assert_eq!(loaded.cluster_for_file(f).unwrap().cluster_id, 0);
    }

    #[test]
    fn load_rejects_member_mismatch() {
        let mut report = two_file_report();
        report.file_index[1].cluster_id = None;
        report.file_index[1].in_cluster = false;
        let path = temp_path("mismatch.json");
        save(&report, &path).unwrap();
        let r = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(r.is_err());
    }

    #[test]
    fn load_rejects_singleton_cluster() {
        let mut report = two_file_report();
        report.clusters[0].size = 1;
        report.clusters[0].members = vec![0];
        report.clusters[0].locations.truncate(1);
        report.clusters[0].similarity_pairs.clear();
        report.file_index[1].cluster_id = None;
        report.file_index[1].in_cluster = false;
        let path = temp_path("singleton.json");
        save(&report, &path).unwrap();
        let r = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(r.is_err());
    }

    #[test]
    fn load_rejects_bad_summary_arithmetic() {
        let mut report = two_file_report();
        report.summary.unclustered_files = 5;
        let path = temp_path("summary.json");
        save(&report, &path).unwrap();
        let r = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(r.is_err());
    }

    #[test]
    fn load_rejects_tampered_index() {
        let mut report = two_file_report();
        report.marketplace_index.insert("ghost".to_string(), vec![0]);
        let path = temp_path("tampered.json");
        save(&report, &path).unwrap();
        let r = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(r.is_err());
    }

    #[test]
    fn load_rejects_newer_schema() {
        let mut report = two_file_report();
        report.metadata.version = "3.0".to_string();
        let path = temp_path("newer.json");
        save(&report, &path).unwrap();
        let r = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(r.is_err());
        assert!(r.unwrap_err().to_string().contains("newer than supported"));
    }

    #[test]
    fn load_tolerates_v1_artifact() {
        // v1.0: no metadata, no file_index, no name indices, no members.
        let mut report = two_file_report();
        report.clusters[0].members.clear();
        let v1 = serde_json::json!({
            "summary": report.summary,
            "clusters": report.clusters,
        });
        let path = temp_path("v1.json");
        std::fs::write(&path, serde_json::to_string_pretty(&v1).unwrap()).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(loaded.partial_file_table);
        assert_eq!(loaded.report.metadata.version, "1.0");
        assert_eq!(loaded.report.metadata.confidence, Confidence::Unknown);
        assert!(loaded.report.metadata.warnings.is_empty());
        assert_eq!(loaded.report.clusters[0].members, vec![0, 1]);
        assert_eq!(loaded.report.file_index.len(), 2);
        assert_eq!(loaded.report.marketplace_index["mB"], vec![0]);
    }

    #[test]
    fn save_is_atomic_under_existing_report() {
        let report = two_file_report();
        let path = temp_path("atomic.json");
        save(&report, &path).unwrap();
        // a second save replaces, never truncates in place
        save(&report, &path).unwrap();
        assert!(load(&path).is_ok());
        assert!(!path.with_extension("json.tmp").exists());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn confidence_ladder_floors_at_none() {
        assert_eq!(Confidence::High.downgraded(), Confidence::Medium);
        assert_eq!(Confidence::Medium.downgraded(), Confidence::Low);
        assert_eq!(Confidence::Low.downgraded(), Confidence::None);
        assert_eq!(Confidence::None.downgraded(), Confidence::None);
    }
}
