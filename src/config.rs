//! Load and validate librarian.yaml (scan and sanity tuning knobs).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Seed for MinHash permutation coefficients. Stable across runs so identical
/// corpora produce identical reports.
pub const DEFAULT_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Jaccard threshold for two files to count as near-duplicates.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// MinHash signature width.
    #[serde(default = "default_num_permutations")]
    pub num_permutations: usize,
    /// Words per shingle.
    #[serde(default = "default_shingle_size")]
    pub shingle_size: usize,
    /// Files shorter than this many characters are skipped.
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
    /// Same-basename clusters at or above this size are tagged scaffold.
    #[serde(default = "default_scaffold_min_size")]
    pub scaffold_min_size: usize,
    /// Marketplace name prefixes treated as official.
    #[serde(default = "default_official_prefixes")]
    pub official_prefixes: Vec<String>,
    /// File extensions included in a scan.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_seed")]
    pub minhash_seed: u64,
    #[serde(default)]
    pub sanity: SanityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanityConfig {
    /// A marketplace holding at least this fraction of all files is "large".
    #[serde(default = "default_significant_marketplace_fraction")]
    pub significant_marketplace_fraction: f64,
    /// A marketplace below this file count is never "large", whatever its
    /// fraction; small corpora make every marketplace a big fraction.
    #[serde(default = "default_zero_membership_min_files")]
    pub zero_membership_min_files: usize,
    /// Above this many clusters, every marketplace is held to the
    /// zero-membership rule regardless of its size.
    #[serde(default = "default_large_cluster_count")]
    pub large_cluster_count: usize,
    /// Extreme-ratio rule only applies past this many scanned files.
    #[serde(default = "default_extreme_ratio_min_files")]
    pub extreme_ratio_min_files: usize,
    #[serde(default = "default_extreme_ratio_low")]
    pub extreme_ratio_low: f64,
    #[serde(default = "default_extreme_ratio_high")]
    pub extreme_ratio_high: f64,
    /// Near-50/50 rule only applies past this many scanned files.
    #[serde(default = "default_split_min_files")]
    pub split_min_files: usize,
    #[serde(default = "default_split_band_low")]
    pub split_band_low: f64,
    #[serde(default = "default_split_band_high")]
    pub split_band_high: f64,
    /// Datasets below this size are too small for the no-clusters rule.
    #[serde(default = "default_nontrivial_min_files")]
    pub nontrivial_min_files: usize,
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_num_permutations() -> usize {
    128
}
fn default_shingle_size() -> usize {
    3
}
fn default_min_content_len() -> usize {
    100
}
fn default_scaffold_min_size() -> usize {
    20
}
fn default_official_prefixes() -> Vec<String> {
    vec!["official".to_string()]
}
fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_significant_marketplace_fraction() -> f64 {
    0.10
}
fn default_zero_membership_min_files() -> usize {
    50
}
fn default_large_cluster_count() -> usize {
    1000
}
fn default_extreme_ratio_min_files() -> usize {
    500
}
fn default_extreme_ratio_low() -> f64 {
    0.05
}
fn default_extreme_ratio_high() -> f64 {
    0.95
}
fn default_split_min_files() -> usize {
    100
}
fn default_split_band_low() -> f64 {
    0.45
}
fn default_split_band_high() -> f64 {
    0.55
}
fn default_nontrivial_min_files() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            num_permutations: default_num_permutations(),
            shingle_size: default_shingle_size(),
            min_content_len: default_min_content_len(),
            scaffold_min_size: default_scaffold_min_size(),
            official_prefixes: default_official_prefixes(),
            extensions: default_extensions(),
            minhash_seed: default_seed(),
            sanity: SanityConfig::default(),
        }
    }
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            significant_marketplace_fraction: default_significant_marketplace_fraction(),
            zero_membership_min_files: default_zero_membership_min_files(),
            large_cluster_count: default_large_cluster_count(),
            extreme_ratio_min_files: default_extreme_ratio_min_files(),
            extreme_ratio_low: default_extreme_ratio_low(),
            extreme_ratio_high: default_extreme_ratio_high(),
            split_min_files: default_split_min_files(),
            split_band_low: default_split_band_low(),
            split_band_high: default_split_band_high(),
            nontrivial_min_files: default_nontrivial_min_files(),
        }
    }
}

impl Config {
    /// True when `marketplace` matches the configured official prefixes.
    pub fn is_official(&self, marketplace: &str) -> bool {
        let lower = marketplace.to_lowercase();
        self.official_prefixes
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
    }

    fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            anyhow::bail!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            );
        }
        if self.num_permutations == 0 {
            anyhow::bail!("num_permutations must be positive");
        }
        if self.shingle_size == 0 {
            anyhow::bail!("shingle_size must be positive");
        }
        Ok(())
    }
}

/// Load config from `path` if it exists, else defaults. Validates ranges.
pub fn load(path: &Path) -> Result<Config> {
    let config = if path.is_file() {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        serde_yaml::from_str(&s).with_context(|| format!("parse {}", path.display()))?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}
