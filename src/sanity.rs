//! Sanity rules over aggregate scan statistics.
//!
//! The most dangerous failure mode is a report that quietly says "no
//! duplicates" when the index lost them. These rules turn statistically
//! implausible outcomes into visible warnings and a downgraded confidence
//! label instead of reassuring numbers.

use crate::config::SanityConfig;
use crate::report::{Cluster, Confidence, FileRecord, Summary};
use std::collections::{BTreeMap, BTreeSet};

pub struct SanityOutcome {
    pub warnings: Vec<String>,
    pub confidence: Confidence,
}

/// Apply every rule; each one that fires appends a warning and steps the
/// confidence label down one level (floor `none`). No clusters on a
/// non-trivial dataset goes straight to `none`.
pub fn check(
    summary: &Summary,
    files: &[FileRecord],
    clusters: &[Cluster],
    cfg: &SanityConfig,
) -> SanityOutcome {
    let mut warnings = Vec::new();
    let mut confidence = Confidence::High;
    let total = summary.total_files_scanned;

    // 1. A large marketplace with zero cluster membership.
    if summary.unique_clusters > 0 && total > 0 {
        let mut per_marketplace: BTreeMap<&str, usize> = BTreeMap::new();
        for f in files {
            *per_marketplace.entry(f.marketplace.as_str()).or_default() += 1;
        }
        let clustered: BTreeSet<&str> = clusters
            .iter()
            .flat_map(|c| c.marketplaces.iter().map(String::as_str))
            .collect();
        let hold_all = summary.unique_clusters > cfg.large_cluster_count;
        for (marketplace, count) in per_marketplace {
            let fraction = count as f64 / total as f64;
            let large = count >= cfg.zero_membership_min_files
                && fraction >= cfg.significant_marketplace_fraction;
            if (large || hold_all) && !clustered.contains(marketplace) {
                warnings.push(format!(
                    "marketplace '{}' holds {} of {} files but appears in no cluster",
                    marketplace, count, total
                ));
                confidence = confidence.downgraded();
            }
        }
    }

    // 2. Extreme clustered ratio on a large dataset.
    if total > cfg.extreme_ratio_min_files {
        let ratio = summary.files_in_clusters as f64 / total as f64;
        if ratio < cfg.extreme_ratio_low || ratio > cfg.extreme_ratio_high {
            warnings.push(format!(
                "clustered ratio {:.3} is extreme for {} files; the index may be mistuned",
                ratio, total
            ));
            confidence = confidence.downgraded();
        }
    }

    // 3. Near-50/50 split with no mid-sized clusters, a shape real corpora
    // rarely produce.
    if total > cfg.split_min_files {
        let ratio = summary.files_in_clusters as f64 / total as f64;
        let has_intermediate = clusters.iter().any(|c| (3..=10).contains(&c.size));
        if ratio >= cfg.split_band_low && ratio <= cfg.split_band_high && !has_intermediate {
            warnings.push(format!(
                "clustered ratio {:.3} sits in a suspicious 50/50 band with no intermediate cluster sizes",
                ratio
            ));
            confidence = confidence.downgraded();
        }
    }

    // 4. No clusters at all on a non-trivial dataset.
    if total >= cfg.nontrivial_min_files && summary.unique_clusters == 0 {
        warnings.push(format!(
            "no clusters found across {} files; duplicates may have been missed entirely",
            total
        ));
        confidence = Confidence::None;
    }

    SanityOutcome {
        warnings,
        confidence,
    }
}
