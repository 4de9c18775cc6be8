//! Banded LSH index over MinHash signatures.
//!
//! Signatures are split into `bands` bands of `rows` elements; two files are
//! candidate neighbors when any band matches exactly. At Jaccard similarity
//! `s` the collision probability follows the S-curve `1 - (1 - s^r)^b`, so
//! `(b, r)` are picked to put the curve's knee at the configured threshold.

use std::collections::{BTreeSet, HashMap};
use xxhash_rust::xxh64::xxh64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    pub bands: usize,
    pub rows: usize,
}

impl LshParams {
    /// Probability of at least one band collision at similarity `s`.
    pub fn collision_probability(&self, s: f64) -> f64 {
        1.0 - (1.0 - s.powi(self.rows as i32)).powi(self.bands as i32)
    }

    /// Candidate tunings must keep the collision probability at the
    /// threshold itself at or above this floor. Missed pairs are silent
    /// product failures; extra candidates only cost post-filter work.
    const MIN_THRESHOLD_RECALL: f64 = 0.9;

    /// Choose `(bands, rows)` with `bands * rows <= num_permutations`:
    /// among tunings with `p(threshold) >= MIN_THRESHOLD_RECALL`, minimize
    /// the equal-weighted sum of the false-positive integral below
    /// `threshold` and the false-negative integral above it. For `P = 128`,
    /// `t = 0.70` this lands on `b = 21, r = 6`.
    pub fn choose(num_permutations: usize, threshold: f64) -> Self {
        let mut best = LshParams {
            bands: num_permutations,
            rows: 1,
        };
        let mut best_cost = f64::INFINITY;
        for rows in 1..=num_permutations {
            let bands = num_permutations / rows;
            if bands == 0 {
                break;
            }
            let candidate = LshParams { bands, rows };
            if candidate.collision_probability(threshold) < Self::MIN_THRESHOLD_RECALL {
                continue;
            }
            let mut cost = 0.0;
            let step = 0.01;
            let mut x = 0.0;
            while x < 1.0 {
                let mid = x + step / 2.0;
                let p = candidate.collision_probability(mid);
                if mid < threshold {
                    cost += p * step; // false positive mass
                } else {
                    cost += (1.0 - p) * step; // false negative mass
                }
                x += step;
            }
            if cost < best_cost {
                best_cost = cost;
                best = candidate;
            }
        }
        best
    }
}

/// Append-only band index: `bands` maps from hashed band contents to the
/// files whose signature matched that band.
pub struct LshIndex {
    params: LshParams,
    buckets: Vec<HashMap<u64, Vec<usize>>>,
}

impl LshIndex {
    pub fn new(params: LshParams) -> Self {
        let buckets = (0..params.bands).map(|_| HashMap::new()).collect();
        Self { params, buckets }
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    fn band_hash(&self, signature: &[u32], band: usize) -> u64 {
        let start = band * self.params.rows;
        let slice = &signature[start..start + self.params.rows];
        let mut bytes = Vec::with_capacity(slice.len() * 4);
        for v in slice {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        // band index as hash seed keeps equal content in different bands apart
        xxh64(&bytes, band as u64)
    }

    /// Insert a file's signature. Idempotent on identical input; uniqueness
    /// of `file_index` is the caller's responsibility.
    pub fn insert(&mut self, file_index: usize, signature: &[u32]) {
        debug_assert!(signature.len() >= self.params.bands * self.params.rows);
        for band in 0..self.params.bands {
            let key = self.band_hash(signature, band);
            let ids = self.buckets[band].entry(key).or_default();
            if !ids.contains(&file_index) {
                ids.push(file_index);
            }
        }
    }

    /// Every indexed file colliding with `signature` in at least one band,
    /// the queried file itself included when indexed. Candidates only: the
    /// caller re-thresholds on estimated similarity.
    pub fn query(&self, signature: &[u32]) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for band in 0..self.params.bands {
            let key = self.band_hash(signature, band);
            if let Some(ids) = self.buckets[band].get(&key) {
                out.extend(ids.iter().copied());
            }
        }
        out
    }
}
