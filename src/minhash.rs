//! MinHash signatures: fixed-width Jaccard sketches of shingle sets.

use anyhow::Result;
use std::collections::HashSet;
use xxhash_rust::xxh64::xxh64;

/// Permutation family for MinHash. Coefficients are drawn from a splitmix64
/// stream seeded by configuration, so the same seed always yields the same
/// signatures (reports are reproducible across runs).
pub struct MinHasher {
    seed: u64,
    coeffs: Vec<(u64, u64)>,
}

impl MinHasher {
    pub fn new(num_permutations: usize, seed: u64) -> Self {
        let mut state = seed;
        let coeffs = (0..num_permutations)
            .map(|_| {
                // odd multiplier keeps the map a bijection on u64
                let a = splitmix64(&mut state) | 1;
                let b = splitmix64(&mut state);
                (a, b)
            })
            .collect();
        Self { seed, coeffs }
    }

    /// Signature element i is the minimum over shingles of permutation i
    /// applied to the shingle's base hash. An empty shingle set is a caller
    /// bug (the tokenizer guarantees non-empty sets) and is refused.
    pub fn signature(&self, shingles: &HashSet<String>) -> Result<Vec<u32>> {
        if shingles.is_empty() {
            anyhow::bail!("cannot build a MinHash signature from an empty shingle set");
        }
        let bases: Vec<u64> = shingles
            .iter()
            .map(|s| xxh64(s.as_bytes(), self.seed))
            .collect();
        let sig = self
            .coeffs
            .iter()
            .map(|&(a, b)| {
                bases
                    .iter()
                    .map(|&x| (a.wrapping_mul(x).wrapping_add(b) >> 32) as u32)
                    .min()
                    .unwrap_or(u32::MAX)
            })
            .collect();
        Ok(sig)
    }
}

/// Fraction of matching positions: an unbiased estimate of the Jaccard
/// similarity of the underlying shingle sets.
pub fn estimated_similarity(a: &[u32], b: &[u32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let matching = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / a.len() as f64
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
