//! Cluster assembly: LSH candidates, pruned similarity edges, disjoint
//! clusters via union-find.

use crate::lsh::LshIndex;
use crate::minhash;
use crate::report::{Cluster, ClusterKind, FileRecord, Location, SimilarityPair};
use std::collections::BTreeMap;

/// Union-Find for grouping file indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }
    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            self.parent[i] = self.find(self.parent[i]);
        }
        self.parent[i]
    }
    fn union(&mut self, i: usize, j: usize) {
        let pi = self.find(i);
        let pj = self.find(j);
        if pi != pj {
            self.parent[pi] = pj;
        }
    }
}

/// Build the cluster table and write `cluster_id` back into `files`.
///
/// Every LSH candidate pair is re-checked against the estimated similarity
/// before it may join files: candidates below `threshold` are band-collision
/// noise and are dropped. Clusters are the connected components of the
/// retained edges with size >= 2; files whose candidate set prunes down to
/// themselves stay unclustered.
pub fn build_clusters(
    files: &mut [FileRecord],
    signatures: &[Vec<u32>],
    index: &LshIndex,
    threshold: f64,
    scaffold_min_size: usize,
) -> Vec<Cluster> {
    debug_assert_eq!(files.len(), signatures.len());
    debug_assert!(files.iter().enumerate().all(|(i, f)| f.file_index == i));
    let n = files.len();
    let mut uf = UnionFind::new(n);
    // (i, j) with i < j -> estimated similarity; BTreeMap keeps edge
    // enumeration deterministic for a given file order
    let mut edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for i in 0..n {
        for j in index.query(&signatures[i]) {
            if j == i {
                continue;
            }
            let pair = if i < j { (i, j) } else { (j, i) };
            if edges.contains_key(&pair) {
                continue;
            }
            let similarity =
                minhash::estimated_similarity(&signatures[pair.0], &signatures[pair.1]);
            if similarity >= threshold {
                edges.insert(pair, similarity);
                uf.union(pair.0, pair.1);
            }
        }
    }

    // components keyed by root; members come out ascending because 0..n is
    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        components.entry(uf.find(i)).or_default().push(i);
    }
    let mut member_sets: Vec<Vec<usize>> = components
        .into_values()
        .filter(|members| members.len() >= 2)
        .collect();
    // cluster ids allocated in order of the smallest member file_index
    member_sets.sort_by_key(|members| members[0]);

    let mut clusters = Vec::with_capacity(member_sets.len());
    for (cluster_id, members) in member_sets.into_iter().enumerate() {
        let similarity_pairs: Vec<SimilarityPair> = edges
            .iter()
            .filter(|((a, b), _)| {
                members.binary_search(a).is_ok() && members.binary_search(b).is_ok()
            })
            .map(|(&(a, b), &similarity)| SimilarityPair {
                file1_index: a,
                file2_index: b,
                similarity,
            })
            .collect();
        let avg_similarity = similarity_pairs.iter().map(|p| p.similarity).sum::<f64>()
            / similarity_pairs.len() as f64;

        let marketplaces: Vec<String> = {
            let mut names: Vec<String> = members
                .iter()
                .map(|&m| files[m].marketplace.clone())
                .collect();
            names.sort();
            names.dedup();
            names
        };
        let has_official = members.iter().any(|&m| files[m].is_official);
        let same_basename = members
            .windows(2)
            .all(|w| files[w[0]].filename == files[w[1]].filename);
        let kind = if members.len() >= scaffold_min_size && same_basename {
            ClusterKind::Scaffold
        } else if marketplaces.len() >= 2 {
            ClusterKind::CrossMarketplace
        } else {
            ClusterKind::Internal
        };

        let locations: Vec<Location> = members
            .iter()
            .map(|&m| {
                let f = &files[m];
                Location {
                    file_index: f.file_index,
                    marketplace: f.marketplace.clone(),
                    plugin: f.plugin.clone(),
                    path: f.path.clone(),
                    is_official: f.is_official,
                }
            })
            .collect();

        for &m in &members {
            files[m].cluster_id = Some(cluster_id);
            files[m].in_cluster = true;
        }

        clusters.push(Cluster {
            cluster_id,
            kind,
            size: members.len(),
            avg_similarity,
            has_official,
            marketplaces,
            members,
            locations,
            similarity_pairs,
        });
    }
    clusters
}
