//! Deterministic weighted Louvain community detection.
//!
//! Greedy modularity maximization in two repeated phases: local node moves
//! in fixed index order until no positive gain remains, then aggregation
//! of communities into super-nodes. Node and candidate order are fixed, so
//! results are reproducible across runs without a seed.

use std::collections::HashMap;

use super::CommunityError;

/// A component subgraph in adjacency-list form, ready for community
/// detection. Node ids are local (0..n); self-loops are tracked apart from
/// the adjacency lists.
#[derive(Debug, Clone)]
pub struct Subgraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    loops: Vec<f64>,
}

impl Subgraph {
    /// Create a subgraph with `n` isolated nodes.
    pub fn with_nodes(n: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); n],
            loops: vec![0.0; n],
        }
    }

    /// Add an undirected weighted edge. A self-edge accumulates as a loop.
    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if a == b {
            self.loops[a] += weight;
        } else {
            self.adjacency[a].push((b, weight));
            self.adjacency[b].push((a, weight));
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Weighted degree per node (loops count twice, per convention).
    fn degrees(&self) -> Vec<f64> {
        (0..self.adjacency.len())
            .map(|i| {
                self.adjacency[i].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self.loops[i]
            })
            .collect()
    }
}

/// Louvain-style modularity-maximizing community detector.
#[derive(Debug, Clone)]
pub struct Louvain {
    /// Cap on local-move/aggregate rounds; the algorithm normally reaches
    /// a fixed point much earlier.
    pub max_levels: usize,
}

impl Default for Louvain {
    fn default() -> Self {
        Self { max_levels: 32 }
    }
}

impl super::CommunityDetector for Louvain {
    fn detect(&self, subgraph: &Subgraph, resolution: f64) -> Result<Vec<usize>, CommunityError> {
        louvain_communities(subgraph, resolution, self.max_levels)
    }
}

/// Run Louvain on a subgraph. Returns a contiguous community id in
/// `0..num_communities` for each local node.
pub fn louvain_communities(
    subgraph: &Subgraph,
    resolution: f64,
    max_levels: usize,
) -> Result<Vec<usize>, CommunityError> {
    let n = subgraph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut adjacency = subgraph.adjacency.clone();
    let mut loops = subgraph.loops.clone();
    let mut mapping: Vec<usize> = (0..n).collect();

    for _ in 0..max_levels {
        let degrees: Vec<f64> = (0..adjacency.len())
            .map(|i| adjacency[i].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * loops[i])
            .collect();
        let two_m: f64 = degrees.iter().sum();
        if !two_m.is_finite() || two_m <= 0.0 {
            return Err(CommunityError::DegenerateWeights {
                total_weight: two_m / 2.0,
            });
        }

        let (node_to_com, moved) = one_level(&adjacency, &degrees, two_m, resolution);
        let (renumbered, num_communities) = renumber(&node_to_com);
        for entry in mapping.iter_mut() {
            *entry = renumbered[*entry];
        }

        if !moved || num_communities == adjacency.len() {
            break;
        }
        (adjacency, loops) = aggregate(&adjacency, &loops, &renumbered, num_communities);
    }

    Ok(mapping)
}

/// Local moving phase: sweep nodes in index order, greedily moving each to
/// the neighboring community with the highest modularity gain, until a
/// full sweep makes no move. Returns the community per node and whether
/// any move happened at all.
fn one_level(
    adjacency: &[Vec<(usize, f64)>],
    degrees: &[f64],
    two_m: f64,
    resolution: f64,
) -> (Vec<usize>, bool) {
    let n = adjacency.len();
    let mut node_to_com: Vec<usize> = (0..n).collect();
    let mut com_tot: Vec<f64> = degrees.to_vec();
    let mut moved_any = false;
    let mut improved = true;

    while improved {
        improved = false;
        for node in 0..n {
            let com = node_to_com[node];

            // Edge weight from this node into each neighboring community.
            let mut neighbor_coms: HashMap<usize, f64> = HashMap::new();
            for &(neighbor, weight) in &adjacency[node] {
                *neighbor_coms.entry(node_to_com[neighbor]).or_insert(0.0) += weight;
            }

            com_tot[com] -= degrees[node];
            let own_weight = neighbor_coms.get(&com).copied().unwrap_or(0.0);
            let mut best_com = com;
            let mut best_gain = own_weight - resolution * com_tot[com] * degrees[node] / two_m;

            // Sorted candidate order keeps ties deterministic.
            let mut candidates: Vec<(usize, f64)> = neighbor_coms.into_iter().collect();
            candidates.sort_by_key(|&(candidate, _)| candidate);
            for (candidate, weight) in candidates {
                if candidate == com {
                    continue;
                }
                let gain =
                    weight - resolution * com_tot[candidate] * degrees[node] / two_m;
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    best_com = candidate;
                }
            }

            com_tot[best_com] += degrees[node];
            if best_com != com {
                node_to_com[node] = best_com;
                improved = true;
                moved_any = true;
            }
        }
    }

    (node_to_com, moved_any)
}

/// Relabel communities to contiguous ids in order of first appearance.
fn renumber(node_to_com: &[usize]) -> (Vec<usize>, usize) {
    let mut relabel: HashMap<usize, usize> = HashMap::new();
    let mut next = 0usize;
    let renumbered = node_to_com
        .iter()
        .map(|&com| {
            *relabel.entry(com).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            })
        })
        .collect();
    (renumbered, next)
}

/// Aggregation phase: collapse each community into a super-node. Internal
/// edge weight becomes the super-node's loop; inter-community weights are
/// summed.
fn aggregate(
    adjacency: &[Vec<(usize, f64)>],
    loops: &[f64],
    node_to_com: &[usize],
    num_communities: usize,
) -> (Vec<Vec<(usize, f64)>>, Vec<f64>) {
    let mut new_loops = vec![0.0; num_communities];
    let mut between: HashMap<(usize, usize), f64> = HashMap::new();

    for node in 0..adjacency.len() {
        new_loops[node_to_com[node]] += loops[node];
        for &(neighbor, weight) in &adjacency[node] {
            if neighbor < node {
                continue; // each undirected edge once
            }
            let (a, b) = (node_to_com[node], node_to_com[neighbor]);
            if a == b {
                new_loops[a] += weight;
            } else {
                *between.entry((a.min(b), a.max(b))).or_insert(0.0) += weight;
            }
        }
    }

    let mut new_adjacency = vec![Vec::new(); num_communities];
    let mut pairs: Vec<((usize, usize), f64)> = between.into_iter().collect();
    pairs.sort_by_key(|&(pair, _)| pair);
    for ((a, b), weight) in pairs {
        new_adjacency[a].push((b, weight));
        new_adjacency[b].push((a, weight));
    }

    (new_adjacency, new_loops)
}
