//! Community Solver and Partition Reporter.
//!
//! Runs modularity-based detection independently on each main component,
//! remaps local community ids into one global namespace through a running
//! offset, and assigns the misc sentinel to every node from an undersized
//! component. The reporter computes connectivity statistics and persists
//! the partition artifact.

pub mod louvain;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use miette::Diagnostic;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use thiserror::Error;

use crate::artifact::{PartitionArtifact, PartitionStats};
use crate::graph::{ComponentSplit, WeightedGraph};

pub use louvain::{Louvain, Subgraph};

/// Sentinel community id for nodes outside any main component.
pub const MISC_COMMUNITY_ID: i64 = -1;

/// Node-id to community-id mapping; [`MISC_COMMUNITY_ID`] marks the misc
/// container.
pub type Partition = HashMap<String, i64>;

/// Errors from community solving and reporting.
#[derive(Debug, Error, Diagnostic)]
pub enum CommunityError {
    #[error("degenerate edge weights: total weight {total_weight}")]
    #[diagnostic(
        code(polyvis::community::degenerate_weights),
        help(
            "Modularity is undefined when a component's total edge weight is zero \
             or non-finite. Check the confidence and veracity columns in the edge \
             store."
        )
    )]
    DegenerateWeights { total_weight: f64 },

    #[error("failed to write partition artifact to {path}: {message}")]
    #[diagnostic(
        code(polyvis::community::save_failed),
        help("Check directory permissions and disk space.")
    )]
    SaveFailed { path: String, message: String },
}

/// Community detection over one component subgraph.
///
/// A seam between the solver's offset fold and the detection algorithm, so
/// per-component failure handling can be exercised independently of
/// Louvain itself.
pub trait CommunityDetector {
    /// Local community id per subgraph node, contiguous from 0.
    fn detect(&self, subgraph: &Subgraph, resolution: f64) -> Result<Vec<usize>, CommunityError>;
}

/// Solve the global partition.
///
/// Misc nodes get the sentinel first; main components are then folded in
/// descending-size order with an explicit running offset, so community ids
/// assigned within different components never collide. A component whose
/// detector fails is collapsed into one fresh community id and the fold
/// continues; one bad component never aborts the run.
pub fn solve<D: CommunityDetector>(
    graph: &WeightedGraph,
    split: &ComponentSplit,
    detector: &D,
    resolution: f64,
) -> Partition {
    let mut partition = Partition::new();

    for &node in &split.misc {
        partition.insert(graph.name(node).to_string(), MISC_COMMUNITY_ID);
    }

    let mut offset: i64 = 0;
    for (index, members) in split.main.iter().enumerate() {
        let subgraph = induce_subgraph(graph, members);
        match detector.detect(&subgraph, resolution) {
            Ok(local) => {
                let num_communities = local.iter().collect::<HashSet<_>>().len();
                for (i, &node) in members.iter().enumerate() {
                    partition.insert(graph.name(node).to_string(), local[i] as i64 + offset);
                }
                tracing::info!(
                    component = index + 1,
                    nodes = members.len(),
                    communities = num_communities,
                    "component solved"
                );
                offset += num_communities as i64;
            }
            Err(e) => {
                tracing::warn!(
                    component = index + 1,
                    error = %e,
                    "solver failed on component, assigning it one community"
                );
                for &node in members {
                    partition.insert(graph.name(node).to_string(), offset);
                }
                offset += 1;
            }
        }
    }

    partition
}

/// Induce the subgraph restricted to `members`, with local ids in member
/// order.
fn induce_subgraph(graph: &WeightedGraph, members: &[NodeIndex]) -> Subgraph {
    let local: HashMap<NodeIndex, usize> = members
        .iter()
        .enumerate()
        .map(|(i, &node)| (node, i))
        .collect();

    let mut subgraph = Subgraph::with_nodes(members.len());
    for edge in graph.graph().edge_references() {
        let (Some(&a), Some(&b)) = (local.get(&edge.source()), local.get(&edge.target())) else {
            continue;
        };
        subgraph.add_edge(a, b, *edge.weight());
    }
    subgraph
}

/// Connectivity figures derived from the component split alone, so they
/// can be reported before any detection runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectivityHealth {
    /// Fraction of nodes in the misc container (0 for an empty graph).
    pub misc_ratio: f64,
    /// Percentage of nodes in a main component: `(1 - misc_ratio) * 100`.
    pub connectivity_health: f64,
}

/// Compute connectivity health from the component split.
pub fn connectivity_health(graph: &WeightedGraph, split: &ComponentSplit) -> ConnectivityHealth {
    let total_nodes = graph.node_count();
    let misc_ratio = if total_nodes > 0 {
        split.misc.len() as f64 / total_nodes as f64
    } else {
        0.0
    };
    ConnectivityHealth {
        misc_ratio,
        connectivity_health: (1.0 - misc_ratio) * 100.0,
    }
}

/// Compute summary statistics for a solved partition. Pure function of
/// its inputs.
pub fn summarize(
    graph: &WeightedGraph,
    split: &ComponentSplit,
    partition: &Partition,
) -> PartitionStats {
    let total_nodes = graph.node_count();
    let misc_nodes = split.misc.len();
    let health = connectivity_health(graph, split);
    let num_communities = partition
        .values()
        .filter(|&&community| community != MISC_COMMUNITY_ID)
        .collect::<HashSet<_>>()
        .len();

    PartitionStats {
        total_nodes,
        misc_nodes,
        misc_ratio: health.misc_ratio,
        connectivity_health: health.connectivity_health,
        num_communities,
        num_components: split.total_components,
        main_components: split.main.len(),
    }
}

/// Per-community size histogram, keyed by community id. The misc bucket
/// appears under [`MISC_COMMUNITY_ID`] like any other key; callers report
/// it separately.
pub fn community_histogram(partition: &Partition) -> BTreeMap<i64, usize> {
    let mut sizes = BTreeMap::new();
    for &community in partition.values() {
        *sizes.entry(community).or_insert(0) += 1;
    }
    sizes
}

/// Log the community size distribution: misc bucket first, then the ten
/// largest real communities.
pub fn log_distribution(partition: &Partition) {
    let sizes = community_histogram(partition);

    if let Some(misc) = sizes.get(&MISC_COMMUNITY_ID) {
        tracing::info!(nodes = misc, "misc container");
    }

    let mut real: Vec<(i64, usize)> = sizes
        .into_iter()
        .filter(|&(community, _)| community != MISC_COMMUNITY_ID)
        .collect();
    real.sort_by(|a, b| b.1.cmp(&a.1));

    for &(community, size) in real.iter().take(10) {
        tracing::info!(community, nodes = size, "community size");
    }
    if real.len() > 10 {
        tracing::info!(more = real.len() - 10, "additional communities");
    }
}

/// Persist the partition and its statistics as a single artifact.
pub fn save_partition(
    path: &Path,
    partition: &Partition,
    stats: &PartitionStats,
) -> Result<(), CommunityError> {
    let artifact = PartitionArtifact {
        partition: partition
            .iter()
            .map(|(node, &community)| (node.clone(), community))
            .collect(),
        stats: stats.clone(),
    };
    let json = serde_json::to_string_pretty(&artifact).map_err(|e| CommunityError::SaveFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| CommunityError::SaveFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), "saved partition artifact");
    Ok(())
}
