//! Serde schemas for the two persisted artifacts: the knowledge graph
//! written by the harvester and the community partition written by the
//! reporter.
//!
//! These are the only cross-run formats the core knows about. Downstream
//! consumers may rewrite whole artifacts, but this core never mutates one
//! after writing it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Node kind in the harvested graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A source document (the "island").
    Document,
    /// An extracted concept anchored into its source document (the "islet").
    Concept,
}

/// Metadata for a harvested node, keyed in the artifact by its canonical
/// entity string (document filename or extracted entity name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Node kind.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Deep link into the owning document (`polyvis://file#anchor`).
    pub uri: String,
}

/// A directed edge in the harvested graph. Append-only; duplicates are not
/// merged at harvest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Source entity key.
    pub source: String,
    /// Relation name (controlled vocabulary from the fallback path,
    /// uppercased free text from the extractor).
    pub rel: String,
    /// Target entity key.
    pub target: String,
    /// Confidence in [0, 1]: 1.0 for structural edges, the classifier
    /// confidence for semantic edges.
    pub confidence_score: f64,
    /// Path of the originating file (or "demo").
    pub context_source: String,
}

/// The knowledge graph artifact (`knowledge_graph.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphArtifact {
    /// Node registry, first registration wins.
    pub nodes: BTreeMap<String, NodeMeta>,
    /// Accumulated edge list.
    pub edges: Vec<EdgeRecord>,
}

/// Summary statistics for a partition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    /// Nodes in the loaded graph.
    pub total_nodes: usize,
    /// Nodes folded into the misc container.
    pub misc_nodes: usize,
    /// `misc_nodes / total_nodes` (0 for an empty graph).
    pub misc_ratio: f64,
    /// Percentage of nodes belonging to a real community:
    /// `(1 - misc_ratio) * 100`.
    pub connectivity_health: f64,
    /// Distinct community ids excluding the misc sentinel.
    pub num_communities: usize,
    /// Connected components before the main/misc split.
    pub num_components: usize,
    /// Components large enough for community detection.
    pub main_components: usize,
}

/// The partition artifact (`community_partition.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionArtifact {
    /// Node id to community id; `-1` is the misc sentinel.
    pub partition: BTreeMap<String, i64>,
    /// Run statistics.
    pub stats: PartitionStats,
}
