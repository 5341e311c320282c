//! # polyvis
//!
//! Sieve-and-Net knowledge harvesting and community partitioning.
//!
//! The harvest side turns free-text documents into a weighted knowledge
//! graph: the **Sieve** ([`classify`]) filters fragments worth structured
//! extraction, the **Net** ([`extract`]) pulls subject-relation-object
//! triples out of them with a deterministic regex fallback, and the
//! coordinator ([`harvest`]) accumulates nodes and edges into the
//! knowledge graph artifact.
//!
//! The partition side loads the weighted edge set ([`graph`]), folds
//! undersized connected components into a misc container, runs Louvain
//! community detection per main component, and persists the global
//! partition with summary statistics ([`community`]).
//!
//! ## Library usage
//!
//! ```no_run
//! use polyvis::community::{self, Louvain};
//! use polyvis::graph;
//!
//! let g = graph::load_graph(std::path::Path::new("resonance.db")).unwrap();
//! let split = graph::classify_components(&g, 5);
//! let partition = community::solve(&g, &split, &Louvain::default(), 1.0);
//! assert_eq!(partition.len(), g.node_count());
//! ```

pub mod artifact;
pub mod classify;
pub mod community;
pub mod error;
pub mod extract;
pub mod graph;
pub mod harvest;
