//! Weighted undirected graph loading and connected-component
//! classification.
//!
//! The loader reads `(source, target, confidence, veracity)` edge rows
//! from a read-only SQLite store and builds the single graph used for
//! partitioning. Direction and relation information from the harvest
//! stage is intentionally discarded here; partitioning operates purely on
//! connectivity and edge weight (`confidence * veracity`).

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use miette::Diagnostic;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::NodeIndexable;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Errors from graph loading.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("no edges found in {path}")]
    #[diagnostic(
        code(polyvis::graph::empty),
        help("Run the harvester first; partitioning cannot proceed on an empty graph.")
    )]
    EmptyGraph { path: String },

    #[error("edge store error: {message}")]
    #[diagnostic(
        code(polyvis::graph::store),
        help(
            "Check that the database exists and contains an `edges` table with \
             source and target columns."
        )
    )]
    Store { message: String },
}

impl From<rusqlite::Error> for GraphError {
    fn from(e: rusqlite::Error) -> Self {
        GraphError::Store {
            message: e.to_string(),
        }
    }
}

/// Undirected weighted graph over node identifiers.
///
/// Read-only once constructed; the community solver only ever derives
/// subgraphs from it.
#[derive(Debug, Default)]
pub struct WeightedGraph {
    graph: UnGraph<String, f64>,
    indices: HashMap<String, NodeIndex>,
}

impl WeightedGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an undirected edge, creating endpoints as needed. If the pair
    /// already has an edge, the new weight replaces the old one.
    pub fn add_weighted_edge(&mut self, source: &str, target: &str, weight: f64) {
        let a = self.intern(source);
        let b = self.intern(target);
        self.graph.update_edge(a, b, weight);
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node identifier for an index.
    pub fn name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }

    /// Weight of the edge between two named nodes, if any.
    pub fn edge_weight(&self, source: &str, target: &str) -> Option<f64> {
        let a = *self.indices.get(source)?;
        let b = *self.indices.get(target)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge).copied()
    }

    /// The underlying petgraph structure.
    pub fn graph(&self) -> &UnGraph<String, f64> {
        &self.graph
    }

    fn intern(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.indices.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.indices.insert(name.to_string(), idx);
        idx
    }
}

/// Load the weighted graph from a SQLite edge store, read-only.
///
/// Edge weight is `COALESCE(confidence, 1.0) * COALESCE(veracity, 1.0)`.
/// Zero edges is fatal: the caller must abort partitioning rather than
/// proceed on an empty graph.
pub fn load_graph(db_path: &Path) -> Result<WeightedGraph, GraphError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn.prepare(
        "SELECT source, target, \
                COALESCE(confidence, 1.0) * COALESCE(veracity, 1.0) AS weight \
         FROM edges",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    let mut graph = WeightedGraph::new();
    let mut count = 0usize;
    for row in rows {
        let (source, target, weight) = row?;
        graph.add_weighted_edge(&source, &target, weight);
        count += 1;
    }

    if count == 0 {
        return Err(GraphError::EmptyGraph {
            path: db_path.display().to_string(),
        });
    }

    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "loaded weighted graph"
    );
    Ok(graph)
}

/// Connected components split into main components and the misc set.
#[derive(Debug)]
pub struct ComponentSplit {
    /// Components with size >= the minimum, descending by size. Equal
    /// sizes keep discovery order.
    pub main: Vec<Vec<NodeIndex>>,
    /// All nodes from undersized components, flattened into one set.
    pub misc: HashSet<NodeIndex>,
    /// Total number of connected components before the split.
    pub total_components: usize,
}

/// Partition the graph's connected components at `min_size`.
///
/// Components are discovered in node-index order and stably sorted
/// descending by size, so downstream community-id offset assignment is
/// deterministic across runs.
pub fn classify_components(graph: &WeightedGraph, min_size: usize) -> ComponentSplit {
    let pg = graph.graph();
    let mut seen = vec![false; pg.node_bound()];
    let mut components: Vec<Vec<NodeIndex>> = Vec::new();

    for start in pg.node_indices() {
        if seen[start.index()] {
            continue;
        }
        seen[start.index()] = true;
        let mut members = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for neighbor in pg.neighbors(node) {
                if !seen[neighbor.index()] {
                    seen[neighbor.index()] = true;
                    members.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
        components.push(members);
    }

    let total_components = components.len();
    components.sort_by(|a, b| b.len().cmp(&a.len())); // stable sort

    let mut main = Vec::new();
    let mut misc = HashSet::new();
    for component in components {
        if component.len() >= min_size {
            main.push(component);
        } else {
            misc.extend(component);
        }
    }

    tracing::info!(
        total_components,
        main_components = main.len(),
        misc_nodes = misc.len(),
        "classified connected components"
    );
    ComponentSplit {
        main,
        misc,
        total_components,
    }
}
