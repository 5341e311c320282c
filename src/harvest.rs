//! Harvest Coordinator: drives document traversal through the Sieve and
//! the Net and accumulates the knowledge graph artifact.
//!
//! Per document: register a document node, split the content into
//! candidate fragments, classify each fragment, extract triples from the
//! actionable ones, and append one structural plus one semantic edge per
//! accepted triple. Persistence happens once, in [`Harvester::save_artifact`];
//! there are no incremental writes during traversal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::artifact::{EdgeRecord, GraphArtifact, NodeKind, NodeMeta};
use crate::classify::{ClassifyError, DEFAULT_THRESHOLD, SieveGate, TextClassifier};
use crate::extract::{GenerationProvider, Triple, TripleExtractor};

/// Structural relation linking a document to a concept it contains.
const HAS_PART: &str = "HAS_PART";

/// Hardcoded fragment for demo mode.
const DEMO_TEXT: &str = "ResonanceDB is the semantic graph database powering Polyvis.";

/// Errors from the harvest coordinator.
#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("target not found: {path}")]
    #[diagnostic(
        code(polyvis::harvest::target_not_found),
        help("The harvest target must be an existing file or directory.")
    )]
    TargetNotFound { path: String },

    #[error("failed to write artifact to {path}: {message}")]
    #[diagnostic(
        code(polyvis::harvest::save_failed),
        help("Check directory permissions and disk space.")
    )]
    SaveFailed { path: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Classify(#[from] ClassifyError),
}

/// Configuration for a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Confidence threshold for the actionability verdict.
    pub threshold: f64,
    /// Minimum trimmed line length in characters for a candidate fragment;
    /// shorter lines are treated as structural noise, not content.
    pub min_fragment_len: usize,
    /// Output path for the knowledge graph artifact.
    pub output: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            min_fragment_len: 20,
            output: PathBuf::from("knowledge_graph.json"),
        }
    }
}

/// Orchestrates the Sieve-and-Net protocol for semantic extraction.
pub struct Harvester<C, P> {
    gate: SieveGate<C>,
    extractor: TripleExtractor<P>,
    config: HarvestConfig,
    nodes: BTreeMap<String, NodeMeta>,
    edges: Vec<EdgeRecord>,
}

impl<C: TextClassifier, P: GenerationProvider> Harvester<C, P> {
    /// Create a harvester over a classification gate and a triple
    /// extractor.
    pub fn new(gate: SieveGate<C>, extractor: TripleExtractor<P>, config: HarvestConfig) -> Self {
        Self {
            gate,
            extractor,
            config,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// The accumulated node registry.
    pub fn nodes(&self) -> &BTreeMap<String, NodeMeta> {
        &self.nodes
    }

    /// The accumulated edge list.
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// Main entry point: process a file or directory target, or run demo
    /// mode when no target is given, then save the artifact.
    pub fn run(&mut self, target: Option<&Path>) -> Result<(), HarvestError> {
        match target {
            Some(path) if path.is_file() => {
                self.process_file(path)?;
            }
            Some(path) if path.is_dir() => {
                self.process_directory(path)?;
            }
            Some(path) => {
                return Err(HarvestError::TargetNotFound {
                    path: path.display().to_string(),
                });
            }
            None => self.run_demo()?,
        }
        self.save_artifact()
    }

    /// Process a single file. Returns the number of triples extracted.
    ///
    /// An unreadable file is logged and skipped; traversal continues.
    pub fn process_file(&mut self, path: &Path) -> Result<usize, HarvestError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        tracing::info!(file = %filename, "processing document");

        // Register the document node (the "island").
        self.register_node(
            &filename,
            NodeMeta {
                kind: NodeKind::Document,
                uri: format!("polyvis://{filename}"),
            },
        );

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "could not read file, skipping");
                return Ok(0);
            }
        };

        let context = path.display().to_string();
        let mut count = 0;

        for line in content.lines() {
            let line = line.trim();
            if line.chars().count() <= self.config.min_fragment_len {
                continue;
            }

            // 1. The Sieve: fast classification.
            let analysis = match self.gate.analyze(line, self.config.threshold) {
                Ok(analysis) => analysis,
                Err(e) => {
                    tracing::warn!(error = %e, "classifier failed on fragment, skipping");
                    continue;
                }
            };
            if !analysis.is_actionable {
                continue;
            }
            tracing::debug!(
                confidence = analysis.confidence,
                label = %analysis.predicted_label,
                excerpt = %analysis.fragment_excerpt,
                "actionable fragment"
            );

            // 2. The Net: structured extraction.
            let triples = self.extractor.extract(line);
            if triples.is_empty() {
                continue;
            }
            tracing::debug!(count = triples.len(), "extracted triples");

            count += self.record_triples(&triples, &filename, &context, analysis.confidence);
        }

        Ok(count)
    }

    /// Process all markdown files under a directory, recursively. Returns
    /// the total number of triples extracted.
    pub fn process_directory(&mut self, dir: &Path) -> Result<usize, HarvestError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "could not read directory, skipping");
                return Ok(0);
            }
        };

        let mut total = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                total += self.process_directory(&path)?;
            } else if path.extension().is_some_and(|ext| ext == "md") {
                total += self.process_file(&path)?;
            }
        }
        Ok(total)
    }

    /// Serialize the node registry and edge list to the artifact path.
    /// This is the sole persistence point of a harvest run.
    pub fn save_artifact(&self) -> Result<(), HarvestError> {
        let artifact = GraphArtifact {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };
        let json =
            serde_json::to_string_pretty(&artifact).map_err(|e| HarvestError::SaveFailed {
                path: self.config.output.display().to_string(),
                message: e.to_string(),
            })?;
        std::fs::write(&self.config.output, json).map_err(|e| HarvestError::SaveFailed {
            path: self.config.output.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            path = %self.config.output.display(),
            "saved knowledge graph artifact"
        );
        Ok(())
    }

    /// Demo mode: one hardcoded fragment through the full Sieve-and-Net
    /// path, edges appended with a "demo" context and no document node.
    fn run_demo(&mut self) -> Result<(), HarvestError> {
        tracing::info!("no target specified, running demo extraction");

        let analysis = self.gate.analyze(DEMO_TEXT, DEFAULT_THRESHOLD)?;
        tracing::info!(
            label = %analysis.predicted_label,
            confidence = analysis.confidence,
            actionable = analysis.is_actionable,
            "sieve verdict"
        );

        if analysis.is_actionable {
            for triple in self.extractor.extract(DEMO_TEXT) {
                self.edges.push(EdgeRecord {
                    source: triple.source,
                    rel: triple.relation,
                    target: triple.target,
                    confidence_score: analysis.confidence,
                    context_source: "demo".into(),
                });
            }
        }
        Ok(())
    }

    /// Register concept nodes and append edges for extracted triples.
    /// Returns the number of accepted triples.
    ///
    /// Per accepted triple exactly two edges are appended: a structural
    /// HAS_PART edge at confidence 1.0 and a semantic edge at the
    /// classification confidence. Triples missing a source or target are
    /// dropped.
    fn record_triples(
        &mut self,
        triples: &[Triple],
        filename: &str,
        context: &str,
        confidence: f64,
    ) -> usize {
        let mut accepted = 0;
        for triple in triples {
            if triple.source.is_empty() || triple.target.is_empty() {
                continue;
            }

            // Concept node (the "islet") with a deep-link anchor. First
            // registration wins; re-registration never overwrites the URI.
            let anchor = sanitize_anchor(&triple.source);
            self.register_node(
                &triple.source,
                NodeMeta {
                    kind: NodeKind::Concept,
                    uri: format!("polyvis://{filename}#{anchor}"),
                },
            );

            self.edges.push(EdgeRecord {
                source: filename.to_string(),
                rel: HAS_PART.to_string(),
                target: triple.source.clone(),
                confidence_score: 1.0,
                context_source: context.to_string(),
            });
            self.edges.push(EdgeRecord {
                source: triple.source.clone(),
                rel: triple.relation.to_uppercase(),
                target: triple.target.clone(),
                confidence_score: confidence,
                context_source: context.to_string(),
            });
            accepted += 1;
        }
        accepted
    }

    fn register_node(&mut self, key: &str, meta: NodeMeta) {
        self.nodes.entry(key.to_string()).or_insert(meta);
    }
}

/// Convert entity text to a URL-safe anchor: whitespace runs become
/// hyphens.
pub fn sanitize_anchor(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join("-")
}
