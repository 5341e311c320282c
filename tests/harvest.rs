//! End-to-end tests for the harvest side: Sieve classification, Net
//! extraction with fallback, node/edge accumulation, and the artifact
//! format.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use polyvis::artifact::{GraphArtifact, NodeKind};
use polyvis::classify::{ClassifyError, FragmentLabel, SieveGate, TextClassifier};
use polyvis::extract::{ExtractError, GenerationProvider, TripleExtractor};
use polyvis::harvest::{HarvestConfig, Harvester};

/// Flags definition-looking lines, treats the rest as noise, and counts
/// how many fragments actually reach the classifier.
struct KeywordClassifier {
    calls: Rc<Cell<usize>>,
}

impl KeywordClassifier {
    fn new() -> Self {
        Self {
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl TextClassifier for KeywordClassifier {
    fn probabilities(&self, text: &str) -> Result<Vec<(FragmentLabel, f64)>, ClassifyError> {
        self.calls.set(self.calls.get() + 1);
        if text.contains(" is ") || text.contains(" implements ") {
            Ok(vec![
                (FragmentLabel::DefCandidate, 0.92),
                (FragmentLabel::NoiseChat, 0.08),
            ])
        } else {
            Ok(vec![
                (FragmentLabel::NoiseChat, 0.97),
                (FragmentLabel::DefCandidate, 0.03),
            ])
        }
    }
}

/// Simulates an unreachable generation sidecar, forcing the regex
/// fallback.
struct DownProvider;

impl GenerationProvider for DownProvider {
    fn complete(&self, _prompt: &str) -> Result<String, ExtractError> {
        Err(ExtractError::RequestFailed {
            message: "connection refused".into(),
        })
    }
}

/// Always answers with a canned JSON triple array.
struct CannedProvider {
    canned: String,
}

impl GenerationProvider for CannedProvider {
    fn complete(&self, _prompt: &str) -> Result<String, ExtractError> {
        Ok(self.canned.clone())
    }
}

fn config(output: PathBuf) -> HarvestConfig {
    HarvestConfig {
        output,
        ..HarvestConfig::default()
    }
}

#[test]
fn end_to_end_single_document() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("notes.md");
    std::fs::write(
        &doc,
        "# Notes\n\
         ResonanceDB is the semantic graph database powering Polyvis.\n\
         Sounds good to me, thanks a lot for the update!\n",
    )
    .unwrap();

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(DownProvider),
        config(dir.path().join("knowledge_graph.json")),
    );
    let count = harvester.process_file(&doc).unwrap();
    assert_eq!(count, 1);

    // One document node plus one concept node.
    let nodes = harvester.nodes();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes["notes.md"].kind, NodeKind::Document);
    assert_eq!(nodes["notes.md"].uri, "polyvis://notes.md");
    assert_eq!(nodes["ResonanceDB"].kind, NodeKind::Concept);
    assert_eq!(nodes["ResonanceDB"].uri, "polyvis://notes.md#ResonanceDB");

    // Exactly two edges: structural then semantic.
    let edges = harvester.edges();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].rel, "HAS_PART");
    assert_eq!(edges[0].source, "notes.md");
    assert_eq!(edges[0].target, "ResonanceDB");
    assert!((edges[0].confidence_score - 1.0).abs() < 1e-9);
    assert_eq!(edges[1].rel, "IS_A");
    assert_eq!(edges[1].source, "ResonanceDB");
    assert_eq!(
        edges[1].target,
        "semantic graph database powering Polyvis"
    );
    // Semantic edge carries the classifier's confidence.
    assert!((edges[1].confidence_score - 0.92).abs() < 1e-9);
    assert_eq!(edges[1].context_source, doc.display().to_string());
}

#[test]
fn short_lines_never_reach_the_classifier() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("short.md");
    // Every line is at or below the 20-character minimum.
    std::fs::write(&doc, "# Title\nshort line\nok\n").unwrap();

    let classifier = KeywordClassifier::new();
    let calls = Rc::clone(&classifier.calls);
    let mut harvester = Harvester::new(
        SieveGate::new(classifier),
        TripleExtractor::new(DownProvider),
        config(dir.path().join("out.json")),
    );
    let count = harvester.process_file(&doc).unwrap();
    assert_eq!(count, 0);
    assert_eq!(calls.get(), 0);
    // Document node is still registered even when nothing is extracted.
    assert_eq!(harvester.nodes().len(), 1);
}

#[test]
fn fragment_gate_counts_characters_not_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("accents.md");
    // 20 characters but 40 bytes; the gate must still treat this as a
    // short line.
    std::fs::write(&doc, format!("{}\n", "é".repeat(20))).unwrap();

    let classifier = KeywordClassifier::new();
    let calls = Rc::clone(&classifier.calls);
    let mut harvester = Harvester::new(
        SieveGate::new(classifier),
        TripleExtractor::new(DownProvider),
        config(dir.path().join("out.json")),
    );
    assert_eq!(harvester.process_file(&doc).unwrap(), 0);
    assert_eq!(calls.get(), 0);
}

#[test]
fn non_actionable_fragments_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("chatter.md");
    std::fs::write(
        &doc,
        "Thanks so much, that all sounds perfectly fine to me today!\n",
    )
    .unwrap();

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(DownProvider),
        config(dir.path().join("out.json")),
    );
    assert_eq!(harvester.process_file(&doc).unwrap(), 0);
    assert!(harvester.edges().is_empty());
}

#[test]
fn structured_path_records_extractor_relation() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("arch.md");
    std::fs::write(&doc, "The Harvester is a coordinator for extraction.\n").unwrap();

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(CannedProvider {
            canned: r#"[{"source": "The Harvester", "rel": "coordinates", "target": "extraction"}]"#
                .into(),
        }),
        config(dir.path().join("out.json")),
    );
    harvester.process_file(&doc).unwrap();

    let edges = harvester.edges();
    assert_eq!(edges.len(), 2);
    // Relations from the extractor are uppercased before storage.
    assert_eq!(edges[1].rel, "COORDINATES");
}

#[test]
fn directory_mode_recurses_markdown_only() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("deep");
    std::fs::create_dir(&nested).unwrap();
    std::fs::write(
        dir.path().join("a.md"),
        "The Sieve is a classification gate for fragments.\n",
    )
    .unwrap();
    std::fs::write(
        nested.join("b.md"),
        "The Net is an extraction layer for triples.\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("ignored.txt"),
        "The Decoy is a file that must never be processed.\n",
    )
    .unwrap();

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(DownProvider),
        config(dir.path().join("out.json")),
    );
    let count = harvester.process_directory(dir.path()).unwrap();
    assert_eq!(count, 2);
    assert!(harvester.nodes().contains_key("a.md"));
    assert!(harvester.nodes().contains_key("b.md"));
    assert!(!harvester.nodes().contains_key("ignored.txt"));
}

#[test]
fn node_uri_survives_re_registration_across_documents() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.md");
    let second = dir.path().join("second.md");
    let line = "The Cache is a storage layer for hot reads.\n";
    std::fs::write(&first, line).unwrap();
    std::fs::write(&second, line).unwrap();

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(DownProvider),
        config(dir.path().join("out.json")),
    );
    harvester.process_file(&first).unwrap();
    let uri_after_first = harvester.nodes()["The Cache"].uri.clone();
    harvester.process_file(&second).unwrap();

    assert_eq!(harvester.nodes()["The Cache"].uri, uri_after_first);
    assert_eq!(uri_after_first, "polyvis://first.md#The-Cache");
}

#[test]
fn saved_artifact_matches_schema() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("notes.md");
    std::fs::write(
        &doc,
        "ResonanceDB is the semantic graph database powering Polyvis.\n",
    )
    .unwrap();
    let output = dir.path().join("knowledge_graph.json");

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(DownProvider),
        config(output.clone()),
    );
    harvester.run(Some(&doc)).unwrap();

    let raw = std::fs::read_to_string(&output).unwrap();
    let artifact: GraphArtifact = serde_json::from_str(&raw).unwrap();
    assert_eq!(artifact.nodes.len(), 2);
    assert_eq!(artifact.edges.len(), 2);

    // Field-level schema check on the raw JSON.
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["nodes"]["notes.md"]["type"], "document");
    assert!(value["edges"][0]["confidence_score"].is_number());
    assert!(value["edges"][0]["context_source"].is_string());
}

#[test]
fn demo_mode_appends_demo_edges() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("knowledge_graph.json");

    let mut harvester = Harvester::new(
        SieveGate::new(KeywordClassifier::new()),
        TripleExtractor::new(DownProvider),
        config(output.clone()),
    );
    harvester.run(None).unwrap();

    let edges = harvester.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, "ResonanceDB");
    assert_eq!(edges[0].rel, "IS_A");
    assert_eq!(edges[0].context_source, "demo");
    assert!(output.exists());
}
