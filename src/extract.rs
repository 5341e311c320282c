//! The Net: structured triple extraction with a deterministic regex
//! fallback.
//!
//! The primary path prompts a generation sidecar for a JSON array of
//! `{source, rel, target}` objects at low temperature. When the sidecar is
//! unreachable or returns text that does not parse as that array, the
//! fallback applies two fixed patterns so the pipeline degrades to
//! lower-recall extraction with a controlled relation vocabulary instead
//! of silently dropping fragments.

use std::time::Duration;

use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokens the sidecar may generate per fragment.
const MAX_OUTPUT_TOKENS: u32 = 256;

/// Near-deterministic sampling for structured output.
const TEMPERATURE: f64 = 0.1;

/// Bounded wait on the generation call before falling back.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the structured extraction path. All of them are recovered
/// by the regex fallback; none escapes [`TripleExtractor::extract`].
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("generation sidecar request failed: {message}")]
    #[diagnostic(
        code(polyvis::extract::request_failed),
        help(
            "Check that the generation sidecar is running. Fragments fall back \
             to regex extraction while it is unreachable."
        )
    )]
    RequestFailed { message: String },

    #[error("generation output is not a JSON triple array: {message}")]
    #[diagnostic(
        code(polyvis::extract::invalid_json),
        help("The sidecar must return a JSON array of {{source, rel, target}} objects.")
    )]
    InvalidJson { message: String },
}

/// A subject-relation-object triple pulled from one text fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Subject entity.
    pub source: String,
    /// Relation name.
    #[serde(rename = "rel")]
    pub relation: String,
    /// Object entity.
    pub target: String,
}

impl Triple {
    /// Convenience constructor for tests and fallback extraction.
    pub fn new(source: impl Into<String>, relation: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            relation: relation.into(),
            target: target.into(),
        }
    }
}

/// Black-box text generation capability.
pub trait GenerationProvider {
    /// Complete `prompt`, returning the raw generated text.
    fn complete(&self, prompt: &str) -> Result<String, ExtractError>;
}

/// Provider for a llama.cpp server `/completion` endpoint.
pub struct LlamaCppProvider {
    url: String,
    agent: ureq::Agent,
}

impl LlamaCppProvider {
    /// Create a provider for the given `/completion` URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }
}

impl GenerationProvider for LlamaCppProvider {
    fn complete(&self, prompt: &str) -> Result<String, ExtractError> {
        let body = serde_json::json!({
            "prompt": prompt,
            "temperature": TEMPERATURE,
            "n_predict": MAX_OUTPUT_TOKENS,
            "cache_prompt": true,
        });
        let body_str = serde_json::to_string(&body).map_err(|e| ExtractError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| ExtractError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| ExtractError::RequestFailed {
            message: e.to_string(),
        })?;

        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| ExtractError::InvalidJson {
                message: e.to_string(),
            })?;

        json["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ExtractError::InvalidJson {
                message: "missing 'content' field".into(),
            })
    }
}

/// Provider for an Ollama server `/api/generate` endpoint.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaProvider {
    /// Create a provider for the given base URL and model.
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }
}

impl GenerationProvider for OllamaProvider {
    fn complete(&self, prompt: &str) -> Result<String, ExtractError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": TEMPERATURE,
                "num_predict": MAX_OUTPUT_TOKENS,
            },
        });
        let body_str = serde_json::to_string(&body).map_err(|e| ExtractError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| ExtractError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| ExtractError::RequestFailed {
            message: e.to_string(),
        })?;

        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| ExtractError::InvalidJson {
                message: e.to_string(),
            })?;

        json["response"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ExtractError::InvalidJson {
                message: "missing 'response' field".into(),
            })
    }
}

/// The structured-extraction step: primary sidecar path plus regex
/// fallback.
pub struct TripleExtractor<P> {
    provider: P,
    // Fallback patterns, compiled once. `(?i)` mirrors the original
    // case-insensitive matching, under which `[A-Z]` accepts any letter.
    is_a: Regex,
    implements: Regex,
    that_clause: Regex,
    which_clause: Regex,
}

impl<P: GenerationProvider> TripleExtractor<P> {
    /// Create an extractor over the given generation provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            is_a: Regex::new(r"(?i)^([A-Z][^.]*?)\s+is\s+(?:a|an|the)\s+([^.]+)")
                .expect("is-a pattern is valid"),
            implements: Regex::new(r"(?i)^([A-Z][^.]*?)\s+implements\s+(?:the\s+)?([^.]+)")
                .expect("implements pattern is valid"),
            that_clause: Regex::new(r"\s+that\b.*$").expect("that pattern is valid"),
            which_clause: Regex::new(r"\s+which\b.*$").expect("which pattern is valid"),
        }
    }

    /// Extract triples from `text`.
    ///
    /// Uses the sidecar when it answers with valid JSON; any connection
    /// failure, malformed output, or other extraction error degrades
    /// transparently to the regex fallback.
    pub fn extract(&self, text: &str) -> Vec<Triple> {
        match self.extract_structured(text) {
            Ok(triples) => triples,
            Err(e) => {
                tracing::debug!(error = %e, "structured extraction failed, using regex fallback");
                self.fallback_extract(text)
            }
        }
    }

    fn extract_structured(&self, text: &str) -> Result<Vec<Triple>, ExtractError> {
        let raw = self.provider.complete(&build_prompt(text))?;
        parse_triple_array(&raw)
    }

    /// Deterministic fallback extraction.
    ///
    /// Each pattern is applied to its first match only. Both patterns may
    /// match independently and both results are returned. Sides shorter
    /// than 3 characters are rejected.
    pub fn fallback_extract(&self, text: &str) -> Vec<Triple> {
        let mut triples = Vec::new();

        if let Some(caps) = self.is_a.captures(text) {
            let source = caps[1].trim().to_string();
            let mut target = caps[2].trim().to_string();
            // Strip trailing subordinate clauses from the definition body.
            target = self.that_clause.replace(&target, "").trim().to_string();
            target = self.which_clause.replace(&target, "").trim().to_string();
            if source.len() > 2 && target.len() > 2 {
                triples.push(Triple::new(source, "IS_A", target));
            }
        }

        if let Some(caps) = self.implements.captures(text) {
            let source = caps[1].trim().to_string();
            let target = caps[2].trim().to_string();
            if source.len() > 2 && target.len() > 2 {
                triples.push(Triple::new(source, "IMPLEMENTS", target));
            }
        }

        if !triples.is_empty() {
            tracing::debug!(count = triples.len(), "regex fallback extracted triples");
        }
        triples
    }
}

/// Fixed-format instruction prompt for the generation sidecar.
fn build_prompt(text: &str) -> String {
    format!(
        "SYSTEM: You are a Knowledge Graph Extractor. Extract semantic triples from the text.\n\
         OUTPUT: JSON array of objects with \"source\", \"rel\", \"target\" keys.\n\
         \n\
         USER: {text}\n\
         \n\
         ASSISTANT:"
    )
}

/// Parse generated text strictly as a JSON array of triples.
///
/// Missing `rel` fields default to `RELATED_TO`; missing `source`/`target`
/// become empty strings and are dropped later by the coordinator.
fn parse_triple_array(raw: &str) -> Result<Vec<Triple>, ExtractError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(raw.trim()).map_err(|e| ExtractError::InvalidJson {
            message: e.to_string(),
        })?;

    Ok(values
        .iter()
        .map(|v| Triple {
            source: v["source"].as_str().unwrap_or("").to_string(),
            relation: v["rel"].as_str().unwrap_or("RELATED_TO").to_string(),
            target: v["target"].as_str().unwrap_or("").to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simulates a generation sidecar that always answers with `canned`.
    struct CannedProvider {
        canned: String,
    }

    impl GenerationProvider for CannedProvider {
        fn complete(&self, _prompt: &str) -> Result<String, ExtractError> {
            Ok(self.canned.clone())
        }
    }

    /// Simulates an unreachable sidecar.
    struct DownProvider;

    impl GenerationProvider for DownProvider {
        fn complete(&self, _prompt: &str) -> Result<String, ExtractError> {
            Err(ExtractError::RequestFailed {
                message: "connection refused".into(),
            })
        }
    }

    fn down_extractor() -> TripleExtractor<DownProvider> {
        TripleExtractor::new(DownProvider)
    }

    #[test]
    fn structured_path_parses_triple_array() {
        let extractor = TripleExtractor::new(CannedProvider {
            canned: r#"[{"source": "ResonanceDB", "rel": "powers", "target": "Polyvis"}]"#.into(),
        });
        let triples = extractor.extract("ResonanceDB powers Polyvis.");
        assert_eq!(
            triples,
            vec![Triple::new("ResonanceDB", "powers", "Polyvis")]
        );
    }

    #[test]
    fn missing_rel_defaults_to_related_to() {
        let extractor = TripleExtractor::new(CannedProvider {
            canned: r#"[{"source": "A", "target": "B"}]"#.into(),
        });
        let triples = extractor.extract("whatever");
        assert_eq!(triples[0].relation, "RELATED_TO");
    }

    #[test]
    fn malformed_json_falls_back() {
        let extractor = TripleExtractor::new(CannedProvider {
            canned: "Sure! Here are some triples:".into(),
        });
        let triples = extractor.extract("The Cache is a storage layer.");
        assert_eq!(
            triples,
            vec![Triple::new("The Cache", "IS_A", "storage layer")]
        );
    }

    #[test]
    fn connection_failure_falls_back_to_is_a() {
        let triples = down_extractor().extract("The Cache is a storage layer.");
        assert_eq!(
            triples,
            vec![Triple::new("The Cache", "IS_A", "storage layer")]
        );
    }

    #[test]
    fn fallback_strips_trailing_that_clause() {
        let triples =
            down_extractor().extract("Polyvis is a visualization engine that renders graphs.");
        assert_eq!(
            triples,
            vec![Triple::new("Polyvis", "IS_A", "visualization engine")]
        );
    }

    #[test]
    fn fallback_strips_trailing_which_clause() {
        let triples =
            down_extractor().extract("The Harvester is a pipeline which scans documents nightly.");
        assert_eq!(triples, vec![Triple::new("The Harvester", "IS_A", "pipeline")]);
    }

    #[test]
    fn fallback_implements_pattern() {
        let triples = down_extractor().extract("ResonanceDB implements the hollow node protocol.");
        assert_eq!(
            triples,
            vec![Triple::new("ResonanceDB", "IMPLEMENTS", "hollow node protocol")]
        );
    }

    #[test]
    fn both_patterns_can_match_independently() {
        // One clause per pattern on the same line: both triples returned.
        let triples = down_extractor()
            .extract("Polyvis is a graph explorer and implements the resonance protocol.");
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0].relation, "IS_A");
        assert_eq!(triples[1].relation, "IMPLEMENTS");
    }

    #[test]
    fn fallback_rejects_short_sides() {
        // Target "x" is below the 3-character minimum.
        let triples = down_extractor().extract("Something is a x");
        assert!(triples.is_empty());
    }

    #[test]
    fn fallback_yields_nothing_on_unmatched_text() {
        let triples = down_extractor().extract("Let's meet tomorrow at noon.");
        assert!(triples.is_empty());
    }

    #[test]
    fn prompt_carries_the_fragment() {
        let prompt = build_prompt("The Sieve filters fragments.");
        assert!(prompt.starts_with("SYSTEM:"));
        assert!(prompt.contains("USER: The Sieve filters fragments."));
        assert!(prompt.ends_with("ASSISTANT:"));
    }
}
