//! The Sieve: classification gate that filters fragments before expensive
//! structured extraction.
//!
//! Wraps a black-box text-classification capability behind the
//! [`TextClassifier`] trait and renders the actionability verdict: a
//! fragment is worth extracting iff its confidence clears the threshold
//! *and* its arg-max label is in the actionable set. Noise and context
//! shifts stay out even at high confidence.

use std::fmt;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Default actionability threshold when the caller does not supply one.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Errors from the classification gate.
#[derive(Debug, Error, Diagnostic)]
pub enum ClassifyError {
    #[error("classifier is not available at {url}")]
    #[diagnostic(
        code(polyvis::classify::unavailable),
        help(
            "Start the classifier sidecar and check the --classifier-url value. \
             There is no fallback classifier; harvesting cannot proceed without it."
        )
    )]
    Unavailable { url: String },

    #[error("classifier request failed: {message}")]
    #[diagnostic(
        code(polyvis::classify::request_failed),
        help("Check that the classifier sidecar is still running and reachable.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse classifier response: {message}")]
    #[diagnostic(
        code(polyvis::classify::parse_error),
        help(
            "The sidecar must answer with a JSON object of the form \
             {{\"probs\": {{\"DEF_CANDIDATE\": 0.9, ...}}}}."
        )
    )]
    ParseError { message: String },

    #[error("classifier returned an empty probability distribution")]
    #[diagnostic(
        code(polyvis::classify::empty_distribution),
        help("The response contained no recognized labels. Check the sidecar's label set.")
    )]
    EmptyDistribution,
}

/// Labels emitted by the fragment classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentLabel {
    /// A definition suitable for the conceptual lexicon.
    DefCandidate,
    /// A directive or operational rule.
    DirCandidate,
    /// A context-change signal.
    LocusShift,
    /// General conversation, filtered out.
    NoiseChat,
}

impl FragmentLabel {
    /// Wire name of the label.
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentLabel::DefCandidate => "DEF_CANDIDATE",
            FragmentLabel::DirCandidate => "DIR_CANDIDATE",
            FragmentLabel::LocusShift => "LOCUS_SHIFT",
            FragmentLabel::NoiseChat => "NOISE_CHAT",
        }
    }

    /// Parse a wire name; unknown labels are ignored by callers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEF_CANDIDATE" => Some(FragmentLabel::DefCandidate),
            "DIR_CANDIDATE" => Some(FragmentLabel::DirCandidate),
            "LOCUS_SHIFT" => Some(FragmentLabel::LocusShift),
            "NOISE_CHAT" => Some(FragmentLabel::NoiseChat),
            _ => None,
        }
    }

    /// Whether this label marks a fragment worth structured extraction.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            FragmentLabel::DefCandidate | FragmentLabel::DirCandidate
        )
    }
}

impl fmt::Display for FragmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification verdict for one text fragment. Derived per fragment,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    /// Input text truncated to 50 characters for logging.
    pub fragment_excerpt: String,
    /// Arg-max label.
    pub predicted_label: FragmentLabel,
    /// Probability of the arg-max label, in [0, 1].
    pub confidence: f64,
    /// Whether the fragment should reach the Net.
    pub is_actionable: bool,
}

/// Black-box text classification capability.
///
/// Implementations return the full probability distribution over the label
/// set; the gate does the arg-max and the actionability call.
pub trait TextClassifier {
    /// Probability per label for `text`.
    fn probabilities(&self, text: &str) -> Result<Vec<(FragmentLabel, f64)>, ClassifyError>;
}

/// HTTP provider posting fragments to a local classifier sidecar.
///
/// Wire format: request `{"text": "..."}`, response
/// `{"probs": {"DEF_CANDIDATE": 0.9, ...}}`. Unknown labels in the
/// response are skipped.
pub struct HttpClassifier {
    url: String,
    agent: ureq::Agent,
}

impl HttpClassifier {
    /// Connect to the sidecar, probing it once.
    ///
    /// An unreachable classifier is fatal at startup: proceeding would
    /// silently mislabel every fragment, so there is no degraded mode.
    pub fn connect(url: &str) -> Result<Self, ClassifyError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        let client = Self {
            url: url.trim_end_matches('/').to_string(),
            agent,
        };
        client
            .probabilities("startup probe")
            .map_err(|_| ClassifyError::Unavailable {
                url: client.url.clone(),
            })?;
        Ok(client)
    }
}

impl TextClassifier for HttpClassifier {
    fn probabilities(&self, text: &str) -> Result<Vec<(FragmentLabel, f64)>, ClassifyError> {
        let body = serde_json::json!({ "text": text });
        let body_str =
            serde_json::to_string(&body).map_err(|e| ClassifyError::RequestFailed {
                message: format!("JSON serialize error: {e}"),
            })?;

        let resp = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| ClassifyError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| ClassifyError::ParseError {
            message: e.to_string(),
        })?;

        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| ClassifyError::ParseError {
                message: e.to_string(),
            })?;

        let probs = json["probs"]
            .as_object()
            .ok_or_else(|| ClassifyError::ParseError {
                message: "missing 'probs' object".into(),
            })?;

        Ok(probs
            .iter()
            .filter_map(|(label, prob)| {
                Some((FragmentLabel::parse(label)?, prob.as_f64()?))
            })
            .collect())
    }
}

/// The classification gate.
///
/// Stateless per call aside from the wrapped provider; calling `analyze`
/// never mutates classifier state.
pub struct SieveGate<C> {
    classifier: C,
}

impl<C: TextClassifier> SieveGate<C> {
    /// Wrap a classifier provider.
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// Classify `text` and compute the actionability verdict.
    ///
    /// `is_actionable` holds iff `confidence > threshold` and the arg-max
    /// label is a definition or directive candidate.
    pub fn analyze(
        &self,
        text: &str,
        threshold: f64,
    ) -> Result<ClassificationResult, ClassifyError> {
        let probs = self.classifier.probabilities(text)?;
        let (predicted_label, confidence) = probs
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or(ClassifyError::EmptyDistribution)?;

        Ok(ClassificationResult {
            fragment_excerpt: excerpt(text),
            predicted_label,
            confidence,
            is_actionable: confidence > threshold && predicted_label.is_actionable(),
        })
    }
}

/// Truncate text to 50 characters for log lines.
fn excerpt(text: &str) -> String {
    if text.chars().count() > 50 {
        let head: String = text.chars().take(50).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
