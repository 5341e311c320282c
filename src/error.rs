//! Rich diagnostic error types for the polyvis core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives (error codes and help text); this module provides the
//! transparent top-level aggregate for callers that cross subsystem
//! boundaries.

use miette::Diagnostic;
use thiserror::Error;

use crate::classify::ClassifyError;
use crate::community::CommunityError;
use crate::extract::ExtractError;
use crate::graph::GraphError;
use crate::harvest::HarvestError;

/// Top-level error type for the polyvis core.
#[derive(Debug, Error, Diagnostic)]
pub enum PolyvisError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Community(#[from] CommunityError),
}

/// Convenience alias for functions returning polyvis results.
pub type PolyvisResult<T> = std::result::Result<T, PolyvisError>;
