//! Typed errors for the generation pipeline.
//!
//! The pipeline distinguishes three independent ways a model call can go
//! wrong (the service, the structure of its output, the meaning of its
//! output) and keeps them apart so the retry loop can treat each on its own
//! terms. Acquisition failures are wrapped in `anyhow` at the connector edge
//! and recovered with `downcast_ref` where a caller needs to classify them.

use std::fmt;

use thiserror::Error;

/// Failure of a single completion request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Provider unreachable, misconfigured, or answered with an HTTP error.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Content blocked by the provider's safety policy.
    #[error("content blocked by provider: {reason}")]
    Blocked { reason: String },

    /// Generation stopped for a reason other than a normal stop.
    #[error("response truncated: {reason}")]
    Truncated { reason: String },

    /// Nominally successful call with no text.
    #[error("provider returned an empty response")]
    Empty,
}

/// Failure to pull a structured value out of model output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no fenced structured block found in response")]
    NoBlock,

    #[error("fenced structured block is empty")]
    EmptyBlock,

    #[error("structured block did not parse: {0}")]
    Malformed(String),
}

/// The last thing that went wrong inside the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Gateway(GatewayError),
    Extraction {
        error: ExtractionError,
        /// Bounded prefix of the raw response.
        snippet: String,
    },
    Validation(String),
}

impl Failure {
    /// Short machine-friendly kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::Gateway(_) => "gateway",
            Failure::Extraction { .. } => "extraction",
            Failure::Validation(_) => "validation",
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Gateway(e) => write!(f, "gateway: {}", e),
            Failure::Extraction { error, snippet } => {
                write!(f, "extraction: {} (response began: {:?})", error, snippet)
            }
            Failure::Validation(reason) => write!(f, "validation: {}", reason),
        }
    }
}

/// The retry loop ran out of attempts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("gave up after {attempts} attempt(s); last failure: {last}")]
pub struct RetryError {
    pub attempts: u32,
    pub last: Failure,
}

/// Pipeline stage, used to attribute fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Relationships,
    Ordering,
    Authoring,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Discovery => write!(f, "abstraction discovery"),
            Stage::Relationships => write!(f, "relationship inference"),
            Stage::Ordering => write!(f, "chapter ordering"),
            Stage::Authoring => write!(f, "chapter authoring"),
        }
    }
}

/// A run-fatal error. No partial output exists once one of these is raised.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no source files to analyze")]
    NoSourceFiles,

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: RetryError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::NoSourceFiles => None,
            PipelineError::Stage { stage, .. } => Some(*stage),
        }
    }
}

/// Classified acquisition failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("rate limited by source host: {0}")]
    RateLimited(String),

    #[error("no files matched the include/exclude patterns and size limit")]
    Empty,

    #[error("invalid source locator: {0}")]
    InvalidLocator(String),
}
