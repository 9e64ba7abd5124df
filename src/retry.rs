//! Bounded retry loop combining generation, extraction and validation.
//!
//! Model output goes wrong in three independent ways and each gets its own
//! handling:
//!
//! | Failure | Detected by | Pause before next attempt |
//! |---------|-------------|---------------------------|
//! | service (unreachable, blocked, truncated, empty) | gateway | `backoff_base × attempt` |
//! | structure (no fenced block, bad YAML) | extractor | `extraction_backoff` |
//! | meaning (bad index, missing coverage, ...) | caller's validator | none |
//!
//! Validators receive `&mut T` and may canonicalize the value in place; a
//! value is only returned once its validator accepted it.
//!
//! The cache is consulted on the first attempt only, so a retry never gets
//! the same cached answer that was just rejected.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, Failure, RetryError};
use crate::llm::CompletionGateway;

/// Longest raw-response prefix kept for extraction diagnostics.
pub const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub extraction_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            extraction_backoff: Duration::from_millis(config.extraction_backoff_ms),
        }
    }

    /// No pauses between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::ZERO,
            extraction_backoff: Duration::ZERO,
        }
    }

    /// Pause after the `attempt`-th gateway failure. Saturates instead of
    /// overflowing for huge configured bases.
    pub fn gateway_backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

/// What a prompt factory knows about the attempt it is building for.
#[derive(Debug)]
pub struct Attempt<'a> {
    /// 1-based attempt number.
    pub number: u32,
    /// Why the previous attempt was rejected, if there was one.
    pub last_failure: Option<&'a Failure>,
}

impl Attempt<'_> {
    /// Text to append to a retry prompt when failure feedback is enabled.
    pub fn feedback(&self) -> Option<String> {
        self.last_failure.map(|failure| {
            format!(
                "\n\nIMPORTANT: your previous answer was rejected ({}). \
                 Correct the problem and answer again in exactly the requested format.",
                failure
            )
        })
    }
}

/// Run one logical LLM operation until its output validates.
///
/// `operation` only labels log lines. See the module docs for the per-failure
/// behaviour.
pub async fn run_validated<T, P, E, V>(
    gateway: &CompletionGateway,
    policy: &RetryPolicy,
    operation: &str,
    use_cache: bool,
    mut prompt_factory: P,
    extract: E,
    mut validate: V,
) -> Result<T, RetryError>
where
    P: FnMut(&Attempt<'_>) -> String,
    E: Fn(&str) -> Result<T, ExtractionError>,
    V: FnMut(&mut T) -> Result<(), String>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last: Option<Failure> = None;

    for number in 1..=max_attempts {
        let prompt = prompt_factory(&Attempt {
            number,
            last_failure: last.as_ref(),
        });
        let is_last = number == max_attempts;

        let raw = match gateway.complete(&prompt, use_cache && number == 1).await {
            Ok(raw) => raw,
            Err(e) => {
                let failure = Failure::Gateway(e);
                warn!(operation, attempt = number, kind = failure.kind(), error = %failure, "attempt failed");
                last = Some(failure);
                if !is_last {
                    tokio::time::sleep(policy.gateway_backoff(number)).await;
                }
                continue;
            }
        };

        let mut value = match extract(&raw) {
            Ok(value) => value,
            Err(error) => {
                let failure = Failure::Extraction {
                    error,
                    snippet: snippet(&raw),
                };
                warn!(operation, attempt = number, kind = failure.kind(), error = %failure, "attempt failed");
                last = Some(failure);
                if !is_last {
                    tokio::time::sleep(policy.extraction_backoff).await;
                }
                continue;
            }
        };

        match validate(&mut value) {
            Ok(()) => {
                debug!(operation, attempt = number, "output accepted");
                return Ok(value);
            }
            Err(reason) => {
                let failure = Failure::Validation(reason);
                warn!(operation, attempt = number, kind = failure.kind(), error = %failure, "attempt failed");
                last = Some(failure);
            }
        }
    }

    Err(RetryError {
        attempts: max_attempts,
        last: last.unwrap_or_else(|| Failure::Validation("no attempt was made".to_string())),
    })
}

fn snippet(raw: &str) -> String {
    raw.chars().take(SNIPPET_CHARS).collect()
}
