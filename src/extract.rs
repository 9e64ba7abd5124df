//! Structured-response extraction from free-form model output.
//!
//! Models are asked to answer inside a fenced ` ```yaml ` block, but they
//! usually add commentary around it. [`extract_yaml`] ignores everything
//! outside the fence and is strict about the fence itself: it must exist
//! and its contents must deserialize into the requested type.
//!
//! Block selection, in order of preference:
//! 1. the first block tagged `yaml` or `yml` (case-insensitive),
//! 2. the first untagged block,
//! 3. the first block with any other tag (JSON is valid YAML).
//!
//! A block runs until the next line that is only a closing fence, or to
//! the end of the text when the model never closed it.

use serde::de::DeserializeOwned;

use crate::error::ExtractionError;

const FENCE: &str = "```";

struct Block<'a> {
    tag: String,
    body: &'a str,
}

/// Deserialize the fenced YAML block in `text` into `T`.
pub fn extract_yaml<T: DeserializeOwned>(text: &str) -> Result<T, ExtractionError> {
    let block = find_structured_block(text).ok_or(ExtractionError::NoBlock)?;
    if block.trim().is_empty() {
        return Err(ExtractionError::EmptyBlock);
    }
    serde_yaml::from_str(block).map_err(|e| ExtractionError::Malformed(e.to_string()))
}

/// The raw-text extractor: the whole response, trimmed, must be non-empty.
pub fn extract_text(text: &str) -> Result<String, ExtractionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyBlock);
    }
    Ok(trimmed.to_string())
}

/// Locate the body of the preferred fenced block.
pub fn find_structured_block(text: &str) -> Option<&str> {
    let blocks = fenced_blocks(text);
    blocks
        .iter()
        .find(|b| b.tag == "yaml" || b.tag == "yml")
        .or_else(|| blocks.iter().find(|b| b.tag.is_empty()))
        .or_else(|| blocks.first())
        .map(|b| b.body)
}

fn fenced_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    let mut open: Option<(String, usize)> = None;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();

        match &open {
            None => {
                if let Some(rest) = trimmed.strip_prefix(FENCE) {
                    let tag = rest.trim_start_matches('`').trim().to_ascii_lowercase();
                    open = Some((tag, offset));
                }
            }
            Some((tag, body_start)) => {
                if trimmed.starts_with(FENCE) && trimmed.trim_start_matches('`').is_empty() {
                    blocks.push(Block {
                        tag: tag.clone(),
                        body: &text[*body_start..line_start],
                    });
                    open = None;
                }
            }
        }
    }

    if let Some((tag, body_start)) = open {
        blocks.push(Block {
            tag,
            body: &text[body_start..],
        });
    }

    blocks
}
