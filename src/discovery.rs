//! Abstraction discovery, the first pipeline stage.
//!
//! Shows the model every file (indexed) and asks for the handful of core
//! concepts a newcomer needs, each backed by the files that implement it.

use serde::Deserialize;
use tracing::info;

use crate::canonical::IndexRef;
use crate::error::{PipelineError, Stage};
use crate::extract::extract_yaml;
use crate::models::{Abstraction, SourceFile};
use crate::pipeline::PipelineContext;
use crate::progress::PipelineEvent;
use crate::prompt;
use crate::retry::run_validated;

/// One abstraction as the model wrote it.
#[derive(Debug, Deserialize)]
struct RawAbstraction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    file_indices: Option<Vec<IndexRef>>,
    #[serde(skip)]
    resolved: Vec<usize>,
}

/// Identify the core abstractions of the project.
///
/// The returned abstractions have trimmed, non-empty names and
/// descriptions, and sorted, deduplicated file indices that all lie in
/// `0..files.len()`.
pub async fn identify_abstractions(
    ctx: &PipelineContext,
    project_name: &str,
    files: &[SourceFile],
) -> Result<Vec<Abstraction>, PipelineError> {
    ctx.progress.report(PipelineEvent::StageStarted {
        stage: Stage::Discovery,
    });

    let base_prompt = build_prompt(
        project_name,
        files,
        &ctx.language,
        ctx.max_abstractions,
    );
    let file_count = files.len();

    let raw = run_validated(
        &ctx.gateway,
        &ctx.policy,
        "identify_abstractions",
        ctx.use_cache,
        |attempt| ctx.prompt_for(&base_prompt, attempt),
        extract_yaml::<Vec<RawAbstraction>>,
        |items| validate(items, file_count),
    )
    .await
    .map_err(|source| PipelineError::Stage {
        stage: Stage::Discovery,
        source,
    })?;

    let abstractions: Vec<Abstraction> = raw
        .into_iter()
        .map(|r| {
            Abstraction::new(
                r.name.unwrap_or_default(),
                r.description.unwrap_or_default(),
                r.resolved,
            )
        })
        .collect();

    info!(
        project = project_name,
        abstractions = abstractions.len(),
        "identified abstractions"
    );
    ctx.progress.report(PipelineEvent::StageFinished {
        stage: Stage::Discovery,
        items: abstractions.len(),
    });

    Ok(abstractions)
}

fn validate(items: &mut [RawAbstraction], file_count: usize) -> Result<(), String> {
    if items.is_empty() {
        return Err("expected at least one abstraction".to_string());
    }

    for (i, item) in items.iter_mut().enumerate() {
        let name = item.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(format!("abstraction {} has an empty name", i));
        }
        let name = name.to_string();

        let description = item
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if description.is_empty() {
            return Err(format!("abstraction {} ({}) has an empty description", i, name));
        }
        let description = description.to_string();

        let refs = match &item.file_indices {
            Some(refs) if !refs.is_empty() => refs,
            _ => return Err(format!("abstraction {} ({}) lists no file_indices", i, name)),
        };

        let mut resolved = Vec::with_capacity(refs.len());
        for r in refs {
            let idx = r
                .resolve(file_count)
                .map_err(|e| format!("abstraction {} ({}): file index {}", i, name, e))?;
            resolved.push(idx);
        }
        resolved.sort_unstable();
        resolved.dedup();

        item.name = Some(name);
        item.description = Some(description);
        item.resolved = resolved;
    }

    Ok(())
}

fn build_prompt(
    project_name: &str,
    files: &[SourceFile],
    language: &str,
    max_abstractions: usize,
) -> String {
    let context = prompt::file_contents(files, 0..files.len());
    let listing = prompt::file_listing(files);
    let language_note = prompt::language_instruction(
        language,
        "the `name` and `description` of every abstraction",
    );
    let min = max_abstractions.min(5);

    format!(
        r#"For the project `{project_name}`:

Codebase context:
{context}
{language_note}Analyze the codebase above.
Identify the {min} to {max_abstractions} most important core abstractions, the ones that help someone new to the codebase understand how it works.

For each abstraction provide:
1. a concise `name`;
2. a beginner-friendly `description` of what it is and why it exists, with a simple analogy, in around 100 words;
3. the `file_indices` of the files that implement it, written as `index # path`.

Files available, by index:
{listing}
Answer with a YAML list inside a ```yaml fenced block, like this:

```yaml
- name: |
    Query Processing
  description: |
    Turns a raw request into an executable plan.
    Think of it as the front desk that routes every visitor.
  file_indices:
    - 0 # path/to/file1.py
    - 3 # path/to/related.py
- name: |
    Query Optimization
  description: |
    Another core concept, like a travel planner choosing the fastest route.
  file_indices:
    - 5 # path/to/another.js
```"#
    )
}
