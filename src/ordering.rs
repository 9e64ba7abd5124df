//! Chapter ordering, the third pipeline stage.
//!
//! Asks for the order in which abstractions are best explained: foundational
//! and user-facing concepts first, implementation details later. The answer
//! must be a permutation of all abstraction indices.

use std::fmt::Write;

use tracing::info;

use crate::canonical::IndexRef;
use crate::error::{ExtractionError, PipelineError, Stage};
use crate::extract::extract_yaml;
use crate::models::{Abstraction, ChapterOrder, RelationshipGraph};
use crate::pipeline::PipelineContext;
use crate::progress::PipelineEvent;
use crate::prompt;
use crate::retry::run_validated;

/// Order entries as written, plus the canonical indices once validated.
#[derive(Debug)]
struct RawOrder {
    entries: Vec<IndexRef>,
    resolved: Vec<usize>,
}

fn extract_order(text: &str) -> Result<RawOrder, ExtractionError> {
    let entries: Vec<IndexRef> = extract_yaml(text)?;
    Ok(RawOrder {
        entries,
        resolved: Vec::new(),
    })
}

/// Decide the chapter order over all abstractions.
pub async fn order_chapters(
    ctx: &PipelineContext,
    project_name: &str,
    abstractions: &[Abstraction],
    graph: &RelationshipGraph,
) -> Result<ChapterOrder, PipelineError> {
    ctx.progress.report(PipelineEvent::StageStarted {
        stage: Stage::Ordering,
    });

    let base_prompt = build_prompt(project_name, abstractions, graph, &ctx.language);
    let count = abstractions.len();

    let raw = run_validated(
        &ctx.gateway,
        &ctx.policy,
        "order_chapters",
        ctx.use_cache,
        |attempt| ctx.prompt_for(&base_prompt, attempt),
        extract_order,
        |order| validate(order, count),
    )
    .await
    .map_err(|source| PipelineError::Stage {
        stage: Stage::Ordering,
        source,
    })?;

    let order = ChapterOrder(raw.resolved);
    info!(project = project_name, chapters = order.len(), "ordered chapters");
    ctx.progress.report(PipelineEvent::StageFinished {
        stage: Stage::Ordering,
        items: order.len(),
    });

    Ok(order)
}

fn validate(raw: &mut RawOrder, abstraction_count: usize) -> Result<(), String> {
    let mut seen = vec![false; abstraction_count];
    let mut duplicates = Vec::new();
    let mut resolved = Vec::with_capacity(raw.entries.len());

    for (pos, entry) in raw.entries.iter().enumerate() {
        let idx = entry
            .resolve(abstraction_count)
            .map_err(|e| format!("order entry {}: {}", pos, e))?;
        if seen[idx] {
            duplicates.push(idx);
        } else {
            seen[idx] = true;
            resolved.push(idx);
        }
    }

    let missing: Vec<usize> = (0..abstraction_count).filter(|&i| !seen[i]).collect();
    let mut problems = Vec::new();
    if !duplicates.is_empty() {
        problems.push(format!("duplicate indices: {:?}", duplicates));
    }
    if !missing.is_empty() {
        problems.push(format!("missing indices: {:?}", missing));
    }
    if !problems.is_empty() {
        return Err(format!(
            "chapter order is not a permutation of 0..{}: {}",
            abstraction_count,
            problems.join("; ")
        ));
    }

    raw.resolved = resolved;
    Ok(())
}

fn build_prompt(
    project_name: &str,
    abstractions: &[Abstraction],
    graph: &RelationshipGraph,
    language: &str,
) -> String {
    let listing = prompt::abstraction_listing(abstractions);
    let mut edges = String::new();
    for e in &graph.edges {
        let from = abstractions.get(e.from).map(|a| a.name.as_str()).unwrap_or("?");
        let to = abstractions.get(e.to).map(|a| a.name.as_str()).unwrap_or("?");
        let _ = writeln!(
            edges,
            "- From {} ({}) to {} ({}): {}",
            e.from, from, e.to, to, e.label
        );
    }
    let summary_note = if prompt::is_english(language) {
        String::new()
    } else {
        format!(
            "Note: the project summary below is written in {}.\n",
            prompt::display_language(language)
        )
    };
    let summary = graph.summary.trim();

    format!(
        r#"Given the following project abstractions and their relationships for the project `{project_name}`:

Abstractions (index # name):
{listing}
Context about relationships and project summary:
{summary_note}Project Summary:
{summary}

Relationships (indices refer to abstractions above):
{edges}
If you are going to make a tutorial for `{project_name}`, what is the best order to explain these abstractions, from first to last?
Ideally, first explain those that are the most important or foundational, perhaps user-facing concepts or entry points. Then move to more detailed, lower-level implementation details or supporting concepts.

List every abstraction index exactly once, each written as `index # name`.

Answer with a YAML list inside a ```yaml fenced block:

```yaml
- 2 # FoundationalConcept
- 0 # CoreClassA
- 1 # CoreClassB (uses CoreClassA)
```"#
    )
}
