//! Relationship inference, the second pipeline stage.
//!
//! Produces a short project summary and a directed, labeled graph over the
//! discovered abstractions. A graph is only accepted when every
//! abstraction takes part in at least one edge.

use serde::Deserialize;
use std::fmt::Write;
use tracing::info;

use crate::canonical::IndexRef;
use crate::error::{PipelineError, Stage};
use crate::extract::extract_yaml;
use crate::models::{Abstraction, Relationship, RelationshipGraph, SourceFile};
use crate::pipeline::PipelineContext;
use crate::progress::PipelineEvent;
use crate::prompt;
use crate::retry::run_validated;

#[derive(Debug, Deserialize)]
struct RawGraph {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    relationships: Option<Vec<RawEdge>>,
    #[serde(skip)]
    resolved: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    #[serde(default)]
    from_abstraction: Option<IndexRef>,
    #[serde(default)]
    to_abstraction: Option<IndexRef>,
    #[serde(default)]
    label: Option<String>,
}

/// Infer the project summary and the relationship graph.
pub async fn analyze_relationships(
    ctx: &PipelineContext,
    project_name: &str,
    abstractions: &[Abstraction],
    files: &[SourceFile],
) -> Result<RelationshipGraph, PipelineError> {
    ctx.progress.report(PipelineEvent::StageStarted {
        stage: Stage::Relationships,
    });

    let base_prompt = build_prompt(project_name, abstractions, files, &ctx.language);
    let count = abstractions.len();

    let raw = run_validated(
        &ctx.gateway,
        &ctx.policy,
        "analyze_relationships",
        ctx.use_cache,
        |attempt| ctx.prompt_for(&base_prompt, attempt),
        extract_yaml::<RawGraph>,
        |graph| validate(graph, count),
    )
    .await
    .map_err(|source| PipelineError::Stage {
        stage: Stage::Relationships,
        source,
    })?;

    let graph = RelationshipGraph {
        summary: raw.summary.unwrap_or_default(),
        edges: raw.resolved,
    };

    info!(
        project = project_name,
        edges = graph.edges.len(),
        "inferred relationships"
    );
    ctx.progress.report(PipelineEvent::StageFinished {
        stage: Stage::Relationships,
        items: graph.edges.len(),
    });

    Ok(graph)
}

fn validate(raw: &mut RawGraph, abstraction_count: usize) -> Result<(), String> {
    let summary = raw.summary.as_deref().map(str::trim).unwrap_or_default();
    if summary.is_empty() {
        return Err("summary is missing or empty".to_string());
    }
    let summary = summary.to_string();

    let edges = raw
        .relationships
        .as_ref()
        .ok_or_else(|| "relationships list is missing".to_string())?;

    let mut resolved = Vec::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        let from = edge
            .from_abstraction
            .as_ref()
            .ok_or_else(|| format!("relationship {} has no from_abstraction", i))?
            .resolve(abstraction_count)
            .map_err(|e| format!("relationship {} from_abstraction: {}", i, e))?;
        let to = edge
            .to_abstraction
            .as_ref()
            .ok_or_else(|| format!("relationship {} has no to_abstraction", i))?
            .resolve(abstraction_count)
            .map_err(|e| format!("relationship {} to_abstraction: {}", i, e))?;
        let label = edge.label.as_deref().map(str::trim).unwrap_or_default();
        if label.is_empty() {
            return Err(format!("relationship {} has an empty label", i));
        }
        resolved.push(Relationship {
            from,
            to,
            label: label.to_string(),
        });
    }

    let candidate = RelationshipGraph {
        summary: summary.clone(),
        edges: resolved,
    };
    let missing = candidate.uncovered(abstraction_count);
    if !missing.is_empty() {
        return Err(format!(
            "abstractions not covered by any relationship: {:?}",
            missing
        ));
    }

    raw.summary = Some(summary);
    raw.resolved = candidate.edges;
    Ok(())
}

fn build_prompt(
    project_name: &str,
    abstractions: &[Abstraction],
    files: &[SourceFile],
    language: &str,
) -> String {
    let mut listing = String::new();
    for (i, a) in abstractions.iter().enumerate() {
        let _ = writeln!(
            listing,
            "- Index {}: {} (relevant file indices: {:?})\n  Description: {}",
            i, a.name, a.file_indices, a.description
        );
    }
    let snippets = prompt::file_contents(files, prompt::referenced_files(abstractions));
    let language_note =
        prompt::language_instruction(language, "the `summary` and every relationship `label`");
    let index_list = prompt::abstraction_listing(abstractions);

    format!(
        r#"Based on the following abstractions and relevant code snippets from the project `{project_name}`:

Abstractions (index # name):
{index_list}
Abstraction details:
{listing}
Relevant file snippets:
{snippets}
{language_note}Please provide:
1. A high-level `summary` of the project's main purpose and functionality in a few beginner-friendly sentences. Use markdown **bold** and *italic* to highlight important concepts.
2. A list (`relationships`) describing the key interactions between these abstractions. For each relationship give:
    - `from_abstraction`: index of the source abstraction (e.g. `0 # AbstractionName1`)
    - `to_abstraction`: index of the target abstraction (e.g. `1 # AbstractionName2`)
    - `label`: a brief label for the interaction, in just a few words (e.g. "Manages", "Inherits", "Uses")
    Focus on the most important relationships backed by the code.

IMPORTANT: every abstraction must appear in at least one relationship, either as source or as target.

Answer with YAML inside a ```yaml fenced block:

```yaml
summary: |
  A brief, simple explanation of the project.
  Can span multiple lines with **bold** and *italic* for emphasis.
relationships:
  - from_abstraction: 0 # AbstractionName1
    to_abstraction: 1 # AbstractionName2
    label: "Manages"
  - from_abstraction: 2 # AbstractionName3
    to_abstraction: 0 # AbstractionName1
    label: "Provides config"
```"#
    )
}
