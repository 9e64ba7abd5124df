//! End-to-end pipeline runs against a scripted provider.

mod common;

use std::sync::Arc;

use common::*;
use regex::Regex;
use tutorial_harness::authoring::ATTRIBUTION;
use tutorial_harness::error::{Failure, PipelineError, Stage};
use tutorial_harness::models::SourceFile;
use tutorial_harness::pipeline::Pipeline;

fn files() -> Vec<SourceFile> {
    vec![
        SourceFile::new("src/cache.py", "class Cache:\n    pass\n"),
        SourceFile::new("src/router.py", "def route(req):\n    return req\n"),
        SourceFile::new("src/app.py", "from router import route\n"),
    ]
}

const ABSTRACTIONS: &str = r#"
- name: Caching Layer
  description: Keeps recent answers so repeated requests are cheap.
  file_indices:
    - 0 # src/cache.py
    - 1 # src/router.py
- name: Request Router
  description: Sends each request to the right handler.
  file_indices: ["1 # src/router.py", 2]
"#;

const GRAPH: &str = r#"
summary: A tiny **web service** with a cache.
relationships:
  - from_abstraction: 0 # Caching Layer
    to_abstraction: 1 # Request Router
    label: Serves
"#;

fn happy_provider() -> ScriptedProvider {
    ScriptedProvider::new()
        .on(
            CHAPTER,
            &[
                &chapter_text("# Chapter 1: Request Router\n\nRouting comes first."),
                &chapter_text("Caching keeps answers close, as in [Request Router](01_request_router.md)."),
            ],
        )
        .on(DISCOVERY, &[&yaml(ABSTRACTIONS)])
        .on(RELATIONSHIPS, &[&yaml(GRAPH)])
        .on(ORDERING, &[&yaml("- 1 # Request Router\n- 0 # Caching Layer")])
}

#[tokio::test]
async fn test_full_run_produces_consistent_documents() {
    let provider = Arc::new(happy_provider());
    let pipeline = Pipeline::new(context(provider.clone(), 3));

    let run = pipeline.run(files(), "tiny").await.unwrap();

    // Discovery: indices canonicalized and within range.
    assert_eq!(run.abstractions.len(), 2);
    assert_eq!(run.abstractions[0].file_indices, vec![0, 1]);
    assert_eq!(run.abstractions[1].file_indices, vec![1, 2]);

    // A single edge covering both abstractions is accepted.
    assert_eq!(run.graph.edges.len(), 1);
    assert!(run.graph.covers(2));

    assert_eq!(run.order.as_slice(), &[1, 0]);
    assert!(run.order.is_permutation_of(2));

    // Chapter 2 had no heading and got one prepended.
    let second = &run.chapters[1];
    assert_eq!(second.title, "Caching Layer");
    assert_eq!(second.filename, "02_caching_layer.md");
    assert!(second
        .body
        .starts_with("# Chapter 2: Caching Layer\n\nCaching keeps answers close"));
    assert!(second.body.trim_end().ends_with(ATTRIBUTION.trim_end()));

    // Chapter 1 already had one and is unchanged apart from the footer.
    assert!(run.chapters[0]
        .body
        .starts_with("# Chapter 1: Request Router\n\nRouting comes first."));

    // Chapter 2's prompt carries the full text of chapter 1.
    let chapter_prompts = provider.prompts_for(CHAPTER);
    assert_eq!(chapter_prompts.len(), 2);
    assert!(!chapter_prompts[0].contains("Routing comes first."));
    assert!(chapter_prompts[1].contains(&run.chapters[0].body));

    let docs = tutorial_harness::pipeline::assemble_documents(&run, None);
    let mut names: Vec<&str> = docs.documents.iter().map(|d| d.filename.as_str()).collect();
    assert_eq!(names[0], "index.md");
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 3);

    // Every local markdown link in every document resolves.
    let link = Regex::new(r"\]\(([^)\s]+\.md)\)").unwrap();
    for doc in &docs.documents {
        for cap in link.captures_iter(&doc.content) {
            let target = &cap[1];
            assert!(docs.get(target).is_some(), "{} links to missing {}", doc.filename, target);
        }
    }

    let index = &docs.get("index.md").unwrap().content;
    assert!(index.contains("A0[\"Caching Layer\"]"));
    assert!(index.contains("A0 -- \"Serves\" --> A1"));
    assert!(index.contains("1. [Request Router](01_request_router.md)"));
}

#[tokio::test]
async fn test_duplicate_order_is_retried() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .on(CHAPTER, &[&chapter_text("Some chapter text.")])
            .on(DISCOVERY, &[&yaml(ABSTRACTIONS)])
            .on(RELATIONSHIPS, &[&yaml(GRAPH)])
            .on(ORDERING, &[&yaml("- 0\n- 0"), &yaml("- 1\n- 0")]),
    );
    let pipeline = Pipeline::new(context(provider.clone(), 3));

    let run = pipeline.run(files(), "tiny").await.unwrap();
    assert_eq!(run.order.as_slice(), &[1, 0]);
    assert_eq!(provider.prompts_for(ORDERING).len(), 2);
}

#[tokio::test]
async fn test_uncovered_abstraction_is_retried() {
    let three = r#"
- name: A
  description: a
  file_indices: [0]
- name: B
  description: b
  file_indices: [1]
- name: C
  description: c
  file_indices: [2]
"#;
    let partial = "summary: s\nrelationships:\n  - {from_abstraction: 0, to_abstraction: 1, label: uses}";
    let full = "summary: s\nrelationships:\n  - {from_abstraction: 0, to_abstraction: 1, label: uses}\n  - {from_abstraction: 2, to_abstraction: 0, label: feeds}";
    let provider = Arc::new(
        ScriptedProvider::new()
            .on(CHAPTER, &[&chapter_text("Some chapter text.")])
            .on(DISCOVERY, &[&yaml(three)])
            .on(RELATIONSHIPS, &[&yaml(partial), &yaml(full)])
            .on(ORDERING, &[&yaml("- 2\n- 0\n- 1")]),
    );
    let pipeline = Pipeline::new(context(provider.clone(), 3));

    let run = pipeline.run(files(), "abc").await.unwrap();
    assert!(run.graph.covers(3));
    assert_eq!(provider.prompts_for(RELATIONSHIPS).len(), 2);
    assert_eq!(run.chapters.len(), 3);
}

#[tokio::test]
async fn test_exhausted_stage_aborts_with_last_reason() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .on(DISCOVERY, &[&yaml(ABSTRACTIONS)])
            .on(RELATIONSHIPS, &[&yaml(GRAPH)])
            .on(ORDERING, &[&yaml("- 0\n- 0")]),
    );
    let pipeline = Pipeline::new(context(provider.clone(), 4));

    let err = pipeline.run(files(), "tiny").await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Ordering));
    assert_eq!(provider.prompts_for(ORDERING).len(), 4);
    assert!(provider.prompts_for(CHAPTER).is_empty());

    match err {
        PipelineError::Stage { source, .. } => {
            assert_eq!(source.attempts, 4);
            match source.last {
                Failure::Validation(reason) => assert!(reason.contains("duplicate"), "{}", reason),
                other => panic!("unexpected failure: {:?}", other),
            }
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unparseable_discovery_is_extraction_failure() {
    let provider = Arc::new(ScriptedProvider::new().on(DISCOVERY, &["I could not decide."]));
    let pipeline = Pipeline::new(context(provider.clone(), 2));

    let err = pipeline.run(files(), "tiny").await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Discovery));
    match err {
        PipelineError::Stage { source, .. } => {
            assert!(matches!(source.last, Failure::Extraction { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_short_chapter_is_retried() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .on(CHAPTER, &["Too short.", &chapter_text("Now a proper chapter.")])
            .on(DISCOVERY, &[&yaml("- {name: Only, description: d, file_indices: [0]}")])
            .on(RELATIONSHIPS, &[&yaml("summary: s\nrelationships:\n  - {from_abstraction: 0, to_abstraction: 0, label: self}")])
            .on(ORDERING, &[&yaml("- 0")]),
    );
    let pipeline = Pipeline::new(context(provider.clone(), 3));

    let run = pipeline.run(files(), "one").await.unwrap();
    assert_eq!(provider.prompts_for(CHAPTER).len(), 2);
    assert!(run.chapters[0].body.starts_with("# Chapter 1: Only\n\nNow a proper chapter."));
}

#[tokio::test]
async fn test_non_english_prompts_ask_for_language() {
    let provider = Arc::new(happy_provider());
    let ctx = context(provider.clone(), 2).with_language("german");
    Pipeline::new(ctx).run(files(), "tiny").await.unwrap();

    for marker in [DISCOVERY, RELATIONSHIPS, CHAPTER] {
        for prompt in provider.prompts_for(marker) {
            assert!(prompt.contains("**German**"), "{} prompt lacks language", marker);
        }
    }
}

#[tokio::test]
async fn test_cached_answers_skip_the_provider() {
    let provider = Arc::new(happy_provider());
    let ctx = context(provider.clone(), 2);

    let first = Pipeline::new(ctx.clone()).run(files(), "tiny").await.unwrap();
    let calls = provider.prompts().len();
    let second = Pipeline::new(ctx).run(files(), "tiny").await.unwrap();

    assert_eq!(provider.prompts().len(), calls);
    assert_eq!(first.chapters, second.chapters);
}
