//! Sequential chapter authoring, the last pipeline stage.
//!
//! The table of contents is fixed before any chapter is written, so every
//! cross-link a chapter makes already points at a real file. Chapters are
//! then written one at a time, in order; each prompt carries the full text
//! of all chapters written so far.
//!
//! Unlike the other stages, a missing or malformed chapter heading is not a
//! reason to retry. [`ensure_heading`] prepends the expected heading and the
//! output is accepted.

use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{ExtractionError, PipelineError, Stage};
use crate::extract::extract_text;
use crate::models::{Abstraction, Chapter, ChapterOrder, ChapterPlan, SourceFile};
use crate::pipeline::PipelineContext;
use crate::progress::PipelineEvent;
use crate::prompt;
use crate::retry::run_validated;

/// Shortest accepted chapter, counted in non-whitespace characters.
pub const MIN_CHAPTER_CHARS: usize = 50;

/// Fixed footer appended to every generated document.
pub const ATTRIBUTION: &str =
    "---\n\n*Generated by tutorial-harness from the project's source code.*";

/// Filesystem-safe form of a title: non-alphanumerics become `_`, lowercased.
pub fn sanitize(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

pub fn chapter_filename(ordinal: usize, title: &str) -> String {
    format!("{:02}_{}.md", ordinal, sanitize(title))
}

/// Lay out the table of contents for `order`. Ordinals start at 1.
pub fn plan_chapters(abstractions: &[Abstraction], order: &ChapterOrder) -> Vec<ChapterPlan> {
    order
        .as_slice()
        .iter()
        .enumerate()
        .filter_map(|(pos, &idx)| {
            let abstraction = abstractions.get(idx)?;
            let ordinal = pos + 1;
            let title = abstraction.name.trim().to_string();
            Some(ChapterPlan {
                ordinal,
                abstraction_index: idx,
                filename: chapter_filename(ordinal, &title),
                title,
            })
        })
        .collect()
}

/// Append the attribution footer to an accepted chapter body.
pub fn with_footer(body: &str) -> String {
    format!("{}\n\n{}\n", body.trim_end(), ATTRIBUTION)
}

/// Raw-text extraction for chapters.
///
/// Models sometimes wrap the whole chapter in a ` ```markdown ` fence; that
/// outer fence is removed. Inner code blocks are left alone.
pub fn extract_chapter_text(text: &str) -> Result<String, ExtractionError> {
    let trimmed = text.trim();
    let unwrapped = strip_outer_fence(trimmed).unwrap_or(trimmed);
    extract_text(unwrapped)
}

fn strip_outer_fence(text: &str) -> Option<&str> {
    let (first, rest) = text.split_once('\n')?;
    let tag = first.strip_prefix("```")?.trim().to_ascii_lowercase();
    if !(tag == "markdown" || tag == "md") {
        return None;
    }
    let body = rest.trim_end().strip_suffix("```")?;
    Some(body)
}

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^#+\s*chapter\s+(\d+)\s*[:.\-–—]?\s*(.*)$")
            .expect("chapter heading pattern is valid")
    })
}

fn normalized(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `line` is an acceptable heading for chapter `ordinal` titled `title`.
pub fn is_chapter_heading(line: &str, ordinal: usize, title: &str) -> bool {
    let Some(caps) = heading_pattern().captures(line.trim()) else {
        return false;
    };
    let number_matches = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .is_some_and(|n| n == ordinal);
    let found_title = caps.get(2).map(|m| normalized(m.as_str())).unwrap_or_default();
    number_matches && found_title.starts_with(&normalized(title))
}

/// Make `body` start with `# Chapter <ordinal>: <title>`.
///
/// A body whose first non-empty line is already such a heading is returned
/// unchanged. Otherwise the heading and a blank line are prepended and the
/// original text follows verbatim.
pub fn ensure_heading(body: &str, ordinal: usize, title: &str) -> String {
    let first_line = body.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if is_chapter_heading(first_line, ordinal, title) {
        body.to_string()
    } else {
        format!("# Chapter {}: {}\n\n{}", ordinal, title, body)
    }
}

fn check_length(body: &str) -> Result<(), String> {
    let visible = body.chars().filter(|c| !c.is_whitespace()).count();
    if visible < MIN_CHAPTER_CHARS {
        return Err(format!(
            "chapter text too short ({} non-whitespace characters, need {})",
            visible, MIN_CHAPTER_CHARS
        ));
    }
    Ok(())
}

/// Write every chapter in `order`, strictly one after another.
pub async fn write_chapters(
    ctx: &PipelineContext,
    project_name: &str,
    abstractions: &[Abstraction],
    order: &ChapterOrder,
    files: &[SourceFile],
) -> Result<Vec<Chapter>, PipelineError> {
    ctx.progress.report(PipelineEvent::StageStarted {
        stage: Stage::Authoring,
    });

    let plan = plan_chapters(abstractions, order);
    let total = plan.len();
    let mut chapters: Vec<Chapter> = Vec::with_capacity(total);

    for entry in &plan {
        let abstraction = &abstractions[entry.abstraction_index];
        let previous = previous_chapters(&chapters);
        let base_prompt = build_prompt(
            project_name,
            entry,
            abstraction,
            &plan,
            &previous,
            files,
            &ctx.language,
        );
        let operation = format!("write_chapter[{}]", entry.ordinal);
        let (ordinal, title) = (entry.ordinal, entry.title.as_str());

        let body = run_validated(
            &ctx.gateway,
            &ctx.policy,
            &operation,
            ctx.use_cache,
            |attempt| ctx.prompt_for(&base_prompt, attempt),
            extract_chapter_text,
            |body: &mut String| {
                check_length(body)?;
                let repaired = ensure_heading(body, ordinal, title);
                if repaired.len() != body.len() {
                    debug!(chapter = ordinal, "prepended missing chapter heading");
                }
                *body = repaired;
                Ok(())
            },
        )
        .await
        .map_err(|source| PipelineError::Stage {
            stage: Stage::Authoring,
            source,
        })?;

        chapters.push(Chapter {
            ordinal: entry.ordinal,
            abstraction_index: entry.abstraction_index,
            title: entry.title.clone(),
            filename: entry.filename.clone(),
            body: with_footer(&body),
        });

        info!(chapter = entry.ordinal, total, title = %entry.title, "wrote chapter");
        ctx.progress.report(PipelineEvent::ChapterWritten {
            n: entry.ordinal,
            total,
            title: entry.title.clone(),
        });
    }

    ctx.progress.report(PipelineEvent::StageFinished {
        stage: Stage::Authoring,
        items: chapters.len(),
    });
    Ok(chapters)
}

fn previous_chapters(chapters: &[Chapter]) -> String {
    chapters
        .iter()
        .map(|c| c.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn table_of_contents(plan: &[ChapterPlan]) -> String {
    let mut out = String::new();
    for p in plan {
        let _ = writeln!(out, "{}. [{}]({})", p.ordinal, p.title, p.filename);
    }
    out
}

fn neighbour_links(plan: &[ChapterPlan], entry: &ChapterPlan) -> String {
    let pos = entry.ordinal - 1;
    let mut out = String::new();
    if let Some(prev) = pos.checked_sub(1).and_then(|i| plan.get(i)) {
        let _ = writeln!(
            out,
            "Previous chapter: [{}]({})",
            prev.title, prev.filename
        );
    } else {
        out.push_str("This is the first chapter.\n");
    }
    match plan.get(pos + 1) {
        Some(next) => {
            let _ = writeln!(out, "Next chapter: [{}]({})", next.title, next.filename);
        }
        None => out.push_str("This is the last chapter.\n"),
    }
    out
}

fn build_prompt(
    project_name: &str,
    entry: &ChapterPlan,
    abstraction: &Abstraction,
    plan: &[ChapterPlan],
    previous: &str,
    files: &[SourceFile],
    language: &str,
) -> String {
    let ordinal = entry.ordinal;
    let title = &entry.title;
    let description = abstraction.description.trim();
    let toc = table_of_contents(plan);
    let links = neighbour_links(plan, entry);
    let code = prompt::file_contents(files, abstraction.file_indices.iter().copied());
    let language_note = prompt::language_instruction(
        language,
        "this entire tutorial chapter (explanations, examples, analogies)",
    );
    let previous = if previous.is_empty() {
        "This is the first chapter."
    } else {
        previous
    };

    format!(
        r#"{language_note}Write a very beginner-friendly tutorial chapter (in Markdown) for the project `{project_name}` about the concept: "{title}". This is Chapter {ordinal}.

Concept details:
- Name: {title}
- Description:
{description}

Complete tutorial structure (every chapter, with its file):
{toc}
{links}
Context from previous chapters:
{previous}

Relevant code snippets:
{code}
Instructions for the chapter:
- Start with a clear heading, exactly: `# Chapter {ordinal}: {title}`.
- If this is not the first chapter, begin with a brief transition from the previous chapter, linking to it with its Markdown filename.
- Begin with a high-level motivation: what problem does this abstraction solve? Use a concrete use case.
- If the abstraction is complex, break it down into key concepts and explain them one by one.
- Explain how to use the abstraction for the use case, with example inputs and outputs.
- Keep every code block under 10 lines; simplify aggressively and explain each block right after it.
- Describe the internal implementation step by step, optionally with a short ```mermaid sequenceDiagram.
- When referring to another abstraction covered in a different chapter, link to it as [Chapter Title](filename.md), using the structure above.
- Use analogies and examples throughout; keep the tone welcoming.
- End with a short summary and a transition to the next chapter, if there is one.

Output *only* the Markdown content for this chapter."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abstractions() -> Vec<Abstraction> {
        vec![
            Abstraction::new("Request Router", "Routes requests.", [0]),
            Abstraction::new("Caching Layer", "Keeps answers.", [1]),
            Abstraction::new("caching/layer", "Same title, sanitized.", [1]),
        ]
    }

    #[test]
    fn test_sanitize_and_filename() {
        assert_eq!(sanitize("Caching Layer"), "caching_layer");
        assert_eq!(sanitize("I/O & Buffers"), "i_o___buffers");
        assert_eq!(chapter_filename(2, "Caching Layer"), "02_caching_layer.md");
        assert_eq!(chapter_filename(12, "X"), "12_x.md");
    }

    #[test]
    fn test_plan_follows_order_with_unique_filenames() {
        let plan = plan_chapters(&abstractions(), &ChapterOrder(vec![1, 0, 2]));
        assert_eq!(plan[0].ordinal, 1);
        assert_eq!(plan[0].abstraction_index, 1);
        assert_eq!(plan[0].filename, "01_caching_layer.md");
        assert_eq!(plan[2].filename, "03_caching_layer.md");

        let mut names: Vec<&str> = plan.iter().map(|p| p.filename.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_missing_heading_is_prepended() {
        let body = "Caching keeps answers close so repeated questions are cheap.";
        let repaired = ensure_heading(body, 2, "Caching Layer");
        assert_eq!(
            repaired,
            format!("# Chapter 2: Caching Layer\n\n{}", body)
        );
    }

    #[test]
    fn test_correct_heading_left_unchanged() {
        let body = "# Chapter 2: Caching Layer\n\nText.";
        assert_eq!(ensure_heading(body, 2, "Caching Layer"), body);
    }

    #[test]
    fn test_heading_repair_is_idempotent() {
        let once = ensure_heading("Plain text.", 3, "Router");
        assert_eq!(ensure_heading(&once, 3, "Router"), once);
    }

    #[test]
    fn test_heading_variants_accepted() {
        for line in [
            "# Chapter 2: Caching Layer",
            "#Chapter 2 Caching Layer",
            "# chapter 2 - caching layer",
            "## CHAPTER 2. Caching-Layer",
            "# Chapter 2 – Caching Layer (overview)",
        ] {
            assert!(is_chapter_heading(line, 2, "Caching Layer"), "{}", line);
        }
    }

    #[test]
    fn test_wrong_heading_rejected() {
        assert!(!is_chapter_heading("# Chapter 3: Caching Layer", 2, "Caching Layer"));
        assert!(!is_chapter_heading("# Chapter 2: Router", 2, "Caching Layer"));
        assert!(!is_chapter_heading("Chapter 2: Caching Layer", 2, "Caching Layer"));
    }

    #[test]
    fn test_wrong_heading_gets_expected_prepended() {
        let body = "# Chapter 5: Something Else\n\nText.";
        let repaired = ensure_heading(body, 2, "Caching Layer");
        assert!(repaired.starts_with("# Chapter 2: Caching Layer\n\n# Chapter 5"));
    }

    #[test]
    fn test_outer_markdown_fence_stripped() {
        let raw = "```markdown\n# Chapter 1: X\n\n```rust\nfn main() {}\n```\n```";
        let text = extract_chapter_text(raw).unwrap();
        assert!(text.starts_with("# Chapter 1: X"));
        assert!(text.ends_with("fn main() {}\n```"));
    }

    #[test]
    fn test_inner_code_block_kept() {
        let raw = "```rust\nfn main() {}\n```";
        assert_eq!(extract_chapter_text(raw).unwrap(), raw);
    }

    #[test]
    fn test_short_chapter_rejected() {
        assert!(check_length("too short").is_err());
        assert!(check_length(&"word ".repeat(20)).is_ok());
    }

    #[test]
    fn test_footer_appended_once_at_end() {
        let body = with_footer("# Chapter 1: X\n\nText.\n\n");
        assert!(body.ends_with(&format!("{}\n", ATTRIBUTION)));
        assert_eq!(body.matches(ATTRIBUTION).count(), 1);
    }

    #[test]
    fn test_prompt_carries_toc_and_neighbours() {
        let abstractions = abstractions();
        let plan = plan_chapters(&abstractions, &ChapterOrder(vec![0, 1, 2]));
        let files = vec![
            SourceFile::new("src/router.rs", "fn route() {}"),
            SourceFile::new("src/cache.rs", "fn get() {}"),
        ];
        let p = build_prompt(
            "svc",
            &plan[1],
            &abstractions[1],
            &plan,
            "# Chapter 1: Request Router\n\nEarlier text.",
            &files,
            "english",
        );
        assert!(p.contains("1. [Request Router](01_request_router.md)"));
        assert!(p.contains("Previous chapter: [Request Router](01_request_router.md)"));
        assert!(p.contains("Next chapter: [caching/layer](03_caching_layer.md)"));
        assert!(p.contains("Earlier text."));
        assert!(p.contains("--- File: 1 # src/cache.rs ---"));
        assert!(!p.contains("src/router.rs ---"));
    }
}
