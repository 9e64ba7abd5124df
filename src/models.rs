//! Core data models used throughout Tutorial Harness.
//!
//! These types represent the source files, abstractions, relationships and
//! chapters that flow through the generation pipeline. Everything here is
//! strongly typed: loosely-typed model output is canonicalized by the stage
//! validators before it is turned into one of these values.

use std::collections::BTreeSet;

use serde::Serialize;

/// A single file of the analyzed codebase.
///
/// Files are identified by their position in the ordered sequence handed to
/// the pipeline. That index is the join key used by every prompt
/// (`"<index> # <path>"`) and by [`Abstraction::file_indices`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Relative, `/`-separated path.
    pub path: String,
    /// Decoded UTF-8 text.
    pub content: String,
    /// Size in bytes as reported by the source.
    pub size: u64,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
        }
    }
}

/// A file the acquisition step decided not to hand to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Result of a source acquisition.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    /// Accepted files, sorted by path. Indices into this vector are stable
    /// for the lifetime of a pipeline run.
    pub files: Vec<SourceFile>,
    /// Suggested project name (repository or directory name).
    pub project_name: String,
    /// Files rejected by the filter, with the reason.
    pub skipped: Vec<SkippedFile>,
}

/// A central concept of the analyzed codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abstraction {
    pub name: String,
    pub description: String,
    /// Deduplicated, ascending indices into the source file list.
    pub file_indices: Vec<usize>,
}

impl Abstraction {
    /// Build an abstraction, normalizing `file_indices` into a sorted set.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        file_indices: impl IntoIterator<Item = usize>,
    ) -> Self {
        let set: BTreeSet<usize> = file_indices.into_iter().collect();
        Self {
            name: name.into(),
            description: description.into(),
            file_indices: set.into_iter().collect(),
        }
    }
}

/// Directed, labeled edge between two abstraction indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub from: usize,
    pub to: usize,
    pub label: String,
}

/// Project summary plus the relationship edges between abstractions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipGraph {
    pub summary: String,
    pub edges: Vec<Relationship>,
}

impl RelationshipGraph {
    /// Abstraction indices in `0..abstraction_count` that no edge touches.
    pub fn uncovered(&self, abstraction_count: usize) -> Vec<usize> {
        let covered: BTreeSet<usize> = self
            .edges
            .iter()
            .flat_map(|e| [e.from, e.to])
            .collect();
        (0..abstraction_count)
            .filter(|i| !covered.contains(i))
            .collect()
    }

    /// Whether every abstraction appears in at least one edge.
    pub fn covers(&self, abstraction_count: usize) -> bool {
        self.uncovered(abstraction_count).is_empty()
    }

    /// Add a generic `0 -> i` edge for every uncovered abstraction `i`.
    ///
    /// Fallback for graphs that did not go through validation. Returns the
    /// number of edges added.
    pub fn repair_coverage(&mut self, abstraction_count: usize) -> usize {
        let missing = self.uncovered(abstraction_count);
        for &idx in &missing {
            self.edges.push(Relationship {
                from: 0,
                to: idx,
                label: "Related to".to_string(),
            });
        }
        missing.len()
    }
}

/// A permutation of the abstraction indices giving the chapter sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterOrder(pub Vec<usize>);

impl ChapterOrder {
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this order is a bijection onto `0..abstraction_count`.
    pub fn is_permutation_of(&self, abstraction_count: usize) -> bool {
        if self.0.len() != abstraction_count {
            return false;
        }
        let mut seen = vec![false; abstraction_count];
        for &idx in &self.0 {
            if idx >= abstraction_count || seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        true
    }
}

/// Table-of-contents entry, computed before any chapter body is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterPlan {
    /// 1-based position in the chapter order.
    pub ordinal: usize,
    pub abstraction_index: usize,
    pub title: String,
    pub filename: String,
}

/// A fully authored chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub ordinal: usize,
    pub abstraction_index: usize,
    pub title: String,
    pub filename: String,
    /// Markdown body, beginning with `# Chapter <ordinal>: <title>` and
    /// ending with the attribution footer.
    pub body: String,
}

/// Everything one generation request produced. Lives only for that request.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub project_name: String,
    pub source_files: Vec<SourceFile>,
    pub abstractions: Vec<Abstraction>,
    pub graph: RelationshipGraph,
    pub order: ChapterOrder,
    pub chapters: Vec<Chapter>,
}

/// One output document (index or chapter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub filename: String,
    pub content: String,
}

/// The flat document set handed to packaging. `index.md` comes first.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSet {
    pub project_name: String,
    pub documents: Vec<Document>,
}

impl DocumentSet {
    pub fn get(&self, filename: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.filename == filename)
    }
}
