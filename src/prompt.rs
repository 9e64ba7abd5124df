//! Prompt fragments shared by the pipeline stages.
//!
//! Files and abstractions are always presented to the model with their
//! index so the answer can refer back to them (`"<index> # <label>"`).

use std::fmt::Write;

use crate::canonical::annotated;
use crate::models::{Abstraction, SourceFile};

/// `- 0 # src/lib.rs` lines for every file.
pub fn file_listing(files: &[SourceFile]) -> String {
    let mut out = String::new();
    for (i, file) in files.iter().enumerate() {
        let _ = writeln!(out, "- {}", annotated(i, &file.path));
    }
    out
}

/// Full contents of the given files, each under an indexed header.
pub fn file_contents<I>(files: &[SourceFile], indices: I) -> String
where
    I: IntoIterator<Item = usize>,
{
    let mut out = String::new();
    for i in indices {
        if let Some(file) = files.get(i) {
            let _ = write!(
                out,
                "--- File: {} ---\n{}\n\n",
                annotated(i, &file.path),
                file.content
            );
        }
    }
    out
}

/// Union of all files referenced by any abstraction, ascending.
pub fn referenced_files(abstractions: &[Abstraction]) -> Vec<usize> {
    let mut all: Vec<usize> = abstractions
        .iter()
        .flat_map(|a| a.file_indices.iter().copied())
        .collect();
    all.sort_unstable();
    all.dedup();
    all
}

/// `- 0 # Name` lines for every abstraction.
pub fn abstraction_listing(abstractions: &[Abstraction]) -> String {
    let mut out = String::new();
    for (i, a) in abstractions.iter().enumerate() {
        let _ = writeln!(out, "- {}", annotated(i, &a.name));
    }
    out
}

pub fn is_english(language: &str) -> bool {
    language.trim().eq_ignore_ascii_case("english")
}

/// Capitalized language name for prompt text (`"french"` → `"French"`).
pub fn display_language(language: &str) -> String {
    let trimmed = language.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Leading instruction for non-English output; empty for English.
pub fn language_instruction(language: &str, what: &str) -> String {
    if is_english(language) {
        String::new()
    } else {
        format!(
            "IMPORTANT: Write {} in **{}**. Do NOT use English for these fields.\n\n",
            what,
            display_language(language)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new("src/a.rs", "fn a() {}"),
            SourceFile::new("src/b.rs", "fn b() {}"),
        ]
    }

    #[test]
    fn test_listing_uses_annotated_indices() {
        assert_eq!(file_listing(&files()), "- 0 # src/a.rs\n- 1 # src/b.rs\n");
    }

    #[test]
    fn test_contents_skip_unknown_indices() {
        let out = file_contents(&files(), [1, 7]);
        assert!(out.contains("--- File: 1 # src/b.rs ---"));
        assert!(out.contains("fn b() {}"));
        assert!(!out.contains("src/a.rs"));
    }

    #[test]
    fn test_referenced_files_union() {
        let abstractions = vec![
            Abstraction::new("A", "a", [0, 1]),
            Abstraction::new("B", "b", [1, 2]),
        ];
        assert_eq!(referenced_files(&abstractions), vec![0, 1, 2]);
    }

    #[test]
    fn test_language_instruction() {
        assert!(language_instruction("English", "names").is_empty());
        let fr = language_instruction("french", "names");
        assert!(fr.contains("**French**"));
    }
}
