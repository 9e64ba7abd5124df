//! Mermaid rendering of the abstraction graph for `index.md`.

use std::fmt::Write;

use crate::models::{Abstraction, RelationshipGraph};

/// Escape text for use inside a double-quoted Mermaid label.
pub fn escape_label(text: &str) -> String {
    text.replace('"', "#quot;")
        .replace(['\r', '\n'], " ")
        .trim()
        .to_string()
}

/// `flowchart TD` with one node per abstraction (`A0`, `A1`, ...) and one
/// labeled arrow per edge. Edges pointing outside `abstractions` are skipped.
pub fn mermaid_flowchart(abstractions: &[Abstraction], graph: &RelationshipGraph) -> String {
    let mut out = String::from("flowchart TD\n");
    for (i, a) in abstractions.iter().enumerate() {
        let _ = writeln!(out, "    A{}[\"{}\"]", i, escape_label(&a.name));
    }
    for edge in &graph.edges {
        if edge.from >= abstractions.len() || edge.to >= abstractions.len() {
            continue;
        }
        let _ = writeln!(
            out,
            "    A{} -- \"{}\" --> A{}",
            edge.from,
            escape_label(&edge.label),
            edge.to
        );
    }
    out
}
