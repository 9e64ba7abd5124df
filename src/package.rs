//! Packaging of a generated [`DocumentSet`].
//!
//! Two targets: a directory on disk (`<dir>/<project_name>/<file>`) for the
//! CLI, and an in-memory zip (`<project_name>/<file>` entries) for the HTTP
//! server.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::authoring::sanitize;
use crate::models::DocumentSet;

/// Directory name used for a project inside the output location.
pub fn project_dir_name(project_name: &str) -> String {
    let trimmed = project_name.trim();
    if trimmed.is_empty() {
        return "tutorial".to_string();
    }
    // Keep readable names; only fall back when the name could escape the
    // output directory or carries control characters.
    if trimmed.contains(['/', '\\'])
        || trimmed.chars().any(char::is_control)
        || trimmed == "."
        || trimmed == ".."
    {
        sanitize(trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Write every document to `<dir>/<project_name>/`. Returns that directory.
pub fn write_to_dir(docs: &DocumentSet, dir: &Path) -> Result<PathBuf> {
    let target = dir.join(project_dir_name(&docs.project_name));
    std::fs::create_dir_all(&target)
        .with_context(|| format!("Failed to create output directory: {}", target.display()))?;

    for doc in &docs.documents {
        let path = target.join(&doc.filename);
        std::fs::write(&path, &doc.content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    info!(
        dir = %target.display(),
        documents = docs.documents.len(),
        "wrote tutorial"
    );
    Ok(target)
}

/// Zip every document under `<project_name>/`.
pub fn to_zip_bytes(docs: &DocumentSet) -> Result<Vec<u8>> {
    let root = project_dir_name(&docs.project_name);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for doc in &docs.documents {
        writer
            .start_file(format!("{}/{}", root, doc.filename), options)
            .with_context(|| format!("Failed to add {} to archive", doc.filename))?;
        writer.write_all(doc.content.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}
