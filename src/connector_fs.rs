use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::acquire::{project_name_from, AcquisitionFilter, Collector};
use crate::error::AcquisitionError;
use crate::models::Acquisition;
use crate::traits::Connector;

/// Reads a local directory tree.
pub struct FilesystemConnector {
    root: PathBuf,
    name: String,
}

impl FilesystemConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .canonicalize()
            .map(|p| project_name_from(&p.to_string_lossy()))
            .unwrap_or_else(|_| project_name_from(&root.to_string_lossy()));
        Self { root, name }
    }
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "filesystem"
    }

    async fn acquire(&self, filter: &AcquisitionFilter) -> Result<Acquisition> {
        scan_directory(&self.root, &self.name, filter)
    }
}

fn scan_directory(
    root: &Path,
    project_name: &str,
    filter: &AcquisitionFilter,
) -> Result<Acquisition> {
    if !root.is_dir() {
        if root.exists() {
            bail!("Not a directory: {}", root.display());
        }
        return Err(AcquisitionError::NotFound(root.display().to_string()).into());
    }

    let mut collector = Collector::new(filter);

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !filter.matches(&rel_str) {
            continue;
        }

        // Size check from metadata first, so huge files are never read.
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if let Some(reason) = filter.size_rejection(size) {
            collector.skip(&rel_str, reason);
            continue;
        }

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        collector.offer(&rel_str, bytes);
    }

    collector.finish(project_name)
}
