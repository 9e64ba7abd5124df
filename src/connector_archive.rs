//! Zip archive connector.
//!
//! Used for uploads to `POST /generate` and for `tut generate --archive`.
//! When every entry sits under one top-level directory (the layout of
//! GitHub's "Download ZIP"), that directory is stripped and used as the
//! project name.

use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use zip::ZipArchive;

use crate::acquire::{project_name_from, AcquisitionFilter, Collector};
use crate::error::AcquisitionError;
use crate::models::Acquisition;
use crate::traits::Connector;

pub struct ArchiveConnector {
    name: String,
    bytes: Vec<u8>,
}

impl ArchiveConnector {
    /// `name` is the uploaded file name; it names the project when the
    /// archive has no single top-level directory.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: project_name_from(name),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AcquisitionError::NotFound(path.display().to_string()).into());
        }
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read archive: {}", path.display()))?;
        Ok(Self::from_bytes(&path.to_string_lossy(), bytes))
    }
}

#[async_trait]
impl Connector for ArchiveConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "archive"
    }

    async fn acquire(&self, filter: &AcquisitionFilter) -> Result<Acquisition> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))
            .map_err(|e| AcquisitionError::InvalidLocator(format!("not a zip archive: {}", e)))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            // Entries with absolute or `..` paths have no enclosed name.
            let Some(path) = file.enclosed_name() else {
                continue;
            };
            let path = path
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push((i, path));
        }

        let root = common_root(entries.iter().map(|(_, p)| p.as_str()));
        let project_name = root.clone().unwrap_or_else(|| self.name.clone());
        let mut collector = Collector::new(filter);

        for (i, path) in &entries {
            let relative = match &root {
                Some(r) => &path[r.len() + 1..],
                None => path.as_str(),
            };
            if !filter.matches(relative) {
                continue;
            }

            let file = archive.by_index(*i)?;
            if let Some(reason) = filter.size_rejection(file.size()) {
                collector.skip(relative, reason);
                continue;
            }

            // The declared size can lie; never read more than limit + 1.
            let mut bytes = Vec::new();
            file.take(filter.max_file_size() + 1)
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to extract {}", path))?;
            collector.offer(relative, bytes);
        }

        collector.finish(&project_name)
    }
}

/// The single top-level directory shared by all paths, if there is one.
fn common_root<'a>(paths: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut root: Option<&str> = None;
    for path in paths {
        let (first, rest) = path.split_once('/')?;
        if rest.is_empty() {
            return None;
        }
        match root {
            None => root = Some(first),
            Some(r) if r == first => {}
            Some(_) => return None,
        }
    }
    root.map(str::to_string)
}
