//! File filtering shared by all connectors.
//!
//! [`AcquisitionFilter`] decides which paths are wanted; [`Collector`]
//! applies the size ceiling and UTF-8 check to the bytes a connector read
//! and produces the final, path-sorted [`Acquisition`].

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::AcquisitionConfig;
use crate::error::AcquisitionError;
use crate::models::{Acquisition, SkippedFile, SourceFile};

/// Paths that are never useful to analyze, whatever the configuration says.
const ALWAYS_EXCLUDED: &[&str] = &["**/.git/**"];

/// Include/exclude globs plus a per-file size ceiling.
#[derive(Debug, Clone)]
pub struct AcquisitionFilter {
    include: GlobSet,
    exclude: GlobSet,
    include_all: bool,
    max_file_size: u64,
}

impl AcquisitionFilter {
    /// An empty `include` list accepts every path not excluded.
    pub fn new(include: &[String], exclude: &[String], max_file_size: u64) -> Result<Self> {
        let mut excludes: Vec<String> = ALWAYS_EXCLUDED.iter().map(|s| s.to_string()).collect();
        excludes.extend(exclude.iter().cloned());
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(&excludes)?,
            include_all: include.is_empty(),
            max_file_size,
        })
    }

    pub fn from_config(config: &AcquisitionConfig) -> Result<Self> {
        Self::new(
            &config.include_globs,
            &config.exclude_globs,
            config.max_file_size,
        )
    }

    /// Whether a `/`-separated relative path is wanted.
    pub fn matches(&self, path: &str) -> bool {
        if self.exclude.is_match(path) {
            return false;
        }
        self.include_all || self.include.is_match(path)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Reason to skip a file of `size` bytes, if any.
    pub fn size_rejection(&self, size: u64) -> Option<String> {
        (size > self.max_file_size).then(|| {
            format!(
                "file too large ({} bytes, limit {})",
                size, self.max_file_size
            )
        })
    }
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Accumulates accepted and skipped files during one acquisition.
pub struct Collector<'a> {
    filter: &'a AcquisitionFilter,
    files: Vec<SourceFile>,
    skipped: Vec<SkippedFile>,
}

impl<'a> Collector<'a> {
    pub fn new(filter: &'a AcquisitionFilter) -> Self {
        Self {
            filter,
            files: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Offer a file's bytes. Paths the filter does not want are ignored
    /// silently; oversized or non-UTF-8 files are recorded as skipped.
    pub fn offer(&mut self, path: &str, bytes: Vec<u8>) {
        if !self.filter.matches(path) {
            return;
        }
        if let Some(reason) = self.filter.size_rejection(bytes.len() as u64) {
            self.skip(path, reason);
            return;
        }
        let size = bytes.len() as u64;
        match String::from_utf8(bytes) {
            Ok(content) => self.files.push(SourceFile {
                path: path.to_string(),
                content,
                size,
            }),
            Err(_) => self.skip(path, "not valid UTF-8".to_string()),
        }
    }

    pub fn skip(&mut self, path: &str, reason: String) {
        self.skipped.push(SkippedFile {
            path: path.to_string(),
            reason,
        });
    }

    /// Sort, and fail with [`AcquisitionError::Empty`] if nothing was kept.
    pub fn finish(mut self, project_name: &str) -> Result<Acquisition> {
        if self.files.is_empty() {
            return Err(AcquisitionError::Empty.into());
        }
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        self.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Acquisition {
            files: self.files,
            project_name: project_name.to_string(),
            skipped: self.skipped,
        })
    }
}

/// Last non-empty segment of a path or URL, without a `.git` or `.zip`
/// suffix. `"https://github.com/o/demo.git"` → `"demo"`.
pub fn project_name_from(locator: &str) -> String {
    let segment = locator
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(locator);
    let stem = segment
        .strip_suffix(".git")
        .or_else(|| segment.strip_suffix(".zip"))
        .unwrap_or(segment);
    if stem.is_empty() {
        "project".to_string()
    } else {
        stem.to_string()
    }
}
