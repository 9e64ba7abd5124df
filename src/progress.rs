//! Pipeline progress reporting.
//!
//! Reports which stage a generation run is in and how many chapters are
//! written, so a CLI user sees movement during a run that can take many
//! minutes. Progress is emitted on **stderr** so stdout stays parseable.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use crate::error::Stage;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Source files were acquired.
    Acquired { files: usize, skipped: usize },
    /// A stage began.
    StageStarted { stage: Stage },
    /// A stage finished and its output was accepted.
    StageFinished { stage: Stage, items: usize },
    /// One chapter was written: `n` of `total`.
    ChapterWritten {
        n: usize,
        total: usize,
        title: String,
    },
}

/// Receives pipeline progress events.
pub trait PipelineProgress: Send + Sync {
    fn report(&self, event: PipelineEvent);
}

/// Human-friendly progress on stderr: `  chapter 3 / 8  Caching Layer`.
pub struct StderrProgress;

impl PipelineProgress for StderrProgress {
    fn report(&self, event: PipelineEvent) {
        let line = match &event {
            PipelineEvent::Acquired { files, skipped } => {
                format!("acquired {} files ({} skipped)\n", files, skipped)
            }
            PipelineEvent::StageStarted { stage } => format!("{} ...\n", stage),
            PipelineEvent::StageFinished { stage, items } => {
                format!("{} done ({} items)\n", stage, items)
            }
            PipelineEvent::ChapterWritten { n, total, title } => {
                format!("  chapter {} / {}  {}\n", n, total, title)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl PipelineProgress for JsonProgress {
    fn report(&self, event: PipelineEvent) {
        let obj = match &event {
            PipelineEvent::Acquired { files, skipped } => serde_json::json!({
                "event": "acquired",
                "files": files,
                "skipped": skipped
            }),
            PipelineEvent::StageStarted { stage } => serde_json::json!({
                "event": "stage_started",
                "stage": stage.to_string()
            }),
            PipelineEvent::StageFinished { stage, items } => serde_json::json!({
                "event": "stage_finished",
                "stage": stage.to_string(),
                "items": items
            }),
            PipelineEvent::ChapterWritten { n, total, title } => serde_json::json!({
                "event": "chapter_written",
                "n": n,
                "total": total,
                "title": title
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter; used by the HTTP server and tests.
pub struct NoProgress;

impl PipelineProgress for NoProgress {
    fn report(&self, _event: PipelineEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn PipelineProgress> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
