//! Pipeline driver: sequences the four stages and assembles the documents.
//!
//! ```text
//! files ──▶ discovery ──▶ relationships ──▶ ordering ──▶ authoring
//!               │               │                │            │
//!         abstractions      summary+edges      order      chapters
//!                                                              │
//!                                          assemble_documents ◀┘
//! ```
//!
//! Every stage runs through [`crate::retry::run_validated`]; the first stage
//! that exhausts its attempts aborts the run and nothing is returned.

use std::fmt::Write;
use std::sync::Arc;

use tracing::info;

use crate::authoring::{self, ATTRIBUTION};
use crate::config::Config;
use crate::diagram::mermaid_flowchart;
use crate::discovery::identify_abstractions;
use crate::error::PipelineError;
use crate::llm::CompletionGateway;
use crate::models::{Document, DocumentSet, PipelineRun, SourceFile};
use crate::ordering::order_chapters;
use crate::progress::{NoProgress, PipelineProgress};
use crate::relationships::analyze_relationships;
use crate::retry::{Attempt, RetryPolicy};

/// Everything a stage needs besides its inputs.
#[derive(Clone)]
pub struct PipelineContext {
    pub gateway: CompletionGateway,
    pub policy: RetryPolicy,
    pub use_cache: bool,
    pub language: String,
    pub max_abstractions: usize,
    pub feedback_on_retry: bool,
    pub progress: Arc<dyn PipelineProgress>,
}

impl PipelineContext {
    pub fn from_config(config: &Config, gateway: CompletionGateway) -> Self {
        let p = &config.pipeline;
        Self {
            gateway,
            policy: RetryPolicy::from_config(p),
            use_cache: p.use_cache,
            language: p.language.clone(),
            max_abstractions: p.max_abstractions.max(1),
            feedback_on_retry: p.feedback_on_retry,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn PipelineProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_max_abstractions(mut self, max: usize) -> Self {
        self.max_abstractions = max.max(1);
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// The prompt for one attempt: `base`, plus the previous failure when
    /// retry feedback is enabled.
    pub fn prompt_for(&self, base: &str, attempt: &Attempt<'_>) -> String {
        match attempt.feedback() {
            Some(feedback) if self.feedback_on_retry => format!("{}{}", base, feedback),
            _ => base.to_string(),
        }
    }
}

pub struct Pipeline {
    ctx: PipelineContext,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run all four stages over `files`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoSourceFiles`] for an empty file list (no model call
    /// is made), otherwise the first stage that gave up.
    pub async fn run(
        &self,
        files: Vec<SourceFile>,
        project_name: &str,
    ) -> Result<PipelineRun, PipelineError> {
        if files.is_empty() {
            return Err(PipelineError::NoSourceFiles);
        }
        let ctx = &self.ctx;
        info!(
            project = project_name,
            files = files.len(),
            provider = ctx.gateway.provider_name(),
            language = %ctx.language,
            "starting tutorial generation"
        );

        let abstractions = identify_abstractions(ctx, project_name, &files).await?;
        let graph = analyze_relationships(ctx, project_name, &abstractions, &files).await?;
        let order = order_chapters(ctx, project_name, &abstractions, &graph).await?;
        let chapters =
            authoring::write_chapters(ctx, project_name, &abstractions, &order, &files).await?;

        info!(
            project = project_name,
            chapters = chapters.len(),
            "tutorial generation finished"
        );

        Ok(PipelineRun {
            project_name: project_name.to_string(),
            source_files: files,
            abstractions,
            graph,
            order,
            chapters,
        })
    }

    /// [`Pipeline::run`] followed by [`assemble_documents`].
    pub async fn generate(
        &self,
        files: Vec<SourceFile>,
        project_name: &str,
        source_url: Option<&str>,
    ) -> Result<DocumentSet, PipelineError> {
        let run = self.run(files, project_name).await?;
        Ok(assemble_documents(&run, source_url))
    }
}

/// Build `index.md` plus one document per chapter, index first.
pub fn assemble_documents(run: &PipelineRun, source_url: Option<&str>) -> DocumentSet {
    let mut index = String::new();
    let _ = write!(
        index,
        "# Tutorial: {}\n\n{}\n\n",
        run.project_name,
        run.graph.summary.trim()
    );
    if let Some(url) = source_url.filter(|u| !u.trim().is_empty()) {
        let _ = write!(index, "**Source Repository:** [{}]({})\n\n", url, url);
    }
    let _ = write!(
        index,
        "```mermaid\n{}```\n\n## Chapters\n\n",
        mermaid_flowchart(&run.abstractions, &run.graph)
    );
    for chapter in &run.chapters {
        let _ = writeln!(
            index,
            "{}. [{}]({})",
            chapter.ordinal, chapter.title, chapter.filename
        );
    }
    let _ = write!(index, "\n{}\n", ATTRIBUTION);

    let mut documents = Vec::with_capacity(run.chapters.len() + 1);
    documents.push(Document {
        filename: "index.md".to_string(),
        content: index,
    });
    documents.extend(run.chapters.iter().map(|c| Document {
        filename: c.filename.clone(),
        content: c.body.clone(),
    }));

    DocumentSet {
        project_name: run.project_name.clone(),
        documents,
    }
}
