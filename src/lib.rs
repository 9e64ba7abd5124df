//! # Tutorial Harness
//!
//! Turns a codebase into a beginner-friendly, multi-chapter Markdown
//! tutorial using an LLM.
//!
//! Tutorial Harness acquires source files (GitHub, a local directory or a
//! zip archive), asks an LLM to identify the project's core abstractions,
//! infers how they relate, picks a teaching order, and writes one chapter
//! per abstraction. Every model answer is validated before the next stage
//! consumes it; malformed answers are retried.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────────────────┐   ┌──────────┐
//! │ Connectors  │──▶│                Pipeline                  │──▶│ Package  │
//! │ GitHub/FS/  │   │ discover → relate → order → author (1..N)│   │ dir/zip  │
//! │ Archive     │   └───────────────────┬──────────────────────┘   └────┬─────┘
//! └─────────────┘                       │ run_validated                 │
//!                                       ▼                    ┌──────────┴──────┐
//!                             ┌───────────────────┐          ▼                 ▼
//!                             │ CompletionGateway │     ┌──────────┐     ┌──────────┐
//!                             │ provider + cache  │     │   CLI    │     │   HTTP   │
//!                             └───────────────────┘     │  (tut)   │     │ /generate│
//!                                                       └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! tut generate --repo https://github.com/owner/repo
//! tut generate --dir . --language spanish --output ./docs
//! tut serve web
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed pipeline and acquisition errors |
//! | [`llm`] | Completion providers and the caching gateway |
//! | [`cache`] | Prompt cache backends |
//! | [`extract`] | Fenced YAML extraction from model output |
//! | [`canonical`] | `"<index> # <label>"` index references |
//! | [`retry`] | Retry-validate loop |
//! | [`discovery`] | Stage 1: abstraction discovery |
//! | [`relationships`] | Stage 2: relationship inference |
//! | [`ordering`] | Stage 3: chapter ordering |
//! | [`authoring`] | Stage 4: sequential chapter authoring |
//! | [`pipeline`] | Stage sequencing and document assembly |
//! | [`diagram`] | Mermaid flowchart for the index |
//! | [`traits`] | `Connector` trait |
//! | [`acquire`] | Include/exclude filtering and size limits |
//! | [`connector_github`] | GitHub REST connector |
//! | [`connector_fs`] | Filesystem connector |
//! | [`connector_archive`] | Zip archive connector |
//! | [`package`] | Output directory and zip packaging |
//! | [`server`] | HTTP server |
//! | [`progress`] | Progress reporting on stderr |
//! | [`logging`] | Tracing subscriber setup |

pub mod acquire;
pub mod authoring;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod connector_archive;
pub mod connector_fs;
pub mod connector_github;
pub mod diagram;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod models;
pub mod ordering;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod relationships;
pub mod retry;
pub mod server;
pub mod traits;
