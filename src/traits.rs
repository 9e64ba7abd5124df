//! Source connector trait.
//!
//! A connector turns one source locator (a GitHub URL, a local directory, an
//! uploaded zip) into the ordered file list the pipeline consumes.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Connector                    │
//! │  ┌──────────┐ ┌──────────────┐ ┌──────────┐  │
//! │  │  GitHub  │ │  Filesystem  │ │ Archive  │  │
//! │  └──────────┘ └──────────────┘ └──────────┘  │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!        acquire(filter) → Acquisition → Pipeline::run
//! ```
//!
//! # Example
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use tutorial_harness::acquire::{AcquisitionFilter, Collector};
//! use tutorial_harness::models::Acquisition;
//! use tutorial_harness::traits::Connector;
//!
//! pub struct FixedConnector;
//!
//! #[async_trait]
//! impl Connector for FixedConnector {
//!     fn name(&self) -> &str { "fixed" }
//!     fn connector_type(&self) -> &str { "custom" }
//!
//!     async fn acquire(&self, filter: &AcquisitionFilter) -> Result<Acquisition> {
//!         let mut collector = Collector::new(filter);
//!         collector.offer("src/main.rs", b"fn main() {}".to_vec());
//!         collector.finish("fixed")
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::acquire::AcquisitionFilter;
use crate::models::Acquisition;

/// A source of code files.
///
/// Failures that a caller may want to classify (not found, rate limited,
/// nothing left after filtering) are returned as
/// [`AcquisitionError`](crate::error::AcquisitionError) wrapped in
/// `anyhow::Error`; recover them with `downcast_ref`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance name, usually the repository or directory name.
    fn name(&self) -> &str;

    /// Connector kind (`"github"`, `"filesystem"`, `"archive"`, `"custom"`).
    fn connector_type(&self) -> &str {
        "custom"
    }

    /// Public URL of the source, shown in the generated index.
    fn source_url(&self) -> Option<String> {
        None
    }

    /// Fetch every file accepted by `filter`.
    ///
    /// Accepted files are returned sorted by path. Files that match the
    /// patterns but are too large or not UTF-8 are listed in
    /// [`Acquisition::skipped`].
    async fn acquire(&self, filter: &AcquisitionFilter) -> Result<Acquisition>;
}
