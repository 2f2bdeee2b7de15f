//! relsync ingest library
//!
//! Incrementally copies release-management records from Azure DevOps into a
//! column-oriented analytical store.
//!
//! # Pipeline
//!
//! Each entity runs the same pipeline, parameterized by an
//! [`entities::EntityDescriptor`]:
//!
//! 1. read the entity's watermark from a [`watermark::WatermarkStore`]
//! 2. page through the source with a [`cursor::CursorEngine`]
//! 3. turn every record into typed, parent-linked rows with [`flatten`]
//! 4. hand the run batch to a [`sink::BatchSink`]
//! 5. on success, append the engine's final position as the new watermark
//!
//! The [`orchestrator::Orchestrator`] runs all entity pipelines side by side
//! and keeps one entity's failure away from the others.
//!
//! # Example
//!
//! ```no_run
//! use relsync_ingest::config::SyncConfig;
//! use relsync_ingest::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let orchestrator = Orchestrator::from_config(&config).await?;
//!     let report = orchestrator.run_all().await;
//!     println!("{} of {} entities succeeded", report.succeeded(), report.entities.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod cursor;
pub mod entities;
pub mod error;
pub mod flatten;
pub mod orchestrator;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod watermark;

pub use error::{IngestError, Result};
