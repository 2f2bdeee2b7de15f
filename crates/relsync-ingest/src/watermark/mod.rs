//! Watermark store
//!
//! Append-only log of resume markers. Every write inserts a new timestamped
//! row; reads return the most recent row for an entity. "Latest wins" is
//! resolved by the store, never by the caller.

mod memory;
mod sqlite;

pub use memory::MemoryWatermarkStore;
pub use sqlite::SqliteWatermarkStore;

use async_trait::async_trait;
use relsync_common::Watermark;

use crate::error::Result;

/// Durable entity-name to cursor mapping, scoped to one organization/project
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Cursor of the most recent watermark for `entity`, `None` if the entity
    /// has never completed a run
    async fn read(&self, entity: &str) -> Result<Option<String>>;

    /// Append a new watermark. Returns once the row is durable.
    async fn write(&self, entity: &str, cursor: &str) -> Result<Watermark>;

    /// Most recent watermarks for `entity`, newest first
    async fn history(&self, entity: &str, limit: usize) -> Result<Vec<Watermark>>;
}
