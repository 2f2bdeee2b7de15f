//! Batch sink adapter
//!
//! A run's rows are buffered in a [`RunBatch`], encoded as newline-delimited
//! JSON and handed to a [`BatchSink`] in one call. Ingestion is asynchronous
//! on the destination side: outcomes are read back later through
//! [`BatchSink::notifications`] and only logged.

mod directory;
mod http;

pub use directory::{DirectorySink, SCHEMA_FILE};
pub use http::HttpSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_jsonlines::JsonLinesWriter;
use uuid::Uuid;

use crate::error::Result;
use crate::flatten::FlattenedRow;
use crate::schema::TableSchema;

/// Rows accumulated by one pipeline invocation
#[derive(Debug, Default)]
pub struct RunBatch {
    rows: Vec<FlattenedRow>,
}

impl RunBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = FlattenedRow>) {
        self.rows.extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FlattenedRow] {
        &self.rows
    }

    /// Encode every row as one JSON object per line
    pub fn to_ndjson(&self) -> Result<Vec<u8>> {
        let mut writer = JsonLinesWriter::new(Vec::new());
        writer.write_all(&self.rows)?;
        writer.flush()?;
        Ok(writer.into_inner())
    }
}

/// Acknowledgement that a batch was accepted for ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub ingestion_id: Uuid,
    pub table: String,
    pub rows: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Succeeded,
    Failed,
}

/// One asynchronous ingestion outcome reported by the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionNotification {
    #[serde(default)]
    pub ingestion_id: Option<String>,
    pub table: String,
    pub status: IngestionStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Most recent ingestion successes and failures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    #[serde(default)]
    pub successes: Vec<IngestionNotification>,
    #[serde(default)]
    pub failures: Vec<IngestionNotification>,
}

/// Destination store for run batches
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Create the table and its JSON mapping if they do not exist.
    /// Idempotent; called once per table at pipeline construction.
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()>;

    /// Hand one NDJSON buffer to the destination, tagged with the schema's
    /// table and mapping names
    async fn ingest(&self, schema: &TableSchema, ndjson: Vec<u8>) -> Result<IngestReceipt>;

    /// Read (and discard) up to `limit` recent ingestion outcomes for
    /// `table`. Outcomes of other tables are left for their own pipelines.
    async fn notifications(&self, table: &str, limit: usize) -> Result<IngestionReport>;
}
