//! Local NDJSON store
//!
//! ```text
//! <root>/<table>/_schema.json
//! <root>/<table>/<yyyymmddThhmmss>-<ingestion id>.ndjson
//! ```
//!
//! Rows are projected through the table's column mapping before they are
//! written, so every line carries exactly the table's columns.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use serde_jsonlines::{BufReadExt, JsonLinesWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{BatchSink, IngestReceipt, IngestionNotification, IngestionReport, IngestionStatus};
use crate::error::{IngestError, Result};
use crate::schema::TableSchema;

pub const SCHEMA_FILE: &str = "_schema.json";

/// [`BatchSink`] writing one file per run per table
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    outcomes: Mutex<Vec<IngestionNotification>>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn record(&self, notification: IngestionNotification) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(notification);
        }
    }

    fn write_projected(path: &Path, schema: &TableSchema, ndjson: &[u8]) -> Result<usize> {
        let file = std::fs::File::create(path)?;
        let mut writer = JsonLinesWriter::new(std::io::BufWriter::new(file));
        let mut rows = 0;

        for line in ndjson.json_lines::<Value>() {
            let row = line?;
            writer.write(&schema.project(&row))?;
            rows += 1;
        }
        writer.flush()?;
        Ok(rows)
    }
}

#[async_trait]
impl BatchSink for DirectorySink {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        let dir = self.table_dir(&schema.table);
        tokio::fs::create_dir_all(&dir).await?;
        let contents = serde_json::to_vec_pretty(schema)?;
        tokio::fs::write(dir.join(SCHEMA_FILE), contents).await?;
        debug!(table = %schema.table, dir = %dir.display(), "Table directory ready");
        Ok(())
    }

    async fn ingest(&self, schema: &TableSchema, ndjson: Vec<u8>) -> Result<IngestReceipt> {
        let ingestion_id = Uuid::new_v4();
        let dir = self.table_dir(&schema.table);
        if !dir.is_dir() {
            return Err(IngestError::sink(format!(
                "table {} has not been created under {}",
                schema.table,
                self.root.display()
            )));
        }

        let file_name = format!("{}-{}.ndjson", Utc::now().format("%Y%m%dT%H%M%S"), ingestion_id);
        let path = dir.join(file_name);
        let bytes = ndjson.len();

        let task_schema = schema.clone();
        let task_path = path.clone();
        let written = tokio::task::spawn_blocking(move || Self::write_projected(&task_path, &task_schema, &ndjson))
            .await
            .map_err(|e| IngestError::Task(format!("directory write task failed: {}", e)))?;

        match written {
            Ok(rows) => {
                info!(table = %schema.table, rows = rows, file = %path.display(), "Wrote batch");
                self.record(IngestionNotification {
                    ingestion_id: Some(ingestion_id.to_string()),
                    table: schema.table.clone(),
                    status: IngestionStatus::Succeeded,
                    message: None,
                    timestamp: Some(Utc::now()),
                });
                Ok(IngestReceipt {
                    ingestion_id,
                    table: schema.table.clone(),
                    rows,
                    bytes,
                })
            },
            Err(e) => {
                self.record(IngestionNotification {
                    ingestion_id: Some(ingestion_id.to_string()),
                    table: schema.table.clone(),
                    status: IngestionStatus::Failed,
                    message: Some(e.to_string()),
                    timestamp: Some(Utc::now()),
                });
                Err(e)
            },
        }
    }

    async fn notifications(&self, table: &str, limit: usize) -> Result<IngestionReport> {
        let mut outcomes = self
            .outcomes
            .lock()
            .map_err(|_| IngestError::sink("notification log lock poisoned"))?;

        // Newest first; everything not taken stays in arrival order
        let mut recent = Vec::new();
        let mut kept = Vec::with_capacity(outcomes.len());
        for n in outcomes.drain(..).rev() {
            if recent.len() < limit && n.table == table {
                recent.push(n);
            } else {
                kept.push(n);
            }
        }
        kept.reverse();
        *outcomes = kept;

        let (successes, failures) = recent
            .into_iter()
            .partition(|n| n.status == IngestionStatus::Succeeded);
        Ok(IngestionReport { successes, failures })
    }
}
