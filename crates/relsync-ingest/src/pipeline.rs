//! One entity's sync run
//!
//! read watermark → paginate + flatten → ingest batch → settle + poll
//! notifications → append new watermark.
//!
//! The watermark is written only after the sink accepted the batch. Any
//! error before that point leaves the previous watermark in place, so the
//! next run repeats the work instead of skipping it. Every successful run
//! appends a row, even when the position did not move.

use relsync_common::ProjectScope;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cursor::{CursorEngine, StopReason};
use crate::entities::EntityDescriptor;
use crate::error::Result;
use crate::flatten::flatten_page;
use crate::sink::{BatchSink, IngestReceipt, RunBatch};
use crate::source::SourceClient;
use crate::watermark::WatermarkStore;

/// Tunables for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub page_size: usize,
    /// Parallel detail fetches per page
    pub concurrency: usize,
    /// Wait between handing off a batch and reading ingestion outcomes
    pub settle: Duration,
    pub notification_limit: usize,
    pub record_cap: usize,
    /// Replaces the stored continuation token when set
    pub start_token: Option<i64>,
}

impl PipelineSettings {
    pub fn for_entity(descriptor: &EntityDescriptor) -> Self {
        Self {
            page_size: 100,
            concurrency: 8,
            settle: Duration::from_secs(10),
            notification_limit: 50,
            record_cap: descriptor.default_cap,
            start_token: None,
        }
    }
}

/// What one successful run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub entity: String,
    pub pages: usize,
    pub records: usize,
    pub rows: usize,
    pub stop_reason: Option<StopReason>,
    pub previous_watermark: Option<String>,
    pub watermark: String,
    /// `None` when the run produced no rows and nothing was sent
    pub receipt: Option<IngestReceipt>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn advanced(&self) -> bool {
        self.previous_watermark.as_deref() != Some(self.watermark.as_str())
    }
}

/// Cursor engine, flattener and sink wired together for one entity
pub struct EntityPipeline {
    descriptor: &'static EntityDescriptor,
    scope: ProjectScope,
    source: Arc<dyn SourceClient>,
    sink: Arc<dyn BatchSink>,
    watermarks: Arc<dyn WatermarkStore>,
    settings: PipelineSettings,
}

impl EntityPipeline {
    pub fn new(
        descriptor: &'static EntityDescriptor,
        scope: ProjectScope,
        source: Arc<dyn SourceClient>,
        sink: Arc<dyn BatchSink>,
        watermarks: Arc<dyn WatermarkStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            descriptor,
            scope,
            source,
            sink,
            watermarks,
            settings,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    /// Create the destination table if needed
    pub async fn bootstrap(&self) -> Result<()> {
        self.sink.ensure_table(&self.descriptor.schema()).await
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let entity = self.descriptor.name;
        let codec = self.descriptor.codec;

        // A store failure here aborts before any page is fetched
        let previous = self.watermarks.read(entity).await?;
        let mut position = codec.parse(previous.as_deref());
        if let Some(token) = self.settings.start_token {
            info!(
                entity = entity,
                stored = position.continuation_token,
                configured = token,
                "Overriding continuation token from configuration"
            );
            position.continuation_token = token;
        }

        info!(
            entity = entity,
            token = position.continuation_token,
            boundary = ?position.min_boundary,
            cap = self.settings.record_cap,
            "Starting entity sync"
        );

        let mut engine = CursorEngine::new(
            Arc::clone(&self.source),
            self.descriptor.endpoint,
            codec,
            position,
            self.settings.page_size,
            self.settings.record_cap,
        );

        let mut batch = RunBatch::new();
        while let Some(page) = engine.next_page().await? {
            let rows = flatten_page(
                &self.descriptor.strategy,
                &self.scope,
                &page.records,
                &self.source,
                self.settings.concurrency,
            )
            .await?;
            debug!(entity = entity, records = page.len(), rows = rows.len(), "Flattened page");
            batch.extend(rows);
        }

        let watermark = engine.watermark();
        let receipt = if batch.is_empty() {
            debug!(entity = entity, "No rows to ingest");
            None
        } else {
            let schema = self.descriptor.schema();
            let receipt = self.sink.ingest(&schema, batch.to_ndjson()?).await?;
            info!(
                entity = entity,
                ingestion_id = %receipt.ingestion_id,
                rows = receipt.rows,
                bytes = receipt.bytes,
                "Batch handed to sink"
            );
            self.report_outcomes().await;
            Some(receipt)
        };

        self.watermarks.write(entity, &watermark).await?;

        let summary = RunSummary {
            entity: entity.to_string(),
            pages: engine.pages_fetched(),
            records: engine.records_fetched(),
            rows: batch.len(),
            stop_reason: engine.stop_reason(),
            previous_watermark: previous,
            watermark,
            receipt,
            duration: start.elapsed(),
        };

        info!(
            entity = entity,
            records = summary.records,
            rows = summary.rows,
            watermark = %summary.watermark,
            stop = ?summary.stop_reason,
            "Entity sync complete in {:.2}s",
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    /// Wait for the destination to settle, then log recent outcomes.
    /// Never fails the run.
    async fn report_outcomes(&self) {
        if !self.settings.settle.is_zero() {
            tokio::time::sleep(self.settings.settle).await;
        }

        match self
            .sink
            .notifications(self.descriptor.name, self.settings.notification_limit).await {
            Ok(report) => {
                for failure in &report.failures {
                    error!(
                        entity = self.descriptor.name,
                        table = %failure.table,
                        ingestion_id = ?failure.ingestion_id,
                        message = ?failure.message,
                        "Ingestion failure reported"
                    );
                }
                for success in &report.successes {
                    debug!(
                        entity = self.descriptor.name,
                        table = %success.table,
                        ingestion_id = ?success.ingestion_id,
                        "Ingestion success reported"
                    );
                }
                info!(
                    entity = self.descriptor.name,
                    successes = report.successes.len(),
                    failures = report.failures.len(),
                    "Ingestion notifications"
                );
            },
            Err(e) => warn!(entity = self.descriptor.name, "Could not read ingestion notifications: {}", e),
        }
    }
}
