//! Shared in-memory fakes for pipeline and orchestrator tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relsync_common::{ProjectScope, Watermark};
use relsync_ingest::error::{IngestError, Result};
use relsync_ingest::schema::TableSchema;
use relsync_ingest::sink::{BatchSink, IngestReceipt, IngestionReport};
use relsync_ingest::source::{Endpoint, Page, PageQuery, SourceClient, SourceRecord};
use relsync_ingest::watermark::WatermarkStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub fn scope() -> ProjectScope {
    ProjectScope::new("contoso", "p-1")
}

pub fn release(id: i64, created_on: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Release-{}", id),
        "createdOn": created_on,
        "artifacts": [
            { "sourceId": format!("src-{}", id), "alias": "_app", "type": "Build", "isPrimary": true }
        ]
    })
}

pub fn deployment(id: i64, modified_on: &str) -> Value {
    json!({ "id": id, "lastModifiedOn": modified_on, "deploymentStatus": "succeeded" })
}

/// Full release object with one environment holding a Phase/Job/Task tree
pub fn release_detail(id: i64) -> Value {
    json!({
        "id": id,
        "environments": [{
            "id": id * 10,
            "releaseId": id,
            "name": "prod",
            "deploySteps": [{
                "id": 1,
                "releaseDeployPhases": [{
                    "runPlanId": format!("plan-{}", id),
                    "name": "Agent phase",
                    "status": "succeeded",
                    "deploymentJobs": [{
                        "job": { "timelineRecordId": format!("job-{}", id), "name": "Agent job" },
                        "tasks": [
                            { "timelineRecordId": format!("task-{}-a", id), "name": "Checkout" },
                            { "timelineRecordId": format!("task-{}-b", id), "name": "Deploy" }
                        ]
                    }]
                }]
            }]
        }]
    })
}

/// Source that serves id-ordered lists without continuation hints
#[derive(Default)]
pub struct FakeSource {
    pub definitions: Vec<Value>,
    pub releases: Vec<Value>,
    pub deployments: Vec<Value>,
    pub details: HashMap<i64, Value>,
    /// Endpoint path that answers with a server error
    pub fail_on: Option<&'static str>,
    /// Endpoint path that panics
    pub panic_on: Option<&'static str>,
    pub queries: Mutex<Vec<PageQuery>>,
    pub detail_calls: AtomicUsize,
}

impl FakeSource {
    pub fn queries(&self) -> Vec<PageQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

fn boundary_field(endpoint: Endpoint) -> Option<&'static str> {
    match endpoint {
        Endpoint::Definitions => None,
        Endpoint::Releases { .. } => Some("createdOn"),
        Endpoint::Deployments => Some("lastModifiedOn"),
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        self.queries.lock().unwrap().push(query.clone());
        let path = query.endpoint.path();

        if self.panic_on == Some(path) {
            panic!("source exploded on {}", path);
        }
        if self.fail_on == Some(path) {
            return Err(IngestError::Source {
                status: 500,
                url: format!("fake://{}", path),
            });
        }

        let items = match query.endpoint {
            Endpoint::Definitions => &self.definitions,
            Endpoint::Releases { .. } => &self.releases,
            Endpoint::Deployments => &self.deployments,
        };

        let records = items
            .iter()
            .filter(|item| item["id"].as_i64().unwrap() >= query.continuation_token)
            .filter(|item| match (boundary_field(query.endpoint), query.min_boundary) {
                (Some(field), Some(min)) => item[field]
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|ts| ts.with_timezone(&Utc) >= min)
                    .unwrap_or(true),
                _ => true,
            })
            .take(query.page_size)
            .cloned()
            .map(|item| SourceRecord::from_value(item).unwrap())
            .collect();

        Ok(Page::new(records, 0))
    }

    async fn fetch_release(&self, release_id: i64) -> Result<Value> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .get(&release_id)
            .cloned()
            .ok_or_else(|| IngestError::Source {
                status: 404,
                url: format!("fake://releases/{}", release_id),
            })
    }
}

/// Sink that keeps every batch in memory
#[derive(Default)]
pub struct RecordingSink {
    pub fail_ingest: bool,
    pub fail_notifications: bool,
    pub tables: Mutex<Vec<String>>,
    pub batches: Mutex<Vec<(String, Vec<Value>)>>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail_ingest: true,
            ..Self::default()
        }
    }

    /// Rows ingested into `table` across all batches
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl BatchSink for RecordingSink {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        self.tables.lock().unwrap().push(schema.table.clone());
        Ok(())
    }

    async fn ingest(&self, schema: &TableSchema, ndjson: Vec<u8>) -> Result<IngestReceipt> {
        if self.fail_ingest {
            return Err(IngestError::sink("destination unavailable"));
        }
        let rows: Vec<Value> = String::from_utf8(ndjson.clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let count = rows.len();
        self.batches.lock().unwrap().push((schema.table.clone(), rows));

        Ok(IngestReceipt {
            ingestion_id: Uuid::new_v4(),
            table: schema.table.clone(),
            rows: count,
            bytes: ndjson.len(),
        })
    }

    async fn notifications(&self, _table: &str, _limit: usize) -> Result<IngestionReport> {
        if self.fail_notifications {
            return Err(IngestError::sink("notifications unavailable"));
        }
        Ok(IngestionReport::default())
    }
}

/// Watermark store whose reads always fail
pub struct BrokenWatermarkStore;

#[async_trait]
impl WatermarkStore for BrokenWatermarkStore {
    async fn read(&self, entity: &str) -> Result<Option<String>> {
        Err(IngestError::watermark(format!("cannot read {}", entity)))
    }

    async fn write(&self, entity: &str, _cursor: &str) -> Result<Watermark> {
        Err(IngestError::watermark(format!("cannot write {}", entity)))
    }

    async fn history(&self, _entity: &str, _limit: usize) -> Result<Vec<Watermark>> {
        Ok(Vec::new())
    }
}
