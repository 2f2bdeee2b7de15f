//! REST ingestion endpoint
//!
//! ```text
//! GET  /v1/tables/{table}              200 if the table exists, 404 if not
//! PUT  /v1/tables/{table}              create table + mapping from a TableSchema
//! POST /v1/ingest?table=&mapping=      NDJSON body, accepted asynchronously
//! GET  /v1/ingest/notifications?table=&limit= recent outcomes for one table
//! ```

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{BatchSink, IngestReceipt, IngestionReport};
use crate::error::{IngestError, Result};
use crate::schema::TableSchema;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// [`BatchSink`] backed by an HTTP ingestion service
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn rejected(response: reqwest::Response, what: &str) -> IngestError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        IngestError::sink(format!("{} rejected with HTTP {}: {}", what, status.as_u16(), body))
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        let url = self.url(&format!("/v1/tables/{}", schema.table));

        let existing = self.authorize(self.client.get(&url)).send().await?;
        match existing.status() {
            status if status.is_success() => {
                debug!(table = %schema.table, "Table already exists");
                return Ok(());
            },
            StatusCode::NOT_FOUND => {},
            _ => return Err(Self::rejected(existing, "table lookup").await),
        }

        let created = self.authorize(self.client.put(&url)).json(schema).send().await?;
        if !created.status().is_success() {
            return Err(Self::rejected(created, "table creation").await);
        }

        info!(table = %schema.table, mapping = %schema.mapping, columns = schema.columns.len(), "Created table");
        Ok(())
    }

    async fn ingest(&self, schema: &TableSchema, ndjson: Vec<u8>) -> Result<IngestReceipt> {
        let ingestion_id = Uuid::new_v4();
        let id = ingestion_id.to_string();
        let bytes = ndjson.len();
        let rows = ndjson.iter().filter(|b| **b == b'\n').count();

        let response = self
            .authorize(self.client.post(self.url("/v1/ingest")))
            .query(&[
                ("table", schema.table.as_str()),
                ("mapping", schema.mapping.as_str()),
                ("ingestionId", id.as_str()),
            ])
            .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(ndjson)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response, "ingestion").await);
        }

        Ok(IngestReceipt {
            ingestion_id,
            table: schema.table.clone(),
            rows,
            bytes,
        })
    }

    async fn notifications(&self, table: &str, limit: usize) -> Result<IngestionReport> {
        let response = self
            .authorize(self.client.get(self.url("/v1/ingest/notifications")))
            .query(&[("table", table)])
            .query(&[("limit", limit)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response, "notification poll").await);
        }
        Ok(response.json().await?)
    }
}
