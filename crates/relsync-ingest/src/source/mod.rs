//! Source collaborator: paginated release-management REST API
//!
//! The pipeline only sees the [`SourceClient`] trait. [`DevOpsClient`] is the
//! HTTP implementation; tests substitute in-memory fakes.

mod devops;

pub use devops::{DevOpsClient, DevOpsConfig, CONTINUATION_HEADER};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{IngestError, Result};

/// Which list endpoint a page is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Release definitions, ordered by ascending id, token-only paging
    Definitions,
    /// Releases ordered by ascending creation, with an optional `$expand`
    Releases { expand: Option<&'static str> },
    /// Deployments ordered by ascending modification time
    Deployments,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Definitions => "definitions",
            Endpoint::Releases { .. } => "releases",
            Endpoint::Deployments => "deployments",
        }
    }
}

/// Parameters for one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub endpoint: Endpoint,
    pub continuation_token: i64,
    /// Inclusive lower bound on creation/modification time
    pub min_boundary: Option<DateTime<Utc>>,
    pub page_size: usize,
}

/// One record of a page. The full JSON body travels with its integer id.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: i64,
    pub body: Value,
}

impl SourceRecord {
    /// Wrap a JSON item, requiring an integer `id`
    pub fn from_value(body: Value) -> Result<Self> {
        let id = body
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| IngestError::decode(format!("record has no integer id: {}", body)))?;
        Ok(Self { id, body })
    }

    /// Read a timestamp field (RFC 3339) from the record body
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.body.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Records returned by one fetch plus the server's next-continuation hint
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub records: Vec<SourceRecord>,
    /// `0` when the server supplied no hint
    pub continuation_hint: i64,
}

impl Page {
    pub fn new(records: Vec<SourceRecord>, continuation_hint: i64) -> Self {
        Self {
            records,
            continuation_hint,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&SourceRecord> {
        self.records.last()
    }
}

/// Read access to the paginated source
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page for the given resume position
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page>;

    /// Fetch the full release object, including environments and their
    /// deploy-step trees, which list endpoints do not embed
    async fn fetch_release(&self, release_id: i64) -> Result<Value>;
}
