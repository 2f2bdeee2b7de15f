//! Azure DevOps release-management REST client
//!
//! Lists are read from `{release_base}/{org}/{project}/_apis/release/...`
//! in ascending order. The next-continuation hint comes back in the
//! `x-ms-continuationtoken` response header.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Endpoint, Page, PageQuery, SourceClient, SourceRecord};
use crate::error::{IngestError, Result};

/// Response header carrying the server's continuation hint
pub const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// Connection settings for [`DevOpsClient`]
#[derive(Debug, Clone)]
pub struct DevOpsConfig {
    pub organization: String,
    /// Project name or id as used in URLs
    pub project: String,
    /// Release-management API root (e.g. `https://vsrm.dev.azure.com`)
    pub release_base_url: String,
    /// Core API root used for project lookup (e.g. `https://dev.azure.com`)
    pub core_base_url: String,
    pub user: String,
    /// Personal access token
    pub token: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Base delay between attempts; multiplied by the attempt number
    pub retry_delay: Duration,
}

impl Default for DevOpsConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            project: String::new(),
            release_base_url: "https://vsrm.dev.azure.com".to_string(),
            core_base_url: "https://dev.azure.com".to_string(),
            user: String::new(),
            token: String::new(),
            timeout_secs: 60,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// HTTP implementation of [`SourceClient`]
#[derive(Debug, Clone)]
pub struct DevOpsClient {
    client: Client,
    config: DevOpsConfig,
}

impl DevOpsClient {
    pub fn new(config: DevOpsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("relsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn release_api(&self, tail: &str) -> String {
        format!(
            "{}/{}/{}/_apis/release/{}",
            self.config.release_base_url.trim_end_matches('/'),
            self.config.organization,
            self.config.project,
            tail
        )
    }

    /// Resolve a project name to its id through the core API
    pub async fn project_id(&self, project_name: &str) -> Result<String> {
        let url = format!(
            "{}/{}/_apis/projects/{}",
            self.config.core_base_url.trim_end_matches('/'),
            self.config.organization,
            project_name
        );
        let body: Value = self.get(&url, &[]).await?.json().await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| IngestError::decode(format!("project {} has no id", project_name)))
    }

    /// GET with bounded retry on transient failures
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let max_retries = self.config.max_retries.max(1);

        for attempt in 1..=max_retries {
            debug!("GET attempt {}/{} for: {}", attempt, max_retries, url);

            let result = self
                .client
                .get(url)
                .basic_auth(&self.config.user, Some(&self.config.token))
                .query(query)
                .send()
                .await
                .map_err(IngestError::from)
                .and_then(|response| check_status(response, url));

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    let delay = self.config.retry_delay * attempt;
                    warn!(
                        "GET attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt, max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }

        Err(IngestError::Source {
            status: 0,
            url: url.to_string(),
        })
    }
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(IngestError::Source {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

/// Read the continuation hint header; absent or unparsable means none
fn continuation_hint(response: &reqwest::Response) -> i64 {
    response
        .headers()
        .get(CONTINUATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn page_params(query: &PageQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    let boundary = query
        .min_boundary
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true));

    match query.endpoint {
        Endpoint::Definitions => {
            params.push(("queryOrder", "idAscending".to_string()));
        },
        Endpoint::Releases { expand } => {
            params.push(("queryOrder", "ascending".to_string()));
            if let Some(ts) = boundary {
                params.push(("minCreatedTime", ts));
            }
            if let Some(expand) = expand {
                params.push(("$expand", expand.to_string()));
            }
        },
        Endpoint::Deployments => {
            params.push(("queryOrder", "ascending".to_string()));
            if let Some(ts) = boundary {
                params.push(("minModifiedTime", ts));
            }
        },
    }

    params.push(("continuationToken", query.continuation_token.to_string()));
    params.push(("$top", query.page_size.to_string()));
    params
}

fn records_from_body(body: Value) -> Result<Vec<SourceRecord>> {
    match body {
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(items)) => items.into_iter().map(SourceRecord::from_value).collect(),
            _ => Err(IngestError::decode("page body has no `value` array")),
        },
        _ => Err(IngestError::decode("page body is not a JSON object")),
    }
}

#[async_trait]
impl SourceClient for DevOpsClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        let url = self.release_api(query.endpoint.path());
        let response = self.get(&url, &page_params(query)).await?;
        let hint = continuation_hint(&response);
        let body: Value = response.json().await?;
        let records = records_from_body(body)?;

        debug!(
            endpoint = query.endpoint.path(),
            records = records.len(),
            hint = hint,
            "Received page"
        );
        Ok(Page::new(records, hint))
    }

    async fn fetch_release(&self, release_id: i64) -> Result<Value> {
        let url = self.release_api(&format!("releases/{}", release_id));
        let response = self.get(&url, &[]).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Err(IngestError::decode(format!("release {} returned no content", release_id)));
        }
        Ok(response.json().await?)
    }
}
