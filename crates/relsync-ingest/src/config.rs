//! Sync configuration
//!
//! Everything is read from `RELSYNC_*` environment variables (a `.env` file
//! is loaded by the binary first). CLI flags override individual values.
//!
//! | variable | default |
//! |---|---|
//! | `RELSYNC_ORGANIZATION` | required |
//! | `RELSYNC_PROJECT` | required |
//! | `RELSYNC_PROJECT_ID` | looked up from the project name |
//! | `RELSYNC_PAT_USER` / `RELSYNC_PAT` | `""` / required |
//! | `RELSYNC_RELEASE_API_URL` | `https://vsrm.dev.azure.com` |
//! | `RELSYNC_CORE_API_URL` | `https://dev.azure.com` |
//! | `RELSYNC_PAGE_SIZE` | 100 |
//! | `RELSYNC_CONCURRENCY` | 8 |
//! | `RELSYNC_SETTLE_SECS` | 10 |
//! | `RELSYNC_NOTIFICATION_LIMIT` | 50 |
//! | `RELSYNC_HTTP_TIMEOUT_SECS` | 60 |
//! | `RELSYNC_HTTP_MAX_RETRIES` | 3 |
//! | `RELSYNC_WATERMARK_DB` | `sqlite://relsync-watermarks.db` |
//! | `RELSYNC_SINK_URL` / `RELSYNC_SINK_TOKEN` | unset |
//! | `RELSYNC_SINK_DIR` | `./relsync-data` when no sink URL is set |
//! | `RELSYNC_ENTITIES` | all, comma separated |
//! | `RELSYNC_RECORD_CAP_<ENTITY>` | per-entity default |
//! | `RELSYNC_START_TOKEN_<ENTITY>` | unset |

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::entities::{self, EntityDescriptor};
use crate::error::IngestError;
use crate::pipeline::PipelineSettings;
use crate::source::DevOpsConfig;

const ENV_PREFIX: &str = "RELSYNC_";

/// Where run batches go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Http { url: String, token: Option<String> },
    Directory { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub organization: String,
    pub project: String,
    pub project_id: Option<String>,
    pub pat_user: String,
    pub pat: String,
    pub release_api_url: String,
    pub core_api_url: String,
    pub page_size: usize,
    pub concurrency: usize,
    pub settle_secs: u64,
    pub notification_limit: usize,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub watermark_db_url: String,
    pub sink: SinkConfig,
    /// Entity allow-list; empty means every entity
    pub entities: Vec<String>,
    /// Keyed by entity name as in the catalog
    pub record_caps: HashMap<String, usize>,
    pub start_tokens: HashMap<String, i64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            project: String::new(),
            project_id: None,
            pat_user: String::new(),
            pat: String::new(),
            release_api_url: "https://vsrm.dev.azure.com".to_string(),
            core_api_url: "https://dev.azure.com".to_string(),
            page_size: 100,
            concurrency: 8,
            settle_secs: 10,
            notification_limit: 50,
            http_timeout_secs: 60,
            http_max_retries: 3,
            watermark_db_url: "sqlite://relsync-watermarks.db".to_string(),
            sink: SinkConfig::Directory {
                path: PathBuf::from("./relsync-data"),
            },
            entities: Vec::new(),
            record_caps: HashMap::new(),
            start_tokens: HashMap::new(),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e)),
        _ => Ok(None),
    }
}

fn entity_key(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl SyncConfig {
    /// Load from the process environment and validate
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup and validate
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let sink = match (var("SINK_URL"), var("SINK_DIR")) {
            (Some(_), Some(_)) => bail!("Set only one of RELSYNC_SINK_URL and RELSYNC_SINK_DIR"),
            (Some(url), None) => SinkConfig::Http {
                url,
                token: var("SINK_TOKEN"),
            },
            (None, Some(dir)) => SinkConfig::Directory {
                path: PathBuf::from(dir),
            },
            (None, None) => defaults.sink.clone(),
        };

        let mut record_caps = HashMap::new();
        let mut start_tokens = HashMap::new();
        for descriptor in entities::catalog() {
            let key = entity_key(descriptor.name);
            if let Some(cap) = parse_var(&lookup, &format!("{}RECORD_CAP_{}", ENV_PREFIX, key))? {
                record_caps.insert(descriptor.name.to_string(), cap);
            }
            if let Some(token) = parse_var(&lookup, &format!("{}START_TOKEN_{}", ENV_PREFIX, key))? {
                start_tokens.insert(descriptor.name.to_string(), token);
            }
        }

        let numeric = |name: &str| format!("{}{}", ENV_PREFIX, name);
        let config = Self {
            organization: var("ORGANIZATION").unwrap_or_default(),
            project: var("PROJECT").unwrap_or_default(),
            project_id: var("PROJECT_ID"),
            pat_user: var("PAT_USER").unwrap_or_default(),
            pat: var("PAT").unwrap_or_default(),
            release_api_url: var("RELEASE_API_URL").unwrap_or(defaults.release_api_url),
            core_api_url: var("CORE_API_URL").unwrap_or(defaults.core_api_url),
            page_size: parse_var(&lookup, &numeric("PAGE_SIZE"))?.unwrap_or(defaults.page_size),
            concurrency: parse_var(&lookup, &numeric("CONCURRENCY"))?.unwrap_or(defaults.concurrency),
            settle_secs: parse_var(&lookup, &numeric("SETTLE_SECS"))?.unwrap_or(defaults.settle_secs),
            notification_limit: parse_var(&lookup, &numeric("NOTIFICATION_LIMIT"))?
                .unwrap_or(defaults.notification_limit),
            http_timeout_secs: parse_var(&lookup, &numeric("HTTP_TIMEOUT_SECS"))?
                .unwrap_or(defaults.http_timeout_secs),
            http_max_retries: parse_var(&lookup, &numeric("HTTP_MAX_RETRIES"))?
                .unwrap_or(defaults.http_max_retries),
            watermark_db_url: var("WATERMARK_DB").unwrap_or(defaults.watermark_db_url),
            sink,
            entities: var("ENTITIES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            record_caps,
            start_tokens,
        };

        config.validate().context("Invalid relsync configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            bail!("RELSYNC_ORGANIZATION is required");
        }
        if self.project.trim().is_empty() {
            bail!("RELSYNC_PROJECT is required");
        }
        if self.pat.is_empty() {
            bail!("RELSYNC_PAT is required");
        }
        if self.page_size == 0 {
            bail!("Page size must be greater than zero");
        }
        if self.concurrency == 0 {
            bail!("Concurrency must be greater than zero");
        }
        if let Some((name, _)) = self.record_caps.iter().find(|(_, cap)| **cap == 0) {
            bail!("Record cap for {} must be greater than zero", name);
        }
        self.selected_entities()?;
        Ok(())
    }

    /// Entities to run, in catalog order
    pub fn selected_entities(&self) -> std::result::Result<Vec<&'static EntityDescriptor>, IngestError> {
        if self.entities.is_empty() {
            return Ok(entities::catalog().iter().collect());
        }

        let mut selected = Vec::new();
        for name in &self.entities {
            let descriptor = entities::find(name)
                .ok_or_else(|| IngestError::config(format!("Unknown entity: {}", name)))?;
            if !selected.iter().any(|d: &&EntityDescriptor| d.name == descriptor.name) {
                selected.push(descriptor);
            }
        }
        selected.sort_by_key(|d| entities::catalog().iter().position(|c| c.name == d.name));
        Ok(selected)
    }

    pub fn record_cap(&self, descriptor: &EntityDescriptor) -> usize {
        self.record_caps
            .get(descriptor.name)
            .copied()
            .unwrap_or(descriptor.default_cap)
    }

    pub fn pipeline_settings(&self, descriptor: &EntityDescriptor) -> PipelineSettings {
        PipelineSettings {
            page_size: self.page_size,
            concurrency: self.concurrency,
            settle: Duration::from_secs(self.settle_secs),
            notification_limit: self.notification_limit,
            record_cap: self.record_cap(descriptor),
            start_token: self.start_tokens.get(descriptor.name).copied(),
        }
    }

    pub fn devops_config(&self) -> DevOpsConfig {
        DevOpsConfig {
            organization: self.organization.clone(),
            project: self.project.clone(),
            release_base_url: self.release_api_url.clone(),
            core_base_url: self.core_api_url.clone(),
            user: self.pat_user.clone(),
            token: self.pat.clone(),
            timeout_secs: self.http_timeout_secs,
            max_retries: self.http_max_retries,
            ..DevOpsConfig::default()
        }
    }
}
