//! Runs every entity pipeline side by side
//!
//! One tokio task per entity. A failing or panicking entity is reported in
//! its own [`EntityReport`] and never cancels its siblings.

use anyhow::Context;
use relsync_common::ProjectScope;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{SinkConfig, SyncConfig};
use crate::error::IngestError;
use crate::pipeline::{EntityPipeline, RunSummary};
use crate::sink::{BatchSink, DirectorySink, HttpSink};
use crate::source::{DevOpsClient, SourceClient};
use crate::watermark::{SqliteWatermarkStore, WatermarkStore};

/// Outcome of one entity within a sync
#[derive(Debug)]
pub struct EntityReport {
    pub entity: String,
    pub outcome: std::result::Result<RunSummary, IngestError>,
}

impl EntityReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Outcome of a whole sync
#[derive(Debug)]
pub struct SyncReport {
    pub entities: Vec<EntityReport>,
    pub duration: Duration,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.entities.iter().filter(|e| e.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entities.len() - self.succeeded()
    }

    /// True when at least one entity ran and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.entities.is_empty() && self.succeeded() == 0
    }

    pub fn get(&self, entity: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity == entity)
    }
}

pub struct Orchestrator {
    pipelines: Vec<Arc<EntityPipeline>>,
}

impl Orchestrator {
    /// Bootstrap every pipeline's table. Bootstrap failures are logged and
    /// the pipeline still runs; its ingest will surface the problem.
    pub async fn new(pipelines: Vec<EntityPipeline>) -> Self {
        for pipeline in &pipelines {
            if let Err(e) = pipeline.bootstrap().await {
                warn!(entity = pipeline.name(), "Table bootstrap failed: {}", e);
            }
        }

        Self {
            pipelines: pipelines.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build clients, stores and pipelines from configuration
    pub async fn from_config(config: &SyncConfig) -> anyhow::Result<Self> {
        let client = DevOpsClient::new(config.devops_config()).context("Failed to build source client")?;

        let project_id = match &config.project_id {
            Some(id) => id.clone(),
            None => client
                .project_id(&config.project)
                .await
                .with_context(|| format!("Failed to resolve project id for {}", config.project))?,
        };
        let scope = ProjectScope::new(&config.organization, project_id);
        info!(scope = %scope, "Resolved project scope");

        let watermarks: Arc<dyn WatermarkStore> = Arc::new(
            SqliteWatermarkStore::connect(&config.watermark_db_url, scope.clone())
                .await
                .context("Failed to open watermark store")?,
        );

        let sink: Arc<dyn BatchSink> = match &config.sink {
            SinkConfig::Http { url, token } => Arc::new(
                HttpSink::new(url, token.clone(), Duration::from_secs(config.http_timeout_secs))
                    .context("Failed to build HTTP sink")?,
            ),
            SinkConfig::Directory { path } => Arc::new(DirectorySink::new(path)),
        };

        let source: Arc<dyn SourceClient> = Arc::new(client);
        let pipelines = config
            .selected_entities()?
            .into_iter()
            .map(|descriptor| {
                EntityPipeline::new(
                    descriptor,
                    scope.clone(),
                    Arc::clone(&source),
                    Arc::clone(&sink),
                    Arc::clone(&watermarks),
                    config.pipeline_settings(descriptor),
                )
            })
            .collect();

        Ok(Self::new(pipelines).await)
    }

    pub fn entity_names(&self) -> Vec<&'static str> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    /// Run all pipelines concurrently and wait for every one of them
    pub async fn run_all(&self) -> SyncReport {
        let start = Instant::now();
        info!("Starting sync of {} entities", self.pipelines.len());

        let mut tasks = JoinSet::new();
        for pipeline in &self.pipelines {
            let pipeline = Arc::clone(pipeline);
            tasks.spawn(async move {
                let entity = pipeline.name();
                // Inner task so a panic surfaces as a JoinError we can attribute
                let outcome = match tokio::spawn(async move { pipeline.run().await }).await {
                    Ok(result) => result,
                    Err(e) => Err(IngestError::Task(format!("{} task failed: {}", entity, e))),
                };
                EntityReport {
                    entity: entity.to_string(),
                    outcome,
                }
            });
        }

        let mut entities = Vec::with_capacity(self.pipelines.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if let Err(e) = &report.outcome {
                        error!(entity = %report.entity, "Entity sync failed: {}", e);
                    }
                    entities.push(report);
                },
                Err(e) => error!("Entity supervisor task failed: {}", e),
            }
        }
        entities.sort_by(|a, b| a.entity.cmp(&b.entity));

        let report = SyncReport {
            entities,
            duration: start.elapsed(),
        };
        info!(
            "Sync complete: {} succeeded, {} failed in {:.2}s",
            report.succeeded(),
            report.failed(),
            report.duration.as_secs_f64()
        );
        report
    }
}
