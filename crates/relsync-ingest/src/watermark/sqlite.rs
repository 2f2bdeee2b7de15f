use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relsync_common::{ProjectScope, Watermark};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::WatermarkStore;
use crate::error::{IngestError, Result};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS watermarks (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_name TEXT NOT NULL,
    project_id        TEXT NOT NULL,
    entity_name       TEXT NOT NULL,
    watermark_value   TEXT NOT NULL,
    recorded_at       TEXT NOT NULL
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_watermarks_entity
    ON watermarks (organization_name, project_id, entity_name, recorded_at)
"#;

/// Watermark log in a SQLite database.
///
/// The table is append-only. Ties on `recorded_at` are broken by insertion
/// order through the autoincrement key.
#[derive(Debug, Clone)]
pub struct SqliteWatermarkStore {
    pool: SqlitePool,
    scope: ProjectScope,
}

impl SqliteWatermarkStore {
    /// Open (creating if needed) the database at `url` and ensure the table
    /// exists. `sqlite::memory:` is accepted for tests.
    pub async fn connect(url: &str, scope: ProjectScope) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // An in-memory database lives only as long as its single connection
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?
        };

        let store = Self::from_pool(pool, scope).await?;
        info!(url = url, scope = %store.scope, "Opened watermark store");
        Ok(store)
    }

    /// Use an existing pool; runs the idempotent table bootstrap
    pub async fn from_pool(pool: SqlitePool, scope: ProjectScope) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        Ok(Self { pool, scope })
    }

    fn row_to_watermark(row: &SqliteRow) -> Result<Watermark> {
        Ok(Watermark {
            organization_name: row.try_get("organization_name")?,
            project_id: row.try_get("project_id")?,
            entity_name: row.try_get("entity_name")?,
            cursor: row.try_get("watermark_value")?,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
        })
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn read(&self, entity: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT watermark_value
            FROM watermarks
            WHERE organization_name = ?1 AND project_id = ?2 AND entity_name = ?3
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&self.scope.organization_name)
        .bind(&self.scope.project_id)
        .bind(entity)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::watermark(format!("failed to read watermark for {}: {}", entity, e)))?;

        debug!(entity = entity, watermark = ?value, "Read watermark");
        Ok(value)
    }

    async fn write(&self, entity: &str, cursor: &str) -> Result<Watermark> {
        let mark = Watermark::new(&self.scope, entity, cursor);

        sqlx::query(
            r#"
            INSERT INTO watermarks
                (organization_name, project_id, entity_name, watermark_value, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&mark.organization_name)
        .bind(&mark.project_id)
        .bind(&mark.entity_name)
        .bind(&mark.cursor)
        .bind(mark.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::watermark(format!("failed to write watermark for {}: {}", entity, e)))?;

        debug!(entity = entity, watermark = cursor, "Wrote watermark");
        Ok(mark)
    }

    async fn history(&self, entity: &str, limit: usize) -> Result<Vec<Watermark>> {
        let rows = sqlx::query(
            r#"
            SELECT organization_name, project_id, entity_name, watermark_value, recorded_at
            FROM watermarks
            WHERE organization_name = ?1 AND project_id = ?2 AND entity_name = ?3
            ORDER BY recorded_at DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(&self.scope.organization_name)
        .bind(&self.scope.project_id)
        .bind(entity)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_watermark).collect()
    }
}
