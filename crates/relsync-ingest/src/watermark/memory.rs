use async_trait::async_trait;
use relsync_common::{ProjectScope, Watermark};
use std::sync::Mutex;

use super::WatermarkStore;
use crate::error::{IngestError, Result};

/// In-process watermark log, used by tests and dry runs
#[derive(Debug)]
pub struct MemoryWatermarkStore {
    scope: ProjectScope,
    rows: Mutex<Vec<Watermark>>,
}

impl MemoryWatermarkStore {
    pub fn new(scope: ProjectScope) -> Self {
        Self {
            scope,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Start from an existing set of rows
    pub fn with_rows(scope: ProjectScope, rows: Vec<Watermark>) -> Self {
        Self {
            scope,
            rows: Mutex::new(rows),
        }
    }

    /// Total number of rows across all entities and scopes
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching(&self, entity: &str) -> Result<Vec<Watermark>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| IngestError::watermark("watermark log lock poisoned"))?;

        // Later rows win ties on the timestamp, like an autoincrement key
        let mut matching: Vec<(usize, Watermark)> = rows
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.entity_name == entity
                    && w.organization_name == self.scope.organization_name
                    && w.project_id == self.scope.project_id
            })
            .map(|(i, w)| (i, w.clone()))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.recorded_at.cmp(&a.recorded_at).then(ib.cmp(ia)));
        Ok(matching.into_iter().map(|(_, w)| w).collect())
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn read(&self, entity: &str) -> Result<Option<String>> {
        Ok(self.matching(entity)?.into_iter().next().map(|w| w.cursor))
    }

    async fn write(&self, entity: &str, cursor: &str) -> Result<Watermark> {
        let mark = Watermark::new(&self.scope, entity, cursor);
        self.rows
            .lock()
            .map_err(|_| IngestError::watermark("watermark log lock poisoned"))?
            .push(mark.clone());
        Ok(mark)
    }

    async fn history(&self, entity: &str, limit: usize) -> Result<Vec<Watermark>> {
        let mut rows = self.matching(entity)?;
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn scope() -> ProjectScope {
        ProjectScope::new("contoso", "p-1")
    }

    #[tokio::test]
    async fn test_read_initial_state_is_empty() {
        let store = MemoryWatermarkStore::new(scope());
        assert_eq!(store.read("Release").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_latest_write_wins() {
        let store = MemoryWatermarkStore::new(scope());
        store.write("Release", "1,2023-01-01T00:00:00Z").await.unwrap();
        store.write("Release", "7,2023-01-02T00:00:00Z").await.unwrap();
        store.write("ReleaseDefinition", "99").await.unwrap();

        assert_eq!(
            store.read("Release").await.unwrap().as_deref(),
            Some("7,2023-01-02T00:00:00Z")
        );
        assert_eq!(store.history("Release", 10).await.unwrap().len(), 2);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_latest_is_resolved_by_timestamp_not_insertion_order() {
        let mut newer = Watermark::new(&scope(), "Release", "new");
        newer.recorded_at = Utc::now();
        let mut older = Watermark::new(&scope(), "Release", "old");
        older.recorded_at = newer.recorded_at - Duration::hours(1);

        let store = MemoryWatermarkStore::with_rows(scope(), vec![newer, older]);
        assert_eq!(store.read("Release").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_rows_from_other_projects_are_ignored() {
        let foreign = Watermark::new(&ProjectScope::new("contoso", "p-2"), "Release", "foreign");
        let store = MemoryWatermarkStore::with_rows(scope(), vec![foreign]);
        assert_eq!(store.read("Release").await.unwrap(), None);
    }
}
