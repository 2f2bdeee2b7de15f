//! Shared domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The organization/project pair a sync runs under.
///
/// Every watermark row and every flattened row carries both values, so the
/// same destination tables can hold several projects side by side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectScope {
    /// Organization name as it appears in the source URL (e.g. "contoso")
    pub organization_name: String,

    /// Project identifier (GUID string as reported by the source)
    pub project_id: String,
}

impl ProjectScope {
    pub fn new(organization_name: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            organization_name: organization_name.into(),
            project_id: project_id.into(),
        }
    }
}

impl std::fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.organization_name, self.project_id)
    }
}

/// One persisted resume marker.
///
/// Watermarks are append-only: each successful run adds a row and the most
/// recent `recorded_at` for an entity is the current value. The cursor string
/// is opaque here; only the pagination engine knows its layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Watermark {
    pub organization_name: String,
    pub project_id: String,
    pub entity_name: String,
    #[serde(rename = "WaterMarkValue")]
    pub cursor: String,
    #[serde(rename = "TimeStamp")]
    pub recorded_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(scope: &ProjectScope, entity_name: impl Into<String>, cursor: impl Into<String>) -> Self {
        Self {
            organization_name: scope.organization_name.clone(),
            project_id: scope.project_id.clone(),
            entity_name: entity_name.into(),
            cursor: cursor.into(),
            recorded_at: Utc::now(),
        }
    }
}
