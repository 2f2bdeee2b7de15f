//! Hierarchical record flattening
//!
//! Turns one source record (or the full object fetched for it) into a flat
//! list of [`FlattenedRow`]s. Nested collections are described declaratively
//! with [`LevelSpec`] trees:
//!
//! ```text
//! environments            (structural: lineage only, no row)
//! └── deploySteps         (structural)
//!     └── releaseDeployPhases  -> "Phase" rows
//!         └── deploymentJobs   -> "Job" rows (payload = `job`)
//!             └── tasks        -> "Task" rows
//! ```
//!
//! Each emitted row points at the nearest emitting ancestor through
//! `ParentId`, and carries every lineage column captured on the way down.

use futures::stream::{self, StreamExt};
use relsync_common::ProjectScope;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::source::{SourceClient, SourceRecord};

/// One output row with its linkage metadata and payload
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedRow {
    pub type_tag: String,
    pub id: Option<String>,
    /// Weak back-reference to the parent row's `id`
    pub parent_id: Option<String>,
    pub organization_name: String,
    pub project_id: String,
    /// Identifiers inherited from ancestors, e.g. `ReleaseId`
    pub lineage: Map<String, Value>,
    pub payload: Map<String, Value>,
}

impl FlattenedRow {
    /// The row as one flat JSON object.
    ///
    /// Payload fields come first; lineage and metadata overwrite payload keys
    /// of the same name.
    pub fn to_value(&self) -> Value {
        let mut object = self.payload.clone();
        for (key, value) in &self.lineage {
            object.insert(key.clone(), value.clone());
        }
        object.insert("Type".to_string(), Value::String(self.type_tag.clone()));
        if let Some(id) = &self.id {
            object.insert("RowId".to_string(), Value::String(id.clone()));
        }
        if let Some(parent) = &self.parent_id {
            object.insert("ParentId".to_string(), Value::String(parent.clone()));
        }
        object.insert(
            "OrganizationName".to_string(),
            Value::String(self.organization_name.clone()),
        );
        object.insert("ProjectId".to_string(), Value::String(self.project_id.clone()));
        Value::Object(object)
    }
}

impl Serialize for FlattenedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// One level of a nested collection
#[derive(Debug, Clone, Copy)]
pub struct LevelSpec {
    /// Key of the array on the parent node
    pub collection: &'static str,
    /// Type-tag of emitted rows; `None` makes the level structural
    pub tag: Option<&'static str>,
    /// Sub-object of the node used as the row payload instead of the node
    pub payload: Option<&'static str>,
    /// Payload field holding the row id
    pub id_field: Option<&'static str>,
    /// `(column, node field)` pairs captured for this node and its descendants
    pub lineage: &'static [(&'static str, &'static str)],
    /// Payload keys removed before emitting, usually child collections
    pub strip: &'static [&'static str],
    pub children: &'static [LevelSpec],
}

impl LevelSpec {
    pub const fn structural(collection: &'static str) -> Self {
        Self {
            collection,
            tag: None,
            payload: None,
            id_field: None,
            lineage: &[],
            strip: &[],
            children: &[],
        }
    }

    pub const fn emitting(collection: &'static str, tag: &'static str, id_field: &'static str) -> Self {
        Self {
            collection,
            tag: Some(tag),
            payload: None,
            id_field: Some(id_field),
            lineage: &[],
            strip: &[],
            children: &[],
        }
    }

    pub const fn payload(mut self, key: &'static str) -> Self {
        self.payload = Some(key);
        self
    }

    pub const fn lineage(mut self, lineage: &'static [(&'static str, &'static str)]) -> Self {
        self.lineage = lineage;
        self
    }

    pub const fn strip(mut self, keys: &'static [&'static str]) -> Self {
        self.strip = keys;
        self
    }

    pub const fn children(mut self, children: &'static [LevelSpec]) -> Self {
        self.children = children;
        self
    }
}

/// A tree rooted at one record
#[derive(Debug, Clone, Copy)]
pub struct TreeSpec {
    /// Lineage captured from the root record itself
    pub root_lineage: &'static [(&'static str, &'static str)],
    pub levels: &'static [LevelSpec],
}

/// How an entity's records become rows
#[derive(Debug, Clone, Copy)]
pub enum FlattenStrategy {
    /// One record, one row tagged `tag`
    Shallow { tag: &'static str },
    /// Walk a tree embedded in the list record
    Tree(TreeSpec),
    /// Fetch the full release for each record, then walk the tree
    Detail(TreeSpec),
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Flatten a record into a single row
pub fn flatten_shallow(scope: &ProjectScope, tag: &str, record: &SourceRecord) -> Result<FlattenedRow> {
    let payload = match &record.body {
        Value::Object(map) => map.clone(),
        other => {
            return Err(IngestError::decode(format!(
                "record {} is not an object: {}",
                record.id, other
            )))
        },
    };

    Ok(FlattenedRow {
        type_tag: tag.to_string(),
        id: Some(record.id.to_string()),
        parent_id: None,
        organization_name: scope.organization_name.clone(),
        project_id: scope.project_id.clone(),
        lineage: Map::new(),
        payload,
    })
}

/// Walk `tree` from `root` and emit one row per node of every tagged level
pub fn flatten_tree(scope: &ProjectScope, tree: &TreeSpec, root: &Value) -> Vec<FlattenedRow> {
    let mut lineage = Map::new();
    capture_lineage(&mut lineage, tree.root_lineage, root);

    let mut rows = Vec::new();
    for level in tree.levels {
        visit(scope, level, root, &lineage, None, &mut rows);
    }
    rows
}

fn capture_lineage(lineage: &mut Map<String, Value>, pairs: &[(&str, &str)], node: &Value) {
    for (column, field) in pairs {
        if let Some(value) = node.get(*field) {
            lineage.insert((*column).to_string(), value.clone());
        }
    }
}

fn visit(
    scope: &ProjectScope,
    level: &LevelSpec,
    parent: &Value,
    lineage: &Map<String, Value>,
    parent_id: Option<&str>,
    rows: &mut Vec<FlattenedRow>,
) {
    let Some(nodes) = parent.get(level.collection).and_then(Value::as_array) else {
        return;
    };

    for node in nodes {
        let mut node_lineage = lineage.clone();
        capture_lineage(&mut node_lineage, level.lineage, node);

        let child_parent = match level.tag {
            Some(tag) => {
                let body = level.payload.and_then(|key| node.get(key)).unwrap_or(node);
                let row_id = level
                    .id_field
                    .and_then(|field| body.get(field))
                    .and_then(id_string);

                let mut payload = body.as_object().cloned().unwrap_or_default();
                for key in level.strip {
                    payload.remove(*key);
                }

                rows.push(FlattenedRow {
                    type_tag: tag.to_string(),
                    id: row_id.clone(),
                    parent_id: parent_id.map(str::to_string),
                    organization_name: scope.organization_name.clone(),
                    project_id: scope.project_id.clone(),
                    lineage: node_lineage.clone(),
                    payload,
                });
                row_id
            },
            None => parent_id.map(str::to_string),
        };

        for child in level.children {
            visit(scope, child, node, &node_lineage, child_parent.as_deref(), rows);
        }
    }
}

/// Flatten one page of records.
///
/// `Detail` strategies fetch each release with up to `concurrency` requests
/// in flight. Every record's rows are fully built before they are appended,
/// so one record's subtree is never interleaved with another's. Any fetch
/// error fails the whole page.
pub async fn flatten_page(
    strategy: &FlattenStrategy,
    scope: &ProjectScope,
    records: &[SourceRecord],
    source: &Arc<dyn SourceClient>,
    concurrency: usize,
) -> Result<Vec<FlattenedRow>> {
    match strategy {
        FlattenStrategy::Shallow { tag } => records
            .iter()
            .map(|record| flatten_shallow(scope, tag, record))
            .collect(),
        FlattenStrategy::Tree(tree) => Ok(records
            .iter()
            .flat_map(|record| flatten_tree(scope, tree, &record.body))
            .collect()),
        FlattenStrategy::Detail(tree) => {
            let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
            let mut fetched = stream::iter(ids)
                .map(|release_id| {
                    let source = Arc::clone(source);
                    async move {
                        let detail = source.fetch_release(release_id).await?;
                        let rows = flatten_tree(scope, tree, &detail);
                        debug!(release = release_id, rows = rows.len(), "Flattened release detail");
                        Ok::<_, IngestError>(rows)
                    }
                })
                .buffer_unordered(concurrency.max(1));

            let mut rows = Vec::new();
            while let Some(result) = fetched.next().await {
                rows.extend(result?);
            }
            Ok(rows)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARTS: &[LevelSpec] = &[LevelSpec::emitting("parts", "Part", "key")];
    const ITEMS: &[LevelSpec] = &[LevelSpec::emitting("items", "Item", "key")
        .strip(&["parts"])
        .children(PARTS)];
    const TREE: TreeSpec = TreeSpec {
        root_lineage: &[("ReleaseId", "id")],
        levels: ITEMS,
    };

    fn scope() -> ProjectScope {
        ProjectScope::new("contoso", "p-1")
    }

    #[test]
    fn test_shallow_row_merges_context() {
        let record = SourceRecord::from_value(json!({ "id": 7, "name": "Release-7" })).unwrap();
        let row = flatten_shallow(&scope(), "Release", &record).unwrap();
        let value = row.to_value();

        assert_eq!(value["Type"], "Release");
        assert_eq!(value["RowId"], "7");
        assert_eq!(value["OrganizationName"], "contoso");
        assert_eq!(value["ProjectId"], "p-1");
        assert_eq!(value["name"], "Release-7");
        assert!(value.get("ParentId").is_none());
    }

    #[test]
    fn test_tree_links_children_and_strips_collections() {
        let root = json!({
            "id": 3,
            "items": [
                { "key": "a", "parts": [{ "key": "a1" }, { "key": "a2" }] },
                { "key": "b" }
            ]
        });
        let rows = flatten_tree(&scope(), &TREE, &root);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].type_tag, "Item");
        assert!(rows[0].payload.get("parts").is_none());
        assert_eq!(rows[1].parent_id.as_deref(), Some("a"));
        assert_eq!(rows[2].parent_id.as_deref(), Some("a"));
        assert_eq!(rows[3].id.as_deref(), Some("b"));
        assert!(rows.iter().all(|r| r.lineage["ReleaseId"] == json!(3)));
    }

    #[test]
    fn test_parent_without_id_yields_unlinked_children() {
        let root = json!({ "items": [{ "parts": [{ "key": "x" }] }] });
        let rows = flatten_tree(&scope(), &TREE, &root);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, None);
        assert_eq!(rows[1].parent_id, None);
    }

    #[test]
    fn test_metadata_overrides_payload_keys() {
        let record = SourceRecord::from_value(json!({ "id": 1, "ProjectId": "spoofed" })).unwrap();
        let value = flatten_shallow(&scope(), "Release", &record).unwrap().to_value();
        assert_eq!(value["ProjectId"], "p-1");
    }
}
