//! Destination table schemas
//!
//! A table is described by `(column, kind, JSON path)` triples. The same
//! description drives the sink's table/mapping bootstrap and the directory
//! sink's projection of flattened rows into columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column storage type in the destination store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    String,
    Int,
    Long,
    Real,
    Bool,
    DateTime,
    /// Arbitrary nested JSON kept as-is
    Dynamic,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::String => "string",
            ColumnKind::Int => "int",
            ColumnKind::Long => "long",
            ColumnKind::Real => "real",
            ColumnKind::Bool => "bool",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Dynamic => "dynamic",
        }
    }
}

/// One column and the JSON path it is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// `$.a.b` style path into a flattened row
    pub path: &'static str,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, kind: ColumnKind, path: &'static str) -> Self {
        Self { name, kind, path }
    }
}

/// Wire form of a column, as sent to the sink and written next to local data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub column: String,
    pub kind: ColumnKind,
    pub path: String,
}

/// A destination table plus the name of its JSON ingestion mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub mapping: String,
    pub columns: Vec<ColumnMapping>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, mapping: impl Into<String>, columns: &[ColumnSpec]) -> Self {
        Self {
            table: table.into(),
            mapping: mapping.into(),
            columns: columns
                .iter()
                .map(|c| ColumnMapping {
                    column: c.name.to_string(),
                    kind: c.kind,
                    path: c.path.to_string(),
                })
                .collect(),
        }
    }

    /// Project one row onto the table's columns.
    ///
    /// Columns whose path does not resolve are emitted as `null` so every
    /// projected object carries the full column set.
    pub fn project(&self, row: &Value) -> Map<String, Value> {
        self.columns
            .iter()
            .map(|c| {
                let value = resolve(row, &c.path).cloned().unwrap_or(Value::Null);
                (c.column.clone(), value)
            })
            .collect()
    }
}

/// Resolve a `$.a.b.c` path against a JSON value.
///
/// Each segment is matched exactly first and then case-insensitively, since
/// row metadata is PascalCase while source payloads are camelCase.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.strip_prefix('$').unwrap_or(path);
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Some(value);
    }

    trimmed.split('.').try_fold(value, |current, segment| {
        let object = current.as_object()?;
        object.get(segment).or_else(|| {
            object
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(segment))
                .map(|(_, v)| v)
        })
    })
}
