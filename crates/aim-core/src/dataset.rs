//! # Datasets
//!
//! A dataset is one implementation's view of the whole store. It exists in
//! two forms:
//!
//! - [`RawDataset`]: per table, the declared column list (when the source
//!   has one) and every row as a JSON object. Structural validation runs on
//!   this form because it must see fields the typed records would drop or
//!   default.
//! - [`Dataset`]: the five typed collections. Built from a raw dataset by
//!   [`Dataset::from_raw`], which never fails as a whole; rows that do not
//!   convert are returned alongside as [`RejectedRow`]s.
//!
//! Neither form is mutated after construction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{
    AgentGuide, ClaudeProvider, CodexProvider, CommonConfig, Entity, EntityKind, McpServer,
};
use crate::error::CoreError;

/// A JSON object row.
pub type Row = Map<String, Value>;

/// One table as read from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Column names declared by the storage engine. `None` for sources
    /// without a declared schema (JSON exports).
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Row>,
}

impl RawTable {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            columns: None,
            rows,
        }
    }

    pub fn with_columns(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns: Some(columns),
            rows,
        }
    }

    /// Field names present in this table.
    ///
    /// Declared columns when known, otherwise the union of keys across all
    /// rows (empty for an empty table).
    pub fn field_names(&self) -> BTreeSet<String> {
        match &self.columns {
            Some(cols) => cols.iter().cloned().collect(),
            None => self
                .rows
                .iter()
                .flat_map(|row| row.keys().cloned())
                .collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// The five tables of one store, untyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    /// Schema version tag carried by the export, if any.
    pub version: Option<String>,
    tables: BTreeMap<EntityKind, RawTable>,
}

impl RawDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add or replace a table.
    pub fn insert_table(&mut self, kind: EntityKind, table: RawTable) {
        self.tables.insert(kind, table);
    }

    /// Builder form of [`insert_table`](Self::insert_table).
    pub fn with_table(mut self, kind: EntityKind, table: RawTable) -> Self {
        self.insert_table(kind, table);
        self
    }

    pub fn table(&self, kind: EntityKind) -> Option<&RawTable> {
        self.tables.get(&kind)
    }

    pub fn has_table(&self, kind: EntityKind) -> bool {
        self.tables.contains_key(&kind)
    }

    /// Build from an export document of the form
    /// `{"version": ..., "claude_providers": [...], ...}`.
    ///
    /// A table key that is absent leaves the table missing; a table key
    /// whose value is not an array of objects is a malformed document.
    /// Unknown top-level keys are ignored.
    pub fn from_json_document(doc: &Value) -> Result<Self, CoreError> {
        let obj = doc.as_object().ok_or_else(|| {
            CoreError::MalformedDocument("top-level value is not an object".to_string())
        })?;

        let mut dataset = RawDataset {
            version: obj.get("version").and_then(version_tag),
            tables: BTreeMap::new(),
        };

        for kind in EntityKind::ALL {
            let Some(value) = obj.get(kind.table_name()) else {
                continue;
            };
            let items = value.as_array().ok_or_else(|| {
                CoreError::MalformedDocument(format!("{kind} is not an array"))
            })?;
            let rows = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_object().cloned().ok_or_else(|| {
                        CoreError::MalformedDocument(format!("{kind}[{i}] is not an object"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            dataset.insert_table(kind, RawTable::from_rows(rows));
        }

        Ok(dataset)
    }

    /// Parse and build from export JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let doc: Value =
            serde_json::from_str(text).map_err(|e| CoreError::MalformedDocument(e.to_string()))?;
        Self::from_json_document(&doc)
    }
}

fn version_tag(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A row that could not be converted into its typed record.
#[derive(Debug)]
pub struct RejectedRow {
    pub kind: EntityKind,
    /// Position in the raw table.
    pub index: usize,
    /// The row's `id`, if it had an integer one.
    pub id: Option<i64>,
    pub error: CoreError,
}

/// The five typed collections of one store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema_version: Option<String>,
    pub claude_providers: Vec<ClaudeProvider>,
    pub codex_providers: Vec<CodexProvider>,
    pub agent_guides: Vec<AgentGuide>,
    pub mcp_servers: Vec<McpServer>,
    pub common_configs: Vec<CommonConfig>,
}

impl Dataset {
    /// Convert every row of `raw`. Missing tables yield empty collections.
    pub fn from_raw(raw: &RawDataset) -> (Self, Vec<RejectedRow>) {
        let mut rejected = Vec::new();
        let dataset = Dataset {
            schema_version: raw.version.clone(),
            claude_providers: convert(raw, &mut rejected),
            codex_providers: convert(raw, &mut rejected),
            agent_guides: convert(raw, &mut rejected),
            mcp_servers: convert(raw, &mut rejected),
            common_configs: convert(raw, &mut rejected),
        };
        (dataset, rejected)
    }

    /// The collection holding records of type `E`.
    pub fn records<E: Collected>(&self) -> &[E] {
        E::collection(self)
    }

    /// Number of records of `kind`.
    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::ClaudeProvider => self.claude_providers.len(),
            EntityKind::CodexProvider => self.codex_providers.len(),
            EntityKind::AgentGuide => self.agent_guides.len(),
            EntityKind::McpServer => self.mcp_servers.len(),
            EntityKind::CommonConfig => self.common_configs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.into_iter().all(|k| self.len(k) == 0)
    }
}

/// An entity type with a home collection in [`Dataset`].
pub trait Collected: Entity {
    fn collection(dataset: &Dataset) -> &[Self];
}

impl Collected for ClaudeProvider {
    fn collection(dataset: &Dataset) -> &[Self] {
        &dataset.claude_providers
    }
}

impl Collected for CodexProvider {
    fn collection(dataset: &Dataset) -> &[Self] {
        &dataset.codex_providers
    }
}

impl Collected for AgentGuide {
    fn collection(dataset: &Dataset) -> &[Self] {
        &dataset.agent_guides
    }
}

impl Collected for McpServer {
    fn collection(dataset: &Dataset) -> &[Self] {
        &dataset.mcp_servers
    }
}

impl Collected for CommonConfig {
    fn collection(dataset: &Dataset) -> &[Self] {
        &dataset.common_configs
    }
}

fn convert<E: Entity>(raw: &RawDataset, rejected: &mut Vec<RejectedRow>) -> Vec<E> {
    let Some(table) = raw.table(E::KIND) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(table.rows.len());
    for (index, row) in table.rows.iter().enumerate() {
        match serde_json::from_value::<E>(Value::Object(row.clone())) {
            Ok(record) => out.push(record),
            Err(e) => rejected.push(RejectedRow {
                kind: E::KIND,
                index,
                id: row.get("id").and_then(Value::as_i64),
                error: CoreError::RecordConversion {
                    kind: E::KIND,
                    reason: e.to_string(),
                },
            }),
        }
    }
    out
}
