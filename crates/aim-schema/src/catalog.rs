//! # Field Catalog
//!
//! The fixed, per-table list of fields each implementation must store, with
//! the primitive type of each. The catalog is data, not code: every check in
//! [`crate::validate`] is driven from it, and each table's entry compiles to
//! a JSON Schema (Draft 2020-12) used to type-check rows.
//!
//! ## Revisions
//!
//! Two incompatible layouts of `claude_providers` exist in the wild. The
//! current layout stores per-tier model names (`opus_model`, `sonnet_model`,
//! `haiku_model`); the legacy layout stores generation parameters
//! (`max_tokens`, `temperature`, `model`). They are distinct revisions, not
//! a single schema with a bug. All other tables are identical across
//! revisions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use aim_core::{EntityKind, RawDataset};

/// Primitive type of a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    /// Text column that may be null (column default applies).
    OptionalString,
    Integer,
    /// Integer column that may be null (column default applies).
    OptionalInteger,
    Real,
    /// Real column that may be null (column default applies).
    OptionalReal,
    /// `0`/`1`; JSON booleans are accepted.
    BooleanDomain,
    OptionalBooleanDomain,
    /// Text timestamp, nullable.
    Timestamp,
    /// Ordered list of strings.
    StringSequence,
    /// String-to-string mapping, nullable.
    StringMap,
}

impl FieldType {
    /// The JSON Schema fragment a value of this type must satisfy.
    pub fn json_schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::OptionalString | Self::Timestamp => json!({"type": ["string", "null"]}),
            Self::Integer => json!({"type": "integer"}),
            Self::OptionalInteger => json!({"type": ["integer", "null"]}),
            Self::Real => json!({"type": "number"}),
            Self::OptionalReal => json!({"type": ["number", "null"]}),
            Self::BooleanDomain => json!({"type": ["integer", "boolean"]}),
            Self::OptionalBooleanDomain => json!({"type": ["integer", "boolean", "null"]}),
            Self::StringSequence => json!({"type": "array", "items": {"type": "string"}}),
            Self::StringMap => json!({
                "type": ["object", "null"],
                "additionalProperties": {"type": "string"}
            }),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    /// Absence of a required field is a structural issue. Optional fields
    /// are type-checked when present.
    pub required: bool,
}

const fn req(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        required: true,
    }
}

const fn opt(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        required: false,
    }
}

use FieldType as T;

const CLAUDE_CURRENT: &[FieldSpec] = &[
    req("id", T::OptionalInteger),
    req("name", T::String),
    req("url", T::String),
    req("token", T::String),
    req("timeout", T::OptionalInteger),
    opt("auto_update", T::OptionalBooleanDomain),
    req("type", T::OptionalString),
    req("enabled", T::BooleanDomain),
    req("opus_model", T::OptionalString),
    req("sonnet_model", T::OptionalString),
    req("haiku_model", T::OptionalString),
    req("created_at", T::Timestamp),
    req("updated_at", T::Timestamp),
];

const CLAUDE_LEGACY: &[FieldSpec] = &[
    req("id", T::OptionalInteger),
    req("name", T::String),
    req("url", T::String),
    req("token", T::String),
    req("max_tokens", T::OptionalInteger),
    req("temperature", T::OptionalReal),
    req("model", T::OptionalString),
    req("enabled", T::BooleanDomain),
    req("timeout", T::OptionalInteger),
    opt("type", T::OptionalString),
    req("created_at", T::Timestamp),
    req("updated_at", T::Timestamp),
];

const CODEX: &[FieldSpec] = &[
    req("id", T::OptionalInteger),
    req("name", T::String),
    req("url", T::String),
    req("token", T::String),
    req("type", T::OptionalString),
    req("enabled", T::BooleanDomain),
    req("created_at", T::Timestamp),
    req("updated_at", T::Timestamp),
];

const AGENT_GUIDES: &[FieldSpec] = &[
    req("id", T::OptionalInteger),
    req("name", T::String),
    req("type", T::String),
    req("text", T::String),
    req("created_at", T::Timestamp),
    req("updated_at", T::Timestamp),
];

const MCP_SERVERS: &[FieldSpec] = &[
    req("id", T::OptionalInteger),
    req("name", T::String),
    req("type", T::OptionalString),
    req("timeout", T::OptionalInteger),
    req("command", T::String),
    req("args", T::StringSequence),
    req("env", T::StringMap),
    opt("enabled", T::OptionalBooleanDomain),
    req("created_at", T::Timestamp),
    req("updated_at", T::Timestamp),
];

const COMMON_CONFIGS: &[FieldSpec] = &[
    req("id", T::OptionalInteger),
    req("key", T::String),
    req("value", T::String),
    req("description", T::OptionalString),
    req("category", T::OptionalString),
    req("is_active", T::BooleanDomain),
    req("created_at", T::Timestamp),
    req("updated_at", T::Timestamp),
];

/// Layout revision of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRevision {
    /// `opus_model`/`sonnet_model`/`haiku_model`.
    #[default]
    Current,
    /// `max_tokens`/`temperature`/`model`.
    LegacyModelParams,
}

impl SchemaRevision {
    /// Infer the revision from the `claude_providers` fields present.
    ///
    /// Legacy when any legacy column is present and no per-tier model column
    /// is. Everything else, including a missing or empty table, is current.
    pub fn detect(raw: &RawDataset) -> Self {
        let Some(table) = raw.table(EntityKind::ClaudeProvider) else {
            return Self::Current;
        };
        let fields = table.field_names();
        let has_legacy = ["max_tokens", "temperature", "model"]
            .iter()
            .any(|f| fields.contains(*f));
        let has_current = ["opus_model", "sonnet_model", "haiku_model"]
            .iter()
            .any(|f| fields.contains(*f));
        if has_legacy && !has_current {
            Self::LegacyModelParams
        } else {
            Self::Current
        }
    }
}

impl std::str::FromStr for SchemaRevision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "legacy" | "legacy_model_params" => Ok(Self::LegacyModelParams),
            other => Err(format!("unknown schema revision: {other}")),
        }
    }
}

impl std::fmt::Display for SchemaRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Current => "current",
            Self::LegacyModelParams => "legacy_model_params",
        })
    }
}

/// Catalog entry for one table under one revision.
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub revision: SchemaRevision,
    pub fields: &'static [FieldSpec],
}

impl EntitySchema {
    pub fn for_kind(kind: EntityKind, revision: SchemaRevision) -> Self {
        let fields = match (kind, revision) {
            (EntityKind::ClaudeProvider, SchemaRevision::Current) => CLAUDE_CURRENT,
            (EntityKind::ClaudeProvider, SchemaRevision::LegacyModelParams) => CLAUDE_LEGACY,
            (EntityKind::CodexProvider, _) => CODEX,
            (EntityKind::AgentGuide, _) => AGENT_GUIDES,
            (EntityKind::McpServer, _) => MCP_SERVERS,
            (EntityKind::CommonConfig, _) => COMMON_CONFIGS,
        };
        Self {
            kind,
            revision,
            fields,
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn required_count(&self) -> usize {
        self.required_fields().count()
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A row schema: each catalogued field must have its declared type when
    /// present. Presence is checked separately, so nothing is `required`
    /// here, and unknown columns are allowed.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.field_type.json_schema()))
            .collect();
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": self.kind.table_name(),
            "type": "object",
            "properties": properties,
        })
    }
}
