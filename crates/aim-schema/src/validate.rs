//! # Structural Validation
//!
//! Checks a [`RawDataset`] against the field catalog: which tables exist,
//! which required fields are missing, and which stored values have the wrong
//! primitive type. Values are never judged beyond their type; business rules
//! belong to the integrity checks.
//!
//! Every table is checked independently and every problem is recorded as a
//! [`SchemaIssue`]. A missing table does not stop the others from being
//! checked.
//!
//! ## Field Presence
//!
//! Sources with declared columns (SQLite) are checked against the column
//! list, so an empty table still reports missing columns. Sources without
//! (JSON exports) are checked against the union of keys over all rows; an
//! empty collection there carries no field information and reports nothing
//! missing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aim_core::{EntityKind, RawDataset, RawTable};

use crate::catalog::{EntitySchema, SchemaRevision};
use crate::error::SchemaError;

/// A structural problem with one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaIssue {
    /// The table is absent from the dataset.
    MissingTable { table: EntityKind },
    /// A required field is absent from the table.
    MissingField { table: EntityKind, field: String },
    /// A field is present with a value of the wrong primitive type.
    TypeMismatch {
        table: EntityKind,
        field: String,
        /// Position of the row in the table.
        row: usize,
        record_id: Option<i64>,
        message: String,
    },
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTable { table } => write!(f, "{table}: table missing"),
            Self::MissingField { table, field } => write!(f, "{table}: missing field `{field}`"),
            Self::TypeMismatch {
                table,
                field,
                row,
                record_id,
                message,
            } => match record_id {
                Some(id) => write!(f, "{table}[id={id}].{field}: {message}"),
                None => write!(f, "{table}[row {row}].{field}: {message}"),
            },
        }
    }
}

/// Structural result for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchemaReport {
    pub table: EntityKind,
    pub exists: bool,
    /// Required fields that are present.
    pub fields_found: usize,
    pub fields_required: usize,
    pub row_count: usize,
    pub issues: Vec<SchemaIssue>,
}

impl TableSchemaReport {
    pub fn is_clean(&self) -> bool {
        self.exists && self.issues.is_empty()
    }
}

/// Structural result for a whole dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub revision: SchemaRevision,
    pub all_tables_exist: bool,
    pub tables: Vec<TableSchemaReport>,
}

impl SchemaReport {
    pub fn table(&self, kind: EntityKind) -> Option<&TableSchemaReport> {
        self.tables.iter().find(|t| t.table == kind)
    }

    pub fn issues(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.tables.iter().flat_map(|t| t.issues.iter())
    }

    pub fn issue_count(&self) -> usize {
        self.tables.iter().map(|t| t.issues.len()).sum()
    }

    /// All tables present and no issue of any kind.
    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(TableSchemaReport::is_clean)
    }
}

/// Validates datasets against the field catalog.
///
/// With no fixed revision, each dataset's revision is detected from its
/// `claude_providers` fields.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    revision: Option<SchemaRevision>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every dataset against one fixed revision.
    pub fn with_revision(revision: SchemaRevision) -> Self {
        Self {
            revision: Some(revision),
        }
    }

    /// The revision that will be applied to `raw`.
    pub fn revision_for(&self, raw: &RawDataset) -> SchemaRevision {
        self.revision.unwrap_or_else(|| SchemaRevision::detect(raw))
    }

    /// Check every table of `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ValidatorBuild`] only if a catalog entry fails
    /// to compile as a JSON Schema. Problems in the data are never errors.
    pub fn validate(&self, raw: &RawDataset) -> Result<SchemaReport, SchemaError> {
        let revision = self.revision_for(raw);
        let tables = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                validate_table(&EntitySchema::for_kind(kind, revision), raw.table(kind))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SchemaReport {
            revision,
            all_tables_exist: tables.iter().all(|t| t.exists),
            tables,
        })
    }
}

/// Check one table against its catalog entry.
pub fn validate_table(
    schema: &EntitySchema,
    table: Option<&RawTable>,
) -> Result<TableSchemaReport, SchemaError> {
    let kind = schema.kind;
    let fields_required = schema.required_count();

    let Some(table) = table else {
        return Ok(TableSchemaReport {
            table: kind,
            exists: false,
            fields_found: 0,
            fields_required,
            row_count: 0,
            issues: vec![SchemaIssue::MissingTable { table: kind }],
        });
    };

    let mut issues = Vec::new();
    let present = table.field_names();
    // Without declared columns an empty table says nothing about its fields.
    let presence_known = table.columns.is_some() || !table.rows.is_empty();

    let mut fields_found = 0;
    for spec in schema.required_fields() {
        if present.contains(spec.name) {
            fields_found += 1;
        } else if presence_known {
            issues.push(SchemaIssue::MissingField {
                table: kind,
                field: spec.name.to_string(),
            });
        }
    }

    let row_schema = schema.to_json_schema();
    let mut opts = jsonschema::options();
    opts.with_draft(jsonschema::Draft::Draft202012);
    let validator = opts
        .build(&row_schema)
        .map_err(|e| SchemaError::ValidatorBuild {
            table: kind,
            reason: e.to_string(),
        })?;

    for (index, row) in table.rows.iter().enumerate() {
        let instance = Value::Object(row.clone());
        let record_id = row.get("id").and_then(Value::as_i64);
        for error in validator.iter_errors(&instance) {
            let path = error.instance_path.to_string();
            let field = path
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string();
            issues.push(SchemaIssue::TypeMismatch {
                table: kind,
                field,
                row: index,
                record_id,
                message: error.to_string(),
            });
        }
    }

    Ok(TableSchemaReport {
        table: kind,
        exists: true,
        fields_found,
        fields_required,
        row_count: table.row_count(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> aim_core::Row {
        v.as_object().cloned().unwrap()
    }

    fn guide_row(id: i64) -> aim_core::Row {
        row(json!({
            "id": id, "name": format!("g{id}"), "type": "only", "text": "x",
            "created_at": null, "updated_at": null
        }))
    }

    fn guides_schema() -> EntitySchema {
        EntitySchema::for_kind(EntityKind::AgentGuide, SchemaRevision::Current)
    }

    #[test]
    fn test_missing_table() {
        let report = validate_table(&guides_schema(), None).unwrap();
        assert!(!report.exists);
        assert_eq!(
            report.issues,
            vec![SchemaIssue::MissingTable {
                table: EntityKind::AgentGuide
            }]
        );
    }

    #[test]
    fn test_clean_table() {
        let table = RawTable::from_rows(vec![guide_row(1), guide_row(2)]);
        let report = validate_table(&guides_schema(), Some(&table)).unwrap();
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.row_count, 2);
        assert_eq!(report.fields_found, report.fields_required);
    }

    #[test]
    fn test_missing_field_from_rows() {
        let mut r = guide_row(1);
        r.remove("text");
        let table = RawTable::from_rows(vec![r]);
        let report = validate_table(&guides_schema(), Some(&table)).unwrap();
        assert_eq!(
            report.issues,
            vec![SchemaIssue::MissingField {
                table: EntityKind::AgentGuide,
                field: "text".into()
            }]
        );
        assert_eq!(report.fields_found, report.fields_required - 1);
    }

    #[test]
    fn test_missing_field_from_declared_columns_on_empty_table() {
        let table = RawTable::with_columns(
            vec!["id".into(), "name".into(), "type".into(), "text".into()],
            Vec::new(),
        );
        let report = validate_table(&guides_schema(), Some(&table)).unwrap();
        let missing: Vec<_> = report
            .issues
            .iter()
            .filter_map(|i| match i {
                SchemaIssue::MissingField { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec!["created_at", "updated_at"]);
    }

    #[test]
    fn test_empty_json_collection_reports_nothing() {
        let table = RawTable::from_rows(Vec::new());
        let report = validate_table(&guides_schema(), Some(&table)).unwrap();
        assert!(report.exists);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_type_mismatch_names_field_and_record() {
        let mut r = guide_row(7);
        r.insert("text".into(), json!(42));
        let table = RawTable::from_rows(vec![r]);
        let report = validate_table(&guides_schema(), Some(&table)).unwrap();
        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            SchemaIssue::TypeMismatch {
                field, record_id, row, ..
            } => {
                assert_eq!(field, "text");
                assert_eq!(*record_id, Some(7));
                assert_eq!(*row, 0);
            }
            other => panic!("unexpected issue {other:?}"),
        }
    }

    #[test]
    fn test_boolean_domain_accepts_bool() {
        let schema = EntitySchema::for_kind(EntityKind::CommonConfig, SchemaRevision::Current);
        let table = RawTable::from_rows(vec![row(json!({
            "id": 1, "key": "k", "value": "v", "description": null,
            "category": null, "is_active": true,
            "created_at": "2024-01-01T00:00:00Z", "updated_at": null
        }))]);
        let report = validate_table(&schema, Some(&table)).unwrap();
        assert!(report.is_clean(), "{:?}", report.issues);
    }

    #[test]
    fn test_mcp_args_must_be_string_array() {
        let schema = EntitySchema::for_kind(EntityKind::McpServer, SchemaRevision::Current);
        let table = RawTable::from_rows(vec![row(json!({
            "id": 1, "name": "fs", "type": "stdio", "timeout": 30000,
            "command": "npx", "args": ["-y", 3], "env": {"A": "b"},
            "created_at": null, "updated_at": null
        }))]);
        let report = validate_table(&schema, Some(&table)).unwrap();
        assert!(matches!(
            &report.issues[..],
            [SchemaIssue::TypeMismatch { field, .. }] if field == "args"
        ));
    }

    #[test]
    fn test_validator_reports_every_table() {
        let raw = RawDataset::new()
            .with_table(EntityKind::AgentGuide, RawTable::from_rows(vec![guide_row(1)]));
        let report = SchemaValidator::new().validate(&raw).unwrap();
        assert_eq!(report.tables.len(), 5);
        assert!(!report.all_tables_exist);
        assert!(report.table(EntityKind::AgentGuide).unwrap().is_clean());
        assert_eq!(report.issue_count(), 4);
    }

    #[test]
    fn test_fixed_revision_overrides_detection() {
        let raw = RawDataset::new();
        let v = SchemaValidator::with_revision(SchemaRevision::LegacyModelParams);
        assert_eq!(v.validate(&raw).unwrap().revision, SchemaRevision::LegacyModelParams);
    }

    #[test]
    fn test_issue_display() {
        let issue = SchemaIssue::MissingField {
            table: EntityKind::CodexProvider,
            field: "token".into(),
        };
        assert_eq!(issue.to_string(), "codex_providers: missing field `token`");
    }
}
