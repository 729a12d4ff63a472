//! # Integrity Checks
//!
//! Business-rule checks on typed records, run on each dataset on its own.
//!
//! ## Per-record rules
//!
//! - A required text field that is empty or whitespace-only → `EmptyField`.
//! - A URL that does not start with `http://` or `https://` → `MalformedUrl`.
//! - A boolean-domain value other than exactly 0 or 1 → `InvalidBoolean`.
//! - A number outside its inclusive range → `OutOfRange`. Timeouts must be
//!   at least 1 ms; the legacy `temperature` must lie in 0.0–2.0 and the
//!   legacy `max_tokens` must be at least 1.
//! - A secret that does not decrypt under the supplied key ring →
//!   `UndecryptableSecret`; with no key ring, a secret that does not even
//!   parse as a token → `MalformedSecret`.
//!
//! ## Cross-record rules
//!
//! - More than one enabled provider in a provider collection → exactly one
//!   `MultipleEnabled` issue naming every enabled record.
//! - A configuration key used more than once → one `DuplicateKey` per key.
//! - A name used more than once (providers, guides, servers) → one
//!   `DuplicateName` per name.
//! - A surrogate id used more than once → one `DuplicateId` per id.
//!
//! Rows that could not be typed at all surface as `UnparseableRecord`.
//! Every rule runs on every record; nothing short-circuits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use aim_core::{
    AgentGuide, ClaudeProvider, CodexProvider, Collected, CommonConfig, Dataset, Entity,
    EntityKind, Flag, McpServer, RejectedRow,
};
use aim_crypto::{KeyRing, TokenHeader};

/// Minimum timeout in milliseconds.
pub const MIN_TIMEOUT_MS: i64 = 1;
/// Inclusive bounds of the legacy `temperature` parameter.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// What rule was violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssueKind {
    EmptyField {
        field: String,
    },
    MalformedUrl {
        field: String,
        value: String,
    },
    InvalidBoolean {
        field: String,
        value: i64,
    },
    OutOfRange {
        field: String,
        value: String,
        range: String,
    },
    MultipleEnabled {
        count: usize,
        record_ids: Vec<i64>,
    },
    DuplicateKey {
        key: String,
        count: usize,
    },
    DuplicateName {
        name: String,
        count: usize,
        record_ids: Vec<i64>,
    },
    DuplicateId {
        id: i64,
        count: usize,
    },
    UndecryptableSecret {
        field: String,
        reason: String,
    },
    MalformedSecret {
        field: String,
        reason: String,
    },
    UnparseableRecord {
        row: usize,
        reason: String,
    },
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub entity: EntityKind,
    /// The offending record, when a single record is at fault.
    pub record_id: Option<i64>,
    #[serde(flatten)]
    pub kind: IntegrityIssueKind,
    pub message: String,
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.record_id {
            Some(id) => write!(f, "{}[id={id}]: {}", self.entity, self.message),
            None => write!(f, "{}: {}", self.entity, self.message),
        }
    }
}

/// Result for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub entity: EntityKind,
    pub records_checked: usize,
    pub issues: Vec<IntegrityIssue>,
    pub success: bool,
}

impl IntegrityReport {
    fn new(entity: EntityKind, records_checked: usize, issues: Vec<IntegrityIssue>) -> Self {
        Self {
            entity,
            records_checked,
            success: issues.is_empty(),
            issues,
        }
    }
}

/// Result for all five collections of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetIntegrityReport {
    pub entities: Vec<IntegrityReport>,
    pub all_checks_pass: bool,
}

impl DatasetIntegrityReport {
    pub fn entity(&self, kind: EntityKind) -> Option<&IntegrityReport> {
        self.entities.iter().find(|e| e.entity == kind)
    }

    pub fn issues(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.entities.iter().flat_map(|e| e.issues.iter())
    }

    pub fn issue_count(&self) -> usize {
        self.entities.iter().map(|e| e.issues.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Rule plumbing
// ---------------------------------------------------------------------------

/// Issue collector scoped to one record.
pub struct RecordScope<'a> {
    entity: EntityKind,
    record_id: Option<i64>,
    out: &'a mut Vec<IntegrityIssue>,
}

impl RecordScope<'_> {
    fn push(&mut self, kind: IntegrityIssueKind, message: String) {
        self.out.push(IntegrityIssue {
            entity: self.entity,
            record_id: self.record_id,
            kind,
            message,
        });
    }

    pub fn required_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(
                IntegrityIssueKind::EmptyField {
                    field: field.to_string(),
                },
                format!("{field} must not be empty"),
            );
        }
    }

    pub fn url(&mut self, field: &str, value: &str) {
        if !(value.starts_with("http://") || value.starts_with("https://")) {
            self.push(
                IntegrityIssueKind::MalformedUrl {
                    field: field.to_string(),
                    value: value.to_string(),
                },
                format!("{field} {value:?} must start with http:// or https://"),
            );
        }
    }

    pub fn flag(&mut self, field: &str, value: Flag) {
        if !value.is_canonical() {
            self.push(
                IntegrityIssueKind::InvalidBoolean {
                    field: field.to_string(),
                    value: value.value(),
                },
                format!("{field} must be 0 or 1, got {}", value.value()),
            );
        }
    }

    pub fn at_least(&mut self, field: &str, value: i64, min: i64) {
        if value < min {
            self.out_of_range(field, value.to_string(), format!(">= {min}"));
        }
    }

    pub fn within(&mut self, field: &str, value: f64, (min, max): (f64, f64)) {
        // NaN fails both comparisons and is reported.
        if !(value >= min && value <= max) {
            self.out_of_range(field, value.to_string(), format!("{min:.1}..={max:.1}"));
        }
    }

    fn out_of_range(&mut self, field: &str, value: String, range: String) {
        let message = format!("{field} {value} is outside {range}");
        self.push(
            IntegrityIssueKind::OutOfRange {
                field: field.to_string(),
                value,
                range,
            },
            message,
        );
    }
}

/// Per-record rules for one entity type.
pub trait IntegrityRules: Entity {
    fn check_record(&self, scope: &mut RecordScope<'_>);

    /// The singleton flag, for collections where at most one record may be on.
    fn enabled_flag(&self) -> Option<Flag> {
        None
    }
}

impl IntegrityRules for ClaudeProvider {
    fn check_record(&self, scope: &mut RecordScope<'_>) {
        scope.required_text("name", &self.name);
        scope.required_text("url", &self.url);
        scope.url("url", &self.url);
        scope.required_text("token", &self.token);
        scope.required_text("type", &self.provider_type);
        scope.flag("enabled", self.enabled);
        if let Some(auto_update) = self.auto_update {
            scope.flag("auto_update", auto_update);
        }
        scope.at_least("timeout", self.timeout, MIN_TIMEOUT_MS);
        if let Some(max_tokens) = self.max_tokens {
            scope.at_least("max_tokens", max_tokens, 1);
        }
        if let Some(temperature) = self.temperature {
            scope.within("temperature", temperature, TEMPERATURE_RANGE);
        }
    }

    fn enabled_flag(&self) -> Option<Flag> {
        Some(self.enabled)
    }
}

impl IntegrityRules for CodexProvider {
    fn check_record(&self, scope: &mut RecordScope<'_>) {
        scope.required_text("name", &self.name);
        scope.required_text("url", &self.url);
        scope.url("url", &self.url);
        scope.required_text("token", &self.token);
        scope.required_text("type", &self.provider_type);
        scope.flag("enabled", self.enabled);
    }

    fn enabled_flag(&self) -> Option<Flag> {
        Some(self.enabled)
    }
}

impl IntegrityRules for AgentGuide {
    fn check_record(&self, scope: &mut RecordScope<'_>) {
        scope.required_text("name", &self.name);
        scope.required_text("text", &self.text);
    }
}

impl IntegrityRules for McpServer {
    fn check_record(&self, scope: &mut RecordScope<'_>) {
        scope.required_text("name", &self.name);
        scope.required_text("command", &self.command);
        scope.at_least("timeout", self.timeout, MIN_TIMEOUT_MS);
        if let Some(enabled) = self.enabled {
            scope.flag("enabled", enabled);
        }
    }
}

impl IntegrityRules for CommonConfig {
    fn check_record(&self, scope: &mut RecordScope<'_>) {
        scope.required_text("key", &self.key);
        scope.required_text("value", &self.value);
        scope.flag("is_active", self.is_active);
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// Runs the integrity rules.
///
/// With a key ring, every secret is decrypted. Without one, secrets are only
/// checked for token shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityChecker<'k> {
    key_ring: Option<&'k KeyRing>,
}

impl<'k> IntegrityChecker<'k> {
    pub fn new() -> Self {
        Self { key_ring: None }
    }

    pub fn with_key_ring(key_ring: &'k KeyRing) -> Self {
        Self {
            key_ring: Some(key_ring),
        }
    }

    /// Check one collection.
    pub fn check_entity<E: IntegrityRules>(&self, records: &[E]) -> IntegrityReport {
        let mut issues = Vec::new();

        for record in records {
            let mut scope = RecordScope {
                entity: E::KIND,
                record_id: record.id(),
                out: &mut issues,
            };
            record.check_record(&mut scope);
            self.check_secrets(record, &mut scope);
        }

        if E::KIND.is_singleton_enabled() {
            check_singleton(records, &mut issues);
        }
        check_natural_keys(records, &mut issues);
        check_ids(records, &mut issues);

        IntegrityReport::new(E::KIND, records.len(), issues)
    }

    /// Check every collection of `dataset`, folding in rows that failed
    /// conversion.
    pub fn check_dataset(&self, dataset: &Dataset, rejected: &[RejectedRow]) -> DatasetIntegrityReport {
        let entities: Vec<IntegrityReport> = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let mut report = match kind {
                    EntityKind::ClaudeProvider => self.check_collection::<ClaudeProvider>(dataset),
                    EntityKind::CodexProvider => self.check_collection::<CodexProvider>(dataset),
                    EntityKind::AgentGuide => self.check_collection::<AgentGuide>(dataset),
                    EntityKind::McpServer => self.check_collection::<McpServer>(dataset),
                    EntityKind::CommonConfig => self.check_collection::<CommonConfig>(dataset),
                };
                for row in rejected.iter().filter(|r| r.kind == kind) {
                    report.issues.push(IntegrityIssue {
                        entity: kind,
                        record_id: row.id,
                        kind: IntegrityIssueKind::UnparseableRecord {
                            row: row.index,
                            reason: row.error.to_string(),
                        },
                        message: format!("row {} could not be read: {}", row.index, row.error),
                    });
                    report.records_checked += 1;
                }
                report.success = report.issues.is_empty();
                report
            })
            .collect();

        DatasetIntegrityReport {
            all_checks_pass: entities.iter().all(|e| e.success),
            entities,
        }
    }

    fn check_collection<E: IntegrityRules + Collected>(&self, dataset: &Dataset) -> IntegrityReport {
        self.check_entity(dataset.records::<E>())
    }

    fn check_secrets<E: Entity>(&self, record: &E, scope: &mut RecordScope<'_>) {
        for (field, ciphertext) in record.secrets() {
            // An empty secret is already reported as an empty field.
            if ciphertext.trim().is_empty() {
                continue;
            }
            match self.key_ring {
                Some(ring) => {
                    if let Err(e) = ring.decode(ciphertext) {
                        scope.push(
                            IntegrityIssueKind::UndecryptableSecret {
                                field: field.to_string(),
                                reason: e.to_string(),
                            },
                            format!("{field} does not decrypt: {e}"),
                        );
                    }
                }
                None => {
                    if let Err(e) = TokenHeader::parse(ciphertext) {
                        scope.push(
                            IntegrityIssueKind::MalformedSecret {
                                field: field.to_string(),
                                reason: e.to_string(),
                            },
                            format!("{field} is not a Fernet token: {e}"),
                        );
                    }
                }
            }
        }
    }
}

fn check_singleton<E: IntegrityRules>(records: &[E], issues: &mut Vec<IntegrityIssue>) {
    let enabled: Vec<&E> = records
        .iter()
        .filter(|r| r.enabled_flag().is_some_and(Flag::is_on))
        .collect();
    if enabled.len() > 1 {
        let count = enabled.len();
        let record_ids: Vec<i64> = enabled.iter().filter_map(|r| r.id()).collect();
        issues.push(IntegrityIssue {
            entity: E::KIND,
            record_id: None,
            message: format!("{count} records are enabled (ids {record_ids:?}); at most one may be"),
            kind: IntegrityIssueKind::MultipleEnabled { count, record_ids },
        });
    }
}

fn check_natural_keys<E: Entity>(records: &[E], issues: &mut Vec<IntegrityIssue>) {
    let mut by_key: BTreeMap<&str, Vec<Option<i64>>> = BTreeMap::new();
    for record in records {
        by_key.entry(record.natural_key()).or_default().push(record.id());
    }
    for (key, ids) in by_key.into_iter().filter(|(_, ids)| ids.len() > 1) {
        let count = ids.len();
        let ids: Vec<i64> = ids.into_iter().flatten().collect();
        let (kind, message) = if E::KIND == EntityKind::CommonConfig {
            (
                IntegrityIssueKind::DuplicateKey {
                    key: key.to_string(),
                    count,
                },
                format!("key {key:?} appears {count} times"),
            )
        } else {
            (
                IntegrityIssueKind::DuplicateName {
                    name: key.to_string(),
                    count,
                    record_ids: ids,
                },
                format!("name {key:?} appears {count} times"),
            )
        };
        issues.push(IntegrityIssue {
            entity: E::KIND,
            record_id: None,
            kind,
            message,
        });
    }
}

fn check_ids<E: Entity>(records: &[E], issues: &mut Vec<IntegrityIssue>) {
    // Records without an id cannot collide.
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for id in records.iter().filter_map(Entity::id) {
        *counts.entry(id).or_default() += 1;
    }
    for (id, count) in counts.into_iter().filter(|(_, n)| *n > 1) {
        issues.push(IntegrityIssue {
            entity: E::KIND,
            record_id: Some(id),
            kind: IntegrityIssueKind::DuplicateId { id, count },
            message: format!("id {id} appears {count} times"),
        });
    }
}
