//! # Equivalence
//!
//! Proves that a migrated dataset holds the same records as its source.
//!
//! ## Algorithm
//!
//! Per collection:
//!
//! 1. Compare record counts. A difference is reported as
//!    `CardinalityMismatch` and ends the comparison of that collection; the
//!    other collections are still compared.
//! 2. Pair records by natural key (`name`, or `key` for configuration
//!    entries). Position is never used: migrations reorder rows. A key that
//!    occurs more than once on either side cannot be paired and is reported
//!    as `AmbiguousKey`.
//! 3. For each pair, compare every non-secret field by structural equality.
//!    Secret fields are decrypted on each side with that side's key ring and
//!    the plaintexts compared. Ciphertexts are never compared: a fresh IV
//!    makes them differ even for identical plaintext.
//!
//! A decryption failure on either side is a `DecryptionMismatch` for that
//! record, not an error. Plaintext secret values never appear in any issue.
//!
//! ## Ignored fields
//!
//! Surrogate ids are excluded by default because a migration may reassign
//! them. Timestamps are compared by default. Both are configurable through
//! [`CompareOptions`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use aim_core::{
    AgentGuide, ClaudeProvider, CodexProvider, Collected, CommonConfig, Dataset, EntityKind,
    McpServer,
};
use aim_crypto::KeyRing;

/// Which dataset a finding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Migrated,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Migrated => "migrated",
        })
    }
}

/// Which fields take part in record comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Compare surrogate `id` values.
    pub include_ids: bool,
    /// Compare `created_at` and `updated_at`.
    pub compare_timestamps: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            include_ids: false,
            compare_timestamps: true,
        }
    }
}

/// A difference between source and migrated collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EquivalenceIssue {
    CardinalityMismatch {
        expected: usize,
        actual: usize,
    },
    MissingRecord {
        key: String,
    },
    UnexpectedRecord {
        key: String,
    },
    AmbiguousKey {
        key: String,
        source_count: usize,
        migrated_count: usize,
    },
    FieldMismatch {
        key: String,
        field: String,
        expected: Value,
        actual: Value,
    },
    /// Both sides decrypted but to different plaintexts.
    SecretMismatch {
        key: String,
        field: String,
    },
    DecryptionMismatch {
        key: String,
        field: String,
        record_id: Option<i64>,
        side: Side,
        reason: String,
    },
}

impl std::fmt::Display for EquivalenceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CardinalityMismatch { expected, actual } => {
                write!(f, "expected {expected} records, found {actual}")
            }
            Self::MissingRecord { key } => write!(f, "{key:?} missing from migrated data"),
            Self::UnexpectedRecord { key } => write!(f, "{key:?} not present in source data"),
            Self::AmbiguousKey {
                key,
                source_count,
                migrated_count,
            } => write!(
                f,
                "{key:?} is not unique ({source_count} in source, {migrated_count} migrated)"
            ),
            Self::FieldMismatch {
                key,
                field,
                expected,
                actual,
            } => write!(f, "{key:?}.{field}: expected {expected}, found {actual}"),
            Self::SecretMismatch { key, field } => {
                write!(f, "{key:?}.{field}: decrypted values differ")
            }
            Self::DecryptionMismatch {
                key,
                field,
                record_id,
                side,
                reason,
            } => match record_id {
                Some(id) => write!(
                    f,
                    "{key:?}.{field}: {side} record {id} does not decrypt: {reason}"
                ),
                None => write!(f, "{key:?}.{field}: {side} record does not decrypt: {reason}"),
            },
        }
    }
}

/// Comparison result for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionComparison {
    pub entity: EntityKind,
    pub source_count: usize,
    pub migrated_count: usize,
    /// Natural keys whose records are equivalent.
    pub matched: Vec<String>,
    /// Natural keys paired but differing.
    pub mismatched: Vec<String>,
    /// Source keys with no migrated counterpart.
    pub missing: Vec<String>,
    /// Migrated keys with no source counterpart.
    pub unexpected: Vec<String>,
    /// Secrets that decrypted only under a rotated (non-primary) key.
    pub fallback_decryptions: usize,
    pub issues: Vec<EquivalenceIssue>,
    pub matches: bool,
}

impl CollectionComparison {
    fn empty(entity: EntityKind, source_count: usize, migrated_count: usize) -> Self {
        Self {
            entity,
            source_count,
            migrated_count,
            matched: Vec::new(),
            mismatched: Vec::new(),
            missing: Vec::new(),
            unexpected: Vec::new(),
            fallback_decryptions: 0,
            issues: Vec::new(),
            matches: false,
        }
    }
}

/// Comparison result for all collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub collections: Vec<CollectionComparison>,
    pub all_collections_match: bool,
}

impl EquivalenceReport {
    pub fn collection(&self, kind: EntityKind) -> Option<&CollectionComparison> {
        self.collections.iter().find(|c| c.entity == kind)
    }

    pub fn issue_count(&self) -> usize {
        self.collections.iter().map(|c| c.issues.len()).sum()
    }
}

/// Compares a source dataset with its migrated counterpart.
#[derive(Debug, Clone, Copy)]
pub struct EquivalenceComparator<'k> {
    source_keys: &'k KeyRing,
    migrated_keys: &'k KeyRing,
    options: CompareOptions,
}

impl<'k> EquivalenceComparator<'k> {
    pub fn new(source_keys: &'k KeyRing, migrated_keys: &'k KeyRing) -> Self {
        Self {
            source_keys,
            migrated_keys,
            options: CompareOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompareOptions) -> Self {
        self.options = options;
        self
    }

    pub fn compare(&self, source: &Dataset, migrated: &Dataset) -> EquivalenceReport {
        let collections: Vec<CollectionComparison> = EntityKind::ALL
            .into_iter()
            .map(|kind| match kind {
                EntityKind::ClaudeProvider => self.compare_in::<ClaudeProvider>(source, migrated),
                EntityKind::CodexProvider => self.compare_in::<CodexProvider>(source, migrated),
                EntityKind::AgentGuide => self.compare_in::<AgentGuide>(source, migrated),
                EntityKind::McpServer => self.compare_in::<McpServer>(source, migrated),
                EntityKind::CommonConfig => self.compare_in::<CommonConfig>(source, migrated),
            })
            .collect();
        EquivalenceReport {
            all_collections_match: collections.iter().all(|c| c.matches),
            collections,
        }
    }

    fn compare_in<E: Collected>(&self, source: &Dataset, migrated: &Dataset) -> CollectionComparison {
        self.compare_collection(source.records::<E>(), migrated.records::<E>())
    }

    /// Compare one collection.
    pub fn compare_collection<E: Collected>(&self, source: &[E], migrated: &[E]) -> CollectionComparison {
        let mut out = CollectionComparison::empty(E::KIND, source.len(), migrated.len());

        if source.len() != migrated.len() {
            out.issues.push(EquivalenceIssue::CardinalityMismatch {
                expected: source.len(),
                actual: migrated.len(),
            });
            return out;
        }

        let source_by_key = index_by_key(source);
        let migrated_by_key = index_by_key(migrated);
        let keys: BTreeSet<&str> = source_by_key
            .keys()
            .chain(migrated_by_key.keys())
            .copied()
            .collect();

        for key in keys {
            let s = source_by_key.get(key).map(Vec::as_slice).unwrap_or_default();
            let m = migrated_by_key.get(key).map(Vec::as_slice).unwrap_or_default();
            match (s, m) {
                ([a], [b]) => {
                    let before = out.issues.len();
                    self.compare_pair(key, *a, *b, &mut out);
                    if out.issues.len() == before {
                        out.matched.push(key.to_string());
                    } else {
                        out.mismatched.push(key.to_string());
                    }
                }
                ([_, ..], []) => {
                    out.missing.push(key.to_string());
                    out.issues.push(EquivalenceIssue::MissingRecord {
                        key: key.to_string(),
                    });
                }
                ([], [_, ..]) => {
                    out.unexpected.push(key.to_string());
                    out.issues.push(EquivalenceIssue::UnexpectedRecord {
                        key: key.to_string(),
                    });
                }
                _ => {
                    out.mismatched.push(key.to_string());
                    out.issues.push(EquivalenceIssue::AmbiguousKey {
                        key: key.to_string(),
                        source_count: s.len(),
                        migrated_count: m.len(),
                    });
                }
            }
        }

        out.matches = out.issues.is_empty();
        out
    }

    fn compare_pair<E: Collected>(&self, key: &str, source: &E, migrated: &E, out: &mut CollectionComparison) {
        let secret_fields = E::KIND.secret_fields();
        let a = self.comparable_fields(source, secret_fields);
        let b = self.comparable_fields(migrated, secret_fields);

        let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        for name in names {
            let expected = a.get(name.as_str()).unwrap_or(&Value::Null);
            let actual = b.get(name.as_str()).unwrap_or(&Value::Null);
            if expected != actual {
                out.issues.push(EquivalenceIssue::FieldMismatch {
                    key: key.to_string(),
                    field: name.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }

        for field in secret_fields {
            let (Some(s), Some(m)) = (source.secret(field), migrated.secret(field)) else {
                continue;
            };
            let decrypted_source = self.source_keys.decode(s);
            let decrypted_migrated = self.migrated_keys.decode(m);

            for (side, result, record_id) in [
                (Side::Source, &decrypted_source, source.id()),
                (Side::Migrated, &decrypted_migrated, migrated.id()),
            ] {
                match result {
                    Ok(d) if d.used_fallback() => out.fallback_decryptions += 1,
                    Ok(_) => {}
                    Err(e) => out.issues.push(EquivalenceIssue::DecryptionMismatch {
                        key: key.to_string(),
                        field: field.to_string(),
                        record_id,
                        side,
                        reason: e.to_string(),
                    }),
                }
            }

            if let (Ok(s), Ok(m)) = (&decrypted_source, &decrypted_migrated) {
                if !bool::from(s.plaintext().ct_eq(m.plaintext())) {
                    out.issues.push(EquivalenceIssue::SecretMismatch {
                        key: key.to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }
    }

    /// The record as a field map, minus secrets and excluded fields.
    fn comparable_fields<E: Collected>(&self, record: &E, secret_fields: &[&str]) -> Map<String, Value> {
        let mut fields = match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for field in secret_fields {
            fields.remove(*field);
        }
        if !self.options.include_ids {
            fields.remove("id");
        }
        if !self.options.compare_timestamps {
            fields.remove("created_at");
            fields.remove("updated_at");
        }
        fields
    }
}

fn index_by_key<E: Collected>(records: &[E]) -> BTreeMap<&str, Vec<&E>> {
    let mut index: BTreeMap<&str, Vec<&E>> = BTreeMap::new();
    for record in records {
        index.entry(record.natural_key()).or_default().push(record);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::Flag;
    use aim_crypto::FernetKey;

    const KEY: &str = "Jw4Ff1BWLnSykdfXDVOuEJCG6m9dyST5B1VhU_qg0fI=";

    fn ring() -> KeyRing {
        KeyRing::from_base64_keys([KEY]).unwrap()
    }

    fn codex(id: i64, name: &str, token: String) -> CodexProvider {
        CodexProvider {
            id: Some(id),
            name: name.to_string(),
            url: "https://api.example.com".to_string(),
            token,
            provider_type: "paid".to_string(),
            enabled: Flag::OFF,
            created_at: Some("2024-01-01T00:00:00Z".to_string()),
            updated_at: None,
        }
    }

    fn guide(id: i64, name: &str, text: &str) -> AgentGuide {
        AgentGuide {
            id: Some(id),
            name: name.to_string(),
            guide_type: "only".to_string(),
            text: text.to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_reordered_records_match() {
        let r = ring();
        let source = vec![codex(1, "A", r.encode(b"a")), codex(2, "B", r.encode(b"b"))];
        let migrated = vec![codex(1, "B", r.encode(b"b")), codex(2, "A", r.encode(b"a"))];
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert!(cmp.matches, "{:?}", cmp.issues);
        assert_eq!(cmp.matched, vec!["A", "B"]);
        assert!(cmp.mismatched.is_empty());
    }

    #[test]
    fn test_ids_included_on_request() {
        let r = ring();
        let source = vec![codex(1, "A", r.encode(b"a"))];
        let migrated = vec![codex(7, "A", r.encode(b"a"))];
        let default = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert!(default.matches);
        let strict = EquivalenceComparator::new(&r, &r)
            .with_options(CompareOptions {
                include_ids: true,
                ..CompareOptions::default()
            })
            .compare_collection(&source, &migrated);
        assert!(matches!(
            &strict.issues[..],
            [EquivalenceIssue::FieldMismatch { field, .. }] if field == "id"
        ));
    }

    #[test]
    fn test_timestamps_can_be_ignored() {
        let r = ring();
        let source = vec![codex(1, "A", r.encode(b"a"))];
        let mut m = codex(1, "A", r.encode(b"a"));
        m.created_at = Some("2024-01-01 00:00:00".to_string());
        let migrated = vec![m];
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert!(!cmp.matches);
        let relaxed = EquivalenceComparator::new(&r, &r)
            .with_options(CompareOptions {
                compare_timestamps: false,
                ..CompareOptions::default()
            })
            .compare_collection(&source, &migrated);
        assert!(relaxed.matches);
    }

    #[test]
    fn test_field_mismatch_reports_values() {
        let source = vec![guide(1, "g", "one")];
        let migrated = vec![guide(1, "g", "two")];
        let r = ring();
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert_eq!(
            cmp.issues,
            vec![EquivalenceIssue::FieldMismatch {
                key: "g".into(),
                field: "text".into(),
                expected: Value::from("one"),
                actual: Value::from("two"),
            }]
        );
        assert_eq!(cmp.mismatched, vec!["g"]);
    }

    #[test]
    fn test_cardinality_short_circuits() {
        let r = ring();
        let source = vec![guide(1, "a", "x"), guide(2, "b", "y")];
        let migrated = vec![guide(1, "a", "different")];
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert_eq!(
            cmp.issues,
            vec![EquivalenceIssue::CardinalityMismatch {
                expected: 2,
                actual: 1
            }]
        );
        assert!(cmp.matched.is_empty());
    }

    #[test]
    fn test_renamed_record_is_missing_and_unexpected() {
        let r = ring();
        let cmp = EquivalenceComparator::new(&r, &r)
            .compare_collection(&[guide(1, "old", "x")], &[guide(1, "new", "x")]);
        assert_eq!(cmp.missing, vec!["old"]);
        assert_eq!(cmp.unexpected, vec!["new"]);
        assert_eq!(cmp.issues.len(), 2);
    }

    #[test]
    fn test_duplicate_keys_are_ambiguous() {
        let r = ring();
        let source = vec![guide(1, "a", "x"), guide(2, "a", "y")];
        let migrated = vec![guide(1, "a", "x"), guide(2, "a", "y")];
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert_eq!(
            cmp.issues,
            vec![EquivalenceIssue::AmbiguousKey {
                key: "a".into(),
                source_count: 2,
                migrated_count: 2
            }]
        );
    }

    #[test]
    fn test_secrets_compared_by_plaintext_under_each_sides_keys() {
        let source_ring = KeyRing::single(FernetKey::generate());
        let migrated_ring = KeyRing::single(FernetKey::generate());
        let source = vec![codex(1, "A", source_ring.encode(b"sk-same"))];
        let migrated = vec![codex(1, "A", migrated_ring.encode(b"sk-same"))];
        let cmp = EquivalenceComparator::new(&source_ring, &migrated_ring)
            .compare_collection(&source, &migrated);
        assert!(cmp.matches, "{:?}", cmp.issues);
    }

    #[test]
    fn test_secret_mismatch_hides_values() {
        let r = ring();
        let source = vec![codex(1, "A", r.encode(b"sk-one"))];
        let migrated = vec![codex(1, "A", r.encode(b"sk-two"))];
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert_eq!(
            cmp.issues,
            vec![EquivalenceIssue::SecretMismatch {
                key: "A".into(),
                field: "token".into()
            }]
        );
        let rendered = cmp.issues[0].to_string();
        assert!(!rendered.contains("sk-one") && !rendered.contains("sk-two"));
    }

    #[test]
    fn test_decryption_failure_names_side() {
        let r = ring();
        let other = KeyRing::single(FernetKey::generate());
        let source = vec![codex(1, "A", r.encode(b"sk"))];
        let migrated = vec![codex(5, "A", other.encode(b"sk"))];
        let cmp = EquivalenceComparator::new(&r, &r).compare_collection(&source, &migrated);
        assert!(matches!(
            &cmp.issues[..],
            [EquivalenceIssue::DecryptionMismatch { side: Side::Migrated, record_id: Some(5), .. }]
        ));
        assert_eq!(cmp.mismatched, vec!["A"]);
    }

    #[test]
    fn test_fallback_decryptions_counted() {
        let old = FernetKey::generate();
        let new = FernetKey::generate();
        let rotated = KeyRing::new(vec![new, old.clone()]).unwrap();
        let old_only = KeyRing::single(old);
        let source = vec![codex(1, "A", old_only.encode(b"sk"))];
        let migrated = vec![codex(1, "A", rotated.encode(b"sk"))];
        let cmp = EquivalenceComparator::new(&rotated, &rotated).compare_collection(&source, &migrated);
        assert!(cmp.matches);
        assert_eq!(cmp.fallback_decryptions, 1);
    }
}
