//! # Verification Pipeline
//!
//! Runs the full verification of one migration over two already-loaded raw
//! datasets:
//!
//! 1. Structural validation of each side.
//! 2. Conversion of each side into typed records. Rows that do not convert
//!    become integrity issues.
//! 3. Integrity rules on each side, with secrets checked against that
//!    side's key ring.
//! 4. Equivalence of the two typed datasets.
//! 5. Aggregation into a [`ValidationReport`].
//!
//! The pipeline performs no I/O. Loading is the caller's concern.

use aim_core::{Dataset, RawDataset, RejectedRow};
use aim_crypto::KeyRing;
use aim_schema::{SchemaError, SchemaReport, SchemaRevision, SchemaValidator};

use crate::equivalence::{CompareOptions, EquivalenceComparator};
use crate::integrity::{DatasetIntegrityReport, IntegrityChecker};
use crate::report::{IntegritySection, SchemaSection, ValidationReport};

/// Failure to run verification. Data problems never produce this.
#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Structural and integrity results for a single dataset.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Inspection {
    pub schema: SchemaReport,
    pub integrity: DatasetIntegrityReport,
    pub success: bool,
}

/// Verifies that a migrated dataset faithfully reproduces its source.
#[derive(Debug, Clone, Default)]
pub struct MigrationVerifier {
    validator: SchemaValidator,
    options: CompareOptions,
}

impl MigrationVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the schema revision instead of detecting it per dataset.
    pub fn with_revision(mut self, revision: SchemaRevision) -> Self {
        self.validator = SchemaValidator::with_revision(revision);
        self
    }

    pub fn with_options(mut self, options: CompareOptions) -> Self {
        self.options = options;
        self
    }

    pub fn verify(
        &self,
        source: &RawDataset,
        source_keys: &KeyRing,
        migrated: &RawDataset,
        migrated_keys: &KeyRing,
    ) -> Result<ValidationReport, VerifyError> {
        tracing::info!(
            source_keys = source_keys.len(),
            migrated_keys = migrated_keys.len(),
            "starting migration verification"
        );

        let schema = SchemaSection {
            source: self.validate_schema("source", source)?,
            migrated: self.validate_schema("migrated", migrated)?,
        };

        let (source_data, source_rejected) = typed("source", source);
        let (migrated_data, migrated_rejected) = typed("migrated", migrated);

        let integrity = IntegritySection {
            source: check_integrity("source", &source_data, &source_rejected, Some(source_keys)),
            migrated: check_integrity(
                "migrated",
                &migrated_data,
                &migrated_rejected,
                Some(migrated_keys),
            ),
        };

        let equivalence = EquivalenceComparator::new(source_keys, migrated_keys)
            .with_options(self.options)
            .compare(&source_data, &migrated_data);
        for collection in equivalence.collections.iter().filter(|c| !c.matches) {
            tracing::warn!(
                table = %collection.entity,
                source = collection.source_count,
                migrated = collection.migrated_count,
                issues = collection.issues.len(),
                "collection differs after migration"
            );
        }

        let report = ValidationReport::aggregate(schema, integrity, equivalence);
        let summary = report.summary();
        tracing::info!(
            success = report.overall_success,
            schema_issues = summary.schema_issues,
            integrity_issues = summary.integrity_issues,
            equivalence_issues = summary.equivalence_issues,
            fallback_decryptions = summary.fallback_decryptions,
            "migration verification finished"
        );
        Ok(report)
    }

    /// Schema and integrity checks of a single dataset.
    ///
    /// Without a key ring, secrets are checked for token shape only.
    pub fn inspect(
        &self,
        raw: &RawDataset,
        key_ring: Option<&KeyRing>,
    ) -> Result<Inspection, VerifyError> {
        let schema = self.validate_schema("dataset", raw)?;
        let (data, rejected) = typed("dataset", raw);
        let integrity = check_integrity("dataset", &data, &rejected, key_ring);
        let success = schema.all_tables_exist && integrity.all_checks_pass;
        Ok(Inspection {
            schema,
            integrity,
            success,
        })
    }

    fn validate_schema(&self, side: &str, raw: &RawDataset) -> Result<SchemaReport, SchemaError> {
        let report = self.validator.validate(raw)?;
        tracing::info!(
            side,
            revision = %report.revision,
            all_tables_exist = report.all_tables_exist,
            issues = report.issue_count(),
            "schema validated"
        );
        Ok(report)
    }
}

fn typed(side: &str, raw: &RawDataset) -> (Dataset, Vec<RejectedRow>) {
    let (data, rejected) = Dataset::from_raw(raw);
    for row in &rejected {
        tracing::debug!(side, table = %row.kind, index = row.index, error = %row.error, "row rejected");
    }
    (data, rejected)
}

fn check_integrity(
    side: &str,
    data: &Dataset,
    rejected: &[RejectedRow],
    key_ring: Option<&KeyRing>,
) -> DatasetIntegrityReport {
    let checker = match key_ring {
        Some(ring) => IntegrityChecker::with_key_ring(ring),
        None => IntegrityChecker::new(),
    };
    let report = checker.check_dataset(data, rejected);
    tracing::info!(
        side,
        passed = report.all_checks_pass,
        issues = report.issue_count(),
        "integrity checked"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_core::EntityKind;
    use serde_json::json;

    const KEY: &str = "Jw4Ff1BWLnSykdfXDVOuEJCG6m9dyST5B1VhU_qg0fI=";

    fn export(ring: &KeyRing) -> RawDataset {
        RawDataset::from_json_document(&json!({
            "version": "1.0.0",
            "claude_providers": [{
                "id": 1, "name": "main", "url": "https://api.anthropic.com",
                "token": ring.encode(b"sk-ant-123"), "timeout": 30000, "auto_update": 1,
                "type": "public_welfare", "enabled": 1,
                "opus_model": null, "sonnet_model": null, "haiku_model": null,
                "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
            }],
            "codex_providers": [],
            "agent_guides": [],
            "mcp_servers": [],
            "common_configs": [{
                "id": 1, "key": "version", "value": "1.0.0", "description": null,
                "category": "general", "is_active": 1,
                "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_identical_datasets_verify() {
        let ring = KeyRing::from_base64_keys([KEY]).unwrap();
        let raw = export(&ring);
        let report = MigrationVerifier::new().verify(&raw, &ring, &raw, &ring).unwrap();
        assert!(report.overall_success, "{:#?}", report.summary());
    }

    #[test]
    fn test_unparseable_row_fails_integrity() {
        let ring = KeyRing::from_base64_keys([KEY]).unwrap();
        let mut raw = export(&ring);
        let mut bad = raw.table(EntityKind::CommonConfig).unwrap().clone();
        bad.rows[0].insert("key".into(), json!(42));
        raw.insert_table(EntityKind::CommonConfig, bad);

        let inspection = MigrationVerifier::new().inspect(&raw, Some(&ring)).unwrap();
        assert!(!inspection.success);
        assert!(!inspection.integrity.all_checks_pass);
    }

    #[test]
    fn test_inspect_without_keys_checks_shape_only() {
        let ring = KeyRing::from_base64_keys([KEY]).unwrap();
        let raw = export(&ring);
        let inspection = MigrationVerifier::new().inspect(&raw, None).unwrap();
        assert!(inspection.success);
    }
}
