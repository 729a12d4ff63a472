//! # Validation Report
//!
//! Folds the per-phase reports of one verification run into a single
//! serializable document and computes its verdict:
//!
//! ```text
//! overall_success = schema.all_tables_exist
//!                && integrity.all_checks_pass
//!                && equivalence.all_collections_match
//! ```
//!
//! Each side of the schema and integrity sections is held verbatim. A side
//! is considered to have all tables only if both source and migrated do;
//! integrity passes only if both sides pass.
//!
//! Missing fields and type mismatches are reported in the schema section but
//! do not change the verdict on their own. A field that is structurally
//! absent usually also surfaces as an unparseable record or an equivalence
//! difference, which do.

use serde::{Deserialize, Serialize};

use aim_core::Timestamp;
use aim_schema::SchemaReport;

use crate::equivalence::EquivalenceReport;
use crate::integrity::DatasetIntegrityReport;

/// Schema reports for both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSection {
    pub source: SchemaReport,
    pub migrated: SchemaReport,
}

impl SchemaSection {
    pub fn all_tables_exist(&self) -> bool {
        self.source.all_tables_exist && self.migrated.all_tables_exist
    }

    pub fn issue_count(&self) -> usize {
        self.source.issue_count() + self.migrated.issue_count()
    }
}

/// Integrity reports for both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegritySection {
    pub source: DatasetIntegrityReport,
    pub migrated: DatasetIntegrityReport,
}

impl IntegritySection {
    pub fn all_checks_pass(&self) -> bool {
        self.source.all_checks_pass && self.migrated.all_checks_pass
    }

    pub fn issue_count(&self) -> usize {
        self.source.issue_count() + self.migrated.issue_count()
    }
}

/// The outcome of one migration verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validated_at: Timestamp,
    pub schema: SchemaSection,
    pub integrity: IntegritySection,
    pub equivalence: EquivalenceReport,
    pub overall_success: bool,
}

impl ValidationReport {
    /// Combine phase reports, stamped with the current time.
    pub fn aggregate(
        schema: SchemaSection,
        integrity: IntegritySection,
        equivalence: EquivalenceReport,
    ) -> Self {
        Self::aggregate_at(Timestamp::now(), schema, integrity, equivalence)
    }

    pub fn aggregate_at(
        validated_at: Timestamp,
        schema: SchemaSection,
        integrity: IntegritySection,
        equivalence: EquivalenceReport,
    ) -> Self {
        let overall_success = schema.all_tables_exist()
            && integrity.all_checks_pass()
            && equivalence.all_collections_match;
        Self {
            validated_at,
            schema,
            integrity,
            equivalence,
            overall_success,
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let collections = &self.equivalence.collections;
        ReportSummary {
            schema_issues: self.schema.issue_count(),
            integrity_issues: self.integrity.issue_count(),
            equivalence_issues: self.equivalence.issue_count(),
            collections_compared: collections.len(),
            collections_matching: collections.iter().filter(|c| c.matches).count(),
            fallback_decryptions: collections.iter().map(|c| c.fallback_decryptions).sum(),
            overall_success: self.overall_success,
        }
    }
}

/// Issue counts per section, for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub schema_issues: usize,
    pub integrity_issues: usize,
    pub equivalence_issues: usize,
    pub collections_compared: usize,
    pub collections_matching: usize,
    pub fallback_decryptions: usize,
    pub overall_success: bool,
}

impl ReportSummary {
    pub fn total_issues(&self) -> usize {
        self.schema_issues + self.integrity_issues + self.equivalence_issues
    }
}
