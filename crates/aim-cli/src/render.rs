//! Report rendering: human-readable text or pretty JSON, to stdout or a file.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use aim_schema::SchemaReport;
use aim_verify::{DatasetIntegrityReport, Inspection, ValidationReport};

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Write `content` to `output`, or to stdout when no file is given.
pub fn emit(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => print!("{content}"),
    }
    Ok(())
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    json.push('\n');
    Ok(json)
}

pub fn render_report(report: &ValidationReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Text => Ok(report_text(report)),
    }
}

pub fn render_inspection(inspection: &Inspection, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(inspection),
        OutputFormat::Text => {
            let mut out = String::new();
            schema_text(&mut out, "dataset", &inspection.schema);
            integrity_text(&mut out, "dataset", &inspection.integrity);
            verdict(&mut out, inspection.success);
            Ok(out)
        }
    }
}

fn report_text(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration validation at {}", report.validated_at);
    let _ = writeln!(out);

    let _ = writeln!(out, "== Schema");
    schema_text(&mut out, "source", &report.schema.source);
    schema_text(&mut out, "migrated", &report.schema.migrated);

    let _ = writeln!(out, "== Integrity");
    integrity_text(&mut out, "source", &report.integrity.source);
    integrity_text(&mut out, "migrated", &report.integrity.migrated);

    let _ = writeln!(out, "== Equivalence");
    for c in &report.equivalence.collections {
        let _ = writeln!(
            out,
            "  {:<18} {} ({} source, {} migrated, {} matched)",
            c.entity.table_name(),
            mark(c.matches),
            c.source_count,
            c.migrated_count,
            c.matched.len(),
        );
        for issue in &c.issues {
            let _ = writeln!(out, "      - {issue}");
        }
    }
    let _ = writeln!(out);

    let summary = report.summary();
    let _ = writeln!(
        out,
        "Issues: {} schema, {} integrity, {} equivalence",
        summary.schema_issues, summary.integrity_issues, summary.equivalence_issues
    );
    if summary.fallback_decryptions > 0 {
        let _ = writeln!(
            out,
            "Secrets decrypted with a rotated key: {}",
            summary.fallback_decryptions
        );
    }
    verdict(&mut out, report.overall_success);
    out
}

fn schema_text(out: &mut String, side: &str, report: &SchemaReport) {
    let _ = writeln!(out, "  [{side}] revision {}", report.revision);
    for t in &report.tables {
        let state = if !t.exists {
            "MISSING".to_string()
        } else {
            format!("{}/{} fields, {} rows", t.fields_found, t.fields_required, t.row_count)
        };
        let _ = writeln!(out, "    {:<18} {} {state}", t.table.table_name(), mark(t.is_clean()));
        for issue in t.issues.iter().filter(|_| t.exists) {
            let _ = writeln!(out, "      - {issue}");
        }
    }
}

fn integrity_text(out: &mut String, side: &str, report: &DatasetIntegrityReport) {
    let _ = writeln!(out, "  [{side}]");
    for e in &report.entities {
        let _ = writeln!(
            out,
            "    {:<18} {} {} records",
            e.entity.table_name(),
            mark(e.success),
            e.records_checked
        );
        for issue in &e.issues {
            let _ = writeln!(out, "      - {issue}");
        }
    }
}

fn verdict(out: &mut String, success: bool) {
    let _ = writeln!(out, "Result: {}", if success { "PASS" } else { "FAIL" });
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAIL"
    }
}
