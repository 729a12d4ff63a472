//! # aim-schema — Structural Validation
//!
//! Checks that each implementation's store has the tables and fields the
//! configuration store requires, with values of the right primitive type.
//!
//! ## Catalog (`catalog`)
//!
//! One fixed field list per table and [`SchemaRevision`]. Each entry
//! compiles to a Draft 2020-12 JSON Schema for row typing.
//!
//! ## Validation (`validate`)
//!
//! - [`SchemaValidator::validate`]: one [`SchemaReport`] per dataset, with a
//!   [`TableSchemaReport`] for each of the five tables.
//!
//! ## Crate Policy
//!
//! - Depends only on `aim-core` internally.
//! - Structural only: values are checked for type, never for meaning.
//! - Issues accumulate; no table's problems stop another table's checks.

pub mod catalog;
pub mod error;
pub mod validate;

pub use catalog::{EntitySchema, FieldSpec, FieldType, SchemaRevision};
pub use error::SchemaError;
pub use validate::{validate_table, SchemaIssue, SchemaReport, SchemaValidator, TableSchemaReport};
