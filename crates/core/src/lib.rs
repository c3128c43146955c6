//! FasterBASIC Core: source locations and diagnostics shared across the pipeline
//!
//! This crate provides the language-agnostic primitives every compiler stage
//! needs but none of them own exclusively:
//!
//! - `source_map`: file ids and a registry mapping them back to paths
//! - `span`: a `SourceLocation` (file id + line + column), the unit every
//!   token, AST node, and diagnostic is stamped with
//! - `diagnostics`: `Severity`, `Diagnostic`, and the `DiagnosticBag` that
//!   accumulates them for the whole compilation unit until flush

pub mod diagnostics;
pub mod source_map;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag, Severity};
pub use source_map::{FileId, SourceMap};
pub use span::SourceLocation;
