//! Source location: file id + line + column.
//!
//! Line numbers cover both explicit BASIC line-number prefixes (`10 PRINT`)
//! and synthetic ordinals the lexer assigns to lines that don't have one.
//! Lines and columns are 0-indexed internally (so they compose cleanly with
//! tooling like an LSP) and rendered 1-indexed in diagnostics.

use crate::source_map::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: FileId, line: usize, column: usize) -> Self {
        SourceLocation { file, line, column }
    }

    /// A placeholder location for synthesized AST nodes (e.g. constructors
    /// generated by the optimizer) that have no single point of origin.
    pub fn synthetic(file: FileId) -> Self {
        SourceLocation { file, line: 0, column: 0 }
    }
}
