//! Diagnostics accumulated across the whole compilation unit and flushed at
//! pipeline exit (spec.md §7).
//!
//! Severity follows the taxonomy in spec.md exactly: lexical and syntax
//! errors are recovered from in place (the lexer/parser keep going),
//! semantic errors suppress codegen but do not stop analysis, and internal
//! consistency failures are fatal compiler bugs that abort immediately
//! rather than being pushed onto the bag.

use crate::source_map::SourceMap;
use crate::span::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: SourceLocation,
}

impl Diagnostic {
    pub fn error(location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            location,
        }
    }

    pub fn warning(location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            location,
        }
    }

    /// Render as `<file>:<line>:<column>: error|warning: <message>`, the
    /// exact user-visible format spec.md §7 specifies. Lines/columns are
    /// stored 0-indexed and rendered 1-indexed.
    pub fn render(&self, sources: &SourceMap) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            sources.display(self.location.file),
            self.location.line + 1,
            self.location.column + 1,
            self.severity,
            self.message
        )
    }
}

/// Accumulates diagnostics for a single compilation unit.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Diagnostic::error(location, message));
    }

    pub fn warning(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Diagnostic::warning(location, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Exit code for a CLI driver: nonzero iff any error-severity diagnostic
    /// was emitted (spec.md §6, §7).
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() { 1 } else { 0 }
    }

    pub fn render_all(&self, sources: &SourceMap) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.render(sources))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::FileId;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId::FIRST, 9, 3)
    }

    #[test]
    fn render_matches_documented_format() {
        let mut sources = SourceMap::new();
        sources.add("prog.bas");
        let diag = Diagnostic::error(loc(), "undeclared variable 'X'");
        assert_eq!(
            diag.render(&sources),
            "prog.bas:10:4: error: undeclared variable 'X'"
        );
    }

    #[test]
    fn exit_code_is_nonzero_only_with_errors() {
        let mut bag = DiagnosticBag::new();
        assert_eq!(bag.exit_code(), 0);
        bag.warning(loc(), "unused variable 'Y'");
        assert_eq!(bag.exit_code(), 0);
        bag.error(loc(), "type mismatch");
        assert_eq!(bag.exit_code(), 1);
        assert!(bag.has_errors());
    }

    #[test]
    fn extend_merges_two_bags_in_order() {
        let mut a = DiagnosticBag::new();
        a.error(loc(), "first");
        let mut b = DiagnosticBag::new();
        b.warning(loc(), "second");
        a.extend(b);
        assert_eq!(a.len(), 2);
    }
}
