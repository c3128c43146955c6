//! Error type for code generation.
//!
//! Everything the code generator can fail on is an internal consistency
//! problem (spec §4.6.4): a CFG edge whose target block was never emitted,
//! a temporary referenced before its defining instruction, an unknown
//! runtime symbol. These are compiler bugs, not user-facing diagnostics, so
//! they propagate with `?` instead of going through `DiagnosticBag`.

#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation (unresolved block, bad symbol).
    Logic(String),
    /// A formatting error while writing IR text.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "IR generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
