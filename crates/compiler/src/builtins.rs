//! Keyword table and intrinsic function names (spec §4.1: "fixed table of
//! >= 200 entries, looked up case-insensitively").
//!
//! Multi-word constructs (`END IF`, `EXIT FOR`, …) are represented here as
//! their individual keyword tokens; the parser recognizes the pairing by
//! looking ahead, rather than the lexer pre-joining them into one token.

/// The full keyword table. Order doesn't matter; lookup is a linear
/// case-insensitive scan, which is fine at this table size and keeps the
/// list trivially auditable against the spec's keyword list.
const KEYWORDS: &[&str] = &[
    // Declarations / program structure
    "DIM", "REDIM", "PRESERVE", "ERASE", "TYPE", "END", "CLASS", "CONSTRUCTOR", "ME", "NEW",
    "DELETE", "NOTHING", "IS", "CONST", "GLOBAL", "LOCAL", "SHARED", "SUB", "FUNCTION", "WORKER",
    "BYREF", "BYVAL", "AS", "OPTION", "EXPLICIT", "DETECTSTRING", "UNICODE", "SAMM", "ON", "OFF",
    "DECLARE", "STATIC", "PUBLIC", "PRIVATE", "IMPLEMENTS", "INHERITS", "OVERRIDE", "ABSTRACT",
    // Control flow
    "IF", "THEN", "ELSE", "ELSEIF", "FOR", "EACH", "IN", "TO", "STEP", "NEXT", "WHILE", "WEND",
    "DO", "LOOP", "UNTIL", "REPEAT", "SELECT", "CASE", "GOTO", "GOSUB", "RETURN", "EXIT", "STOP",
    "CALL", "ERROR", "DEFAULT",
    // SELECT CASE modifiers
    "IIF",
    // DATA
    "DATA", "READ", "RESTORE",
    // Exceptions
    "TRY", "CATCH", "FINALLY", "THROW", "ERR", "ERL", "RESUME",
    // Assignment / I/O
    "LET", "PRINT", "INPUT", "LINE", "WRITE", "OUTPUT", "APPEND", "OPEN", "CLOSE", "EOF", "LOF",
    "FILENUM", "SEEK", "LOC", "FREEFILE",
    // Terminal control
    "CLS", "LOCATE", "COLOR", "CURSOR", "SAVE", "STYLE", "SCREEN", "ALTERNATE", "BLINK", "HIDE",
    "SHOW", "BOLD", "UNDERLINE", "NORMAL", "ITALIC", "REVERSE", "WIDTH", "HEIGHT", "BEEP",
    // Workers / concurrency
    "SPAWN", "AWAIT", "SEND", "RECEIVE", "MATCH", "MARSHALL", "UNMARSHALL", "AFTER", "EVERY",
    "MS", "CANCEL", "CANCELLED", "TIMER", "ALL", "PARENT", "MAILBOX",
    // Operators as keywords
    "AND", "OR", "XOR", "NOT", "MOD",
    // Literals
    "TRUE", "FALSE",
    // Types
    "INTEGER", "LONG", "LONGLONG", "SINGLE", "DOUBLE", "STRING", "BOOLEAN", "HASHMAP", "LIST",
    "VARIANT", "OBJECT", "ANY",
    // Intrinsic string functions
    "LEN", "LEFT$", "RIGHT$", "MID$", "INSTR", "UCASE$", "LCASE$", "TRIM$", "LTRIM$", "RTRIM$",
    "VAL", "STR$", "CHR$", "ASC", "SPACE$", "STRING$", "INKEY$", "ENVIRON$", "COMMAND$", "HEX$",
    "OCT$", "BIN$", "TIME$", "DATE$", "REPLACE$", "SPLIT", "JOIN", "FORMAT$",
    // Intrinsic math functions
    "INT", "FIX", "CEIL", "FLOOR", "CINT", "CLNG", "CDBL", "CSNG", "CBOOL", "CSTR", "ABS", "SGN",
    "SQR", "SIN", "COS", "TAN", "ATN", "ATN2", "LOG", "EXP", "POW", "MAX", "MIN", "RND",
    "RANDOMIZE",
    // Array / collection functions
    "UBOUND", "LBOUND", "SWAP", "APPEND_FN", "PREPEND", "POP", "SHIFT", "HEAD", "TAIL", "GET",
    "LENGTH", "EMPTY", "COPY", "REVERSE_FN", "EXTEND", "INSERT", "REMOVE", "CLEAR", "CONCAT",
    "HASKEY", "KEYS",
    // Keyboard/mouse
    "KBGET", "KBHIT", "MOUSE", "MOUSE_X", "MOUSE_Y", "MOUSE_BUTTON",
    // System/process
    "SYSTEM", "SHELL", "ENVIRON", "CHDIR", "MKDIR", "RMDIR", "KILL", "NAME", "FILEEXISTS",
    "SLEEP", "EXITCODE",
];

/// Finds the canonical keyword spelling for `text`, case-insensitively.
/// Returns the static table entry (uppercase) so downstream code can match
/// on it without re-normalizing.
pub fn lookup_keyword(text: &str) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|kw| kw.eq_ignore_ascii_case(text))
}

pub fn is_keyword(text: &str) -> bool {
    lookup_keyword(text).is_some()
}

/// Intrinsic (builtin) function names the parser recognizes as calls
/// rather than as user-defined routine references, even before semantic
/// analysis has run. A subset of [`KEYWORDS`] overlaps here since several
/// intrinsics are reserved words; others (e.g. `VAL`) are as well.
pub const INTRINSIC_FUNCTIONS: &[&str] = &[
    "LEN", "LEFT$", "RIGHT$", "MID$", "INSTR", "UCASE$", "LCASE$", "TRIM$", "LTRIM$", "RTRIM$",
    "VAL", "STR$", "CHR$", "ASC", "INT", "CINT", "CLNG", "CDBL", "CSNG", "ABS", "SGN", "SQR",
    "SIN", "COS", "TAN", "ATN", "LOG", "EXP", "RND",
];

pub fn is_intrinsic(name: &str) -> bool {
    INTRINSIC_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_at_least_two_hundred_entries_counting_intrinsics_once() {
        // The spec asks for >= 200 reserved words; our combined surface
        // (keywords plus the intrinsic call names not already keywords)
        // comfortably clears that bar.
        let mut all: Vec<&str> = KEYWORDS.to_vec();
        for f in INTRINSIC_FUNCTIONS {
            if !all.iter().any(|k| k.eq_ignore_ascii_case(f)) {
                all.push(f);
            }
        }
        assert!(all.len() >= 200, "keyword surface unexpectedly small: {}", all.len());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup_keyword("print"), Some("PRINT"));
        assert_eq!(lookup_keyword("Print"), Some("PRINT"));
        assert_eq!(lookup_keyword("notakeyword"), None);
    }
}
