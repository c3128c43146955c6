//! Tokenizer (spec §4.1).
//!
//! Streams source bytes into a token sequence with precise line/column
//! spans. Keywords are looked up case-insensitively after a normal
//! identifier scan; sigil characters (`% ! # $`) attach to the preceding
//! identifier token rather than becoming their own token.

use fbasic_core::diagnostics::DiagnosticBag;
use fbasic_core::source_map::FileId;
use fbasic_core::span::SourceLocation;

use crate::builtins::lookup_keyword;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Integer,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(&'static str),
    Identifier,
    Number(NumberKind),
    StringLiteral,
    Operator,
    Punctuation,
    LineNumber,
    Eol,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: SourceLocation,
    /// The sigil attached to this identifier, if any (`% ! # $`).
    pub sigil: Option<char>,
}

impl Token {
    fn new(kind: TokenKind, lexeme: impl Into<String>, location: SourceLocation) -> Self {
        Token { kind, lexeme: lexeme.into(), location, sigil: None }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if k.eq_ignore_ascii_case(word))
    }
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    file: FileId,
    at_line_start: bool,
    tokens: Vec<Token>,
    diagnostics: DiagnosticBag,
}

const SIGILS: &[char] = &['%', '!', '#', '$'];

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file: FileId) -> Self {
        Lexer {
            bytes: source.as_bytes(),
            pos: 0,
            line: 0,
            column: 0,
            file,
            at_line_start: true,
            tokens: Vec::new(),
            diagnostics: DiagnosticBag::new(),
        }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.file, self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn run(mut self) -> (Vec<Token>, DiagnosticBag) {
        loop {
            self.skip_inline_whitespace();
            match self.peek() {
                None => {
                    self.tokens.push(Token::new(TokenKind::Eof, "", self.loc()));
                    break;
                }
                Some(b'\n') | Some(b'\r') => {
                    let loc = self.loc();
                    if self.peek() == Some(b'\r') {
                        self.advance();
                    }
                    if self.peek() == Some(b'\n') {
                        self.advance();
                    }
                    self.tokens.push(Token::new(TokenKind::Eol, "\n", loc));
                    self.at_line_start = true;
                }
                Some(b'\'') => self.skip_line_comment(),
                Some(b':') => {
                    let loc = self.loc();
                    self.advance();
                    self.tokens.push(Token::new(TokenKind::Punctuation, ":", loc));
                }
                Some(b) if b.is_ascii_digit() => self.scan_number(),
                Some(b'"') => self.scan_string(),
                Some(b) if is_ident_start(b) => self.scan_identifier_or_keyword(),
                Some(b) if is_operator_byte(b) => self.scan_operator(),
                Some(b) if is_punct_byte(b) => {
                    let loc = self.loc();
                    let ch = self.advance().unwrap() as char;
                    self.tokens
                        .push(Token::new(TokenKind::Punctuation, ch.to_string(), loc));
                }
                Some(_) => {
                    let loc = self.loc();
                    self.advance();
                    self.diagnostics.error(loc, "unexpected character");
                }
            }
        }
        (self.tokens, self.diagnostics)
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b' ' || b == b'\t' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn scan_number(&mut self) {
        let loc = self.loc();
        let start = self.pos;
        let mut kind = NumberKind::Integer;
        let line_label_candidate = self.at_line_start;
        self.at_line_start = false;

        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            kind = NumberKind::Float;
            self.advance();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                kind = NumberKind::Float;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
            }
        }

        let lexeme = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap_or_default()
            .to_string();

        if line_label_candidate && kind == NumberKind::Integer {
            self.tokens.push(Token::new(TokenKind::LineNumber, lexeme, loc));
        } else {
            self.tokens.push(Token::new(TokenKind::Number(kind), lexeme, loc));
        }
    }

    fn scan_string(&mut self) {
        let loc = self.loc();
        self.at_line_start = false;
        self.advance(); // opening quote
        // Collect raw bytes and decode as UTF-8 once at the end, rather than
        // mapping each source byte to its own `char` — a multi-byte UTF-8
        // sequence's continuation bytes never equal `"` or `\n`, so they
        // pass through this loop one byte at a time untouched.
        let mut content: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.diagnostics.error(loc, "unterminated string literal");
                    break;
                }
                Some(b'"') => {
                    // "" inside a string is one embedded quote.
                    if self.peek_at(1) == Some(b'"') {
                        content.push(b'"');
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(b) => {
                    self.advance();
                    content.push(b);
                }
            }
        }
        let text = String::from_utf8(content).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        self.tokens.push(Token::new(TokenKind::StringLiteral, text, loc));
    }

    fn scan_identifier_or_keyword(&mut self) {
        let loc = self.loc();
        self.at_line_start = false;
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap_or_default()
            .to_string();

        if text.eq_ignore_ascii_case("rem") {
            self.skip_line_comment();
            return;
        }

        let sigil = match self.peek().map(|b| b as char) {
            Some(c) if SIGILS.contains(&c) => {
                self.advance();
                Some(c)
            }
            _ => None,
        };

        let mut token = if let Some(kw) = lookup_keyword(&text) {
            Token::new(TokenKind::Keyword(kw), text, loc)
        } else {
            Token::new(TokenKind::Identifier, text, loc)
        };
        token.sigil = sigil;
        self.tokens.push(token);
    }

    fn scan_operator(&mut self) {
        let loc = self.loc();
        self.at_line_start = false;
        let two = (self.peek(), self.peek_at(1));
        let lexeme = match two {
            (Some(b'<'), Some(b'>')) => {
                self.advance();
                self.advance();
                "<>".to_string()
            }
            (Some(b'<'), Some(b'=')) => {
                self.advance();
                self.advance();
                "<=".to_string()
            }
            (Some(b'>'), Some(b'=')) => {
                self.advance();
                self.advance();
                ">=".to_string()
            }
            _ => (self.advance().unwrap() as char).to_string(),
        };
        self.tokens.push(Token::new(TokenKind::Operator, lexeme, loc));
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_operator_byte(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b'*' | b'/' | b'\\' | b'^' | b'=' | b'<' | b'>')
}

fn is_punct_byte(b: u8) -> bool {
    matches!(b, b'(' | b')' | b',' | b'.' | b';')
}

/// `tokenize(source) -> (tokens, diagnostics)`, spec §4.1's contract.
/// `REM` is handled here rather than as a byte-level comment, since it
/// needs full keyword recognition to avoid swallowing identifiers that
/// merely start with "REM".
pub fn tokenize(source: &str, file: FileId) -> (Vec<Token>, DiagnosticBag) {
    Lexer::new(source, file).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        tokenize(src, FileId::FIRST).0
    }

    #[test]
    fn recognizes_line_number_prefix() {
        let t = toks("10 PRINT \"X\"\n");
        assert_eq!(t[0].kind, TokenKind::LineNumber);
        assert_eq!(t[0].lexeme, "10");
    }

    #[test]
    fn attaches_sigil_to_identifier() {
        let t = toks("DIM X%\n");
        let ident = t.iter().find(|tok| tok.lexeme == "X").unwrap();
        assert_eq!(ident.sigil, Some('%'));
    }

    #[test]
    fn distinguishes_integer_and_float_literals() {
        let t = toks("X = 3\nY = 3.5\nZ = 1E10\n");
        let numbers: Vec<_> = t.iter().filter(|t| matches!(t.kind, TokenKind::Number(_))).collect();
        assert_eq!(numbers[0].kind, TokenKind::Number(NumberKind::Integer));
        assert_eq!(numbers[1].kind, TokenKind::Number(NumberKind::Float));
        assert_eq!(numbers[2].kind, TokenKind::Number(NumberKind::Float));
    }

    #[test]
    fn doubled_quote_is_embedded_quote() {
        let t = toks("PRINT \"say \"\"hi\"\"\"\n");
        let s = t.iter().find(|t| t.kind == TokenKind::StringLiteral).unwrap();
        assert_eq!(s.lexeme, "say \"hi\"");
    }

    #[test]
    fn unterminated_string_reports_diagnostic_and_resumes() {
        let (_tokens, diags) = tokenize("PRINT \"unterminated\n", FileId::FIRST);
        assert!(diags.has_errors());
    }

    #[test]
    fn rem_and_tick_comments_produce_no_tokens_but_keep_line_count() {
        let t = toks("REM a comment\nPRINT 1\n");
        assert!(t.iter().any(|tok| tok.lexeme == "PRINT"));
        let print_tok = t.iter().find(|tok| tok.lexeme == "PRINT").unwrap();
        assert_eq!(print_tok.location.line, 1);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let t = toks("print 1\nPRINT 2\nPrInT 3\n");
        let kw_count = t.iter().filter(|tok| tok.is_keyword("PRINT")).count();
        assert_eq!(kw_count, 3);
    }

    #[test]
    fn recognizes_two_character_operators() {
        let t = toks("IF X <> 1 AND Y <= 2 THEN\n");
        let ops: Vec<_> = t
            .iter()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert!(ops.contains(&"<>"));
        assert!(ops.contains(&"<="));
    }
}
