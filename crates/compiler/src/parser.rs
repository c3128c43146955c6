//! Recursive-descent parser with operator-precedence expression parsing
//! (spec §4.2).
//!
//! Operator precedence, low to high: `OR XOR`, `AND`, unary `NOT`,
//! comparisons, `+ -`, `* / \ MOD`, unary `-`, `^` (right-assoc), primary.
//! Member access (`.`) and indexing (`()`) bind tighter than all of the
//! above and are handled inside `primary`/`postfix`.

use crate::ast::*;
use crate::lexer::{NumberKind, Token, TokenKind};
use crate::types::TypeDescriptor;
use fbasic_core::diagnostics::DiagnosticBag;
use fbasic_core::source_map::FileId;
use fbasic_core::span::SourceLocation;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: FileId,
    diagnostics: DiagnosticBag,
}

const STATEMENT_KEYWORDS: &[&str] = &[
    "IF", "FOR", "WHILE", "DO", "REPEAT", "SELECT", "GOTO", "GOSUB", "RETURN", "CALL", "DIM",
    "REDIM", "ERASE", "DATA", "READ", "RESTORE", "DEF", "SUB", "FUNCTION", "WORKER", "TYPE",
    "CLASS", "TRY", "THROW", "OPTION", "PRINT", "INPUT", "LET", "END", "STOP", "EXIT", "ON",
    "RESUME", "SPAWN", "SEND", "MATCH", "CANCEL", "DELETE", "CLS", "LOCATE", "COLOR", "CURSOR",
    "SCREEN", "AFTER", "EVERY", "TIMER",
];

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], file: FileId) -> Self {
        Parser { tokens, pos: 0, file, diagnostics: DiagnosticBag::new() }
    }

    pub fn parse_program(mut self) -> (Program, DiagnosticBag) {
        let mut lines = Vec::new();
        self.skip_eols();
        while !self.is_eof() {
            lines.push(self.parse_line());
            self.skip_eols();
        }
        (Program { lines }, self.diagnostics)
    }

    // ---- token stream plumbing ----------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_n(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn loc(&self) -> SourceLocation {
        self.peek().location
    }

    fn check_kw(&self, word: &str) -> bool {
        self.peek().is_keyword(word)
    }

    fn check_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punctuation) && self.peek().lexeme == p
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Operator) && self.peek().lexeme == op
    }

    fn consume_kw(&mut self, word: &str) -> bool {
        if self.check_kw(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_punct(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, word: &str) {
        if !self.consume_kw(word) {
            let loc = self.loc();
            self.diagnostics.error(
                loc,
                format!("expected '{}', found '{}'", word, self.peek().lexeme),
            );
        }
    }

    fn expect_punct(&mut self, p: &str) {
        if !self.consume_punct(p) {
            let loc = self.loc();
            self.diagnostics
                .error(loc, format!("expected '{}', found '{}'", p, self.peek().lexeme));
        }
    }

    fn skip_eols(&mut self) {
        while matches!(self.peek().kind, TokenKind::Eol) {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof)
            || self.check_punct(":")
    }

    /// Panic-mode recovery (spec §4.2): skip to the next statement
    /// separator or block keyword.
    fn recover(&mut self) {
        loop {
            if self.at_statement_end() || self.is_eof() {
                return;
            }
            if let TokenKind::Keyword(k) = self.peek().kind {
                if STATEMENT_KEYWORDS.contains(&k) {
                    return;
                }
            }
            self.advance();
        }
    }

    // ---- lines and statement lists -------------------------------------

    fn parse_line(&mut self) -> Line {
        let location = self.loc();
        let label = if let TokenKind::LineNumber = self.peek().kind {
            let tok = self.advance();
            tok.lexeme.parse::<u32>().ok()
        } else {
            None
        };

        let mut statements = Vec::new();
        if !matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof) {
            statements.push(self.parse_statement());
            while self.consume_punct(":") {
                if matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof) {
                    break;
                }
                statements.push(self.parse_statement());
            }
        }
        Line { label, statements, location }
    }

    /// Parses a statement list until one of `terminators` is seen (as a
    /// keyword) at the start of a line, used for the bodies of structured
    /// blocks (`THEN ... ELSE`, `FOR ... NEXT`, etc).
    fn parse_block(&mut self, terminators: &[&str]) -> Vec<Statement> {
        let mut stmts = Vec::new();
        self.skip_eols();
        loop {
            if self.is_eof() {
                break;
            }
            if terminators.iter().any(|t| self.check_kw(t)) {
                break;
            }
            stmts.push(self.parse_statement());
            while self.consume_punct(":") {
                if terminators.iter().any(|t| self.check_kw(t)) {
                    break;
                }
                stmts.push(self.parse_statement());
            }
            self.skip_eols();
        }
        stmts
    }

    fn parse_statement(&mut self) -> Statement {
        let location = self.loc();
        let stmt = self.parse_statement_inner(location);
        match stmt {
            Some(s) => s,
            None => {
                self.recover();
                Statement::End { location }
            }
        }
    }

    fn parse_statement_inner(&mut self, location: SourceLocation) -> Option<Statement> {
        if self.check_kw("IF") {
            return Some(self.parse_if());
        }
        if self.check_kw("FOR") {
            return Some(self.parse_for());
        }
        if self.check_kw("WHILE") {
            return Some(self.parse_while());
        }
        if self.check_kw("DO") {
            return Some(self.parse_do());
        }
        if self.check_kw("REPEAT") {
            return Some(self.parse_repeat());
        }
        if self.check_kw("SELECT") {
            return Some(self.parse_select_case());
        }
        if self.check_kw("TRY") {
            return Some(self.parse_try());
        }
        if self.check_kw("THROW") {
            return Some(self.parse_throw());
        }
        if self.check_kw("GOTO") {
            self.advance();
            let target = self.expect_line_ref();
            return Some(Statement::Goto { target, location });
        }
        if self.check_kw("GOSUB") {
            self.advance();
            let target = self.expect_line_ref();
            return Some(Statement::Gosub { target, location });
        }
        if self.check_kw("ON") {
            return self.parse_on(location);
        }
        if self.check_kw("RESUME") {
            self.advance();
            let next = self.consume_kw("NEXT");
            return Some(Statement::Resume { next, location });
        }
        if self.check_kw("RETURN") {
            self.advance();
            let value = if self.at_statement_end() {
                None
            } else {
                Some(self.parse_expr())
            };
            return Some(Statement::Return { value, location });
        }
        if self.check_kw("EXIT") {
            self.advance();
            if self.consume_kw("FOR") {
                return Some(Statement::ExitLoop { kind: LoopKind::For, location });
            }
            if self.consume_kw("WHILE") {
                return Some(Statement::ExitLoop { kind: LoopKind::While, location });
            }
            if self.consume_kw("DO") {
                return Some(Statement::ExitLoop { kind: LoopKind::Do, location });
            }
            let _ = self.consume_kw("FUNCTION") || self.consume_kw("SUB");
            return Some(Statement::ExitRoutine { location });
        }
        if self.check_kw("END") {
            // A well-formed program never reaches here with a block
            // terminator ("END IF", "END SUB", ...): `parse_block` checks
            // for a bare "END" before calling into statement parsing. This
            // arm only fires for a standalone `END` statement.
            self.advance();
            return Some(Statement::End { location });
        }
        if self.check_kw("STOP") {
            self.advance();
            return Some(Statement::StopStmt { location });
        }
        if self.check_kw("DIM") {
            return Some(self.parse_dim());
        }
        if self.check_kw("REDIM") {
            return Some(self.parse_redim());
        }
        if self.check_kw("ERASE") {
            self.advance();
            let name = self.expect_identifier();
            return Some(Statement::Erase { name, location });
        }
        if self.check_kw("DATA") {
            return Some(self.parse_data());
        }
        if self.check_kw("READ") {
            return Some(self.parse_read());
        }
        if self.check_kw("RESTORE") {
            return Some(self.parse_restore());
        }
        if self.check_kw("OPTION") {
            return Some(self.parse_option());
        }
        if self.check_kw("TYPE") {
            return Some(Statement::DefType { def: self.parse_type_def() });
        }
        if self.check_kw("CLASS") {
            return Some(Statement::DefClass { def: self.parse_class_def() });
        }
        if self.check_kw("SUB") {
            return Some(Statement::DefRoutine { def: self.parse_routine_def(RoutineKind::Sub) });
        }
        if self.check_kw("FUNCTION") {
            return Some(Statement::DefRoutine { def: self.parse_routine_def(RoutineKind::Function) });
        }
        if self.check_kw("WORKER") {
            return Some(Statement::Worker { def: self.parse_routine_def(RoutineKind::Worker) });
        }
        if self.check_kw("PRINT") {
            return Some(self.parse_print());
        }
        if self.check_kw("INPUT") {
            return Some(self.parse_input(false));
        }
        if self.check_kw("LINE") {
            self.advance();
            self.expect_kw("INPUT");
            return Some(self.parse_input(true));
        }
        if self.check_kw("LET") {
            self.advance();
            return Some(self.parse_assignment_or_slice(location));
        }
        if self.check_kw("CALL") {
            self.advance();
            return Some(self.parse_call_stmt(location));
        }
        if self.check_kw("SPAWN") {
            return Some(self.parse_spawn(location));
        }
        if self.check_kw("SEND") {
            self.advance();
            let target = self.parse_expr();
            self.expect_punct(",");
            let value = self.parse_expr();
            return Some(Statement::Send { target, value, location });
        }
        if self.check_kw("MATCH") {
            return Some(self.parse_match_receive(location));
        }
        if self.check_kw("AFTER") {
            self.advance();
            let delay_ms = self.parse_expr();
            self.expect_kw("MS");
            self.expect_kw("SEND");
            let target = self.parse_expr();
            self.expect_punct(",");
            let value = self.parse_expr();
            return Some(Statement::AfterMsSend { delay_ms, target, value, location });
        }
        if self.check_kw("EVERY") {
            self.advance();
            let interval_ms = self.parse_expr();
            self.expect_kw("MS");
            self.expect_kw("SEND");
            let target = self.parse_expr();
            self.expect_punct(",");
            let value = self.parse_expr();
            return Some(Statement::EveryMsSend { interval_ms, target, value, location });
        }
        if self.check_kw("TIMER") {
            self.advance();
            self.expect_kw("STOP");
            self.expect_kw("ALL");
            return Some(Statement::TimerStopAll { location });
        }
        if self.check_kw("CANCEL") {
            self.advance();
            let target = self.parse_expr();
            return Some(Statement::Cancel { target, location });
        }
        if self.check_kw("DELETE") {
            self.advance();
            let target = self.parse_lvalue();
            return Some(Statement::DeleteObject { target, location });
        }
        if let Some(op) = self.try_terminal_op() {
            return Some(self.parse_terminal_stmt(op, location));
        }
        if matches!(self.peek().kind, TokenKind::Identifier) {
            return Some(self.parse_assignment_or_slice(location));
        }

        let loc = self.loc();
        self.diagnostics
            .error(loc, format!("unexpected token '{}' at start of statement", self.peek().lexeme));
        None
    }

    fn try_terminal_op(&mut self) -> Option<TerminalOp> {
        if self.consume_kw("CLS") {
            return Some(TerminalOp::Cls);
        }
        if self.consume_kw("LOCATE") {
            return Some(TerminalOp::Locate);
        }
        if self.consume_kw("COLOR") {
            return Some(TerminalOp::Color);
        }
        if self.check_kw("CURSOR") {
            self.advance();
            if self.consume_kw("SAVE") {
                return Some(TerminalOp::CursorSave);
            }
            if self.consume_kw("HIDE") {
                return Some(TerminalOp::CursorHide);
            }
            if self.consume_kw("SHOW") {
                return Some(TerminalOp::CursorShow);
            }
            return Some(TerminalOp::CursorSave);
        }
        if self.check_kw("STYLE") {
            self.advance();
            if self.consume_kw("BOLD") {
                return Some(TerminalOp::StyleBold);
            }
            if self.consume_kw("UNDERLINE") {
                return Some(TerminalOp::StyleUnderline);
            }
            let _ = self.consume_kw("NORMAL");
            return Some(TerminalOp::StyleNormal);
        }
        if self.check_kw("SCREEN") {
            self.advance();
            self.expect_kw("ALTERNATE");
            return Some(TerminalOp::ScreenAlternate);
        }
        None
    }

    fn parse_terminal_stmt(&mut self, op: TerminalOp, location: SourceLocation) -> Statement {
        let mut args = Vec::new();
        if !self.at_statement_end() {
            args.push(self.parse_expr());
            while self.consume_punct(",") {
                args.push(self.parse_expr());
            }
        }
        Statement::Terminal { op, args, location }
    }

    // ---- control flow ---------------------------------------------------

    fn parse_if(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // IF
        let cond = self.parse_expr();
        self.expect_kw("THEN");

        let single_line = !matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof);
        if single_line {
            let mut then_body = vec![self.parse_statement()];
            while self.consume_punct(":") {
                if self.check_kw("ELSE") || self.at_statement_end() {
                    break;
                }
                then_body.push(self.parse_statement());
            }
            let else_body = if self.consume_kw("ELSE") {
                let mut stmts = vec![self.parse_statement()];
                while self.consume_punct(":") {
                    if self.at_statement_end() {
                        break;
                    }
                    stmts.push(self.parse_statement());
                }
                Some(stmts)
            } else {
                None
            };
            return Statement::If { cond, then_body, elseifs: Vec::new(), else_body, location };
        }

        let then_body = self.parse_block(&["ELSEIF", "ELSE", "END"]);
        let mut elseifs = Vec::new();
        while self.check_kw("ELSEIF") {
            self.advance();
            let c = self.parse_expr();
            self.expect_kw("THEN");
            let body = self.parse_block(&["ELSEIF", "ELSE", "END"]);
            elseifs.push((c, body));
        }
        let else_body = if self.consume_kw("ELSE") {
            Some(self.parse_block(&["END"]))
        } else {
            None
        };
        self.expect_kw("END");
        self.expect_kw("IF");
        Statement::If { cond, then_body, elseifs, else_body, location }
    }

    fn parse_for(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // FOR
        let var = self.expect_identifier();
        self.expect_op_eq();
        let from = self.parse_expr();
        self.expect_kw("TO");
        let to = self.parse_expr();
        let step = if self.consume_kw("STEP") { Some(self.parse_expr()) } else { None };
        let body = self.parse_block(&["NEXT"]);
        self.expect_kw("NEXT");
        if matches!(self.peek().kind, TokenKind::Identifier) {
            self.advance();
        }
        Statement::For { var, var_symbol: None, from, to, step, body, location }
    }

    fn parse_while(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let cond = self.parse_expr();
        let body = self.parse_block(&["WEND"]);
        self.expect_kw("WEND");
        Statement::While { cond, body, location }
    }

    fn parse_do(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // DO
        let pre_test = if self.consume_kw("WHILE") {
            Some(DoTest::PreWhile)
        } else if self.consume_kw("UNTIL") {
            Some(DoTest::PreUntil)
        } else {
            None
        };
        let pre_cond = pre_test.map(|_| self.parse_expr());
        let body = self.parse_block(&["LOOP"]);
        self.expect_kw("LOOP");

        if let Some(test) = pre_test {
            return Statement::Do { test, cond: pre_cond, body, location };
        }
        let post_test = if self.consume_kw("WHILE") {
            Some(DoTest::PostWhile)
        } else if self.consume_kw("UNTIL") {
            Some(DoTest::PostUntil)
        } else {
            None
        };
        match post_test {
            Some(test) => {
                let cond = Some(self.parse_expr());
                Statement::Do { test, cond, body, location }
            }
            None => Statement::Do { test: DoTest::None, cond: None, body, location },
        }
    }

    fn parse_repeat(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let body = self.parse_block(&["UNTIL"]);
        self.expect_kw("UNTIL");
        let until_cond = self.parse_expr();
        Statement::Repeat { body, until_cond, location }
    }

    fn parse_select_case(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // SELECT
        self.expect_kw("CASE");
        let scrutinee = self.parse_expr();
        self.skip_eols();
        let mut arms = Vec::new();
        let mut else_body = None;
        while self.check_kw("CASE") {
            self.advance();
            if self.consume_kw("ELSE") {
                else_body = Some(self.parse_block(&["CASE", "END"]));
                break;
            }
            let matches = self.parse_case_matches();
            let body = self.parse_block(&["CASE", "END"]);
            arms.push(CaseArm { matches, body });
        }
        self.expect_kw("END");
        self.expect_kw("SELECT");
        Statement::SelectCase { scrutinee, arms, else_body, location }
    }

    fn parse_case_matches(&mut self) -> Vec<CaseMatch> {
        let mut matches = Vec::new();
        loop {
            if self.consume_kw("IS") {
                let op = self.parse_compare_op().unwrap_or(CompareOp::Eq);
                let v = self.parse_expr();
                matches.push(CaseMatch::Comparison(op, v));
            } else {
                let first = self.parse_expr();
                if self.consume_kw("TO") {
                    let hi = self.parse_expr();
                    matches.push(CaseMatch::Range(first, hi));
                } else {
                    let mut values = vec![first];
                    while self.consume_punct(",") {
                        values.push(self.parse_expr());
                    }
                    matches.push(CaseMatch::Values(values));
                    if !self.check_punct(",") {
                        // fallthrough handled by outer loop below
                    }
                }
            }
            if !self.consume_punct(",") {
                break;
            }
        }
        matches
    }

    fn parse_compare_op(&mut self) -> Option<CompareOp> {
        if self.consume_op("=") {
            return Some(CompareOp::Eq);
        }
        if self.consume_op("<>") {
            return Some(CompareOp::Ne);
        }
        if self.consume_op("<=") {
            return Some(CompareOp::Le);
        }
        if self.consume_op(">=") {
            return Some(CompareOp::Ge);
        }
        if self.consume_op("<") {
            return Some(CompareOp::Lt);
        }
        if self.consume_op(">") {
            return Some(CompareOp::Gt);
        }
        None
    }

    fn parse_try(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // TRY
        let body = self.parse_block(&["CATCH", "FINALLY", "END"]);
        let mut catches = Vec::new();
        while self.check_kw("CATCH") {
            self.advance();
            let code = if matches!(self.peek().kind, TokenKind::Number(NumberKind::Integer)) {
                let tok = self.advance();
                tok.lexeme.parse::<i64>().ok()
            } else {
                None
            };
            let arm_body = self.parse_block(&["CATCH", "FINALLY", "END"]);
            catches.push(CatchArm { code, body: arm_body });
        }
        let finally = if self.consume_kw("FINALLY") {
            Some(self.parse_block(&["END"]))
        } else {
            None
        };
        self.expect_kw("END");
        self.expect_kw("TRY");
        Statement::Try { body, catches, finally, location }
    }

    fn parse_throw(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let code = self.parse_expr();
        Statement::Throw { code, location }
    }

    fn parse_on(&mut self, location: SourceLocation) -> Option<Statement> {
        self.advance(); // ON
        if self.consume_kw("ERROR") {
            self.expect_kw("GOTO");
            if self.consume_op("-") || self.check_kw("0") {
                // ON ERROR GOTO 0 disables the handler.
            }
            let target = if matches!(self.peek().kind, TokenKind::LineNumber | TokenKind::Number(_)) {
                Some(self.expect_line_ref())
            } else {
                None
            };
            return Some(Statement::OnErrorGoto { target, location });
        }
        let selector = self.parse_expr();
        let is_gosub = if self.consume_kw("GOSUB") {
            true
        } else {
            self.expect_kw("GOTO");
            false
        };
        let mut targets = vec![self.expect_line_ref()];
        while self.consume_punct(",") {
            targets.push(self.expect_line_ref());
        }
        Some(Statement::OnGoto { selector, targets, is_gosub, location })
    }

    fn expect_line_ref(&mut self) -> u32 {
        if matches!(self.peek().kind, TokenKind::LineNumber | TokenKind::Number(_)) {
            let tok = self.advance();
            tok.lexeme.parse::<u32>().unwrap_or(0)
        } else {
            // A label reference (identifier used as a GOTO target).
            self.advance();
            0
        }
    }

    // ---- declarations ----------------------------------------------------

    fn parse_dim(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // DIM
        let name = self.expect_identifier();
        let sigil = self.last_sigil();
        let mut array_bounds = Vec::new();
        if self.consume_punct("(") {
            array_bounds.push(self.parse_array_bound());
            while self.consume_punct(",") {
                array_bounds.push(self.parse_array_bound());
            }
            self.expect_punct(")");
        }
        let ty = if self.consume_kw("AS") {
            self.parse_type_name()
        } else {
            crate::types::type_for_sigil(sigil.unwrap_or('%')).unwrap_or(TypeDescriptor::Integer32)
        };
        let initializer = if self.consume_op("=") { Some(self.parse_expr()) } else { None };
        Statement::Dim { name, ty, array_bounds, initializer, location }
    }

    fn parse_array_bound(&mut self) -> (Expr, Expr) {
        let first = self.parse_expr();
        if self.consume_kw("TO") {
            let hi = self.parse_expr();
            (first, hi)
        } else {
            let zero = Expr::new(ExprKind::IntLiteral(0), first.location);
            (zero, first)
        }
    }

    fn parse_redim(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // REDIM
        let preserve = self.consume_kw("PRESERVE");
        let name = self.expect_identifier();
        let mut array_bounds = Vec::new();
        if self.consume_punct("(") {
            array_bounds.push(self.parse_array_bound());
            while self.consume_punct(",") {
                array_bounds.push(self.parse_array_bound());
            }
            self.expect_punct(")");
        }
        Statement::Redim { name, array_bounds, preserve, location }
    }

    fn parse_type_name(&mut self) -> TypeDescriptor {
        if self.consume_kw("INTEGER") {
            return TypeDescriptor::Integer16;
        }
        if self.consume_kw("LONG") {
            return TypeDescriptor::Integer32;
        }
        if self.consume_kw("LONGLONG") {
            return TypeDescriptor::Long64;
        }
        if self.consume_kw("SINGLE") {
            return TypeDescriptor::Single;
        }
        if self.consume_kw("DOUBLE") {
            return TypeDescriptor::Double;
        }
        if self.consume_kw("STRING") {
            return TypeDescriptor::String { unicode: false };
        }
        if self.consume_kw("BOOLEAN") {
            return TypeDescriptor::Boolean;
        }
        if self.consume_kw("HASHMAP") {
            return TypeDescriptor::Hashmap;
        }
        // A user-defined TYPE or CLASS name.
        let name = self.expect_identifier();
        TypeDescriptor::Udt(name)
    }

    fn parse_type_def(&mut self) -> TypeDef {
        let location = self.loc();
        self.advance(); // TYPE
        let name = self.expect_identifier();
        self.skip_eols();
        let mut fields = Vec::new();
        while !self.check_kw("END") && !self.is_eof() {
            let fname = self.expect_identifier();
            self.expect_kw("AS");
            let fty = self.parse_type_name();
            fields.push(Field { name: fname, ty: fty });
            self.skip_eols();
        }
        self.expect_kw("END");
        self.expect_kw("TYPE");
        TypeDef { name, fields, location }
    }

    fn parse_class_def(&mut self) -> ClassDef {
        let location = self.loc();
        self.advance(); // CLASS
        let name = self.expect_identifier();
        self.skip_eols();
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check_kw("END") && !self.is_eof() {
            if self.check_kw("CONSTRUCTOR") {
                self.advance();
                let params = self.parse_param_list();
                let body = self.parse_block(&["END"]);
                self.expect_kw("END");
                self.expect_kw("CONSTRUCTOR");
                methods.push(MethodDef {
                    name: "CONSTRUCTOR".to_string(),
                    params,
                    return_ty: None,
                    body,
                    is_constructor: true,
                });
            } else if self.check_kw("SUB") || self.check_kw("FUNCTION") {
                let kind = if self.check_kw("SUB") { RoutineKind::Sub } else { RoutineKind::Function };
                let def = self.parse_routine_def(kind);
                methods.push(MethodDef {
                    name: def.name,
                    params: def.params,
                    return_ty: def.return_ty,
                    body: def.body,
                    is_constructor: false,
                });
            } else {
                let fname = self.expect_identifier();
                self.expect_kw("AS");
                let fty = self.parse_type_name();
                fields.push(Field { name: fname, ty: fty });
            }
            self.skip_eols();
        }
        self.expect_kw("END");
        self.expect_kw("CLASS");
        ClassDef { name, fields, methods, location }
    }

    fn parse_param_list(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        self.expect_punct("(");
        if !self.check_punct(")") {
            params.push(self.parse_param());
            while self.consume_punct(",") {
                params.push(self.parse_param());
            }
        }
        self.expect_punct(")");
        params
    }

    fn parse_param(&mut self) -> Param {
        let mode = if self.consume_kw("BYREF") {
            ByRef::ByReference
        } else {
            let _ = self.consume_kw("BYVAL");
            ByRef::ByValue
        };
        let name = self.expect_identifier();
        let sigil = self.last_sigil();
        let ty = if self.consume_kw("AS") {
            self.parse_type_name()
        } else {
            crate::types::type_for_sigil(sigil.unwrap_or('%')).unwrap_or(TypeDescriptor::Integer32)
        };
        Param { name, ty, mode }
    }

    fn parse_routine_def(&mut self, kind: RoutineKind) -> RoutineDef {
        let location = self.loc();
        self.advance(); // SUB/FUNCTION/WORKER
        let name = self.expect_identifier();
        let params = self.parse_param_list();
        let return_ty = if self.consume_kw("AS") { Some(self.parse_type_name()) } else { None };
        let end_words: &[&str] = match kind {
            RoutineKind::Sub => &["END"],
            RoutineKind::Function => &["END"],
            RoutineKind::Worker => &["END"],
        };
        let body = self.parse_block(end_words);
        self.expect_kw("END");
        match kind {
            RoutineKind::Sub => self.expect_kw("SUB"),
            RoutineKind::Function => self.expect_kw("FUNCTION"),
            RoutineKind::Worker => self.expect_kw("WORKER"),
        }
        RoutineDef { name, params, return_ty, body, kind, location }
    }

    // ---- DATA/READ/RESTORE -----------------------------------------------

    fn parse_data(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let mut values = vec![self.parse_data_literal()];
        while self.consume_punct(",") {
            values.push(self.parse_data_literal());
        }
        Statement::Data { values, location }
    }

    fn parse_data_literal(&mut self) -> DataLiteral {
        if matches!(self.peek().kind, TokenKind::StringLiteral) {
            return DataLiteral::Str(self.advance().lexeme);
        }
        let negate = self.consume_op("-");
        match self.peek().kind {
            TokenKind::Number(NumberKind::Integer) => {
                let v: i64 = self.advance().lexeme.parse().unwrap_or(0);
                DataLiteral::Int(if negate { -v } else { v })
            }
            TokenKind::Number(NumberKind::Float) => {
                let v: f64 = self.advance().lexeme.parse().unwrap_or(0.0);
                DataLiteral::Float(if negate { -v } else { v })
            }
            _ => {
                let tok = self.advance();
                DataLiteral::Str(tok.lexeme)
            }
        }
    }

    fn parse_read(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let mut targets = vec![self.parse_lvalue()];
        while self.consume_punct(",") {
            targets.push(self.parse_lvalue());
        }
        Statement::Read { targets, location }
    }

    fn parse_restore(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let target = if self.at_statement_end() {
            None
        } else if matches!(self.peek().kind, TokenKind::LineNumber | TokenKind::Number(_)) {
            Some(RestoreTarget::Line(self.expect_line_ref()))
        } else {
            Some(RestoreTarget::Label(self.expect_identifier()))
        };
        Statement::Restore { target, location }
    }

    fn parse_option(&mut self) -> Statement {
        let location = self.loc();
        self.advance();
        let name = self.expect_identifier_or_keyword_text();
        let value = if self.consume_kw("ON") {
            Some("ON".to_string())
        } else if self.consume_kw("OFF") {
            Some("OFF".to_string())
        } else {
            None
        };
        Statement::Option { name, value, location }
    }

    // ---- PRINT / INPUT ----------------------------------------------------

    fn parse_print(&mut self) -> Statement {
        let location = self.loc();
        self.advance(); // PRINT
        let mut items = Vec::new();
        if self.at_statement_end() {
            return Statement::Print { items, location };
        }
        loop {
            let expr = self.parse_expr();
            let trailing = if self.consume_punct(";") {
                PrintSeparator::Semicolon
            } else if self.consume_punct(",") {
                PrintSeparator::Comma
            } else {
                PrintSeparator::Newline
            };
            items.push(PrintItem { expr, trailing });
            if trailing == PrintSeparator::Newline {
                break;
            }
            if self.at_statement_end() {
                break;
            }
        }
        Statement::Print { items, location }
    }

    fn parse_input(&mut self, line_mode: bool) -> Statement {
        let location = self.loc();
        self.advance(); // INPUT
        let prompt = if matches!(self.peek().kind, TokenKind::StringLiteral) {
            let text = self.advance().lexeme;
            let _ = self.consume_punct(";") || self.consume_punct(",");
            Some(text)
        } else {
            None
        };
        let mut targets = vec![self.parse_lvalue()];
        while self.consume_punct(",") {
            targets.push(self.parse_lvalue());
        }
        Statement::Input { prompt, targets, line_mode, location }
    }

    // ---- assignment / call / spawn / match receive -----------------------

    fn parse_assignment_or_slice(&mut self, location: SourceLocation) -> Statement {
        let lvalue = self.parse_lvalue();
        if let LValue::StringSlice { name, symbol, start, end } = lvalue {
            self.expect_op_eq();
            let value = self.parse_expr();
            return Statement::SliceAssign {
                target: LValue::StringSlice { name, symbol, start: None, end: None },
                start: start.map(|b| *b),
                end: end.map(|b| *b),
                value,
                location,
            };
        }
        self.expect_op_eq();
        let value = self.parse_expr();
        Statement::Let { target: lvalue, value, location }
    }

    fn parse_call_stmt(&mut self, location: SourceLocation) -> Statement {
        let name = self.expect_identifier();
        let mut args = Vec::new();
        if self.consume_punct("(") {
            if !self.check_punct(")") {
                args.push(self.parse_expr());
                while self.consume_punct(",") {
                    args.push(self.parse_expr());
                }
            }
            self.expect_punct(")");
        } else {
            while !self.at_statement_end() {
                args.push(self.parse_expr());
                if !self.consume_punct(",") {
                    break;
                }
            }
        }
        Statement::Call { name, symbol: None, args, location }
    }

    fn parse_spawn(&mut self, location: SourceLocation) -> Statement {
        // Only reachable from inside an expression context normally
        // (`f = SPAWN W()`); as a bare statement it's a fire-and-forget
        // spawn whose future is discarded.
        self.advance(); // SPAWN
        let routine = self.expect_identifier();
        let mut args = Vec::new();
        self.expect_punct("(");
        if !self.check_punct(")") {
            args.push(self.parse_expr());
            while self.consume_punct(",") {
                args.push(self.parse_expr());
            }
        }
        self.expect_punct(")");
        Statement::Spawn {
            target: LValue::Variable { name: "_".to_string(), symbol: None },
            routine,
            args,
            location,
        }
    }

    fn parse_match_receive(&mut self, location: SourceLocation) -> Statement {
        self.advance(); // MATCH
        self.expect_kw("RECEIVE");
        self.expect_punct("(");
        let source = self.parse_expr();
        self.expect_punct(")");
        self.skip_eols();
        let mut arms = Vec::new();
        let mut else_body = None;
        while self.check_kw("CASE") {
            self.advance();
            if self.consume_kw("ELSE") {
                else_body = Some(self.parse_block(&["CASE", "END"]));
                break;
            }
            let type_name = Some(self.expect_identifier());
            let bind_name = if matches!(self.peek().kind, TokenKind::Identifier) {
                Some(self.expect_identifier())
            } else {
                None
            };
            let body = self.parse_block(&["CASE", "END"]);
            arms.push(MatchArm { type_name, bind_name, body });
        }
        self.expect_kw("END");
        self.expect_kw("MATCH");
        Statement::MatchReceive { source, arms, else_body, location }
    }

    // ---- lvalues -----------------------------------------------------------

    fn parse_lvalue(&mut self) -> LValue {
        let name = self.expect_identifier();
        let mut base = LValue::Variable { name: name.clone(), symbol: None };

        if self.check_punct("(") {
            self.advance();
            // Disambiguate a string slice `S$(a TO b)` from an array
            // index `A(i)` by looking for the `TO` keyword after the
            // first expression.
            let first = if self.check_kw("TO") { None } else { Some(self.parse_expr()) };
            if self.consume_kw("TO") {
                let end = if self.check_punct(")") { None } else { Some(Box::new(self.parse_expr())) };
                self.expect_punct(")");
                base = LValue::StringSlice {
                    name,
                    symbol: None,
                    start: first.map(Box::new),
                    end,
                };
            } else {
                let mut indices = Vec::new();
                if let Some(f) = first {
                    indices.push(f);
                }
                while self.consume_punct(",") {
                    indices.push(self.parse_expr());
                }
                self.expect_punct(")");
                base = LValue::ArrayElement { name, symbol: None, indices };
            }
        }

        while self.consume_punct(".") {
            let field = self.expect_identifier();
            base = LValue::Field { base: Box::new(base), field };
        }
        base
    }

    // ---- expressions (operator precedence) ---------------------------------

    pub fn parse_expr(&mut self) -> Expr {
        self.parse_or_xor()
    }

    fn parse_or_xor(&mut self) -> Expr {
        let mut lhs = self.parse_and();
        loop {
            let op = if self.consume_kw("OR") {
                LogicalOp::Or
            } else if self.consume_kw("XOR") {
                LogicalOp::Xor
            } else {
                break;
            };
            let location = lhs.location;
            let rhs = self.parse_and();
            lhs = Expr::new(
                ExprKind::Logical { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                location,
            );
        }
        lhs
    }

    fn parse_and(&mut self) -> Expr {
        let mut lhs = self.parse_not();
        while self.consume_kw("AND") {
            let location = lhs.location;
            let rhs = self.parse_not();
            lhs = Expr::new(
                ExprKind::Logical { op: LogicalOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                location,
            );
        }
        lhs
    }

    fn parse_not(&mut self) -> Expr {
        if self.check_kw("NOT") {
            let location = self.loc();
            self.advance();
            let operand = self.parse_not();
            return Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) }, location);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Expr {
        let lhs = self.parse_additive();
        if let Some(op) = self.peek_compare_op() {
            self.consume_compare_op();
            let location = lhs.location;
            let rhs = self.parse_additive();
            return Expr::new(
                ExprKind::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                location,
            );
        }
        lhs
    }

    fn peek_compare_op(&self) -> Option<CompareOp> {
        match self.peek().lexeme.as_str() {
            "=" if matches!(self.peek().kind, TokenKind::Operator) => Some(CompareOp::Eq),
            "<>" => Some(CompareOp::Ne),
            "<=" => Some(CompareOp::Le),
            ">=" => Some(CompareOp::Ge),
            "<" => Some(CompareOp::Lt),
            ">" => Some(CompareOp::Gt),
            _ => None,
        }
    }

    fn consume_compare_op(&mut self) {
        self.advance();
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_term();
        loop {
            let op = if self.consume_op("+") {
                BinOp::Add
            } else if self.consume_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            let location = lhs.location;
            let rhs = self.parse_term();
            lhs = Expr::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, location);
        }
        lhs
    }

    fn parse_term(&mut self) -> Expr {
        let mut lhs = self.parse_unary_minus();
        loop {
            let op = if self.consume_op("*") {
                BinOp::Mul
            } else if self.consume_op("/") {
                BinOp::FloatDiv
            } else if self.consume_op("\\") {
                BinOp::IntDiv
            } else if self.consume_kw("MOD") {
                BinOp::Mod
            } else {
                break;
            };
            let location = lhs.location;
            let rhs = self.parse_unary_minus();
            lhs = Expr::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, location);
        }
        lhs
    }

    fn parse_unary_minus(&mut self) -> Expr {
        if self.check_op("-") {
            let location = self.loc();
            self.advance();
            let operand = self.parse_unary_minus();
            return Expr::new(ExprKind::Unary { op: UnaryOp::Negate, operand: Box::new(operand) }, location);
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Expr {
        let base = self.parse_postfix();
        if self.consume_op("^") {
            let location = base.location;
            let exponent = self.parse_unary_minus(); // right-associative
            return Expr::new(
                ExprKind::Binary { op: BinOp::Pow, lhs: Box::new(base), rhs: Box::new(exponent) },
                location,
            );
        }
        base
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            if self.consume_punct(".") {
                let location = expr.location;
                let field = self.expect_identifier();
                if self.check_punct("(") {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check_punct(")") {
                        args.push(self.parse_expr());
                        while self.consume_punct(",") {
                            args.push(self.parse_expr());
                        }
                    }
                    self.expect_punct(")");
                    expr = Expr::new(
                        ExprKind::MethodCall { base: Box::new(expr), method: field, args },
                        location,
                    );
                } else {
                    expr = Expr::new(ExprKind::FieldAccess { base: Box::new(expr), field }, location);
                }
            } else {
                break;
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let location = self.loc();

        match self.peek().kind {
            TokenKind::Number(NumberKind::Integer) => {
                let tok = self.advance();
                let v: i64 = tok.lexeme.parse().unwrap_or(0);
                return Expr::new(ExprKind::IntLiteral(v), location);
            }
            TokenKind::Number(NumberKind::Float) => {
                let tok = self.advance();
                let v: f64 = tok.lexeme.parse().unwrap_or(0.0);
                return Expr::new(ExprKind::FloatLiteral(v), location);
            }
            TokenKind::StringLiteral => {
                let tok = self.advance();
                let unicode = tok.lexeme.bytes().any(|b| b > 127);
                return Expr::new(ExprKind::StringLiteral { text: tok.lexeme, unicode }, location);
            }
            _ => {}
        }

        if self.consume_kw("TRUE") {
            return Expr::new(ExprKind::BoolLiteral(true), location);
        }
        if self.consume_kw("FALSE") {
            return Expr::new(ExprKind::BoolLiteral(false), location);
        }
        if self.consume_kw("ME") {
            return Expr::new(ExprKind::Me, location);
        }
        if self.consume_punct("(") {
            let inner = self.parse_expr();
            self.expect_punct(")");
            return inner;
        }
        if self.consume_kw("IIF") {
            self.expect_punct("(");
            let cond = self.parse_expr();
            self.expect_punct(",");
            let if_true = self.parse_expr();
            self.expect_punct(",");
            let if_false = self.parse_expr();
            self.expect_punct(")");
            return Expr::new(
                ExprKind::Iif { cond: Box::new(cond), if_true: Box::new(if_true), if_false: Box::new(if_false) },
                location,
            );
        }
        if self.consume_kw("NEW") {
            let class_name = self.expect_identifier();
            let mut args = Vec::new();
            if self.consume_punct("(") {
                if !self.check_punct(")") {
                    args.push(self.parse_expr());
                    while self.consume_punct(",") {
                        args.push(self.parse_expr());
                    }
                }
                self.expect_punct(")");
            }
            return Expr::new(ExprKind::New { class_name, args }, location);
        }
        if self.consume_kw("SPAWN") {
            let routine = self.expect_identifier();
            self.expect_punct("(");
            let mut args = Vec::new();
            if !self.check_punct(")") {
                args.push(self.parse_expr());
                while self.consume_punct(",") {
                    args.push(self.parse_expr());
                }
            }
            self.expect_punct(")");
            return Expr::new(
                ExprKind::Call { name: format!("__spawn_{}", routine), symbol: None, args },
                location,
            );
        }
        if self.consume_kw("AWAIT") {
            let future = self.parse_postfix();
            return Expr::new(ExprKind::Await { future: Box::new(future) }, location);
        }
        if self.consume_kw("RECEIVE") {
            self.expect_punct("(");
            let source = self.parse_expr();
            self.expect_punct(")");
            return Expr::new(ExprKind::Receive { source: Box::new(source) }, location);
        }
        if self.consume_kw("CANCELLED") {
            self.expect_punct("(");
            let source = self.parse_expr();
            self.expect_punct(")");
            return Expr::new(ExprKind::Cancelled { source: Box::new(source) }, location);
        }

        if matches!(self.peek().kind, TokenKind::Identifier) || self.peek_is_function_keyword() {
            let name = self.expect_identifier_or_keyword_text();
            if self.consume_punct("(") {
                // Could be a string-slice read `s$(a TO b)` — handled as
                // an expression-level slice when `TO` appears.
                let first = if self.check_kw("TO") { None } else { Some(self.parse_expr()) };
                if self.consume_kw("TO") {
                    let end = if self.check_punct(")") { None } else { Some(Box::new(self.parse_expr())) };
                    self.expect_punct(")");
                    let base = Expr::new(ExprKind::Variable { name, symbol: None }, location);
                    return Expr::new(
                        ExprKind::StringSlice { base: Box::new(base), start: first.map(Box::new), end },
                        location,
                    );
                }
                let mut args = Vec::new();
                if let Some(f) = first {
                    args.push(f);
                }
                while self.consume_punct(",") {
                    args.push(self.parse_expr());
                }
                self.expect_punct(")");
                if crate::builtins::is_intrinsic(&name) {
                    return Expr::new(ExprKind::Call { name, symbol: None, args }, location);
                }
                // Ambiguous between array indexing and a routine call;
                // semantic analysis resolves which based on the symbol
                // table entry kind.
                return Expr::new(ExprKind::ArrayElement { name, symbol: None, indices: args }, location);
            }
            if self.consume_kw("IS") {
                if self.consume_kw("NOTHING") {
                    let base = Expr::new(ExprKind::Variable { name, symbol: None }, location);
                    return Expr::new(ExprKind::IsNothing { value: Box::new(base) }, location);
                }
            }
            return Expr::new(ExprKind::Variable { name, symbol: None }, location);
        }

        let tok = self.advance();
        self.diagnostics
            .error(location, format!("expected expression, found '{}'", tok.lexeme));
        Expr::new(ExprKind::IntLiteral(0), location)
    }

    fn peek_is_function_keyword(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Keyword(k) if crate::builtins::is_intrinsic(k))
    }

    // ---- small helpers -----------------------------------------------------

    fn expect_identifier(&mut self) -> String {
        if matches!(self.peek().kind, TokenKind::Identifier) {
            self.advance().lexeme
        } else if matches!(self.peek().kind, TokenKind::Keyword(_)) {
            // BASIC dialects routinely let certain keywords double as
            // names (e.g. a routine named the same as an intrinsic);
            // spec §4.1 calls for resolving this with lookahead, which
            // the caller has already done by reaching here.
            self.advance().lexeme
        } else {
            let loc = self.loc();
            self.diagnostics
                .error(loc, format!("expected identifier, found '{}'", self.peek().lexeme));
            "".to_string()
        }
    }

    fn expect_identifier_or_keyword_text(&mut self) -> String {
        self.advance().lexeme
    }

    fn last_sigil(&self) -> Option<char> {
        self.tokens.get(self.pos.wrapping_sub(1)).and_then(|t| t.sigil)
    }

    fn expect_op_eq(&mut self) {
        if !self.consume_op("=") {
            let loc = self.loc();
            self.diagnostics.error(loc, "expected '='");
        }
    }
}

pub fn parse(tokens: &[Token], file: FileId) -> (Program, DiagnosticBag) {
    Parser::new(tokens, file).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> (Program, DiagnosticBag) {
        let (tokens, _) = tokenize(src, FileId::FIRST);
        parse(&tokens, FileId::FIRST)
    }

    #[test]
    fn parses_line_numbered_and_structured_forms_in_one_file() {
        let (program, diags) = parse_src("10 PRINT \"X\"\nIF 1 THEN PRINT 2\n");
        assert!(diags.is_empty());
        assert_eq!(program.lines.len(), 2);
        assert_eq!(program.lines[0].label, Some(10));
        assert_eq!(program.lines[1].label, None);
    }

    #[test]
    fn parses_multiline_if_else() {
        let (program, diags) = parse_src("IF X THEN\nPRINT 1\nELSE\nPRINT 2\nEND IF\n");
        assert!(diags.is_empty());
        match &program.lines[0].statements[0] {
            Statement::If { else_body, .. } => assert!(else_body.is_some()),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn parses_for_with_negative_step() {
        let (program, diags) = parse_src("FOR I = 10 TO 1 STEP -1\nPRINT I\nNEXT I\n");
        assert!(diags.is_empty());
        match &program.lines[0].statements[0] {
            Statement::For { step, .. } => assert!(step.is_some()),
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn parses_do_loop_pre_and_post_test() {
        let (p1, d1) = parse_src("DO WHILE X < 5\nX = X + 1\nLOOP\n");
        assert!(d1.is_empty());
        match &p1.lines[0].statements[0] {
            Statement::Do { test: DoTest::PreWhile, .. } => {}
            other => panic!("expected pre-while do, got {:?}", other),
        }

        let (p2, d2) = parse_src("DO\nX = X + 1\nLOOP UNTIL X >= 5\n");
        assert!(d2.is_empty());
        match &p2.lines[0].statements[0] {
            Statement::Do { test: DoTest::PostUntil, .. } => {}
            other => panic!("expected post-until do, got {:?}", other),
        }
    }

    #[test]
    fn parses_select_case_with_range_and_comparison() {
        let src = "SELECT CASE X\nCASE 1, 2\nPRINT 1\nCASE 3 TO 5\nPRINT 2\nCASE IS > 10\nPRINT 3\nCASE ELSE\nPRINT 4\nEND SELECT\n";
        let (program, diags) = parse_src(src);
        assert!(diags.is_empty());
        match &program.lines[0].statements[0] {
            Statement::SelectCase { arms, else_body, .. } => {
                assert_eq!(arms.len(), 3);
                assert!(else_body.is_some());
            }
            other => panic!("expected select case, got {:?}", other),
        }
    }

    #[test]
    fn parses_string_slice_read_and_assignment() {
        let (program, diags) = parse_src("X$ = S$(2 TO 4)\nS$(1 TO 3) = \"abc\"\n");
        assert!(diags.is_empty());
        match &program.lines[0].statements[0] {
            Statement::Let { value, .. } => match &value.kind {
                ExprKind::StringSlice { .. } => {}
                other => panic!("expected string slice expr, got {:?}", other),
            },
            other => panic!("expected let, got {:?}", other),
        }
        match &program.lines[1].statements[0] {
            Statement::SliceAssign { .. } => {}
            other => panic!("expected slice assign, got {:?}", other),
        }
    }

    #[test]
    fn parses_udt_definition_and_field_chain() {
        let src = "TYPE INNER\nV AS INTEGER\nEND TYPE\nTYPE OUTER\nI AS INNER\nEND TYPE\nDIM A AS OUTER\nA.I.V = 1\n";
        let (program, diags) = parse_src(src);
        assert!(diags.is_empty());
        assert_eq!(program.lines.len(), 5);
    }

    #[test]
    fn parses_try_catch_finally() {
        let src = "TRY\nTHROW 42\nCATCH 42\nPRINT ERR\nFINALLY\nPRINT 0\nEND TRY\n";
        let (program, diags) = parse_src(src);
        assert!(diags.is_empty());
        match &program.lines[0].statements[0] {
            Statement::Try { catches, finally, .. } => {
                assert_eq!(catches.len(), 1);
                assert_eq!(catches[0].code, Some(42));
                assert!(finally.is_some());
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn parses_worker_spawn_await_send_receive() {
        let src = "WORKER W() AS DOUBLE\nRETURN 7\nEND WORKER\nDIM F AS DOUBLE\nF = AWAIT SPAWN W()\n";
        let (program, diags) = parse_src(src);
        assert!(diags.is_empty());
        assert_eq!(program.lines.len(), 3);
    }

    #[test]
    fn recovers_after_a_syntax_error_and_keeps_parsing_next_statement() {
        let (program, diags) = parse_src("X = (\nPRINT 1\n");
        assert!(diags.has_errors());
        assert_eq!(program.lines.len(), 2);
    }

    #[test]
    fn operator_precedence_matches_spec() {
        // 2 + 3 * 4 should parse as 2 + (3 * 4), not (2+3) * 4.
        let (program, _) = parse_src("PRINT 2 + 3 * 4\n");
        match &program.lines[0].statements[0] {
            Statement::Print { items, .. } => match &items[0].expr.kind {
                ExprKind::Binary { op: BinOp::Add, rhs, .. } => match &rhs.kind {
                    ExprKind::Binary { op: BinOp::Mul, .. } => {}
                    other => panic!("expected nested multiply, got {:?}", other),
                },
                other => panic!("expected top-level add, got {:?}", other),
            },
            other => panic!("expected print, got {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_unary_minus() {
        let (program, _) = parse_src("PRINT -2 ^ 2\n");
        match &program.lines[0].statements[0] {
            Statement::Print { items, .. } => match &items[0].expr.kind {
                ExprKind::Unary { op: UnaryOp::Negate, operand } => match &operand.kind {
                    ExprKind::Binary { op: BinOp::Pow, .. } => {}
                    other => panic!("expected power under negate, got {:?}", other),
                },
                other => panic!("expected unary negate at top, got {:?}", other),
            },
            other => panic!("expected print, got {:?}", other),
        }
    }
}
