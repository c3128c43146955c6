//! AST node data model (spec §3, §4.2).
//!
//! A flat, tagged-variant tree: statements and expressions are enums over
//! a closed set of shapes rather than a class hierarchy, so a visitor can
//! dispatch on the tag instead of on dynamic type. Symbol references are
//! resolved by semantic analysis into a [`SymbolId`] stored alongside the
//! syntactic name, rather than by a pointer back into a symbol table.

use crate::types::TypeDescriptor;
use fbasic_core::span::SourceLocation;

/// Index into the routine-local or global symbol table, assigned during
/// semantic analysis. `None` before resolution.
pub type SymbolId = Option<u32>;

#[derive(Debug, Clone)]
pub struct Program {
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub label: Option<u32>,
    pub statements: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByRef {
    ByValue,
    ByReference,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeDescriptor,
    pub mode: ByRef,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_ty: Option<TypeDescriptor>,
    pub body: Vec<Statement>,
    pub is_constructor: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub methods: Vec<MethodDef>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct RoutineDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_ty: Option<TypeDescriptor>,
    pub body: Vec<Statement>,
    pub kind: RoutineKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Sub,
    Function,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintSeparator {
    /// Statement ended with no trailing separator: emit a newline.
    Newline,
    /// `;`: concatenate without separator, no trailing newline.
    Semicolon,
    /// `,`: advance to the next tab column, no trailing newline.
    Comma,
}

#[derive(Debug, Clone)]
pub struct PrintItem {
    pub expr: Expr,
    pub trailing: PrintSeparator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoTest {
    PreWhile,
    PreUntil,
    PostWhile,
    PostUntil,
    None,
}

#[derive(Debug, Clone)]
pub struct CaseArm {
    pub matches: Vec<CaseMatch>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum CaseMatch {
    Values(Vec<Expr>),
    Range(Expr, Expr),
    Comparison(CompareOp, Expr),
}

#[derive(Debug, Clone)]
pub struct CatchArm {
    pub code: Option<i64>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub type_name: Option<String>,
    pub bind_name: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
    Do,
    Repeat,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let {
        target: LValue,
        value: Expr,
        location: SourceLocation,
    },
    Print {
        items: Vec<PrintItem>,
        location: SourceLocation,
    },
    Input {
        prompt: Option<String>,
        targets: Vec<LValue>,
        line_mode: bool,
        location: SourceLocation,
    },
    If {
        cond: Expr,
        then_body: Vec<Statement>,
        elseifs: Vec<(Expr, Vec<Statement>)>,
        else_body: Option<Vec<Statement>>,
        location: SourceLocation,
    },
    For {
        var: String,
        var_symbol: SymbolId,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Vec<Statement>,
        location: SourceLocation,
    },
    While {
        cond: Expr,
        body: Vec<Statement>,
        location: SourceLocation,
    },
    Do {
        test: DoTest,
        cond: Option<Expr>,
        body: Vec<Statement>,
        location: SourceLocation,
    },
    Repeat {
        body: Vec<Statement>,
        until_cond: Expr,
        location: SourceLocation,
    },
    SelectCase {
        scrutinee: Expr,
        arms: Vec<CaseArm>,
        else_body: Option<Vec<Statement>>,
        location: SourceLocation,
    },
    Goto {
        target: u32,
        location: SourceLocation,
    },
    Gosub {
        target: u32,
        location: SourceLocation,
    },
    OnErrorGoto {
        target: Option<u32>,
        location: SourceLocation,
    },
    OnGoto {
        selector: Expr,
        targets: Vec<u32>,
        is_gosub: bool,
        location: SourceLocation,
    },
    Resume {
        next: bool,
        location: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },
    ExitLoop {
        kind: LoopKind,
        location: SourceLocation,
    },
    ExitRoutine {
        location: SourceLocation,
    },
    Call {
        name: String,
        symbol: SymbolId,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    End {
        location: SourceLocation,
    },
    StopStmt {
        location: SourceLocation,
    },
    Dim {
        name: String,
        ty: TypeDescriptor,
        array_bounds: Vec<(Expr, Expr)>,
        initializer: Option<Expr>,
        location: SourceLocation,
    },
    Redim {
        name: String,
        array_bounds: Vec<(Expr, Expr)>,
        preserve: bool,
        location: SourceLocation,
    },
    Erase {
        name: String,
        location: SourceLocation,
    },
    Data {
        values: Vec<DataLiteral>,
        location: SourceLocation,
    },
    Read {
        targets: Vec<LValue>,
        location: SourceLocation,
    },
    Restore {
        target: Option<RestoreTarget>,
        location: SourceLocation,
    },
    Option {
        name: String,
        value: Option<String>,
        location: SourceLocation,
    },
    DefType {
        def: TypeDef,
    },
    DefClass {
        def: ClassDef,
    },
    DefRoutine {
        def: RoutineDef,
    },
    Try {
        body: Vec<Statement>,
        catches: Vec<CatchArm>,
        finally: Option<Vec<Statement>>,
        location: SourceLocation,
    },
    Throw {
        code: Expr,
        location: SourceLocation,
    },
    SliceAssign {
        target: LValue,
        start: Option<Expr>,
        end: Option<Expr>,
        value: Expr,
        location: SourceLocation,
    },
    Worker {
        def: RoutineDef,
    },
    Spawn {
        target: LValue,
        routine: String,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    Send {
        target: Expr,
        value: Expr,
        location: SourceLocation,
    },
    MatchReceive {
        source: Expr,
        arms: Vec<MatchArm>,
        else_body: Option<Vec<Statement>>,
        location: SourceLocation,
    },
    AfterMsSend {
        delay_ms: Expr,
        target: Expr,
        value: Expr,
        location: SourceLocation,
    },
    EveryMsSend {
        interval_ms: Expr,
        target: Expr,
        value: Expr,
        location: SourceLocation,
    },
    TimerStopAll {
        location: SourceLocation,
    },
    Cancel {
        target: Expr,
        location: SourceLocation,
    },
    DeleteObject {
        target: LValue,
        location: SourceLocation,
    },
    Terminal {
        op: TerminalOp,
        args: Vec<Expr>,
        location: SourceLocation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOp {
    Cls,
    Locate,
    Color,
    CursorSave,
    CursorHide,
    CursorShow,
    StyleBold,
    StyleUnderline,
    StyleNormal,
    ScreenAlternate,
}

#[derive(Debug, Clone)]
pub enum RestoreTarget {
    Line(u32),
    Label(String),
}

#[derive(Debug, Clone)]
pub enum DataLiteral {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone)]
pub enum LValue {
    Variable {
        name: String,
        symbol: SymbolId,
    },
    ArrayElement {
        name: String,
        symbol: SymbolId,
        indices: Vec<Expr>,
    },
    Field {
        base: Box<LValue>,
        field: String,
    },
    StringSlice {
        name: String,
        symbol: SymbolId,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    FloatDiv,
    IntDiv,
    Mod,
    Pow,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeDescriptor,
    pub location: SourceLocation,
}

impl Expr {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Expr { kind, ty: TypeDescriptor::Unknown, location }
    }

    pub fn with_type(kind: ExprKind, ty: TypeDescriptor, location: SourceLocation) -> Self {
        Expr { kind, ty, location }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral { text: String, unicode: bool },
    BoolLiteral(bool),
    Variable {
        name: String,
        symbol: SymbolId,
    },
    ArrayElement {
        name: String,
        symbol: SymbolId,
        indices: Vec<Expr>,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
    Call {
        name: String,
        symbol: SymbolId,
        args: Vec<Expr>,
    },
    MethodCall {
        base: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    StringSlice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Iif {
        cond: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    New {
        class_name: String,
        args: Vec<Expr>,
    },
    Me,
    IsNothing {
        value: Box<Expr>,
    },
    Await {
        future: Box<Expr>,
    },
    Receive {
        source: Box<Expr>,
    },
    Cancelled {
        source: Box<Expr>,
    },
    Convert {
        target: TypeDescriptor,
        operand: Box<Expr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbasic_core::source_map::FileId;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId::FIRST, 0, 0)
    }

    #[test]
    fn expr_new_defaults_to_unknown_type() {
        let e = Expr::new(ExprKind::IntLiteral(1), loc());
        assert_eq!(e.ty, TypeDescriptor::Unknown);
    }

    #[test]
    fn lvalue_field_chain_nests_base() {
        let base = LValue::Variable { name: "A".to_string(), symbol: None };
        let chained = LValue::Field { base: Box::new(base), field: "X".to_string() };
        match chained {
            LValue::Field { field, .. } => assert_eq!(field, "X"),
            _ => panic!("expected field lvalue"),
        }
    }
}
