//! Read-only text dumps for the `-A` (AST), `-G` (CFG), and `-S` (symbol
//! table) driver flags (spec §6). These walk existing structures; they
//! don't compute anything the rest of the pipeline doesn't already have.

use std::fmt::Write as _;

use crate::ast::{Expr, ExprKind, LValue, Line, Program, Statement};
use crate::cfg::{BasicBlock, CfgBuilder, Terminator};
use crate::symtab::SymbolTable;

/// Indented one-statement-per-line AST dump, the way a recursive-descent
/// compiler's own `-A` flag usually renders its tree: structure through
/// indentation, not a generic `Debug` blob.
pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    for line in &program.lines {
        print_line(&mut out, line, 0);
    }
    out
}

fn print_line(out: &mut String, line: &Line, indent: usize) {
    if let Some(label) = line.label {
        writeln!(out, "{}{}:", pad(indent), label).unwrap();
    }
    for stmt in &line.statements {
        print_statement(out, stmt, indent);
    }
}

fn pad(indent: usize) -> String {
    "  ".repeat(indent)
}

fn print_block(out: &mut String, body: &[Statement], indent: usize) {
    for stmt in body {
        print_statement(out, stmt, indent);
    }
}

fn print_statement(out: &mut String, stmt: &Statement, indent: usize) {
    let p = pad(indent);
    match stmt {
        Statement::Let { target, value, .. } => {
            writeln!(out, "{}LET {} = {}", p, lvalue_text(target), expr_text(value)).unwrap();
        }
        Statement::Print { items, .. } => {
            let parts: Vec<String> = items.iter().map(|i| expr_text(&i.expr)).collect();
            writeln!(out, "{}PRINT {}", p, parts.join(", ")).unwrap();
        }
        Statement::Input { targets, .. } => {
            let parts: Vec<String> = targets.iter().map(lvalue_text).collect();
            writeln!(out, "{}INPUT {}", p, parts.join(", ")).unwrap();
        }
        Statement::If { cond, then_body, elseifs, else_body, .. } => {
            writeln!(out, "{}IF {}", p, expr_text(cond)).unwrap();
            print_block(out, then_body, indent + 1);
            for (c, body) in elseifs {
                writeln!(out, "{}ELSEIF {}", p, expr_text(c)).unwrap();
                print_block(out, body, indent + 1);
            }
            if let Some(body) = else_body {
                writeln!(out, "{}ELSE", p).unwrap();
                print_block(out, body, indent + 1);
            }
        }
        Statement::For { var, from, to, step, body, .. } => {
            let step_text = step.as_ref().map(|s| format!(" STEP {}", expr_text(s))).unwrap_or_default();
            writeln!(out, "{}FOR {} = {} TO {}{}", p, var, expr_text(from), expr_text(to), step_text).unwrap();
            print_block(out, body, indent + 1);
        }
        Statement::While { cond, body, .. } => {
            writeln!(out, "{}WHILE {}", p, expr_text(cond)).unwrap();
            print_block(out, body, indent + 1);
        }
        Statement::Do { body, .. } => {
            writeln!(out, "{}DO", p).unwrap();
            print_block(out, body, indent + 1);
        }
        Statement::Repeat { body, until_cond, .. } => {
            writeln!(out, "{}REPEAT", p).unwrap();
            print_block(out, body, indent + 1);
            writeln!(out, "{}UNTIL {}", p, expr_text(until_cond)).unwrap();
        }
        Statement::SelectCase { scrutinee, arms, else_body, .. } => {
            writeln!(out, "{}SELECT CASE {}", p, expr_text(scrutinee)).unwrap();
            for arm in arms {
                writeln!(out, "{}CASE", p).unwrap();
                print_block(out, &arm.body, indent + 1);
            }
            if let Some(body) = else_body {
                writeln!(out, "{}CASE ELSE", p).unwrap();
                print_block(out, body, indent + 1);
            }
        }
        Statement::Try { body, catches, finally, .. } => {
            writeln!(out, "{}TRY", p).unwrap();
            print_block(out, body, indent + 1);
            for catch in catches {
                writeln!(out, "{}CATCH {:?}", p, catch.code).unwrap();
                print_block(out, &catch.body, indent + 1);
            }
            if let Some(body) = finally {
                writeln!(out, "{}FINALLY", p).unwrap();
                print_block(out, body, indent + 1);
            }
        }
        Statement::DefRoutine { def } | Statement::Worker { def } => {
            let params: Vec<String> = def.params.iter().map(|param| param.name.clone()).collect();
            writeln!(out, "{}{:?} {}({})", p, def.kind, def.name, params.join(", ")).unwrap();
            print_block(out, &def.body, indent + 1);
        }
        Statement::Goto { target, .. } => writeln!(out, "{}GOTO {}", p, target).unwrap(),
        Statement::Gosub { target, .. } => writeln!(out, "{}GOSUB {}", p, target).unwrap(),
        Statement::Return { value, .. } => {
            writeln!(out, "{}RETURN{}", p, value.as_ref().map(|v| format!(" {}", expr_text(v))).unwrap_or_default())
                .unwrap();
        }
        Statement::Call { name, args, .. } => {
            let parts: Vec<String> = args.iter().map(expr_text).collect();
            writeln!(out, "{}CALL {}({})", p, name, parts.join(", ")).unwrap();
        }
        Statement::Dim { name, ty, .. } => writeln!(out, "{}DIM {} AS {}", p, name, ty).unwrap(),
        other => writeln!(out, "{}{}", p, statement_tag(other)).unwrap(),
    }
}

/// Falls back to the variant name alone for statements whose shape doesn't
/// carry anything more useful to print (pure control transfers, bookkeeping
/// statements with no expression tree of their own).
fn statement_tag(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::OnErrorGoto { .. } => "ON ERROR GOTO",
        Statement::OnGoto { .. } => "ON ... GOTO",
        Statement::Resume { .. } => "RESUME",
        Statement::ExitLoop { .. } => "EXIT",
        Statement::ExitRoutine { .. } => "EXIT ROUTINE",
        Statement::End { .. } => "END",
        Statement::StopStmt { .. } => "STOP",
        Statement::Redim { .. } => "REDIM",
        Statement::Erase { .. } => "ERASE",
        Statement::Data { .. } => "DATA",
        Statement::Read { .. } => "READ",
        Statement::Restore { .. } => "RESTORE",
        Statement::Option { .. } => "OPTION",
        Statement::DefType { .. } => "TYPE",
        Statement::DefClass { .. } => "CLASS",
        Statement::Throw { .. } => "THROW",
        Statement::SliceAssign { .. } => "SLICE-ASSIGN",
        Statement::Spawn { .. } => "SPAWN",
        Statement::Send { .. } => "SEND",
        Statement::MatchReceive { .. } => "MATCH RECEIVE",
        Statement::AfterMsSend { .. } => "AFTER",
        Statement::EveryMsSend { .. } => "EVERY",
        Statement::TimerStopAll { .. } => "TIMERSTOPALL",
        Statement::Cancel { .. } => "CANCEL",
        Statement::DeleteObject { .. } => "DELETE",
        Statement::Terminal { .. } => "TERMINAL",
        _ => "?",
    }
}

fn lvalue_text(lv: &LValue) -> String {
    match lv {
        LValue::Variable { name, .. } => name.clone(),
        LValue::ArrayElement { name, indices, .. } => {
            let parts: Vec<String> = indices.iter().map(expr_text).collect();
            format!("{}({})", name, parts.join(", "))
        }
        LValue::Field { base, field } => format!("{}.{}", lvalue_text(base), field),
        LValue::StringSlice { name, start, end, .. } => {
            let s = start.as_ref().map(|e| expr_text(e)).unwrap_or_default();
            let e = end.as_ref().map(|e| expr_text(e)).unwrap_or_default();
            format!("{}({} TO {})", name, s, e)
        }
    }
}

fn expr_text(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::IntLiteral(n) => n.to_string(),
        ExprKind::FloatLiteral(x) => x.to_string(),
        ExprKind::StringLiteral { text, .. } => format!("\"{}\"", text),
        ExprKind::BoolLiteral(b) => b.to_string(),
        ExprKind::Variable { name, .. } => name.clone(),
        ExprKind::ArrayElement { name, indices, .. } => {
            let parts: Vec<String> = indices.iter().map(expr_text).collect();
            format!("{}({})", name, parts.join(", "))
        }
        ExprKind::FieldAccess { base, field } => format!("{}.{}", expr_text(base), field),
        ExprKind::Call { name, args, .. } => {
            let parts: Vec<String> = args.iter().map(expr_text).collect();
            format!("{}({})", name, parts.join(", "))
        }
        ExprKind::MethodCall { base, method, args } => {
            let parts: Vec<String> = args.iter().map(expr_text).collect();
            format!("{}.{}({})", expr_text(base), method, parts.join(", "))
        }
        ExprKind::Unary { op, operand } => format!("{:?} {}", op, expr_text(operand)),
        ExprKind::Binary { op, lhs, rhs } => format!("({} {:?} {})", expr_text(lhs), op, expr_text(rhs)),
        ExprKind::Compare { op, lhs, rhs } => format!("({} {:?} {})", expr_text(lhs), op, expr_text(rhs)),
        ExprKind::Logical { op, lhs, rhs } => format!("({} {:?} {})", expr_text(lhs), op, expr_text(rhs)),
        ExprKind::StringSlice { base, .. } => format!("{}(...)", expr_text(base)),
        ExprKind::Iif { cond, if_true, if_false } => {
            format!("IIF({}, {}, {})", expr_text(cond), expr_text(if_true), expr_text(if_false))
        }
        ExprKind::New { class_name, args } => {
            let parts: Vec<String> = args.iter().map(expr_text).collect();
            format!("NEW {}({})", class_name, parts.join(", "))
        }
        ExprKind::Me => "ME".to_string(),
        ExprKind::IsNothing { value } => format!("ISNOTHING({})", expr_text(value)),
        ExprKind::Await { future } => format!("AWAIT {}", expr_text(future)),
        ExprKind::Receive { source } => format!("RECEIVE {}", expr_text(source)),
        ExprKind::Cancelled { source } => format!("CANCELLED({})", expr_text(source)),
        ExprKind::Convert { target, operand } => format!("CONVERT<{}>({})", target, expr_text(operand)),
    }
}

/// Graphviz `dot` text for one or more routine CFGs (`-G`), one digraph per
/// routine so a caller can paste a single routine's output through `dot`
/// without editing the file.
pub fn print_cfgs_dot(cfgs: &[(String, CfgBuilder)]) -> String {
    let mut out = String::new();
    for (name, builder) in cfgs {
        writeln!(out, "digraph \"{}\" {{", name).unwrap();
        for block in &builder.blocks {
            print_block_dot(&mut out, block);
        }
        writeln!(out, "}}").unwrap();
    }
    out
}

fn print_block_dot(out: &mut String, block: &BasicBlock) {
    writeln!(out, "  bb{} [label=\"bb{} ({} stmt)\"];", block.id, block.id, block.statements.len()).unwrap();
    match &block.terminator {
        Terminator::Jump(target) => {
            writeln!(out, "  bb{} -> bb{};", block.id, target).unwrap();
        }
        Terminator::Branch { then_block, else_block, .. } => {
            writeln!(out, "  bb{} -> bb{} [label=\"true\"];", block.id, then_block).unwrap();
            writeln!(out, "  bb{} -> bb{} [label=\"false\"];", block.id, else_block).unwrap();
        }
        Terminator::Return(_) | Terminator::Halt | Terminator::Unset => {}
    }
}

/// Flat text dump of declared routines, types, and in-scope variables
/// (`-S`). Variables are listed innermost-scope-first, matching lookup
/// order.
pub fn print_symbols(table: &SymbolTable) -> String {
    let mut out = String::new();
    writeln!(out, "routines:").unwrap();
    for routine in table.routines_iter() {
        let params: Vec<String> = routine.params.iter().map(|(n, ty, _)| format!("{}: {}", n, ty)).collect();
        writeln!(out, "  {:?} {}({}) -> {}", routine.kind, routine.name, params.join(", "), routine.return_ty).unwrap();
    }
    writeln!(out, "types:").unwrap();
    for ty in table.types_iter() {
        writeln!(out, "  {} {}", if ty.is_class { "CLASS" } else { "TYPE" }, ty.name).unwrap();
    }
    writeln!(out, "variables:").unwrap();
    for var in table.variables_in_scope() {
        writeln!(out, "  {} #{}: {}{}", var.name, var.id, var.ty, if var.is_array { " (array)" } else { "" }).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::sema::analyze;
    use fbasic_core::source_map::FileId;

    #[test]
    fn ast_dump_renders_a_for_loop_header() {
        let (tokens, _) = tokenize("FOR I = 1 TO 10\nPRINT I\nNEXT I\n", FileId::FIRST);
        let (program, _) = parse(&tokens, FileId::FIRST);
        let text = print_program(&program);
        assert!(text.contains("FOR I = 1 TO 10"));
        assert!(text.contains("PRINT I"));
    }

    #[test]
    fn symbol_dump_lists_a_declared_variable() {
        let (tokens, _) = tokenize("X = 5\n", FileId::FIRST);
        let (mut program, _) = parse(&tokens, FileId::FIRST);
        let analysis = analyze(&mut program);
        let text = print_symbols(&analysis.table);
        assert!(text.contains("X #"));
    }

    #[test]
    fn cfg_dot_dump_wraps_each_routine_in_its_own_digraph() {
        let (tokens, _) = tokenize("IF 1 THEN\nPRINT 1\nEND IF\n", FileId::FIRST);
        let (program, _) = parse(&tokens, FileId::FIRST);
        let cfgs = crate::codegen::build_all_cfgs(&program);
        let text = print_cfgs_dot(&cfgs);
        assert!(text.starts_with("digraph \"main\" {"));
        assert!(text.contains("->"));
    }
}
