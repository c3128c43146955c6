//! Semantic analysis (spec §4.3): scope and symbol-table construction,
//! identifier/member resolution, expression type annotation with
//! coercion insertion, `DATA`/`RESTORE` point computation, and the
//! control-flow constraint checks that don't require the CFG itself
//! (`EXIT FOR` outside a loop, `GOSUB` across a routine boundary, …).

pub mod data_segment;
pub mod typecheck;

pub use data_segment::DataSegment;

use crate::ast::*;
use crate::symtab::{RoutineSymbol, SymbolTable, TypeSymbol};
use crate::types::TypeDescriptor;
use fbasic_core::diagnostics::DiagnosticBag;

pub struct AnalysisResult {
    pub table: SymbolTable,
    pub diagnostics: DiagnosticBag,
    pub data: DataSegment,
}

pub fn analyze(program: &mut Program) -> AnalysisResult {
    let mut table = SymbolTable::new();
    let mut diags = DiagnosticBag::new();
    let data = DataSegment::build(program);

    // Pass 1: hoist every TYPE/CLASS/routine declaration so forward
    // references (a SUB calling a FUNCTION defined later in the file)
    // resolve correctly.
    for line in program.lines.iter() {
        for stmt in &line.statements {
            hoist(stmt, &mut table, &mut diags);
        }
    }

    // Pass 2: resolve and type-check every statement body.
    let mut loop_depth: Vec<LoopKind> = Vec::new();
    for line in program.lines.iter_mut() {
        for stmt in line.statements.iter_mut() {
            analyze_statement(stmt, &mut table, &mut diags, &mut loop_depth, false);
        }
    }

    AnalysisResult { table, diagnostics: diags, data }
}

fn hoist(stmt: &Statement, table: &mut SymbolTable, diags: &mut DiagnosticBag) {
    match stmt {
        Statement::DefType { def } => {
            let fields = def.fields.iter().map(|f| (f.name.clone(), f.ty.clone())).collect();
            if let Err(e) = table.declare_type(TypeSymbol { name: def.name.clone(), fields, is_class: false }) {
                diags.error(def.location, e);
            }
        }
        Statement::DefClass { def } => {
            let fields = def.fields.iter().map(|f| (f.name.clone(), f.ty.clone())).collect();
            if let Err(e) = table.declare_type(TypeSymbol { name: def.name.clone(), fields, is_class: true }) {
                diags.error(def.location, e);
            }
        }
        Statement::DefRoutine { def } | Statement::Worker { def } => {
            let id = table.fresh_id();
            let params = def.params.iter().map(|p| (p.name.clone(), p.ty.clone(), p.mode)).collect();
            let sym = RoutineSymbol {
                id,
                name: def.name.clone(),
                kind: def.kind,
                params,
                return_ty: def.return_ty.clone().unwrap_or(TypeDescriptor::Void),
                declared_at: def.location,
            };
            if let Err(e) = table.declare_routine(sym) {
                diags.error(def.location, e);
            }
        }
        _ => {}
    }
}

fn analyze_statement(
    stmt: &mut Statement,
    table: &mut SymbolTable,
    diags: &mut DiagnosticBag,
    loop_depth: &mut Vec<LoopKind>,
    in_routine: bool,
) {
    match stmt {
        Statement::Let { target, value, .. } => {
            typecheck::infer(value, table, diags);
            let target_ty = typecheck::resolve_lvalue(target, table, diags);
            if target_ty != TypeDescriptor::Unknown
                && value.ty != TypeDescriptor::Unknown
                && !target_ty.assignable_from(&value.ty)
            {
                diags.error(value.location, format!("cannot assign {} to {}", value.ty, target_ty));
            }
        }
        Statement::SliceAssign { target, start, end, value, .. } => {
            typecheck::resolve_lvalue(target, table, diags);
            if let Some(s) = start {
                typecheck::infer(s, table, diags);
            }
            if let Some(e) = end {
                typecheck::infer(e, table, diags);
            }
            typecheck::infer(value, table, diags);
        }
        Statement::Print { items, .. } => {
            for item in items.iter_mut() {
                typecheck::infer(&mut item.expr, table, diags);
            }
        }
        Statement::Input { targets, .. } => {
            for t in targets.iter_mut() {
                typecheck::resolve_lvalue(t, table, diags);
            }
        }
        Statement::If { cond, then_body, elseifs, else_body, .. } => {
            typecheck::infer(cond, table, diags);
            analyze_block(then_body, table, diags, loop_depth, in_routine);
            for (c, body) in elseifs.iter_mut() {
                typecheck::infer(c, table, diags);
                analyze_block(body, table, diags, loop_depth, in_routine);
            }
            if let Some(body) = else_body {
                analyze_block(body, table, diags, loop_depth, in_routine);
            }
        }
        Statement::For { var, var_symbol, from, to, step, body, location } => {
            typecheck::infer(from, table, diags);
            typecheck::infer(to, table, diags);
            if let Some(s) = step {
                typecheck::infer(s, table, diags);
            }
            let ty = table
                .lookup_variable(var)
                .map(|s| s.ty.clone())
                .unwrap_or(TypeDescriptor::Integer32);
            let id = table.declare_variable(var, ty, false, 0, *location);
            *var_symbol = Some(id);
            loop_depth.push(LoopKind::For);
            analyze_block(body, table, diags, loop_depth, in_routine);
            loop_depth.pop();
        }
        Statement::While { cond, body, .. } => {
            typecheck::infer(cond, table, diags);
            loop_depth.push(LoopKind::While);
            analyze_block(body, table, diags, loop_depth, in_routine);
            loop_depth.pop();
        }
        Statement::Do { cond, body, .. } => {
            if let Some(c) = cond {
                typecheck::infer(c, table, diags);
            }
            loop_depth.push(LoopKind::Do);
            analyze_block(body, table, diags, loop_depth, in_routine);
            loop_depth.pop();
        }
        Statement::Repeat { body, until_cond, .. } => {
            loop_depth.push(LoopKind::Repeat);
            analyze_block(body, table, diags, loop_depth, in_routine);
            loop_depth.pop();
            typecheck::infer(until_cond, table, diags);
        }
        Statement::SelectCase { scrutinee, arms, else_body, .. } => {
            typecheck::infer(scrutinee, table, diags);
            for arm in arms.iter_mut() {
                for m in arm.matches.iter_mut() {
                    match m {
                        CaseMatch::Values(vs) => {
                            for v in vs.iter_mut() {
                                typecheck::infer(v, table, diags);
                            }
                        }
                        CaseMatch::Range(lo, hi) => {
                            typecheck::infer(lo, table, diags);
                            typecheck::infer(hi, table, diags);
                        }
                        CaseMatch::Comparison(_, v) => typecheck::infer(v, table, diags),
                    }
                }
                analyze_block(&mut arm.body, table, diags, loop_depth, in_routine);
            }
            if let Some(body) = else_body {
                analyze_block(body, table, diags, loop_depth, in_routine);
            }
        }
        Statement::Try { body, catches, finally, .. } => {
            analyze_block(body, table, diags, loop_depth, in_routine);
            for c in catches.iter_mut() {
                analyze_block(&mut c.body, table, diags, loop_depth, in_routine);
            }
            if let Some(body) = finally {
                analyze_block(body, table, diags, loop_depth, in_routine);
            }
        }
        Statement::Throw { code, .. } => typecheck::infer(code, table, diags),
        Statement::Call { name, symbol, args, location } => {
            for a in args.iter_mut() {
                typecheck::infer(a, table, diags);
            }
            if !crate::builtins::is_intrinsic(name) {
                match table.lookup_routine(name) {
                    Some(r) => *symbol = Some(r.id),
                    None => diags.error(*location, format!("call to undeclared routine '{}'", name)),
                }
            }
        }
        Statement::Dim { name, ty, array_bounds, initializer, location } => {
            for (lo, hi) in array_bounds.iter_mut() {
                typecheck::infer(lo, table, diags);
                typecheck::infer(hi, table, diags);
            }
            if let Some(init) = initializer {
                typecheck::infer(init, table, diags);
            }
            table.declare_variable(name, ty.clone(), !array_bounds.is_empty(), array_bounds.len() as u32, *location);
        }
        Statement::Redim { array_bounds, .. } => {
            for (lo, hi) in array_bounds.iter_mut() {
                typecheck::infer(lo, table, diags);
                typecheck::infer(hi, table, diags);
            }
        }
        Statement::Read { targets, .. } => {
            for t in targets.iter_mut() {
                typecheck::resolve_lvalue(t, table, diags);
            }
        }
        Statement::DefRoutine { def } | Statement::Worker { def } => {
            table.enter_routine_scope();
            for p in def.params.iter() {
                table.declare_variable(&p.name, p.ty.clone(), false, 0, def.location);
            }
            analyze_block(&mut def.body, table, diags, &mut Vec::new(), true);
            table.exit_routine_scope();
        }
        Statement::DefClass { def } => {
            table.enter_routine_scope();
            for m in def.methods.iter_mut() {
                table.enter_routine_scope();
                for p in m.params.iter() {
                    table.declare_variable(&p.name, p.ty.clone(), false, 0, def.location);
                }
                analyze_block(&mut m.body, table, diags, &mut Vec::new(), true);
                table.exit_routine_scope();
            }
            table.exit_routine_scope();
        }
        Statement::Spawn { target, args, .. } => {
            typecheck::resolve_lvalue(target, table, diags);
            for a in args.iter_mut() {
                typecheck::infer(a, table, diags);
            }
        }
        Statement::Send { target, value, .. } => {
            typecheck::infer(target, table, diags);
            typecheck::infer(value, table, diags);
        }
        Statement::MatchReceive { source, arms, else_body, .. } => {
            typecheck::infer(source, table, diags);
            for arm in arms.iter_mut() {
                analyze_block(&mut arm.body, table, diags, loop_depth, in_routine);
            }
            if let Some(body) = else_body {
                analyze_block(body, table, diags, loop_depth, in_routine);
            }
        }
        Statement::AfterMsSend { delay_ms, target, value, .. } => {
            typecheck::infer(delay_ms, table, diags);
            typecheck::infer(target, table, diags);
            typecheck::infer(value, table, diags);
        }
        Statement::EveryMsSend { interval_ms, target, value, .. } => {
            typecheck::infer(interval_ms, table, diags);
            typecheck::infer(target, table, diags);
            typecheck::infer(value, table, diags);
        }
        Statement::Cancel { target, .. } => typecheck::infer(target, table, diags),
        Statement::DeleteObject { target, .. } => {
            typecheck::resolve_lvalue(target, table, diags);
        }
        Statement::Terminal { args, .. } => {
            for a in args.iter_mut() {
                typecheck::infer(a, table, diags);
            }
        }
        Statement::ExitLoop { kind, location } => {
            if !loop_depth.contains(kind) {
                diags.error(*location, "EXIT used outside of the matching loop");
            }
        }
        Statement::ExitRoutine { location } => {
            if !in_routine {
                diags.error(*location, "EXIT FUNCTION/SUB used outside a routine body");
            }
        }
        Statement::Gosub { location, .. } | Statement::OnGoto { location, .. } => {
            if in_routine {
                diags.error(*location, "GOSUB/ON...GOSUB may not target a line inside a routine body");
            }
        }
        Statement::Goto { .. }
        | Statement::OnErrorGoto { .. }
        | Statement::Resume { .. }
        | Statement::Return { .. }
        | Statement::End { .. }
        | Statement::StopStmt { .. }
        | Statement::Erase { .. }
        | Statement::Data { .. }
        | Statement::Restore { .. }
        | Statement::Option { .. }
        | Statement::TimerStopAll { .. } => {}
    }
}

fn analyze_block(
    body: &mut [Statement],
    table: &mut SymbolTable,
    diags: &mut DiagnosticBag,
    loop_depth: &mut Vec<LoopKind>,
    in_routine: bool,
) {
    for stmt in body.iter_mut() {
        analyze_statement(stmt, table, diags, loop_depth, in_routine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use fbasic_core::source_map::FileId;

    fn analyze_src(src: &str) -> AnalysisResult {
        let (tokens, _) = tokenize(src, FileId::FIRST);
        let (mut program, _) = parse(&tokens, FileId::FIRST);
        analyze(&mut program)
    }

    #[test]
    fn assigning_an_int_literal_to_a_declared_double_is_allowed() {
        let result = analyze_src("DIM X AS DOUBLE\nX = 5\n");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn exit_for_outside_a_loop_is_an_error() {
        let result = analyze_src("EXIT FOR\n");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn calling_a_function_declared_later_in_the_file_resolves() {
        let result = analyze_src("X = ADDONE(1)\nFUNCTION ADDONE(N)\nRETURN N + 1\nEND FUNCTION\n");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn gosub_is_rejected_inside_a_routine_body() {
        let result = analyze_src("SUB S()\nGOSUB 100\nEND SUB\n");
        assert!(result.diagnostics.has_errors());
    }
}
