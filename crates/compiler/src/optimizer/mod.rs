//! AST optimizer (spec §4.4): constant folding, constant propagation,
//! algebraic identities, strength reduction, dead-branch elimination,
//! dead-loop-body elimination, `IIF` simplification, and string-function
//! folding, iterated to a fixed point (or a capped number of rounds).
//!
//! Each pass reports whether it changed anything; the driver loop in
//! [`optimize`] keeps iterating fold -> propagate -> identities/strength
//! -> dead-branch -> string-folds until a round changes nothing, or the
//! configured iteration cap is hit.

use crate::ast::*;
use std::collections::HashMap;

pub fn optimize(program: &mut Program, max_iterations: u32) {
    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for line in program.lines.iter_mut() {
            for stmt in line.statements.iter_mut() {
                changed |= optimize_statement(stmt);
            }
        }
        if !changed {
            break;
        }
    }
}

fn optimize_block(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    let mut propagated: HashMap<String, Expr> = HashMap::new();
    for stmt in body.iter_mut() {
        changed |= substitute_statement(stmt, &propagated);
        changed |= optimize_statement(stmt);
        track_propagation(stmt, &mut propagated);
    }
    changed |= eliminate_dead_branches(body);
    changed
}

/// Constant propagation: replaces reads of a variable with its last
/// known constant value within the same straight-line block. Anything
/// that isn't a simple `Let` with a literal RHS invalidates the binding
/// (see [`track_propagation`]), so this never crosses a reassignment.
fn substitute_statement(stmt: &mut Statement, propagated: &HashMap<String, Expr>) -> bool {
    let mut changed = false;
    match stmt {
        Statement::Let { value, .. } => changed |= substitute_expr(value, propagated),
        Statement::Print { items, .. } => {
            for item in items.iter_mut() {
                changed |= substitute_expr(&mut item.expr, propagated);
            }
        }
        Statement::If { cond, .. } => changed |= substitute_expr(cond, propagated),
        Statement::While { cond, .. } => changed |= substitute_expr(cond, propagated),
        Statement::Call { args, .. } => {
            for a in args.iter_mut() {
                changed |= substitute_expr(a, propagated);
            }
        }
        _ => {}
    }
    changed
}

fn substitute_expr(expr: &mut Expr, propagated: &HashMap<String, Expr>) -> bool {
    if let ExprKind::Variable { name, .. } = &expr.kind {
        if let Some(value) = propagated.get(name) {
            expr.kind = value.kind.clone();
            return true;
        }
    }
    let mut changed = false;
    match &mut expr.kind {
        ExprKind::Unary { operand, .. } => changed |= substitute_expr(operand, propagated),
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } | ExprKind::Logical { lhs, rhs, .. } => {
            changed |= substitute_expr(lhs, propagated);
            changed |= substitute_expr(rhs, propagated);
        }
        ExprKind::Call { args, .. } | ExprKind::MethodCall { args, .. } => {
            for a in args.iter_mut() {
                changed |= substitute_expr(a, propagated);
            }
        }
        ExprKind::ArrayElement { indices, .. } => {
            for i in indices.iter_mut() {
                changed |= substitute_expr(i, propagated);
            }
        }
        ExprKind::Iif { cond, if_true, if_false } => {
            changed |= substitute_expr(cond, propagated);
            changed |= substitute_expr(if_true, propagated);
            changed |= substitute_expr(if_false, propagated);
        }
        _ => {}
    }
    changed
}

fn optimize_statement(stmt: &mut Statement) -> bool {
    let mut changed = false;
    match stmt {
        Statement::Let { value, .. } => changed |= fold_expr(value),
        Statement::Print { items, .. } => {
            for item in items.iter_mut() {
                changed |= fold_expr(&mut item.expr);
            }
        }
        Statement::If { cond, then_body, elseifs, else_body, .. } => {
            changed |= fold_expr(cond);
            changed |= optimize_block(then_body);
            for (c, body) in elseifs.iter_mut() {
                changed |= fold_expr(c);
                changed |= optimize_block(body);
            }
            if let Some(body) = else_body {
                changed |= optimize_block(body);
            }
        }
        Statement::For { from, to, step, body, .. } => {
            changed |= fold_expr(from);
            changed |= fold_expr(to);
            if let Some(s) = step {
                changed |= fold_expr(s);
            }
            changed |= optimize_block(body);
            changed |= eliminate_dead_loop(body, from, to);
        }
        Statement::While { cond, body, .. } => {
            changed |= fold_expr(cond);
            changed |= optimize_block(body);
            if is_false_literal(cond) {
                body.clear();
                changed = true;
            }
        }
        Statement::Do { cond, body, .. } => {
            if let Some(c) = cond {
                changed |= fold_expr(c);
            }
            changed |= optimize_block(body);
        }
        Statement::Repeat { body, until_cond, .. } => {
            changed |= optimize_block(body);
            changed |= fold_expr(until_cond);
        }
        Statement::SelectCase { scrutinee, arms, else_body, .. } => {
            changed |= fold_expr(scrutinee);
            for arm in arms.iter_mut() {
                changed |= optimize_block(&mut arm.body);
            }
            if let Some(body) = else_body {
                changed |= optimize_block(body);
            }
        }
        Statement::Try { body, catches, finally, .. } => {
            changed |= optimize_block(body);
            for c in catches.iter_mut() {
                changed |= optimize_block(&mut c.body);
            }
            if let Some(body) = finally {
                changed |= optimize_block(body);
            }
        }
        Statement::Call { args, .. } => {
            for a in args.iter_mut() {
                changed |= fold_expr(a);
            }
        }
        Statement::Dim { initializer: Some(e), .. } => changed |= fold_expr(e),
        Statement::DefRoutine { def } | Statement::Worker { def } => {
            changed |= optimize_block(&mut def.body);
        }
        Statement::DefClass { def } => {
            for m in def.methods.iter_mut() {
                changed |= optimize_block(&mut m.body);
            }
        }
        Statement::Throw { code, .. } => changed |= fold_expr(code),
        _ => {}
    }
    changed
}

fn is_false_literal(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::BoolLiteral(false) | ExprKind::IntLiteral(0))
}

fn is_true_literal(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::BoolLiteral(true))
        || matches!(expr.kind, ExprKind::IntLiteral(n) if n != 0)
}

/// Dead-branch elimination for `IF`-chains whose condition already folded
/// to a literal: an always-false `THEN` arm (with no remaining ELSEIFs) or
/// an always-true `IF` collapses to its live body in place.
fn eliminate_dead_branches(body: &mut [Statement]) -> bool {
    let mut changed = false;
    for stmt in body.iter_mut() {
        if let Statement::If { cond, then_body, elseifs, else_body, .. } = stmt {
            if elseifs.is_empty() {
                if is_true_literal(cond) {
                    *else_body = None;
                    changed = true;
                } else if is_false_literal(cond) {
                    then_body.clear();
                    changed = true;
                }
            }
        }
    }
    changed
}

/// Removes a `FOR` body when the loop bounds fold to a range that never
/// executes (e.g. `FOR I = 5 TO 1` with the default positive step).
fn eliminate_dead_loop(body: &mut Vec<Statement>, from: &Expr, to: &Expr) -> bool {
    if let (ExprKind::IntLiteral(lo), ExprKind::IntLiteral(hi)) = (&from.kind, &to.kind) {
        if lo > hi && !body.is_empty() {
            body.clear();
            return true;
        }
    }
    false
}

fn track_propagation(stmt: &Statement, propagated: &mut HashMap<String, Expr>) {
    if let Statement::Let { target: LValue::Variable { name, .. }, value, .. } = stmt {
        if is_constant(value) {
            propagated.insert(name.clone(), value.clone());
        } else {
            propagated.remove(name);
        }
    }
}

fn is_constant(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::IntLiteral(_) | ExprKind::FloatLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::StringLiteral { .. }
    )
}

/// Folds constant subexpressions, applies algebraic identities and
/// strength reductions, and simplifies `IIF` with a constant condition.
/// Returns whether anything changed.
fn fold_expr(expr: &mut Expr) -> bool {
    let mut changed = false;
    match &mut expr.kind {
        ExprKind::Unary { op, operand } => {
            changed |= fold_expr(operand);
            if let (UnaryOp::Negate, ExprKind::IntLiteral(n)) = (*op, &operand.kind) {
                expr.kind = ExprKind::IntLiteral(-n);
                changed = true;
            } else if let (UnaryOp::Negate, ExprKind::FloatLiteral(n)) = (*op, &operand.kind) {
                expr.kind = ExprKind::FloatLiteral(-n);
                changed = true;
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            changed |= fold_expr(lhs);
            changed |= fold_expr(rhs);
            if let Some(folded) = fold_binary(*op, lhs, rhs) {
                expr.kind = folded;
                changed = true;
            } else if apply_identity(*op, lhs, rhs, &mut expr.kind) {
                changed = true;
            }
        }
        ExprKind::Compare { lhs, rhs, .. } => {
            changed |= fold_expr(lhs);
            changed |= fold_expr(rhs);
        }
        ExprKind::Logical { lhs, rhs, .. } => {
            changed |= fold_expr(lhs);
            changed |= fold_expr(rhs);
        }
        ExprKind::Iif { cond, if_true, if_false } => {
            changed |= fold_expr(cond);
            changed |= fold_expr(if_true);
            changed |= fold_expr(if_false);
            if is_true_literal(cond) {
                expr.kind = if_true.kind.clone();
                changed = true;
            } else if is_false_literal(cond) {
                expr.kind = if_false.kind.clone();
                changed = true;
            }
        }
        ExprKind::Call { name, args, .. } => {
            for a in args.iter_mut() {
                changed |= fold_expr(a);
            }
            if let Some(folded) = fold_string_call(name, args) {
                expr.kind = folded;
                changed = true;
            }
        }
        ExprKind::ArrayElement { indices, .. } => {
            for i in indices.iter_mut() {
                changed |= fold_expr(i);
            }
        }
        ExprKind::FieldAccess { base, .. } => changed |= fold_expr(base),
        ExprKind::MethodCall { base, args, .. } => {
            changed |= fold_expr(base);
            for a in args.iter_mut() {
                changed |= fold_expr(a);
            }
        }
        ExprKind::Convert { operand, .. } => changed |= fold_expr(operand),
        ExprKind::StringSlice { base, start, end } => {
            changed |= fold_expr(base);
            if let Some(s) = start {
                changed |= fold_expr(s);
            }
            if let Some(e) = end {
                changed |= fold_expr(e);
            }
        }
        _ => {}
    }
    changed
}

fn fold_binary(op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<ExprKind> {
    use ExprKind::{FloatLiteral, IntLiteral};
    match (&lhs.kind, &rhs.kind) {
        (IntLiteral(a), IntLiteral(b)) => match op {
            BinOp::Add => Some(IntLiteral(a + b)),
            BinOp::Sub => Some(IntLiteral(a - b)),
            BinOp::Mul => Some(IntLiteral(a * b)),
            BinOp::IntDiv if *b != 0 => Some(IntLiteral(a / b)),
            BinOp::Mod if *b != 0 => Some(IntLiteral(a % b)),
            BinOp::FloatDiv if *b != 0 => Some(FloatLiteral(*a as f64 / *b as f64)),
            BinOp::Pow => Some(IntLiteral(a.pow((*b).max(0) as u32))),
            _ => None,
        },
        (FloatLiteral(a), FloatLiteral(b)) => match op {
            BinOp::Add => Some(FloatLiteral(a + b)),
            BinOp::Sub => Some(FloatLiteral(a - b)),
            BinOp::Mul => Some(FloatLiteral(a * b)),
            BinOp::FloatDiv if *b != 0.0 => Some(FloatLiteral(a / b)),
            BinOp::Pow => Some(FloatLiteral(a.powf(*b))),
            _ => None,
        },
        _ => None,
    }
}

/// Algebraic identities and strength reductions that apply even when one
/// side isn't a literal constant everywhere (`x + 0`, `x * 1`, `x * 2` ->
/// `x + x`, `x / 2` folded only when `x` is constant is handled above;
/// here we handle the non-constant-operand identities).
fn apply_identity(op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut ExprKind) -> bool {
    match op {
        BinOp::Add if is_zero(rhs) => {
            *out = lhs.kind.clone();
            true
        }
        BinOp::Add if is_zero(lhs) => {
            *out = rhs.kind.clone();
            true
        }
        BinOp::Sub if is_zero(rhs) => {
            *out = lhs.kind.clone();
            true
        }
        BinOp::Mul if is_one(rhs) => {
            *out = lhs.kind.clone();
            true
        }
        BinOp::Mul if is_one(lhs) => {
            *out = rhs.kind.clone();
            true
        }
        BinOp::Mul if is_zero(rhs) || is_zero(lhs) => {
            *out = ExprKind::IntLiteral(0);
            true
        }
        BinOp::Mul if is_two(rhs) => {
            *out = ExprKind::Binary { op: BinOp::Add, lhs: Box::new(lhs.clone()), rhs: Box::new(lhs.clone()) };
            true
        }
        _ => false,
    }
}

fn is_zero(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::IntLiteral(0)) || matches!(e.kind, ExprKind::FloatLiteral(f) if f == 0.0)
}

fn is_one(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::IntLiteral(1)) || matches!(e.kind, ExprKind::FloatLiteral(f) if f == 1.0)
}

fn is_two(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::IntLiteral(2))
}

/// Folds a handful of string intrinsics when every argument is a literal
/// (spec §4.4's "string-function folding" pass).
fn fold_string_call(name: &str, args: &[Expr]) -> Option<ExprKind> {
    let upper = name.to_ascii_uppercase();
    let text = |e: &Expr| match &e.kind {
        ExprKind::StringLiteral { text, .. } => Some(text.clone()),
        _ => None,
    };
    match upper.as_str() {
        "LEN" => {
            let s = text(args.first()?)?;
            Some(ExprKind::IntLiteral(s.chars().count() as i64))
        }
        "UCASE$" => Some(ExprKind::StringLiteral { text: text(args.first()?)?.to_uppercase(), unicode: false }),
        "LCASE$" => Some(ExprKind::StringLiteral { text: text(args.first()?)?.to_lowercase(), unicode: false }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use fbasic_core::source_map::FileId;

    fn optimize_src(src: &str, iterations: u32) -> Program {
        let (tokens, _) = tokenize(src, FileId::FIRST);
        let (mut program, _) = parse(&tokens, FileId::FIRST);
        optimize(&mut program, iterations);
        program
    }

    fn first_value(program: &Program) -> &ExprKind {
        match &program.lines[0].statements[0] {
            Statement::Let { value, .. } => &value.kind,
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn folds_constant_arithmetic() {
        let program = optimize_src("X = 2 + 3 * 4\n", 4);
        assert!(matches!(first_value(&program), ExprKind::IntLiteral(14)));
    }

    #[test]
    fn applies_additive_identity() {
        let program = optimize_src("X = Y + 0\n", 4);
        assert!(matches!(first_value(&program), ExprKind::Variable { .. }));
    }

    #[test]
    fn strength_reduces_multiply_by_two_into_addition() {
        let program = optimize_src("X = Y * 2\n", 4);
        assert!(matches!(first_value(&program), ExprKind::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn simplifies_iif_with_constant_condition() {
        let program = optimize_src("X = IIF(1, 10, 20)\n", 4);
        assert!(matches!(first_value(&program), ExprKind::IntLiteral(10)));
    }

    #[test]
    fn eliminates_a_dead_if_branch() {
        let program = optimize_src("IF 0 THEN\nPRINT 1\nEND IF\n", 4);
        match &program.lines[0].statements[0] {
            Statement::If { then_body, .. } => assert!(then_body.is_empty()),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn folds_len_of_a_string_literal() {
        let program = optimize_src("X = LEN(\"hello\")\n", 4);
        assert!(matches!(first_value(&program), ExprKind::IntLiteral(5)));
    }

    #[test]
    fn optimization_reaches_a_fixed_point_and_further_rounds_are_idempotent() {
        let once = optimize_src("X = 2 + 3 * 4\n", 1);
        let mut twice = once.clone();
        optimize(&mut twice, 4);
        match (first_value(&once), first_value(&twice)) {
            (ExprKind::IntLiteral(a), ExprKind::IntLiteral(b)) => assert_eq!(a, b),
            other => panic!("expected both folded, got {:?}", other),
        }
    }
}
