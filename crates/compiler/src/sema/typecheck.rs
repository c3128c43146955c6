//! Expression type annotation and coercion insertion (spec §3, §4.3).
//!
//! Walks an expression bottom-up, stamping [`Expr::ty`] and wrapping
//! operands of mixed-numeric or mixed-string-flavor binary operations in
//! an explicit [`ExprKind::Convert`] node so code generation never has to
//! re-derive a coercion rule the analyzer already decided.

use crate::ast::{BinOp, CompareOp, Expr, ExprKind, LValue, LogicalOp, UnaryOp};
use crate::symtab::SymbolTable;
use crate::types::TypeDescriptor;
use fbasic_core::diagnostics::DiagnosticBag;

/// Wraps `expr` in a `Convert` node targeting `ty`, unless it is already
/// exactly that type.
fn coerce(expr: Expr, ty: TypeDescriptor) -> Expr {
    if expr.ty == ty {
        return expr;
    }
    let location = expr.location;
    Expr::with_type(
        ExprKind::Convert { target: ty.clone(), operand: Box::new(expr) },
        ty,
        location,
    )
}

pub fn resolve_lvalue(lvalue: &mut LValue, table: &mut SymbolTable, diags: &mut DiagnosticBag) -> TypeDescriptor {
    match lvalue {
        LValue::Variable { name, symbol } => match table.lookup_variable(name) {
            Some(sym) => {
                *symbol = Some(sym.id);
                sym.ty.clone()
            }
            None => {
                let sigil = name.chars().last().filter(|c| "%!#$".contains(*c));
                let ty = sigil
                    .and_then(crate::types::type_for_sigil)
                    .unwrap_or(TypeDescriptor::Integer32);
                let id = table.declare_variable(name, ty.clone(), false, 0, default_loc());
                *symbol = Some(id);
                ty
            }
        },
        LValue::ArrayElement { name, symbol, indices } => {
            for idx in indices.iter_mut() {
                infer(idx, table, diags);
            }
            match table.lookup_variable(name) {
                Some(sym) => {
                    *symbol = Some(sym.id);
                    sym.ty.clone()
                }
                None => {
                    diags.error(default_loc(), format!("array '{}' is not declared", name));
                    TypeDescriptor::Unknown
                }
            }
        }
        LValue::Field { base, field } => {
            let base_ty = resolve_lvalue(base, table, diags);
            match base_ty {
                TypeDescriptor::Udt(name) | TypeDescriptor::Class(name) => {
                    match table.lookup_type(&name) {
                        Some(def) => def
                            .fields
                            .iter()
                            .find(|(fname, _)| fname == field)
                            .map(|(_, fty)| fty.clone())
                            .unwrap_or(TypeDescriptor::Unknown),
                        None => TypeDescriptor::Unknown,
                    }
                }
                _ => TypeDescriptor::Unknown,
            }
        }
        LValue::StringSlice { name, symbol, start, end } => {
            if let Some(s) = start {
                infer(s, table, diags);
            }
            if let Some(e) = end {
                infer(e, table, diags);
            }
            match table.lookup_variable(name) {
                Some(sym) => {
                    *symbol = Some(sym.id);
                    sym.ty.clone()
                }
                None => TypeDescriptor::String { unicode: false },
            }
        }
    }
}

fn default_loc() -> fbasic_core::span::SourceLocation {
    fbasic_core::span::SourceLocation::new(fbasic_core::source_map::FileId::FIRST, 0, 0)
}

/// Infers and stamps the type of `expr`, recursing into subexpressions
/// and inserting coercions where spec §3's promotion table calls for one.
pub fn infer(expr: &mut Expr, table: &mut SymbolTable, diags: &mut DiagnosticBag) {
    let location = expr.location;
    expr.ty = match &mut expr.kind {
        ExprKind::IntLiteral(_) => TypeDescriptor::Integer32,
        ExprKind::FloatLiteral(_) => TypeDescriptor::Double,
        ExprKind::StringLiteral { unicode, .. } => TypeDescriptor::String { unicode: *unicode },
        ExprKind::BoolLiteral(_) => TypeDescriptor::Boolean,
        ExprKind::Me => TypeDescriptor::Unknown,
        ExprKind::Variable { name, symbol } => match table.lookup_variable(name) {
            Some(sym) => {
                *symbol = Some(sym.id);
                sym.ty.clone()
            }
            None => {
                let sigil = name.chars().last().filter(|c| "%!#$".contains(*c));
                let ty = sigil
                    .and_then(crate::types::type_for_sigil)
                    .unwrap_or(TypeDescriptor::Integer32);
                diags.warning(location, format!("implicit declaration of '{}'", name));
                let id = table.declare_variable(name, ty.clone(), false, 0, location);
                *symbol = Some(id);
                ty
            }
        },
        ExprKind::ArrayElement { name, symbol, indices } => {
            for idx in indices.iter_mut() {
                infer(idx, table, diags);
            }
            match table.lookup_variable(name) {
                Some(sym) => {
                    *symbol = Some(sym.id);
                    sym.ty.clone()
                }
                None => match table.lookup_routine(name) {
                    Some(routine) => {
                        *symbol = Some(routine.id);
                        routine.return_ty.clone()
                    }
                    None => {
                        diags.error(location, format!("'{}' is neither an array nor a routine", name));
                        TypeDescriptor::Unknown
                    }
                },
            }
        }
        ExprKind::FieldAccess { base, field } => {
            infer(base, table, diags);
            match &base.ty {
                TypeDescriptor::Udt(name) | TypeDescriptor::Class(name) => table
                    .lookup_type(name)
                    .and_then(|def| def.fields.iter().find(|(f, _)| f == field))
                    .map(|(_, t)| t.clone())
                    .unwrap_or(TypeDescriptor::Unknown),
                _ => {
                    diags.error(location, format!("'{}' is not a field of a known type", field));
                    TypeDescriptor::Unknown
                }
            }
        }
        ExprKind::Call { name, symbol, args } => {
            for a in args.iter_mut() {
                infer(a, table, diags);
            }
            if crate::builtins::is_intrinsic(name) {
                intrinsic_return_type(name, args)
            } else {
                match table.lookup_routine(name) {
                    Some(routine) => {
                        *symbol = Some(routine.id);
                        routine.return_ty.clone()
                    }
                    None => {
                        diags.error(location, format!("call to undeclared routine '{}'", name));
                        TypeDescriptor::Unknown
                    }
                }
            }
        }
        ExprKind::MethodCall { base, args, .. } => {
            infer(base, table, diags);
            for a in args.iter_mut() {
                infer(a, table, diags);
            }
            TypeDescriptor::Unknown
        }
        ExprKind::Unary { op, operand } => {
            infer(operand, table, diags);
            match op {
                UnaryOp::Negate => operand.ty.clone(),
                UnaryOp::Not => TypeDescriptor::Boolean,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            infer(lhs, table, diags);
            infer(rhs, table, diags);
            annotate_binary(*op, lhs, rhs, location, diags)
        }
        ExprKind::Compare { lhs, rhs, .. } => {
            infer(lhs, table, diags);
            infer(rhs, table, diags);
            if lhs.ty.is_numeric() && rhs.ty.is_numeric() && lhs.ty != rhs.ty {
                let target = TypeDescriptor::promote(&lhs.ty, &rhs.ty);
                replace_in_place(lhs, |e| coerce(e, target.clone()));
                replace_in_place(rhs, |e| coerce(e, target.clone()));
            }
            TypeDescriptor::Boolean
        }
        ExprKind::Logical { op: LogicalOp::And | LogicalOp::Or | LogicalOp::Xor, lhs, rhs } => {
            infer(lhs, table, diags);
            infer(rhs, table, diags);
            TypeDescriptor::Boolean
        }
        ExprKind::StringSlice { base, start, end } => {
            infer(base, table, diags);
            if let Some(s) = start {
                infer(s, table, diags);
            }
            if let Some(e) = end {
                infer(e, table, diags);
            }
            TypeDescriptor::String { unicode: false }
        }
        ExprKind::Iif { cond, if_true, if_false } => {
            infer(cond, table, diags);
            infer(if_true, table, diags);
            infer(if_false, table, diags);
            if if_true.ty.is_numeric() && if_false.ty.is_numeric() {
                TypeDescriptor::promote(&if_true.ty, &if_false.ty)
            } else {
                if_true.ty.clone()
            }
        }
        ExprKind::New { class_name, args } => {
            for a in args.iter_mut() {
                infer(a, table, diags);
            }
            TypeDescriptor::Class(class_name.clone())
        }
        ExprKind::IsNothing { value } => {
            infer(value, table, diags);
            TypeDescriptor::Boolean
        }
        ExprKind::Await { future } => {
            infer(future, table, diags);
            future.ty.clone()
        }
        ExprKind::Receive { source } => {
            infer(source, table, diags);
            TypeDescriptor::Unknown
        }
        ExprKind::Cancelled { source } => {
            infer(source, table, diags);
            TypeDescriptor::Boolean
        }
        ExprKind::Convert { target, operand } => {
            infer(operand, table, diags);
            target.clone()
        }
    };
}

fn annotate_binary(
    op: BinOp,
    lhs: &mut Expr,
    rhs: &mut Expr,
    location: fbasic_core::span::SourceLocation,
    diags: &mut DiagnosticBag,
) -> TypeDescriptor {
    if op == BinOp::Concat || (op == BinOp::Add && lhs.ty.is_string() && rhs.ty.is_string()) {
        return TypeDescriptor::promote_string(&lhs.ty, &rhs.ty).unwrap_or(TypeDescriptor::String { unicode: false });
    }
    if !lhs.ty.is_numeric() || !rhs.ty.is_numeric() {
        diags.error(location, "arithmetic operator applied to a non-numeric operand");
        return TypeDescriptor::Unknown;
    }
    match op {
        BinOp::IntDiv | BinOp::Mod => TypeDescriptor::Integer32,
        BinOp::FloatDiv => TypeDescriptor::Double,
        BinOp::Pow => TypeDescriptor::Double,
        _ => {
            let target = TypeDescriptor::promote(&lhs.ty, &rhs.ty);
            replace_in_place(lhs, |e| coerce(e, target.clone()));
            replace_in_place(rhs, |e| coerce(e, target.clone()));
            target
        }
    }
}

/// Replaces `*slot` with `f(old_value)`, used to wrap a boxed subexpression
/// in a coercion node in place without fighting the borrow checker over a
/// `Box<Expr>` field.
fn replace_in_place(slot: &mut Box<Expr>, f: impl FnOnce(Expr) -> Expr) {
    let placeholder = Expr::new(ExprKind::IntLiteral(0), slot.location);
    let old = std::mem::replace(slot.as_mut(), placeholder);
    *slot.as_mut() = f(old);
}

fn intrinsic_return_type(name: &str, args: &[Expr]) -> TypeDescriptor {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "LEN" | "INSTR" | "ASC" => TypeDescriptor::Integer32,
        "LEFT$" | "RIGHT$" | "MID$" | "UCASE$" | "LCASE$" | "TRIM$" | "LTRIM$" | "RTRIM$" | "STR$"
        | "CHR$" | "SPACE$" | "STRING$" => TypeDescriptor::String { unicode: false },
        "VAL" => TypeDescriptor::Double,
        "INT" | "FIX" | "CINT" | "SGN" => TypeDescriptor::Integer32,
        "CLNG" => TypeDescriptor::Long64,
        "CSNG" => TypeDescriptor::Single,
        "CDBL" | "SQR" | "SIN" | "COS" | "TAN" | "ATN" | "LOG" | "EXP" | "RND" => TypeDescriptor::Double,
        "ABS" => args.first().map(|a| a.ty.clone()).unwrap_or(TypeDescriptor::Double),
        _ => TypeDescriptor::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;
    use fbasic_core::source_map::FileId;
    use fbasic_core::span::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId::FIRST, 0, 0)
    }

    #[test]
    fn mixed_int_and_float_addition_promotes_and_wraps_the_int_side() {
        let mut table = SymbolTable::new();
        let mut diags = DiagnosticBag::new();
        let mut expr = Expr::new(
            ExprKind::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::new(ExprKind::IntLiteral(1), loc())),
                rhs: Box::new(Expr::new(ExprKind::FloatLiteral(2.5), loc())),
            },
            loc(),
        );
        infer(&mut expr, &mut table, &mut diags);
        assert_eq!(expr.ty, TypeDescriptor::Double);
        if let ExprKind::Binary { lhs, .. } = &expr.kind {
            assert!(matches!(lhs.kind, ExprKind::Convert { .. }));
        } else {
            panic!("expected binary");
        }
    }

    #[test]
    fn undeclared_variable_is_implicitly_declared_by_its_sigil() {
        let mut table = SymbolTable::new();
        let mut diags = DiagnosticBag::new();
        let mut expr = Expr::new(ExprKind::Variable { name: "X$".to_string(), symbol: None }, loc());
        infer(&mut expr, &mut table, &mut diags);
        assert_eq!(expr.ty, TypeDescriptor::String { unicode: false });
        assert!(diags.len() >= 1);
    }

    #[test]
    fn integer_division_always_yields_integer_even_with_float_operands() {
        let mut table = SymbolTable::new();
        let mut diags = DiagnosticBag::new();
        let mut expr = Expr::new(
            ExprKind::Binary {
                op: BinOp::IntDiv,
                lhs: Box::new(Expr::new(ExprKind::FloatLiteral(7.0), loc())),
                rhs: Box::new(Expr::new(ExprKind::FloatLiteral(2.0), loc())),
            },
            loc(),
        );
        infer(&mut expr, &mut table, &mut diags);
        assert_eq!(expr.ty, TypeDescriptor::Integer32);
    }
}
