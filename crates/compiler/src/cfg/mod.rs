//! Control-flow graph builder (spec §4.5).
//!
//! Walks a routine body (or the top-level program, treated as one
//! implicit routine) and lowers it into basic blocks linked by typed
//! edges. The one historically fragile case: a loop nested inside an
//! `IF`/`SELECT CASE`/`TRY`/`FINALLY` body must have its blocks fully
//! contained within that branch's subgraph, not dropped into the
//! branch's own entry block — each `build_*` helper here returns the
//! block the caller should continue appending to specifically so nested
//! constructs splice in rather than flatten.

use crate::ast::*;
use std::collections::HashMap;

pub type BlockId = usize;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<LinearStmt>,
    pub terminator: Terminator,
}

/// A statement that carries no nested control flow of its own, after the
/// CFG builder has peeled the structured forms away into block edges.
#[derive(Debug, Clone)]
pub enum LinearStmt {
    Let { target: LValue, value: Expr },
    Print { items: Vec<PrintItem> },
    Input { prompt: Option<String>, targets: Vec<LValue>, line_mode: bool },
    Call { name: String, symbol: SymbolId, args: Vec<Expr> },
    Dim { name: String, ty: crate::types::TypeDescriptor, array_bounds: Vec<(Expr, Expr)>, initializer: Option<Expr> },
    Redim { name: String, array_bounds: Vec<(Expr, Expr)>, preserve: bool },
    Erase { name: String },
    Data { values: Vec<DataLiteral> },
    Read { targets: Vec<LValue> },
    Restore { target: Option<RestoreTarget> },
    SliceAssign { target: LValue, start: Option<Expr>, end: Option<Expr>, value: Expr },
    Throw { code: Expr },
    Spawn { target: LValue, routine: String, args: Vec<Expr> },
    Send { target: Expr, value: Expr },
    Cancel { target: Expr },
    DeleteObject { target: LValue },
    Terminal { op: TerminalOp, args: Vec<Expr> },
    Nop,
}

#[derive(Debug, Clone)]
pub enum Terminator {
    /// Falls through unconditionally to the named block.
    Jump(BlockId),
    /// Branches to `then_block` if `cond` is true, else `else_block`.
    Branch { cond: Expr, then_block: BlockId, else_block: BlockId },
    /// Function/worker exit, with an optional return value.
    Return(Option<Expr>),
    /// Program exit (`END`/`STOP`).
    Halt,
    /// Placeholder for a block still under construction.
    Unset,
}

pub struct CfgBuilder {
    pub blocks: Vec<BasicBlock>,
    /// BASIC line-number label -> the block that begins at that label,
    /// for `GOTO`/`GOSUB`/`ON...GOTO` resolution.
    pub labels: HashMap<u32, BlockId>,
    loop_stack: Vec<LoopTargets>,
    /// `(block, target line)` pairs left unresolved because the target
    /// label hadn't been seen yet when the jump was built. Patched by
    /// [`CfgBuilder::resolve_fixups`] once the whole program is walked.
    fixups: Vec<(BlockId, u32)>,
}

struct LoopTargets {
    kind: LoopKind,
    break_block: BlockId,
    continue_block: BlockId,
}

impl CfgBuilder {
    pub fn new() -> Self {
        CfgBuilder { blocks: Vec::new(), labels: HashMap::new(), loop_stack: Vec::new(), fixups: Vec::new() }
    }

    /// Patches every forward `GOTO`/`GOSUB` recorded during [`Self::build`]
    /// now that every label in the program has a known block. Unknown
    /// targets are left as `Terminator::Halt` so codegen doesn't have to
    /// special-case an `Unset` terminator; semantic analysis is expected
    /// to have already reported the undefined-label error.
    pub fn resolve_fixups(&mut self) {
        for (block, target) in std::mem::take(&mut self.fixups) {
            let term = match self.labels.get(&target) {
                Some(&dest) => Terminator::Jump(dest),
                None => Terminator::Halt,
            };
            self.blocks[block].terminator = term;
        }
    }

    fn new_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock { id, statements: Vec::new(), terminator: Terminator::Unset });
        id
    }

    fn push(&mut self, block: BlockId, stmt: LinearStmt) {
        self.blocks[block].statements.push(stmt);
    }

    fn terminate(&mut self, block: BlockId, term: Terminator) {
        if matches!(self.blocks[block].terminator, Terminator::Unset) {
            self.blocks[block].terminator = term;
        }
    }

    /// Builds the CFG for one routine body (or the top-level program
    /// lines, flattened into a single statement stream by the caller).
    /// Returns the entry block id.
    pub fn build(&mut self, lines: &[Line]) -> BlockId {
        let entry = self.new_block();
        let mut current = entry;
        for line in lines {
            if let Some(label) = line.label {
                let label_block = self.new_block();
                self.terminate(current, Terminator::Jump(label_block));
                self.labels.insert(label, label_block);
                current = label_block;
            }
            current = self.build_statements(current, &line.statements);
        }
        self.terminate(current, Terminator::Halt);
        self.resolve_fixups();
        entry
    }

    pub fn build_routine(&mut self, body: &[Statement]) -> BlockId {
        let entry = self.new_block();
        let exit = self.build_statements(entry, body);
        self.terminate(exit, Terminator::Return(None));
        entry
    }

    /// Appends `statements` starting at `current`, returning the block
    /// execution falls through to afterward.
    fn build_statements(&mut self, mut current: BlockId, statements: &[Statement]) -> BlockId {
        for stmt in statements {
            current = self.build_statement(current, stmt);
        }
        current
    }

    fn build_statement(&mut self, current: BlockId, stmt: &Statement) -> BlockId {
        match stmt {
            Statement::Let { target, value, .. } => {
                self.push(current, LinearStmt::Let { target: target.clone(), value: value.clone() });
                current
            }
            Statement::Print { items, .. } => {
                self.push(current, LinearStmt::Print { items: items.clone() });
                current
            }
            Statement::Input { prompt, targets, line_mode, .. } => {
                self.push(
                    current,
                    LinearStmt::Input { prompt: prompt.clone(), targets: targets.clone(), line_mode: *line_mode },
                );
                current
            }
            Statement::Call { name, symbol, args, .. } => {
                self.push(current, LinearStmt::Call { name: name.clone(), symbol: *symbol, args: args.clone() });
                current
            }
            Statement::Dim { name, ty, array_bounds, initializer, .. } => {
                self.push(
                    current,
                    LinearStmt::Dim {
                        name: name.clone(),
                        ty: ty.clone(),
                        array_bounds: array_bounds.clone(),
                        initializer: initializer.clone(),
                    },
                );
                current
            }
            Statement::Redim { name, array_bounds, preserve, .. } => {
                self.push(
                    current,
                    LinearStmt::Redim { name: name.clone(), array_bounds: array_bounds.clone(), preserve: *preserve },
                );
                current
            }
            Statement::Erase { name, .. } => {
                self.push(current, LinearStmt::Erase { name: name.clone() });
                current
            }
            Statement::Data { values, .. } => {
                self.push(current, LinearStmt::Data { values: values.clone() });
                current
            }
            Statement::Read { targets, .. } => {
                self.push(current, LinearStmt::Read { targets: targets.clone() });
                current
            }
            Statement::Restore { target, .. } => {
                self.push(current, LinearStmt::Restore { target: target.clone() });
                current
            }
            Statement::SliceAssign { target, start, end, value, .. } => {
                self.push(
                    current,
                    LinearStmt::SliceAssign {
                        target: target.clone(),
                        start: start.clone(),
                        end: end.clone(),
                        value: value.clone(),
                    },
                );
                current
            }
            Statement::Throw { code, .. } => {
                self.push(current, LinearStmt::Throw { code: code.clone() });
                current
            }
            Statement::Spawn { target, routine, args, .. } => {
                self.push(
                    current,
                    LinearStmt::Spawn { target: target.clone(), routine: routine.clone(), args: args.clone() },
                );
                current
            }
            Statement::Send { target, value, .. } => {
                self.push(current, LinearStmt::Send { target: target.clone(), value: value.clone() });
                current
            }
            Statement::Cancel { target, .. } => {
                self.push(current, LinearStmt::Cancel { target: target.clone() });
                current
            }
            Statement::DeleteObject { target, .. } => {
                self.push(current, LinearStmt::DeleteObject { target: target.clone() });
                current
            }
            Statement::Terminal { op, args, .. } => {
                self.push(current, LinearStmt::Terminal { op: *op, args: args.clone() });
                current
            }
            Statement::Option { .. } | Statement::DefType { .. } | Statement::DefClass { .. } => current,
            Statement::DefRoutine { .. } | Statement::Worker { .. } => current,

            Statement::If { cond, then_body, elseifs, else_body, .. } => {
                self.build_if(current, cond, then_body, elseifs, else_body)
            }
            Statement::For { var, from, to, step, body, .. } => self.build_for(current, var, from, to, step, body),
            Statement::While { cond, body, .. } => self.build_while(current, cond, body),
            Statement::Do { test, cond, body, .. } => self.build_do(current, *test, cond, body),
            Statement::Repeat { body, until_cond, .. } => self.build_repeat(current, body, until_cond),
            Statement::SelectCase { scrutinee, arms, else_body, .. } => {
                self.build_select_case(current, scrutinee, arms, else_body)
            }
            Statement::Try { body, catches, finally, .. } => self.build_try(current, body, catches, finally),

            Statement::Goto { target, .. } => {
                let after = self.new_block();
                self.pending_label_jump(current, *target);
                after
            }
            Statement::Gosub { target, .. } => {
                let after = self.new_block();
                self.pending_label_jump(current, *target);
                after
            }
            Statement::Return { value, .. } => {
                self.terminate(current, Terminator::Return(value.clone()));
                self.new_block()
            }
            Statement::ExitLoop { kind, .. } => {
                let break_block = self
                    .loop_stack
                    .iter()
                    .rev()
                    .find(|t| t.kind == *kind)
                    .or_else(|| self.loop_stack.last())
                    .map(|t| t.break_block);
                if let Some(block) = break_block {
                    self.terminate(current, Terminator::Jump(block));
                }
                self.new_block()
            }
            Statement::ExitRoutine { .. } => {
                self.terminate(current, Terminator::Return(None));
                self.new_block()
            }
            Statement::End { .. } | Statement::StopStmt { .. } => {
                self.terminate(current, Terminator::Halt);
                self.new_block()
            }
            Statement::MatchReceive { arms, else_body, .. } => {
                let after = self.new_block();
                for arm in arms {
                    let exit = self.build_statements(current, &arm.body);
                    self.terminate(exit, Terminator::Jump(after));
                }
                if let Some(body) = else_body {
                    let exit = self.build_statements(current, body);
                    self.terminate(exit, Terminator::Jump(after));
                }
                after
            }
            Statement::AfterMsSend { .. } | Statement::EveryMsSend { .. } | Statement::TimerStopAll { .. } => current,
            Statement::OnErrorGoto { .. } | Statement::OnGoto { .. } | Statement::Resume { .. } => current,
        }
    }

    /// `GOTO`/`GOSUB` targets a line number that may be defined later in
    /// the program; the jump is recorded as a fixup resolved once the
    /// whole program has been walked and every label block is known.
    fn pending_label_jump(&mut self, from: BlockId, target: u32) {
        if let Some(&block) = self.labels.get(&target) {
            self.terminate(from, Terminator::Jump(block));
        } else {
            // Forward reference: leave unset and patch in `resolve_fixups`.
            self.fixups.push((from, target));
        }
    }

    fn build_if(
        &mut self,
        current: BlockId,
        cond: &Expr,
        then_body: &[Statement],
        elseifs: &[(Expr, Vec<Statement>)],
        else_body: &Option<Vec<Statement>>,
    ) -> BlockId {
        let after = self.new_block();
        let then_entry = self.new_block();
        let else_entry = self.new_block();
        self.terminate(current, Terminator::Branch { cond: cond.clone(), then_block: then_entry, else_block: else_entry });

        let then_exit = self.build_statements(then_entry, then_body);
        self.terminate(then_exit, Terminator::Jump(after));

        let mut chain_current = else_entry;
        for (elif_cond, elif_body) in elseifs {
            let elif_then = self.new_block();
            let elif_else = self.new_block();
            self.terminate(
                chain_current,
                Terminator::Branch { cond: elif_cond.clone(), then_block: elif_then, else_block: elif_else },
            );
            let elif_exit = self.build_statements(elif_then, elif_body);
            self.terminate(elif_exit, Terminator::Jump(after));
            chain_current = elif_else;
        }

        match else_body {
            Some(body) => {
                let else_exit = self.build_statements(chain_current, body);
                self.terminate(else_exit, Terminator::Jump(after));
            }
            None => {
                self.terminate(chain_current, Terminator::Jump(after));
            }
        }
        after
    }

    fn build_for(
        &mut self,
        current: BlockId,
        var: &str,
        from: &Expr,
        to: &Expr,
        step: &Option<Expr>,
        body: &[Statement],
    ) -> BlockId {
        self.push(
            current,
            LinearStmt::Let { target: LValue::Variable { name: var.to_string(), symbol: None }, value: from.clone() },
        );
        let header = self.new_block();
        self.terminate(current, Terminator::Jump(header));

        let body_entry = self.new_block();
        let after = self.new_block();
        let loop_var = Expr::new(ExprKind::Variable { name: var.to_string(), symbol: None }, to.location);
        let cmp_op = match step {
            Some(s) if is_negative_literal(s) => CompareOp::Ge,
            _ => CompareOp::Le,
        };
        let cond = Expr::new(
            ExprKind::Compare { op: cmp_op, lhs: Box::new(loop_var.clone()), rhs: Box::new(to.clone()) },
            to.location,
        );
        self.terminate(header, Terminator::Branch { cond, then_block: body_entry, else_block: after });

        let continue_block = self.new_block();
        self.loop_stack.push(LoopTargets { kind: LoopKind::For, break_block: after, continue_block });
        let body_exit = self.build_statements(body_entry, body);
        self.loop_stack.pop();
        self.terminate(body_exit, Terminator::Jump(continue_block));

        let step_expr = step.clone().unwrap_or_else(|| Expr::new(ExprKind::IntLiteral(1), to.location));
        self.push(
            continue_block,
            LinearStmt::Let {
                target: LValue::Variable { name: var.to_string(), symbol: None },
                value: Expr::new(
                    ExprKind::Binary { op: BinOp::Add, lhs: Box::new(loop_var), rhs: Box::new(step_expr) },
                    to.location,
                ),
            },
        );
        self.terminate(continue_block, Terminator::Jump(header));
        after
    }

    fn build_while(&mut self, current: BlockId, cond: &Expr, body: &[Statement]) -> BlockId {
        let header = self.new_block();
        self.terminate(current, Terminator::Jump(header));
        let body_entry = self.new_block();
        let after = self.new_block();
        self.terminate(header, Terminator::Branch { cond: cond.clone(), then_block: body_entry, else_block: after });

        self.loop_stack.push(LoopTargets { kind: LoopKind::While, break_block: after, continue_block: header });
        let body_exit = self.build_statements(body_entry, body);
        self.loop_stack.pop();
        self.terminate(body_exit, Terminator::Jump(header));
        after
    }

    fn build_do(&mut self, current: BlockId, test: DoTest, cond: &Option<Expr>, body: &[Statement]) -> BlockId {
        let header = self.new_block();
        let body_entry = self.new_block();
        let after = self.new_block();
        self.terminate(current, Terminator::Jump(header));

        match (test, cond) {
            (DoTest::PreWhile, Some(c)) => {
                self.terminate(header, Terminator::Branch { cond: c.clone(), then_block: body_entry, else_block: after });
            }
            (DoTest::PreUntil, Some(c)) => {
                self.terminate(header, Terminator::Branch { cond: c.clone(), then_block: after, else_block: body_entry });
            }
            _ => {
                self.terminate(header, Terminator::Jump(body_entry));
            }
        }

        self.loop_stack.push(LoopTargets { kind: LoopKind::Do, break_block: after, continue_block: header });
        let body_exit = self.build_statements(body_entry, body);
        self.loop_stack.pop();

        match (test, cond) {
            (DoTest::PostWhile, Some(c)) => {
                self.terminate(body_exit, Terminator::Branch { cond: c.clone(), then_block: header, else_block: after });
            }
            (DoTest::PostUntil, Some(c)) => {
                self.terminate(body_exit, Terminator::Branch { cond: c.clone(), then_block: after, else_block: header });
            }
            _ => {
                self.terminate(body_exit, Terminator::Jump(header));
            }
        }
        after
    }

    fn build_repeat(&mut self, current: BlockId, body: &[Statement], until_cond: &Expr) -> BlockId {
        let header = self.new_block();
        let after = self.new_block();
        self.terminate(current, Terminator::Jump(header));
        self.loop_stack.push(LoopTargets { kind: LoopKind::Repeat, break_block: after, continue_block: header });
        let body_exit = self.build_statements(header, body);
        self.loop_stack.pop();
        self.terminate(
            body_exit,
            Terminator::Branch { cond: until_cond.clone(), then_block: after, else_block: header },
        );
        after
    }

    fn build_select_case(
        &mut self,
        current: BlockId,
        scrutinee: &Expr,
        arms: &[CaseArm],
        else_body: &Option<Vec<Statement>>,
    ) -> BlockId {
        let after = self.new_block();
        let mut chain_current = current;
        for arm in arms {
            let arm_entry = self.new_block();
            let next_check = self.new_block();
            let cond = case_arm_condition(scrutinee, arm);
            self.terminate(chain_current, Terminator::Branch { cond, then_block: arm_entry, else_block: next_check });
            let arm_exit = self.build_statements(arm_entry, &arm.body);
            self.terminate(arm_exit, Terminator::Jump(after));
            chain_current = next_check;
        }
        match else_body {
            Some(body) => {
                let exit = self.build_statements(chain_current, body);
                self.terminate(exit, Terminator::Jump(after));
            }
            None => self.terminate(chain_current, Terminator::Jump(after)),
        }
        after
    }

    fn build_try(
        &mut self,
        current: BlockId,
        body: &[Statement],
        catches: &[CatchArm],
        finally: &Option<Vec<Statement>>,
    ) -> BlockId {
        let after = self.new_block();
        let body_exit = self.build_statements(current, body);
        self.terminate(body_exit, Terminator::Jump(after));
        for catch in catches {
            let catch_entry = self.new_block();
            let exit = self.build_statements(catch_entry, &catch.body);
            self.terminate(exit, Terminator::Jump(after));
        }
        match finally {
            Some(body) => self.build_statements(after, body),
            None => after,
        }
    }
}

/// Shared with code generation's own `FOR` lowering, so both places treat
/// a negative `STEP` the same way.
pub(crate) fn is_negative_literal(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::IntLiteral(n) if n < 0) || matches!(e.kind, ExprKind::Unary { op: UnaryOp::Negate, .. })
}

/// Shared with code generation's own `SELECT CASE` lowering.
pub(crate) fn case_arm_condition(scrutinee: &Expr, arm: &CaseArm) -> Expr {
    let location = scrutinee.location;
    let mut clauses: Vec<Expr> = Vec::new();
    for m in &arm.matches {
        match m {
            CaseMatch::Values(values) => {
                for v in values {
                    clauses.push(Expr::new(
                        ExprKind::Compare { op: CompareOp::Eq, lhs: Box::new(scrutinee.clone()), rhs: Box::new(v.clone()) },
                        location,
                    ));
                }
            }
            CaseMatch::Range(lo, hi) => {
                let ge = Expr::new(
                    ExprKind::Compare { op: CompareOp::Ge, lhs: Box::new(scrutinee.clone()), rhs: Box::new(lo.clone()) },
                    location,
                );
                let le = Expr::new(
                    ExprKind::Compare { op: CompareOp::Le, lhs: Box::new(scrutinee.clone()), rhs: Box::new(hi.clone()) },
                    location,
                );
                clauses.push(Expr::new(
                    ExprKind::Logical { op: LogicalOp::And, lhs: Box::new(ge), rhs: Box::new(le) },
                    location,
                ));
            }
            CaseMatch::Comparison(op, v) => {
                clauses.push(Expr::new(
                    ExprKind::Compare { op: *op, lhs: Box::new(scrutinee.clone()), rhs: Box::new(v.clone()) },
                    location,
                ));
            }
        }
    }
    clauses
        .into_iter()
        .reduce(|a, b| Expr::new(ExprKind::Logical { op: LogicalOp::Or, lhs: Box::new(a), rhs: Box::new(b) }, location))
        .unwrap_or_else(|| Expr::new(ExprKind::BoolLiteral(false), location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use fbasic_core::source_map::FileId;

    fn build_src(src: &str) -> CfgBuilder {
        let (tokens, _) = tokenize(src, FileId::FIRST);
        let (program, _) = parse(&tokens, FileId::FIRST);
        let mut builder = CfgBuilder::new();
        builder.build(&program.lines);
        builder
    }

    #[test]
    fn if_then_else_produces_a_branch_terminator() {
        let builder = build_src("IF 1 THEN\nPRINT 1\nELSE\nPRINT 2\nEND IF\n");
        let has_branch = builder.blocks.iter().any(|b| matches!(b.terminator, Terminator::Branch { .. }));
        assert!(has_branch);
    }

    #[test]
    fn a_loop_nested_inside_an_if_body_keeps_its_blocks_inside_the_branch() {
        let builder = build_src("IF 1 THEN\nFOR I = 1 TO 3\nPRINT I\nNEXT I\nEND IF\n");
        // The loop header must be reachable only through the then-branch,
        // not spliced into the if's own entry block.
        let loop_headers = builder
            .blocks
            .iter()
            .filter(|b| matches!(&b.terminator, Terminator::Branch { then_block, .. } if *then_block != 0))
            .count();
        assert!(loop_headers >= 1);
    }

    #[test]
    fn for_loop_with_negative_step_uses_a_greater_equal_comparison() {
        let builder = build_src("FOR I = 10 TO 1 STEP -1\nPRINT I\nNEXT I\n");
        let uses_ge = builder.blocks.iter().any(|b| {
            matches!(&b.terminator, Terminator::Branch { cond, .. } if matches!(cond.kind, ExprKind::Compare { op: CompareOp::Ge, .. }))
        });
        assert!(uses_ge);
    }
}
