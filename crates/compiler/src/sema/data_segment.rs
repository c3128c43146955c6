//! DATA literal collection and RESTORE point computation (spec §4.3, §4.6).
//!
//! `DATA` statements anywhere in the program contribute to one flat,
//! program-order sequence. `READ` consumes from a single cursor into that
//! sequence; `RESTORE` (bare, by line, or by label) resets the cursor to
//! the first `DATA` item associated with that position.

use crate::ast::{DataLiteral, Program, Statement};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DataSegment {
    /// The flattened, program-order sequence of every literal in every
    /// `DATA` statement.
    pub values: Vec<DataLiteral>,
    /// Maps a line number to the index into `values` of the first literal
    /// contributed by a `DATA` statement on or after that line, so
    /// `RESTORE <line>` can reset the cursor without a linear scan at
    /// runtime.
    pub restore_points: HashMap<u32, usize>,
}

impl DataSegment {
    pub fn build(program: &Program) -> DataSegment {
        let mut segment = DataSegment::default();
        for line in &program.lines {
            if let Some(label) = line.label {
                segment.restore_points.entry(label).or_insert(segment.values.len());
            }
            collect_statements(&line.statements, &mut segment);
        }
        segment
    }
}

fn collect_statements(statements: &[Statement], segment: &mut DataSegment) {
    for stmt in statements {
        match stmt {
            Statement::Data { values, .. } => segment.values.extend(values.iter().cloned()),
            Statement::If { then_body, elseifs, else_body, .. } => {
                collect_statements(then_body, segment);
                for (_, body) in elseifs {
                    collect_statements(body, segment);
                }
                if let Some(body) = else_body {
                    collect_statements(body, segment);
                }
            }
            Statement::For { body, .. }
            | Statement::While { body, .. }
            | Statement::Do { body, .. }
            | Statement::Repeat { body, .. } => collect_statements(body, segment),
            Statement::SelectCase { arms, else_body, .. } => {
                for arm in arms {
                    collect_statements(&arm.body, segment);
                }
                if let Some(body) = else_body {
                    collect_statements(body, segment);
                }
            }
            Statement::Try { body, catches, finally, .. } => {
                collect_statements(body, segment);
                for c in catches {
                    collect_statements(&c.body, segment);
                }
                if let Some(body) = finally {
                    collect_statements(body, segment);
                }
            }
            Statement::MatchReceive { arms, else_body, .. } => {
                for arm in arms {
                    collect_statements(&arm.body, segment);
                }
                if let Some(body) = else_body {
                    collect_statements(body, segment);
                }
            }
            Statement::DefRoutine { def } => collect_statements(&def.body, segment),
            Statement::Worker { def } => collect_statements(&def.body, segment),
            Statement::DefClass { def } => {
                for m in &def.methods {
                    collect_statements(&m.body, segment);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Line;
    use fbasic_core::source_map::FileId;
    use fbasic_core::span::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId::FIRST, 0, 0)
    }

    #[test]
    fn flattens_data_across_multiple_lines_in_program_order() {
        let program = Program {
            lines: vec![
                Line {
                    label: Some(10),
                    statements: vec![Statement::Data {
                        values: vec![DataLiteral::Int(1), DataLiteral::Int(2)],
                        location: loc(),
                    }],
                    location: loc(),
                },
                Line {
                    label: Some(20),
                    statements: vec![Statement::Data {
                        values: vec![DataLiteral::Str("x".to_string())],
                        location: loc(),
                    }],
                    location: loc(),
                },
            ],
        };
        let segment = DataSegment::build(&program);
        assert_eq!(segment.values.len(), 3);
        assert_eq!(segment.restore_points.get(&20), Some(&2));
    }
}
