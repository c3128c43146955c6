//! Lowers a typed, CFG-built program into the textual IR the backend driver
//! consumes (spec §4.6). Runs only when semantic analysis recorded no
//! error-severity diagnostic.
//!
//! Variable storage: this dialect has no recursion and no SUB/FUNCTION
//! reentrancy, so every variable — global or routine-local — is given a
//! single zero-initialized slot in the data section, addressed by name.
//! That keeps the lowering rules in §4.6.3 front and center instead of
//! building a general stack-frame allocator this dialect never needs.

pub mod abi;
pub mod data_segment;
pub mod error;
pub mod ir;
pub mod layouts;
pub mod lower_expr;
pub mod lower_stmt;

use std::collections::HashSet;

use crate::ast::{Line, Program, RoutineKind, Statement};
use crate::cfg::CfgBuilder;
use crate::sema::DataSegment;
use crate::symtab::SymbolTable;
use crate::types::TypeDescriptor;

use error::CodeGenError;
use ir::{DataItem, DataValue, FunctionBuilder, IrType, Module};
use layouts::LayoutTable;

pub fn to_ir_type(ty: &TypeDescriptor) -> IrType {
    match ty {
        TypeDescriptor::Integer16 => IrType::Half,
        TypeDescriptor::Integer32 => IrType::Word,
        TypeDescriptor::Long64 => IrType::Long,
        TypeDescriptor::Single => IrType::Single,
        TypeDescriptor::Double => IrType::Double,
        TypeDescriptor::Boolean => IrType::Word,
        _ => IrType::Pointer,
    }
}

/// Shared state threaded through every lowering call: the module under
/// construction, struct layouts, the global-variable symbol set (so a
/// variable's storage slot is declared the first time it's referenced),
/// and a name-mangling counter for compiler-introduced temporaries like
/// string literal globals.
pub struct Ctx<'a> {
    pub module: Module,
    pub layouts: LayoutTable,
    pub symbols: &'a SymbolTable,
    pub data: &'a DataSegment,
    declared_globals: HashSet<String>,
    string_literal_counter: u32,
}

impl<'a> Ctx<'a> {
    pub fn new(symbols: &'a SymbolTable, data: &'a DataSegment) -> Self {
        Ctx {
            module: Module::default(),
            layouts: LayoutTable::new(),
            symbols,
            data,
            declared_globals: HashSet::new(),
            string_literal_counter: 0,
        }
    }

    /// Returns the storage symbol for a variable, declaring its zero-init
    /// slot in the data section on first use.
    ///
    /// A `TYPE`-valued (`Udt`) variable is stored inline — the global *is*
    /// the struct, not a pointer to one (`CLASS` instances are heap objects
    /// reached through a pointer slot, which the `to_ir_type` fallback
    /// already sizes correctly at 8 bytes) — so its slot needs the full
    /// struct size from the layout table, not a single scalar-sized entry.
    pub fn variable_global(&mut self, name: &str, ty: &TypeDescriptor) -> String {
        let symbol = format!("var_{}", name.to_ascii_lowercase());
        if self.declared_globals.insert(symbol.clone()) {
            let entries = match ty {
                TypeDescriptor::Udt(type_name) => {
                    let size = self.layouts.get(type_name).map(|l| l.size).unwrap_or(8);
                    (0..size).map(|_| (IrType::Byte, DataValue::Byte(0))).collect()
                }
                _ => {
                    let ir_ty = to_ir_type(ty);
                    let zero = if ir_ty.is_float() { DataValue::Float(0.0) } else { DataValue::Int(0) };
                    vec![(ir_ty, zero)]
                }
            };
            self.module.data.push(DataItem { name: symbol.clone(), entries });
        }
        symbol
    }

    /// Interns a string literal into the data section, returning its
    /// symbol name. Each call mints a fresh symbol; literals aren't
    /// deduplicated, matching the optimizer's constant-fold passes running
    /// before codegen rather than codegen doing its own CSE.
    pub fn intern_string_literal(&mut self, text: &str) -> String {
        let name = format!("strlit{}", self.string_literal_counter);
        self.string_literal_counter += 1;
        self.module.data.push(DataItem::string_literal(name.clone(), text));
        name
    }
}

/// Lowers a whole analyzed, optimized program into one IR module. `cfg` is
/// consulted only to confirm every routine's blocks were built (the real
/// lowering walks the typed AST directly, since the AST retains the same
/// structured control flow the CFG flattens for the backend's optimizer
/// passes — see DESIGN.md for why codegen doesn't lower the CFG itself).
pub fn generate(program: &Program, symbols: &SymbolTable, data: &DataSegment) -> Result<Module, CodeGenError> {
    let mut ctx = Ctx::new(symbols, data);

    for type_symbol in symbols.types_iter() {
        ctx.layouts.declare(&type_symbol.name, &type_symbol.fields, type_symbol.is_class);
    }

    data_segment::emit_data_table(&mut ctx.module, data);

    let main_lines: Vec<Line> = program
        .lines
        .iter()
        .map(|line| Line {
            label: line.label,
            statements: line
                .statements
                .iter()
                .filter(|s| !matches!(s, Statement::DefRoutine { .. } | Statement::Worker { .. }))
                .cloned()
                .collect(),
            location: line.location,
        })
        .collect();

    let main_fn = lower_stmt::lower_program(&mut ctx, "main", &main_lines)?;
    ctx.module.functions.push(main_fn);

    for line in &program.lines {
        for stmt in &line.statements {
            match stmt {
                Statement::DefRoutine { def } | Statement::Worker { def } => {
                    let ret_ty = match def.kind {
                        RoutineKind::Function => def.return_ty.as_ref(),
                        _ => None,
                    };
                    let func = lower_stmt::lower_routine(&mut ctx, &def.name, ret_ty, &def.params, &def.body)?;
                    ctx.module.functions.push(func);
                }
                _ => {}
            }
        }
    }

    Ok(ctx.module)
}

/// Builds the CFG for every routine in the program; used by the driver to
/// satisfy `-G` dumps and to validate the invariants in spec §4.5 before
/// codegen runs. Kept separate from [`generate`] since codegen lowers the
/// structured AST rather than walking these blocks.
pub fn build_all_cfgs(program: &Program) -> Vec<(String, CfgBuilder)> {
    let mut out = Vec::new();
    let mut builder = CfgBuilder::new();
    builder.build(&program.lines);
    out.push(("main".to_string(), builder));
    for line in &program.lines {
        for stmt in &line.statements {
            if let Statement::DefRoutine { def } | Statement::Worker { def } = stmt {
                let mut b = CfgBuilder::new();
                b.build_routine(&def.body);
                out.push((def.name.clone(), b));
            }
        }
    }
    out
}
