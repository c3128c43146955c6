//! Symbol tables (spec §3): variables, arrays, labels, routines, and
//! user-defined type/class declarations, scoped per routine with a chain
//! back to the global scope.

use crate::ast::{ByRef, RoutineKind};
use crate::types::TypeDescriptor;
use fbasic_core::span::SourceLocation;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct VariableSymbol {
    pub id: u32,
    pub name: String,
    pub ty: TypeDescriptor,
    pub is_array: bool,
    pub array_rank: u32,
    pub declared_at: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct RoutineSymbol {
    pub id: u32,
    pub name: String,
    pub kind: RoutineKind,
    pub params: Vec<(String, TypeDescriptor, ByRef)>,
    pub return_ty: TypeDescriptor,
    pub declared_at: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct LabelSymbol {
    pub line_number: u32,
    pub block_index: usize,
}

#[derive(Debug, Clone)]
pub struct TypeSymbol {
    pub name: String,
    pub fields: Vec<(String, TypeDescriptor)>,
    pub is_class: bool,
}

/// One lexical scope: the global program scope, or one routine body.
/// `outer` is `None` only for the global scope; every routine scope
/// chains back to it so unqualified globals remain visible inside a
/// SUB/FUNCTION/WORKER body (spec §3's scoping rule).
#[derive(Debug, Default)]
pub struct Scope {
    variables: HashMap<String, VariableSymbol>,
    outer: Option<Box<Scope>>,
}

impl Scope {
    pub fn new_global() -> Self {
        Scope { variables: HashMap::new(), outer: None }
    }

    pub fn child(self) -> Self {
        Scope { variables: HashMap::new(), outer: Some(Box::new(self)) }
    }

    /// Pops back to the enclosing scope, handing ownership of `self` back.
    /// Panics if called on the global scope; callers only invoke this when
    /// leaving a routine body they entered via `child`.
    pub fn pop(self) -> Scope {
        *self.outer.expect("attempted to pop the global scope")
    }

    pub fn declare(&mut self, symbol: VariableSymbol) -> Result<(), String> {
        if self.variables.contains_key(&symbol.name) {
            return Err(format!("variable '{}' already declared in this scope", symbol.name));
        }
        self.variables.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Looks up `name` in this scope, then each enclosing scope in turn.
    pub fn lookup(&self, name: &str) -> Option<&VariableSymbol> {
        if let Some(sym) = self.variables.get(name) {
            return Some(sym);
        }
        self.outer.as_ref().and_then(|o| o.lookup(name))
    }

    pub fn lookup_local(&self, name: &str) -> Option<&VariableSymbol> {
        self.variables.get(name)
    }
}

/// Program-wide tables: routines, labels, and type/class definitions are
/// flat (BASIC has no nested routine declarations), while variables live
/// in a [`Scope`] chain that tracks the current routine body.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub scope: Scope,
    routines: HashMap<String, RoutineSymbol>,
    labels: HashMap<u32, LabelSymbol>,
    types: HashMap<String, TypeSymbol>,
    next_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scope: Scope::new_global(),
            routines: HashMap::new(),
            labels: HashMap::new(),
            types: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: TypeDescriptor,
        is_array: bool,
        array_rank: u32,
        declared_at: SourceLocation,
    ) -> u32 {
        if let Some(existing) = self.scope.lookup_local(name) {
            return existing.id;
        }
        let id = self.fresh_id();
        let symbol = VariableSymbol { id, name: name.to_string(), ty, is_array, array_rank, declared_at };
        // `declare` only fails on a duplicate, which the lookup above rules
        // out, so no error path is reachable here.
        self.scope.declare(symbol).expect("duplicate check above should have prevented this");
        id
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&VariableSymbol> {
        self.scope.lookup(name)
    }

    pub fn declare_routine(&mut self, symbol: RoutineSymbol) -> Result<(), String> {
        if self.routines.contains_key(&symbol.name) {
            return Err(format!("routine '{}' already declared", symbol.name));
        }
        self.routines.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn lookup_routine(&self, name: &str) -> Option<&RoutineSymbol> {
        self.routines.get(name)
    }

    pub fn declare_label(&mut self, line_number: u32, block_index: usize) {
        self.labels.insert(line_number, LabelSymbol { line_number, block_index });
    }

    pub fn lookup_label(&self, line_number: u32) -> Option<&LabelSymbol> {
        self.labels.get(&line_number)
    }

    pub fn declare_type(&mut self, symbol: TypeSymbol) -> Result<(), String> {
        if self.types.contains_key(&symbol.name) {
            return Err(format!("type '{}' already declared", symbol.name));
        }
        self.types.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn lookup_type(&self, name: &str) -> Option<&TypeSymbol> {
        self.types.get(name)
    }

    /// Every declared `TYPE`/`CLASS`, for the code generator to build
    /// struct layouts from before lowering any routine bodies.
    pub fn types_iter(&self) -> impl Iterator<Item = &TypeSymbol> {
        self.types.values()
    }

    /// Every declared `SUB`/`FUNCTION`/`WORKER`, for the `-S` symbol dump.
    pub fn routines_iter(&self) -> impl Iterator<Item = &RoutineSymbol> {
        self.routines.values()
    }

    /// Variables visible in the current scope, innermost first, for the
    /// `-S` symbol dump. Walks the same chain [`Scope::lookup`] does.
    pub fn variables_in_scope(&self) -> Vec<&VariableSymbol> {
        let mut out = Vec::new();
        let mut scope = Some(&self.scope);
        while let Some(s) = scope {
            out.extend(s.variables.values());
            scope = s.outer.as_deref();
        }
        out
    }

    pub fn enter_routine_scope(&mut self) {
        let current = std::mem::take(&mut self.scope);
        self.scope = current.child();
    }

    pub fn exit_routine_scope(&mut self) {
        let current = std::mem::take(&mut self.scope);
        self.scope = current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbasic_core::source_map::FileId;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId::FIRST, 0, 0)
    }

    #[test]
    fn redeclaring_the_same_variable_returns_the_same_id() {
        let mut table = SymbolTable::new();
        let a = table.declare_variable("X", TypeDescriptor::Integer32, false, 0, loc());
        let b = table.declare_variable("X", TypeDescriptor::Integer32, false, 0, loc());
        assert_eq!(a, b);
    }

    #[test]
    fn routine_scope_sees_global_but_global_does_not_see_routine_locals() {
        let mut table = SymbolTable::new();
        table.declare_variable("G", TypeDescriptor::Integer32, false, 0, loc());
        table.enter_routine_scope();
        table.declare_variable("L", TypeDescriptor::Integer32, false, 0, loc());
        assert!(table.lookup_variable("G").is_some());
        assert!(table.lookup_variable("L").is_some());
        table.exit_routine_scope();
        assert!(table.lookup_variable("G").is_some());
        assert!(table.lookup_variable("L").is_none());
    }

    #[test]
    fn duplicate_routine_declaration_is_rejected() {
        let mut table = SymbolTable::new();
        let sym = RoutineSymbol {
            id: 0,
            name: "F".to_string(),
            kind: RoutineKind::Function,
            params: Vec::new(),
            return_ty: TypeDescriptor::Integer32,
            declared_at: loc(),
        };
        assert!(table.declare_routine(sym.clone()).is_ok());
        assert!(table.declare_routine(sym).is_err());
    }
}
