//! Lowers the `DataSegment` collected by semantic analysis (spec §4.3) into
//! IR data items and the runtime calls `READ`/`RESTORE` compile to (§4.6.3).

use crate::ast::DataLiteral;
use crate::sema::DataSegment;

use super::abi;
use super::ir::{DataItem, DataValue, FunctionBuilder, IrType, Module, Value};

/// Name of the cursor global the runtime's `data_read_*`/`data_restore`
/// helpers advance and reset; emitted once per compilation unit.
pub const DATA_CURSOR_GLOBAL: &str = "data_cursor";

/// Appends one data item per literal, in program order, plus the cursor
/// global initialized to zero. Each literal's item name (`dataN`) is also
/// the index the runtime table walks in lockstep with the cursor.
pub fn emit_data_table(module: &mut Module, segment: &DataSegment) {
    for (index, literal) in segment.values.iter().enumerate() {
        let name = format!("data{}", index);
        let item = match literal {
            DataLiteral::Int(n) => DataItem { name, entries: vec![(IrType::Long, DataValue::Int(*n))] },
            DataLiteral::Float(x) => DataItem { name, entries: vec![(IrType::Double, DataValue::Float(*x))] },
            DataLiteral::Str(s) => DataItem::string_literal(name, s),
        };
        module.data.push(item);
    }
    module.data.push(DataItem { name: DATA_CURSOR_GLOBAL.to_string(), entries: vec![(IrType::Word, DataValue::Int(0))] });
}

/// `READ var` for a variable of type `ty`, returning the value read.
pub fn emit_data_read(fb: &mut FunctionBuilder, ty: IrType) -> Option<Value> {
    let helper = match ty {
        IrType::Single | IrType::Double => abi::DATA_READ_DOUBLE,
        IrType::Pointer => abi::DATA_READ_STRING,
        _ => abi::DATA_READ_INT,
    };
    fb.emit_call(Some(ty), helper, Vec::new())
}

/// `RESTORE [target]`: resets the cursor to the given literal index, or to
/// zero for a bare `RESTORE`.
pub fn emit_data_restore(fb: &mut FunctionBuilder, index: i64) {
    fb.emit_call(None, abi::DATA_RESTORE, vec![(IrType::Word, Value::IntConst(index))]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::DataSegment;
    use std::collections::HashMap;

    #[test]
    fn emits_one_data_item_per_literal_plus_the_cursor() {
        let segment = DataSegment {
            values: vec![DataLiteral::Int(1), DataLiteral::Str("hi".to_string())],
            restore_points: HashMap::new(),
        };
        let mut module = Module::default();
        emit_data_table(&mut module, &segment);
        assert_eq!(module.data.len(), 3);
        assert_eq!(module.data.last().unwrap().name, DATA_CURSOR_GLOBAL);
    }
}
