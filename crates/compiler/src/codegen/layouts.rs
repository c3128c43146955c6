//! Memory layouts for the aggregate value kinds codegen has to address
//! (spec §4.6.2): strings, arrays, UDTs/classes, and the opaque handles for
//! lists and hashmaps.

use crate::types::TypeDescriptor;
use std::collections::HashMap;

/// `{ data: pointer, length: long, capacity: long, flags: word }`.
pub const STRING_DESCRIPTOR_SIZE: u32 = 8 + 8 + 8 + 4;
pub const STRING_FIELD_DATA: u32 = 0;
pub const STRING_FIELD_LENGTH: u32 = 8;
pub const STRING_FIELD_CAPACITY: u32 = 16;
pub const STRING_FIELD_FLAGS: u32 = 24;

/// `{ data: pointer, rank: word, element_size: word, bounds[rank]: {lo,hi: long} }`.
pub const ARRAY_HEADER_SIZE: u32 = 8 + 4 + 4;
pub const ARRAY_BOUND_PAIR_SIZE: u32 = 16;

pub fn array_data_offset() -> u32 {
    0
}

pub fn array_rank_offset() -> u32 {
    8
}

pub fn array_element_size_offset() -> u32 {
    12
}

pub fn array_bounds_offset(dim: u32) -> u32 {
    ARRAY_HEADER_SIZE + dim * ARRAY_BOUND_PAIR_SIZE
}

pub fn scalar_size(ty: &TypeDescriptor) -> u32 {
    match ty {
        TypeDescriptor::Integer16 => 2,
        TypeDescriptor::Integer32 => 4,
        TypeDescriptor::Long64 => 8,
        TypeDescriptor::Single => 4,
        TypeDescriptor::Double => 8,
        TypeDescriptor::Boolean => 4,
        TypeDescriptor::String { .. } => 8, // carried by pointer to the descriptor
        _ => 8,
    }
}

/// Field layout for one user-defined type or class. Fields are laid out in
/// declaration order with natural alignment per field type; no padding
/// beyond what each field's own size requires, matching the teacher's
/// struct-layout style of not doing anything fancier than the minimum.
#[derive(Debug, Clone, Default)]
pub struct StructLayout {
    pub size: u32,
    pub field_offsets: HashMap<String, (u32, TypeDescriptor)>,
    /// `true` for `CLASS`: the first word is reserved for the vtable
    /// pointer (spec §4.6.2), absent from plain `TYPE` layouts.
    pub is_class: bool,
}

impl StructLayout {
    pub fn build(fields: &[(String, TypeDescriptor)], is_class: bool) -> StructLayout {
        let mut offset = if is_class { 8 } else { 0 };
        let mut field_offsets = HashMap::new();
        for (name, ty) in fields {
            let size = scalar_size(ty);
            let align = size.min(8).max(1);
            offset = round_up(offset, align);
            field_offsets.insert(name.clone(), (offset, ty.clone()));
            offset += size;
        }
        StructLayout { size: round_up(offset, 8), field_offsets, is_class }
    }

    pub fn field_offset(&self, name: &str) -> Option<(u32, TypeDescriptor)> {
        self.field_offsets.get(name).cloned()
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Registry of every `TYPE`/`CLASS` layout computed for a compilation unit,
/// keyed by the declared name.
#[derive(Debug, Clone, Default)]
pub struct LayoutTable {
    structs: HashMap<String, StructLayout>,
}

impl LayoutTable {
    pub fn new() -> Self {
        LayoutTable::default()
    }

    pub fn declare(&mut self, name: &str, fields: &[(String, TypeDescriptor)], is_class: bool) {
        self.structs.insert(name.to_string(), StructLayout::build(fields, is_class));
    }

    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_packs_fields_in_declaration_order() {
        let fields = vec![
            ("X".to_string(), TypeDescriptor::Integer32),
            ("Y".to_string(), TypeDescriptor::Double),
        ];
        let layout = StructLayout::build(&fields, false);
        assert_eq!(layout.field_offset("X").unwrap().0, 0);
        // Y (8-byte double) is realigned to offset 8, not packed at 4.
        assert_eq!(layout.field_offset("Y").unwrap().0, 8);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn class_layout_reserves_the_leading_vtable_word() {
        let fields = vec![("X".to_string(), TypeDescriptor::Integer32)];
        let layout = StructLayout::build(&fields, true);
        assert_eq!(layout.field_offset("X").unwrap().0, 8);
    }
}
