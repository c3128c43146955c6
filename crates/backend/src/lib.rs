//! Backend driver for FasterBASIC.
//!
//! The compiler crate emits a textual intermediate representation and
//! stops; everything past that boundary — parsing the IR back into a
//! native representation, allocating registers, and emitting either
//! assembly text or executable machine code — lives here. This crate has
//! no dependency on the compiler crate; the IR text format is the only
//! thing they share, by convention rather than by type.
//!
//! - [`ir`]: the textual IR grammar and its parser.
//! - [`target`]: the ISAs/ABIs the driver knows how to emit for.
//! - [`regalloc`]: linear-scan register allocation over parsed IR.
//! - [`asm`]: ahead-of-time assembly text emission.
//! - [`jit`]: AArch64 in-memory machine code generation and execution.

pub mod asm;
pub mod ir;
pub mod jit;
pub mod regalloc;
pub mod target;

pub use ir::{Module, ParseError};
pub use target::Target;

/// Parses IR text and emits assembly for `target` in one call, the shape
/// the compiler driver's `-S` flag uses end to end.
pub fn compile_to_asm(ir_text: &str, target: Target) -> Result<String, ParseError> {
    let module = ir::parse(ir_text)?;
    Ok(asm::emit_module(&module, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_ir_text_straight_to_asm() {
        let text = "\
function w $id(w %a)
@entry
  ret w %a
";
        let asm = compile_to_asm(text, Target::Amd64SysV).expect("should compile");
        assert!(asm.contains("id:"));
    }
}
