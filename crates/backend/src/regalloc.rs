//! Linear-scan register allocation (spec.md §4.7).
//!
//! This is deliberately the simple end of the spectrum: one numbered live
//! range per temporary spanning its first definition to its last use within
//! the block ordering the IR is printed in, no interval splitting, no
//! coalescing. It exists to make the driver self-sufficient; the richer
//! SSA-based allocator that would normally sit here is one of the backend
//! collaborators this crate is not standing in for.

use crate::ir::{Function, Inst, Terminator, Value};
use crate::target::Target;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Reg(&'static str),
    /// Offset from the frame pointer, in bytes, always negative in the
    /// conventional downward-growing stack layout.
    Spill(i32),
}

#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub locations: HashMap<String, Location>,
    pub frame_size: u32,
}

impl Allocation {
    pub fn location(&self, temp: &str) -> Location {
        self.locations
            .get(temp)
            .copied()
            .unwrap_or(Location::Spill(0))
    }
}

struct LiveRange {
    temp: String,
    start: u32,
    end: u32,
    is_float: bool,
}

/// Numbers every instruction in the function in print order and records,
/// per temporary, the first def and last use position. This is a
/// deliberately coarse approximation of liveness (it ignores back-edges,
/// so a temp live across a loop back-edge is treated as live for the whole
/// function) which biases the allocator toward spilling loop-carried
/// values rather than mis-allocating them.
#[derive(Default)]
struct LiveAccum {
    first_def: HashMap<String, u32>,
    last_use: HashMap<String, u32>,
    is_float: HashMap<String, bool>,
}

impl LiveAccum {
    fn def(&mut self, name: &str, pos: u32, float: bool) {
        self.first_def.entry(name.to_string()).or_insert(pos);
        self.last_use.entry(name.to_string()).or_insert(pos);
        self.is_float.insert(name.to_string(), float);
    }

    fn use_at(&mut self, value: &Value, pos: u32) {
        if let Value::Temp(name) = value {
            self.last_use
                .entry(name.to_string())
                .and_modify(|e| *e = (*e).max(pos))
                .or_insert(pos);
        }
    }

    fn into_ranges(self) -> Vec<LiveRange> {
        let LiveAccum { first_def, last_use, is_float } = self;
        let mut ranges: Vec<LiveRange> = first_def
            .into_iter()
            .map(|(temp, start)| {
                let end = *last_use.get(&temp).unwrap_or(&start);
                let float = *is_float.get(&temp).unwrap_or(&false);
                LiveRange { temp, start, end, is_float: float }
            })
            .collect();
        ranges.sort_by_key(|r| r.start);
        ranges
    }
}

fn compute_live_ranges(func: &Function) -> Vec<LiveRange> {
    let mut acc = LiveAccum::default();
    let mut pos: u32 = 0;

    for param in &func.params {
        acc.def(&param.name, 0, param.ty.is_float());
    }

    for block in &func.blocks {
        for inst in &block.insts {
            pos += 1;
            match inst {
                Inst::BinOp { dst, ty, lhs, rhs, .. } => {
                    acc.def(dst, pos, ty.is_float());
                    acc.use_at(lhs, pos);
                    acc.use_at(rhs, pos);
                }
                Inst::Cmp { dst, lhs, rhs, .. } => {
                    acc.def(dst, pos, false);
                    acc.use_at(lhs, pos);
                    acc.use_at(rhs, pos);
                }
                Inst::Convert { dst, to_ty, src, .. } => {
                    acc.def(dst, pos, to_ty.is_float());
                    acc.use_at(src, pos);
                }
                Inst::Load { dst, ty, addr } => {
                    acc.def(dst, pos, ty.is_float());
                    acc.use_at(addr, pos);
                }
                Inst::Store { addr, value, .. } => {
                    acc.use_at(addr, pos);
                    acc.use_at(value, pos);
                }
                Inst::AddrOf { dst, base, offset } => {
                    acc.def(dst, pos, false);
                    acc.use_at(base, pos);
                    acc.use_at(offset, pos);
                }
                Inst::Call { dst, ret_ty, args, .. } => {
                    if let Some(dst) = dst {
                        acc.def(dst, pos, ret_ty.map(|t| t.is_float()).unwrap_or(false));
                    }
                    for (_, v) in args {
                        acc.use_at(v, pos);
                    }
                }
                Inst::Phi { dst, ty, incoming } => {
                    acc.def(dst, pos, ty.is_float());
                    for (_, v) in incoming {
                        acc.use_at(v, pos);
                    }
                }
            }
        }
        pos += 1;
        match &block.terminator {
            Terminator::Jnz { cond, .. } => acc.use_at(cond, pos),
            Terminator::Ret(Some((_, v))) => acc.use_at(v, pos),
            Terminator::Switch { value, .. } => acc.use_at(value, pos),
            Terminator::Jmp(_) | Terminator::Ret(None) => {}
        }
    }

    acc.into_ranges()
}

/// Allocates registers for every temporary in `func`, spilling to the
/// frame when the pool is exhausted for a given class (spec.md §4.7: "the
/// driver must not assume an unbounded register file").
pub fn allocate(func: &Function, target: Target) -> Allocation {
    let ranges = compute_live_ranges(func);
    let gprs = target.gpr_pool();
    let fprs = target.fpr_pool();

    let mut active_gpr: Vec<(&LiveRange, &'static str)> = Vec::new();
    let mut active_fpr: Vec<(&LiveRange, &'static str)> = Vec::new();
    let mut free_gpr: Vec<&'static str> = gprs.iter().rev().copied().collect();
    let mut free_fpr: Vec<&'static str> = fprs.iter().rev().copied().collect();

    let mut locations = HashMap::new();
    let mut spill_bytes: u32 = 0;

    for range in &ranges {
        let (active, free) = if range.is_float {
            (&mut active_fpr, &mut free_fpr)
        } else {
            (&mut active_gpr, &mut free_gpr)
        };

        active.retain(|(r, reg)| {
            if r.end < range.start {
                free.push(reg);
                false
            } else {
                true
            }
        });

        if let Some(reg) = free.pop() {
            locations.insert(range.temp.clone(), Location::Reg(reg));
            active.push((range, reg));
        } else {
            spill_bytes += 8;
            locations.insert(range.temp.clone(), Location::Spill(-(spill_bytes as i32)));
        }
    }

    let raw_frame = spill_bytes;
    let aligned = (raw_frame + (target.stack_align() - 1)) & !(target.stack_align() - 1);
    Allocation {
        locations,
        frame_size: aligned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse;

    #[test]
    fn assigns_distinct_registers_to_non_overlapping_ranges() {
        let text = "\
function w $f(w %a, w %b)
@entry
  %t0 = add w %a, %b
  %t1 = mul w %t0, %a
  ret w %t1
";
        let module = parse(text).unwrap();
        let f = module.function("f").unwrap();
        let alloc = allocate(f, Target::Amd64SysV);
        assert!(matches!(alloc.location("t0"), Location::Reg(_)));
        assert!(matches!(alloc.location("t1"), Location::Reg(_)));
    }

    #[test]
    fn spills_when_pool_is_exhausted() {
        let target = Target::Arm64;
        let pool_size = target.gpr_pool().len();
        let mut text = String::from("function w $many()\n@entry\n");
        for i in 0..(pool_size + 5) {
            text.push_str(&format!("  %t{} = add w {}, {}\n", i, i, i + 1));
        }
        text.push_str("  ret w %t0\n");
        let module = parse(&text).unwrap();
        let f = module.function("many").unwrap();
        let alloc = allocate(f, target);
        let spilled = alloc
            .locations
            .values()
            .filter(|loc| matches!(loc, Location::Spill(_)))
            .count();
        assert!(spilled > 0);
        assert!(alloc.frame_size >= 8);
        assert_eq!(alloc.frame_size % target.stack_align(), 0);
    }
}
