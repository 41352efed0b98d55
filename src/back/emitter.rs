//! Frame layout and the fixed instruction sequences (prologue, epilogue,
//! incoming-parameter spill) that don't depend on any one IR opcode —
//! `back::select` asks this module "where does this name live" and "give
//! me the function's bookend instructions", and handles every IR
//! instruction's actual translation itself.

use crate::common::{Id, Map, Set};
use crate::middle::ir::Function;
use crate::middle::value::PhysRegNo;

use super::asm::{ArithOp, Instruction, Register, ARG_REGISTERS, SCRATCH_REGISTER};
use super::reg_alloc::{is_callee_saved, ALLOCATABLE};

fn align(n: i32, to: i32) -> i32 {
    (n + to - 1) / to * to
}

/// Where every named value in a function lives relative to `fp`. Register-
/// passed parameters (position 0..=3) get a stack slot like any other local
/// — they need one because nothing is ever kept live in a register across
/// instructions (§4.8) — while stack-passed parameters (position >= 4)
/// already have one, in the caller's frame, at a positive offset.
///
/// The layout always reserves room for every callee-saved register the
/// allocator could ever hand out, not just the ones a given function
/// happens to use: which registers `back::select` actually touches is only
/// known once the whole body has been selected, by which point local
/// offsets already need to exist. Reserving the worst case up front avoids
/// a two-pass selector at the cost of a few unused bytes of stack per call.
pub struct FrameLayout {
    offsets: Map<Id, i32>,
    pub frame_size: i32,
}

impl FrameLayout {
    pub fn compute(function: &Function) -> FrameLayout {
        let mut offset = 0i32;
        let mut offsets = Map::new();

        let reserved_callee_saved = ALLOCATABLE.iter().filter(|&&r| is_callee_saved(r)).count() as i32;
        offset -= 4 * reserved_callee_saved;

        for (i, p) in function.params.iter().enumerate() {
            let name = p.name().expect("a formal parameter is always named");
            if i < 4 {
                offset -= 4;
                offsets.insert(name, offset);
            } else {
                let stack_offset = 8 + 4 * (i as i32 - 4);
                offsets.insert(name, stack_offset);
            }
        }

        for (name, ty) in &function.locals {
            // Parameters are re-declared via `override_param` using the
            // same name; the first (parameter) slot already computed above
            // is what every read/write should use, so skip duplicates.
            if offsets.contains_key(name) {
                continue;
            }
            let size = align(ty.size_of() as i32, 4).max(4);
            offset -= size;
            offsets.insert(*name, offset);
        }

        let locals_and_saved_bytes = -offset;
        let outgoing_args_bytes = function.max_call_args.saturating_sub(4) as i32 * 4;
        let frame_size = align(locals_and_saved_bytes + outgoing_args_bytes, 8);

        FrameLayout { offsets, frame_size }
    }

    pub fn offset_of(&self, name: Id) -> i32 {
        *self
            .offsets
            .get(&name)
            .unwrap_or_else(|| panic!("no frame slot recorded for '{name}'"))
    }
}

/// Builds the instructions needed to address `[base, #offset]` when
/// `offset` does not fit the 12-bit immediate `ldr`/`str` can encode
/// directly, materializing it in the reserved scratch register (`r9`)
/// instead. Returns the (possibly empty) setup instructions together with
/// the base register and offset the caller should actually encode.
pub fn materialize_address(base: Register, offset: i32) -> (Vec<Instruction>, Register, i32) {
    if (-4095..=4095).contains(&offset) {
        return (vec![], base, offset);
    }
    let bits = offset as u32;
    let lo = (bits & 0xFFFF) as u16;
    let hi = (bits >> 16) as u16;
    let mut insts = vec![Instruction::MovW {
        dst: SCRATCH_REGISTER,
        imm: lo,
    }];
    if hi != 0 {
        insts.push(Instruction::MovT {
            dst: SCRATCH_REGISTER,
            imm: hi,
        });
    }
    insts.push(Instruction::Arith {
        op: ArithOp::Add,
        dst: SCRATCH_REGISTER,
        lhs: base,
        rhs: SCRATCH_REGISTER,
    });
    (insts, SCRATCH_REGISTER, 0)
}

fn split_into_encodable_chunks(total: i32) -> Vec<i32> {
    let mut chunks = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let chunk = remaining.min(4095);
        chunks.push(chunk);
        remaining -= chunk;
    }
    chunks
}

/// `used_callee_saved` is whichever subset of registers `back::select`'s
/// allocator actually handed out over the course of the function — always a
/// subset of what `FrameLayout` reserved room for, never more.
pub fn prologue(layout: &FrameLayout, used_callee_saved: &Set<PhysRegNo>) -> Vec<Instruction> {
    let mut v = vec![Instruction::Push(vec![Register::Fp, Register::Lr]), Instruction::Mov {
        dst: Register::Fp,
        src: Register::Sp,
    }];
    if !used_callee_saved.is_empty() {
        let regs: Vec<Register> = used_callee_saved.iter().map(|&n| Register::from_phys(n)).collect();
        v.push(Instruction::Push(regs));
    }
    for chunk in split_into_encodable_chunks(layout.frame_size) {
        v.push(Instruction::ArithImm {
            op: ArithOp::Sub,
            dst: Register::Sp,
            lhs: Register::Sp,
            imm: chunk,
        });
    }
    v
}

pub fn epilogue(layout: &FrameLayout, used_callee_saved: &Set<PhysRegNo>) -> Vec<Instruction> {
    let mut v = Vec::new();
    for chunk in split_into_encodable_chunks(layout.frame_size) {
        v.push(Instruction::ArithImm {
            op: ArithOp::Add,
            dst: Register::Sp,
            lhs: Register::Sp,
            imm: chunk,
        });
    }
    if !used_callee_saved.is_empty() {
        let regs: Vec<Register> = used_callee_saved.iter().map(|&n| Register::from_phys(n)).collect();
        v.push(Instruction::Pop(regs));
    }
    v.push(Instruction::Pop(vec![Register::Fp, Register::Lr]));
    v.push(Instruction::Bx { reg: Register::Lr });
    v
}

/// Spills the incoming register-passed parameters (`r0..=r3`) to their
/// stack slots right after the prologue, so every later reference to a
/// parameter — `FormalParam` or an `override_param` shadow alike — reads
/// from a stable frame location rather than assuming a register is still
/// live.
pub fn spill_incoming_register_params(function: &Function, layout: &FrameLayout) -> Vec<Instruction> {
    let mut v = Vec::new();
    for (i, p) in function.params.iter().enumerate().take(4) {
        let name = p.name().expect("a formal parameter is always named");
        let offset = layout.offset_of(name);
        let (setup, base, offset) = materialize_address(Register::Fp, offset);
        v.extend(setup);
        v.push(Instruction::Str {
            src: ARG_REGISTERS[i],
            base,
            offset,
        });
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;
    use crate::middle::module::Module;
    use crate::middle::types::Type;

    #[test]
    fn stack_params_get_positive_offsets_above_saved_fp_lr() {
        let mut m = Module::new();
        let params: Vec<(Id, Type)> = (0..6).map(|i| (intern(format!("p{i}")), Type::Int32)).collect();
        m.begin_function(intern("f"), Type::Void, &params, 1).unwrap();
        m.finish_function();
        let f = m.functions.get(&intern("f")).unwrap();
        let layout = FrameLayout::compute(f);
        assert_eq!(layout.offset_of(intern("p4")), 8);
        assert_eq!(layout.offset_of(intern("p5")), 12);
        assert!(layout.offset_of(intern("p0")) < 0);
    }

    #[test]
    fn frame_size_is_8_byte_aligned() {
        let mut m = Module::new();
        m.begin_function(intern("f"), Type::Int32, &[], 1).unwrap();
        m.new_local(Type::Int32, Some(intern("x")));
        m.finish_function();
        let f = m.functions.get(&intern("f")).unwrap();
        let layout = FrameLayout::compute(f);
        assert_eq!(layout.frame_size % 8, 0);
    }

    #[test]
    fn small_offsets_need_no_scratch_register() {
        let (setup, base, offset) = materialize_address(Register::Fp, -16);
        assert!(setup.is_empty());
        assert_eq!(base, Register::Fp);
        assert_eq!(offset, -16);
    }

    #[test]
    fn large_offsets_route_through_the_scratch_register() {
        let (setup, base, offset) = materialize_address(Register::Fp, 50_000);
        assert!(!setup.is_empty());
        assert_eq!(base, SCRATCH_REGISTER);
        assert_eq!(offset, 0);
    }
}
