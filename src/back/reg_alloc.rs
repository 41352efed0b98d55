//! The register allocator (§4.8): strictly on-demand, no cross-instruction
//! liveness. Every IR value's true home is its stack slot (or, for
//! parameters 0..=3 and the callee's frame, a fixed location computed by
//! `back::emitter`); a physical register is only ever borrowed for the
//! lifetime of the single ARM32 instruction (or short fixed sequence)
//! `back::select` is emitting.
//!
//! This is deliberately the simplest allocator that works: no graph
//! coloring, no spill heuristics, because nothing is ever live across an
//! allocation boundary to begin with.

use crate::common::Set;
use crate::middle::value::PhysRegNo;

use super::asm::{Register, SCRATCH_REGISTER};

/// Registers the allocator hands out as working scratch space for a single
/// instruction's intermediate values. `r0`..`r3` are deliberately excluded —
/// they are the AAPCS argument/return registers (§6) and `back::select`
/// addresses them directly (`ARG_REGISTERS`, `Instruction::Exit`'s `r0`
/// move) rather than drawing them from this pool, so a value the allocator
/// hands out here is never aliased with one `select` is about to overwrite
/// for a call or a return. `r8` is unused, `r9` is the large-frame-offset
/// scratch register (`super::asm::SCRATCH_REGISTER`, never handed out here
/// except as the overflow fallback below), and `r11`/`r13`/`r14`/`r15` are
/// the frame pointer, stack pointer, link register, and program counter.
pub const ALLOCATABLE: [Register; 5] = [
    Register::R4,
    Register::R5,
    Register::R6,
    Register::R7,
    Register::R10,
];

pub fn is_callee_saved(r: Register) -> bool {
    matches!(
        r,
        Register::R4 | Register::R5 | Register::R6 | Register::R7 | Register::R10
    )
}

pub struct RegisterAllocator {
    pool: Vec<Register>,
    /// Every callee-saved register handed out at least once across the
    /// whole function, so the selector knows what the prologue/epilogue
    /// must push/pop.
    used_callee_saved: Set<PhysRegNo>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator {
            pool: Vec::new(),
            used_callee_saved: Set::new(),
        }
    }

    /// Start selecting a new IR instruction: every register is free again.
    pub fn begin_instruction(&mut self) {
        self.pool = ALLOCATABLE.to_vec();
        // Pop from the front so allocation order is deterministic and
        // matches reading order (r4, r5, r6, ...) — helpful when reading
        // generated assembly by eye.
        self.pool.reverse();
    }

    /// Borrow a scratch register, valid only until the next
    /// `begin_instruction` call. No single IR instruction this target
    /// selects ever needs more than `ALLOCATABLE.len()` values live at once
    /// (§4.8, §4.9); the rare instruction that allocates past that — a call
    /// with more than five outgoing arguments, spilling one at a time to the
    /// stack — only ever needs one *more* register at a time, each already
    /// consumed before the next is requested, so falling back to the fixed
    /// `SCRATCH_REGISTER` (r9) on pool exhaustion is safe rather than a sign
    /// the pool should grow.
    pub fn alloc(&mut self) -> Register {
        match self.pool.pop() {
            Some(r) => {
                if is_callee_saved(r) {
                    self.used_callee_saved.insert(r.to_phys());
                }
                r
            }
            None => SCRATCH_REGISTER,
        }
    }

    pub fn used_callee_saved(&self) -> &Set<PhysRegNo> {
        &self.used_callee_saved
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        RegisterAllocator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_resets_between_instructions() {
        let mut a = RegisterAllocator::new();
        a.begin_instruction();
        let first = a.alloc();
        a.begin_instruction();
        let second = a.alloc();
        assert_eq!(first, second);
    }

    #[test]
    fn allocation_order_is_deterministic() {
        let mut a = RegisterAllocator::new();
        a.begin_instruction();
        assert_eq!(a.alloc(), Register::R4);
        assert_eq!(a.alloc(), Register::R5);
    }

    #[test]
    fn tracks_callee_saved_registers_actually_used() {
        let mut a = RegisterAllocator::new();
        a.begin_instruction();
        for _ in 0..4 {
            a.alloc();
        }
        let r10 = a.alloc();
        assert_eq!(r10, Register::R10);
        assert!(a.used_callee_saved().contains(&Register::R10.to_phys()));
        assert!(a.used_callee_saved().contains(&Register::R4.to_phys()));
    }

    #[test]
    fn pool_exhaustion_falls_back_to_the_fixed_scratch_register() {
        let mut a = RegisterAllocator::new();
        a.begin_instruction();
        for _ in 0..ALLOCATABLE.len() {
            a.alloc();
        }
        assert_eq!(a.alloc(), SCRATCH_REGISTER);
    }
}
