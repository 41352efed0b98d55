//! The ARM32 (AAPCS) backend.
//!
//! Register allocation is folded into instruction selection (`back::select`
//! drives `back::reg_alloc`) the same way the source material's RISC-V
//! backend folds it into code generation: there is no separate liveness
//! analysis, every IR value's true home is a stack slot, and registers are
//! purely per-instruction staging.
//!
//! # Call stack frame
//!
//! The stack grows down. Each function frame uses the classic AAPCS
//! frame-pointer idiom:
//!
//! ```txt
//!   High memory addresses
//!
//!   +-------------------------+
//!   | Stack-passed arguments  |  (caller's outgoing-argument area,
//!   | (position >= 4)         |   positive offsets from fp)
//!   +-------------------------+
//!   | Saved lr                |
//!   | Saved fp                | <- fp (r11) points here
//!   +-------------------------+
//!   | Callee-saved registers  |  (negative offsets from fp)
//!   +-------------------------+
//!   | Locals                  |
//!   +-------------------------+
//!   | Outgoing call arguments |  (this function's own calls, position >= 4)
//!   +-------------------------+ <- sp
//!
//!   Low memory addresses
//! ```
//!
//! `r11` is the frame pointer (some ARM toolchains use `r7` in Thumb code;
//! this backend always targets the ARM instruction set, so `r11` is used
//! throughout — see DESIGN.md).
//!
//! # Calling convention (subset of AAPCS)
//!
//! - Arguments 0..=3 arrive in `r0..=r3`; arguments 4.. arrive on the
//!   caller's stack, above the saved `fp`/`lr` pair.
//! - The return value (if any) comes back in `r0`.
//! - `r4..=r10` are callee-saved; `r0..=r3` are caller-saved (scratch across
//!   calls). `r9` is reserved as a scratch register for materializing
//!   large stack offsets that do not fit a single `ldr`/`str` immediate.
//!   `r8` is unused. `r11` (fp), `r13` (sp), `r14` (lr) and `r15` (pc) are
//!   never handed to the allocator.

use crate::common::Id;

/// ARM32 general-purpose and special registers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    /// r11: frame pointer.
    Fp,
    /// r12: intra-procedure-call scratch register, unused by this backend.
    Ip,
    /// r13: stack pointer.
    Sp,
    /// r14: link register.
    Lr,
    /// r15: program counter.
    Pc,
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Register::*;
        match self {
            R0 => write!(f, "r0"),
            R1 => write!(f, "r1"),
            R2 => write!(f, "r2"),
            R3 => write!(f, "r3"),
            R4 => write!(f, "r4"),
            R5 => write!(f, "r5"),
            R6 => write!(f, "r6"),
            R7 => write!(f, "r7"),
            R8 => write!(f, "r8"),
            R9 => write!(f, "r9"),
            R10 => write!(f, "r10"),
            Fp => write!(f, "r11"),
            Ip => write!(f, "r12"),
            Sp => write!(f, "sp"),
            Lr => write!(f, "lr"),
            Pc => write!(f, "pc"),
        }
    }
}

/// Argument registers, in AAPCS order.
pub const ARG_REGISTERS: [Register; 4] = [Register::R0, Register::R1, Register::R2, Register::R3];

/// The register the allocator hands out for large-offset address
/// materialization; never placed in `reg_alloc`'s allocatable pool.
pub const SCRATCH_REGISTER: Register = Register::R9;

impl Register {
    /// The plain integer the IR layer (`middle::value::PhysRegNo`) uses to
    /// refer to this register, so `middle` need not depend on this module.
    pub fn to_phys(self) -> u8 {
        use Register::*;
        match self {
            R0 => 0,
            R1 => 1,
            R2 => 2,
            R3 => 3,
            R4 => 4,
            R5 => 5,
            R6 => 6,
            R7 => 7,
            R8 => 8,
            R9 => 9,
            R10 => 10,
            Fp => 11,
            Ip => 12,
            Sp => 13,
            Lr => 14,
            Pc => 15,
        }
    }

    pub fn from_phys(n: u8) -> Register {
        use Register::*;
        match n {
            0 => R0,
            1 => R1,
            2 => R2,
            3 => R3,
            4 => R4,
            5 => R5,
            6 => R6,
            7 => R7,
            8 => R8,
            9 => R9,
            10 => R10,
            11 => Fp,
            12 => Ip,
            13 => Sp,
            14 => Lr,
            15 => Pc,
            other => panic!("no ARM32 register numbered {other}"),
        }
    }
}

/// ARM condition codes. `CmpCond`'s six variants (`middle::ir::CmpCond`) map
/// onto these one-for-one — the mnemonic text is even the same string,
/// which is what makes the compare/branch fusion rule in `back::select` a
/// one-line translation rather than a table lookup.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Always — an unconditional branch, printed with no suffix at all.
    Al,
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Eq => write!(f, "eq"),
            Condition::Ne => write!(f, "ne"),
            Condition::Lt => write!(f, "lt"),
            Condition::Le => write!(f, "le"),
            Condition::Gt => write!(f, "gt"),
            Condition::Ge => write!(f, "ge"),
            Condition::Al => write!(f, ""),
        }
    }
}

impl From<crate::middle::ir::CmpCond> for Condition {
    fn from(c: crate::middle::ir::CmpCond) -> Condition {
        use crate::middle::ir::CmpCond::*;
        match c {
            Lt => Condition::Lt,
            Le => Condition::Le,
            Gt => Condition::Gt,
            Ge => Condition::Ge,
            Eq => Condition::Eq,
            Ne => Condition::Ne,
        }
    }
}

/// Arithmetic opcodes available as a three-operand (or two-operand-plus-
/// immediate) instruction. `Mod` is not in this list: it has no single ARM32
/// instruction and is selected as an `sdiv`/`mls` pair (see `back::select`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    /// `rsb` — reverse-subtract, used to select `-a` as `rsb dst, a, #0`.
    Rsb,
    Mul,
    Sdiv,
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArithOp::Add => write!(f, "add"),
            ArithOp::Sub => write!(f, "sub"),
            ArithOp::Rsb => write!(f, "rsb"),
            ArithOp::Mul => write!(f, "mul"),
            ArithOp::Sdiv => write!(f, "sdiv"),
        }
    }
}

/// Branch/call targets. Local targets are already fully qualified by
/// `back::select` (function name + IR label, e.g. `.Lmain_L3`) so that two
/// functions reusing the IR label `L3` do not collide in the flat assembly
/// namespace.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum JumpTarget {
    Local(Id),
    Global(Id),
}

impl std::fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JumpTarget::Local(id) => write!(f, "{id}"),
            JumpTarget::Global(id) => write!(f, "{id}"),
        }
    }
}

/// One selected ARM32 instruction (or directive-like pseudo-instruction).
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Instruction {
    Label(Id),
    Push(Vec<Register>),
    Pop(Vec<Register>),
    Mov {
        dst: Register,
        src: Register,
    },
    MovImm {
        dst: Register,
        imm: i32,
    },
    /// `movw dst, #imm` — bottom 16 bits of a constant, used together with
    /// `MovT` to materialize a frame offset too large for a `ldr`/`str`
    /// immediate (see `back::emitter::materialize_offset`).
    MovW {
        dst: Register,
        imm: u16,
    },
    /// `movt dst, #imm` — top 16 bits of a constant, added into `dst`'s
    /// existing bottom half.
    MovT {
        dst: Register,
        imm: u16,
    },
    /// `ldr dst, =name` — loads the address of a global symbol via the
    /// literal pool. The data section that symbol lives in is out of
    /// scope for this backend; it only ever emits the reference.
    LoadAddr {
        dst: Register,
        name: Id,
    },
    Ldr {
        dst: Register,
        base: Register,
        offset: i32,
    },
    Str {
        src: Register,
        base: Register,
        offset: i32,
    },
    Arith {
        op: ArithOp,
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    ArithImm {
        op: ArithOp,
        dst: Register,
        lhs: Register,
        imm: i32,
    },
    /// `mls dst, rm, rs, ra` = `ra - rm*rs`, used for `%` (see `back::select`).
    Mls {
        dst: Register,
        rm: Register,
        rs: Register,
        ra: Register,
    },
    Cmp {
        lhs: Register,
        rhs: Register,
    },
    CmpImm {
        lhs: Register,
        imm: i32,
    },
    /// `movCOND dst, #1` / `movCOND dst, #0` pair used to materialize a
    /// comparison into a 0/1 register when it isn't immediately consumed by
    /// a branch (the fusion rule in `back::select` avoids this whenever a
    /// `BranchCond` follows directly).
    MovCond {
        dst: Register,
        cond: Condition,
        imm: i32,
    },
    B {
        cond: Condition,
        target: JumpTarget,
    },
    Bl {
        target: JumpTarget,
    },
    Bx {
        reg: Register,
    },
    Comment(String),
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;
        match self {
            Label(name) => write!(f, "{name}:"),
            Push(regs) => write!(f, "push {{{}}}", join(regs)),
            Pop(regs) => write!(f, "pop {{{}}}", join(regs)),
            Mov { dst, src } => write!(f, "mov {dst}, {src}"),
            MovImm { dst, imm } => write!(f, "mov {dst}, #{imm}"),
            MovW { dst, imm } => write!(f, "movw {dst}, #{imm}"),
            MovT { dst, imm } => write!(f, "movt {dst}, #{imm}"),
            LoadAddr { dst, name } => write!(f, "ldr {dst}, ={name}"),
            Ldr { dst, base, offset } => write!(f, "ldr {dst}, [{base}, #{offset}]"),
            Str { src, base, offset } => write!(f, "str {src}, [{base}, #{offset}]"),
            Arith { op, dst, lhs, rhs } => write!(f, "{op} {dst}, {lhs}, {rhs}"),
            ArithImm { op, dst, lhs, imm } => write!(f, "{op} {dst}, {lhs}, #{imm}"),
            Mls { dst, rm, rs, ra } => write!(f, "mls {dst}, {rm}, {rs}, {ra}"),
            Cmp { lhs, rhs } => write!(f, "cmp {lhs}, {rhs}"),
            CmpImm { lhs, imm } => write!(f, "cmp {lhs}, #{imm}"),
            MovCond { dst, cond, imm } => write!(f, "mov{cond} {dst}, #{imm}"),
            B { cond: Condition::Al, target } => write!(f, "b {target}"),
            B { cond, target } => write!(f, "b{cond} {target}"),
            Bl { target } => write!(f, "bl {target}"),
            Bx { reg } => write!(f, "bx {reg}"),
            Comment(s) => write!(f, "@ {s}"),
        }
    }
}

fn join(regs: &[Register]) -> String {
    regs.iter().map(Register::to_string).collect::<Vec<_>>().join(", ")
}

/// One function's selected instructions. Unlike the IR layer, there is no
/// separate basic-block grouping: `back::select` consumes the IR's flat,
/// already-linearized instruction stream (inline `Label`s and all) and
/// produces a flat stream here in lockstep, one ARM32 instruction (or
/// short fixed sequence) per IR instruction.
pub struct Function {
    pub name: Id,
    pub instructions: Vec<Instruction>,
}

/// A complete assembled program: every function's text, ready to hand to an
/// (out-of-scope) assembler and linker. No data section: this backend never
/// emits `.data`/`.bss` — see the module doc comment.
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn asm_code(&self) -> String {
        let mut out = String::new();
        out.push_str(".text\n");
        for f in &self.functions {
            out.push_str(".global ");
            out.push_str(&f.name.to_string());
            out.push('\n');
            for inst in &f.instructions {
                if matches!(inst, Instruction::Label(_)) {
                    out.push_str(&format!("{inst}\n"));
                } else {
                    out.push_str(&format!("  {inst}\n"));
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconditional_branch_prints_without_suffix() {
        let inst = Instruction::B {
            cond: Condition::Al,
            target: JumpTarget::Local(crate::common::intern(".Lmain_L1")),
        };
        assert_eq!(inst.to_string(), "b .Lmain_L1");
    }

    #[test]
    fn conditional_branch_prints_condition_suffix() {
        let inst = Instruction::B {
            cond: Condition::Lt,
            target: JumpTarget::Local(crate::common::intern(".Lmain_L2")),
        };
        assert_eq!(inst.to_string(), "blt .Lmain_L2");
    }

    #[test]
    fn register_round_trips_through_phys_reg_no() {
        for n in 0u8..=15 {
            assert_eq!(Register::from_phys(n).to_phys(), n);
        }
    }
}
