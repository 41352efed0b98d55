//! Instruction selection (§4.9): turns each `middle::ir::Instruction` into
//! one or a short fixed sequence of ARM32 instructions, driving
//! `back::reg_alloc::RegisterAllocator` one IR instruction at a time.
//!
//! The one interesting piece of lookahead lives here: a `CmpCond` compare
//! immediately followed by a `BranchCond` that consumes its result is fused
//! into a single `cmp` + conditional branch, instead of materializing the
//! comparison into a 0/1 register first. `middle::ir::CmpCond` and
//! `back::asm::Condition` share the same six variants precisely so that
//! fusion is a one-line `From` conversion, not a lookup table.

use log::trace;

use crate::common::{intern, Id};
use crate::middle::ir::{ArithOp as IrArithOp, CmpCond, Function as IrFunction, Instruction as IrInstruction, MoveMode};
use crate::middle::module::Module;
use crate::middle::value::Value;

use super::asm::{
    ArithOp, Condition, Function as AsmFunction, Instruction, JumpTarget, Program, Register, ARG_REGISTERS,
};
use super::emitter::{self, materialize_address, FrameLayout};
use super::reg_alloc::RegisterAllocator;

pub fn select_program(module: &Module) -> Program {
    let functions = module.functions.values().map(select_function).collect();
    Program { functions }
}

/// A local IR label, qualified with its owning function so that two
/// functions reusing the same IR label name (labels are fresh-numbered per
/// function, see `Module::fresh_label`) don't collide in the flat assembly
/// namespace.
fn qualify(func: Id, label: Id) -> Id {
    intern(format!(".L{func}_{label}"))
}

fn load_immediate(dst: Register, n: i32) -> Vec<Instruction> {
    if (i16::MIN as i32..=i16::MAX as i32).contains(&n) {
        return vec![Instruction::MovImm { dst, imm: n }];
    }
    let bits = n as u32;
    let lo = (bits & 0xFFFF) as u16;
    let hi = (bits >> 16) as u16;
    let mut v = vec![Instruction::MovW { dst, imm: lo }];
    if hi != 0 {
        v.push(Instruction::MovT { dst, imm: hi });
    }
    v
}

/// Loads `v`'s value into a freshly allocated register, emitting whatever
/// instructions that takes. Array-typed locals/globals (element count > 0)
/// denote their own base address rather than their contents (§4.5): this is
/// the one place that distinction is realized as actual code, since every
/// other layer just carries the `Value` around uninterpreted.
fn load_value(v: &Value, alloc: &mut RegisterAllocator, layout: &FrameLayout, out: &mut Vec<Instruction>) -> Register {
    match v {
        Value::Constant(n) => {
            let r = alloc.alloc();
            out.extend(load_immediate(r, *n));
            r
        }
        Value::Global { name, ty, .. } => {
            let addr = alloc.alloc();
            out.push(Instruction::LoadAddr { dst: addr, name: *name });
            if ty.is_array() && !ty.is_array_param() {
                addr
            } else {
                let data = alloc.alloc();
                out.push(Instruction::Ldr {
                    dst: data,
                    base: addr,
                    offset: 0,
                });
                data
            }
        }
        Value::Local { name, ty, .. } | Value::FormalParam { name, ty, .. } => {
            let slot_offset = layout.offset_of(*name);
            let (setup, base, offset) = materialize_address(Register::Fp, slot_offset);
            let used_scratch = !setup.is_empty();
            out.extend(setup);
            if ty.is_array() && !ty.is_array_param() {
                if used_scratch && offset == 0 {
                    base
                } else {
                    let r = alloc.alloc();
                    out.push(Instruction::ArithImm {
                        op: ArithOp::Add,
                        dst: r,
                        lhs: base,
                        imm: offset,
                    });
                    r
                }
            } else {
                let r = alloc.alloc();
                out.push(Instruction::Ldr { dst: r, base, offset });
                r
            }
        }
        Value::TempMem { base, offset, .. } => {
            let r = alloc.alloc();
            out.push(Instruction::Ldr {
                dst: r,
                base: Register::from_phys(*base),
                offset: *offset,
            });
            r
        }
        Value::RegisterValue { reg, .. } => Register::from_phys(*reg),
    }
}

/// Stores `src`'s content into `v`'s home. `v` must be an addressable
/// destination (a `Local`, `FormalParam`, `TempMem`, or `Global`) —
/// `lower_lvalue` (`middle::lower`) never produces anything else as an
/// assignment target.
fn store_value(v: &Value, src: Register, alloc: &mut RegisterAllocator, layout: &FrameLayout, out: &mut Vec<Instruction>) {
    match v {
        Value::Local { name, .. } | Value::FormalParam { name, .. } => {
            let slot_offset = layout.offset_of(*name);
            let (setup, base, offset) = materialize_address(Register::Fp, slot_offset);
            out.extend(setup);
            out.push(Instruction::Str { src, base, offset });
        }
        Value::TempMem { base, offset, .. } => {
            out.push(Instruction::Str {
                src,
                base: Register::from_phys(*base),
                offset: *offset,
            });
        }
        Value::Global { name, .. } => {
            let addr = alloc.alloc();
            out.push(Instruction::LoadAddr { dst: addr, name: *name });
            out.push(Instruction::Str { src, base: addr, offset: 0 });
        }
        Value::Constant(_) | Value::RegisterValue { .. } => {
            unreachable!("'{v}' is never an assignment target")
        }
    }
}

/// Address an array element: `base` already holds the array's address,
/// `offset_reg` its byte offset. Used by `Move`'s `ArrayWrite`/`ArrayRead`
/// modes, whose `dst`/`src` operand is exactly that address (§4.5).
fn load_address_operand(v: &Value, alloc: &mut RegisterAllocator, layout: &FrameLayout, out: &mut Vec<Instruction>) -> Register {
    load_value(v, alloc, layout, out)
}

fn to_arith_op(op: IrArithOp) -> ArithOp {
    match op {
        IrArithOp::Add => ArithOp::Add,
        IrArithOp::Sub => ArithOp::Sub,
        IrArithOp::Mul => ArithOp::Mul,
        IrArithOp::SDiv => ArithOp::Sdiv,
        IrArithOp::SMod | IrArithOp::Neg => unreachable!("selected directly, not through to_arith_op"),
    }
}

fn select_function(function: &IrFunction) -> AsmFunction {
    let layout = FrameLayout::compute(function);
    let mut alloc = RegisterAllocator::new();
    let mut body = Vec::new();

    let insts = &function.instructions;
    let mut i = 0;
    while i < insts.len() {
        alloc.begin_instruction();
        match &insts[i] {
            IrInstruction::Label(id) => {
                body.push(Instruction::Label(qualify(function.name, *id)));
                i += 1;
            }
            IrInstruction::Entry => {
                i += 1;
            }
            IrInstruction::Exit(slot) => {
                if let Some(v) = slot {
                    let r = load_value(v, &mut alloc, &layout, &mut body);
                    if r != Register::R0 {
                        body.push(Instruction::Mov { dst: Register::R0, src: r });
                    }
                }
                body.extend(emitter::epilogue(&layout, alloc.used_callee_saved()));
                i += 1;
            }
            IrInstruction::Move { dst, src, mode } => {
                match mode {
                    MoveMode::Scalar => {
                        let r = load_value(src, &mut alloc, &layout, &mut body);
                        store_value(dst, r, &mut alloc, &layout, &mut body);
                    }
                    MoveMode::ArrayWrite => {
                        let addr = load_address_operand(dst, &mut alloc, &layout, &mut body);
                        let val = load_value(src, &mut alloc, &layout, &mut body);
                        body.push(Instruction::Str {
                            src: val,
                            base: addr,
                            offset: 0,
                        });
                    }
                    MoveMode::ArrayRead => {
                        let addr = load_address_operand(src, &mut alloc, &layout, &mut body);
                        let data = alloc.alloc();
                        body.push(Instruction::Ldr {
                            dst: data,
                            base: addr,
                            offset: 0,
                        });
                        store_value(dst, data, &mut alloc, &layout, &mut body);
                    }
                }
                i += 1;
            }
            IrInstruction::BinArith {
                op: IrArithOp::Neg,
                dst,
                a,
                ..
            } => {
                let ra = load_value(a, &mut alloc, &layout, &mut body);
                let rd = alloc.alloc();
                body.push(Instruction::ArithImm {
                    op: ArithOp::Rsb,
                    dst: rd,
                    lhs: ra,
                    imm: 0,
                });
                store_value(dst, rd, &mut alloc, &layout, &mut body);
                i += 1;
            }
            IrInstruction::BinArith {
                op: IrArithOp::SMod,
                dst,
                a,
                b,
            } => {
                let ra = load_value(a, &mut alloc, &layout, &mut body);
                let rb = load_value(b.as_ref().expect("SMod has two operands"), &mut alloc, &layout, &mut body);
                let q = alloc.alloc();
                body.push(Instruction::Arith {
                    op: ArithOp::Sdiv,
                    dst: q,
                    lhs: ra,
                    rhs: rb,
                });
                let rd = alloc.alloc();
                body.push(Instruction::Mls {
                    dst: rd,
                    rm: q,
                    rs: rb,
                    ra,
                });
                store_value(dst, rd, &mut alloc, &layout, &mut body);
                i += 1;
            }
            IrInstruction::BinArith { op, dst, a, b } => {
                let ra = load_value(a, &mut alloc, &layout, &mut body);
                let rb = load_value(b.as_ref().expect("only Neg lacks a second operand"), &mut alloc, &layout, &mut body);
                let rd = alloc.alloc();
                body.push(Instruction::Arith {
                    op: to_arith_op(*op),
                    dst: rd,
                    lhs: ra,
                    rhs: rb,
                });
                store_value(dst, rd, &mut alloc, &layout, &mut body);
                i += 1;
            }
            IrInstruction::IntCmp { cond, dst, a, b } => {
                if let Some(IrInstruction::BranchCond {
                    cond: branch_cond,
                    true_label,
                    false_label,
                }) = insts.get(i + 1)
                {
                    if branch_cond == dst {
                        trace!("fusing compare '{cond}' into branch at instruction {i}");
                        let ra = load_value(a, &mut alloc, &layout, &mut body);
                        let rb = load_value(b, &mut alloc, &layout, &mut body);
                        body.push(Instruction::Cmp { lhs: ra, rhs: rb });
                        body.push(Instruction::B {
                            cond: Condition::from(*cond),
                            target: JumpTarget::Local(qualify(function.name, *true_label)),
                        });
                        let falls_through_to_false_label =
                            matches!(insts.get(i + 2), Some(IrInstruction::Label(l)) if l == false_label);
                        if !falls_through_to_false_label {
                            body.push(Instruction::B {
                                cond: Condition::Al,
                                target: JumpTarget::Local(qualify(function.name, *false_label)),
                            });
                        }
                        i += 2;
                        continue;
                    }
                }
                let ra = load_value(a, &mut alloc, &layout, &mut body);
                let rb = load_value(b, &mut alloc, &layout, &mut body);
                body.push(Instruction::Cmp { lhs: ra, rhs: rb });
                let rd = alloc.alloc();
                body.push(Instruction::MovCond {
                    dst: rd,
                    cond: Condition::from(*cond),
                    imm: 1,
                });
                body.push(Instruction::MovCond {
                    dst: rd,
                    cond: Condition::from(cond.negate()),
                    imm: 0,
                });
                store_value(dst, rd, &mut alloc, &layout, &mut body);
                i += 1;
            }
            IrInstruction::BranchUncond { target } => {
                body.push(Instruction::B {
                    cond: Condition::Al,
                    target: JumpTarget::Local(qualify(function.name, *target)),
                });
                i += 1;
            }
            IrInstruction::BranchCond {
                cond,
                true_label,
                false_label,
            } => {
                let r = load_value(cond, &mut alloc, &layout, &mut body);
                body.push(Instruction::CmpImm { lhs: r, imm: 0 });
                body.push(Instruction::B {
                    cond: Condition::Ne,
                    target: JumpTarget::Local(qualify(function.name, *true_label)),
                });
                body.push(Instruction::B {
                    cond: Condition::Al,
                    target: JumpTarget::Local(qualify(function.name, *false_label)),
                });
                i += 1;
            }
            IrInstruction::Call { callee, args, result } => {
                for (pos, arg) in args.iter().enumerate() {
                    let r = load_value(arg, &mut alloc, &layout, &mut body);
                    if pos < 4 {
                        if r != ARG_REGISTERS[pos] {
                            body.push(Instruction::Mov {
                                dst: ARG_REGISTERS[pos],
                                src: r,
                            });
                        }
                    } else {
                        body.push(Instruction::Str {
                            src: r,
                            base: Register::Sp,
                            offset: 4 * (pos as i32 - 4),
                        });
                    }
                }
                body.push(Instruction::Bl {
                    target: JumpTarget::Global(*callee),
                });
                if let Some(dst) = result {
                    store_value(dst, Register::R0, &mut alloc, &layout, &mut body);
                }
                i += 1;
            }
            IrInstruction::Arg { .. } => {
                unreachable!("'Arg' is never produced by this target's lowering (args travel on 'Call')")
            }
        }
    }

    // The function's own name must be a real, callable assembly label (§6,
    // §4.9) — every `bl callee` elsewhere in the program targets this
    // symbol, not one of the `qualify`-prefixed internal branch labels.
    let mut instructions = vec![Instruction::Label(function.name)];
    instructions.extend(emitter::prologue(&layout, alloc.used_callee_saved()));
    instructions.extend(emitter::spill_incoming_register_params(function, &layout));
    instructions.extend(body);

    AsmFunction {
        name: function.name,
        instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;
    use crate::middle::module::Module;
    use crate::middle::types::Type;

    fn single_function_module(build: impl FnOnce(&mut Module)) -> Module {
        let mut m = Module::new();
        build(&mut m);
        m
    }

    #[test]
    fn empty_void_function_selects_to_bare_prologue_and_epilogue() {
        let m = single_function_module(|m| {
            m.begin_function(intern("f"), Type::Void, &[], 1).unwrap();
            let exit = m.current_function_ref().exit_label;
            m.current_function_mut().push(IrInstruction::Label(exit));
            m.current_function_mut().push(IrInstruction::Exit(None));
            m.finish_function();
        });
        let program = select_program(&m);
        let f = &program.functions[0];
        assert!(matches!(f.instructions.first(), Some(Instruction::Label(name)) if *name == intern("f")));
        assert!(matches!(f.instructions.get(1), Some(Instruction::Push(_))));
        assert!(matches!(f.instructions.last(), Some(Instruction::Bx { .. })));
    }

    #[test]
    fn compare_immediately_followed_by_branch_fuses_into_one_cmp() {
        let m = single_function_module(|m| {
            m.begin_function(intern("f"), Type::Void, &[], 1).unwrap();
            let a = m.new_const(1);
            let b = m.new_const(2);
            let c = m.new_local(Type::Bool, None);
            let t = m.fresh_label();
            let e = m.fresh_label();
            m.current_function_mut().push(IrInstruction::IntCmp {
                cond: CmpCond::Lt,
                dst: c.clone(),
                a,
                b,
            });
            m.current_function_mut().push(IrInstruction::BranchCond {
                cond: c,
                true_label: t,
                false_label: e,
            });
            m.current_function_mut().push(IrInstruction::Label(t));
            m.current_function_mut().push(IrInstruction::Label(e));
            let exit = m.current_function_ref().exit_label;
            m.current_function_mut().push(IrInstruction::Label(exit));
            m.current_function_mut().push(IrInstruction::Exit(None));
            m.finish_function();
        });
        let program = select_program(&m);
        let f = &program.functions[0];
        let cmp_count = f.instructions.iter().filter(|i| matches!(i, Instruction::Cmp { .. })).count();
        assert_eq!(cmp_count, 1);
        let mov_cond_count = f
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::MovCond { .. }))
            .count();
        assert_eq!(mov_cond_count, 0);
    }

    #[test]
    fn modulo_selects_as_sdiv_then_mls() {
        let m = single_function_module(|m| {
            m.begin_function(intern("f"), Type::Void, &[], 1).unwrap();
            let a = m.new_const(7);
            let b = m.new_const(3);
            let dst = m.new_local(Type::Int32, None);
            m.current_function_mut().push(IrInstruction::BinArith {
                op: IrArithOp::SMod,
                dst,
                a,
                b: Some(b),
            });
            let exit = m.current_function_ref().exit_label;
            m.current_function_mut().push(IrInstruction::Label(exit));
            m.current_function_mut().push(IrInstruction::Exit(None));
            m.finish_function();
        });
        let program = select_program(&m);
        let f = &program.functions[0];
        assert!(f.instructions.iter().any(|i| matches!(
            i,
            Instruction::Arith {
                op: ArithOp::Sdiv,
                ..
            }
        )));
        assert!(f.instructions.iter().any(|i| matches!(i, Instruction::Mls { .. })));
    }
}
