//! The tagged-union instruction model and per-function instruction list.
//!
//! The opcode tag set is closed: lowering (`middle::lower`) is the only
//! producer of instructions, and the printer (`middle::printer`) and the
//! selector (`back::select`) are the only consumers. Neither consumer
//! mutates an instruction once lowering has finished; the selector may only
//! decide, locally, to skip one (see the compare/branch fusion rule in
//! `back::select`).

use derive_more::Display;

use crate::common::{Id, Map, Set};

use super::types::Type;
use super::value::{PhysRegNo, Value};

/// Arithmetic opcodes. `Neg` is unary and uses only the `a` operand.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ArithOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("div")]
    SDiv,
    #[display("mod")]
    SMod,
    #[display("neg")]
    Neg,
}

/// Integer comparison conditions.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum CmpCond {
    #[display("lt")]
    Lt,
    #[display("le")]
    Le,
    #[display("gt")]
    Gt,
    #[display("ge")]
    Ge,
    #[display("eq")]
    Eq,
    #[display("ne")]
    Ne,
}

impl CmpCond {
    /// The condition that holds exactly when `self` does not.
    pub fn negate(self) -> CmpCond {
        match self {
            CmpCond::Lt => CmpCond::Ge,
            CmpCond::Le => CmpCond::Gt,
            CmpCond::Gt => CmpCond::Le,
            CmpCond::Ge => CmpCond::Lt,
            CmpCond::Eq => CmpCond::Ne,
            CmpCond::Ne => CmpCond::Eq,
        }
    }
}

/// The three flavors of `Move`, distinguished because they select
/// completely different ARM32 instructions (`mov`/`ldr`/`str` vs. the
/// array-element `ldr`/`str` pair).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MoveMode {
    /// `%dst = %src`
    Scalar,
    /// `*%dst = %src` — `dst` is an element address, `src` the stored value.
    ArrayWrite,
    /// `%dst = *%src` — `src` is an element address.
    ArrayRead,
}

/// One instruction, belonging to exactly one `Function`.
#[derive(Clone, Debug)]
pub enum Instruction {
    Label(Id),
    /// Marks the start of the function body; carries no operands.
    Entry,
    /// Marks the end of the function body. Carries the already-computed
    /// return value's home, if the function is non-`void` (see
    /// `Function::return_slot`).
    Exit(Option<Value>),
    Move {
        dst: Value,
        src: Value,
        mode: MoveMode,
    },
    BinArith {
        op: ArithOp,
        dst: Value,
        a: Value,
        /// `None` only for `Neg`.
        b: Option<Value>,
    },
    IntCmp {
        cond: CmpCond,
        dst: Value,
        a: Value,
        b: Value,
    },
    BranchUncond {
        target: Id,
    },
    BranchCond {
        cond: Value,
        true_label: Id,
        false_label: Id,
    },
    Call {
        callee: Id,
        args: Vec<Value>,
        result: Option<Value>,
    },
    /// Per-argument marker for platforms that need one. Never produced by
    /// `middle::lower` for the ARM32 target (argument lists travel on
    /// `Call` itself); kept only because the tag set is closed per the
    /// design and other backends may need it.
    Arg {
        value: Value,
        position: u32,
    },
}

impl Instruction {
    /// The value this instruction defines, if any. `Move` "defines" `dst`
    /// only in `Scalar`/`ArrayRead` mode; in `ArrayWrite` mode `dst` is an
    /// address being read, not a value being written.
    pub fn defined_value(&self) -> Option<&Value> {
        match self {
            Instruction::Move {
                dst,
                mode: MoveMode::Scalar | MoveMode::ArrayRead,
                ..
            } => Some(dst),
            Instruction::BinArith { dst, .. } => Some(dst),
            Instruction::IntCmp { dst, .. } => Some(dst),
            Instruction::Call {
                result: Some(result),
                ..
            } => Some(result),
            _ => None,
        }
    }

    /// Every value this instruction reads.
    pub fn used_values(&self) -> Vec<&Value> {
        match self {
            Instruction::Label(_) | Instruction::Entry | Instruction::BranchUncond { .. } => vec![],
            Instruction::Exit(v) => v.iter().collect(),
            Instruction::Move { dst, src, mode } => match mode {
                MoveMode::Scalar => vec![src],
                MoveMode::ArrayWrite => vec![dst, src],
                MoveMode::ArrayRead => vec![src],
            },
            Instruction::BinArith { a, b, .. } => {
                let mut v = vec![a];
                v.extend(b.iter());
                v
            }
            Instruction::IntCmp { a, b, .. } => vec![a, b],
            Instruction::BranchCond { cond, .. } => vec![cond],
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Arg { value, .. } => vec![value],
        }
    }

    /// Labels this instruction can transfer control to, for the
    /// branch-closure testable property (§8): every label named here must
    /// be the target of a `Label` instruction in the same function.
    pub fn referenced_labels(&self) -> Vec<Id> {
        match self {
            Instruction::BranchUncond { target } => vec![*target],
            Instruction::BranchCond {
                true_label,
                false_label,
                ..
            } => vec![*true_label, *false_label],
            _ => vec![],
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }
}

/// A function's signature, instruction list, and frame bookkeeping.
#[derive(Debug)]
pub struct Function {
    pub name: Id,
    pub ret_type: Type,
    /// Formal parameters in declaration order (mirrors `Instruction::Call`'s
    /// argument order at call sites).
    pub params: Vec<Value>,
    pub instructions: Vec<Instruction>,
    pub entry_label: Id,
    pub exit_label: Id,
    /// Absent for `void` functions.
    pub return_slot: Option<Value>,
    /// Every local ever created in this function (across all scopes),
    /// keyed by name, in creation order. The selector uses this to lay out
    /// the frame; scopes themselves are gone by the time the selector runs
    /// (lowering is the only component that needs scoping).
    pub locals: Vec<(Id, Type)>,
    /// Registers that must be saved/restored in the prologue/epilogue
    /// because the selector's register allocator handed them out at least
    /// once in this function.
    pub callee_saved: Set<PhysRegNo>,
    pub has_call: bool,
    /// The widest argument list at any call site in this function; sizes
    /// the outgoing-argument area of the frame.
    pub max_call_args: u32,
}

impl Function {
    pub fn new(
        name: Id,
        ret_type: Type,
        params: Vec<Value>,
        entry_label: Id,
        exit_label: Id,
        return_slot: Option<Value>,
    ) -> Self {
        Function {
            name,
            ret_type,
            params,
            instructions: Vec::new(),
            entry_label,
            exit_label,
            return_slot,
            locals: Vec::new(),
            callee_saved: Set::new(),
            has_call: false,
            max_call_args: 0,
        }
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn record_local(&mut self, name: Id, ty: Type) {
        self.locals.push((name, ty));
    }

    pub fn record_call(&mut self, arg_count: u32) {
        self.has_call = true;
        self.max_call_args = self.max_call_args.max(arg_count);
    }

    /// All label names this function defines. Used by the label-uniqueness
    /// testable property (§8).
    pub fn label_names(&self) -> Vec<Id> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Label(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Checks the label-uniqueness and branch-closure testable properties
    /// (§8). Returns the duplicated/missing label, if any.
    pub fn check_label_invariants(&self) -> Result<(), String> {
        let mut seen: Map<Id, ()> = Map::new();
        for name in self.label_names() {
            if seen.insert(name, ()).is_some() {
                return Err(format!("duplicate label '{name}' in function '{}'", self.name));
            }
        }
        let defined: Set<Id> = self.label_names().into_iter().collect();
        for inst in &self.instructions {
            for label in inst.referenced_labels() {
                if !defined.contains(&label) {
                    return Err(format!(
                        "branch to undefined label '{label}' in function '{}'",
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}
