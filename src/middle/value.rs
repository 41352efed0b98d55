//! Operand identities: constants, globals, locals, formal parameters,
//! explicit memory slots, and pre-bound physical registers.

use derive_more::Display;

use crate::common::Id;

use super::types::Type;

/// A physical register index. Opaque to `middle` so that this module does
/// not need to depend on the ARM32 register file defined in `back::asm`;
/// `back::asm::Register` knows how to convert to and from this number.
pub type PhysRegNo = u8;

/// Every operand in the IR. See the data-model notes in `SPEC_FULL.md` §3
/// for the invariants each variant carries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Value {
    /// An immutable constant, deduplicated per integer value within a
    /// module (see `middle::module::Module::new_const`).
    #[display("#{_0}")]
    Constant(i32),
    /// A process-lifetime global. `init_zero` records whether the
    /// out-of-scope data-section emitter should zero- or value-initialize
    /// it; the core never reads it.
    #[display("@{name}")]
    Global {
        name: Id,
        ty: Type,
        init_zero: bool,
    },
    /// A local, living in the current function's frame.
    #[display("%{name}")]
    Local {
        name: Id,
        ty: Type,
        scope_depth: u32,
    },
    /// The value delivered by the caller. Positions 0..=3 arrive in
    /// registers, positions >= 4 arrive on the caller's stack.
    #[display("%{name}")]
    FormalParam { name: Id, ty: Type, position: u32 },
    /// An explicit memory slot, used by the backend to stage outgoing call
    /// arguments beyond the fourth. Never produced by `middle::lower`.
    #[display("[{base}, #{offset}]")]
    TempMem {
        ty: Type,
        base: PhysRegNo,
        offset: i32,
    },
    /// A value pre-bound to a specific physical register, used by the
    /// backend to model `r0..r3` at call sites. Never produced by
    /// `middle::lower`.
    #[display("r{reg}")]
    RegisterValue { ty: Type, reg: PhysRegNo },
}

impl Value {
    pub fn ty(&self) -> &Type {
        match self {
            Value::Constant(_) => &CONST_TYPE,
            Value::Global { ty, .. }
            | Value::Local { ty, .. }
            | Value::FormalParam { ty, .. }
            | Value::TempMem { ty, .. }
            | Value::RegisterValue { ty, .. } => ty,
        }
    }

    /// The identifier used to key this value in scopes/maps, when it has
    /// one (constants, memory slots, and register-bound values do not).
    pub fn name(&self) -> Option<Id> {
        match self {
            Value::Global { name, .. } | Value::Local { name, .. } | Value::FormalParam { name, .. } => {
                Some(*name)
            }
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }
}

// `Value::Constant` always carries an `i32`, so its type is a fixed
// constant; store it once rather than allocating on every `ty()` call.
static CONST_TYPE: Type = Type::Int32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms_match_textual_ir_sigils() {
        assert_eq!(Value::Constant(42).to_string(), "#42");
        let g = Value::Global {
            name: crate::common::intern("counter"),
            ty: Type::Int32,
            init_zero: true,
        };
        assert_eq!(g.to_string(), "@counter");
        let l = Value::Local {
            name: crate::common::intern("x"),
            ty: Type::Int32,
            scope_depth: 1,
        };
        assert_eq!(l.to_string(), "%x");
    }
}
