//! The textual IR printer (§4.7): the golden-file oracle format used by
//! the test suite. Deterministic given a deterministic `Module` — nothing
//! here consults wall-clock time or hashes an address.

use std::fmt::Write as _;

use crate::common::Id;

use super::ir::{Function, Instruction, MoveMode};
use super::module::Module;
use super::types::Type;
use super::value::Value;

/// Renders an operand. Every `Value` variant uses its own `Display` *except*
/// `Constant`, which prints as a bare integer (`0`, not `#0`) in operand
/// position — the sigil is reserved for locals/globals so a reader can tell
/// a name from a literal at a glance.
fn operand(v: &Value) -> String {
    match v {
        Value::Constant(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn label(id: Id) -> String {
    format!(".{id}")
}

/// Renders one global declaration (§4.7). Arrays print as
/// `declare <elem> @name[d1][d2]…` — the bracket suffix carries the shape,
/// so there is no `= 0` initializer to print. Scalars print as
/// `declare <type> @name = 0`, the uniform zero-initializer this core
/// always asks the out-of-scope data-section emitter for.
fn print_global_decl(name: Id, ty: &Type) -> String {
    if ty.is_array() {
        let dims = ty.dimensions();
        let mut elem = ty;
        while let Type::Array { element, .. } = elem {
            elem = element;
        }
        let brackets: String = dims.iter().map(|d| format!("[{d}]")).collect();
        format!("declare {elem} @{name}{brackets}")
    } else {
        format!("declare {ty} @{name} = 0")
    }
}

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    for (name, global) in &module.globals {
        let Value::Global { ty, .. } = global else {
            unreachable!("Module::globals only ever holds Value::Global")
        };
        let _ = writeln!(out, "{}", print_global_decl(*name, ty));
    }
    if !module.globals.is_empty() && !module.functions.is_empty() {
        out.push('\n');
    }
    let mut first = true;
    for f in module.functions.values() {
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str(&print_function(f));
    }
    out
}

pub fn print_function(f: &Function) -> String {
    let mut out = String::new();
    let params = f
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty(), p))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "define {} @{}({}) {{", f.ret_type, f.name, params);
    for inst in &f.instructions {
        if let Some(line) = print_instruction(inst) {
            let _ = writeln!(out, "  {line}");
        }
    }
    out.push_str("}\n");
    out
}

/// Renders one instruction, or `None` for the two markers the printer
/// elides (`Entry`/`Exit` — the function's braces already stand for them).
fn print_instruction(inst: &Instruction) -> Option<String> {
    match inst {
        Instruction::Entry | Instruction::Exit(_) => None,
        Instruction::Label(name) => Some(format!("{}:", label(*name))),
        Instruction::Move {
            dst,
            src,
            mode: MoveMode::Scalar,
        } => Some(format!("{} = {}", dst, operand(src))),
        Instruction::Move {
            dst,
            src,
            mode: MoveMode::ArrayWrite,
        } => Some(format!("*{} = {}", dst, operand(src))),
        Instruction::Move {
            dst,
            src,
            mode: MoveMode::ArrayRead,
        } => Some(format!("{} = *{}", dst, operand(src))),
        Instruction::BinArith { op, dst, a, b: None } => {
            Some(format!("{} = {} {}", dst, op, operand(a)))
        }
        Instruction::BinArith { op, dst, a, b: Some(b) } => {
            Some(format!("{} = {} {}, {}", dst, op, operand(a), operand(b)))
        }
        Instruction::IntCmp { cond, dst, a, b } => {
            Some(format!("{} = icmp {} {}, {}", dst, cond, operand(a), operand(b)))
        }
        Instruction::BranchUncond { target } => Some(format!("br label {}", label(*target))),
        Instruction::BranchCond {
            cond,
            true_label,
            false_label,
        } => Some(format!(
            "bc {}, label {}, label {}",
            operand(cond),
            label(*true_label),
            label(*false_label)
        )),
        Instruction::Call { callee, args, result } => {
            let arglist = args.iter().map(operand).collect::<Vec<_>>().join(", ");
            match result {
                Some(dst) => Some(format!("{} = call @{}({})", dst, callee, arglist)),
                None => Some(format!("call @{}({})", callee, arglist)),
            }
        }
        Instruction::Arg { value, position } => Some(format!("arg {}, {}", position, operand(value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;
    use crate::middle::types::Type;

    #[test]
    fn empty_void_function_prints_braces_only() {
        let mut m = Module::new();
        m.begin_function(intern("main"), Type::Void, &[], 1).unwrap();
        let exit = m.current_function_ref().exit_label;
        m.current_function_mut().push(Instruction::Label(exit));
        m.current_function_mut().push(Instruction::Exit(None));
        m.finish_function();

        let text = print_function(m.functions.get(&intern("main")).unwrap());
        assert_eq!(text, "define void @main() {\n}\n");
    }

    #[test]
    fn move_of_a_constant_has_no_sigil() {
        let mut m = Module::new();
        m.begin_function(intern("f"), Type::Int32, &[], 1).unwrap();
        let slot = m.current_function_ref().return_slot.clone().unwrap();
        let zero = m.new_const(0);
        m.current_function_mut().push(Instruction::Move {
            dst: slot,
            src: zero,
            mode: MoveMode::Scalar,
        });
        let exit = m.current_function_ref().exit_label;
        m.current_function_mut().push(Instruction::Label(exit));
        m.current_function_mut().push(Instruction::Exit(None));
        m.finish_function();

        let text = print_function(m.functions.get(&intern("f")).unwrap());
        assert!(text.contains("%ret = 0"));
        assert!(!text.contains("#0"));
    }

    #[test]
    fn scalar_global_declaration_is_zero_initialized() {
        let mut m = Module::new();
        m.new_global(Type::Int32, intern("counter"), true);
        let text = print_module(&m);
        assert_eq!(text.trim(), "declare i32 @counter = 0");
    }

    #[test]
    fn array_global_declaration_uses_bracket_suffix_not_zero_initializer() {
        let mut m = Module::new();
        let ty = Type::array(Type::array(Type::Int32, 4), 3);
        m.new_global(ty, intern("a"), true);
        let text = print_module(&m);
        assert_eq!(text.trim(), "declare i32 @a[3][4]");
    }
}
