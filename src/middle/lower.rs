//! IR lowering (§4.2–§4.6): walks the AST and appends instructions to the
//! module's current function.
//!
//! Values are emitted by direct, in-order recursion rather than by
//! threading an explicit `block_insts` scratch list through the AST (the
//! design notes describe the latter as the source's mechanism); a
//! structural recursive walk that appends to `Module::current_function_mut`
//! as it goes produces byte-identical instruction order for a tree-shaped
//! AST with no subtree reused, which is the only case that arises here.

use log::{debug, trace};

use crate::common::Id;
use crate::front::ast::{Node, NodeKind, PrimType};

use super::errors::CompileError;
use super::ir::{ArithOp, CmpCond, Instruction, MoveMode};
use super::module::Module;
use super::types::Type;
use super::value::Value;

/// Lower an entire compile unit. Returns the errors raised while lowering
/// each function; a function that errors is discarded from
/// `module.functions` (§4.10) but the rest of the unit is still attempted.
pub fn lower_program(module: &mut Module, unit: &Node) -> Vec<CompileError> {
    assert_eq!(unit.kind, NodeKind::CompileUnit);
    let mut errors = Vec::new();

    for top in &unit.children {
        match top.kind {
            NodeKind::FuncDef => {
                if let Err(e) = lower_function(module, top) {
                    debug!("discarding function after lowering error: {e}");
                    if let Some(name) = module.current_function_name() {
                        module.functions.remove(&name);
                    }
                    module.finish_function();
                    errors.push(e);
                }
            }
            NodeKind::DeclStmt => {
                if let Err(e) = lower_global_decls(module, top) {
                    errors.push(e);
                }
            }
            other => panic!("unexpected top-level node kind {other:?}"),
        }
    }
    errors
}

fn prim_type_to_type(node: &Node) -> Type {
    match node.prim_type() {
        PrimType::Int => Type::Int32,
        PrimType::Void => Type::Void,
    }
}

fn array_type_from_dims(elem: Type, dims: &[u32], leading_is_pointer: bool) -> Type {
    let mut ty = elem;
    for &d in dims.iter().skip(1).rev() {
        ty = Type::array(ty, d);
    }
    let leading = if leading_is_pointer { 0 } else { dims[0] };
    Type::array(ty, leading)
}

fn lower_global_decls(module: &mut Module, decl_stmt: &Node) -> Result<(), CompileError> {
    for decl in &decl_stmt.children {
        match decl.kind {
            NodeKind::VarDecl => {
                if decl.children.len() > 2 {
                    return Err(CompileError::TypeMismatch {
                        detail: "global variables cannot have initializers".into(),
                        line: decl.line,
                    });
                }
                let ty = prim_type_to_type(&decl.children[0]);
                let name = decl.children[1].ident();
                module.new_global(ty, name, true);
            }
            NodeKind::ArrayDef => {
                let ty = array_global_type(decl)?;
                let name = decl.children[1].ident();
                module.new_global(ty, name, true);
            }
            other => panic!("unexpected declarator kind {other:?}"),
        }
    }
    Ok(())
}

fn array_global_type(array_def: &Node) -> Result<Type, CompileError> {
    let elem = prim_type_to_type(&array_def.children[0]);
    let mut dims = Vec::new();
    for dim_node in &array_def.children[2..] {
        let v = dim_node.int_literal();
        if v == 0 || v > u32::MAX as u64 {
            return Err(CompileError::ArrayShape {
                detail: format!("array dimension must be a positive constant, found {v}"),
                line: dim_node.line,
            });
        }
        dims.push(v as u32);
    }
    Ok(array_type_from_dims(elem, &dims, false))
}

/// Per-function lowering context: the loop stack used by `break`/
/// `continue`, and the "inside a loop body" depth used to decide whether
/// array-address computations may be reused (they never are in this
/// implementation — every access freshly re-emits its address arithmetic —
/// but the depth is still tracked for fidelity with the design and because
/// a future CSE pass would need to consult it; see DESIGN.md).
struct LoweringCx {
    loop_stack: Vec<(Id, Id)>,
    loop_depth: u32,
}

impl LoweringCx {
    fn new() -> Self {
        LoweringCx {
            loop_stack: Vec::new(),
            loop_depth: 0,
        }
    }
}

fn lower_function(module: &mut Module, func_def: &Node) -> Result<(), CompileError> {
    let ret_type = prim_type_to_type(&func_def.children[0]);
    let name = func_def.children[1].ident();
    let formal_params = &func_def.children[2];
    let body = &func_def.children[3];

    let mut param_specs = Vec::new();
    for p in &formal_params.children {
        let elem = prim_type_to_type(&p.children[0]);
        let pname = p.children[1].ident();
        let dims: Vec<u32> = p.children[2..].iter().map(|d| d.int_literal() as u32).collect();
        // `dims[0]` is the elided-leading-dimension sentinel (always 0, see
        // `front::ast`); only the trailing, truly-fixed dimensions need to
        // be positive constants.
        for (d, node) in dims.iter().zip(&p.children[2..]).skip(1) {
            if *d == 0 {
                return Err(CompileError::ArrayShape {
                    detail: format!("array dimension must be a positive constant, found {d}"),
                    line: node.line,
                });
            }
        }
        let ty = if dims.is_empty() {
            elem
        } else {
            array_type_from_dims(elem, &dims, true)
        };
        param_specs.push((pname, ty));
    }

    debug!("lowering function '{name}' ({} params)", param_specs.len());
    module.begin_function(name, ret_type, &param_specs, func_def.line)?;

    let mut cx = LoweringCx::new();
    let result = lower_block(module, &mut cx, body);

    match result {
        Ok(()) => {
            let exit_label = module.current_function_ref().exit_label;
            module.current_function_mut().push(Instruction::Label(exit_label));
            let return_slot = module.current_function_ref().return_slot.clone();
            module.current_function_mut().push(Instruction::Exit(return_slot));
            module.finish_function();
            Ok(())
        }
        // Leave `current_function` set on error: `lower_program` still needs
        // it to discard the partially-lowered function from `module.functions`
        // before it calls `finish_function` itself (§4.10).
        Err(e) => Err(e),
    }
}

fn emit(module: &mut Module, inst: Instruction) {
    trace!("emit {inst:?}");
    module.current_function_mut().push(inst);
}

fn lower_block(module: &mut Module, cx: &mut LoweringCx, block: &Node) -> Result<(), CompileError> {
    assert_eq!(block.kind, NodeKind::Block);
    module.enter_scope();
    for stmt in &block.children {
        if let Err(e) = lower_stmt(module, cx, stmt) {
            module.leave_scope();
            return Err(e);
        }
    }
    module.leave_scope();
    Ok(())
}

fn lower_stmt(module: &mut Module, cx: &mut LoweringCx, stmt: &Node) -> Result<(), CompileError> {
    match stmt.kind {
        NodeKind::Block => lower_block(module, cx, stmt),
        NodeKind::DeclStmt => lower_local_decls(module, cx, stmt),
        NodeKind::Assign => lower_assign(module, cx, stmt),
        NodeKind::Return => lower_return(module, cx, stmt),
        NodeKind::If => lower_if(module, cx, stmt),
        NodeKind::IfElse => lower_if_else(module, cx, stmt),
        NodeKind::While => lower_while(module, cx, stmt),
        NodeKind::Break => lower_break_continue(module, cx, stmt, true),
        NodeKind::Continue => lower_break_continue(module, cx, stmt, false),
        NodeKind::FuncCall => {
            lower_call(module, cx, stmt)?;
            Ok(())
        }
        other => panic!("unexpected statement node kind {other:?}"),
    }
}

fn lower_local_decls(module: &mut Module, cx: &mut LoweringCx, decl_stmt: &Node) -> Result<(), CompileError> {
    for decl in &decl_stmt.children {
        match decl.kind {
            NodeKind::VarDecl => {
                let ty = prim_type_to_type(&decl.children[0]);
                let name = decl.children[1].ident();
                let local = module.new_local(ty, Some(name));
                if let Some(init) = decl.children.get(2) {
                    let rhs = lower_expr(module, cx, init)?;
                    emit(
                        module,
                        Instruction::Move {
                            dst: local,
                            src: rhs,
                            mode: MoveMode::Scalar,
                        },
                    );
                }
            }
            NodeKind::ArrayDef => {
                let ty = array_global_type(decl)?;
                let name = decl.children[1].ident();
                module.new_local(ty, Some(name));
            }
            other => panic!("unexpected declarator kind {other:?}"),
        }
    }
    Ok(())
}

/// The lvalue side of an assignment: either a plain identifier (possibly a
/// not-yet-overridden formal parameter, in which case the override is
/// created here — see §4.3) or an array element address.
enum LValue {
    Scalar(Value),
    ArrayElement(Value),
}

fn lower_assign(module: &mut Module, cx: &mut LoweringCx, assign: &Node) -> Result<(), CompileError> {
    let lhs_node = &assign.children[0];
    let rhs_node = &assign.children[1];

    // Right-then-left: the RHS is lowered first, against whatever binding
    // (formal parameter or existing local) is visible *before* a parameter
    // override is created (§4.2).
    let rhs_val = lower_expr(module, cx, rhs_node)?;
    let lvalue = lower_lvalue(module, cx, lhs_node)?;

    match lvalue {
        LValue::Scalar(dst) => emit(
            module,
            Instruction::Move {
                dst,
                src: rhs_val,
                mode: MoveMode::Scalar,
            },
        ),
        LValue::ArrayElement(addr) => emit(
            module,
            Instruction::Move {
                dst: addr,
                src: rhs_val,
                mode: MoveMode::ArrayWrite,
            },
        ),
    }
    Ok(())
}

fn lower_lvalue(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<LValue, CompileError> {
    match node.kind {
        NodeKind::LeafVarId => {
            let name = node.ident();
            if module.is_unshadowed_param(name) {
                Ok(LValue::Scalar(module.override_param(name)))
            } else {
                let v = module
                    .find_value(name)
                    .ok_or(CompileError::Undefined { name, line: node.line })?;
                Ok(LValue::Scalar(v))
            }
        }
        NodeKind::ArrayAccess => {
            let (addr, _elem_ty) = lower_array_address(module, cx, node)?;
            Ok(LValue::ArrayElement(addr))
        }
        other => panic!("unexpected lvalue node kind {other:?}"),
    }
}

fn lower_return(module: &mut Module, cx: &mut LoweringCx, ret: &Node) -> Result<(), CompileError> {
    let exit_label = module.current_function_ref().exit_label;
    if ret.children.is_empty() {
        emit(module, Instruction::BranchUncond { target: exit_label });
        return Ok(());
    }
    if module.current_function_ref().ret_type == Type::Void {
        return Err(CompileError::MisplacedControl {
            what: "return with a value inside a void function".into(),
            line: ret.line,
        });
    }
    let value = lower_expr(module, cx, &ret.children[0])?;
    let slot = module
        .current_function_ref()
        .return_slot
        .clone()
        .expect("non-void function always has a return slot");
    emit(
        module,
        Instruction::Move {
            dst: slot,
            src: value,
            mode: MoveMode::Scalar,
        },
    );
    emit(module, Instruction::BranchUncond { target: exit_label });
    Ok(())
}

fn lower_if(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<(), CompileError> {
    let cond = lower_expr(module, cx, &node.children[0])?;
    let l_then = module.fresh_label();
    let l_end = module.fresh_label();
    emit(
        module,
        Instruction::BranchCond {
            cond,
            true_label: l_then,
            false_label: l_end,
        },
    );
    emit(module, Instruction::Label(l_then));
    lower_block(module, cx, &node.children[1])?;
    emit(module, Instruction::Label(l_end));
    Ok(())
}

fn lower_if_else(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<(), CompileError> {
    let cond = lower_expr(module, cx, &node.children[0])?;
    let l_then = module.fresh_label();
    let l_else = module.fresh_label();
    let l_end = module.fresh_label();
    emit(
        module,
        Instruction::BranchCond {
            cond,
            true_label: l_then,
            false_label: l_else,
        },
    );
    emit(module, Instruction::Label(l_then));
    lower_block(module, cx, &node.children[1])?;
    emit(module, Instruction::BranchUncond { target: l_end });
    emit(module, Instruction::Label(l_else));
    lower_block(module, cx, &node.children[2])?;
    emit(module, Instruction::Label(l_end));
    Ok(())
}

fn lower_while(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<(), CompileError> {
    let l_start = module.fresh_label();
    let l_body = module.fresh_label();
    let l_end = module.fresh_label();

    emit(module, Instruction::Label(l_start));
    let cond = lower_expr(module, cx, &node.children[0])?;
    emit(
        module,
        Instruction::BranchCond {
            cond,
            true_label: l_body,
            false_label: l_end,
        },
    );
    emit(module, Instruction::Label(l_body));

    cx.loop_stack.push((l_start, l_end));
    cx.loop_depth += 1;
    let result = lower_block(module, cx, &node.children[1]);
    cx.loop_depth -= 1;
    cx.loop_stack.pop();
    result?;

    emit(module, Instruction::BranchUncond { target: l_start });
    emit(module, Instruction::Label(l_end));
    Ok(())
}

fn lower_break_continue(
    module: &mut Module,
    cx: &mut LoweringCx,
    node: &Node,
    is_break: bool,
) -> Result<(), CompileError> {
    let Some(&(start, end)) = cx.loop_stack.last() else {
        let what = if is_break { "break" } else { "continue" };
        return Err(CompileError::MisplacedControl {
            what: format!("'{what}' outside any loop"),
            line: node.line,
        });
    };
    let target = if is_break { end } else { start };
    emit(module, Instruction::BranchUncond { target });
    Ok(())
}

fn lower_expr(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<Value, CompileError> {
    use NodeKind::*;
    match node.kind {
        LeafVarId => {
            let name = node.ident();
            module
                .find_value(name)
                .ok_or(CompileError::Undefined { name, line: node.line })
        }
        LeafLiteralUint => Ok(module.new_const(node.int_literal() as i32)),
        ArrayAccess => {
            let (addr, elem_ty) = lower_array_address(module, cx, node)?;
            let tmp = module.new_local(elem_ty, None);
            emit(
                module,
                Instruction::Move {
                    dst: tmp.clone(),
                    src: addr,
                    mode: MoveMode::ArrayRead,
                },
            );
            Ok(tmp)
        }
        FuncCall => lower_call(module, cx, node),
        Add | Sub | Mul | Div | Mod => lower_arith(module, cx, node),
        Neg => lower_neg(module, cx, node),
        Lt | Le | Gt | Ge | Eq | Ne => lower_cmp(module, cx, node),
        LogicalAnd => lower_logical(module, cx, node, true),
        LogicalOr => lower_logical(module, cx, node, false),
        LogicalNot => lower_not(module, cx, node),
        other => panic!("unexpected expression node kind {other:?}"),
    }
}

fn arith_op(kind: NodeKind) -> ArithOp {
    match kind {
        NodeKind::Add => ArithOp::Add,
        NodeKind::Sub => ArithOp::Sub,
        NodeKind::Mul => ArithOp::Mul,
        NodeKind::Div => ArithOp::SDiv,
        NodeKind::Mod => ArithOp::SMod,
        other => panic!("{other:?} is not an arithmetic opcode"),
    }
}

fn cmp_cond(kind: NodeKind) -> CmpCond {
    match kind {
        NodeKind::Lt => CmpCond::Lt,
        NodeKind::Le => CmpCond::Le,
        NodeKind::Gt => CmpCond::Gt,
        NodeKind::Ge => CmpCond::Ge,
        NodeKind::Eq => CmpCond::Eq,
        NodeKind::Ne => CmpCond::Ne,
        other => panic!("{other:?} is not a comparison opcode"),
    }
}

fn lower_arith(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<Value, CompileError> {
    // Left-then-right (§4.2).
    let a = lower_expr(module, cx, &node.children[0])?;
    let b = lower_expr(module, cx, &node.children[1])?;
    let dst = module.new_local(Type::Int32, None);
    emit(
        module,
        Instruction::BinArith {
            op: arith_op(node.kind),
            dst: dst.clone(),
            a,
            b: Some(b),
        },
    );
    Ok(dst)
}

fn lower_neg(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<Value, CompileError> {
    let a = lower_expr(module, cx, &node.children[0])?;
    let dst = module.new_local(Type::Int32, None);
    emit(
        module,
        Instruction::BinArith {
            op: ArithOp::Neg,
            dst: dst.clone(),
            a,
            b: None,
        },
    );
    Ok(dst)
}

fn lower_cmp(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<Value, CompileError> {
    let a = lower_expr(module, cx, &node.children[0])?;
    let b = lower_expr(module, cx, &node.children[1])?;
    let dst = module.new_local(Type::Bool, None);
    emit(
        module,
        Instruction::IntCmp {
            cond: cmp_cond(node.kind),
            dst: dst.clone(),
            a,
            b,
        },
    );
    Ok(dst)
}

fn lower_not(module: &mut Module, cx: &mut LoweringCx, node: &Node) -> Result<Value, CompileError> {
    let a = lower_expr(module, cx, &node.children[0])?;
    let zero = module.new_const(0);
    let cmp = module.new_local(Type::Bool, None);
    emit(
        module,
        Instruction::IntCmp {
            cond: CmpCond::Eq,
            dst: cmp.clone(),
            a,
            b: zero,
        },
    );
    let wide = module.new_local(Type::Int32, None);
    emit(
        module,
        Instruction::Move {
            dst: wide.clone(),
            src: cmp,
            mode: MoveMode::Scalar,
        },
    );
    Ok(wide)
}

/// `&&` and `||` (§4.4). The two recipes are mirror images of each other:
/// for `&&` a false left operand short-circuits straight to `Lfalse`; for
/// `||` a true left operand short-circuits straight to `Ltrue`.
fn lower_logical(module: &mut Module, cx: &mut LoweringCx, node: &Node, is_and: bool) -> Result<Value, CompileError> {
    let result = module.new_local(Type::Int32, None);
    let l_cont = module.fresh_label();
    let l_true = module.fresh_label();
    let l_false = module.fresh_label();
    let l_end = module.fresh_label();
    let zero = module.new_const(0);

    let lhs = lower_expr(module, cx, &node.children[0])?;
    let lhs_nonzero = module.new_local(Type::Bool, None);
    emit(
        module,
        Instruction::IntCmp {
            cond: CmpCond::Ne,
            dst: lhs_nonzero.clone(),
            a: lhs,
            b: zero.clone(),
        },
    );
    let (first_true, first_false) = if is_and {
        (l_cont, l_false)
    } else {
        (l_true, l_cont)
    };
    emit(
        module,
        Instruction::BranchCond {
            cond: lhs_nonzero,
            true_label: first_true,
            false_label: first_false,
        },
    );
    emit(module, Instruction::Label(l_cont));

    let rhs = lower_expr(module, cx, &node.children[1])?;
    let rhs_nonzero = module.new_local(Type::Bool, None);
    emit(
        module,
        Instruction::IntCmp {
            cond: CmpCond::Ne,
            dst: rhs_nonzero.clone(),
            a: rhs,
            b: zero,
        },
    );
    emit(
        module,
        Instruction::BranchCond {
            cond: rhs_nonzero,
            true_label: l_true,
            false_label: l_false,
        },
    );

    emit(module, Instruction::Label(l_true));
    let one = module.new_const(1);
    emit(
        module,
        Instruction::Move {
            dst: result.clone(),
            src: one,
            mode: MoveMode::Scalar,
        },
    );
    emit(module, Instruction::BranchUncond { target: l_end });
    emit(module, Instruction::Label(l_false));
    let zero2 = module.new_const(0);
    emit(
        module,
        Instruction::Move {
            dst: result.clone(),
            src: zero2,
            mode: MoveMode::Scalar,
        },
    );
    emit(module, Instruction::Label(l_end));
    Ok(result)
}

fn lower_call(module: &mut Module, cx: &mut LoweringCx, call: &Node) -> Result<Value, CompileError> {
    let callee = call.children[0].ident();
    let real_params = &call.children[1];

    let mut args = Vec::with_capacity(real_params.children.len());
    for a in &real_params.children {
        args.push(lower_expr(module, cx, a)?);
    }

    let (ret_type, expected) = match module.find_function(callee) {
        Some(f) => (f.ret_type.clone(), f.params.len()),
        None => {
            return Err(CompileError::Undefined {
                name: callee,
                line: call.line,
            })
        }
    };
    if args.len() != expected {
        return Err(CompileError::ArityMismatch {
            callee,
            expected,
            got: args.len(),
            line: call.line,
        });
    }

    let result = if ret_type == Type::Void {
        None
    } else {
        Some(module.new_local(ret_type, None))
    };
    let arg_count = args.len() as u32;
    emit(
        module,
        Instruction::Call {
            callee,
            args,
            result: result.clone(),
        },
    );
    module.current_function_mut().record_call(arg_count);
    Ok(result.unwrap_or(Value::Constant(0)))
}

/// Computes the element address for an (possibly multi-dimensional) array
/// access, per §4.5. Returns the address value (typed `Pointer<element>`)
/// and the element type.
fn lower_array_address(module: &mut Module, cx: &mut LoweringCx, access: &Node) -> Result<(Value, Type), CompileError> {
    assert_eq!(access.kind, NodeKind::ArrayAccess);
    let base_name = access.children[0].ident();
    let base = module
        .find_value(base_name)
        .ok_or(CompileError::Undefined {
            name: base_name,
            line: access.line,
        })?;
    let base_ty = base.ty().clone();
    let dims = base_ty.dimensions();
    let index_nodes = &access.children[1..];
    let k = index_nodes.len();
    if k == 0 || k > dims.len() {
        return Err(CompileError::TypeMismatch {
            detail: format!(
                "'{base_name}' is indexed with {k} subscript(s) but has {} dimension(s)",
                dims.len()
            ),
            line: access.line,
        });
    }

    let mut acc: Option<Value> = None;
    for (j, idx_node) in index_nodes.iter().enumerate() {
        let idx_val = lower_expr(module, cx, idx_node)?;
        let coeff: u32 = dims[(j + 1)..].iter().product();
        let term = if coeff == 1 {
            idx_val
        } else {
            let coeff_const = module.new_const(coeff as i32);
            let t = module.new_local(Type::Int32, None);
            emit(
                module,
                Instruction::BinArith {
                    op: ArithOp::Mul,
                    dst: t.clone(),
                    a: idx_val,
                    b: Some(coeff_const),
                },
            );
            t
        };
        acc = Some(match acc {
            None => term,
            Some(prev) => {
                let s = module.new_local(Type::Int32, None);
                emit(
                    module,
                    Instruction::BinArith {
                        op: ArithOp::Add,
                        dst: s.clone(),
                        a: prev,
                        b: Some(term),
                    },
                );
                s
            }
        });
    }
    let index = acc.expect("at least one subscript");

    let four = module.new_const(4);
    let byte_offset = module.new_local(Type::Int32, None);
    emit(
        module,
        Instruction::BinArith {
            op: ArithOp::Mul,
            dst: byte_offset.clone(),
            a: index,
            b: Some(four),
        },
    );

    let mut elem_ty = &base_ty;
    for _ in 0..k {
        elem_ty = elem_ty.element_type().expect("checked dims above");
    }
    let elem_ty = elem_ty.clone();

    let addr = module.new_local(Type::pointer(elem_ty.clone()), None);
    emit(
        module,
        Instruction::BinArith {
            op: ArithOp::Add,
            dst: addr.clone(),
            a: base,
            b: Some(byte_offset),
        },
    );
    let _ = cx.loop_depth; // tracked for fidelity; see module doc comment above
    Ok((addr, elem_ty))
}
