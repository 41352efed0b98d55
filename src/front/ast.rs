//! The abstract syntax tree: the AST contract (§6) the core is specified
//! against. A node's opcode is drawn from a closed set; it carries ordered
//! children plus, for leaves, a payload (an integer literal, an identifier,
//! or a primitive type tag) and always a source line.
//!
//! The exact child arity/order per `NodeKind` is not pinned down by the
//! design document beyond the opcode set itself; the shapes chosen here
//! (documented per variant) are what `front::parse` produces and what
//! `middle::lower` consumes. They are a deliberate, consistent choice where
//! the source design left the layout open — see DESIGN.md.

use crate::common::{Id, Line};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    CompileUnit,
    FuncDef,
    FuncFormalParams,
    FuncFormalParam,
    FuncCall,
    FuncRealParams,
    Block,
    DeclStmt,
    VarDecl,
    ArrayDef,
    ArrayAccess,
    Assign,
    Return,
    If,
    IfElse,
    While,
    Break,
    Continue,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogicalAnd,
    LogicalOr,
    LogicalNot,
    LeafVarId,
    LeafLiteralUint,
    LeafType,
}

/// The primitive type tags a `LEAF_TYPE` node can carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimType {
    Int,
    Void,
}

/// Leaf payload, present only on `LEAF_*` nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    None,
    IntLiteral { value: u64, radix: u32 },
    Ident(Id),
    PrimType(PrimType),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
    pub line: Line,
    pub payload: Payload,
}

impl Node {
    pub fn new(kind: NodeKind, line: Line, children: Vec<Node>) -> Node {
        Node {
            kind,
            children,
            line,
            payload: Payload::None,
        }
    }

    pub fn leaf_var(name: Id, line: Line) -> Node {
        Node {
            kind: NodeKind::LeafVarId,
            children: vec![],
            line,
            payload: Payload::Ident(name),
        }
    }

    pub fn leaf_uint(value: u64, radix: u32, line: Line) -> Node {
        Node {
            kind: NodeKind::LeafLiteralUint,
            children: vec![],
            line,
            payload: Payload::IntLiteral { value, radix },
        }
    }

    pub fn leaf_type(ty: PrimType, line: Line) -> Node {
        Node {
            kind: NodeKind::LeafType,
            children: vec![],
            line,
            payload: Payload::PrimType(ty),
        }
    }

    pub fn ident(&self) -> Id {
        match &self.payload {
            Payload::Ident(id) => *id,
            other => panic!("expected LEAF_VAR_ID payload, found {other:?} on {:?}", self.kind),
        }
    }

    pub fn int_literal(&self) -> u64 {
        match &self.payload {
            Payload::IntLiteral { value, .. } => *value,
            other => panic!(
                "expected LEAF_LITERAL_UINT payload, found {other:?} on {:?}",
                self.kind
            ),
        }
    }

    pub fn prim_type(&self) -> PrimType {
        match &self.payload {
            Payload::PrimType(t) => *t,
            other => panic!("expected LEAF_TYPE payload, found {other:?} on {:?}", self.kind),
        }
    }
}

/// A compilation unit: an ordered sequence of top-level `FUNC_DEF`s and
/// global `DECL_STMT`/`ARRAY_DEF` declarations.
///
/// Node layouts this AST uses (opcode -> children, leaf payload excluded):
/// - `CompileUnit`: `[FuncDef | DeclStmt]*`
/// - `FuncDef`: `[LeafType(ret), LeafVarId(name), FuncFormalParams, Block]`
/// - `FuncFormalParams`: `[FuncFormalParam]*`
/// - `FuncFormalParam`: `[LeafType(elem), LeafVarId(name), LeafLiteralUint(dim)*]`
///   (zero dimension children: scalar parameter; one or more: an
///   array-as-pointer parameter. The first dimension child is always 0, a
///   sentinel standing in for the leading dimension C elides in a parameter
///   declaration (e.g. `int a[][4]`); any further children are the fixed
///   trailing dimensions. A real array dimension is never 0, so the
///   sentinel can't collide with a legitimate size.)
/// - `FuncCall`: `[LeafVarId(callee), FuncRealParams]`
/// - `FuncRealParams`: `[expr]*`
/// - `Block`: `[stmt]*`
/// - `DeclStmt`: `[VarDecl | ArrayDef]*` (supports `int a = 1, b;`)
/// - `VarDecl`: `[LeafType, LeafVarId, expr?]` (2 or 3 children; the
///   optional third child is the initializer)
/// - `ArrayDef`: `[LeafType(elem), LeafVarId(name), LeafLiteralUint(dim)+]`
/// - `ArrayAccess`: `[LeafVarId(base), expr(index)+]` (all subscripts of a
///   possibly multi-dimensional access flattened under one node)
/// - `Assign`: `[LeafVarId | ArrayAccess (lvalue), expr (rhs)]`
/// - `Return`: `[expr?]` (0 children for a `void` return)
/// - `If`: `[expr(cond), Block(then)]`
/// - `IfElse`: `[expr(cond), Block(then), Block(else)]`
/// - `While`: `[expr(cond), Block(body)]`
/// - `Break`, `Continue`: no children
/// - `Add`/`Sub`/`Mul`/`Div`/`Mod`/`Lt`/`Le`/`Gt`/`Ge`/`Eq`/`Ne`/`LogicalAnd`/
///   `LogicalOr`: `[lhs, rhs]`
/// - `Neg`, `LogicalNot`: `[operand]`
/// - `LeafVarId`, `LeafLiteralUint`, `LeafType`: leaves, no children
pub type Program = Node;
