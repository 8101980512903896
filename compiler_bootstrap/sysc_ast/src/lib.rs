//! The typed AST data types handed to this backend by an external front-end.
//!
//! This crate defines *shape only*: plain, `serde`-serializable data carrying no lexing,
//! parsing, or semantic-analysis logic (all of that is an explicit Non-goal of this
//! backend). A front-end (or, for this workspace's own tests, a hand-built tree) produces
//! a [`Module`] and hands it to `sysc_ir::CodeGen`.

use serde::{Deserialize, Serialize};
use sysc_common::Span;

/// A source-level type, as assigned by the front-end's checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Int,
    Float,
    Void,
    Function { ret: Box<Type>, params: Vec<Type> },
    Array { base: Box<Type>, dims: Vec<i64> },
}

impl Type {
    /// Size in bytes, used by `Global`/`AllocaOp` sizing and `Globalize`'s >32-byte test.
    pub fn size_bytes(&self) -> i64 {
        match self {
            Type::Int | Type::Float => 4,
            Type::Void => 0,
            Type::Function { .. } => 8,
            Type::Array { base, dims } => base.size_bytes() * dims.iter().product::<i64>().max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Le,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
}

/// One function parameter: a name plus its declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A single statement or expression node. Kept as one recursive enum (mirroring the
/// front-end's single-hierarchy `ASTNode`, rather than splitting into separate
/// statement/expression trait objects) because every node here is a plain data carrier with
/// no behavior of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Int { value: i32, span: Span },
    Float { value: f32, span: Span },
    VarRef { name: String, span: Span },
    VarDecl { name: String, init: Box<Node>, mutable: bool, span: Span },
    Assign { name: String, value: Box<Node>, span: Span },
    Binary { op: BinaryOp, lhs: Box<Node>, rhs: Box<Node>, span: Span },
    Unary { op: UnaryOp, operand: Box<Node>, span: Span },
    Call { name: String, args: Vec<Node>, span: Span },
    Index { base: Box<Node>, index: Box<Node>, span: Span },
    Block { nodes: Vec<Node>, span: Span },
    /// Groups sibling `VarDecl`s from one statement without introducing a new scope
    /// (mirrors the front-end's `TransparentBlockNode`).
    TransparentBlock { decls: Vec<Node>, span: Span },
    If { cond: Box<Node>, then_branch: Box<Node>, else_branch: Option<Box<Node>>, span: Span },
    While { cond: Box<Node>, body: Box<Node>, span: Span },
    Break { span: Span },
    Continue { span: Span },
    Return { value: Option<Box<Node>>, span: Span },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Int { span, .. }
            | Node::Float { span, .. }
            | Node::VarRef { span, .. }
            | Node::VarDecl { span, .. }
            | Node::Assign { span, .. }
            | Node::Binary { span, .. }
            | Node::Unary { span, .. }
            | Node::Call { span, .. }
            | Node::Index { span, .. }
            | Node::Block { span, .. }
            | Node::TransparentBlock { span, .. }
            | Node::If { span, .. }
            | Node::While { span, .. }
            | Node::Break { span, .. }
            | Node::Continue { span, .. }
            | Node::Return { span, .. } => *span,
        }
    }

    /// Visits `self` and every descendant, pre-order (mirrors the front-end's `ASTWalker`).
    pub fn walk(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        match self {
            Node::VarDecl { init, .. } => init.walk(f),
            Node::Assign { value, .. } => value.walk(f),
            Node::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Node::Unary { operand, .. } => operand.walk(f),
            Node::Call { args, .. } => args.iter().for_each(|a| a.walk(f)),
            Node::Index { base, index, .. } => {
                base.walk(f);
                index.walk(f);
            }
            Node::Block { nodes, .. } => nodes.iter().for_each(|n| n.walk(f)),
            Node::TransparentBlock { decls, .. } => decls.iter().for_each(|n| n.walk(f)),
            Node::If { cond, then_branch, else_branch, .. } => {
                cond.walk(f);
                then_branch.walk(f);
                if let Some(e) = else_branch {
                    e.walk(f);
                }
            }
            Node::While { cond, body, .. } => {
                cond.walk(f);
                body.walk(f);
            }
            Node::Return { value, .. } => {
                if let Some(v) = value {
                    v.walk(f);
                }
            }
            Node::Int { .. } | Node::Float { .. } | Node::VarRef { .. } | Node::Break { .. } | Node::Continue { .. } => {}
        }
    }
}

/// A function declaration: the unit `CodeGen` lowers into a `FuncOp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Node,
    pub span: Span,
}

/// Top-level container: every function in the compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<FnDecl>,
}

impl Module {
    pub fn from_json(text: &str) -> Result<Self, sysc_common::SyscError> {
        serde_json::from_str(text).map_err(|e| sysc_common::SyscError::parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> Span {
        Span::dummy()
    }

    #[test]
    fn walk_visits_every_descendant() {
        let tree = Node::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Node::Int { value: 1, span: dummy() }),
            rhs: Box::new(Node::VarRef { name: "x".into(), span: dummy() }),
            span: dummy(),
        };
        let mut count = 0;
        tree.walk(&mut |_| count += 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn module_round_trips_through_json() {
        let module = Module {
            functions: vec![FnDecl {
                name: "main".into(),
                params: vec![],
                ret: Type::Int,
                body: Node::Block { nodes: vec![], span: dummy() },
                span: dummy(),
            }],
        };
        let text = serde_json::to_string(&module).unwrap();
        let back = Module::from_json(&text).unwrap();
        assert_eq!(back, module);
    }

    #[test]
    fn array_type_size_multiplies_dims() {
        let ty = Type::Array { base: Box::new(Type::Int), dims: vec![4, 2] };
        assert_eq!(ty.size_bytes(), 32);
    }
}
