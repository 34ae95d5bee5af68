//! Typed abstract syntax tree produced by the AST builder.
//!
//! Nodes own their children exclusively. The `ty` slot is
//! [`Type::Unknown`](crate::check::types::Type::Unknown) until the checker
//! resolves it; a checked tree carries a resolved type on every node.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::check::types::Type;
use crate::diagnostic::SourceSpan;

/// A fully built ODL compilation unit.
#[derive(Debug, Clone)]
pub struct Ast {
    pub path: PathBuf,
    pub items: Vec<AstNode>,
}

impl Ast {
    pub fn new(path: PathBuf, items: Vec<AstNode>) -> Self {
        Self { path, items }
    }
}

#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: NodeKind,
    pub span: SourceSpan,
    pub ty: Type,
}

impl AstNode {
    pub fn new(kind: NodeKind, span: SourceSpan) -> Self {
        Self {
            kind,
            span,
            ty: Type::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogicalOr | BinaryOp::LogicalAnd)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }

    /// Operators whose operands promote to the wider common width.
    pub fn is_widening(self) -> bool {
        !self.is_logical() && !self.is_comparison() && !self.is_shift()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    Mutable,
    Constant,
    LoopIndex,
}

/// A source-level type annotation. Width expressions stay AST subtrees until
/// the checker folds them.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    XReg,
    Boolean,
    Str,
    Void,
    Bits(Box<AstNode>),
    Signed(Box<AstNode>),
}

impl TypeSpec {
    pub fn width_expr(&self) -> Option<&AstNode> {
        match self {
            TypeSpec::Bits(width) | TypeSpec::Signed(width) => Some(width),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Literal {
        value: u64,
        declared_width: Option<u16>,
    },
    StringLit {
        value: String,
    },
    BoolLit {
        value: bool,
    },
    Identifier {
        name: String,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<AstNode>,
    },
    Ternary {
        cond: Box<AstNode>,
        then_expr: Box<AstNode>,
        else_expr: Box<AstNode>,
    },
    Cast {
        spec: TypeSpec,
        operand: Box<AstNode>,
    },
    Call {
        callee: String,
        args: Vec<AstNode>,
    },
    /// Array element or register-file access; the checker decides which.
    Index {
        base: Box<AstNode>,
        index: Box<AstNode>,
    },
    /// Bitfield access `base[high:low]`.
    Slice {
        base: Box<AstNode>,
        high: Box<AstNode>,
        low: Box<AstNode>,
    },
    /// CSR access by name.
    CsrRef {
        name: String,
    },
    Decl {
        name: String,
        spec: TypeSpec,
        mutability: Mutability,
        array_len: Option<Box<AstNode>>,
        init: Option<Box<AstNode>>,
    },
    Assign {
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    If {
        cond: Box<AstNode>,
        then_block: Box<AstNode>,
        else_block: Option<Box<AstNode>>,
    },
    Block {
        statements: Vec<AstNode>,
    },
    For {
        init: Box<AstNode>,
        cond: Box<AstNode>,
        step: Box<AstNode>,
        body: Box<AstNode>,
    },
    While {
        cond: Box<AstNode>,
        body: Box<AstNode>,
    },
    Return {
        value: Option<Box<AstNode>>,
    },
    Param {
        name: String,
        spec: TypeSpec,
    },
    Function {
        name: String,
        params: Vec<AstNode>,
        ret: TypeSpec,
        body: Box<AstNode>,
    },
}
