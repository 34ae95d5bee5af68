//! Homogeneous concrete parse tree produced by the ODL parser.
//!
//! Each [`ParseNode`] records the grammar production it came from, the
//! principal token (operator, name, or literal), and its ordered children.
//! The tree is consumed by the AST builder and discarded afterwards.

use crate::diagnostic::SourceSpan;
use crate::lang::lexer::Token;

/// Grammar productions. Child layout conventions are fixed per production and
/// relied upon by the AST builder:
///
/// - `Program`: items
/// - `Function` (token = name): params, optional `TypeName` return, `Block` last
/// - `Param` (token = name): `TypeName`
/// - `TypeName` (token = base name): width expression for `Bits`/`Signed`
/// - `Block`: statements
/// - `DeclStmt`/`ConstDeclStmt` (token = name): `TypeName`, optional
///   `ArrayLen`, optional `Init`
/// - `ArrayLen` / `Init`: single wrapped expression
/// - `AssignStmt`: target expression, value expression
/// - `IfStmt`: condition, `Block`, optional else (`Block` or `IfStmt`)
/// - `ForStmt`: `DeclStmt`, condition, `AssignStmt` step, `Block`
/// - `WhileStmt`: condition, `Block`
/// - `ReturnStmt`: optional expression
/// - `ExprStmt`: expression
/// - `Ternary`: condition, then, else
/// - `Binary` (token = operator): lhs, rhs
/// - `Unary` (token = operator): operand
/// - `Cast`: `TypeName`, operand
/// - `Call` (token = callee): arguments
/// - `Index`: base, index
/// - `Slice`: base, high, low
/// - `CsrRef` (token = register name): no children
/// - `NumberLit` / `StringLit` / `BoolLit` / `Name` (token = literal/name)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    Program,
    Function,
    Param,
    TypeName,
    Block,
    DeclStmt,
    ConstDeclStmt,
    ArrayLen,
    Init,
    AssignStmt,
    IfStmt,
    ForStmt,
    WhileStmt,
    ReturnStmt,
    ExprStmt,
    Ternary,
    Binary,
    Unary,
    Cast,
    Call,
    Index,
    Slice,
    CsrRef,
    NumberLit,
    StringLit,
    BoolLit,
    Name,
}

#[derive(Debug, Clone)]
pub struct ParseNode {
    pub production: Production,
    pub token: Option<Token>,
    pub children: Vec<ParseNode>,
    pub span: SourceSpan,
}

impl ParseNode {
    pub fn new(production: Production, token: Option<Token>, span: SourceSpan) -> Self {
        Self {
            production,
            token,
            children: Vec::new(),
            span,
        }
    }

    pub fn with_children(
        production: Production,
        token: Option<Token>,
        span: SourceSpan,
        children: Vec<ParseNode>,
    ) -> Self {
        Self {
            production,
            token,
            children,
            span,
        }
    }

    /// The principal token's lexeme, or the empty string for tokenless nodes.
    pub fn lexeme(&self) -> &str {
        self.token.as_ref().map(|t| t.lexeme.as_str()).unwrap_or("")
    }

    pub fn child(&self, index: usize) -> &ParseNode {
        &self.children[index]
    }

    /// Index of the first child matching `production`, if any.
    pub fn find_child(&self, production: Production) -> Option<usize> {
        self.children
            .iter()
            .position(|child| child.production == production)
    }
}
