//! Source-language front end: tokens, concrete parse tree, and AST.

pub mod ast;
pub mod builder;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod tree;

pub use ast::{Ast, AstNode, BinaryOp, Mutability, NodeKind, TypeSpec, UnaryOp};
pub use builder::AstBuilder;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
