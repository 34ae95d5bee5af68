//! Lowers the concrete parse tree into the typed AST.
//!
//! Exactly one AST node comes out of each parse-tree production, with the
//! source span preserved. Numeric literals are validated here: a sized
//! literal whose value overflows its declared width is rejected in this
//! stage, never deferred to the type checker.

use crate::diagnostic::{Diagnostic, DiagnosticPhase};
use crate::error::OdlError;
use crate::lang::ast::{Ast, AstNode, BinaryOp, Mutability, NodeKind, TypeSpec, UnaryOp};
use crate::lang::literal::Literal;
use crate::lang::tree::{ParseNode, Production};

pub struct AstBuilder;

impl AstBuilder {
    /// Builds a compilation unit from a `Program` parse tree.
    pub fn build_program(tree: &ParseNode) -> Result<Ast, OdlError> {
        debug_assert_eq!(tree.production, Production::Program);
        let mut items = Vec::with_capacity(tree.children.len());
        for child in &tree.children {
            items.push(Self::build_node(child)?);
        }
        Ok(Ast::new(tree.span.path.clone(), items))
    }

    /// Builds a single expression tree (the `eval` entry point).
    pub fn build_expression(tree: &ParseNode) -> Result<AstNode, OdlError> {
        Self::build_node(tree)
    }

    fn build_node(node: &ParseNode) -> Result<AstNode, OdlError> {
        let span = node.span.clone();
        let kind = match node.production {
            Production::NumberLit => Self::build_literal(node)?,
            Production::StringLit => NodeKind::StringLit {
                value: node.lexeme().to_string(),
            },
            Production::BoolLit => NodeKind::BoolLit {
                value: node.lexeme() == "true",
            },
            Production::Name => NodeKind::Identifier {
                name: node.lexeme().to_string(),
            },
            Production::Binary => NodeKind::Binary {
                op: Self::binary_op(node.lexeme()),
                lhs: Box::new(Self::build_node(node.child(0))?),
                rhs: Box::new(Self::build_node(node.child(1))?),
            },
            Production::Unary => NodeKind::Unary {
                op: Self::unary_op(node.lexeme()),
                operand: Box::new(Self::build_node(node.child(0))?),
            },
            Production::Ternary => NodeKind::Ternary {
                cond: Box::new(Self::build_node(node.child(0))?),
                then_expr: Box::new(Self::build_node(node.child(1))?),
                else_expr: Box::new(Self::build_node(node.child(2))?),
            },
            Production::Cast => NodeKind::Cast {
                spec: Self::build_type_spec(node.child(0))?,
                operand: Box::new(Self::build_node(node.child(1))?),
            },
            Production::Call => {
                let mut args = Vec::with_capacity(node.children.len());
                for arg in &node.children {
                    args.push(Self::build_node(arg)?);
                }
                NodeKind::Call {
                    callee: node.lexeme().to_string(),
                    args,
                }
            }
            Production::Index => NodeKind::Index {
                base: Box::new(Self::build_node(node.child(0))?),
                index: Box::new(Self::build_node(node.child(1))?),
            },
            Production::Slice => NodeKind::Slice {
                base: Box::new(Self::build_node(node.child(0))?),
                high: Box::new(Self::build_node(node.child(1))?),
                low: Box::new(Self::build_node(node.child(2))?),
            },
            Production::CsrRef => NodeKind::CsrRef {
                name: node.lexeme().to_string(),
            },
            Production::DeclStmt => Self::build_declaration(node, Mutability::Mutable)?,
            Production::ConstDeclStmt => Self::build_declaration(node, Mutability::Constant)?,
            Production::AssignStmt => NodeKind::Assign {
                target: Box::new(Self::build_node(node.child(0))?),
                value: Box::new(Self::build_node(node.child(1))?),
            },
            Production::IfStmt => NodeKind::If {
                cond: Box::new(Self::build_node(node.child(0))?),
                then_block: Box::new(Self::build_node(node.child(1))?),
                else_block: match node.children.get(2) {
                    Some(child) => Some(Box::new(Self::build_node(child)?)),
                    None => None,
                },
            },
            Production::ForStmt => {
                let mut init = Self::build_node(node.child(0))?;
                if let NodeKind::Decl { mutability, .. } = &mut init.kind {
                    *mutability = Mutability::LoopIndex;
                }
                NodeKind::For {
                    init: Box::new(init),
                    cond: Box::new(Self::build_node(node.child(1))?),
                    step: Box::new(Self::build_node(node.child(2))?),
                    body: Box::new(Self::build_node(node.child(3))?),
                }
            }
            Production::WhileStmt => NodeKind::While {
                cond: Box::new(Self::build_node(node.child(0))?),
                body: Box::new(Self::build_node(node.child(1))?),
            },
            Production::ReturnStmt => NodeKind::Return {
                value: match node.children.first() {
                    Some(child) => Some(Box::new(Self::build_node(child)?)),
                    None => None,
                },
            },
            Production::ExprStmt => {
                // An expression statement is its expression; no wrapper node.
                return Self::build_node(node.child(0));
            }
            Production::Block => {
                let mut statements = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    statements.push(Self::build_node(child)?);
                }
                NodeKind::Block { statements }
            }
            Production::Param => NodeKind::Param {
                name: node.lexeme().to_string(),
                spec: Self::build_type_spec(node.child(0))?,
            },
            Production::Function => {
                let mut params = Vec::new();
                let mut ret = TypeSpec::Void;
                let mut body = None;
                for child in &node.children {
                    match child.production {
                        Production::Param => params.push(Self::build_node(child)?),
                        Production::TypeName => ret = Self::build_type_spec(child)?,
                        Production::Block => body = Some(Self::build_node(child)?),
                        other => panic!("unexpected function child {other:?}"),
                    }
                }
                NodeKind::Function {
                    name: node.lexeme().to_string(),
                    params,
                    ret,
                    body: Box::new(body.expect("function body")),
                }
            }
            Production::Program
            | Production::TypeName
            | Production::ArrayLen
            | Production::Init => {
                panic!("production {:?} has no direct node mapping", node.production)
            }
        };
        Ok(AstNode::new(kind, span))
    }

    fn build_declaration(node: &ParseNode, mutability: Mutability) -> Result<NodeKind, OdlError> {
        let spec = Self::build_type_spec(node.child(0))?;
        let mut array_len = None;
        let mut init = None;
        for child in node.children.iter().skip(1) {
            match child.production {
                Production::ArrayLen => {
                    array_len = Some(Box::new(Self::build_node(child.child(0))?));
                }
                Production::Init => {
                    init = Some(Box::new(Self::build_node(child.child(0))?));
                }
                other => panic!("unexpected declaration child {other:?}"),
            }
        }
        Ok(NodeKind::Decl {
            name: node.lexeme().to_string(),
            spec,
            mutability,
            array_len,
            init,
        })
    }

    fn build_type_spec(node: &ParseNode) -> Result<TypeSpec, OdlError> {
        debug_assert_eq!(node.production, Production::TypeName);
        Ok(match node.lexeme() {
            "XReg" => TypeSpec::XReg,
            "Boolean" => TypeSpec::Boolean,
            "String" => TypeSpec::Str,
            "Bits" => TypeSpec::Bits(Box::new(Self::build_node(node.child(0))?)),
            "Signed" => TypeSpec::Signed(Box::new(Self::build_node(node.child(0))?)),
            other => panic!("unknown type name '{other}'"),
        })
    }

    fn build_literal(node: &ParseNode) -> Result<NodeKind, OdlError> {
        let literal = Literal::parse(node.lexeme()).map_err(|err| {
            OdlError::MalformedLiteral(Diagnostic::error(
                DiagnosticPhase::Builder,
                "builder.malformed-literal",
                err.to_string(),
                Some(node.span.clone()),
            ))
        })?;
        Ok(NodeKind::Literal {
            value: literal.value(),
            declared_width: literal.declared_width(),
        })
    }

    fn binary_op(lexeme: &str) -> BinaryOp {
        match lexeme {
            "||" => BinaryOp::LogicalOr,
            "&&" => BinaryOp::LogicalAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "&" => BinaryOp::BitAnd,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            other => panic!("unknown binary operator '{other}'"),
        }
    }

    fn unary_op(lexeme: &str) -> UnaryOp {
        match lexeme {
            "-" => UnaryOp::Neg,
            "!" => UnaryOp::Not,
            "~" => UnaryOp::BitNot,
            other => panic!("unknown unary operator '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::Parser;
    use std::path::PathBuf;

    fn build(src: &str) -> Ast {
        let mut parser = Parser::new(src, PathBuf::from("test.odl"));
        let tree = parser.parse_program().expect("parse");
        AstBuilder::build_program(&tree).expect("build")
    }

    fn build_err(src: &str) -> OdlError {
        let mut parser = Parser::new(src, PathBuf::from("test.odl"));
        let tree = parser.parse_program().expect("parse");
        AstBuilder::build_program(&tree).expect_err("should fail")
    }

    #[test]
    fn builds_untyped_nodes() {
        let ast = build("XReg a = X[1];");
        assert_eq!(ast.items.len(), 1);
        let decl = &ast.items[0];
        assert!(decl.ty.is_unknown(), "builder output carries no types");
        match &decl.kind {
            NodeKind::Decl { name, init, mutability, .. } => {
                assert_eq!(name, "a");
                assert_eq!(*mutability, Mutability::Mutable);
                let init = init.as_ref().expect("initializer");
                assert!(matches!(init.kind, NodeKind::Index { .. }));
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn sized_literal_overflow_fails_at_build_time() {
        let err = build_err("Bits<3> f = 3'd9;");
        match err {
            OdlError::MalformedLiteral(diag) => {
                assert_eq!(diag.code, "builder.malformed-literal");
                assert!(diag.message.contains("does not fit in 3 bit"), "{}", diag.message);
                let span = diag.span.expect("span");
                assert_eq!(span.start.line, 1);
            }
            other => panic!("expected malformed literal, got {other:?}"),
        }
    }

    #[test]
    fn literal_width_is_preserved() {
        let ast = build("Bits<8> f = 8'hFF;");
        match &ast.items[0].kind {
            NodeKind::Decl { init, .. } => match &init.as_ref().expect("init").kind {
                NodeKind::Literal { value, declared_width } => {
                    assert_eq!(*value, 255);
                    assert_eq!(*declared_width, Some(8));
                }
                other => panic!("expected literal, got {other:?}"),
            },
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn loop_variable_is_marked_as_index() {
        let ast = build("for (Bits<6> i = 0; i < 32; i = i + 1) { }");
        match &ast.items[0].kind {
            NodeKind::For { init, .. } => match &init.kind {
                NodeKind::Decl { mutability, .. } => {
                    assert_eq!(*mutability, Mutability::LoopIndex)
                }
                other => panic!("expected declaration, got {other:?}"),
            },
            other => panic!("expected for loop, got {other:?}"),
        }
    }

    #[test]
    fn constant_declarations_are_marked() {
        let ast = build("constant Bits<8> LIMIT = 31;");
        match &ast.items[0].kind {
            NodeKind::Decl { mutability, .. } => assert_eq!(*mutability, Mutability::Constant),
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn function_collects_params_return_and_body() {
        let ast = build("function clamp(XReg v, XReg hi) -> XReg { return v; }");
        match &ast.items[0].kind {
            NodeKind::Function { name, params, ret, body } => {
                assert_eq!(name, "clamp");
                assert_eq!(params.len(), 2);
                assert!(matches!(ret, TypeSpec::XReg));
                assert!(matches!(body.kind, NodeKind::Block { .. }));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }
}
