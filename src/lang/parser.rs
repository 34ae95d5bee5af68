//! Recursive-descent parser from token stream to concrete parse tree.
//!
//! Parsing is total: every input either yields a full tree or fails fast with
//! a syntax diagnostic naming the offending position and the expected token.

use std::path::PathBuf;

use crate::diagnostic::{Diagnostic, DiagnosticPhase, SourcePosition, SourceSpan};
use crate::error::OdlError;
use crate::lang::lexer::{Lexer, Token, TokenKind};
use crate::lang::tree::{ParseNode, Production};

const TYPE_KEYWORDS: &[&str] = &["XReg", "Bits", "Signed", "Boolean", "String"];

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    peeked: Option<Token>,
    peeked2: Option<Token>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, path: PathBuf) -> Self {
        Self {
            lexer: Lexer::new(source, path),
            peeked: None,
            peeked2: None,
        }
    }

    /// Parses a whole program: functions and top-level statements.
    pub fn parse_program(&mut self) -> Result<ParseNode, OdlError> {
        let span = self.span_here()?;
        let mut items = Vec::new();
        while !self.check(TokenKind::EOF)? {
            items.push(self.parse_item()?);
        }
        Ok(ParseNode::with_children(
            Production::Program,
            None,
            span,
            items,
        ))
    }

    /// Parses a single expression followed by end-of-input.
    pub fn parse_expression_only(&mut self) -> Result<ParseNode, OdlError> {
        let expr = self.parse_expression()?;
        if !self.check(TokenKind::EOF)? {
            let token = self.consume()?;
            return Err(self.unexpected(&token, "end of expression"));
        }
        Ok(expr)
    }

    fn parse_item(&mut self) -> Result<ParseNode, OdlError> {
        if self.check_lexeme("function")? {
            return self.parse_function();
        }
        self.parse_statement()
    }

    fn parse_function(&mut self) -> Result<ParseNode, OdlError> {
        let keyword = self.expect(TokenKind::Identifier, "'function'")?;
        let span = self.token_span(&keyword);
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.expect(TokenKind::LParen, "'(' after function name")?;
        let mut children = Vec::new();
        if !self.check(TokenKind::RParen)? {
            loop {
                children.push(self.parse_param()?);
                if self.match_token(TokenKind::Comma)? {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' to close parameter list")?;
        if self.match_token(TokenKind::Arrow)? {
            children.push(self.parse_type_name()?);
        }
        children.push(self.parse_block()?);
        Ok(ParseNode::with_children(
            Production::Function,
            Some(name),
            span,
            children,
        ))
    }

    fn parse_param(&mut self) -> Result<ParseNode, OdlError> {
        let ty = self.parse_type_name()?;
        let name = self.expect(TokenKind::Identifier, "parameter name")?;
        let span = self.token_span(&name);
        Ok(ParseNode::with_children(
            Production::Param,
            Some(name),
            span,
            vec![ty],
        ))
    }

    fn parse_type_name(&mut self) -> Result<ParseNode, OdlError> {
        let token = self.expect(TokenKind::Identifier, "type name")?;
        if !TYPE_KEYWORDS.contains(&token.lexeme.as_str()) {
            return Err(self.unexpected(&token, "type name"));
        }
        let span = self.token_span(&token);
        let mut children = Vec::new();
        if token.lexeme == "Bits" || token.lexeme == "Signed" {
            self.expect(TokenKind::LessThan, "'<' after width-parameterized type")?;
            // Width expressions stop at the additive tier so the closing '>'
            // is never eaten as a relational operator; parenthesize for more.
            children.push(self.parse_additive()?);
            self.expect(TokenKind::GreaterThan, "'>' to close type width")?;
        }
        Ok(ParseNode::with_children(
            Production::TypeName,
            Some(token),
            span,
            children,
        ))
    }

    fn parse_block(&mut self) -> Result<ParseNode, OdlError> {
        let open = self.expect(TokenKind::LBrace, "'{' to open block")?;
        let span = self.token_span(&open);
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace)? {
            if self.check(TokenKind::EOF)? {
                let token = self.consume()?;
                return Err(self.unexpected(&token, "'}' to close block"));
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}' to close block")?;
        Ok(ParseNode::with_children(
            Production::Block,
            None,
            span,
            statements,
        ))
    }

    fn parse_statement(&mut self) -> Result<ParseNode, OdlError> {
        if self.check_lexeme("if")? {
            return self.parse_if();
        }
        if self.check_lexeme("for")? {
            return self.parse_for();
        }
        if self.check_lexeme("while")? {
            return self.parse_while();
        }
        if self.check_lexeme("return")? {
            return self.parse_return();
        }
        if self.check_lexeme("constant")? {
            self.consume()?;
            return self.parse_declaration(Production::ConstDeclStmt);
        }
        if self.peek_is_type_name()? {
            return self.parse_declaration(Production::DeclStmt);
        }

        let expr = self.parse_expression()?;
        if self.check(TokenKind::Equals)? {
            self.consume()?;
            let value = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "';' after assignment")?;
            let span = expr.span.clone();
            return Ok(ParseNode::with_children(
                Production::AssignStmt,
                None,
                span,
                vec![expr, value],
            ));
        }
        self.expect(TokenKind::Semicolon, "';' after expression")?;
        let span = expr.span.clone();
        Ok(ParseNode::with_children(
            Production::ExprStmt,
            None,
            span,
            vec![expr],
        ))
    }

    /// A declaration starts with a type name; the leading `constant` keyword
    /// has already been consumed when `production` is `ConstDeclStmt`.
    fn parse_declaration(&mut self, production: Production) -> Result<ParseNode, OdlError> {
        let ty = self.parse_type_name()?;
        let name = self.expect(TokenKind::Identifier, "declaration name")?;
        let span = self.token_span(&name);
        let mut children = vec![ty];
        if self.match_token(TokenKind::LBracket)? {
            let len = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "']' to close array length")?;
            let len_span = len.span.clone();
            children.push(ParseNode::with_children(
                Production::ArrayLen,
                None,
                len_span,
                vec![len],
            ));
        }
        if self.match_token(TokenKind::Equals)? {
            let init = self.parse_expression()?;
            let init_span = init.span.clone();
            children.push(ParseNode::with_children(
                Production::Init,
                None,
                init_span,
                vec![init],
            ));
        }
        self.expect(TokenKind::Semicolon, "';' after declaration")?;
        Ok(ParseNode::with_children(production, Some(name), span, children))
    }

    fn parse_if(&mut self) -> Result<ParseNode, OdlError> {
        let keyword = self.expect(TokenKind::Identifier, "'if'")?;
        let span = self.token_span(&keyword);
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' to close condition")?;
        let then_block = self.parse_block()?;
        let mut children = vec![cond, then_block];
        if self.check_lexeme("else")? {
            self.consume()?;
            if self.check_lexeme("if")? {
                children.push(self.parse_if()?);
            } else {
                children.push(self.parse_block()?);
            }
        }
        Ok(ParseNode::with_children(
            Production::IfStmt,
            None,
            span,
            children,
        ))
    }

    fn parse_for(&mut self) -> Result<ParseNode, OdlError> {
        let keyword = self.expect(TokenKind::Identifier, "'for'")?;
        let span = self.token_span(&keyword);
        self.expect(TokenKind::LParen, "'(' after 'for'")?;
        if !self.peek_is_type_name()? {
            let token = self.consume()?;
            return Err(self.unexpected(&token, "loop variable declaration"));
        }
        let init = self.parse_declaration(Production::DeclStmt)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after loop condition")?;
        let step_target = self.parse_expression()?;
        self.expect(TokenKind::Equals, "'=' in loop step")?;
        let step_value = self.parse_expression()?;
        let step_span = step_target.span.clone();
        let step = ParseNode::with_children(
            Production::AssignStmt,
            None,
            step_span,
            vec![step_target, step_value],
        );
        self.expect(TokenKind::RParen, "')' to close loop header")?;
        let body = self.parse_block()?;
        Ok(ParseNode::with_children(
            Production::ForStmt,
            None,
            span,
            vec![init, cond, step, body],
        ))
    }

    fn parse_while(&mut self) -> Result<ParseNode, OdlError> {
        let keyword = self.expect(TokenKind::Identifier, "'while'")?;
        let span = self.token_span(&keyword);
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' to close condition")?;
        let body = self.parse_block()?;
        Ok(ParseNode::with_children(
            Production::WhileStmt,
            None,
            span,
            vec![cond, body],
        ))
    }

    fn parse_return(&mut self) -> Result<ParseNode, OdlError> {
        let keyword = self.expect(TokenKind::Identifier, "'return'")?;
        let span = self.token_span(&keyword);
        let mut children = Vec::new();
        if !self.check(TokenKind::Semicolon)? {
            children.push(self.parse_expression()?);
        }
        self.expect(TokenKind::Semicolon, "';' after return")?;
        Ok(ParseNode::with_children(
            Production::ReturnStmt,
            None,
            span,
            children,
        ))
    }

    fn parse_expression(&mut self) -> Result<ParseNode, OdlError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<ParseNode, OdlError> {
        let cond = self.parse_logical_or()?;
        if self.match_token(TokenKind::Question)? {
            let then_expr = self.parse_expression()?;
            self.expect(TokenKind::Colon, "':' in conditional expression")?;
            let else_expr = self.parse_expression()?;
            let span = cond.span.clone();
            return Ok(ParseNode::with_children(
                Production::Ternary,
                None,
                span,
                vec![cond, then_expr, else_expr],
            ));
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_logical_and()?;
        while self.check(TokenKind::DoublePipe)? {
            let op = self.consume()?;
            let rhs = self.parse_logical_and()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_bit_or()?;
        while self.check(TokenKind::DoubleAmpersand)? {
            let op = self.consume()?;
            let rhs = self.parse_bit_or()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bit_or(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_bit_xor()?;
        while self.check(TokenKind::Pipe)? {
            let op = self.consume()?;
            let rhs = self.parse_bit_xor()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bit_xor(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_bit_and()?;
        while self.check(TokenKind::Caret)? {
            let op = self.consume()?;
            let rhs = self.parse_bit_and()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bit_and(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_equality()?;
        while self.check(TokenKind::Ampersand)? {
            let op = self.consume()?;
            let rhs = self.parse_equality()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_relational()?;
        while self.check(TokenKind::DoubleEquals)? || self.check(TokenKind::BangEquals)? {
            let op = self.consume()?;
            let rhs = self.parse_relational()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_relational(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_shift()?;
        while self.check(TokenKind::LessThan)?
            || self.check(TokenKind::GreaterThan)?
            || self.check(TokenKind::LessEquals)?
            || self.check(TokenKind::GreaterEquals)?
        {
            let op = self.consume()?;
            let rhs = self.parse_shift()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_additive()?;
        while self.check(TokenKind::ShiftLeft)? || self.check(TokenKind::ShiftRight)? {
            let op = self.consume()?;
            let rhs = self.parse_additive()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_multiplicative()?;
        while self.check(TokenKind::Plus)? || self.check(TokenKind::Dash)? {
            let op = self.consume()?;
            let rhs = self.parse_multiplicative()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_unary()?;
        while self.check(TokenKind::Asterisk)?
            || self.check(TokenKind::Slash)?
            || self.check(TokenKind::Percent)?
        {
            let op = self.consume()?;
            let rhs = self.parse_unary()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<ParseNode, OdlError> {
        if self.check(TokenKind::Dash)? || self.check(TokenKind::Bang)? || self.check(TokenKind::Tilde)? {
            let op = self.consume()?;
            let span = self.token_span(&op);
            let operand = self.parse_unary()?;
            return Ok(ParseNode::with_children(
                Production::Unary,
                Some(op),
                span,
                vec![operand],
            ));
        }
        if self.check(TokenKind::LParen)? && self.peek_second_is_type_name()? {
            return self.parse_cast();
        }
        self.parse_postfix()
    }

    fn parse_cast(&mut self) -> Result<ParseNode, OdlError> {
        let open = self.expect(TokenKind::LParen, "'(' to open cast")?;
        let span = self.token_span(&open);
        let ty = self.parse_type_name()?;
        self.expect(TokenKind::RParen, "')' to close cast")?;
        let operand = self.parse_unary()?;
        Ok(ParseNode::with_children(
            Production::Cast,
            None,
            span,
            vec![ty, operand],
        ))
    }

    fn parse_postfix(&mut self) -> Result<ParseNode, OdlError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_token(TokenKind::LBracket)? {
                let first = self.parse_expression()?;
                if self.match_token(TokenKind::Colon)? {
                    let low = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']' to close bit slice")?;
                    let span = expr.span.clone();
                    expr = ParseNode::with_children(
                        Production::Slice,
                        None,
                        span,
                        vec![expr, first, low],
                    );
                } else {
                    self.expect(TokenKind::RBracket, "']' to close index")?;
                    let span = expr.span.clone();
                    expr = ParseNode::with_children(
                        Production::Index,
                        None,
                        span,
                        vec![expr, first],
                    );
                }
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<ParseNode, OdlError> {
        if self.match_token(TokenKind::LParen)? {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::RParen, "')' to close expression")?;
            return Ok(expr);
        }

        if self.check(TokenKind::Number)? {
            let token = self.consume()?;
            let span = self.token_span(&token);
            return Ok(ParseNode::new(Production::NumberLit, Some(token), span));
        }

        if self.check(TokenKind::String)? {
            let token = self.consume()?;
            let span = self.token_span(&token);
            return Ok(ParseNode::new(Production::StringLit, Some(token), span));
        }

        if self.check(TokenKind::Identifier)? {
            let token = self.consume()?;
            let span = self.token_span(&token);
            if token.lexeme == "true" || token.lexeme == "false" {
                return Ok(ParseNode::new(Production::BoolLit, Some(token), span));
            }
            if token.lexeme == "CSR" && self.check(TokenKind::LBracket)? {
                self.consume()?;
                let name = self.expect(TokenKind::Identifier, "CSR name")?;
                self.expect(TokenKind::RBracket, "']' to close CSR access")?;
                return Ok(ParseNode::new(Production::CsrRef, Some(name), span));
            }
            if self.check(TokenKind::LParen)? {
                self.consume()?;
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen)? {
                    loop {
                        args.push(self.parse_expression()?);
                        if self.match_token(TokenKind::Comma)? {
                            continue;
                        }
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')' to close argument list")?;
                return Ok(ParseNode::with_children(
                    Production::Call,
                    Some(token),
                    span,
                    args,
                ));
            }
            return Ok(ParseNode::new(Production::Name, Some(token), span));
        }

        let token = self.consume()?;
        Err(self.unexpected(&token, "expression"))
    }

    fn binary(&self, op: Token, lhs: ParseNode, rhs: ParseNode) -> ParseNode {
        let span = self.token_span(&op);
        ParseNode::with_children(Production::Binary, Some(op), span, vec![lhs, rhs])
    }

    fn peek_is_type_name(&mut self) -> Result<bool, OdlError> {
        let token = self.peek()?;
        Ok(token.kind == TokenKind::Identifier && TYPE_KEYWORDS.contains(&token.lexeme.as_str()))
    }

    fn peek_second_is_type_name(&mut self) -> Result<bool, OdlError> {
        let token = self.peek_second()?;
        Ok(token.kind == TokenKind::Identifier && TYPE_KEYWORDS.contains(&token.lexeme.as_str()))
    }

    fn check_lexeme(&mut self, lexeme: &str) -> Result<bool, OdlError> {
        let token = self.peek()?;
        Ok(token.kind == TokenKind::Identifier && token.lexeme == lexeme)
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, OdlError> {
        let token = self.consume()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.unexpected(&token, context))
        }
    }

    fn unexpected(&self, token: &Token, expected: &str) -> OdlError {
        let shown = if token.kind == TokenKind::EOF {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        OdlError::Syntax(Diagnostic::error(
            DiagnosticPhase::Parser,
            "parser.unexpected-token",
            format!("expected {expected}, found {shown}"),
            Some(self.token_span(token)),
        ))
    }

    fn token_span(&self, token: &Token) -> SourceSpan {
        SourceSpan::point(
            self.lexer.path().clone(),
            SourcePosition::new(token.line, token.column),
        )
    }

    fn span_here(&mut self) -> Result<SourceSpan, OdlError> {
        let token = self.peek()?.clone();
        Ok(self.token_span(&token))
    }

    fn match_token(&mut self, kind: TokenKind) -> Result<bool, OdlError> {
        if self.check(kind)? {
            self.consume()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn check(&mut self, kind: TokenKind) -> Result<bool, OdlError> {
        Ok(self.peek()?.kind == kind)
    }

    fn peek(&mut self) -> Result<&Token, OdlError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_raw()?);
        }
        Ok(self.peeked.as_ref().expect("peeked token"))
    }

    fn peek_second(&mut self) -> Result<&Token, OdlError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_raw()?);
        }
        if self.peeked2.is_none() {
            self.peeked2 = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked2.as_ref().expect("second peeked token"))
    }

    fn next_raw(&mut self) -> Result<Token, OdlError> {
        if let Some(token) = self.peeked2.take() {
            return Ok(token);
        }
        self.lexer.next_token()
    }

    fn consume(&mut self) -> Result<Token, OdlError> {
        if let Some(token) = self.peeked.take() {
            self.peeked = self.peeked2.take();
            return Ok(token);
        }
        self.next_raw()
    }
}
