//! Single-pass depth-first type checker.
//!
//! The checker assigns a resolved [`Type`] to every node or fails with the
//! full list of diagnostics gathered during the pass. It never mutates the
//! architecture model, and a failed pass never hands a partially typed tree
//! to the evaluator or serializer.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::arch::Architecture;
use crate::check::scope::{Binding, ScopeArena, ScopeId};
use crate::check::symbols::{FunctionSig, SymbolTable};
use crate::check::types::{MAX_WIDTH, MIN_XLEN, Type, Width};
use crate::diagnostic::{Diagnostic, DiagnosticLevel, DiagnosticPhase, SourceSpan};
use crate::error::OdlError;
use crate::eval::folder::Folder;
use crate::eval::value::{Value, mask_for};
use crate::lang::ast::{Ast, AstNode, BinaryOp, Mutability, NodeKind, TypeSpec, UnaryOp};

/// Widest XLEN any configuration can select.
const MAX_XLEN: u16 = 64;

/// Width an unsized literal carries until context narrows it.
const NATURAL_WIDTH: u16 = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    pub effective_xlen: Option<u32>,
}

pub struct Checker<'a> {
    arch: &'a dyn Architecture,
    symbols: SymbolTable,
    effective_xlen: Option<u32>,
    scopes: ScopeArena,
    diags: Vec<Diagnostic>,
    /// Stack of enclosing function return types.
    returns: SmallVec<[Type; 2]>,
}

impl<'a> Checker<'a> {
    pub fn new(arch: &'a dyn Architecture, symbols: SymbolTable, options: CheckOptions) -> Self {
        Self {
            arch,
            symbols,
            effective_xlen: options.effective_xlen,
            scopes: ScopeArena::new(),
            diags: Vec::new(),
            returns: SmallVec::new(),
        }
    }

    /// Checks a whole compilation unit, consuming the checker.
    pub fn check_program(mut self, ast: &mut Ast) -> Result<(), OdlError> {
        let root = self.scopes.push_root();
        self.collect_functions(ast, root);
        for item in &mut ast.items {
            self.check_statement(item, root, false);
        }
        self.finish()
    }

    /// Checks a standalone expression with caller-supplied constant bindings
    /// (the `eval` entry point).
    pub fn check_expression(
        mut self,
        node: &mut AstNode,
        bindings: &AHashMap<String, Value>,
    ) -> Result<(), OdlError> {
        let root = self.scopes.push_root();
        for (name, value) in bindings {
            let ty = match value {
                Value::Int { width, signed, .. } => Type::Bits {
                    width: Width::Fixed(*width),
                    signed: *signed,
                },
                Value::Bool(_) => Type::Boolean,
                Value::Str(_) => Type::Str,
            };
            self.scopes.define(
                root,
                name.clone(),
                Binding {
                    ty,
                    mutability: Mutability::Constant,
                },
            );
        }
        self.check_expr(node, root);
        self.finish()
    }

    fn finish(self) -> Result<(), OdlError> {
        if self.diags.is_empty() {
            Ok(())
        } else {
            Err(OdlError::Check {
                diagnostics: self.diags,
            })
        }
    }

    /// Pre-pass: resolve every function signature so bodies can call
    /// forward and the table stays read-only while bodies are checked.
    fn collect_functions(&mut self, ast: &mut Ast, root: ScopeId) {
        for item in &mut ast.items {
            let span = item.span.clone();
            if let NodeKind::Function {
                name, params, ret, ..
            } = &mut item.kind
            {
                let mut param_types = Vec::with_capacity(params.len());
                for param in params.iter_mut() {
                    let param_span = param.span.clone();
                    let ty = match &mut param.kind {
                        NodeKind::Param { spec, .. } => {
                            self.resolve_type_spec(spec, &param_span, root)
                        }
                        _ => Type::Unknown,
                    };
                    param.ty = ty.clone();
                    param_types.push(ty);
                }
                let ret_ty = self.resolve_type_spec(ret, &span, root);
                let sig = FunctionSig::new(name.clone(), param_types, ret_ty);
                if !self.symbols.insert_function(sig) {
                    self.error(
                        "check.duplicate-declaration",
                        format!("function '{name}' is declared twice"),
                        &span,
                    );
                }
            }
        }
    }

    fn check_statement(&mut self, node: &mut AstNode, scope: ScopeId, in_loop_header: bool) {
        let span = node.span.clone();
        let mut kind = std::mem::replace(&mut node.kind, NodeKind::Block { statements: vec![] });
        let ty = match &mut kind {
            NodeKind::Decl {
                name,
                spec,
                mutability,
                array_len,
                init,
            } => self.check_decl(name, spec, *mutability, array_len, init, &span, scope),
            NodeKind::Assign { target, value } => {
                self.check_assign(target, value, &span, scope, in_loop_header)
            }
            NodeKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_condition(cond, scope);
                self.check_block(then_block, scope);
                if let Some(else_block) = else_block {
                    self.check_statement(else_block, scope, false);
                }
                Type::Void
            }
            NodeKind::While { cond, body } => {
                self.check_condition(cond, scope);
                self.check_block(body, scope);
                Type::Void
            }
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let header = self.scopes.push_child(scope);
                self.check_statement(init, header, false);
                self.check_condition(cond, header);
                self.check_statement(step, header, true);
                self.check_block(body, header);
                Type::Void
            }
            NodeKind::Return { value } => {
                self.check_return(value, &span, scope);
                Type::Void
            }
            NodeKind::Function {
                name, params, body, ..
            } => {
                self.check_function(name, params, body, scope);
                Type::Void
            }
            NodeKind::Block { .. } => {
                node.kind = kind;
                self.check_block(node, scope);
                return;
            }
            // Bare expression statement.
            _ => {
                node.kind = kind;
                self.check_expr(node, scope);
                return;
            }
        };
        node.kind = kind;
        node.ty = ty;
    }

    fn check_block(&mut self, node: &mut AstNode, parent: ScopeId) {
        let scope = self.scopes.push_child(parent);
        if let NodeKind::Block { statements } = &mut node.kind {
            for statement in statements {
                self.check_statement(statement, scope, false);
            }
        }
        node.ty = Type::Void;
    }

    fn check_condition(&mut self, cond: &mut AstNode, scope: ScopeId) {
        let ty = self.check_expr(cond, scope);
        if !matches!(ty, Type::Boolean | Type::Unknown) {
            self.error(
                "check.mismatch",
                format!("condition must be Boolean, found {ty}"),
                &cond.span,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_decl(
        &mut self,
        name: &str,
        spec: &mut TypeSpec,
        mutability: Mutability,
        array_len: &mut Option<Box<AstNode>>,
        init: &mut Option<Box<AstNode>>,
        span: &SourceSpan,
        scope: ScopeId,
    ) -> Type {
        let base = self.resolve_type_spec(spec, span, scope);
        let declared = match array_len {
            Some(len_expr) => {
                self.check_expr(len_expr, scope);
                let len = self.fold_constant_index(len_expr);
                match len {
                    Some(len) if len > 0 => Type::Array {
                        elem: Box::new(base),
                        len: len as u32,
                    },
                    _ => {
                        self.error(
                            "check.mismatch",
                            "array length must be a positive constant",
                            &len_expr.span,
                        );
                        base
                    }
                }
            }
            None => base,
        };
        if let Some(init) = init {
            if matches!(declared, Type::Array { .. }) {
                self.error(
                    "check.mismatch",
                    "array declarations take no initializer",
                    &init.span,
                );
            } else {
                self.check_expr(init, scope);
                let init_span = init.span.clone();
                self.require_assignable(init, &declared, &init_span);
            }
        }
        if !self.scopes.define(
            scope,
            name,
            Binding {
                ty: declared.clone(),
                mutability,
            },
        ) {
            self.error(
                "check.duplicate-declaration",
                format!("'{name}' is already declared in this scope"),
                span,
            );
        }
        declared
    }

    fn check_assign(
        &mut self,
        target: &mut AstNode,
        value: &mut AstNode,
        span: &SourceSpan,
        scope: ScopeId,
        in_loop_header: bool,
    ) -> Type {
        self.check_expr(value, scope);
        let target_span = target.span.clone();
        let target_ty = match &mut target.kind {
            NodeKind::Identifier { name } => {
                let name = name.clone();
                match self.scopes.lookup(scope, &name).cloned() {
                    Some(binding) => {
                        match binding.mutability {
                            Mutability::Mutable => {}
                            Mutability::LoopIndex if in_loop_header => {}
                            Mutability::LoopIndex => {
                                self.error(
                                    "check.invalid-assignment-target",
                                    format!("loop variable '{name}' is immutable inside the loop body"),
                                    &target_span,
                                );
                            }
                            Mutability::Constant => {
                                self.error(
                                    "check.invalid-assignment-target",
                                    format!("'{name}' is a constant"),
                                    &target_span,
                                );
                            }
                        }
                        binding.ty
                    }
                    None => {
                        self.error(
                            "check.undeclared-identifier",
                            format!("identifier '{name}' is not declared"),
                            &target_span,
                        );
                        Type::Unknown
                    }
                }
            }
            NodeKind::Index { .. } => {
                let element = self.check_index(target, scope, true);
                element
            }
            NodeKind::CsrRef { name } => {
                let name = name.clone();
                match self.symbols.csr(&name) {
                    Some(def) => {
                        let width = def.width.resolve(self.effective_xlen);
                        // The target node itself is a register-file location.
                        target.ty = Type::Csr { name: name.clone() };
                        Type::Bits {
                            width,
                            signed: false,
                        }
                    }
                    None => {
                        self.error(
                            "check.unknown-csr",
                            format!("CSR '{name}' is not defined by this architecture"),
                            &target_span,
                        );
                        Type::Unknown
                    }
                }
            }
            NodeKind::Slice { .. } => {
                self.error(
                    "check.invalid-assignment-target",
                    "bit-slice assignment is not supported",
                    &target_span,
                );
                Type::Unknown
            }
            _ => {
                self.error(
                    "check.invalid-assignment-target",
                    "assignment target must be a variable, register, or CSR",
                    &target_span,
                );
                Type::Unknown
            }
        };
        if target.ty.is_unknown() {
            target.ty = target_ty.clone();
        }
        self.require_assignable(value, &target_ty, span);
        target_ty
    }

    fn check_return(&mut self, value: &mut Option<Box<AstNode>>, span: &SourceSpan, scope: ScopeId) {
        let expected = match self.returns.last().cloned() {
            Some(ty) => ty,
            None => {
                self.error("check.mismatch", "return outside of a function", span);
                if let Some(value) = value {
                    self.check_expr(value, scope);
                }
                return;
            }
        };
        match (value, &expected) {
            (None, Type::Void) => {}
            (None, other) => {
                self.error(
                    "check.mismatch",
                    format!("function returns {other} but this return has no value"),
                    span,
                );
            }
            (Some(value), Type::Void) => {
                self.check_expr(value, scope);
                self.error(
                    "check.mismatch",
                    "void function cannot return a value",
                    &value.span,
                );
            }
            (Some(value), expected) => {
                self.check_expr(value, scope);
                let value_span = value.span.clone();
                self.require_assignable(value, expected, &value_span);
            }
        }
    }

    fn check_function(
        &mut self,
        name: &str,
        params: &mut [AstNode],
        body: &mut AstNode,
        scope: ScopeId,
    ) {
        let sig = match self.symbols.function(name) {
            Some(sig) => sig.clone(),
            // Duplicate declaration; the first signature was reported.
            None => return,
        };
        let fn_scope = self.scopes.push_child(scope);
        for (param, ty) in params.iter_mut().zip(sig.params.iter()) {
            param.ty = ty.clone();
            if let NodeKind::Param { name, .. } = &param.kind {
                if !self.scopes.define(
                    fn_scope,
                    name.clone(),
                    Binding {
                        ty: ty.clone(),
                        mutability: Mutability::Mutable,
                    },
                ) {
                    self.error(
                        "check.duplicate-declaration",
                        format!("parameter '{name}' is declared twice"),
                        &param.span,
                    );
                }
            }
        }
        self.returns.push(sig.ret.clone());
        self.check_block(body, fn_scope);
        self.returns.pop();
    }

    fn check_expr(&mut self, node: &mut AstNode, scope: ScopeId) -> Type {
        let span = node.span.clone();
        let mut kind = std::mem::replace(&mut node.kind, NodeKind::Block { statements: vec![] });
        let ty = match &mut kind {
            NodeKind::Literal { declared_width, .. } => {
                // Unsized literals are context-determined: binary operands
                // and assignment positions narrow them to the width the
                // context demands.
                let width = declared_width.unwrap_or(NATURAL_WIDTH);
                Type::bits(width)
            }
            NodeKind::StringLit { .. } => Type::Str,
            NodeKind::BoolLit { .. } => Type::Boolean,
            NodeKind::Identifier { name } => self.check_identifier(name, &span, scope),
            NodeKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, &span, scope),
            NodeKind::Unary { op, operand } => self.check_unary(*op, operand, &span, scope),
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.check_condition(cond, scope);
                self.check_expr(then_expr, scope);
                self.check_expr(else_expr, scope);
                let else_ty = else_expr.ty.clone();
                self.adopt_literal(then_expr, &else_ty);
                let then_ty = then_expr.ty.clone();
                self.adopt_literal(else_expr, &then_ty);
                self.merge_branch_types(then_expr.ty.clone(), else_expr.ty.clone(), &span)
            }
            NodeKind::Cast { spec, operand } => {
                let target = self.resolve_type_spec(spec, &span, scope);
                let operand_ty = self.check_expr(operand, scope);
                if !target.is_bits() {
                    self.error(
                        "check.mismatch",
                        format!("cast target must be an integer type, found {target}"),
                        &span,
                    );
                } else if !operand_ty.is_bits() && !operand_ty.is_unknown() {
                    self.error(
                        "check.mismatch",
                        format!("only integer values can be cast, found {operand_ty}"),
                        &operand.span,
                    );
                }
                target
            }
            NodeKind::Call { callee, args } => self.check_call(callee, args, &span, scope),
            NodeKind::Index { .. } => {
                node.kind = kind;
                let ty = self.check_index(node, scope, false);
                node.ty = ty.clone();
                return ty;
            }
            NodeKind::Slice { base, high, low } => self.check_slice(base, high, low, &span, scope),
            NodeKind::CsrRef { name } => match self.symbols.csr(name) {
                Some(def) => Type::Bits {
                    width: def.width.resolve(self.effective_xlen),
                    signed: false,
                },
                None => {
                    self.error(
                        "check.unknown-csr",
                        format!("CSR '{name}' is not defined by this architecture"),
                        &span,
                    );
                    Type::Unknown
                }
            },
            _ => {
                self.error("check.mismatch", "expected an expression", &span);
                Type::Unknown
            }
        };
        node.kind = kind;
        node.ty = ty.clone();
        ty
    }

    fn check_identifier(&mut self, name: &str, span: &SourceSpan, scope: ScopeId) -> Type {
        if let Some(binding) = self.scopes.lookup(scope, name) {
            return binding.ty.clone();
        }
        if let Some(param) = self.arch.parameter(name) {
            return match param {
                crate::arch::ParamSpec::Int { width, .. } => Type::bits(*width),
                crate::arch::ParamSpec::Bool { .. } => Type::Boolean,
                crate::arch::ParamSpec::Str { .. } => Type::Str,
            };
        }
        self.error(
            "check.undeclared-identifier",
            format!("identifier '{name}' is not declared"),
            span,
        );
        Type::Unknown
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &mut AstNode,
        rhs: &mut AstNode,
        span: &SourceSpan,
        scope: ScopeId,
    ) -> Type {
        self.check_expr(lhs, scope);
        self.check_expr(rhs, scope);
        if lhs.ty.is_unknown() || rhs.ty.is_unknown() {
            return Type::Unknown;
        }
        if op.is_widening() {
            // Unsized literal operands take the other side's width.
            let rhs_ty = rhs.ty.clone();
            self.adopt_literal(lhs, &rhs_ty);
            let lhs_ty = lhs.ty.clone();
            self.adopt_literal(rhs, &lhs_ty);
        }
        let lhs_ty = lhs.ty.clone();
        let rhs_ty = rhs.ty.clone();

        if op.is_logical() {
            for (ty, operand) in [(&lhs_ty, &*lhs), (&rhs_ty, &*rhs)] {
                if !matches!(ty, Type::Boolean) {
                    self.error(
                        "check.mismatch",
                        format!("logical operand must be Boolean, found {ty}"),
                        &operand.span,
                    );
                }
            }
            return Type::Boolean;
        }

        if op.is_comparison() {
            let compatible = match (&lhs_ty, &rhs_ty) {
                // Comparison is the one place mixed signedness promotes
                // implicitly.
                (Type::Bits { .. }, Type::Bits { .. }) => true,
                (Type::Boolean, Type::Boolean) | (Type::Str, Type::Str) => {
                    matches!(op, BinaryOp::Eq | BinaryOp::Ne)
                }
                _ => false,
            };
            if !compatible {
                self.error(
                    "check.mismatch",
                    format!("cannot compare {lhs_ty} with {rhs_ty}"),
                    span,
                );
            }
            return Type::Boolean;
        }

        let (Type::Bits { width: lw, signed: ls }, Type::Bits { width: rw, signed: rs }) =
            (&lhs_ty, &rhs_ty)
        else {
            self.error(
                "check.mismatch",
                format!("operator requires integer operands, found {lhs_ty} and {rhs_ty}"),
                span,
            );
            return Type::Unknown;
        };

        if op.is_shift() {
            // The shift amount does not widen the value.
            return lhs_ty.clone();
        }

        if ls != rs {
            self.error(
                "check.mismatch",
                format!(
                    "signedness mismatch between {lhs_ty} and {rhs_ty}; an explicit cast is required"
                ),
                span,
            );
        }
        let width = self.combine_widths(*lw, *rw, span);
        Type::Bits {
            width,
            signed: *ls && *rs,
        }
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &mut AstNode,
        span: &SourceSpan,
        scope: ScopeId,
    ) -> Type {
        let ty = self.check_expr(operand, scope);
        if ty.is_unknown() {
            return Type::Unknown;
        }
        match op {
            UnaryOp::Not => {
                if !matches!(ty, Type::Boolean) {
                    self.error(
                        "check.mismatch",
                        format!("'!' requires a Boolean operand, found {ty}"),
                        span,
                    );
                }
                Type::Boolean
            }
            UnaryOp::Neg | UnaryOp::BitNot => {
                if !ty.is_bits() {
                    self.error(
                        "check.mismatch",
                        format!("operator requires an integer operand, found {ty}"),
                        span,
                    );
                    return Type::Unknown;
                }
                ty
            }
        }
    }

    fn check_call(
        &mut self,
        callee: &str,
        args: &mut [AstNode],
        span: &SourceSpan,
        scope: ScopeId,
    ) -> Type {
        let sig = match self.symbols.function(callee) {
            Some(sig) => sig.clone(),
            None => {
                for arg in args.iter_mut() {
                    self.check_expr(arg, scope);
                }
                self.error(
                    "check.unknown-function",
                    format!("function '{callee}' is not defined"),
                    span,
                );
                return Type::Unknown;
            }
        };
        if args.len() < sig.min_args || args.len() > sig.params.len() {
            self.error(
                "check.arity-mismatch",
                format!(
                    "'{callee}' expects {} argument(s), got {}",
                    describe_arity(&sig),
                    args.len()
                ),
                span,
            );
        }
        for (index, arg) in args.iter_mut().enumerate() {
            self.check_expr(arg, scope);
            if let Some(param_ty) = sig.params.get(index) {
                let arg_span = arg.span.clone();
                self.require_assignable(arg, param_ty, &arg_span);
            }
        }
        sig.ret.clone()
    }

    /// Resolves an `Index` node: an array element access when the base names
    /// a declared array, a register-file access when the base names a file
    /// published by the architecture.
    fn check_index(&mut self, node: &mut AstNode, scope: ScopeId, as_target: bool) -> Type {
        let span = node.span.clone();
        let mut kind = std::mem::replace(&mut node.kind, NodeKind::Block { statements: vec![] });
        let element = if let NodeKind::Index { base, index } = &mut kind {
            let index_ty = self.check_expr(index, scope);
            if !index_ty.is_bits() && !index_ty.is_unknown() {
                self.error(
                    "check.mismatch",
                    format!("index must be an integer, found {index_ty}"),
                    &index.span,
                );
            }
            let element = match &base.kind {
                NodeKind::Identifier { name } => {
                    let name = name.clone();
                    if let Some(binding) = self.scopes.lookup(scope, &name).cloned() {
                        if as_target && !matches!(binding.mutability, Mutability::Mutable) {
                            self.error(
                                "check.invalid-assignment-target",
                                format!("'{name}' is not a mutable array"),
                                &base.span,
                            );
                        }
                        base.ty = binding.ty.clone();
                        match binding.ty {
                            Type::Array { elem, .. } => *elem,
                            other => {
                                self.error(
                                    "check.mismatch",
                                    format!("'{name}' of type {other} cannot be indexed"),
                                    &span,
                                );
                                Type::Unknown
                            }
                        }
                    } else if let Some(file) = self.arch.register_file(&name).cloned() {
                        let elem = Type::Bits {
                            width: file.width.resolve(self.effective_xlen),
                            signed: false,
                        };
                        // The file name itself reads as a register array.
                        base.ty = Type::Array {
                            elem: Box::new(elem.clone()),
                            len: file.count,
                        };
                        if let Some(index_value) = self.fold_constant_index(index) {
                            if index_value >= file.count as u128 {
                                self.error(
                                    "check.register-index-range",
                                    format!(
                                        "register index {index_value} is out of range for '{name}' \
                                         ({} registers)",
                                        file.count
                                    ),
                                    &index.span,
                                );
                            }
                        }
                        elem
                    } else {
                        self.error(
                            "check.undeclared-identifier",
                            format!("identifier '{name}' is not declared"),
                            &base.span,
                        );
                        Type::Unknown
                    }
                }
                _ => {
                    let base_ty = self.check_expr(base, scope);
                    match base_ty {
                        Type::Array { elem, .. } => *elem,
                        Type::Unknown => Type::Unknown,
                        other => {
                            self.error(
                                "check.mismatch",
                                format!("value of type {other} cannot be indexed"),
                                &span,
                            );
                            Type::Unknown
                        }
                    }
                }
            };
            element
        } else {
            Type::Unknown
        };
        node.kind = kind;
        node.ty = element.clone();
        element
    }

    fn check_slice(
        &mut self,
        base: &mut AstNode,
        high: &mut AstNode,
        low: &mut AstNode,
        span: &SourceSpan,
        scope: ScopeId,
    ) -> Type {
        let base_ty = self.check_expr(base, scope);
        self.check_expr(high, scope);
        self.check_expr(low, scope);
        let width = match &base_ty {
            Type::Bits { width, .. } => *width,
            Type::Unknown => return Type::Unknown,
            other => {
                self.error(
                    "check.mismatch",
                    format!("only integer values can be bit-sliced, found {other}"),
                    &base.span,
                );
                return Type::Unknown;
            }
        };
        let (Some(high_value), Some(low_value)) = (
            self.fold_constant_index(high),
            self.fold_constant_index(low),
        ) else {
            self.error(
                "check.mismatch",
                "slice bounds must be compile-time constants",
                span,
            );
            return Type::Unknown;
        };
        if high_value < low_value {
            self.error(
                "check.mismatch",
                format!("slice high bound {high_value} is below low bound {low_value}"),
                span,
            );
            return Type::Unknown;
        }
        // An unresolved XLEN base is at least MIN_XLEN bits wide.
        let base_width = width.fixed().unwrap_or(MIN_XLEN);
        if high_value >= base_width as u128 {
            self.error(
                "check.width-overflow",
                format!("slice bound {high_value} exceeds the {base_width}-bit operand"),
                span,
            );
            return Type::Unknown;
        }
        Type::bits((high_value - low_value + 1) as u16)
    }

    fn resolve_type_spec(&mut self, spec: &mut TypeSpec, span: &SourceSpan, scope: ScopeId) -> Type {
        match spec {
            TypeSpec::XReg => Type::Bits {
                width: Width::Xlen.resolve(self.effective_xlen),
                signed: false,
            },
            TypeSpec::Boolean => Type::Boolean,
            TypeSpec::Str => Type::Str,
            TypeSpec::Void => Type::Void,
            TypeSpec::Bits(_) | TypeSpec::Signed(_) => {
                let signed = matches!(spec, TypeSpec::Signed(_));
                let width_expr = match spec {
                    TypeSpec::Bits(width_expr) | TypeSpec::Signed(width_expr) => width_expr,
                    _ => unreachable!(),
                };
                self.check_expr(width_expr, scope);
                let width = match self.fold_constant_index(width_expr) {
                    Some(width) if width >= 1 && width <= MAX_WIDTH as u128 => width as u16,
                    Some(width) => {
                        self.error(
                            "check.width-overflow",
                            format!("type width {width} is outside 1..={MAX_WIDTH}"),
                            span,
                        );
                        return Type::Unknown;
                    }
                    None => {
                        self.error(
                            "check.mismatch",
                            "type width must be a compile-time constant",
                            span,
                        );
                        return Type::Unknown;
                    }
                };
                Type::Bits {
                    width: Width::Fixed(width),
                    signed,
                }
            }
        }
    }

    /// Folds an already-checked subexpression to an unsigned constant using
    /// the same folder the evaluator uses, keeping width semantics in sync.
    fn fold_constant_index(&self, node: &AstNode) -> Option<u128> {
        let folder = Folder::new(self.arch, self.effective_xlen);
        folder.fold(node).into_value().and_then(|v| v.as_u128())
    }

    fn merge_branch_types(&mut self, then_ty: Type, else_ty: Type, span: &SourceSpan) -> Type {
        if then_ty.is_unknown() || else_ty.is_unknown() {
            return Type::Unknown;
        }
        match (&then_ty, &else_ty) {
            (
                Type::Bits {
                    width: lw,
                    signed: ls,
                },
                Type::Bits {
                    width: rw,
                    signed: rs,
                },
            ) => {
                if ls != rs {
                    self.error(
                        "check.mismatch",
                        format!(
                            "conditional arms disagree on signedness: {then_ty} vs {else_ty}"
                        ),
                        span,
                    );
                }
                let width = self.combine_widths(*lw, *rw, span);
                Type::Bits {
                    width,
                    signed: *ls && *rs,
                }
            }
            _ if then_ty == else_ty => then_ty,
            _ => {
                self.error(
                    "check.mismatch",
                    format!("conditional arms have incompatible types {then_ty} and {else_ty}"),
                    span,
                );
                Type::Unknown
            }
        }
    }

    /// Wider-operand-wins width promotion, including the XLEN-dependent
    /// cases.
    fn combine_widths(&mut self, lhs: Width, rhs: Width, span: &SourceSpan) -> Width {
        match (lhs, rhs) {
            (Width::Fixed(a), Width::Fixed(b)) => Width::Fixed(a.max(b)),
            (Width::Xlen, Width::Xlen) => Width::Xlen,
            (Width::Xlen, Width::Fixed(fixed)) | (Width::Fixed(fixed), Width::Xlen) => {
                if fixed <= MIN_XLEN {
                    Width::Xlen
                } else {
                    self.error(
                        "check.width-overflow",
                        format!(
                            "cannot combine an XLEN-dependent width with {fixed} bits without an \
                             effective XLEN"
                        ),
                        span,
                    );
                    Width::Xlen
                }
            }
        }
    }

    /// Requires `value` to be assignable to `to`. A constant integer value
    /// narrows implicitly when it fits the target width; an unsized literal
    /// additionally takes the target as its resolved type.
    fn require_assignable(&mut self, value: &mut AstNode, to: &Type, span: &SourceSpan) {
        let from = value.ty.clone();
        if from.is_unknown() || to.is_unknown() {
            return;
        }
        if self.assignable(&from, to) {
            return;
        }
        if from.is_bits() && to.is_bits() {
            if let Some(folded) = self.fold_constant_index(value) {
                if self.literal_fits(folded, to) {
                    if is_unsized_literal(value) {
                        value.ty = to.clone();
                    }
                    return;
                }
            }
        }
        self.error(
            "check.mismatch",
            format!("cannot assign {from} to {to}"),
            span,
        );
    }

    /// Narrows an unsized literal operand to the width (and signedness) its
    /// context demands.
    fn adopt_literal(&mut self, node: &mut AstNode, context: &Type) {
        if !is_unsized_literal(node) || !context.is_bits() {
            return;
        }
        let value = match &node.kind {
            NodeKind::Literal { value, .. } => *value as u128,
            _ => return,
        };
        if self.literal_fits(value, context) {
            node.ty = context.clone();
        } else {
            self.error(
                "check.mismatch",
                format!("literal {value} does not fit {context}"),
                &node.span,
            );
        }
    }

    /// Whether a non-negative constant fits the target integer type; an
    /// unresolved XLEN width admits what the narrowest XLEN can hold.
    fn literal_fits(&self, value: u128, ty: &Type) -> bool {
        match ty {
            Type::Bits { width, signed } => {
                let bits = width
                    .resolve(self.effective_xlen)
                    .fixed()
                    .unwrap_or(MIN_XLEN);
                let usable = if *signed { bits.saturating_sub(1) } else { bits };
                value <= mask_for(usable)
            }
            _ => false,
        }
    }

    fn assignable(&self, from: &Type, to: &Type) -> bool {
        match (from, to) {
            (
                Type::Bits {
                    width: fw,
                    signed: fs,
                },
                Type::Bits {
                    width: tw,
                    signed: ts,
                },
            ) => fs == ts && width_fits(*fw, *tw),
            _ => from == to,
        }
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, span: &SourceSpan) {
        self.diags.push(Diagnostic::new(
            DiagnosticPhase::Check,
            DiagnosticLevel::Error,
            code,
            message,
            Some(span.clone()),
        ));
    }
}

/// Whether a value of width `from` always fits in width `to`, for any legal
/// XLEN.
fn width_fits(from: Width, to: Width) -> bool {
    match (from, to) {
        (Width::Fixed(a), Width::Fixed(b)) => a <= b,
        (Width::Xlen, Width::Xlen) => true,
        (Width::Fixed(a), Width::Xlen) => a <= MIN_XLEN,
        (Width::Xlen, Width::Fixed(b)) => b >= MAX_XLEN,
    }
}

fn is_unsized_literal(node: &AstNode) -> bool {
    matches!(
        node.kind,
        NodeKind::Literal {
            declared_width: None,
            ..
        }
    )
}

fn describe_arity(sig: &FunctionSig) -> String {
    if sig.min_args == sig.params.len() {
        format!("{}", sig.params.len())
    } else {
        format!("{}..{}", sig.min_args, sig.params.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{CsrDef, StaticArchitecture};
    use crate::lang::builder::AstBuilder;
    use crate::lang::parser::Parser;
    use std::path::PathBuf;

    fn build(src: &str) -> Ast {
        let mut parser = Parser::new(src, PathBuf::from("test.odl"));
        let tree = parser.parse_program().expect("parse");
        AstBuilder::build_program(&tree).expect("build")
    }

    fn check_with(arch: &StaticArchitecture, src: &str, xlen: Option<u32>) -> Result<Ast, OdlError> {
        let mut ast = build(src);
        let symbols = SymbolTable::for_architecture(arch);
        let checker = Checker::new(
            arch,
            symbols,
            CheckOptions {
                effective_xlen: xlen,
            },
        );
        checker.check_program(&mut ast).map(|_| ast)
    }

    fn check(src: &str) -> Result<Ast, OdlError> {
        check_with(&StaticArchitecture::baseline(), src, None)
    }

    fn diagnostics(err: OdlError) -> Vec<Diagnostic> {
        match err {
            OdlError::Check { diagnostics } => diagnostics,
            other => panic!("expected check error, got {other:?}"),
        }
    }

    fn assert_fully_typed(node: &AstNode) {
        assert!(
            !node.ty.is_unknown(),
            "node at {:?} left untyped: {:?}",
            node.span.start,
            node.kind
        );
        visit_children(node, &mut assert_fully_typed);
    }

    fn visit_spec(spec: &TypeSpec, visit: &mut dyn FnMut(&AstNode)) {
        if let Some(width) = spec.width_expr() {
            visit(width);
        }
    }

    fn visit_children(node: &AstNode, visit: &mut dyn FnMut(&AstNode)) {
        match &node.kind {
            NodeKind::Binary { lhs, rhs, .. } => {
                visit(lhs);
                visit(rhs);
            }
            NodeKind::Unary { operand, .. } => visit(operand),
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                visit(cond);
                visit(then_expr);
                visit(else_expr);
            }
            NodeKind::Cast { spec, operand } => {
                visit_spec(spec, visit);
                visit(operand);
            }
            NodeKind::Call { args, .. } => args.iter().for_each(|arg| visit(arg)),
            NodeKind::Index { base, index } => {
                visit(base);
                visit(index);
            }
            NodeKind::Slice { base, high, low } => {
                visit(base);
                visit(high);
                visit(low);
            }
            NodeKind::Decl {
                spec,
                array_len,
                init,
                ..
            } => {
                visit_spec(spec, visit);
                if let Some(len) = array_len {
                    visit(len);
                }
                if let Some(init) = init {
                    visit(init);
                }
            }
            NodeKind::Assign { target, value } => {
                visit(target);
                visit(value);
            }
            NodeKind::If {
                cond,
                then_block,
                else_block,
            } => {
                visit(cond);
                visit(then_block);
                if let Some(else_block) = else_block {
                    visit(else_block);
                }
            }
            NodeKind::Block { statements } => statements.iter().for_each(|stmt| visit(stmt)),
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                visit(init);
                visit(cond);
                visit(step);
                visit(body);
            }
            NodeKind::While { cond, body } => {
                visit(cond);
                visit(body);
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    visit(value);
                }
            }
            NodeKind::Param { spec, .. } => visit_spec(spec, visit),
            NodeKind::Function { params, body, .. } => {
                params.iter().for_each(|param| visit(param));
                visit(body);
            }
            _ => {}
        }
    }

    #[test]
    fn register_transfer_program_types_as_xlen_bits() {
        let ast = check("XReg a = X[1];\nXReg b = X[2];\nX[3] = a + b;\n").expect("check");
        assert_eq!(ast.items.len(), 3);
        for item in &ast.items {
            assert_eq!(item.ty, Type::xreg(), "top-level nodes carry Bits<XLEN>");
        }
        for item in &ast.items {
            assert_fully_typed(item);
        }
    }

    #[test]
    fn arithmetic_width_is_max_of_operands() {
        let ast = check("Bits<8> a = 1;\nBits<16> b = 2;\nBits<16> c = a + b;\n").expect("check");
        match &ast.items[2].kind {
            NodeKind::Decl { init, .. } => {
                assert_eq!(init.as_ref().expect("init").ty, Type::bits(16));
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn cast_width_governs_the_promotion() {
        let ast = check("Bits<8> a = 1;\nBits<16> b = (Bits<16>) a + 2;\n").expect("check");
        match &ast.items[1].kind {
            NodeKind::Decl { init, .. } => {
                assert_eq!(init.as_ref().expect("init").ty, Type::bits(16));
            }
            other => panic!("expected declaration, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_identifier_is_reported_at_its_position() {
        let diags = diagnostics(check("a + b;").unwrap_err());
        assert_eq!(diags[0].code, "check.undeclared-identifier");
        assert!(diags[0].message.contains("'a'"), "{}", diags[0].message);
        let span = diags[0].span.as_ref().expect("span");
        assert_eq!((span.start.line, span.start.column), (1, 1));
        // Both operands are reported within the single pass.
        assert_eq!(diags.len(), 2);
        assert!(diags[1].message.contains("'b'"));
    }

    #[test]
    fn signedness_mismatch_requires_cast() {
        let err = check("Bits<8> a = 1;\nSigned<8> b = (Signed<8>) 1;\nBits<8> c = a + b;\n")
            .unwrap_err();
        let diags = diagnostics(err);
        assert!(diags.iter().any(|d| d.message.contains("signedness")));
    }

    #[test]
    fn comparison_allows_mixed_signedness() {
        check("Bits<8> a = 1;\nSigned<8> b = (Signed<8>) 1;\nBoolean c = a < b;\n")
            .expect("comparisons promote implicitly");
    }

    #[test]
    fn condition_must_be_boolean() {
        let diags = diagnostics(check("XReg a = X[1];\nif (a) { }\n").unwrap_err());
        assert_eq!(diags[0].code, "check.mismatch");
        assert!(diags[0].message.contains("Boolean"));
    }

    #[test]
    fn assigning_to_constant_is_invalid_target() {
        let diags =
            diagnostics(check("constant Bits<8> LIMIT = 3;\nLIMIT = 4;\n").unwrap_err());
        assert_eq!(diags[0].code, "check.invalid-assignment-target");
    }

    #[test]
    fn loop_index_is_immutable_in_body() {
        let err = check("for (Bits<6> i = 0; i < 32; i = i + 1) { i = 0; }").unwrap_err();
        let diags = diagnostics(err);
        assert_eq!(diags[0].code, "check.invalid-assignment-target");
        assert!(diags[0].message.contains("loop variable"));
    }

    #[test]
    fn loop_step_assignment_is_permitted() {
        check("for (Bits<6> i = 0; i < 32; i = i + 1) { X[i] = 0; }").expect("check");
    }

    #[test]
    fn unknown_function_is_a_hard_error() {
        let diags = diagnostics(check("frobnicate(1);").unwrap_err());
        assert_eq!(diags[0].code, "check.unknown-function");
    }

    #[test]
    fn call_arity_is_enforced() {
        let src = "function id(XReg v) -> XReg { return v; }\nXReg a = id(X[1], X[2]);\n";
        let diags = diagnostics(check(src).unwrap_err());
        assert_eq!(diags[0].code, "check.arity-mismatch");
        assert!(diags[0].message.contains("expects 1"));
    }

    #[test]
    fn functions_check_against_declared_return_type() {
        let ok = "function pick() -> Bits<8> { return 8'd7; }";
        check(ok).expect("check");
        let bad = "function pick() -> Bits<8> { return true; }";
        let diags = diagnostics(check(bad).unwrap_err());
        assert_eq!(diags[0].code, "check.mismatch");
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let diags = diagnostics(check("return 1;").unwrap_err());
        assert!(diags[0].message.contains("outside"));
    }

    #[test]
    fn effective_xlen_resolves_register_widths() {
        let arch = StaticArchitecture::baseline();
        let ast = check_with(&arch, "XReg a = X[1];", Some(64)).expect("check");
        assert_eq!(ast.items[0].ty, Type::bits(64));
    }

    #[test]
    fn unresolved_xlen_register_width_is_distinct_from_missing_file() {
        // Width stays symbolic without an effective XLEN.
        let ast = check("XReg a = X[1];").expect("check");
        assert_eq!(ast.items[0].ty, Type::xreg());
        // A file the architecture does not define is a diagnostic instead.
        let diags = diagnostics(check("XReg a = F[1];").unwrap_err());
        assert_eq!(diags[0].code, "check.undeclared-identifier");
    }

    #[test]
    fn constant_register_index_is_range_checked() {
        let diags = diagnostics(check("XReg a = X[40];").unwrap_err());
        assert_eq!(diags[0].code, "check.register-index-range");
    }

    #[test]
    fn csr_access_types_from_the_architecture() {
        let mut arch = StaticArchitecture::baseline();
        arch.csrs.push(CsrDef {
            name: "mstatus".to_string(),
            width: Width::Xlen,
            requires: None,
        });
        let ast = check_with(&arch, "XReg s = CSR[mstatus];\nCSR[mstatus] = s;\n", None)
            .expect("check");
        assert_eq!(ast.items[0].ty, Type::xreg());
        let diags = diagnostics(
            check_with(&arch, "XReg s = CSR[sstatus];", None).unwrap_err(),
        );
        assert_eq!(diags[0].code, "check.unknown-csr");
    }

    #[test]
    fn slice_bounds_are_validated() {
        check("XReg a = X[1];\nBits<8> b = a[7:0];\n").expect("check");
        let diags = diagnostics(check("Bits<8> a = 1;\nBits<8> b = a[9:0];\n").unwrap_err());
        assert_eq!(diags[0].code, "check.width-overflow");
    }

    #[test]
    fn narrowing_assignment_is_a_mismatch() {
        let diags = diagnostics(check("Bits<4> a = 255;").unwrap_err());
        assert_eq!(diags[0].code, "check.mismatch");
    }

    #[test]
    fn duplicate_declaration_in_scope_is_reported() {
        let diags =
            diagnostics(check("Bits<8> a = 1;\nBits<8> a = 2;\n").unwrap_err());
        assert_eq!(diags[0].code, "check.duplicate-declaration");
    }

    #[test]
    fn inner_scopes_may_shadow() {
        check("Bits<8> a = 1;\nif (true) { Bits<16> a = 2; }\n").expect("check");
    }

    #[test]
    fn parameterized_type_width_folds_against_configuration() {
        let mut arch = StaticArchitecture::baseline();
        arch.parameters.insert(
            "VLEN".to_string(),
            crate::arch::ParamSpec::Int {
                width: 16,
                value: Some(128),
            },
        );
        let ast = check_with(&arch, "Bits<VLEN> v = 0;", None).expect("check");
        assert_eq!(ast.items[0].ty, Type::bits(128));
    }

    #[test]
    fn unresolved_type_width_is_rejected() {
        let mut arch = StaticArchitecture::baseline();
        arch.parameters.insert(
            "VLEN".to_string(),
            crate::arch::ParamSpec::Int {
                width: 16,
                value: None,
            },
        );
        let diags =
            diagnostics(check_with(&arch, "Bits<VLEN> v = 0;", None).unwrap_err());
        assert!(diags[0].message.contains("compile-time constant"));
    }

    #[test]
    fn checked_trees_are_fully_typed() {
        let src = "function clamp(XReg v, XReg hi) -> XReg {\n\
                   if (v < hi) { return v; }\n\
                   return hi;\n\
                   }\n\
                   XReg a = X[1];\n\
                   X[2] = clamp(a, X[3]);\n";
        let ast = check(src).expect("check");
        for item in &ast.items {
            assert_fully_typed(item);
        }
    }
}
