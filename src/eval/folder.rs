//! Compile-time constant folding over built or checked ASTs.
//!
//! The folder answers two questions: "what literal does this subtree
//! evaluate to" and "is this code path reachable under configuration C".
//! Subtrees that depend on run-time state fold to an explicit
//! [`Folded::NotConstant`] outcome; the folder never fails outright.

use ahash::AHashMap;

use crate::arch::{Architecture, ParamSpec};
use crate::check::types::Type;
use crate::check::symbols::IMPLEMENTED;
use crate::diagnostic::SourceSpan;
use crate::eval::value::{Value, mask_for};
use crate::lang::ast::{AstNode, BinaryOp, NodeKind, UnaryOp};
use crate::lang::literal::minimal_width;

/// Outcome of a folding attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Folded {
    Value(Value),
    NotConstant(NotConstant),
}

impl Folded {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Folded::Value(value) => Some(value),
            Folded::NotConstant(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Folded::Value(value) => Some(value),
            Folded::NotConstant(_) => None,
        }
    }

    fn not_constant(reason: impl Into<String>, span: Option<&SourceSpan>) -> Self {
        Folded::NotConstant(NotConstant {
            reason: reason.into(),
            span: span.cloned(),
        })
    }
}

/// Why a subtree could not be folded. A result, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct NotConstant {
    pub reason: String,
    pub span: Option<SourceSpan>,
}

pub struct Folder<'a> {
    arch: &'a dyn Architecture,
    bindings: Option<&'a AHashMap<String, Value>>,
    effective_xlen: Option<u32>,
}

impl<'a> Folder<'a> {
    pub fn new(arch: &'a dyn Architecture, effective_xlen: Option<u32>) -> Self {
        Self {
            arch,
            bindings: None,
            effective_xlen,
        }
    }

    /// Adds caller-supplied name/value bindings consulted before the
    /// architecture parameters.
    pub fn with_bindings(mut self, bindings: &'a AHashMap<String, Value>) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Folds a condition to a boolean when it is constant under the
    /// configuration; the reachability query.
    pub fn fold_bool(&self, node: &AstNode) -> Option<bool> {
        self.fold(node).into_value().and_then(|v| v.as_bool())
    }

    pub fn fold(&self, node: &AstNode) -> Folded {
        match &node.kind {
            NodeKind::Literal {
                value,
                declared_width,
            } => {
                let (width, signed) = self
                    .typed_parts(node)
                    .unwrap_or_else(|| (declared_width.unwrap_or_else(|| minimal_width(*value)), false));
                Folded::Value(Value::int(*value as u128, width, signed))
            }
            NodeKind::BoolLit { value } => Folded::Value(Value::bool(*value)),
            NodeKind::StringLit { value } => Folded::Value(Value::str(value.clone())),
            NodeKind::Identifier { name } => self.fold_identifier(name, node),
            NodeKind::Binary { op, lhs, rhs } => self.fold_binary(node, *op, lhs, rhs),
            NodeKind::Unary { op, operand } => self.fold_unary(node, *op, operand),
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => match self.fold(cond) {
                Folded::Value(value) => match value.as_bool() {
                    Some(true) => self.fold(then_expr),
                    Some(false) => self.fold(else_expr),
                    None => Folded::not_constant("condition is not boolean", Some(&cond.span)),
                },
                not_constant => not_constant,
            },
            NodeKind::Cast { operand, .. } => match self.typed_parts(node) {
                Some((width, signed)) => match self.fold(operand) {
                    Folded::Value(value) => match value.as_u128() {
                        Some(bits) => Folded::Value(Value::int(bits, width, signed)),
                        None => Folded::not_constant("cast of a non-integer value", Some(&node.span)),
                    },
                    not_constant => not_constant,
                },
                None => Folded::not_constant("cast width is unresolved", Some(&node.span)),
            },
            NodeKind::Call { callee, args } => self.fold_call(node, callee, args),
            NodeKind::Slice { base, high, low } => self.fold_slice(base, high, low, node),
            NodeKind::Index { .. } | NodeKind::CsrRef { .. } => {
                Folded::not_constant("register state is not compile-time constant", Some(&node.span))
            }
            _ => Folded::not_constant("not a constant expression", Some(&node.span)),
        }
    }

    fn fold_identifier(&self, name: &str, node: &AstNode) -> Folded {
        if let Some(bindings) = self.bindings {
            if let Some(value) = bindings.get(name) {
                return Folded::Value(value.clone());
            }
        }
        match self.arch.parameter(name) {
            Some(ParamSpec::Int {
                width,
                value: Some(value),
            }) => Folded::Value(Value::int(*value as u128, *width, false)),
            Some(ParamSpec::Bool { value: Some(value) }) => Folded::Value(Value::bool(*value)),
            Some(ParamSpec::Str { value: Some(value) }) => Folded::Value(Value::str(value.clone())),
            Some(_) => Folded::not_constant(
                format!("parameter '{name}' is unresolved in this configuration"),
                Some(&node.span),
            ),
            None => Folded::not_constant(
                format!("'{name}' is not a compile-time constant"),
                Some(&node.span),
            ),
        }
    }

    fn fold_call(&self, node: &AstNode, callee: &str, args: &[AstNode]) -> Folded {
        if callee != IMPLEMENTED || args.is_empty() {
            return Folded::not_constant(
                format!("call to '{callee}' is not compile-time constant"),
                Some(&node.span),
            );
        }
        let name = match self.fold(&args[0]) {
            Folded::Value(value) => match value.as_str() {
                Some(name) => name.to_string(),
                None => {
                    return Folded::not_constant("extension name is not a string", Some(&node.span));
                }
            },
            not_constant => return not_constant,
        };
        let version = match args.get(1) {
            Some(arg) => match self.fold(arg) {
                Folded::Value(value) => match value.as_str() {
                    Some(version) => Some(version.to_string()),
                    None => {
                        return Folded::not_constant(
                            "extension version is not a string",
                            Some(&node.span),
                        );
                    }
                },
                not_constant => return not_constant,
            },
            None => None,
        };
        Folded::Value(Value::bool(
            self.arch.extension_present(&name, version.as_deref()),
        ))
    }

    fn fold_binary(&self, node: &AstNode, op: BinaryOp, lhs: &AstNode, rhs: &AstNode) -> Folded {
        // Logical operators short-circuit: the right operand is never
        // touched once the left decides the result.
        match op {
            BinaryOp::LogicalOr => {
                return match self.fold(lhs) {
                    Folded::Value(value) => match value.as_bool() {
                        Some(true) => Folded::Value(Value::bool(true)),
                        Some(false) => self.fold_boolean_operand(rhs),
                        None => Folded::not_constant("operand is not boolean", Some(&lhs.span)),
                    },
                    not_constant => not_constant,
                };
            }
            BinaryOp::LogicalAnd => {
                return match self.fold(lhs) {
                    Folded::Value(value) => match value.as_bool() {
                        Some(false) => Folded::Value(Value::bool(false)),
                        Some(true) => self.fold_boolean_operand(rhs),
                        None => Folded::not_constant("operand is not boolean", Some(&lhs.span)),
                    },
                    not_constant => not_constant,
                };
            }
            _ => {}
        }

        let left = match self.fold(lhs) {
            Folded::Value(value) => value,
            not_constant => return not_constant,
        };
        let right = match self.fold(rhs) {
            Folded::Value(value) => value,
            not_constant => return not_constant,
        };

        if op.is_comparison() {
            return self.fold_comparison(node, op, &left, &right);
        }

        let (lbits, lwidth, lsigned) = match left.int_parts() {
            Some(parts) => parts,
            None => return Folded::not_constant("operand is not an integer", Some(&lhs.span)),
        };
        let (rbits, rwidth, rsigned) = match right.int_parts() {
            Some(parts) => parts,
            None => return Folded::not_constant("operand is not an integer", Some(&rhs.span)),
        };

        // Result width mirrors the checker: the node's resolved type when
        // present, otherwise the wider operand (shifts keep the left width).
        let (width, signed) = self.typed_parts(node).unwrap_or_else(|| {
            if op.is_shift() {
                (lwidth, lsigned)
            } else {
                (lwidth.max(rwidth), lsigned || rsigned)
            }
        });

        let bits = match op {
            BinaryOp::Add => lbits.wrapping_add(rbits),
            BinaryOp::Sub => lbits.wrapping_sub(rbits),
            BinaryOp::Mul => lbits.wrapping_mul(rbits),
            BinaryOp::Div | BinaryOp::Rem => {
                return self.fold_division(node, op, &left, &right, width, signed);
            }
            BinaryOp::BitAnd => lbits & rbits,
            BinaryOp::BitOr => lbits | rbits,
            BinaryOp::BitXor => lbits ^ rbits,
            BinaryOp::Shl => {
                let amount = rbits.min(u128::from(u16::MAX)) as u32;
                if amount >= 128 { 0 } else { lbits << amount }
            }
            BinaryOp::Shr => {
                let amount = rbits.min(u128::from(u16::MAX)) as u32;
                if lsigned {
                    let value = left.as_i128().expect("signed operand");
                    let shifted = if amount >= 127 {
                        if value < 0 { -1 } else { 0 }
                    } else {
                        value >> amount
                    };
                    shifted as u128
                } else if amount >= 128 {
                    0
                } else {
                    lbits >> amount
                }
            }
            BinaryOp::LogicalOr | BinaryOp::LogicalAnd => unreachable!("handled above"),
            _ => unreachable!("comparisons handled above"),
        };
        Folded::Value(Value::int(bits, width, signed))
    }

    fn fold_boolean_operand(&self, node: &AstNode) -> Folded {
        match self.fold(node) {
            Folded::Value(value) => match value.as_bool() {
                Some(result) => Folded::Value(Value::bool(result)),
                None => Folded::not_constant("operand is not boolean", Some(&node.span)),
            },
            not_constant => not_constant,
        }
    }

    fn fold_comparison(&self, node: &AstNode, op: BinaryOp, left: &Value, right: &Value) -> Folded {
        let result = match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => match op {
                BinaryOp::Eq => a == b,
                BinaryOp::Ne => a != b,
                _ => {
                    return Folded::not_constant(
                        "booleans only support equality comparison",
                        Some(&node.span),
                    );
                }
            },
            (Value::Str(a), Value::Str(b)) => match op {
                BinaryOp::Eq => a == b,
                BinaryOp::Ne => a != b,
                _ => {
                    return Folded::not_constant(
                        "strings only support equality comparison",
                        Some(&node.span),
                    );
                }
            },
            _ => {
                // Integer comparison is value-accurate across signedness:
                // both sides widen into i128 space.
                let a = match left.as_i128() {
                    Some(value) => value,
                    None => {
                        return Folded::not_constant("operand is not comparable", Some(&node.span));
                    }
                };
                let b = match right.as_i128() {
                    Some(value) => value,
                    None => {
                        return Folded::not_constant("operand is not comparable", Some(&node.span));
                    }
                };
                match op {
                    BinaryOp::Eq => a == b,
                    BinaryOp::Ne => a != b,
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    BinaryOp::Ge => a >= b,
                    _ => unreachable!("comparison operator"),
                }
            }
        };
        Folded::Value(Value::bool(result))
    }

    fn fold_division(
        &self,
        node: &AstNode,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        width: u16,
        signed: bool,
    ) -> Folded {
        if right.as_u128() == Some(0) {
            return Folded::not_constant("division by zero", Some(&node.span));
        }
        let bits = if signed {
            let a = left.as_i128().expect("int operand");
            let b = right.as_i128().expect("int operand");
            let result = match op {
                BinaryOp::Div => a.wrapping_div(b),
                _ => a.wrapping_rem(b),
            };
            result as u128
        } else {
            let a = left.as_u128().expect("int operand");
            let b = right.as_u128().expect("int operand");
            match op {
                BinaryOp::Div => a / b,
                _ => a % b,
            }
        };
        Folded::Value(Value::int(bits, width, signed))
    }

    fn fold_unary(&self, node: &AstNode, op: UnaryOp, operand: &AstNode) -> Folded {
        let value = match self.fold(operand) {
            Folded::Value(value) => value,
            not_constant => return not_constant,
        };
        match op {
            UnaryOp::Not => match value.as_bool() {
                Some(result) => Folded::Value(Value::bool(!result)),
                None => Folded::not_constant("operand is not boolean", Some(&operand.span)),
            },
            UnaryOp::Neg | UnaryOp::BitNot => {
                let (bits, op_width, op_signed) = match value.int_parts() {
                    Some(parts) => parts,
                    None => {
                        return Folded::not_constant("operand is not an integer", Some(&operand.span));
                    }
                };
                let (width, signed) = self.typed_parts(node).unwrap_or((op_width, op_signed));
                let bits = match op {
                    UnaryOp::Neg => 0u128.wrapping_sub(bits),
                    _ => !bits & mask_for(width),
                };
                Folded::Value(Value::int(bits, width, signed))
            }
        }
    }

    fn fold_slice(&self, base: &AstNode, high: &AstNode, low: &AstNode, node: &AstNode) -> Folded {
        let base_value = match self.fold(base) {
            Folded::Value(value) => value,
            not_constant => return not_constant,
        };
        let high_value = match self.fold(high).into_value().and_then(|v| v.as_u128()) {
            Some(value) => value,
            None => return Folded::not_constant("slice bound is not constant", Some(&high.span)),
        };
        let low_value = match self.fold(low).into_value().and_then(|v| v.as_u128()) {
            Some(value) => value,
            None => return Folded::not_constant("slice bound is not constant", Some(&low.span)),
        };
        if high_value < low_value || high_value >= 128 {
            return Folded::not_constant("slice bounds are out of range", Some(&node.span));
        }
        let bits = match base_value.as_u128() {
            Some(bits) => bits,
            None => return Folded::not_constant("sliced value is not an integer", Some(&base.span)),
        };
        let width = (high_value - low_value + 1) as u16;
        Folded::Value(Value::int(bits >> low_value, width, false))
    }

    /// The node's resolved width and signedness, when checking has supplied
    /// one. Keeps folding congruent with the checker's width rules.
    fn typed_parts(&self, node: &AstNode) -> Option<(u16, bool)> {
        match &node.ty {
            Type::Bits { width, signed } => width
                .resolve(self.effective_xlen)
                .fixed()
                .map(|bits| (bits, *signed)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::StaticArchitecture;
    use crate::diagnostic::{SourcePosition, SourceSpan};
    use std::path::PathBuf;

    fn span() -> SourceSpan {
        SourceSpan::point(PathBuf::from("<expr>"), SourcePosition::new(1, 1))
    }

    fn literal(value: u64) -> AstNode {
        AstNode::new(
            NodeKind::Literal {
                value,
                declared_width: None,
            },
            span(),
        )
    }

    fn ident(name: &str) -> AstNode {
        AstNode::new(
            NodeKind::Identifier {
                name: name.to_string(),
            },
            span(),
        )
    }

    fn boolean(value: bool) -> AstNode {
        AstNode::new(NodeKind::BoolLit { value }, span())
    }

    fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> AstNode {
        AstNode::new(
            NodeKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span(),
        )
    }

    #[test]
    fn folds_simple_arithmetic() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let expr = binary(BinaryOp::Add, literal(2), literal(2));
        let value = folder.fold(&expr).into_value().expect("constant");
        assert_eq!(value.as_u128(), Some(4));
    }

    #[test]
    fn arithmetic_wraps_at_result_width() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let mut lhs = literal(0xFF);
        lhs.ty = Type::bits(8);
        let mut rhs = literal(1);
        rhs.ty = Type::bits(8);
        let mut expr = binary(BinaryOp::Add, lhs, rhs);
        expr.ty = Type::bits(8);
        let value = folder.fold(&expr).into_value().expect("constant");
        assert_eq!(value.as_u128(), Some(0), "0xFF + 1 wraps to 0 in 8 bits");
    }

    #[test]
    fn unresolved_parameter_is_not_constant() {
        let mut arch = StaticArchitecture::baseline();
        arch.parameters.insert(
            "param_x".to_string(),
            ParamSpec::Int {
                width: 16,
                value: None,
            },
        );
        let folder = Folder::new(&arch, None);
        let expr = binary(BinaryOp::Add, ident("param_x"), literal(1));
        match folder.fold(&expr) {
            Folded::NotConstant(outcome) => {
                assert!(outcome.reason.contains("param_x"), "{}", outcome.reason)
            }
            Folded::Value(value) => panic!("expected not-constant, got {value:?}"),
        }
    }

    #[test]
    fn resolved_parameter_folds_to_its_value() {
        let mut arch = StaticArchitecture::baseline();
        arch.parameters.insert(
            "CACHE_BLOCK_SIZE".to_string(),
            ParamSpec::Int {
                width: 16,
                value: Some(64),
            },
        );
        let folder = Folder::new(&arch, None);
        let value = folder
            .fold(&ident("CACHE_BLOCK_SIZE"))
            .into_value()
            .expect("constant");
        assert_eq!(value.as_u128(), Some(64));
    }

    #[test]
    fn logical_or_short_circuits_past_unresolved_operand() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let expr = binary(BinaryOp::LogicalOr, boolean(true), ident("missing_param"));
        let value = folder.fold(&expr).into_value().expect("short circuit");
        assert_eq!(value.as_bool(), Some(true));
    }

    #[test]
    fn logical_and_short_circuits_on_false() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let expr = binary(BinaryOp::LogicalAnd, boolean(false), ident("missing_param"));
        let value = folder.fold(&expr).into_value().expect("short circuit");
        assert_eq!(value.as_bool(), Some(false));
    }

    #[test]
    fn division_by_zero_is_not_constant() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let expr = binary(BinaryOp::Div, literal(10), literal(0));
        match folder.fold(&expr) {
            Folded::NotConstant(outcome) => {
                assert!(outcome.reason.contains("division by zero"))
            }
            Folded::Value(value) => panic!("expected not-constant, got {value:?}"),
        }
    }

    #[test]
    fn implemented_builtin_reads_the_configuration() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let call = |name: &str, version: Option<&str>| {
            let mut args = vec![AstNode::new(
                NodeKind::StringLit {
                    value: name.to_string(),
                },
                span(),
            )];
            if let Some(version) = version {
                args.push(AstNode::new(
                    NodeKind::StringLit {
                        value: version.to_string(),
                    },
                    span(),
                ));
            }
            AstNode::new(
                NodeKind::Call {
                    callee: IMPLEMENTED.to_string(),
                    args,
                },
                span(),
            )
        };
        assert_eq!(
            folder.fold(&call("I", None)).into_value().and_then(|v| v.as_bool()),
            Some(true)
        );
        assert_eq!(
            folder.fold(&call("V", None)).into_value().and_then(|v| v.as_bool()),
            Some(false)
        );
        assert_eq!(
            folder
                .fold(&call("I", Some("3.0")))
                .into_value()
                .and_then(|v| v.as_bool()),
            Some(false),
            "baseline carries I 2.1 only"
        );
    }

    #[test]
    fn register_access_is_never_constant() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let access = AstNode::new(
            NodeKind::Index {
                base: Box::new(ident("X")),
                index: Box::new(literal(1)),
            },
            span(),
        );
        assert!(matches!(folder.fold(&access), Folded::NotConstant(_)));
    }

    #[test]
    fn bindings_take_precedence() {
        let arch = StaticArchitecture::baseline();
        let mut bindings = AHashMap::new();
        bindings.insert("a".to_string(), Value::int(7, 8, false));
        let folder = Folder::new(&arch, None).with_bindings(&bindings);
        let expr = binary(BinaryOp::Mul, ident("a"), literal(3));
        let value = folder.fold(&expr).into_value().expect("constant");
        assert_eq!(value.as_u128(), Some(21));
    }

    #[test]
    fn fold_bool_answers_reachability() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let gated = binary(BinaryOp::LogicalAnd, boolean(true), boolean(false));
        assert_eq!(folder.fold_bool(&gated), Some(false));
        let unknowable = binary(BinaryOp::LogicalAnd, boolean(true), ident("missing"));
        assert_eq!(folder.fold_bool(&unknowable), None);
    }

    #[test]
    fn slices_extract_bit_ranges() {
        let arch = StaticArchitecture::baseline();
        let folder = Folder::new(&arch, None);
        let expr = AstNode::new(
            NodeKind::Slice {
                base: Box::new(literal(0b1101_0110)),
                high: Box::new(literal(3)),
                low: Box::new(literal(1)),
            },
            span(),
        );
        let value = folder.fold(&expr).into_value().expect("constant");
        assert_eq!(value.as_u128(), Some(0b011));
    }
}
