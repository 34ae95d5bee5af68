//! Public entry points that sequence the compilation passes.
//!
//! Passes run strictly forward: source text → parse tree → AST → checked
//! AST → serialized form. A failed pass returns its diagnostic and nothing
//! downstream ever sees a partially typed tree.

use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::arch::Architecture;
use crate::check::checker::{CheckOptions, Checker};
use crate::check::symbols::SymbolTable;
use crate::error::OdlError;
use crate::eval::folder::{Folded, Folder};
use crate::eval::value::Value;
use crate::lang::ast::{Ast, AstNode};
use crate::lang::builder::AstBuilder;
use crate::lang::parser::Parser;
use crate::serialize::{self, SerializeOptions, SerializedAst};

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Resolves XLEN-dependent widths when supplied; otherwise they stay
    /// symbolic through checking.
    pub effective_xlen: Option<u32>,
    pub serialize: SerializeOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            effective_xlen: None,
            serialize: SerializeOptions::default(),
        }
    }
}

/// A compiler bound to one architecture configuration. Cheap to clone the
/// `Arc` across threads; every compilation owns its own AST and scope tree.
pub struct Compiler {
    arch: Arc<dyn Architecture>,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(arch: Arc<dyn Architecture>) -> Self {
        Self {
            arch,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(arch: Arc<dyn Architecture>, options: CompileOptions) -> Self {
        Self { arch, options }
    }

    /// Parses and builds without checking; the result carries no types.
    pub fn parse(&self, source: &str, path: impl Into<PathBuf>) -> Result<Ast, OdlError> {
        let path = path.into();
        let mut parser = Parser::new(source, path.clone());
        let tree = parser.parse_program()?;
        debug!("parsed {} item(s) from {}", tree.children.len(), path.display());
        AstBuilder::build_program(&tree)
    }

    /// Parses, builds, and type checks a compilation unit.
    pub fn typecheck(&self, source: &str, path: impl Into<PathBuf>) -> Result<Ast, OdlError> {
        let mut ast = self.parse(source, path)?;
        let symbols = SymbolTable::for_architecture(self.arch.as_ref());
        let checker = Checker::new(
            self.arch.as_ref(),
            symbols,
            CheckOptions {
                effective_xlen: self.options.effective_xlen,
            },
        );
        checker.check_program(&mut ast)?;
        debug!("checked {} top-level item(s)", ast.items.len());
        Ok(ast)
    }

    /// The full pipeline: the returned unit owns a checked AST and
    /// serializes on demand.
    pub fn compile(&self, source: &str, path: impl Into<PathBuf>) -> Result<CompiledUnit, OdlError> {
        let ast = self.typecheck(source, path)?;
        Ok(CompiledUnit {
            ast,
            options: self.options.serialize,
        })
    }

    /// Checks and folds a single expression against the configuration,
    /// with caller-supplied constant bindings.
    pub fn eval(
        &self,
        source: &str,
        bindings: &AHashMap<String, Value>,
    ) -> Result<Folded, OdlError> {
        let mut parser = Parser::new(source, PathBuf::from("<eval>"));
        let tree = parser.parse_expression_only()?;
        let mut expr = AstBuilder::build_expression(&tree)?;
        let symbols = SymbolTable::for_architecture(self.arch.as_ref());
        let checker = Checker::new(
            self.arch.as_ref(),
            symbols,
            CheckOptions {
                effective_xlen: self.options.effective_xlen,
            },
        );
        checker.check_expression(&mut expr, bindings)?;
        let folder =
            Folder::new(self.arch.as_ref(), self.options.effective_xlen).with_bindings(bindings);
        debug!("folding checked expression");
        Ok(folder.fold(&expr))
    }

    /// Folds an already-checked subtree; the reachability query.
    pub fn fold(&self, node: &AstNode) -> Folded {
        Folder::new(self.arch.as_ref(), self.options.effective_xlen).fold(node)
    }
}

/// A successfully checked compilation unit.
#[derive(Debug)]
pub struct CompiledUnit {
    pub ast: Ast,
    options: SerializeOptions,
}

impl CompiledUnit {
    pub fn serialized(&self) -> SerializedAst {
        serialize::serialize(&self.ast, self.options)
    }

    pub fn to_json(&self) -> String {
        self.serialized().to_json()
    }

    /// Content digest of the serialized form, for external caches.
    pub fn digest(&self) -> String {
        self.serialized().digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::StaticArchitecture;
    use crate::serialize::{SerializedAst, reconstruct, serialize};

    fn compiler() -> Compiler {
        Compiler::new(Arc::new(StaticArchitecture::baseline()))
    }

    #[test]
    fn compile_produces_a_serializable_unit() {
        let unit = compiler()
            .compile("XReg a = X[1];\nX[2] = a;\n", "unit.odl")
            .expect("compile");
        let json = unit.to_json();
        assert!(json.contains("\"node\":\"decl\""));
        assert_eq!(unit.digest().len(), 64);
    }

    #[test]
    fn failed_check_yields_no_unit() {
        let err = compiler().compile("a + b;", "unit.odl").unwrap_err();
        assert!(matches!(err, OdlError::Check { .. }));
    }

    #[test]
    fn serialize_build_parse_is_idempotent() {
        let ast = compiler()
            .parse("XReg a = X[1];\nX[2] = a + 8'h10;\n", "unit.odl")
            .expect("parse");
        let first = serialize(&ast, SerializeOptions::default()).to_json();
        let rebuilt =
            reconstruct(&SerializedAst::from_json(&first).expect("decode")).expect("rebuild");
        let second = serialize(&rebuilt, SerializeOptions::default()).to_json();
        assert_eq!(first, second);
    }

    #[test]
    fn eval_folds_constants() {
        let outcome = compiler()
            .eval("2 + 2", &AHashMap::new())
            .expect("eval");
        assert_eq!(
            outcome.into_value().and_then(|v| v.as_u128()),
            Some(4)
        );
    }

    #[test]
    fn eval_reports_not_constant_for_unresolved_parameters() {
        let mut arch = StaticArchitecture::baseline();
        arch.parameters.insert(
            "param_x".to_string(),
            crate::arch::ParamSpec::Int {
                width: 16,
                value: None,
            },
        );
        let compiler = Compiler::new(Arc::new(arch));
        let outcome = compiler.eval("param_x + 1", &AHashMap::new()).expect("eval");
        assert!(matches!(outcome, Folded::NotConstant(_)));
    }

    #[test]
    fn eval_uses_bindings() {
        let mut bindings = AHashMap::new();
        bindings.insert("rs1".to_string(), Value::int(5, 8, false));
        let outcome = compiler().eval("rs1 * 3", &bindings).expect("eval");
        assert_eq!(outcome.into_value().and_then(|v| v.as_u128()), Some(15));
    }

    #[test]
    fn eval_rejects_undeclared_identifiers() {
        let err = compiler().eval("mystery + 1", &AHashMap::new()).unwrap_err();
        assert!(matches!(err, OdlError::Check { .. }));
    }

    #[test]
    fn fold_answers_reachability_on_checked_subtrees() {
        use crate::lang::ast::NodeKind;
        let compiler = compiler();
        let unit = compiler
            .compile("if (implemented(\"I\")) { X[1] = 0; }", "gate.odl")
            .expect("compile");
        let NodeKind::If { cond, .. } = &unit.ast.items[0].kind else {
            panic!("expected an if statement");
        };
        let folded = compiler.fold(cond);
        assert_eq!(
            folded.into_value().and_then(|v| v.as_bool()),
            Some(true),
            "the baseline carries the I extension"
        );
    }
}
