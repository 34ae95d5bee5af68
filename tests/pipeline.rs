use std::sync::Arc;

use ahash::AHashMap;

use odlc::arch::{CsrDef, StaticArchitecture};
use odlc::check::types::{Type, Width};
use odlc::compile::{CompileOptions, Compiler};
use odlc::error::OdlError;
use odlc::eval::folder::Folded;
use odlc::eval::value::Value;
use odlc::serialize::{SerializeOptions, SerializedAst, reconstruct, serialize};

fn rv_arch() -> StaticArchitecture {
    let source = r#"{
        "xlen": null,
        "extensions": [
            {"name": "I", "version": "2.1"},
            {"name": "C", "version": "2.0"}
        ],
        "parameters": {
            "CACHE_BLOCK_SIZE": {"kind": "int", "width": 16, "value": 64},
            "MXLEN_PARAM": {"kind": "int", "width": 8}
        },
        "register_files": [{"name": "X", "count": 32, "width": "xlen"}],
        "csrs": [
            {"name": "mstatus", "width": "xlen"},
            {"name": "mcause", "width": "xlen"},
            {"name": "vtype", "width": "xlen", "requires": {"name": "V", "version": "1.0"}}
        ]
    }"#;
    StaticArchitecture::from_json(source).expect("architecture config")
}

fn compiler() -> Compiler {
    Compiler::new(Arc::new(rv_arch()))
}

fn compiler_with_xlen(xlen: u32) -> Compiler {
    Compiler::with_options(
        Arc::new(rv_arch()),
        CompileOptions {
            effective_xlen: Some(xlen),
            serialize: SerializeOptions::default(),
        },
    )
}

#[test]
fn compiles_register_transfer_semantics() {
    let source = "XReg a = X[1];\nXReg b = X[2];\nX[3] = a + b;\n";
    let unit = compiler().compile(source, "add.odl").expect("compile");
    assert_eq!(unit.ast.items.len(), 3);
    for item in &unit.ast.items {
        assert_eq!(
            item.ty,
            Type::Bits {
                width: Width::Xlen,
                signed: false
            },
            "each top-level statement carries Bits<XLEN>"
        );
    }
}

#[test]
fn effective_xlen_pins_register_widths() {
    let unit = compiler_with_xlen(64)
        .compile("XReg a = X[1];", "one.odl")
        .expect("compile");
    assert_eq!(unit.ast.items[0].ty, Type::bits(64));
}

#[test]
fn full_operation_with_functions_loops_and_csrs() {
    let source = "\
function clamp(XReg v, XReg hi) -> XReg {\n\
    if (v < hi) { return v; }\n\
    return hi;\n\
}\n\
constant Bits<8> STEP = 8'h04;\n\
XReg base = X[1];\n\
for (Bits<6> i = 1; i < 31; i = i + 1) {\n\
    X[i] = clamp(base, CSR[mstatus]);\n\
}\n\
CSR[mcause] = base[7:0] == 8'd2 ? base : X[2];\n";
    let unit = compiler().compile(source, "op.odl").expect("compile");
    assert_eq!(unit.ast.items.len(), 5);
}

#[test]
fn undeclared_identifiers_fail_with_position() {
    let err = compiler().compile("a + b;", "bad.odl").unwrap_err();
    let OdlError::Check { diagnostics } = err else {
        panic!("expected check diagnostics");
    };
    assert_eq!(diagnostics[0].code, "check.undeclared-identifier");
    assert!(diagnostics[0].message.contains("'a'"));
    let span = diagnostics[0].span.as_ref().expect("span");
    assert_eq!((span.start.line, span.start.column), (1, 1));
}

#[test]
fn malformed_literals_fail_before_checking() {
    // The declaration would also fail the checker, but the builder rejects
    // the literal first.
    let err = compiler()
        .compile("Bits<3> f = 3'd9;", "lit.odl")
        .unwrap_err();
    assert!(matches!(err, OdlError::MalformedLiteral(_)));
}

#[test]
fn syntax_errors_carry_expected_token() {
    let err = compiler().compile("if (a { }", "syn.odl").unwrap_err();
    let OdlError::Syntax(diag) = err else {
        panic!("expected syntax error");
    };
    assert!(diag.message.contains("expected"));
    assert!(diag.span.is_some());
}

#[test]
fn serialized_form_round_trips_byte_identically() {
    let source = "\
function swap_halves(XReg v) -> XReg {\n\
    return v << 16 | v >> 16;\n\
}\n\
X[10] = swap_halves(X[11]);\n";
    let unit = compiler_with_xlen(32).compile(source, "swap.odl").expect("compile");
    let json = unit.to_json();
    let decoded = SerializedAst::from_json(&json).expect("decode");
    let rebuilt = reconstruct(&decoded).expect("reconstruct");
    let again = serialize(&rebuilt, SerializeOptions::default()).to_json();
    assert_eq!(json, again);
    assert_eq!(unit.digest(), decoded.digest());
}

#[test]
fn constant_evaluation_answers_reachability() {
    let compiler = compiler();
    let no_bindings = AHashMap::new();

    let four = compiler.eval("2 + 2", &no_bindings).expect("eval");
    assert_eq!(four.into_value().and_then(|v| v.as_u128()), Some(4));

    let gated = compiler
        .eval("implemented(\"C\", \"2.0\")", &no_bindings)
        .expect("eval");
    assert_eq!(gated.into_value().and_then(|v| v.as_bool()), Some(true));

    let absent = compiler
        .eval("implemented(\"V\")", &no_bindings)
        .expect("eval");
    assert_eq!(absent.into_value().and_then(|v| v.as_bool()), Some(false));

    // Short-circuit keeps an unresolved parameter from poisoning the fold.
    let reachable = compiler
        .eval("true || MXLEN_PARAM == 8'd64", &no_bindings)
        .expect("eval");
    assert_eq!(reachable.into_value().and_then(|v| v.as_bool()), Some(true));

    let unresolved = compiler
        .eval("MXLEN_PARAM + 1", &no_bindings)
        .expect("eval");
    match unresolved {
        Folded::NotConstant(outcome) => {
            assert!(outcome.reason.contains("MXLEN_PARAM"))
        }
        Folded::Value(value) => panic!("expected not-constant, got {value:?}"),
    }
}

#[test]
fn eval_accepts_caller_bindings() {
    let mut bindings = AHashMap::new();
    bindings.insert("rs1".to_string(), Value::int(12, 8, false));
    bindings.insert("rs2".to_string(), Value::int(5, 8, false));
    let folded = compiler()
        .eval("rs1 > rs2 ? rs1 - rs2 : rs2 - rs1", &bindings)
        .expect("eval");
    assert_eq!(folded.into_value().and_then(|v| v.as_u128()), Some(7));
}

#[test]
fn checked_output_never_accompanies_diagnostics() {
    // Compilation either returns a unit or a diagnostic, never both; the
    // public API encodes this in the Result, so a failing source must not
    // produce any serialized output path.
    let result = compiler().compile("XReg a = X[1] + true;", "mix.odl");
    assert!(result.is_err());
}

#[test]
fn csrs_gated_on_absent_extensions_still_typecheck() {
    // vtype exists in the model; whether the V extension is enabled is a
    // reachability question for the evaluator, not a type error.
    compiler()
        .typecheck("XReg t = CSR[vtype];", "vtype.odl")
        .expect("typecheck");
    let gate = compiler()
        .eval("implemented(\"V\", \"1.0\")", &AHashMap::new())
        .expect("eval");
    assert_eq!(gate.into_value().and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn architecture_config_loads_from_disk() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{"xlen": 32, "register_files": [{{"name": "X", "count": 16, "width": {{"fixed": 32}}}}]}}"#
    )
    .expect("write config");
    let source = std::fs::read_to_string(file.path()).expect("read back");
    let arch = StaticArchitecture::from_json(&source).expect("parse config");
    assert_eq!(arch.xlen, Some(32));
    let compiler = Compiler::new(Arc::new(arch));
    let err = compiler.typecheck("XReg a = X[20];", "small.odl").unwrap_err();
    let OdlError::Check { diagnostics } = err else {
        panic!("expected check diagnostics");
    };
    assert_eq!(diagnostics[0].code, "check.register-index-range");
}

#[test]
fn concurrent_compilations_share_the_architecture() {
    let arch: Arc<StaticArchitecture> = Arc::new(rv_arch());
    let mut handles = Vec::new();
    for index in 0..4 {
        let arch = Arc::clone(&arch);
        handles.push(std::thread::spawn(move || {
            let compiler = Compiler::new(arch);
            let source = format!("XReg a = X[{index}];\nX[{}] = a;\n", index + 1);
            compiler.compile(&source, "thread.odl").map(|unit| unit.digest())
        }));
    }
    for handle in handles {
        handle.join().expect("thread").expect("compile");
    }
}

#[test]
fn unknown_csr_is_reported_against_the_model() {
    let err = compiler()
        .typecheck("XReg t = CSR[nonexistent];", "csr.odl")
        .unwrap_err();
    let OdlError::Check { diagnostics } = err else {
        panic!("expected check diagnostics");
    };
    assert_eq!(diagnostics[0].code, "check.unknown-csr");
}

#[test]
fn width_types_follow_the_promotion_law() {
    let source = "\
Bits<8> narrow = 8'hFF;\n\
Bits<24> wide = 24'h00FFFF;\n\
Bits<24> sum = narrow + wide;\n";
    let unit = compiler().compile(source, "widths.odl").expect("compile");
    if let odlc::lang::ast::NodeKind::Decl { init, .. } = &unit.ast.items[2].kind {
        assert_eq!(init.as_ref().expect("init").ty, Type::bits(24));
    } else {
        panic!("expected declaration");
    }
}

#[test]
fn csr_write_requires_compatible_width() {
    let mut arch = rv_arch();
    arch.csrs.push(CsrDef {
        name: "narrowcsr".to_string(),
        width: Width::Fixed(8),
        requires: None,
    });
    let compiler = Compiler::new(Arc::new(arch));
    let err = compiler
        .typecheck("XReg a = X[1];\nCSR[narrowcsr] = a;\n", "narrow.odl")
        .unwrap_err();
    let OdlError::Check { diagnostics } = err else {
        panic!("expected check diagnostics");
    };
    assert_eq!(diagnostics[0].code, "check.mismatch");
}
