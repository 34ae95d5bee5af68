//! Command-line wrapper around the ODL compiler core.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ahash::AHashMap;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use odlc::arch::StaticArchitecture;
use odlc::compile::{CompileOptions, Compiler};
use odlc::error::OdlError;
use odlc::eval::folder::Folded;
use odlc::eval::value::Value;
use odlc::lang::literal::parse_u64_literal;
use odlc::serialize::SerializeOptions;

#[derive(Parser, Debug)]
#[clap(name = "odlc", version, about = "Compiler for ODL operation semantics")]
struct AppArgs {
    /// Architecture configuration (JSON); a built-in baseline when omitted.
    #[clap(short = 'a', long = "arch", global = true)]
    arch: Option<PathBuf>,
    /// Effective XLEN; XLEN-dependent widths stay symbolic when omitted.
    #[clap(short = 'x', long = "xlen", global = true)]
    xlen: Option<u32>,
    #[clap(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a source file and emit the serialized AST.
    Compile {
        input: PathBuf,
        /// Output path; stdout when omitted.
        #[clap(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Leave source positions out of the serialized form.
        #[clap(long = "no-positions")]
        no_positions: bool,
    },
    /// Type check a source file without emitting anything.
    Check { input: PathBuf },
    /// Constant-fold a single expression against the configuration.
    Eval {
        expression: String,
        /// NAME=VALUE constant bindings (integer, true/false, or string).
        #[clap(short = 'b', long = "bind")]
        bind: Vec<String>,
    },
}

fn main() -> ExitCode {
    let args = AppArgs::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = SimpleLogger::new().with_level(level).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: AppArgs) -> Result<(), OdlError> {
    let arch = load_architecture(args.arch.as_deref())?;
    let effective_xlen = args.xlen.or(arch.xlen);
    if let Some(xlen) = effective_xlen {
        if xlen != 32 && xlen != 64 {
            return Err(OdlError::Configuration(format!(
                "effective XLEN must be 32 or 64, got {xlen}"
            )));
        }
    }

    match args.command {
        Command::Compile {
            input,
            output,
            no_positions,
        } => {
            let mut serialize = SerializeOptions::default();
            if no_positions {
                serialize.remove(SerializeOptions::INCLUDE_POSITIONS);
            }
            let compiler = Compiler::with_options(
                Arc::new(arch),
                CompileOptions {
                    effective_xlen,
                    serialize,
                },
            );
            let source = fs::read_to_string(&input)?;
            let unit = compiler.compile(&source, input)?;
            let json = unit.to_json();
            match output {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
            Ok(())
        }
        Command::Check { input } => {
            let compiler = Compiler::with_options(
                Arc::new(arch),
                CompileOptions {
                    effective_xlen,
                    ..CompileOptions::default()
                },
            );
            let source = fs::read_to_string(&input)?;
            let ast = compiler.typecheck(&source, input)?;
            eprintln!("ok: {} top-level item(s)", ast.items.len());
            Ok(())
        }
        Command::Eval { expression, bind } => {
            let compiler = Compiler::with_options(
                Arc::new(arch),
                CompileOptions {
                    effective_xlen,
                    ..CompileOptions::default()
                },
            );
            let bindings = parse_bindings(&bind)?;
            match compiler.eval(&expression, &bindings)? {
                Folded::Value(value) => {
                    println!("{value}");
                    Ok(())
                }
                Folded::NotConstant(outcome) => {
                    println!("not constant: {}", outcome.reason);
                    Ok(())
                }
            }
        }
    }
}

fn load_architecture(path: Option<&std::path::Path>) -> Result<StaticArchitecture, OdlError> {
    match path {
        Some(path) => {
            let source = fs::read_to_string(path)?;
            StaticArchitecture::from_json(&source)
        }
        None => Ok(StaticArchitecture::baseline()),
    }
}

/// Parses `NAME=VALUE` pairs: integers use the ODL literal grammar,
/// `true`/`false` bind booleans, anything else binds as a string.
fn parse_bindings(pairs: &[String]) -> Result<AHashMap<String, Value>, OdlError> {
    let mut bindings = AHashMap::new();
    for pair in pairs {
        let (name, raw) = pair.split_once('=').ok_or_else(|| {
            OdlError::Configuration(format!("binding '{pair}' is not NAME=VALUE"))
        })?;
        let value = match raw {
            "true" => Value::bool(true),
            "false" => Value::bool(false),
            raw => match parse_u64_literal(raw) {
                Ok(value) => Value::int(value as u128, 64, false),
                Err(_) => Value::str(raw),
            },
        };
        bindings.insert(name.to_string(), value);
    }
    Ok(bindings)
}
