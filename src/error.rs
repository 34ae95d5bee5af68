use std::fmt;

use crate::diagnostic::Diagnostic;

/// Represents any failure that can occur while lexing, parsing, building,
/// checking, or evaluating ODL sources.
#[derive(Debug)]
pub enum OdlError {
    Io(std::io::Error),
    /// Malformed grammar; the parser and lexer fail fast with one diagnostic.
    Syntax(Diagnostic),
    /// A literal outside its representable range, caught at AST build time.
    MalformedLiteral(Diagnostic),
    /// Type checking failed; every diagnostic from the pass is retained.
    Check { diagnostics: Vec<Diagnostic> },
    /// The architecture model is missing data the compiler requires.
    Configuration(String),
}

impl OdlError {
    /// The first (or only) diagnostic carried by this error, when there is one.
    pub fn primary_diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            OdlError::Syntax(diag) | OdlError::MalformedLiteral(diag) => Some(diag),
            OdlError::Check { diagnostics } => diagnostics.first(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OdlError {
    fn from(err: std::io::Error) -> Self {
        OdlError::Io(err)
    }
}

impl fmt::Display for OdlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdlError::Io(err) => write!(f, "I/O error: {err}"),
            // The diagnostic rendering already names the failing phase.
            OdlError::Syntax(diag) | OdlError::MalformedLiteral(diag) => {
                write!(f, "{}", diag.format_human())
            }
            OdlError::Check { diagnostics } => {
                writeln!(f, "type check produced {} issue(s):", diagnostics.len())?;
                for diag in diagnostics {
                    writeln!(f, "  - {}", diag.format_human())?;
                }
                Ok(())
            }
            OdlError::Configuration(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for OdlError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticPhase, SourcePosition, SourceSpan};
    use std::path::PathBuf;

    #[test]
    fn check_errors_list_every_diagnostic() {
        let span = SourceSpan::point(PathBuf::from("op.odl"), SourcePosition::new(2, 5));
        let err = OdlError::Check {
            diagnostics: vec![
                Diagnostic::error(
                    DiagnosticPhase::Check,
                    "check.undeclared-identifier",
                    "identifier 'a' is not declared",
                    Some(span.clone()),
                ),
                Diagnostic::error(
                    DiagnosticPhase::Check,
                    "check.undeclared-identifier",
                    "identifier 'b' is not declared",
                    Some(span),
                ),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("2 issue(s)"));
        assert!(rendered.contains("identifier 'a'"));
        assert!(rendered.contains("identifier 'b'"));
        assert_eq!(
            err.primary_diagnostic().map(|diag| diag.code),
            Some("check.undeclared-identifier")
        );
    }
}
