use std::fmt;
use std::path::PathBuf;

/// Phase of the pipeline that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticPhase {
    Lexer,
    Parser,
    Builder,
    Check,
    Eval,
}

impl DiagnosticPhase {
    /// Short label used when rendering for humans.
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticPhase::Lexer => "lex",
            DiagnosticPhase::Parser => "parse",
            DiagnosticPhase::Builder => "build",
            DiagnosticPhase::Check => "check",
            DiagnosticPhase::Eval => "eval",
        }
    }
}

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

impl DiagnosticLevel {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
        }
    }
}

/// A precise source position (1-indexed line/column) inside an ODL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open [start, end) span referencing a specific ODL source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub path: PathBuf,
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(path: PathBuf, start: SourcePosition, end: SourcePosition) -> Self {
        Self { path, start, end }
    }

    pub fn point(path: PathBuf, position: SourcePosition) -> Self {
        Self {
            path,
            start: position,
            end: position,
        }
    }

    /// `file:line:column` of the span's start, the anchor diagnostics point
    /// at.
    pub fn location(&self) -> String {
        format!("{}:{}", self.path.display(), self.start)
    }
}

/// Structured diagnostic suitable for tooling integration.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: DiagnosticPhase,
    pub level: DiagnosticLevel,
    pub code: &'static str,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn new(
        phase: DiagnosticPhase,
        level: DiagnosticLevel,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            phase,
            level,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn error(
        phase: DiagnosticPhase,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self::new(phase, DiagnosticLevel::Error, code, message, span)
    }

    pub fn format_human(&self) -> String {
        let mut rendered = format!(
            "{phase} {level}: {message} ({code})",
            phase = self.phase.label(),
            level = self.level.label(),
            message = self.message,
            code = self.code,
        );
        if let Some(span) = &self.span {
            rendered.push_str(" at ");
            rendered.push_str(&span.location());
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn formats_phase_code_and_location() {
        let span = SourceSpan::point(PathBuf::from("inst.odl"), SourcePosition::new(4, 11));
        let diag = Diagnostic::error(
            DiagnosticPhase::Check,
            "check.mismatch",
            "operand widths disagree",
            Some(span),
        );
        assert_eq!(
            diag.format_human(),
            "check error: operand widths disagree (check.mismatch) at inst.odl:4:11"
        );
    }

    #[test]
    fn spanless_diagnostics_omit_the_location() {
        let diag = Diagnostic::error(
            DiagnosticPhase::Eval,
            "eval.not-constant",
            "value depends on run-time state",
            None,
        );
        assert_eq!(
            diag.format_human(),
            "eval error: value depends on run-time state (eval.not-constant)"
        );
    }
}
