//! Diagnostic collection.
//!
//! The code generator does not return errors directly; it appends
//! [`Diagnostic`]s to an [`ErrorCollector`] supplied by the driver and aborts
//! the walk. A collector with zero error-severity entries signals success.

use std::fmt;

use crate::ast::Span;
use crate::error::CodegenError;

/// Diagnostic severity. Only `Error` entries make a compilation fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single reported problem, anchored to a source span.
#[derive(Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub error: CodegenError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{}: {} (at bytes {}..{})",
            tag, self.error, self.span.start, self.span.end
        )
    }
}

/// Accumulates diagnostics across one translation.
///
/// Owned by the driver and passed into the code generator; the generator only
/// ever appends. `has_errors()` is the success signal for the whole
/// translation: if it returns true, the produced IR program must be discarded.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error-severity diagnostic.
    pub fn report(&mut self, span: Span, error: CodegenError) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            span,
            error,
        });
    }

    /// Appends a warning-severity diagnostic.
    pub fn warn(&mut self, span: Span, error: CodegenError) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            span,
            error,
        });
    }

    /// True if any error-severity diagnostic has been reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
