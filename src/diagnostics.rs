//! Compiler diagnostics
//!
//! Errors and warnings carry a source file and span and are collected per
//! file on the Program. Errors never halt the tree walk: the emission
//! context of the offending node is discarded and the walk continues, so one
//! invocation can report many errors. Warnings never suppress output.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ast::types::{Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A single diagnostic message tied to a source location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn warning(file: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn error_at(file: impl Into<String>, pos: Position, message: impl Into<String>) -> Self {
        Self::error(file, Span::point(pos), message)
    }

    pub fn warning_at(file: impl Into<String>, pos: Position, message: impl Into<String>) -> Self {
        Self::warning(file, Span::point(pos), message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Positions are stored 0-based and displayed 1-based
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file,
            self.span.start.line + 1,
            self.span.start.column + 1,
            self.severity.as_str(),
            self.message
        )
    }
}

/// An assertion violation inside the compiler. Aborts the walk.
#[derive(Debug, Clone, Error)]
#[error("internal compiler error: {message}\nThis is a bug in bashpp. Please file a bug report.")]
pub struct InternalError {
    pub message: String,
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_one_based() {
        let diag = Diagnostic::error_at("main.bpp", Position::new(0, 4), "Object not found: x");
        assert_eq!(diag.to_string(), "main.bpp:1:5: error: Object not found: x");
    }

    #[test]
    fn test_warning_severity() {
        let diag = Diagnostic::warning_at("a.bpp", Position::new(2, 0), "suspicious cast");
        assert!(!diag.is_error());
        assert!(diag.to_string().contains("warning"));
    }
}
