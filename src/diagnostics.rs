//! Diagnostics reported by validation and rendering

use std::fmt;

use serde::Serialize;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Which pane or stage a diagnostic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSource {
    Template,
    Data,
    Engine,
}

/// A positioned problem report.
///
/// `line` is 1-based; 0 means the position is unknown. `column` is 0-based
/// and counted in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub severity: Severity,
    pub source: DiagnosticSource,
}

impl Diagnostic {
    pub fn error(
        source: DiagnosticSource,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            severity: Severity::Error,
            source,
        }
    }

    pub fn warning(
        source: DiagnosticSource,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(source, line, column, message)
        }
    }

    /// Whether the diagnostic carries a usable position
    pub fn has_position(&self) -> bool {
        self.line > 0
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.has_position() {
            write!(
                f,
                "{}:{}: {}: {}",
                self.line,
                self.column + 1,
                severity,
                self.message
            )
        } else {
            write!(f, "{}: {}", severity, self.message)
        }
    }
}

/// Sort diagnostics by position; unknown positions go first.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by_key(|d| (d.line, d.column));
}
