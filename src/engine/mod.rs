//! Template engine boundary
//!
//! The rest of the crate only talks to [`TemplateEngineAdapter`], which
//! wraps any [`TemplateEngine`] behind one `render` call and turns engine
//! failures (including panics) into [`EngineError`].

pub mod velocity;

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticSource};

pub use velocity::{VelocityEngine, VelocityError};

/// Data context a template is merged with
pub type Context = serde_json::Map<String, Value>;

/// A component that merges a template with a data context.
///
/// Implementations must be stateless between calls.
pub trait TemplateEngine: Send + Sync {
    type Error: std::error::Error + Send + 'static;

    /// Human-readable engine name, used in logs
    fn name(&self) -> &'static str;

    fn evaluate(&self, template: &str, context: &Context) -> Result<String, Self::Error>;

    /// 1-based line and 0-based column of a failure, when the engine knows it
    fn error_position(&self, _error: &Self::Error) -> Option<(usize, usize)> {
        None
    }

    /// Output produced before a failure, when the engine keeps it
    fn partial_output(&self, _error: &Self::Error) -> Option<String> {
        None
    }
}

/// Engine configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Fail on unresolved references instead of rendering them literally
    pub strict_references: bool,
    /// Expose the `$format_date(fmt)` helper to templates
    pub helpers: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict_references: false,
            helpers: true,
        }
    }
}

/// Error type for a failed render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub message: String,
    /// 1-based line, when known
    pub line: Option<usize>,
    /// 0-based column, when known
    pub column: Option<usize>,
    pub partial_output: Option<String>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
            partial_output: None,
        }
    }

    /// Convert to a single diagnostic. Unknown positions become line 0.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(
            DiagnosticSource::Engine,
            self.line.unwrap_or(0),
            self.column.unwrap_or(0),
            self.message.clone(),
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "line {}, column {}: {}", line, column + 1, self.message)
            }
            (Some(line), None) => write!(f, "line {}: {}", line, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// Uniform front for a [`TemplateEngine`]
#[derive(Debug, Clone)]
pub struct TemplateEngineAdapter<E> {
    engine: E,
}

impl TemplateEngineAdapter<VelocityEngine> {
    /// Adapter over the built-in Velocity engine
    pub fn velocity(options: EngineOptions) -> Self {
        Self::new(VelocityEngine::new(options))
    }
}

impl<E: TemplateEngine> TemplateEngineAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Render `template` against `context`.
    pub fn render(&self, template: &str, context: &Context) -> Result<String, EngineError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.evaluate(template, context)
        }));

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => {
                let position = self.engine.error_position(&err);
                Err(EngineError {
                    message: err.to_string(),
                    line: position.map(|(line, _)| line),
                    column: position.map(|(_, column)| column),
                    partial_output: self.engine.partial_output(&err),
                })
            }
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("{} engine panicked: {}", self.engine.name(), detail);
                Err(EngineError::new(format!(
                    "An unexpected error occurred during rendering: {}",
                    detail
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingEngine;

    #[derive(Debug)]
    struct NeverError;

    impl std::fmt::Display for NeverError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "never")
        }
    }

    impl std::error::Error for NeverError {}

    impl TemplateEngine for PanickingEngine {
        type Error = NeverError;

        fn name(&self) -> &'static str {
            "panicking"
        }

        fn evaluate(&self, _template: &str, _context: &Context) -> Result<String, NeverError> {
            panic!("engine blew up");
        }
    }

    #[test]
    fn test_panic_becomes_engine_error() {
        let adapter = TemplateEngineAdapter::new(PanickingEngine);
        let err = adapter.render("x", &Context::new()).unwrap_err();
        assert!(err.message.contains("engine blew up"));
        assert_eq!(err.to_diagnostic().line, 0);
    }

    #[test]
    fn test_velocity_error_keeps_position() {
        let adapter = TemplateEngineAdapter::velocity(EngineOptions::default());
        let err = adapter.render("line one\n#end", &Context::new()).unwrap_err();
        assert_eq!(err.line, Some(2));
        assert_eq!(err.column, Some(0));
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.source, DiagnosticSource::Engine);
        assert_eq!(diagnostic.line, 2);
    }

    #[test]
    fn test_display_includes_position() {
        let err = EngineError {
            line: Some(3),
            column: Some(4),
            ..EngineError::new("bad")
        };
        assert_eq!(err.to_string(), "line 3, column 5: bad");
        assert_eq!(EngineError::new("bad").to_string(), "bad");
    }
}
