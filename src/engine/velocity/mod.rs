//! Built-in Velocity Template Language engine
//!
//! Implements the commonly used part of VTL: references with property,
//! index and method chains, `#set`, `#if`/`#elseif`/`#else`, `#foreach`,
//! `#break`, `#stop`, `#macro`, `#define`, `#evaluate`, comments, unparsed
//! blocks, escapes and the expression language (lists, ranges, maps,
//! arithmetic, comparison and logical operators).
//!
//! Unresolved references render as their source text unless strict mode is
//! on; quiet references (`$!name`) render as nothing.

mod eval;
mod parser;
mod value;

use std::fmt;

use super::{Context, EngineOptions, TemplateEngine};
use eval::Evaluator;

/// Nesting limit for blocks and expressions while parsing, and for macro
/// calls, `#define` and `#evaluate` while rendering
pub(crate) const MAX_DEPTH: usize = 64;

/// Which stage a Velocity failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Render,
}

/// Error type for Velocity parsing and rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VelocityError {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based line
    pub line: Option<usize>,
    /// 0-based column
    pub column: Option<usize>,
    pub partial_output: Option<String>,
}

impl VelocityError {
    pub(crate) fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        at: Option<(usize, usize)>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            line: at.map(|(line, _)| line),
            column: at.map(|(_, column)| column),
            partial_output: None,
        }
    }
}

impl fmt::Display for VelocityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Syntax => write!(f, "Syntax error: {}", self.message),
            ErrorKind::Render => write!(f, "Render error: {}", self.message),
        }
    }
}

impl std::error::Error for VelocityError {}

/// The built-in engine. Holds only configuration; every call starts from a
/// fresh evaluation context.
#[derive(Debug, Clone, Default)]
pub struct VelocityEngine {
    options: EngineOptions,
}

impl VelocityEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}

impl TemplateEngine for VelocityEngine {
    type Error = VelocityError;

    fn name(&self) -> &'static str {
        "Velocity"
    }

    fn evaluate(&self, template: &str, context: &Context) -> Result<String, VelocityError> {
        let parsed = parser::parse(template)?;
        let mut evaluator = Evaluator::new(&self.options, parsed.macros, context);
        let mut out = String::new();
        match evaluator.render(&parsed.nodes, &mut out) {
            Ok(_) => Ok(out),
            Err(mut err) => {
                if !out.is_empty() {
                    err.partial_output = Some(out);
                }
                Err(err)
            }
        }
    }

    fn error_position(&self, error: &VelocityError) -> Option<(usize, usize)> {
        Some((error.line?, error.column.unwrap_or(0)))
    }

    fn partial_output(&self, error: &VelocityError) -> Option<String> {
        error.partial_output.clone()
    }
}
