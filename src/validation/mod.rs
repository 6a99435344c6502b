//! Inline validation of the template and data panes
//!
//! Both checks are synchronous, never fail, and return diagnostics ordered
//! by position. An empty list means the text is fine.

mod data;
mod template;

pub use data::{parse_context, validate_data, DataParseError};
pub use template::validate_template;

use crate::diagnostics::Diagnostic;
use crate::model::BufferKind;

/// Validate a buffer according to what it holds
pub fn validate(kind: BufferKind, text: &str) -> Vec<Diagnostic> {
    match kind {
        BufferKind::Template => validate_template(text),
        BufferKind::Data => validate_data(text),
    }
}
