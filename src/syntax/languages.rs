//! Language identification and detection
//!
//! Maps file extensions to language IDs and language IDs to tokenizers.

use std::path::Path;

use super::{JsonTokenizer, OutputTokenizer, Tokenizer, VelocityTokenizer};

static VELOCITY: VelocityTokenizer = VelocityTokenizer;
static JSON: JsonTokenizer = JsonTokenizer;
static OUTPUT: OutputTokenizer = OutputTokenizer;

/// Supported language identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LanguageId {
    /// Rendered output; highlights tags, links and numbers only
    #[default]
    PlainText,
    Velocity,
    Json,
}

impl LanguageId {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "vm" | "vtl" | "velocity" => LanguageId::Velocity,
            "json" => LanguageId::Json,
            _ => LanguageId::PlainText,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(LanguageId::PlainText)
    }

    /// Get display name for the language
    pub fn display_name(&self) -> &'static str {
        match self {
            LanguageId::PlainText => "Plain Text",
            LanguageId::Velocity => "Velocity",
            LanguageId::Json => "JSON",
        }
    }

    /// Tokenizer used to highlight documents of this language
    pub fn tokenizer(&self) -> &'static dyn Tokenizer {
        match self {
            LanguageId::PlainText => &OUTPUT,
            LanguageId::Velocity => &VELOCITY,
            LanguageId::Json => &JSON,
        }
    }
}
