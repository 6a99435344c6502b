//! Syntax highlighting module
//!
//! Hand-written, line-oriented tokenizers with:
//! - Language detection from file extensions
//! - Per-line end states so multi-line constructs survive edits
//! - Incremental re-highlighting that stops once line states stabilize
//!
//! ## Architecture
//!
//! ```text
//! Document Edit → LineEdit → SyntaxHighlights::apply_edit
//!              → Tokenizer::highlight_line (edited lines + propagation)
//!              → Cmd::Redraw
//! ```
//!
//! ## Supported Languages
//!
//! - Velocity templates
//! - JSON data
//! - Rendered output (HTML tags, URLs, e-mail addresses, numbers)

mod highlights;
mod json;
mod languages;
mod output;
mod velocity;

use std::borrow::Cow;

pub use highlights::{
    HighlightSpan, LineEdit, LineHighlights, LineState, StyleTag, SyntaxHighlights,
};
pub use json::JsonTokenizer;
pub use languages::LanguageId;
pub use output::OutputTokenizer;
pub use velocity::{VelocityTokenizer, DIRECTIVES, HELPER_FUNCTIONS};
pub(crate) use velocity::ARG_DIRECTIVES;

/// Line-at-a-time tokenizer.
///
/// Implementors produce spans for a single line given the state the previous
/// line ended in. Span columns are char offsets within `line`, which never
/// includes its line terminator.
pub trait Tokenizer: Send + Sync {
    /// Human-readable name (e.g., "Velocity", "JSON")
    fn name(&self) -> &'static str;

    /// Tokenize one line. Returns `(spans, state_after)`.
    fn highlight_line(&self, line: &str, state: LineState) -> (Vec<HighlightSpan>, LineState);
}

/// Random access to the lines of a document, without terminators.
pub trait LineSource {
    fn line_count(&self) -> usize;

    /// Text of line `idx`; empty for out-of-range lines.
    fn line(&self, idx: usize) -> Cow<'_, str>;
}

impl LineSource for [&str] {
    fn line_count(&self) -> usize {
        self.len()
    }

    fn line(&self, idx: usize) -> Cow<'_, str> {
        let line = self.get(idx).copied().unwrap_or("");
        Cow::Borrowed(line.strip_suffix('\r').unwrap_or(line))
    }
}

impl LineSource for ropey::Rope {
    fn line_count(&self) -> usize {
        self.len_lines()
    }

    fn line(&self, idx: usize) -> Cow<'_, str> {
        if idx >= self.len_lines() {
            return Cow::Borrowed("");
        }
        let line: Cow<'_, str> = self.line(idx).into();
        match line {
            Cow::Borrowed(s) => Cow::Borrowed(trim_line_ending(s)),
            Cow::Owned(s) => Cow::Owned(trim_line_ending(&s).to_string()),
        }
    }
}

fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Split text into lines the same way a rope counts them: a trailing newline
/// yields a final empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Collects spans for one line, skipping empty ranges.
#[derive(Debug, Default)]
pub(crate) struct SpanBuilder {
    spans: Vec<HighlightSpan>,
}

impl SpanBuilder {
    pub(crate) fn push(&mut self, start: usize, end: usize, style: StyleTag) {
        if end <= start {
            return;
        }
        debug_assert!(
            self.spans.last().map_or(true, |last| last.end() <= start),
            "overlapping span at {start}"
        );
        self.spans.push(HighlightSpan::new(start, end, style));
    }

    /// Number of spans pushed so far, for [`SpanBuilder::collapse_from`]
    pub(crate) fn mark(&self) -> usize {
        self.spans.len()
    }

    /// Replace every span pushed since `mark` with one span over `start..end`.
    pub(crate) fn collapse_from(&mut self, mark: usize, start: usize, end: usize, style: StyleTag) {
        self.spans.truncate(mark);
        self.push(start, end, style);
    }

    pub(crate) fn finish(self) -> Vec<HighlightSpan> {
        self.spans
    }
}
