//! Syntax highlighting data structures
//!
//! Defines spans, per-line tokenizer state, and the document-level store
//! that re-highlights incrementally after an edit.

use std::ops::Range;

use serde::Serialize;

use super::languages::LanguageId;
use super::{LineSource, Tokenizer};

/// Style of a highlighted span. Gaps between spans use the default style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleTag {
    Comment,
    Directive,
    Macro,
    Variable,
    Property,
    Method,
    String,
    Number,
    Operator,
    Keyword,
    Literal,
    Punctuation,
    Unparsed,
    Key,
    Tag,
    Url,
    Email,
    Error,
}

impl StyleTag {
    /// Every style, in a stable order
    pub const ALL: &'static [StyleTag] = &[
        StyleTag::Comment,
        StyleTag::Directive,
        StyleTag::Macro,
        StyleTag::Variable,
        StyleTag::Property,
        StyleTag::Method,
        StyleTag::String,
        StyleTag::Number,
        StyleTag::Operator,
        StyleTag::Keyword,
        StyleTag::Literal,
        StyleTag::Punctuation,
        StyleTag::Unparsed,
        StyleTag::Key,
        StyleTag::Tag,
        StyleTag::Url,
        StyleTag::Email,
        StyleTag::Error,
    ];

    /// Capture-style name used by themes
    pub fn name(self) -> &'static str {
        match self {
            StyleTag::Comment => "comment",
            StyleTag::Directive => "keyword.directive",
            StyleTag::Macro => "function.macro",
            StyleTag::Variable => "variable",
            StyleTag::Property => "property",
            StyleTag::Method => "function.method",
            StyleTag::String => "string",
            StyleTag::Number => "number",
            StyleTag::Operator => "operator",
            StyleTag::Keyword => "keyword.operator",
            StyleTag::Literal => "constant.builtin",
            StyleTag::Punctuation => "punctuation.bracket",
            StyleTag::Unparsed => "string.special",
            StyleTag::Key => "property.key",
            StyleTag::Tag => "tag",
            StyleTag::Url => "text.uri",
            StyleTag::Email => "text.uri.email",
            StyleTag::Error => "error",
        }
    }
}

/// A single highlighted span within a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    /// Start column (0-indexed, in chars)
    pub start: usize,
    /// Length in chars, always at least 1
    pub len: usize,
    pub style: StyleTag,
}

impl HighlightSpan {
    pub fn new(start: usize, end: usize, style: StyleTag) -> Self {
        debug_assert!(end > start, "empty span {start}..{end}");
        Self {
            start,
            len: end - start,
            style,
        }
    }

    /// End column (exclusive)
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Tokenizer state at the end of a line, carried into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LineState {
    #[default]
    Normal,
    /// Inside `#* ... *#`
    InBlockComment,
    /// Inside `#[[ ... ]]#`
    InUnparsed,
    /// Inside the parenthesized arguments of a directive
    InDirectiveArgs { depth: u16 },
}

/// Highlight information for a single line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineHighlights {
    /// Spans sorted by start column
    pub spans: Vec<HighlightSpan>,
    /// State after the last character of the line
    pub end_state: LineState,
}

/// A line-granular description of an edit, used to splice the per-line store.
///
/// `removed` lines starting at `start_line` were replaced by `inserted` lines.
/// Both counts are at least 1: even an in-line edit touches one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEdit {
    pub start_line: usize,
    pub removed: usize,
    pub inserted: usize,
}

impl LineEdit {
    /// An edit confined to a single line
    pub fn single_line(line: usize) -> Self {
        Self {
            start_line: line,
            removed: 1,
            inserted: 1,
        }
    }
}

/// Complete highlight state for a document
#[derive(Debug, Clone, Default)]
pub struct SyntaxHighlights {
    /// Per-line spans and end states, indexed by line number
    pub lines: Vec<LineHighlights>,
    /// Document version this corresponds to
    pub revision: u64,
    pub language: LanguageId,
}

impl SyntaxHighlights {
    /// Create new empty highlights for a language
    pub fn new(language: LanguageId) -> Self {
        Self {
            lines: Vec::new(),
            revision: 0,
            language,
        }
    }

    /// Highlight a whole document from scratch
    pub fn from_source<S: LineSource + ?Sized>(
        language: LanguageId,
        source: &S,
        revision: u64,
    ) -> Self {
        let mut highlights = Self::new(language);
        highlights.rebuild(source, revision);
        highlights
    }

    /// Re-tokenize every line starting from `Normal`
    pub fn rebuild<S: LineSource + ?Sized>(&mut self, source: &S, revision: u64) {
        self.lines = tokenize_all(self.language.tokenizer(), source);
        self.revision = revision;
    }

    /// Get highlight spans for a line, or empty slice if none
    pub fn get_line_spans(&self, line: usize) -> &[HighlightSpan] {
        self.lines
            .get(line)
            .map(|lh| lh.spans.as_slice())
            .unwrap_or(&[])
    }

    /// State a line starts in: the stored end state of the previous line.
    pub fn incoming_state(&self, line: usize) -> LineState {
        if line == 0 {
            return LineState::Normal;
        }
        self.lines
            .get(line - 1)
            .map(|lh| lh.end_state)
            .unwrap_or_default()
    }

    /// Re-highlight after an edit, touching as few lines as possible.
    ///
    /// The edited lines are always re-tokenized. Past them, tokenization
    /// continues only while a line's new end state differs from the stored
    /// one; the first match means every later line sees the same incoming
    /// state as before. Returns the range of lines that were re-tokenized.
    pub fn apply_edit<S: LineSource + ?Sized>(
        &mut self,
        source: &S,
        edit: LineEdit,
        revision: u64,
    ) -> Range<usize> {
        let total = source.line_count();
        let LineEdit {
            start_line: start,
            removed,
            inserted,
        } = edit;

        let in_sync = removed > 0
            && inserted > 0
            && start + removed <= self.lines.len()
            && self.lines.len() - removed + inserted == total;
        if !in_sync {
            tracing::warn!(
                "Highlight store out of sync ({} stored lines, edit {:?}, {} document lines), rebuilding",
                self.lines.len(),
                edit,
                total
            );
            self.rebuild(source, revision);
            return 0..total;
        }

        // End state of the last replaced line: what the last inserted line
        // must reproduce for later lines to be unaffected.
        let replaced_tail_state = self.lines[start + removed - 1].end_state;
        self.lines.splice(
            start..start + removed,
            std::iter::repeat_with(LineHighlights::default).take(inserted),
        );

        let tokenizer = self.language.tokenizer();
        let edited_end = start + inserted;
        let mut state = self.incoming_state(start);
        let mut line = start;

        while line < total {
            let text = source.line(line);
            let (spans, end_state) = tokenizer.highlight_line(&text, state);
            let stored = std::mem::replace(&mut self.lines[line], LineHighlights { spans, end_state })
                .end_state;

            let previous = if line + 1 == edited_end {
                replaced_tail_state
            } else {
                stored
            };
            let stable = line + 1 >= edited_end && end_state == previous;

            line += 1;
            if stable {
                break;
            }
            state = end_state;
        }

        self.revision = revision;
        tracing::debug!(
            "Re-highlighted lines {}..{} of {} (edit at line {})",
            start,
            line,
            total,
            start
        );
        start..line
    }

    /// Check the no-drift invariant: a from-scratch pass reproduces the store.
    pub fn is_consistent<S: LineSource + ?Sized>(&self, source: &S) -> bool {
        self.lines == tokenize_all(self.language.tokenizer(), source)
    }
}

fn tokenize_all<S: LineSource + ?Sized>(
    tokenizer: &dyn Tokenizer,
    source: &S,
) -> Vec<LineHighlights> {
    let mut state = LineState::Normal;
    let mut lines = Vec::with_capacity(source.line_count());
    for idx in 0..source.line_count() {
        let (spans, end_state) = tokenizer.highlight_line(&source.line(idx), state);
        lines.push(LineHighlights { spans, end_state });
        state = end_state;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.split('\n').collect()
    }

    #[test]
    fn test_style_names_are_unique() {
        let mut names: Vec<_> = StyleTag::ALL.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), StyleTag::ALL.len());
    }

    #[test]
    fn test_single_line_edit_stops_at_stable_state() {
        let before = lines("a $x\nb $y\nc $z\nd");
        let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &before[..], 0);

        let after = lines("a $xx\nb $y\nc $z\nd");
        let range = highlights.apply_edit(&after[..], LineEdit::single_line(0), 1);

        assert_eq!(range, 0..1);
        assert_eq!(highlights.revision, 1);
        assert!(highlights.is_consistent(&after[..]));
    }

    #[test]
    fn test_opening_comment_propagates_to_end() {
        let before = lines("one\ntwo\nthree\nfour");
        let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &before[..], 0);

        let after = lines("#* one\ntwo\nthree\nfour");
        let range = highlights.apply_edit(&after[..], LineEdit::single_line(0), 1);

        assert_eq!(range, 0..4);
        assert!(highlights
            .lines
            .iter()
            .all(|lh| lh.end_state == LineState::InBlockComment));
    }

    #[test]
    fn test_closing_comment_stops_after_close() {
        let before = lines("#* one\ntwo\nthree\nfour");
        let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &before[..], 0);

        let after = lines("#* one\ntwo *#\nthree\nfour");
        let range = highlights.apply_edit(&after[..], LineEdit::single_line(1), 1);

        // Every later line leaves the comment, so none of them is stable.
        assert_eq!(range, 1..4);
        assert_eq!(highlights.lines[3].end_state, LineState::Normal);
        assert!(highlights.is_consistent(&after[..]));
    }

    #[test]
    fn test_line_insertion_splices_store() {
        let before = lines("a\nb\nc");
        let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &before[..], 0);

        let after = lines("a\nb\n$new\nmore\nc");
        let edit = LineEdit {
            start_line: 1,
            removed: 1,
            inserted: 3,
        };
        let range = highlights.apply_edit(&after[..], edit, 1);

        assert_eq!(range, 1..4);
        assert_eq!(highlights.lines.len(), 5);
        assert!(highlights.is_consistent(&after[..]));
    }

    #[test]
    fn test_out_of_sync_edit_rebuilds() {
        let before = lines("a\nb");
        let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &before[..], 0);

        let after = lines("a\nb\nc\nd");
        let range = highlights.apply_edit(&after[..], LineEdit::single_line(0), 3);

        assert_eq!(range, 0..4);
        assert_eq!(highlights.lines.len(), 4);
    }
}
