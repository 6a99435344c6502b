//! Document buffers - the template and data texts being edited

use std::fmt;
use std::path::PathBuf;

use ropey::Rope;

use crate::syntax::{LanguageId, LineEdit};

/// Which of the two panes a buffer backs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Template,
    Data,
}

impl BufferKind {
    /// Language a buffer of this kind is highlighted as
    pub fn language(self) -> LanguageId {
        match self {
            BufferKind::Template => LanguageId::Velocity,
            BufferKind::Data => LanguageId::Json,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BufferKind::Template => "template",
            BufferKind::Data => "data",
        }
    }
}

/// A user edit: replace `deleted_len` chars at `offset` with `inserted`.
///
/// Offsets and lengths are counted in chars, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDelta {
    pub offset: usize,
    pub inserted: String,
    pub deleted_len: usize,
}

impl EditDelta {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            inserted: text.into(),
            deleted_len: 0,
        }
    }

    pub fn delete(offset: usize, len: usize) -> Self {
        Self {
            offset,
            inserted: String::new(),
            deleted_len: len,
        }
    }

    pub fn replace(offset: usize, deleted_len: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            inserted: text.into(),
            deleted_len,
        }
    }

    /// True when applying the delta would not change anything
    pub fn is_noop(&self) -> bool {
        self.deleted_len == 0 && self.inserted.is_empty()
    }
}

/// Error type for an edit that does not fit the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditError {
    pub offset: usize,
    pub deleted_len: usize,
    pub buffer_len: usize,
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edit at {} deleting {} chars is out of bounds for a buffer of {} chars",
            self.offset, self.deleted_len, self.buffer_len
        )
    }
}

impl std::error::Error for EditError {}

/// One editable text buffer and its bookkeeping
#[derive(Debug, Clone)]
pub struct DocumentBuffer {
    pub kind: BufferKind,
    /// The text buffer
    pub buffer: Rope,
    /// Path the text was loaded from, if any
    pub file_path: Option<PathBuf>,
    /// Language used for highlighting
    pub language: LanguageId,
    /// Incremented on every mutation, never reset
    pub version: u64,
    /// Whether the buffer changed since the last `mark_saved`
    pub is_modified: bool,
}

impl DocumentBuffer {
    /// Create an empty buffer
    pub fn new(kind: BufferKind) -> Self {
        Self::with_text(kind, "")
    }

    /// Create a buffer holding `text`, at version 0 and not modified
    pub fn with_text(kind: BufferKind, text: &str) -> Self {
        Self {
            kind,
            buffer: Rope::from(text),
            file_path: None,
            language: kind.language(),
            version: 0,
            is_modified: false,
        }
    }

    /// Remember where the text came from. Does not touch the text.
    pub fn set_path(&mut self, path: PathBuf) {
        self.file_path = Some(path);
    }

    /// Name to show for this buffer: the file name, or the pane name
    pub fn display_name(&self) -> String {
        if let Some(name) = self.file_path.as_ref().and_then(|p| p.file_name()) {
            return name.to_string_lossy().to_string();
        }
        self.kind.display_name().to_string()
    }

    /// Get the number of lines in the document
    pub fn line_count(&self) -> usize {
        self.buffer.len_lines()
    }

    pub fn len_chars(&self) -> usize {
        self.buffer.len_chars()
    }

    /// Current text
    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    /// Owned copy of the text, safe to hand to another thread
    pub fn snapshot(&self) -> String {
        self.text()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_modified
    }

    /// Clear the dirty flag after an outside collaborator persisted the text
    pub fn mark_saved(&mut self) {
        self.is_modified = false;
    }

    /// Apply an edit and report which lines it touched.
    ///
    /// Returns `Ok(None)` for a delta that changes nothing; the version is
    /// left alone in that case.
    pub fn apply(&mut self, delta: &EditDelta) -> Result<Option<LineEdit>, EditError> {
        let len = self.buffer.len_chars();
        let end = delta
            .offset
            .checked_add(delta.deleted_len)
            .filter(|&end| end <= len)
            .ok_or(EditError {
                offset: delta.offset,
                deleted_len: delta.deleted_len,
                buffer_len: len,
            })?;

        if delta.is_noop() {
            return Ok(None);
        }

        // A `\r` right before the edit can pair with a `\n` the edit brings
        // next to it, merging two line breaks into one. Start on its line so
        // the edit covers that join.
        let anchor = match delta.offset.checked_sub(1) {
            Some(prev) if self.buffer.char(prev) == '\r' => prev,
            _ => delta.offset,
        };
        let start_line = self.buffer.char_to_line(anchor);
        let removed = self.buffer.char_to_line(end) - start_line + 1;

        if delta.deleted_len > 0 {
            self.buffer.remove(delta.offset..end);
        }
        if !delta.inserted.is_empty() {
            self.buffer.insert(delta.offset, &delta.inserted);
        }

        let inserted_end = delta.offset + delta.inserted.chars().count();
        let inserted = self.buffer.char_to_line(inserted_end) - start_line + 1;

        self.touch();
        Ok(Some(LineEdit {
            start_line,
            removed,
            inserted,
        }))
    }

    /// Replace the whole text. Always counts as a mutation.
    pub fn set_text(&mut self, text: &str) -> LineEdit {
        let removed = self.buffer.len_lines();
        self.buffer = Rope::from(text);
        self.touch();
        LineEdit {
            start_line: 0,
            removed,
            inserted: self.buffer.len_lines(),
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.is_modified = true;
    }
}
