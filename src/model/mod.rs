//! Preview model - the complete state of the previewer
//!
//! This module contains all the state types following the Elm Architecture pattern.

pub mod document;

pub use document::{BufferKind, DocumentBuffer, EditDelta, EditError};

use crate::config::PreviewConfig;
use crate::diagnostics::Diagnostic;
use crate::render::RequestStatus;
use crate::syntax::{LanguageId, SyntaxHighlights};
use crate::validation::validate;

pub const STATUS_RENDERING: &str = "Rendering template...";
pub const STATUS_RENDERED: &str = "Template rendered successfully";
pub const STATUS_FAILED: &str = "Rendering failed";

/// One editable pane: text, highlights and inline diagnostics
#[derive(Debug, Clone)]
pub struct Pane {
    pub document: DocumentBuffer,
    pub highlights: SyntaxHighlights,
    pub diagnostics: Vec<Diagnostic>,
}

impl Pane {
    pub fn new(kind: BufferKind, text: &str) -> Self {
        let document = DocumentBuffer::with_text(kind, text);
        let highlights =
            SyntaxHighlights::from_source(document.language, &document.buffer, document.version);
        let diagnostics = validate(kind, text);
        Self {
            document,
            highlights,
            diagnostics,
        }
    }

    /// Recompute diagnostics from the current text
    pub fn revalidate(&mut self) {
        self.diagnostics = validate(self.document.kind, &self.document.text());
    }
}

/// The read-only output pane
#[derive(Debug, Clone)]
pub struct OutputPane {
    pub text: String,
    pub highlights: SyntaxHighlights,
    /// Diagnostics of the last applied render
    pub diagnostics: Vec<Diagnostic>,
}

impl Default for OutputPane {
    fn default() -> Self {
        Self {
            text: String::new(),
            highlights: SyntaxHighlights::new(LanguageId::PlainText),
            diagnostics: Vec::new(),
        }
    }
}

impl OutputPane {
    /// Show `text`, re-highlighting it from scratch
    pub fn show(&mut self, text: String, generation: u64) {
        let lines = crate::syntax::split_lines(&text);
        self.highlights.rebuild(lines.as_slice(), generation);
        self.text = text;
    }
}

/// Render bookkeeping
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    /// Status of the newest submitted request
    pub status: RequestStatus,
    /// Generation of the newest submitted request still awaiting a result
    pub pending: Option<u64>,
    /// Generation of the last result shown in the output pane
    pub last_applied: Option<u64>,
}

impl RenderState {
    /// True when no submitted request is still outstanding
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }
}

/// The complete previewer model
#[derive(Debug, Clone)]
pub struct PreviewModel {
    pub template: Pane,
    pub data: Pane,
    pub output: OutputPane,
    pub render: RenderState,
    /// Short message for the status bar
    pub status_message: Option<String>,
    pub config: PreviewConfig,
}

impl PreviewModel {
    pub fn new(template: &str, data: &str, config: PreviewConfig) -> Self {
        Self {
            template: Pane::new(BufferKind::Template, template),
            data: Pane::new(BufferKind::Data, data),
            output: OutputPane::default(),
            render: RenderState::default(),
            status_message: None,
            config,
        }
    }

    /// Stamp identifying the current pair of buffer contents. Every edit of
    /// either buffer increases it by one.
    pub fn generation(&self) -> u64 {
        self.template.document.version + self.data.document.version
    }

    pub fn pane(&self, kind: BufferKind) -> &Pane {
        match kind {
            BufferKind::Template => &self.template,
            BufferKind::Data => &self.data,
        }
    }

    pub fn pane_mut(&mut self, kind: BufferKind) -> &mut Pane {
        match kind {
            BufferKind::Template => &mut self.template,
            BufferKind::Data => &mut self.data,
        }
    }

    /// Diagnostics of both panes plus the last render, in display order
    pub fn all_diagnostics(&self) -> Vec<&Diagnostic> {
        self.template
            .diagnostics
            .iter()
            .chain(self.data.diagnostics.iter())
            .chain(self.output.diagnostics.iter())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_starts_at_generation_zero() {
        let model = PreviewModel::new("Hello $name", "{}", PreviewConfig::default());
        assert_eq!(model.generation(), 0);
        assert!(model.render.is_idle());
        assert_eq!(model.render.status, RequestStatus::Idle);
        assert_eq!(model.template.highlights.lines.len(), 1);
    }

    #[test]
    fn test_initial_diagnostics_are_computed() {
        let model = PreviewModel::new("#if($x)", "{oops", PreviewConfig::default());
        assert_eq!(model.template.diagnostics.len(), 1);
        assert_eq!(model.data.diagnostics.len(), 1);
        assert_eq!(model.all_diagnostics().len(), 2);
    }

    #[test]
    fn test_output_pane_highlights_lines() {
        let mut output = OutputPane::default();
        output.show("<b>1</b>\nhttps://example.com".to_string(), 3);
        assert_eq!(output.highlights.lines.len(), 2);
        assert_eq!(output.highlights.revision, 3);
        assert!(!output.highlights.get_line_spans(1).is_empty());
    }
}
