//! Document update handlers
//!
//! Edits flow through here: buffer mutation, incremental re-highlighting,
//! optional revalidation and optional re-render.

use crate::commands::Cmd;
use crate::messages::DocumentMsg;
use crate::model::{BufferKind, PreviewModel};
use crate::syntax::LineEdit;

use super::render::request_render;

/// Handle document messages
pub fn update_document(model: &mut PreviewModel, msg: DocumentMsg) -> Option<Cmd> {
    match msg {
        DocumentMsg::Edit { kind, delta } => {
            let edit = match model.pane_mut(kind).document.apply(&delta) {
                Ok(Some(edit)) => edit,
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!("Rejected {} edit: {}", kind.display_name(), err);
                    return None;
                }
            };
            Some(after_edit(model, kind, edit))
        }

        DocumentMsg::SetText { kind, text } => {
            let edit = model.pane_mut(kind).document.set_text(&text);
            Some(after_edit(model, kind, edit))
        }

        DocumentMsg::MarkSaved(kind) => {
            model.pane_mut(kind).document.mark_saved();
            None
        }
    }
}

fn after_edit(model: &mut PreviewModel, kind: BufferKind, edit: LineEdit) -> Cmd {
    let validate_on_edit = model.config.validate_on_edit;
    let render_on_edit = model.config.render_on_edit;

    let pane = model.pane_mut(kind);
    let version = pane.document.version;
    let retokenized = pane
        .highlights
        .apply_edit(&pane.document.buffer, edit, version);
    tracing::debug!(
        "{} v{}: re-highlighted {} of {} lines",
        kind.display_name(),
        version,
        retokenized.len(),
        pane.document.line_count()
    );

    if validate_on_edit {
        pane.revalidate();
    }

    if render_on_edit {
        Cmd::batch(vec![Cmd::Redraw, request_render(model)])
    } else {
        Cmd::Redraw
    }
}
