//! Update functions for the Elm-style architecture
//!
//! All state transformations flow through these functions.

mod document;
mod render;

use crate::commands::Cmd;
use crate::messages::{Msg, RenderMsg};
use crate::model::PreviewModel;

#[cfg(debug_assertions)]
use tracing::{debug, span, Level};

pub use document::update_document;
pub use render::{reject_request, request_render, update_render, WORKER_UNAVAILABLE_MESSAGE};

/// Main update function - dispatches to sub-handlers
///
/// In debug builds, this wraps with tracing instrumentation.
/// In release builds, it's a direct dispatch with zero overhead.
#[inline]
pub fn update(model: &mut PreviewModel, msg: Msg) -> Option<Cmd> {
    #[cfg(debug_assertions)]
    {
        update_traced(model, msg)
    }
    #[cfg(not(debug_assertions))]
    {
        update_inner(model, msg)
    }
}

fn update_inner(model: &mut PreviewModel, msg: Msg) -> Option<Cmd> {
    match msg {
        Msg::Document(m) => document::update_document(model, m),
        Msg::Render(m) => render::update_render(model, m),
    }
}

/// Traced update wrapper (debug builds only)
#[cfg(debug_assertions)]
fn update_traced(model: &mut PreviewModel, msg: Msg) -> Option<Cmd> {
    let msg_name = msg_type_name(&msg);
    let _span = span!(Level::DEBUG, "update", msg = %msg_name).entered();
    debug!(target: "message", msg = %msg_name, generation = model.generation(), "processing");

    let result = update_inner(model, msg);

    debug_assert!(
        model.render.last_applied.map_or(true, |g| g <= model.generation()),
        "applied a render from the future"
    );
    result
}

/// Get a short display name for a message, without payloads
#[cfg(debug_assertions)]
fn msg_type_name(msg: &Msg) -> String {
    use crate::messages::DocumentMsg;

    match msg {
        Msg::Document(DocumentMsg::Edit { kind, .. }) => format!("Document::Edit({:?})", kind),
        Msg::Document(DocumentMsg::SetText { kind, .. }) => {
            format!("Document::SetText({:?})", kind)
        }
        Msg::Document(DocumentMsg::MarkSaved(kind)) => format!("Document::MarkSaved({:?})", kind),
        Msg::Render(RenderMsg::Request) => "Render::Request".to_string(),
        Msg::Render(RenderMsg::Started { generation }) => format!("Render::Started({})", generation),
        Msg::Render(RenderMsg::Cancelled { generation }) => {
            format!("Render::Cancelled({})", generation)
        }
        Msg::Render(RenderMsg::Completed(result)) => {
            format!("Render::Completed({})", result.generation)
        }
    }
}
