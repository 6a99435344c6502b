//! Message types for the Elm-style architecture
//!
//! Every change to the [`PreviewModel`](crate::model::PreviewModel) arrives
//! as a `Msg`, either from the presentation layer or from the render worker.

use crate::model::{BufferKind, EditDelta};
use crate::render::RenderResult;

/// Top-level message type
#[derive(Debug, Clone)]
pub enum Msg {
    /// Edits and bookkeeping for the template and data buffers
    Document(DocumentMsg),
    /// Render requests and worker progress
    Render(RenderMsg),
}

/// Buffer messages, sent by the presentation layer
#[derive(Debug, Clone)]
pub enum DocumentMsg {
    /// Apply a char-offset edit to one buffer
    Edit { kind: BufferKind, delta: EditDelta },
    /// Replace the whole text of one buffer
    SetText { kind: BufferKind, text: String },
    /// The persistence collaborator stored the buffer
    MarkSaved(BufferKind),
}

/// Render messages
#[derive(Debug, Clone)]
pub enum RenderMsg {
    // === From the presentation layer ===
    /// Explicit render trigger: snapshot both buffers and submit
    Request,

    // === From the worker ===
    /// The worker picked up the request for this generation
    Started { generation: u64 },
    /// A queued request was superseded before it ran
    Cancelled { generation: u64 },
    /// A request finished, successfully or not
    Completed(RenderResult),
}
