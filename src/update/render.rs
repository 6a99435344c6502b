//! Render update handlers
//!
//! Results are applied only while they describe the current buffers. The
//! comparison is against the live generation, not the last result seen, so
//! a late result for an older generation can never overwrite a newer one.

use crate::commands::Cmd;
use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::messages::RenderMsg;
use crate::model::{PreviewModel, STATUS_FAILED, STATUS_RENDERED, STATUS_RENDERING};
use crate::render::{RenderOutcome, RenderRequest, RenderResult, RequestStatus};

pub const WORKER_UNAVAILABLE_MESSAGE: &str = "Render worker is not running.";

/// Handle render messages
pub fn update_render(model: &mut PreviewModel, msg: RenderMsg) -> Option<Cmd> {
    match msg {
        RenderMsg::Request => Some(request_render(model)),

        RenderMsg::Started { generation } => {
            if model.render.pending == Some(generation) {
                model.render.status = RequestStatus::Running;
            }
            None
        }

        RenderMsg::Cancelled { generation } => {
            tracing::debug!("Render request {} was superseded", generation);
            if model.render.pending == Some(generation) {
                model.render.pending = None;
                model.render.status = RequestStatus::Cancelled;
                model.status_message = None;
            }
            None
        }

        RenderMsg::Completed(result) => apply_result(model, result),
    }
}

/// Snapshot both buffers into a request for the current generation
pub fn request_render(model: &mut PreviewModel) -> Cmd {
    let generation = model.generation();

    if model.render.pending.is_none() && model.render.last_applied == Some(generation) {
        tracing::debug!("Output already current for generation {}", generation);
        return Cmd::None;
    }

    let request = RenderRequest::new(
        model.template.document.snapshot(),
        model.data.document.snapshot(),
        generation,
    );
    model.render.pending = Some(generation);
    model.render.status = RequestStatus::Queued;
    model.status_message = Some(STATUS_RENDERING.to_string());
    Cmd::SubmitRender(request)
}

/// The worker refused a request: settle it as failed instead of leaving it
/// pending.
pub fn reject_request(model: &mut PreviewModel, generation: u64) {
    if model.render.pending != Some(generation) {
        return;
    }
    tracing::warn!("Render request {} could not be queued", generation);
    model.render.pending = None;
    model.render.status = RequestStatus::Failed;
    model.status_message = Some(STATUS_FAILED.to_string());
    model.output.diagnostics = vec![Diagnostic::error(
        DiagnosticSource::Engine,
        0,
        0,
        WORKER_UNAVAILABLE_MESSAGE,
    )];
}

fn apply_result(model: &mut PreviewModel, result: RenderResult) -> Option<Cmd> {
    let generation = result.generation;
    let current = model.generation();
    let newer_than_shown = model.render.last_applied.map_or(true, |g| generation > g);

    if generation != current || !newer_than_shown {
        tracing::debug!(
            "Discarding stale render result: generation {} != current {}",
            generation,
            current
        );
        if model.render.pending == Some(generation) {
            model.render.pending = None;
            model.render.status = RequestStatus::Cancelled;
            model.status_message = None;
        }
        return None;
    }

    if model.render.pending == Some(generation) {
        model.render.pending = None;
    }
    model.render.last_applied = Some(generation);

    match result.outcome {
        RenderOutcome::Success { output } => {
            model.output.show(output, generation);
            model.output.diagnostics.clear();
            model.render.status = RequestStatus::Completed;
            model.status_message = Some(STATUS_RENDERED.to_string());
        }
        RenderOutcome::Failure {
            diagnostics,
            partial_output,
        } => {
            model
                .output
                .show(partial_output.unwrap_or_default(), generation);
            model.output.diagnostics = diagnostics;
            model.render.status = RequestStatus::Failed;
            model.status_message = Some(STATUS_FAILED.to_string());
        }
    }

    Some(Cmd::Redraw)
}
