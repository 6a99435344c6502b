//! Background rendering
//!
//! ```text
//! PreviewModel ──Cmd::SubmitRender──▶ RenderWorker (one thread)
//!                                        │ execute(adapter, request)
//!                                        ▼
//! update_render ◀──Msg::Render── ResultDispatcher
//! ```
//!
//! Requests carry owned snapshots and the generation they were taken at.
//! The worker keeps at most one request waiting; results are applied only
//! while their generation is still the current one.

mod dispatcher;
mod worker;

pub use dispatcher::ResultDispatcher;
pub use worker::RenderWorker;

use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::engine::{TemplateEngine, TemplateEngineAdapter};
use crate::validation::parse_context;

/// Failure message for a template with nothing but whitespace
pub const EMPTY_TEMPLATE_MESSAGE: &str = "Template is empty. Nothing to render.";

/// An immutable render job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    template: String,
    context: String,
    generation: u64,
}

impl RenderRequest {
    pub fn new(template: String, context: String, generation: u64) -> Self {
        Self {
            template,
            context,
            generation,
        }
    }

    /// Template text at submission time
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Data text (JSON) at submission time
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What a render produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Success {
        output: String,
    },
    Failure {
        diagnostics: Vec<Diagnostic>,
        /// Output produced before the failure, if the engine kept it
        partial_output: Option<String>,
    },
}

/// A finished render, tagged with the generation of its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub generation: u64,
    pub outcome: RenderOutcome,
}

impl RenderResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RenderOutcome::Success { .. })
    }

    fn failure(generation: u64, diagnostics: Vec<Diagnostic>, partial_output: Option<String>) -> Self {
        Self {
            generation,
            outcome: RenderOutcome::Failure {
                diagnostics,
                partial_output,
            },
        }
    }
}

/// Lifecycle of a render request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    /// Nothing has been submitted yet
    #[default]
    Idle,
    Queued,
    Running,
    Completed,
    /// Superseded by a newer request, or finished after the buffers moved on
    Cancelled,
    Failed,
}

impl RequestStatus {
    /// Whether the request has reached an end state
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Failed
        )
    }
}

/// Run one request to completion. Pure: the result depends only on the
/// request and the engine configuration.
pub fn execute<E: TemplateEngine>(
    adapter: &TemplateEngineAdapter<E>,
    request: &RenderRequest,
) -> RenderResult {
    let generation = request.generation();

    if request.template().trim().is_empty() {
        let diagnostic = Diagnostic::error(DiagnosticSource::Template, 0, 0, EMPTY_TEMPLATE_MESSAGE);
        return RenderResult::failure(generation, vec![diagnostic], None);
    }

    let context = match parse_context(request.context()) {
        Ok(context) => context,
        Err(err) => {
            tracing::debug!("Render {} blocked by invalid data: {}", generation, err);
            return RenderResult::failure(generation, err.diagnostics, None);
        }
    };

    match adapter.render(request.template(), &context) {
        Ok(output) => RenderResult {
            generation,
            outcome: RenderOutcome::Success { output },
        },
        Err(err) => {
            tracing::debug!("Render {} failed: {}", generation, err);
            let diagnostic = err.to_diagnostic();
            RenderResult::failure(generation, vec![diagnostic], err.partial_output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;

    fn adapter() -> TemplateEngineAdapter<crate::engine::VelocityEngine> {
        TemplateEngineAdapter::velocity(EngineOptions::default())
    }

    fn request(template: &str, context: &str) -> RenderRequest {
        RenderRequest::new(template.to_string(), context.to_string(), 7)
    }

    #[test]
    fn test_success_keeps_generation() {
        let result = execute(&adapter(), &request("Hello $name", r#"{"name": "World"}"#));
        assert_eq!(result.generation, 7);
        assert_eq!(
            result.outcome,
            RenderOutcome::Success {
                output: "Hello World".to_string()
            }
        );
    }

    #[test]
    fn test_missing_reference_renders_literally() {
        let result = execute(&adapter(), &request("Hello $name", "{}"));
        assert_eq!(
            result.outcome,
            RenderOutcome::Success {
                output: "Hello $name".to_string()
            }
        );
    }

    #[test]
    fn test_blank_data_is_an_empty_context() {
        let result = execute(&adapter(), &request("x", "  \n"));
        assert!(result.is_success());
    }

    #[test]
    fn test_empty_template_fails() {
        let result = execute(&adapter(), &request(" \n\t", "{}"));
        match result.outcome {
            RenderOutcome::Failure { diagnostics, .. } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].message, EMPTY_TEMPLATE_MESSAGE);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_data_blocks_rendering() {
        let result = execute(&adapter(), &request("Hello", "{not json"));
        match result.outcome {
            RenderOutcome::Failure {
                diagnostics,
                partial_output,
            } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].source, DiagnosticSource::Data);
                assert_eq!(partial_output, None);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_error_becomes_one_diagnostic() {
        let result = execute(&adapter(), &request("before #parse('x.vm')", "{}"));
        match result.outcome {
            RenderOutcome::Failure {
                diagnostics,
                partial_output,
            } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].source, DiagnosticSource::Engine);
                assert_eq!(diagnostics[0].line, 1);
                assert_eq!(partial_output.as_deref(), Some("before "));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_request_status_end_states() {
        assert!(RequestStatus::Cancelled.is_finished());
        assert!(RequestStatus::Failed.is_finished());
        assert!(!RequestStatus::Running.is_finished());
        assert!(!RequestStatus::Idle.is_finished());
    }
}
