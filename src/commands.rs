//! Command types for the Elm-style architecture
//!
//! Commands represent side effects that should be performed after an update.

use crate::render::RenderRequest;

/// Commands returned by update functions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cmd {
    /// No command - do nothing
    #[default]
    None,
    /// Highlights, diagnostics or output changed; the view should refresh
    Redraw,
    /// Hand a snapshot to the render worker
    SubmitRender(RenderRequest),
    /// Execute multiple commands
    Batch(Vec<Cmd>),
}

impl Cmd {
    /// Create a batch of commands. Nested batches are flattened and
    /// `Cmd::None` entries dropped; a single survivor is returned as is.
    pub fn batch(cmds: Vec<Cmd>) -> Self {
        let mut flat = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            match cmd {
                Cmd::None => {}
                Cmd::Batch(inner) => match Cmd::batch(inner) {
                    Cmd::None => {}
                    Cmd::Batch(nested) => flat.extend(nested),
                    single => flat.push(single),
                },
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Cmd::None,
            1 => flat.pop().unwrap_or_default(),
            _ => Cmd::Batch(flat),
        }
    }

    /// Check if this command requires a redraw
    pub fn needs_redraw(&self) -> bool {
        match self {
            Cmd::None => false,
            Cmd::Redraw => true,
            // The result triggers its own redraw
            Cmd::SubmitRender(_) => false,
            Cmd::Batch(cmds) => cmds.iter().any(|c| c.needs_redraw()),
        }
    }

    /// Render requests contained in this command, in order
    pub fn render_requests(&self) -> Vec<&RenderRequest> {
        match self {
            Cmd::SubmitRender(request) => vec![request],
            Cmd::Batch(cmds) => cmds.iter().flat_map(|c| c.render_requests()).collect(),
            Cmd::None | Cmd::Redraw => Vec::new(),
        }
    }
}
