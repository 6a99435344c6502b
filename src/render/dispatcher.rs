//! Routes worker events into the update loop

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::commands::Cmd;
use crate::messages::Msg;
use crate::model::PreviewModel;
use crate::update::update;

/// Owns the receiving end of the worker's event channel.
#[derive(Debug)]
pub struct ResultDispatcher {
    events: Receiver<Msg>,
}

impl ResultDispatcher {
    pub fn new(events: Receiver<Msg>) -> Self {
        Self { events }
    }

    /// Apply every event that is already waiting. Never blocks.
    ///
    /// Returns the commands the updates produced, batched.
    pub fn pump(&self, model: &mut PreviewModel) -> Cmd {
        let mut cmds = Vec::new();
        while let Ok(msg) = self.events.try_recv() {
            if let Some(cmd) = update(model, msg) {
                cmds.push(cmd);
            }
        }
        Cmd::batch(cmds)
    }

    /// Block until the newest submitted request has settled or `timeout`
    /// elapses. Returns whether the model is idle.
    pub fn wait_until_idle(&self, model: &mut PreviewModel, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump(model);
            if model.render.is_idle() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(msg) => {
                    update(model, msg);
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        "Timed out waiting for render of generation {:?}",
                        model.render.pending
                    );
                    return model.render.is_idle();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Render event channel closed while waiting");
                    return model.render.is_idle();
                }
            }
        }
    }
}
