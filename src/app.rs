//! The interaction loop
//!
//! `PreviewApp` owns the model, the render worker and the dispatcher. Every
//! message goes through [`update`]; the commands it returns are executed
//! here.

use std::sync::mpsc;
use std::time::Duration;

use crate::commands::Cmd;
use crate::engine::{TemplateEngine, TemplateEngineAdapter};
use crate::messages::Msg;
use crate::model::PreviewModel;
use crate::render::{RenderWorker, ResultDispatcher};
use crate::update::{reject_request, update};

pub struct PreviewApp {
    model: PreviewModel,
    worker: RenderWorker,
    dispatcher: ResultDispatcher,
}

impl PreviewApp {
    /// Start an app rendering with the built-in Velocity engine, configured
    /// from the model's config.
    pub fn new(model: PreviewModel) -> std::io::Result<Self> {
        let adapter = TemplateEngineAdapter::velocity(model.config.engine_options());
        Self::with_adapter(model, adapter)
    }

    /// Start an app rendering with any engine
    pub fn with_adapter<E>(model: PreviewModel, adapter: TemplateEngineAdapter<E>) -> std::io::Result<Self>
    where
        E: TemplateEngine + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel();
        let worker = RenderWorker::spawn(adapter, events_tx)?;
        Ok(Self {
            model,
            worker,
            dispatcher: ResultDispatcher::new(events_rx),
        })
    }

    pub fn model(&self) -> &PreviewModel {
        &self.model
    }

    /// Feed one message through the update loop. Returns whether the view
    /// needs a redraw.
    pub fn send(&mut self, msg: Msg) -> bool {
        match update(&mut self.model, msg) {
            Some(cmd) => {
                let needs_redraw = cmd.needs_redraw();
                self.process_cmd(cmd);
                needs_redraw
            }
            None => false,
        }
    }

    /// Apply worker events that already arrived. Returns whether the view
    /// needs a redraw.
    pub fn pump(&mut self) -> bool {
        let cmd = self.dispatcher.pump(&mut self.model);
        let needs_redraw = cmd.needs_redraw();
        self.process_cmd(cmd);
        needs_redraw
    }

    /// Block until the newest render request has settled
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        self.dispatcher.wait_until_idle(&mut self.model, timeout)
    }

    fn process_cmd(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::None => {}
            Cmd::Redraw => {}
            Cmd::SubmitRender(request) => {
                let generation = request.generation();
                if !self.worker.submit(request) {
                    reject_request(&mut self.model, generation);
                }
            }
            Cmd::Batch(cmds) => {
                for cmd in cmds {
                    self.process_cmd(cmd);
                }
            }
        }
    }
}
