//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};

use vtl_preview::commands::Cmd;
use vtl_preview::config::PreviewConfig;
use vtl_preview::engine::{Context, TemplateEngine};
use vtl_preview::messages::{DocumentMsg, Msg};
use vtl_preview::model::{BufferKind, EditDelta, PreviewModel};
use vtl_preview::syntax::{LineHighlights, StyleTag};
use vtl_preview::update::update;

/// Create a test model with default config
pub fn test_model(template: &str, data: &str) -> PreviewModel {
    PreviewModel::new(template, data, PreviewConfig::default())
}

/// Message that appends `text` to the end of a buffer
pub fn append_msg(model: &PreviewModel, kind: BufferKind, text: &str) -> Msg {
    let offset = model.pane(kind).document.len_chars();
    Msg::Document(DocumentMsg::Edit {
        kind,
        delta: EditDelta::insert(offset, text),
    })
}

/// Apply an edit through the update loop
pub fn edit(model: &mut PreviewModel, kind: BufferKind, delta: EditDelta) -> Option<Cmd> {
    update(model, Msg::Document(DocumentMsg::Edit { kind, delta }))
}

pub fn template_text(model: &PreviewModel) -> String {
    model.template.document.text()
}

/// Style of the span covering `col`, if any
pub fn style_at(line: &LineHighlights, col: usize) -> Option<StyleTag> {
    line.spans
        .iter()
        .find(|span| span.start <= col && col < span.end())
        .map(|span| span.style)
}

/// Small deterministic PRNG (xorshift64) for reproducible edit sequences
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish value in `0..n`; `n` must be non-zero
    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }
}

/// Opens the gate of a [`GatedEngine`]
#[derive(Clone)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

/// Engine that reports each evaluation as it starts, then blocks until its
/// gate is opened. Output is `rendered: <template>`.
pub struct GatedEngine {
    gate: Gate,
    started: Mutex<Sender<String>>,
}

impl GatedEngine {
    pub fn new() -> (Self, Gate, Receiver<String>) {
        let gate = Gate(Arc::new((Mutex::new(false), Condvar::new())));
        let (tx, rx) = mpsc::channel();
        let engine = Self {
            gate: gate.clone(),
            started: Mutex::new(tx),
        };
        (engine, gate, rx)
    }
}

impl TemplateEngine for GatedEngine {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "gated"
    }

    fn evaluate(&self, template: &str, _context: &Context) -> Result<String, Infallible> {
        let _ = self.started.lock().unwrap().send(template.to_string());
        self.gate.wait();
        Ok(format!("rendered: {}", template))
    }
}
