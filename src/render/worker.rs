//! The render worker thread

use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::{execute, RenderRequest};
use crate::engine::{TemplateEngine, TemplateEngineAdapter};
use crate::messages::{Msg, RenderMsg};

/// Requests waiting for the worker: at most one.
#[derive(Debug, Default)]
struct Slot {
    request: Option<RenderRequest>,
    closed: bool,
}

#[derive(Debug, Default)]
struct RequestSlot {
    state: Mutex<Slot>,
    ready: Condvar,
}

impl RequestSlot {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the single background thread that evaluates templates.
///
/// Requests run one at a time. While a render is running, only the newest
/// submitted request waits; submitting another replaces it, and the
/// replaced one is reported as cancelled right away.
#[derive(Debug)]
pub struct RenderWorker {
    slot: Arc<RequestSlot>,
    events: Sender<Msg>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Start the worker thread. Progress and results are sent to `events`.
    pub fn spawn<E>(adapter: TemplateEngineAdapter<E>, events: Sender<Msg>) -> std::io::Result<Self>
    where
        E: TemplateEngine + 'static,
    {
        let slot = Arc::new(RequestSlot::default());
        let worker_slot = Arc::clone(&slot);
        let worker_events = events.clone();
        let handle = thread::Builder::new()
            .name("render-worker".to_string())
            .spawn(move || run(adapter, &worker_slot, &worker_events))?;

        Ok(Self {
            slot,
            events,
            handle: Some(handle),
        })
    }

    /// Queue a request, replacing any request still waiting. Never waits on
    /// a render. Returns false if the worker is gone.
    pub fn submit(&self, request: RenderRequest) -> bool {
        let generation = request.generation();
        if !self.is_running() {
            tracing::warn!("Render worker is not running, dropping generation {}", generation);
            return false;
        }

        let replaced = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return false;
            }
            slot.request.replace(request)
        };
        self.slot.ready.notify_one();

        if let Some(old) = replaced {
            tracing::debug!(
                "Dropping superseded render request {} in favor of {}",
                old.generation(),
                generation
            );
            let _ = self.events.send(Msg::Render(RenderMsg::Cancelled {
                generation: old.generation(),
            }));
        }
        true
    }

    /// Generation of the request waiting for the worker, if any
    #[cfg(test)]
    fn waiting(&self) -> Option<u64> {
        self.slot.lock().request.as_ref().map(RenderRequest::generation)
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        // The loop ends once the current render finishes
        self.slot.lock().closed = true;
        self.slot.ready.notify_one();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Render worker thread panicked");
            }
        }
    }
}

/// Block until a request is waiting. `None` once the worker is closed.
fn next_request(slot: &RequestSlot) -> Option<RenderRequest> {
    let mut state = slot.lock();
    loop {
        if state.closed {
            return None;
        }
        if let Some(request) = state.request.take() {
            return Some(request);
        }
        state = slot
            .ready
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

fn run<E: TemplateEngine>(
    adapter: TemplateEngineAdapter<E>,
    slot: &RequestSlot,
    events: &Sender<Msg>,
) {
    tracing::debug!("Render worker started ({} engine)", adapter.engine().name());

    while let Some(request) = next_request(slot) {
        let generation = request.generation();
        if events
            .send(Msg::Render(RenderMsg::Started { generation }))
            .is_err()
        {
            break;
        }

        let result = execute(&adapter, &request);
        tracing::debug!(
            "Render {} finished ({})",
            generation,
            if result.is_success() { "ok" } else { "failed" }
        );

        if events.send(Msg::Render(RenderMsg::Completed(result))).is_err() {
            break;
        }
    }

    tracing::debug!("Render worker stopped");
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    use super::*;
    use crate::engine::Context;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Blocks inside every evaluation until released
    struct HeldEngine {
        release: Mutex<Receiver<()>>,
    }

    impl TemplateEngine for HeldEngine {
        type Error = Infallible;

        fn name(&self) -> &'static str {
            "held"
        }

        fn evaluate(&self, template: &str, _context: &Context) -> Result<String, Infallible> {
            let _ = self.release.lock().unwrap().recv();
            Ok(template.to_string())
        }
    }

    fn request(generation: u64) -> RenderRequest {
        RenderRequest::new(format!("g{}", generation), "{}".to_string(), generation)
    }

    fn next_event(events: &Receiver<Msg>) -> RenderMsg {
        match events.recv_timeout(TIMEOUT).unwrap() {
            Msg::Render(msg) => msg,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_backlog_holds_only_the_newest_request() {
        let (release_tx, release_rx) = mpsc::channel();
        let engine = HeldEngine {
            release: Mutex::new(release_rx),
        };
        let (events_tx, events_rx) = mpsc::channel();
        let worker = RenderWorker::spawn(TemplateEngineAdapter::new(engine), events_tx).unwrap();

        assert!(worker.submit(request(1)));
        assert!(matches!(next_event(&events_rx), RenderMsg::Started { generation: 1 }));
        assert_eq!(worker.waiting(), None);

        // Generation 1 is held inside the engine while three more arrive
        for generation in 2..=4 {
            assert!(worker.submit(request(generation)));
            assert_eq!(worker.waiting(), Some(generation));
        }
        assert!(matches!(next_event(&events_rx), RenderMsg::Cancelled { generation: 2 }));
        assert!(matches!(next_event(&events_rx), RenderMsg::Cancelled { generation: 3 }));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();

        let RenderMsg::Completed(first) = next_event(&events_rx) else {
            panic!("expected generation 1 to complete");
        };
        assert_eq!(first.generation, 1);
        assert!(matches!(next_event(&events_rx), RenderMsg::Started { generation: 4 }));
        let RenderMsg::Completed(last) = next_event(&events_rx) else {
            panic!("expected generation 4 to complete");
        };
        assert_eq!(last.generation, 4);
        assert_eq!(worker.waiting(), None);
    }

    #[test]
    fn test_drop_joins_an_idle_worker() {
        let (_release_tx, release_rx) = mpsc::channel();
        let engine = HeldEngine {
            release: Mutex::new(release_rx),
        };
        let (events_tx, _events_rx) = mpsc::channel();
        let worker = RenderWorker::spawn(TemplateEngineAdapter::new(engine), events_tx).unwrap();
        drop(worker);
    }
}
