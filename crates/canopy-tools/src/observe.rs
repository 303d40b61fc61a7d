use std::cell::RefCell;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use canopy_core::{TreeEvent, TreeObserver};

/// Swallows every event. Useful as a placeholder when wiring is mandatory.
#[derive(Debug, Default)]
pub struct NullObserver;

impl TreeObserver for NullObserver {
    fn on_event(&mut self, _event: TreeEvent) {}
}

/// A recorded event stream.
///
/// This is intentionally "dumb data" so it can be captured during simulation and later rendered
/// or diffed by tooling.
#[derive(Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventLog {
    pub events: Vec<TreeEvent>,
}

impl EventLog {
    pub fn push(&mut self, event: TreeEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TreeObserver for EventLog {
    fn on_event(&mut self, event: TreeEvent) {
        self.push(event);
    }
}

/// Records events behind a shared handle.
///
/// The tree instance takes ownership of the observer it is given, so a test clones the
/// recorder first and reads the clone after the run:
///
/// ```ignore
/// let recorder = RecordingObserver::new();
/// instance.set_observer(Box::new(recorder.clone()));
/// // ... run ...
/// let events = recorder.events();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<TreeEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<TreeEvent> {
        self.events.borrow().clone()
    }

    /// Drains the recording, so the next read only sees newer events.
    pub fn take(&self) -> Vec<TreeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl TreeObserver for RecordingObserver {
    fn on_event(&mut self, event: TreeEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// Forwards events to the `tracing` ecosystem.
///
/// Lifecycle transitions are logged at `debug`, the per-search chatter at `trace`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TreeObserver for TracingObserver {
    fn on_event(&mut self, event: TreeEvent) {
        match event {
            TreeEvent::TreeStarted => tracing::debug!("tree started"),
            TreeEvent::TreeStopped => tracing::debug!("tree stopped"),
            TreeEvent::NodeVisited(node) => tracing::trace!(node = node.0, "node visited"),
            TreeEvent::NodeBubbled(node) => tracing::trace!(node = node.0, "node bubbled"),
            TreeEvent::DecoratorFailed(node) => {
                tracing::trace!(node = node.0, "decorator failed")
            }
            TreeEvent::AuxBecameRelevant(node) => {
                tracing::trace!(node = node.0, "auxiliary became relevant")
            }
            TreeEvent::AuxCeasedRelevant(node) => {
                tracing::trace!(node = node.0, "auxiliary ceased relevance")
            }
            TreeEvent::TaskActivated(node) => {
                tracing::debug!(node = node.0, "task activated")
            }
            TreeEvent::SearchFinished => tracing::trace!("search finished"),
        }
    }
}
