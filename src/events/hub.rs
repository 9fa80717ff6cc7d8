//! Event fan-out.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::events::{EventKind, ServerEvent};
use crate::http::error::panic_message;
use crate::observability::metrics;

type Observer = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Delivers server events to observers and channel subscribers.
///
/// Cheap to clone; clones share the same subscribers.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    tx: broadcast::Sender<ServerEvent>,
    observers: RwLock<Vec<(EventKind, Observer)>>,
}

impl EventHub {
    /// `capacity` bounds how far a slow channel subscriber may lag.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                tx,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.tx.subscribe()
    }

    /// Call `observer` for every event of the given kind.
    ///
    /// Observers run on the emitting task and must not block.
    pub fn on<F>(&self, kind: EventKind, observer: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner
            .observers
            .write()
            .expect("event observer lock poisoned")
            .push((kind, Arc::new(observer)));
    }

    pub fn emit(&self, event: ServerEvent) {
        let kind = event.kind();
        tracing::trace!(event = %kind, "Emitting event");
        metrics::record_event(kind.as_str());

        let observers: Vec<Observer> = self
            .inner
            .observers
            .read()
            .expect("event observer lock poisoned")
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        // A panicking observer must not take the request down with it.
        for observer in observers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer(&event))) {
                tracing::error!(
                    event = %kind,
                    error = %panic_message(payload.as_ref()),
                    "Event observer panicked"
                );
            }
        }

        // No receivers is fine.
        let _ = self.inner.tx.send(event);
    }

    /// Number of live channel subscribers.
    pub fn receiver_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(crate::config::schema::DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("receivers", &self.receiver_count())
            .finish_non_exhaustive()
    }
}
