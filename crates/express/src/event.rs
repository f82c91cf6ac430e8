//! Stream-style events over a fully buffered body.
//!
//! Consumers written against a readable-stream contract subscribe to
//! [`EventKind::Data`], [`EventKind::End`] and [`EventKind::Close`]. The body is
//! always buffered before handlers run, so nothing here streams: a `Data`
//! subscription made after the body is in place is answered with one synthetic
//! `Data` event carrying the whole body, followed by `End` and `Close`, all on
//! the next scheduling turn. See [`RequestAdapter::on`](crate::RequestAdapter::on).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tracing::{debug, trace};

/// A request lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Data(Bytes),
    End,
    Close,
    Aborted,
    Error(String),
}

/// The kind of an [`Event`], used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    End,
    Close,
    Aborted,
    Error,
}

impl Event {
    /// The kind this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Data(_) => EventKind::Data,
            Event::End => EventKind::End,
            Event::Close => EventKind::Close,
            Event::Aborted => EventKind::Aborted,
            Event::Error(_) => EventKind::Error,
        }
    }
}

/// A subscriber callback.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// A clonable publish/subscribe hub; clones share their listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<Mutex<HashMap<EventKind, Vec<Listener>>>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let counts = listeners.iter().map(|(kind, list)| (*kind, list.len())).collect::<HashMap<_, _>>();
        f.debug_struct("EventEmitter").field("listeners", &counts).finish()
    }
}

impl EventEmitter {
    /// An emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to events of `kind`.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.entry(kind).or_default().push(listener);
    }

    /// Calls every listener of `event`'s kind in registration order.
    ///
    /// Listeners run outside the internal lock, so they may subscribe or emit.
    /// Returns whether any listener was called.
    pub fn emit(&self, event: &Event) -> bool {
        let listeners = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.get(&event.kind()).cloned().unwrap_or_default()
        };

        trace!(kind = ?event.kind(), listeners = listeners.len(), "emit event");
        for listener in &listeners {
            listener(event);
        }
        !listeners.is_empty()
    }

    /// How many listeners are subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Delivers a buffered body to `listener` once, then emits `End` and `Close`.
    ///
    /// Delivery happens on a spawned task, never before this call returns.
    /// Outside a tokio runtime there is no next turn to defer to, and delivery
    /// happens in place.
    pub(crate) fn replay_body(&self, body: Bytes, listener: Listener) {
        let emitter = self.clone();
        let replay = move || {
            listener(&Event::Data(body));
            emitter.emit(&Event::End);
            emitter.emit(&Event::Close);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { replay() });
            }
            Err(_) => {
                debug!("no tokio runtime, replay buffered body in place");
                replay();
            }
        }
    }
}
