//! Event Bus
//!
//! Typed publish/subscribe registry. Listeners register against an
//! [`EventFilter`] and are invoked synchronously, in registration order, for
//! every matching [`StreamEvent`].
//!
//! `emit` snapshots the matching listeners and releases the lock before
//! calling any of them, so a listener may register, unregister or emit
//! without deadlocking or corrupting the iteration. A listener that panics is
//! logged and skipped; the remaining listeners still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::application::events::{EventFilter, StreamEvent};
use crate::infrastructure::metrics;

/// Callback invoked for each matching event.
pub type Listener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Registration {
    id: ListenerId,
    filter: EventFilter,
    listener: Listener,
}

/// Synchronous fan-out of [`StreamEvent`]s to registered listeners.
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register `listener` for events passing `filter`.
    ///
    /// Registering the same callback twice yields two ids and two
    /// invocations per emit.
    pub fn on<F>(&self, filter: impl Into<EventFilter>, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Registration {
            id,
            filter: filter.into(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Unregister a listener. Returns `false` if `id` was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Register `listener` and get a guard that unregisters it on drop.
    pub fn subscribe<F>(self: &Arc<Self>, filter: impl Into<EventFilter>, listener: F) -> ListenerGuard
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = self.on(filter, listener);
        ListenerGuard {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver `event` to every matching listener, in registration order.
    ///
    /// Returns the number of listeners that ran to completion.
    pub fn emit(&self, event: &StreamEvent) -> usize {
        let matching: Vec<(ListenerId, Listener)> = self
            .listeners
            .lock()
            .iter()
            .filter(|r| r.filter.matches(event))
            .map(|r| (r.id, Arc::clone(&r.listener)))
            .collect();

        let mut delivered = 0;
        for (id, listener) in matching {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        listener = %id,
                        event = event.kind().as_str(),
                        panic = %message,
                        "Event listener panicked"
                    );
                    metrics::record_listener_panic(event.kind());
                }
            }
        }
        delivered
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Unregisters its listener when dropped.
#[derive(Debug)]
#[must_use = "the listener is removed when the guard is dropped"]
pub struct ListenerGuard {
    bus: Weak<EventBus>,
    id: ListenerId,
}

impl ListenerGuard {
    /// Id of the guarded registration.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.off(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{EventKind, StreamError};
    use crate::domain::streaming::Symbol;

    fn confirmed(symbol: &str) -> StreamEvent {
        StreamEvent::SubscriptionConfirmed {
            symbol: Symbol::new(symbol).unwrap(),
        }
    }

    #[test]
    fn emits_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            bus.on(EventKind::Pong, move |_| seen.lock().push(n));
        }

        assert_eq!(bus.emit(&StreamEvent::Pong), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn same_callback_twice_runs_twice() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let callback = {
            let count = Arc::clone(&count);
            move |_: &StreamEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };

        let first = bus.on(EventKind::Pong, callback.clone());
        let second = bus.on(EventKind::Pong, callback);
        assert_ne!(first, second);

        bus.emit(&StreamEvent::Pong);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn off_removes_only_that_registration() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let keep = bus.on(EventKind::Pong, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let drop_me = bus.on(EventKind::Pong, |_| panic!("should be removed"));

        assert!(bus.off(drop_me));
        assert!(!bus.off(drop_me));
        bus.emit(&StreamEvent::Pong);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.off(keep));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        bus.on(EventKind::Pong, |_| panic!("boom"));
        let counter = Arc::clone(&count);
        bus.on(EventKind::Pong, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit(&StreamEvent::Pong), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn filters_by_kind_and_symbol() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let recorder = Arc::clone(&seen);
        bus.on(
            EventFilter::for_symbol(EventKind::SubscriptionConfirmed, Symbol::new("AAPL").unwrap()),
            move |event| recorder.lock().push(event.clone()),
        );

        bus.emit(&confirmed("MSFT"));
        bus.emit(&confirmed("AAPL"));
        bus.emit(&StreamEvent::Error(StreamError::protocol("noise")));

        assert_eq!(*seen.lock(), vec![confirmed("AAPL")]);
    }

    #[test]
    fn listener_can_unregister_itself_during_emit() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicU64::new(0));

        let id = {
            let inner_bus = Arc::clone(&bus);
            let slot = Arc::clone(&slot);
            let count = Arc::clone(&count);
            bus.on(EventKind::Pong, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock() {
                    inner_bus.off(id);
                }
            })
        };
        *slot.lock() = Some(id);

        bus.emit(&StreamEvent::Pong);
        bus.emit(&StreamEvent::Pong);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_added_during_emit_runs_next_time() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicU64::new(0));

        {
            let inner_bus = Arc::clone(&bus);
            let count = Arc::clone(&count);
            bus.on(EventKind::Pong, move |_| {
                let count = Arc::clone(&count);
                inner_bus.on(EventKind::Pong, move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        bus.emit(&StreamEvent::Pong);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        bus.emit(&StreamEvent::Pong);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_unregisters_on_drop() {
        let bus = Arc::new(EventBus::new());
        let guard = bus.subscribe(EventKind::Pong, |_| {});
        assert_eq!(bus.listener_count(), 1);
        assert!(guard.id() > ListenerId(0));

        drop(guard);
        assert_eq!(bus.listener_count(), 0);
    }
}
