//! Event dispatcher
//!
//! Routes decoded dispatch events to listeners by [`EventKind`]. Listeners run
//! in registration order; a failing or panicking listener is reported in the
//! [`DispatchOutcome`] and never stops its siblings.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::{EventKind, GatewayEvent};
use crate::error::DispatchError;

type Handler = Arc<dyn Fn(&GatewayEvent) -> anyhow::Result<()> + Send + Sync>;
type Predicate = Box<dyn Fn(&GatewayEvent) -> bool + Send>;

/// Handle returned by [`EventDispatcher::on`] and [`EventDispatcher::once`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

struct Waiter {
    id: u64,
    predicate: Predicate,
    tx: oneshot::Sender<GatewayEvent>,
}

/// A listener that returned an error or panicked
#[derive(Debug)]
pub struct ListenerFailure {
    pub listener: ListenerId,
    pub event: String,
    pub error: anyhow::Error,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener {} failed on {}: {}", self.listener.0, self.event, self.error)
    }
}

/// Result of dispatching one event
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Listeners invoked
    pub delivered: usize,
    /// Waiters resolved
    pub woken: usize,
    /// Event name is in the suppression set
    pub suppressed: bool,
    pub failures: Vec<ListenerFailure>,
}

/// Listener registry for gateway events
pub struct EventDispatcher {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
    waiters: Mutex<HashMap<EventKind, Vec<Waiter>>>,
    suppressed: HashSet<String>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            suppressed: HashSet::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Dispatcher that silently drops the named events
    #[must_use]
    pub fn with_suppressed<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suppressed: events.into_iter().map(Into::into).collect(),
            ..Self::new()
        }
    }

    /// Check if an event name is suppressed
    #[must_use]
    pub fn is_suppressed(&self, name: &str) -> bool {
        self.suppressed.contains(name)
    }

    /// Register a listener for every event of `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&GatewayEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), false)
    }

    /// Register a listener that is removed after its first invocation
    pub fn once<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&GatewayEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), true)
    }

    fn register(&self, kind: EventKind, handler: Handler, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push(Listener { id, handler, once });
        trace!(event = %kind, listener = id.0, once, "Listener registered");
        id
    }

    /// Remove a listener; returns false if it was already gone
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        for list in listeners.values_mut() {
            if let Some(index) = list.iter().position(|l| l.id == id) {
                list.remove(index);
                return true;
            }
        }
        false
    }

    /// Number of listeners registered for `kind`
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Number of pending [`wait_for`](Self::wait_for) calls
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().values().map(Vec::len).sum()
    }

    /// Wait for the next event of `kind` matching `predicate`.
    ///
    /// The registration is removed when the wait times out, is cancelled
    /// through [`cancel_waiters`](Self::cancel_waiters), or the returned future
    /// is dropped. The predicate runs with the waiter table locked and must not
    /// call back into the dispatcher; if it panics the wait ends as cancelled.
    pub async fn wait_for<P>(
        &self,
        kind: EventKind,
        predicate: P,
        timeout: Duration,
    ) -> Result<GatewayEvent, DispatchError>
    where
        P: Fn(&GatewayEvent) -> bool + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters.lock().entry(kind).or_default().push(Waiter {
            id,
            predicate: Box::new(predicate),
            tx,
        });
        let _guard = WaiterGuard {
            dispatcher: self,
            kind,
            id,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(DispatchError::Cancelled),
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                debug!(event = %kind, timeout_ms, "wait_for timed out");
                Err(DispatchError::Timeout(timeout))
            }
        }
    }

    /// Resolve every pending wait with [`DispatchError::Cancelled`]
    pub fn cancel_waiters(&self) -> usize {
        let drained: Vec<Vec<Waiter>> = self.waiters.lock().drain().map(|(_, w)| w).collect();
        drained.iter().map(Vec::len).sum()
    }

    fn remove_waiter(&self, kind: EventKind, id: u64) {
        let mut waiters = self.waiters.lock();
        if let Some(list) = waiters.get_mut(&kind) {
            list.retain(|w| w.id != id);
            if list.is_empty() {
                waiters.remove(&kind);
            }
        }
    }

    /// Deliver an event to waiters and listeners
    pub fn dispatch(&self, event: &GatewayEvent) -> DispatchOutcome {
        let name = event.name();
        if self.is_suppressed(name) {
            trace!(event = %name, "Dropping suppressed event");
            return DispatchOutcome {
                suppressed: true,
                ..DispatchOutcome::default()
            };
        }

        let kind = event.kind();
        let mut failures = Vec::new();
        let woken = self.wake_waiters(kind, event, &mut failures);

        // Snapshot so listeners may register or remove listeners themselves
        let handlers: Vec<(ListenerId, Handler)> = {
            let mut listeners = self.listeners.lock();
            match listeners.get_mut(&kind) {
                Some(list) => {
                    let snapshot = list.iter().map(|l| (l.id, Arc::clone(&l.handler))).collect();
                    list.retain(|l| !l.once);
                    snapshot
                }
                None => Vec::new(),
            }
        };

        let mut outcome = DispatchOutcome {
            woken,
            failures,
            ..DispatchOutcome::default()
        };

        for (id, handler) in handlers {
            outcome.delivered += 1;
            let result = match catch_unwind(AssertUnwindSafe(|| (*handler)(event))) {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!("listener panicked: {}", panic_message(&*panic))),
            };

            if let Err(error) = result {
                warn!(event = %name, listener = id.0, error = %error, "Event listener failed");
                outcome.failures.push(ListenerFailure {
                    listener: id,
                    event: name.to_string(),
                    error,
                });
            }
        }

        outcome
    }

    /// A panicking predicate drops its waiter, which then resolves as cancelled
    fn wake_waiters(
        &self,
        kind: EventKind,
        event: &GatewayEvent,
        failures: &mut Vec<ListenerFailure>,
    ) -> usize {
        let mut waiters = self.waiters.lock();
        let Some(list) = waiters.get_mut(&kind) else {
            return 0;
        };

        let mut woken = 0;
        list.retain_mut(|waiter| {
            if waiter.tx.is_closed() {
                return false;
            }
            match catch_unwind(AssertUnwindSafe(|| (waiter.predicate)(event))) {
                Ok(true) => {}
                Ok(false) => return true,
                Err(panic) => {
                    let error = anyhow::anyhow!(
                        "wait_for predicate panicked: {}",
                        panic_message(&*panic)
                    );
                    warn!(
                        event = %event.name(),
                        waiter = waiter.id,
                        error = %error,
                        "Event waiter failed"
                    );
                    failures.push(ListenerFailure {
                        listener: ListenerId(waiter.id),
                        event: event.name().to_string(),
                        error,
                    });
                    return false;
                }
            }
            // The first matching event settles the wait; the waiter leaves either way
            let (placeholder, _) = oneshot::channel();
            let tx = std::mem::replace(&mut waiter.tx, placeholder);
            if tx.send(event.clone()).is_ok() {
                woken += 1;
            }
            false
        });

        if list.is_empty() {
            waiters.remove(&kind);
        }
        woken
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: usize = self.listeners.lock().values().map(Vec::len).sum();
        f.debug_struct("EventDispatcher")
            .field("listeners", &listeners)
            .field("waiters", &self.waiter_count())
            .field("suppressed", &self.suppressed)
            .finish()
    }
}

struct WaiterGuard<'a> {
    dispatcher: &'a EventDispatcher,
    kind: EventKind,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.remove_waiter(self.kind, self.id);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
