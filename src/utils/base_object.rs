// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Base object providing identification and event handling for framewire
//! components.
//!
//! Every major component embeds (or shares, via `Arc`) a [`BaseObject`] to
//! obtain a unique ID, a human-readable name, and a lightweight named-event
//! system. Transports use the event system to surface connection lifecycle
//! events (`on_client_connected` and friends) to application code.
//!
//! # Event system
//!
//! Events are declared with [`BaseObject::register_event_handler`] and fired
//! with [`BaseObject::call_event_handler`]. Each event is either *synchronous*
//! (handler futures are awaited inline, in registration order) or
//! *asynchronous* (each handler future is spawned as a background Tokio
//! task). Handlers receive an [`EventPayload`] carrying the identity of the
//! remote client or participant that triggered the event.
//!
//! The registry uses interior mutability so that background transport tasks
//! holding an `Arc<BaseObject>` can fire events while the owning component
//! keeps registering handlers.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Global counters
// ---------------------------------------------------------------------------

/// Global monotonically-increasing object ID counter.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a globally unique object identifier.
pub fn obj_id() -> u64 {
    OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Per-type instance counters, used for auto-generated names.
static OBJ_COUNTS: std::sync::OnceLock<Mutex<HashMap<String, u64>>> = std::sync::OnceLock::new();

/// Return a per-type instance count for the given type name, then increment.
///
/// The first call for a given `type_name` returns 0, the second returns 1.
pub fn obj_count(type_name: &str) -> u64 {
    let mut map = OBJ_COUNTS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .expect("obj_count lock poisoned");
    let entry = map.entry(type_name.to_string()).or_insert(0);
    let val = *entry;
    *entry += 1;
    val
}

// ---------------------------------------------------------------------------
// Event handler types
// ---------------------------------------------------------------------------

/// Payload delivered to event handlers when an event fires.
///
/// Carries the identity of the remote client or participant the event refers
/// to, plus an optional backend-specific detail value.
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    /// Identifier of the client/participant that triggered the event, if any.
    pub client_id: Option<String>,
    /// Backend-specific event details (e.g. a raw signaling message).
    pub detail: Option<serde_json::Value>,
}

impl EventPayload {
    /// Payload with no client identity attached.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload identifying a client/participant.
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            detail: None,
        }
    }
}

/// Type alias for an async event handler callback.
///
/// Handlers are trait objects that, when called with the event payload,
/// return a pinned future. Any additional context must be captured via
/// `Arc`/`Clone` before registering the handler.
pub type EventHandler = Arc<
    dyn Fn(EventPayload) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// A named event with its registered handlers and execution mode.
struct EventHandlerEntry {
    /// Handler callbacks in registration order.
    handlers: Vec<EventHandler>,
    /// When `true` each handler future is awaited inline; when `false` each
    /// handler is spawned as a background Tokio task.
    is_sync: bool,
}

// ---------------------------------------------------------------------------
// BaseObject
// ---------------------------------------------------------------------------

/// Foundational object providing identification and event handling.
///
/// Provides:
///
/// * A unique numeric [`id`](BaseObject::id).
/// * A human-readable [`name`](BaseObject::name) (auto-generated or custom).
/// * A named [event handler registry](BaseObject::call_event_handler).
/// * Async [cleanup](BaseObject::cleanup) that waits for in-flight event tasks.
pub struct BaseObject {
    id: u64,
    name: String,
    /// Registered event handlers keyed by event name. A `std::sync::Mutex`
    /// so registration and dispatch work from `&self`; handler lists are
    /// cloned out before any await point.
    event_handlers: Mutex<HashMap<String, EventHandlerEntry>>,
    /// Background (non-sync) event tasks still running, with their event
    /// names so cleanup can report what it is waiting on.
    event_tasks: tokio::sync::Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl BaseObject {
    /// Create a new `BaseObject` with an optional custom name.
    pub fn new(name: Option<String>) -> Self {
        Self::with_type_name("BaseObject", name)
    }

    /// Create a new `BaseObject` using a given *type name* for auto-naming.
    ///
    /// When `name` is `None` the generated name follows the pattern
    /// `"<type_name>#<count>"` with a per-type count.
    pub fn with_type_name(type_name: &str, name: Option<String>) -> Self {
        let id = obj_id();
        let name = name.unwrap_or_else(|| format!("{}#{}", type_name, obj_count(type_name)));
        Self {
            id,
            name,
            event_handlers: Mutex::new(HashMap::new()),
            event_tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Return the unique numeric identifier for this object.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the human-readable name of this object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a new event type.
    ///
    /// Must be called before handlers can be attached with
    /// [`add_event_handler`](BaseObject::add_event_handler).
    ///
    /// * `event_name` -- unique string identifying the event.
    /// * `is_sync` -- when `true`, handlers are awaited inline; when `false`
    ///   they are spawned as background tasks.
    ///
    /// Registering the same event name twice logs a warning and is a no-op.
    pub fn register_event_handler(&self, event_name: &str, is_sync: bool) {
        let mut handlers = self.event_handlers.lock().expect("event registry poisoned");
        if handlers.contains_key(event_name) {
            tracing::warn!("{}: event {} already registered", self.name, event_name);
            return;
        }
        handlers.insert(
            event_name.to_string(),
            EventHandlerEntry {
                handlers: Vec::new(),
                is_sync,
            },
        );
    }

    /// Returns `true` if `event_name` has been declared.
    pub fn has_event(&self, event_name: &str) -> bool {
        self.event_handlers
            .lock()
            .expect("event registry poisoned")
            .contains_key(event_name)
    }

    /// Attach a handler to a previously declared event.
    ///
    /// Returns `false` (and logs a warning) if `event_name` was never
    /// declared, in which case the handler is **not** stored.
    pub fn add_event_handler(&self, event_name: &str, handler: EventHandler) -> bool {
        let mut handlers = self.event_handlers.lock().expect("event registry poisoned");
        match handlers.get_mut(event_name) {
            Some(entry) => {
                entry.handlers.push(handler);
                true
            }
            None => {
                tracing::warn!("{}: event {} not registered", self.name, event_name);
                false
            }
        }
    }

    /// Fire all handlers registered for `event_name` with the given payload.
    ///
    /// * **Synchronous events**: each handler future is awaited sequentially
    ///   in the caller's task, in registration order.
    /// * **Asynchronous events**: each handler is spawned via `tokio::spawn`
    ///   and tracked so [`cleanup`](BaseObject::cleanup) can wait for it.
    ///
    /// Firing an undeclared event is a silent no-op.
    pub async fn call_event_handler(&self, event_name: &str, payload: EventPayload) {
        // Clone the handler list out so no lock is held across awaits.
        let (handlers, is_sync) = {
            let registry = self.event_handlers.lock().expect("event registry poisoned");
            match registry.get(event_name) {
                Some(entry) => (entry.handlers.clone(), entry.is_sync),
                None => return,
            }
        };

        for handler in handlers {
            if is_sync {
                (handler)(payload.clone()).await;
            } else {
                let p = payload.clone();
                let handle = tokio::spawn(async move {
                    (handler)(p).await;
                });
                self.event_tasks
                    .lock()
                    .await
                    .push((event_name.to_string(), handle));
            }
        }

        // Prune completed tasks while we are here to avoid unbounded growth.
        self.prune_finished_tasks().await;
    }

    /// Wait for all in-flight background event handler tasks to complete.
    pub async fn cleanup(&self) {
        let tasks = {
            let mut guard = self.event_tasks.lock().await;
            std::mem::take(&mut *guard)
        };

        if tasks.is_empty() {
            return;
        }

        let event_names: Vec<&str> = tasks.iter().map(|(n, _)| n.as_str()).collect();
        tracing::debug!(
            "{}: waiting on event handlers to finish {:?}...",
            self.name,
            event_names,
        );

        for (_name, handle) in tasks {
            // A panicked handler task must not abort cleanup of the others.
            let _ = handle.await;
        }
    }

    async fn prune_finished_tasks(&self) {
        let mut guard = self.event_tasks.lock().await;
        guard.retain(|(_name, handle)| !handle.is_finished());
    }
}

impl fmt::Display for BaseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for BaseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn obj_id_increments() {
        let a = obj_id();
        let b = obj_id();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn obj_count_per_type() {
        let a = obj_count("TestTypeAlpha");
        let b = obj_count("TestTypeAlpha");
        let c = obj_count("TestTypeBeta");
        assert_eq!(b, a + 1);
        assert_eq!(c, 0);
    }

    #[test]
    fn default_name_uses_type_and_count() {
        let obj = BaseObject::with_type_name("MyTransport", None);
        assert!(obj.name().starts_with("MyTransport#"));
    }

    #[test]
    fn custom_name_is_used() {
        let obj = BaseObject::new(Some("custom".into()));
        assert_eq!(obj.name(), "custom");
    }

    #[test]
    fn add_handler_to_unregistered_event_is_rejected() {
        let obj = BaseObject::new(Some("evtest".into()));
        let handler: EventHandler = Arc::new(|_| Box::pin(async {}));
        assert!(!obj.add_event_handler("bogus", handler));
        assert!(!obj.has_event("bogus"));
    }

    #[tokio::test]
    async fn sync_event_handler_runs_inline() {
        let obj = BaseObject::new(Some("sync-ev".into()));
        obj.register_event_handler("on_ready", true);

        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        let handler: EventHandler = Arc::new(move |_payload| {
            let f = flag_clone.clone();
            Box::pin(async move {
                f.store(true, Ordering::SeqCst);
            })
        });
        assert!(obj.add_event_handler("on_ready", handler));

        obj.call_event_handler("on_ready", EventPayload::empty())
            .await;
        // Sync dispatch: the flag must be set by the time the call returns.
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn async_event_handler_runs_in_background() {
        let obj = BaseObject::new(Some("async-ev".into()));
        obj.register_event_handler("on_done", false);

        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        let handler: EventHandler = Arc::new(move |_payload| {
            let f = flag_clone.clone();
            Box::pin(async move {
                f.store(true, Ordering::SeqCst);
            })
        });
        obj.add_event_handler("on_done", handler);

        obj.call_event_handler("on_done", EventPayload::empty())
            .await;
        obj.cleanup().await;
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handler_receives_payload() {
        let obj = BaseObject::new(Some("payload-ev".into()));
        obj.register_event_handler("on_client_connected", true);

        let seen = Arc::new(Mutex::new(None::<String>));
        let seen_clone = seen.clone();
        let handler: EventHandler = Arc::new(move |payload| {
            let s = seen_clone.clone();
            Box::pin(async move {
                *s.lock().unwrap() = payload.client_id;
            })
        });
        obj.add_event_handler("on_client_connected", handler);

        obj.call_event_handler("on_client_connected", EventPayload::for_client("peer-7"))
            .await;
        assert_eq!(seen.lock().unwrap().as_deref(), Some("peer-7"));
    }

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let obj = BaseObject::new(Some("order-ev".into()));
        obj.register_event_handler("on_seq", true);

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order_clone = order.clone();
            let handler: EventHandler = Arc::new(move |_payload| {
                let o = order_clone.clone();
                Box::pin(async move {
                    o.lock().unwrap().push(i);
                })
            });
            obj.add_event_handler("on_seq", handler);
        }

        obj.call_event_handler("on_seq", EventPayload::empty())
            .await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn calling_unregistered_event_is_noop() {
        let obj = BaseObject::new(Some("noop-ev".into()));
        obj.call_event_handler("nonexistent", EventPayload::empty())
            .await;
    }

    #[tokio::test]
    async fn cleanup_is_safe_when_no_tasks() {
        let obj = BaseObject::new(Some("empty-cleanup".into()));
        obj.cleanup().await;
    }
}
