//! Subscription registry and sequential event dispatch
//!
//! Each event kind owns an ordered collection of handler entries keyed by
//! `(owner, name)`. Firing an event awaits every handler in insertion order,
//! one at a time; later handlers may rely on state changed by earlier ones.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};

use crate::error::HandlerError;

use super::kind::EventKind;

/// Owner key used by handlers registered through [`EventBus::on_event`]
pub const LEGACY_OWNER: &str = "legacy";

/// Future returned by an event handler
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// A subscribed event handler
pub type EventHandler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Wraps an async closure as an [`EventHandler`]
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Clone)]
struct SubscriptionEntry {
    owner: String,
    name: String,
    handler: EventHandler,
    transient: bool,
    /// Identity of this registration; a replacement gets a new one
    seq: u64,
}

impl SubscriptionEntry {
    fn matches(&self, owner: &str, name: &str) -> bool {
        self.owner == owner && self.name == name
    }
}

/// Outcome of a single [`EventBus::fire`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Number of handlers invoked
    pub invoked: usize,
    /// `owner/name` of every handler that failed or panicked
    pub failed: Vec<String>,
}

/// Process-wide subscription registry
#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<HashMap<EventKind, Vec<SubscriptionEntry>>>,
    next_seq: AtomicU64,
    legacy_count: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind` under the key `(owner, name)`
    ///
    /// Subscribing again with the same key replaces the handler in place:
    /// it keeps its position and is never invoked twice per fire. A
    /// transient handler is removed right after its first invocation.
    /// Entries added while the same kind is being fired run from the next
    /// fire on.
    pub fn subscribe(
        &self,
        owner: &str,
        kind: EventKind,
        name: &str,
        handler: EventHandler,
        transient: bool,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = SubscriptionEntry {
            owner: owner.to_string(),
            name: name.to_string(),
            handler,
            transient,
            seq,
        };

        let mut subscriptions = self.lock();
        let entries = subscriptions.entry(kind).or_default();
        match entries.iter_mut().find(|e| e.matches(owner, name)) {
            Some(existing) => {
                debug!(event = %kind, owner, name, "Subscription replaced");
                *existing = entry;
            }
            None => {
                debug!(event = %kind, owner, name, transient, "Subscription added");
                entries.push(entry);
            }
        }
    }

    /// Registers a handler through the legacy callback API
    ///
    /// Every call adds a new entry under [`LEGACY_OWNER`] with a generated
    /// name, which is returned so the caller can unsubscribe later.
    pub fn on_event(&self, kind: EventKind, handler: EventHandler) -> String {
        let n = self.legacy_count.fetch_add(1, Ordering::SeqCst);
        let name = format!("on-event-{n}");
        self.subscribe(LEGACY_OWNER, kind, &name, handler, false);
        name
    }

    /// Removes the entry `(owner, name)` from `kind`
    pub fn unsubscribe(&self, owner: &str, kind: EventKind, name: &str) -> bool {
        let mut subscriptions = self.lock();
        let Some(entries) = subscriptions.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| !e.matches(owner, name));
        entries.len() != before
    }

    /// Removes every entry registered by `owner`, returning how many were removed
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        let mut subscriptions = self.lock();
        subscriptions
            .values_mut()
            .map(|entries| {
                let before = entries.len();
                entries.retain(|e| e.owner != owner);
                before - entries.len()
            })
            .sum()
    }

    /// Returns the number of handlers registered for `kind`
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Returns `(owner, name)` of every handler for `kind`, in invocation order
    #[must_use]
    pub fn subscriber_names(&self, kind: EventKind) -> Vec<(String, String)> {
        self.lock()
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.owner.clone(), e.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Invokes every handler registered for `kind`
    ///
    /// Handlers run sequentially in insertion order; each is awaited before
    /// the next starts. A handler that returns an error or panics is logged
    /// and skipped over. Transient entries are removed right after they
    /// run, whatever the outcome.
    pub async fn fire(&self, kind: EventKind) -> FireReport {
        let snapshot: Vec<SubscriptionEntry> = self.lock().get(&kind).cloned().unwrap_or_default();

        let mut report = FireReport::default();
        if snapshot.is_empty() {
            return report;
        }

        debug!(event = %kind, handlers = snapshot.len(), "Firing event");

        for entry in snapshot {
            let handler = Arc::clone(&entry.handler);
            let outcome = AssertUnwindSafe(async move { handler().await })
                .catch_unwind()
                .await;
            report.invoked += 1;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        event = %kind,
                        owner = %entry.owner,
                        name = %entry.name,
                        error = %err,
                        "Event handler failed"
                    );
                    report.failed.push(format!("{}/{}", entry.owner, entry.name));
                }
                Err(panic) => {
                    error!(
                        event = %kind,
                        owner = %entry.owner,
                        name = %entry.name,
                        panic = %panic_message(panic.as_ref()),
                        "Event handler panicked"
                    );
                    report.failed.push(format!("{}/{}", entry.owner, entry.name));
                }
            }

            if entry.transient {
                self.remove_registration(kind, entry.seq);
            }
        }

        report
    }

    /// Removes the entry with the given registration identity, if still present
    fn remove_registration(&self, kind: EventKind, seq: u64) {
        if let Some(entries) = self.lock().get_mut(&kind) {
            entries.retain(|e| e.seq != seq);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<SubscriptionEntry>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(EventKind, usize)> = EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.subscriber_count(*kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        f.debug_struct("EventBus").field("subscriptions", &counts).finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
