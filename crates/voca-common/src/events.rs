//! Synchronous, in-process publish/subscribe.
//!
//! Listeners run on the publishing thread, in the order they subscribed.
//! The listener list is snapshotted before delivery, so a listener that
//! subscribes or unsubscribes (or publishes) while an event is being
//! delivered does not change who receives the current event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// An event that can be filtered by name.
pub trait NamedEvent {
    type Name: Copy + Eq + Send + Sync + 'static;

    fn name(&self) -> Self::Name;
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E: NamedEvent> {
    id: u64,
    filter: Option<E::Name>,
    callback: Callback<E>,
}

struct Registry<E: NamedEvent> {
    next_id: u64,
    listeners: Vec<Listener<E>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct EventBus<E: NamedEvent> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: NamedEvent + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Listen for events with the given name.
    pub fn on<F>(&self, name: E::Name, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(Some(name), Arc::new(callback))
    }

    /// Listen for every event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(callback))
    }

    /// Deliver `event` to every matching listener. Returns how many ran.
    pub fn publish(&self, event: &E) -> usize {
        let name = event.name();
        let targets: Vec<Callback<E>> = lock(&self.registry)
            .listeners
            .iter()
            .filter(|l| l.filter.map_or(true, |f| f == name))
            .map(|l| Arc::clone(&l.callback))
            .collect();

        for callback in &targets {
            callback(event);
        }
        targets.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    fn add(&self, filter: Option<E::Name>, callback: Callback<E>) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push(Listener {
                id,
                filter,
                callback,
            });
            id
        };

        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    lock(&registry).listeners.retain(|l| l.id != id);
                }
            })),
        }
    }
}

impl<E: NamedEvent + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventBus::on`] and [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
