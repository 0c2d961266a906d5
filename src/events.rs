//! Connect/disconnect notifications from a signer.
//!
//! Listeners are registered through [`WalletEvents::subscribe`] and stay
//! registered until the returned [`Subscription`] is dropped or explicitly
//! unsubscribed. Each state transition is delivered at most once: emitting
//! the same transition twice in a row is a no-op.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;

use crate::types::Account;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Connected(Account),
    Disconnected,
}

type Listener = Arc<dyn Fn(&WalletEvent) + Send + Sync>;

struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    last: WalletEvent,
}

impl Registry {
    fn remove(&mut self, id: u64) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Clone)]
pub struct WalletEvents {
    registry: Arc<Mutex<Registry>>,
}

impl Default for WalletEvents {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
                last: WalletEvent::Disconnected,
            })),
        }
    }
}

impl std::fmt::Debug for WalletEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reg = lock(&self.registry);
        f.debug_struct("WalletEvents")
            .field("listeners", &reg.listeners.len())
            .field("last", &reg.last)
            .finish()
    }
}

impl WalletEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        let mut reg = lock(&self.registry);
        let id = reg.next_id;
        reg.next_id += 1;
        reg.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every listener. Returns `false` when the event
    /// repeats the previous transition and was suppressed.
    pub fn emit(&self, event: WalletEvent) -> bool {
        let listeners: Vec<Listener> = {
            let mut reg = lock(&self.registry);
            if reg.last == event {
                debug!(?event, "duplicate wallet transition suppressed");
                return false;
            }
            reg.last = event.clone();
            reg.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        // called outside the lock so listeners may subscribe or unsubscribe
        for listener in listeners {
            listener(&event);
        }
        true
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

/// Unsubscribe handle returned by [`WalletEvents::subscribe`].
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.id);
        }
    }
}
