//! Dependency handles attached to cache entries.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::dependency";

#[derive(Default)]
struct TokenState {
    fired: AtomicBool,
    listeners: Mutex<Vec<Weak<AtomicBool>>>,
}

/// Push-style change notification handed out by a store.
///
/// A token starts unfired and flips exactly once. Clones share the state, so the
/// producer keeps one clone and fires it when the watched path changes. Caches
/// holding the token subscribe a flag that is raised on fire.
#[derive(Clone, Default)]
pub struct ChangeToken {
    state: Arc<TokenState>,
}

impl ChangeToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.state.fired.store(true, Ordering::Release);
        let listeners = std::mem::take(&mut *mutex_lock(&self.state.listeners, SOURCE, "fire"));
        for listener in listeners {
            if let Some(flag) = listener.upgrade() {
                flag.store(true, Ordering::Release);
            }
        }
    }

    pub fn has_fired(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Two tokens are the same handle when they share state.
    pub fn same_handle(&self, other: &ChangeToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// True when no clone other than this one is alive.
    pub(crate) fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.state) == 1
    }

    /// Raise `flag` when this token fires. Raised immediately if already fired.
    pub(crate) fn subscribe(&self, flag: &Arc<AtomicBool>) {
        let mut listeners = mutex_lock(&self.state.listeners, SOURCE, "subscribe");
        if self.has_fired() {
            flag.store(true, Ordering::Release);
            return;
        }
        listeners.retain(|existing| existing.strong_count() > 0);
        let already = listeners
            .iter()
            .any(|existing| existing.as_ptr() == Arc::as_ptr(flag));
        if !already {
            listeners.push(Arc::downgrade(flag));
        }
    }
}

impl fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeToken")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Something a cache entry depends on.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// Another entry in the same store. Removing or replacing it invalidates the dependent.
    Key(String),
    /// An external change notification.
    Change(ChangeToken),
}

impl Dependency {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

impl From<ChangeToken> for Dependency {
    fn from(token: ChangeToken) -> Self {
        Self::Change(token)
    }
}
