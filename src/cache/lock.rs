use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

#[derive(Clone, Copy)]
enum LockKind {
    Read,
    Write,
    Mutex,
}

impl LockKind {
    fn as_str(self) -> &'static str {
        match self {
            LockKind::Read => "rwlock.read",
            LockKind::Write => "rwlock.write",
            LockKind::Mutex => "mutex.lock",
        }
    }
}

/// Entries are replaced wholesale and never patched, so a map behind a
/// poisoned lock is still consistent.
fn recover<G>(
    poisoned: PoisonError<G>,
    kind: LockKind,
    source: &'static str,
    op: &'static str,
) -> G {
    warn!(
        target: "vellum::cache",
        op,
        source_module = source,
        lock_kind = kind.as_str(),
        result = "poisoned_recovered",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, LockKind::Read, source, op))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, LockKind::Write, source, op))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, LockKind::Mutex, source, op))
}
