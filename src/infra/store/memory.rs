//! In-memory template store.
//!
//! Directories are implicit: `~/Views/` exists while some file lives under it.
//! With push notifications enabled every watched path gets a [`ChangeToken`]
//! that fires when the file, or anything under the directory, is written or
//! removed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use tracing::trace;

use super::sha256_hex;
use crate::application::store::{StoreError, VirtualStore};
use crate::cache::{ChangeToken, mutex_lock, rw_read, rw_write};

const SOURCE: &str = "infra::store::memory";

/// Snapshot of the I/O calls a [`MemoryStore`] served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub exists: usize,
    pub reads: usize,
    pub fingerprints: usize,
    pub listings: usize,
}

impl IoStats {
    pub fn total(&self) -> usize {
        self.exists + self.reads + self.fingerprints + self.listings
    }
}

#[derive(Default)]
struct IoCounters {
    exists: AtomicUsize,
    reads: AtomicUsize,
    fingerprints: AtomicUsize,
    listings: AtomicUsize,
}

pub struct MemoryStore {
    files: RwLock<BTreeMap<String, String>>,
    watchers: Mutex<Vec<(String, ChangeToken)>>,
    push: bool,
    io: IoCounters,
}

impl MemoryStore {
    /// A store handing out change tokens.
    pub fn with_notifications() -> Self {
        Self::new(true)
    }

    /// A store without change tokens; callers fall back to fingerprints and polling.
    pub fn without_notifications() -> Self {
        Self::new(false)
    }

    fn new(push: bool) -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            watchers: Mutex::new(Vec::new()),
            push,
            io: IoCounters::default(),
        }
    }

    pub fn push_notifications(&self) -> bool {
        self.push
    }

    /// Create or overwrite a file.
    pub fn write(&self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        rw_write(&self.files, SOURCE, "write").insert(path.clone(), content.into());
        self.notify(&path);
    }

    pub fn remove(&self, path: &str) -> bool {
        let removed = rw_write(&self.files, SOURCE, "remove")
            .remove(path)
            .is_some();
        if removed {
            self.notify(path);
        }
        removed
    }

    pub fn io_stats(&self) -> IoStats {
        IoStats {
            exists: self.io.exists.load(Ordering::Relaxed),
            reads: self.io.reads.load(Ordering::Relaxed),
            fingerprints: self.io.fingerprints.load(Ordering::Relaxed),
            listings: self.io.listings.load(Ordering::Relaxed),
        }
    }

    pub fn reset_io_stats(&self) {
        self.io.exists.store(0, Ordering::Relaxed);
        self.io.reads.store(0, Ordering::Relaxed);
        self.io.fingerprints.store(0, Ordering::Relaxed);
        self.io.listings.store(0, Ordering::Relaxed);
    }

    /// Fire and forget every watcher covering `path`.
    fn notify(&self, path: &str) {
        let mut watchers = mutex_lock(&self.watchers, SOURCE, "notify");
        let mut fired = 0;
        watchers.retain(|(watched, token)| {
            if covers(watched, path) {
                token.fire();
                fired += 1;
                false
            } else {
                true
            }
        });
        if fired > 0 {
            trace!(target: "vellum::cache", path, fired, "Fired change tokens");
        }
    }
}

/// A watch on a file covers that file; a watch on a directory covers
/// everything below it.
fn covers(watched: &str, changed: &str) -> bool {
    watched == changed || (watched.ends_with('/') && changed.starts_with(watched))
}

fn as_directory(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

impl VirtualStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.io.exists.fetch_add(1, Ordering::Relaxed);
        rw_read(&self.files, SOURCE, "exists").contains_key(path)
    }

    fn is_directory(&self, path: &str) -> bool {
        let directory = as_directory(path);
        rw_read(&self.files, SOURCE, "is_directory")
            .range(directory.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&directory))
    }

    fn list_files(&self, directory: &str) -> Vec<String> {
        self.io.listings.fetch_add(1, Ordering::Relaxed);
        let directory = as_directory(directory);
        rw_read(&self.files, SOURCE, "list_files")
            .range(directory.clone()..)
            .take_while(|(key, _)| key.starts_with(&directory))
            .filter(|(key, _)| !key[directory.len()..].contains('/'))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn read_content(&self, path: &str) -> Result<String, StoreError> {
        self.io.reads.fetch_add(1, Ordering::Relaxed);
        rw_read(&self.files, SOURCE, "read_content")
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::not_found(path))
    }

    fn fingerprint(&self, path: &str) -> Result<String, StoreError> {
        self.io.fingerprints.fetch_add(1, Ordering::Relaxed);
        rw_read(&self.files, SOURCE, "fingerprint")
            .get(path)
            .map(|content| sha256_hex(content.as_bytes()))
            .ok_or_else(|| StoreError::not_found(path))
    }

    fn change_dependency(&self, path: &str) -> Result<Option<ChangeToken>, StoreError> {
        if !self.push {
            return Ok(None);
        }
        let token = ChangeToken::new();
        let mut watchers = mutex_lock(&self.watchers, SOURCE, "change_dependency");
        watchers.retain(|(_, existing)| !existing.is_orphaned());
        watchers.push((path.to_string(), token.clone()));
        Ok(Some(token))
    }
}
