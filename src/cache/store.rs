//! Dependency-aware key/value cache.
//!
//! Entries are immutable once inserted and may depend on other keys or on
//! external change tokens. Removing a key cascades through every entry built
//! on it. Entries may carry an update callback which is consulted before the
//! entry leaves the cache, and which can re-arm the entry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::{debug, trace};

use super::dependency::{ChangeToken, Dependency};
use super::lock::{rw_read, rw_write};
use super::registry::DependencyIndex;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "vellum_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "vellum_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "vellum_cache_evict_total";

const NO_DEADLINE: u64 = u64::MAX;

/// When an entry stops being valid on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    Never,
    Absolute(Instant),
    /// Expires once it has not been read for the given duration.
    Sliding(Duration),
}

impl Expiration {
    /// Absolute expiry `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self::Absolute(Instant::now() + duration)
    }
}

/// Why an entry with an update callback is leaving the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    Expired,
    DependencyChanged,
}

impl ExpiryReason {
    fn as_label(self) -> &'static str {
        match self {
            ExpiryReason::Expired => "expired",
            ExpiryReason::DependencyChanged => "dependency",
        }
    }
}

/// What the cache does with an entry after its update callback ran.
pub enum UpdateAction<V> {
    /// Put a replacement under the same key.
    Reinsert { value: V, options: EntryOptions<V> },
    /// Let the entry go, and remove the listed keys as well.
    Remove { also_evict: Vec<String> },
}

impl<V> UpdateAction<V> {
    pub fn remove() -> Self {
        Self::Remove {
            also_evict: Vec::new(),
        }
    }
}

/// Pure decision function consulted before an entry is evicted. It receives
/// the key, the current value and the reason; the store applies the returned
/// action after its own locks are released.
pub type UpdateCallback<V> =
    Arc<dyn Fn(&str, &V, ExpiryReason) -> UpdateAction<V> + Send + Sync + 'static>;

/// Insert-time options for an entry.
pub struct EntryOptions<V> {
    pub dependencies: Vec<Dependency>,
    pub expiration: Expiration,
    pub on_update: Option<UpdateCallback<V>>,
}

impl<V> Default for EntryOptions<V> {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            expiration: Expiration::Never,
            on_update: None,
        }
    }
}

impl<V> EntryOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depends_on(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn depends_on_key(self, key: impl Into<String>) -> Self {
        self.depends_on(Dependency::Key(key.into()))
    }

    pub fn depends_on_all(mut self, dependencies: impl IntoIterator<Item = Dependency>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn expires(mut self, expiration: Expiration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn on_update(mut self, callback: UpdateCallback<V>) -> Self {
        self.on_update = Some(callback);
        self
    }
}

impl<V> fmt::Debug for EntryOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryOptions")
            .field("dependencies", &self.dependencies)
            .field("expiration", &self.expiration)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

struct Slot<V> {
    value: V,
    tokens: Vec<ChangeToken>,
    expiration: Expiration,
    /// Milliseconds since the store epoch of the last read.
    touched_ms: AtomicU64,
    on_update: Option<UpdateCallback<V>>,
}

impl<V> Slot<V> {
    fn deadline(&self, epoch: Instant) -> Option<Instant> {
        match self.expiration {
            Expiration::Never => None,
            Expiration::Absolute(at) => Some(at),
            Expiration::Sliding(window) => Some(
                epoch + Duration::from_millis(self.touched_ms.load(Ordering::Relaxed)) + window,
            ),
        }
    }

    fn expired(&self, epoch: Instant, now: Instant) -> bool {
        self.deadline(epoch).is_some_and(|deadline| deadline <= now)
    }

    fn tokens_fired(&self) -> bool {
        self.tokens.iter().any(ChangeToken::has_fired)
    }
}

struct Inner<V> {
    entries: HashMap<String, Slot<V>>,
    index: DependencyIndex,
}

/// An entry taken out of the map whose callback still has to run.
struct Evicted<V> {
    key: String,
    value: V,
    reason: ExpiryReason,
    on_update: Option<UpdateCallback<V>>,
}

/// Generic cache with key/token dependencies, absolute or sliding expiry and
/// update callbacks.
pub struct CacheStore<V> {
    inner: RwLock<Inner<V>>,
    epoch: Instant,
    /// Earliest instant (ms since epoch) at which some entry may expire.
    next_deadline_ms: AtomicU64,
    /// Raised by change tokens held by entries.
    tokens_dirty: Arc<AtomicBool>,
}

impl<V> Default for CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                index: DependencyIndex::new(),
            }),
            epoch: Instant::now(),
            next_deadline_ms: AtomicU64::new(NO_DEADLINE),
            tokens_dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Look up a live entry, refreshing its sliding window.
    pub fn get(&self, key: &str) -> Option<V> {
        self.maintain();

        let now = Instant::now();
        let stale = {
            let inner = rw_read(&self.inner, SOURCE, "get");
            match inner.entries.get(key) {
                Some(slot) if !slot.expired(self.epoch, now) && !slot.tokens_fired() => {
                    slot.touched_ms
                        .store(self.millis_since_epoch(now), Ordering::Relaxed);
                    counter!(METRIC_CACHE_HIT).increment(1);
                    return Some(slot.value.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if stale {
            self.purge_expired();
        }
        counter!(METRIC_CACHE_MISS).increment(1);
        None
    }

    /// True when a live entry exists. Does not refresh sliding windows.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = rw_read(&self.inner, SOURCE, "contains_key");
        inner
            .entries
            .get(key)
            .is_some_and(|slot| !slot.expired(self.epoch, now) && !slot.tokens_fired())
    }

    /// Insert or replace an entry.
    ///
    /// Replacing a key invalidates everything depending on the old entry. An
    /// entry depending on an absent key or on an already fired token is
    /// invalid from the start and is not stored; `false` is returned then.
    pub fn insert(&self, key: impl Into<String>, value: V, options: EntryOptions<V>) -> bool {
        self.store_entry(key.into(), value, options, false)
    }

    /// Insert only when no live entry exists under `key`.
    ///
    /// A live entry is left untouched, so its dependents survive; `false` is
    /// returned then.
    pub fn insert_if_absent(
        &self,
        key: impl Into<String>,
        value: V,
        options: EntryOptions<V>,
    ) -> bool {
        self.store_entry(key.into(), value, options, true)
    }

    fn store_entry(&self, key: String, value: V, options: EntryOptions<V>, keep_live: bool) -> bool {
        let now = Instant::now();
        let mut parents = HashSet::new();
        let mut tokens = Vec::new();
        for dependency in options.dependencies {
            match dependency {
                Dependency::Key(parent) => {
                    parents.insert(parent);
                }
                Dependency::Change(token) => tokens.push(token),
            }
        }

        let mut evicted = Vec::new();
        let stored = {
            let mut inner = rw_write(&self.inner, SOURCE, "insert");
            let live = inner
                .entries
                .get(&key)
                .is_some_and(|slot| !slot.expired(self.epoch, now) && !slot.tokens_fired());
            if keep_live && live {
                return false;
            }
            // The replaced entry itself gets no callback.
            let _replaced = Self::detach(&mut inner, &key, &mut evicted);

            let dangling = parents
                .iter()
                .find(|parent| *parent == &key || !inner.entries.contains_key(parent.as_str()));
            if let Some(parent) = dangling {
                debug!(
                    target: "vellum::cache",
                    key = %key,
                    parent = %parent,
                    "Dropping insert that depends on an absent key"
                );
                false
            } else if tokens.iter().any(ChangeToken::has_fired) {
                debug!(
                    target: "vellum::cache",
                    key = %key,
                    "Dropping insert whose change token already fired"
                );
                false
            } else {
                for token in &tokens {
                    token.subscribe(&self.tokens_dirty);
                }
                let slot = Slot {
                    value,
                    tokens,
                    expiration: options.expiration,
                    touched_ms: AtomicU64::new(self.millis_since_epoch(now)),
                    on_update: options.on_update,
                };
                if let Some(deadline) = slot.deadline(self.epoch) {
                    self.lower_deadline(deadline);
                }
                inner.index.register(&key, parents);
                inner.entries.insert(key.clone(), slot);
                true
            }
        };

        trace!(target: "vellum::cache", key = %key, stored, "Cache insert");
        self.run_callbacks(evicted);
        stored
    }

    /// Remove an entry and everything depending on it.
    ///
    /// The removed entry's own callback is not consulted; dependents with a
    /// callback see [`ExpiryReason::DependencyChanged`].
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut evicted = Vec::new();
        let removed = {
            let mut inner = rw_write(&self.inner, SOURCE, "remove");
            Self::detach(&mut inner, key, &mut evicted)
        };
        if removed.is_some() {
            counter!(METRIC_CACHE_EVICT, "reason" => "removed").increment(1);
            trace!(
                target: "vellum::cache",
                key,
                cascaded = evicted.len(),
                "Cache entry removed"
            );
        }
        self.run_callbacks(evicted);
        removed.map(|slot| slot.value)
    }

    /// Evict expired entries and entries whose change tokens fired.
    ///
    /// Returns the number of entries that left the cache, counting cascades.
    pub fn purge_expired(&self) -> usize {
        self.tokens_dirty.store(false, Ordering::Release);
        let now = Instant::now();
        let mut evicted = Vec::new();
        {
            let mut inner = rw_write(&self.inner, SOURCE, "purge_expired");
            let doomed: Vec<(String, ExpiryReason)> = inner
                .entries
                .iter()
                .filter_map(|(key, slot)| {
                    if slot.tokens_fired() {
                        Some((key.clone(), ExpiryReason::DependencyChanged))
                    } else if slot.expired(self.epoch, now) {
                        Some((key.clone(), ExpiryReason::Expired))
                    } else {
                        None
                    }
                })
                .collect();

            for (key, reason) in doomed {
                if let Some(slot) = Self::detach(&mut inner, &key, &mut evicted) {
                    evicted.push(Evicted {
                        key,
                        value: slot.value,
                        reason,
                        on_update: slot.on_update,
                    });
                }
            }

            let next = inner
                .entries
                .values()
                .filter_map(|slot| slot.deadline(self.epoch))
                .min()
                .map(|deadline| self.millis_since_epoch(deadline))
                .unwrap_or(NO_DEADLINE);
            self.next_deadline_ms.store(next, Ordering::Release);
        }

        let count = evicted.len();
        if count > 0 {
            debug!(target: "vellum::cache", count, "Purged cache entries");
        }
        self.run_callbacks(evicted);
        count
    }

    /// Drop every entry without consulting callbacks.
    pub fn clear(&self) {
        let mut inner = rw_write(&self.inner, SOURCE, "clear");
        inner.entries.clear();
        inner.index.clear();
        self.next_deadline_ms.store(NO_DEADLINE, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently stored, live or not yet purged.
    pub fn keys(&self) -> Vec<String> {
        rw_read(&self.inner, SOURCE, "keys")
            .entries
            .keys()
            .cloned()
            .collect()
    }

    fn maintain(&self) {
        let due = self.next_deadline_ms.load(Ordering::Acquire)
            <= self.millis_since_epoch(Instant::now());
        if due || self.tokens_dirty.load(Ordering::Acquire) {
            self.purge_expired();
        }
    }

    /// Take `key` out of the map and cascade to its dependents, which are
    /// queued in `evicted` with [`ExpiryReason::DependencyChanged`].
    fn detach(inner: &mut Inner<V>, key: &str, evicted: &mut Vec<Evicted<V>>) -> Option<Slot<V>> {
        let root = inner.entries.remove(key)?;
        inner.index.unregister(key);

        let mut pending = inner.index.dependents_of(key);
        while let Some(child) = pending.pop() {
            let Some(slot) = inner.entries.remove(&child) else {
                inner.index.unregister(&child);
                continue;
            };
            inner.index.unregister(&child);
            pending.extend(inner.index.dependents_of(&child));
            evicted.push(Evicted {
                key: child,
                value: slot.value,
                reason: ExpiryReason::DependencyChanged,
                on_update: slot.on_update,
            });
        }
        Some(root)
    }

    fn run_callbacks(&self, evicted: Vec<Evicted<V>>) {
        for entry in evicted {
            counter!(METRIC_CACHE_EVICT, "reason" => entry.reason.as_label()).increment(1);
            let Some(callback) = entry.on_update else {
                continue;
            };
            match callback(&entry.key, &entry.value, entry.reason) {
                UpdateAction::Reinsert { value, options } => {
                    trace!(target: "vellum::cache", key = %entry.key, "Re-arming cache entry");
                    self.insert(entry.key, value, options);
                }
                UpdateAction::Remove { also_evict } => {
                    for key in also_evict {
                        self.remove(&key);
                    }
                }
            }
        }
    }

    fn lower_deadline(&self, deadline: Instant) {
        self.next_deadline_ms
            .fetch_min(self.millis_since_epoch(deadline), Ordering::AcqRel);
    }

    fn millis_since_epoch(&self, at: Instant) -> u64 {
        let elapsed = at.saturating_duration_since(self.epoch);
        u64::try_from(elapsed.as_millis()).unwrap_or(NO_DEADLINE - 1)
    }
}
