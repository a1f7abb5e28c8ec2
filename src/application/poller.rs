//! Polling fallback for stores without change notifications.
//!
//! A poller entry sits next to a group's config entry with a short absolute
//! expiry. When it expires the partial folders are rescanned; an unchanged
//! snapshot re-arms the poller, anything else evicts the config.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::debug;

use super::entry::CacheEntry;
use super::group_config::scan_partials;
use super::store::VirtualStore;
use crate::cache::{
    CacheStore, EntryOptions, Expiration, ExpiryReason, KeySpace, UpdateAction, UpdateCallback,
};

pub(crate) const METRIC_POLL_CHECK: &str = "vellum_poll_check_total";

/// Snapshot of a group's partial folders taken when its config was built.
#[derive(Debug)]
pub struct PollingState {
    folders: Vec<String>,
    fingerprints: BTreeMap<String, String>,
    ignored: BTreeSet<String>,
    config_key: String,
}

impl PollingState {
    pub(crate) fn new(
        folders: Vec<String>,
        fingerprints: BTreeMap<String, String>,
        ignored: impl IntoIterator<Item = String>,
        config_key: impl Into<String>,
    ) -> Self {
        Self {
            folders,
            fingerprints,
            ignored: ignored.into_iter().collect(),
            config_key: config_key.into(),
        }
    }

    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    /// Rescan the folders and compare with the snapshot.
    pub(crate) fn unchanged(&self, store: &dyn VirtualStore, extension: &str) -> bool {
        let mut known = 0;
        let mut ignored = 0;
        for path in scan_partials(store, &self.folders, extension) {
            if let Some(expected) = self.fingerprints.get(&path) {
                match store.fingerprint(&path) {
                    Ok(current) if &current == expected => known += 1,
                    _ => return false,
                }
            } else if self.ignored.contains(&path) {
                ignored += 1;
            } else {
                return false;
            }
        }
        known == self.fingerprints.len() && ignored == self.ignored.len()
    }
}

/// Builds poller entries and their update callback.
pub(crate) struct PartialsPoller {
    store: Arc<dyn VirtualStore>,
    extension: String,
    interval: Duration,
}

impl PartialsPoller {
    pub(crate) fn new(
        store: Arc<dyn VirtualStore>,
        extension: impl Into<String>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            extension: extension.into(),
            interval,
        })
    }

    /// Insert a poller for `state` next to its config entry.
    pub(crate) fn arm(self: &Arc<Self>, cache: &CacheStore<CacheEntry>, state: PollingState) -> bool {
        let key = KeySpace::poller(&state.config_key);
        let options = self.options(&state.config_key);
        let armed = cache.insert(key, CacheEntry::Poll(Arc::new(state)), options);
        debug!(target: "vellum::cache", armed, "Armed partial poller");
        armed
    }

    fn options(self: &Arc<Self>, config_key: &str) -> EntryOptions<CacheEntry> {
        EntryOptions::new()
            .depends_on_key(config_key)
            .expires(Expiration::after(self.interval))
            .on_update(self.callback())
    }

    fn callback(self: &Arc<Self>) -> UpdateCallback<CacheEntry> {
        let poller = Arc::clone(self);
        Arc::new(move |key: &str, entry: &CacheEntry, reason: ExpiryReason| {
            let CacheEntry::Poll(state) = entry else {
                return UpdateAction::remove();
            };
            poller.check(key, state, reason)
        })
    }

    fn check(
        self: &Arc<Self>,
        key: &str,
        state: &Arc<PollingState>,
        reason: ExpiryReason,
    ) -> UpdateAction<CacheEntry> {
        let evict_config = UpdateAction::Remove {
            also_evict: vec![state.config_key.clone()],
        };
        if reason == ExpiryReason::DependencyChanged {
            counter!(METRIC_POLL_CHECK, "outcome" => "released").increment(1);
            return evict_config;
        }

        if state.unchanged(self.store.as_ref(), &self.extension) {
            counter!(METRIC_POLL_CHECK, "outcome" => "rearmed").increment(1);
            debug!(target: "vellum::cache", key, "Partials unchanged, re-arming poller");
            UpdateAction::Reinsert {
                value: CacheEntry::Poll(Arc::clone(state)),
                options: self.options(&state.config_key),
            }
        } else {
            counter!(METRIC_POLL_CHECK, "outcome" => "changed").increment(1);
            debug!(
                target: "vellum::cache",
                key,
                config = %state.config_key,
                "Partials changed, evicting group config"
            );
            evict_config
        }
    }
}
