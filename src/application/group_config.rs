//! Per-group partial configuration.
//!
//! Each group gets a fork of the site-wide engine with every partial found in
//! its partial folders registered. The fork is built once per cold cache under a
//! per-group lock and cached until a partial, a partial folder or the global
//! root changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use metrics::{counter, histogram};
use tracing::{debug, trace, warn};

use super::engine::TemplateEngine;
use super::entry::{CacheEntry, GroupConfig};
use super::paths::PathResolver;
use super::poller::{PartialsPoller, PollingState};
use super::store::{VirtualStore, change_token, has_extension};
use crate::cache::{
    CacheConfig, CacheStore, ChangeToken, Dependency, EntryOptions, KeySpace, mutex_lock, rw_read,
    rw_write,
};
use crate::domain::group::GroupKey;
use crate::domain::template::TemplateError;

const SOURCE: &str = "application::group_config";

pub(crate) const METRIC_VIEW_COMPILE: &str = "vellum_view_compile_total";
pub(crate) const METRIC_CONFIG_BUILD_MS: &str = "vellum_group_config_build_ms";

/// Partial files in `folders`, in folder order, filtered by `extension`.
pub(crate) fn scan_partials(
    store: &dyn VirtualStore,
    folders: &[String],
    extension: &str,
) -> Vec<String> {
    folders
        .iter()
        .filter(|folder| store.is_directory(folder))
        .flat_map(|folder| store.list_files(folder))
        .filter(|path| has_extension(path, extension))
        .collect()
}

/// Template name for a partial file: its file stem with spaces and hyphens
/// turned into underscores.
pub(crate) fn partial_name(path: &str, extension: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = if has_extension(file, extension) {
        &file[..file.len() - extension.len()]
    } else {
        file
    };
    stem.replace([' ', '-'], "_")
}

pub(crate) struct GroupConfigCache {
    cache: Arc<CacheStore<CacheEntry>>,
    store: Arc<dyn VirtualStore>,
    site: RwLock<Box<dyn TemplateEngine>>,
    paths: PathResolver,
    keys: KeySpace,
    extension: String,
    poller: Arc<PartialsPoller>,
    build_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GroupConfigCache {
    pub(crate) fn new(
        cache: Arc<CacheStore<CacheEntry>>,
        store: Arc<dyn VirtualStore>,
        site: Box<dyn TemplateEngine>,
        paths: PathResolver,
        keys: KeySpace,
        extension: String,
        timings: &CacheConfig,
    ) -> Self {
        let poller = PartialsPoller::new(
            Arc::clone(&store),
            extension.clone(),
            timings.poll_interval(),
        );
        Self {
            cache,
            store,
            site: RwLock::new(site),
            paths,
            keys,
            extension,
            poller,
            build_locks: DashMap::new(),
        }
    }

    /// The group's engine, building it on a cold cache.
    pub(crate) fn get(&self, group: &GroupKey) -> Arc<GroupConfig> {
        let key = self.keys.config(group);
        if let Some(CacheEntry::Config(config)) = self.cache.get(&key) {
            return config;
        }

        let lock = Arc::clone(self.build_locks.entry(key.clone()).or_default().value());
        let _guard = mutex_lock(&lock, SOURCE, "get");
        if let Some(CacheEntry::Config(config)) = self.cache.get(&key) {
            return config;
        }
        let config = self.build(group, &key);
        // Waiters still holding this lock re-check the cache once they get it.
        self.build_locks
            .remove_if(&key, |_, held| Arc::ptr_eq(held, &lock));
        config
    }

    /// Key of the root entry, created if absent.
    pub(crate) fn ensure_global(&self) -> String {
        let global = self.keys.global();
        if self
            .cache
            .insert_if_absent(global.clone(), CacheEntry::Global, EntryOptions::new())
        {
            trace!(target: "vellum::cache", key = %global, "Created global entry");
        }
        global
    }

    /// Drop every entry under this engine's key space.
    pub(crate) fn clear_all(&self) {
        let global = self.keys.global();
        self.cache.remove(&global);
        self.cache
            .insert(global, CacheEntry::Global, EntryOptions::new());
    }

    /// Register a site-wide template; it shadows group partials of the same
    /// name. Cached configs are dropped so every group picks it up.
    pub(crate) fn register_site_template(
        &self,
        name: &str,
        source: &str,
    ) -> Result<(), TemplateError> {
        rw_write(&self.site, SOURCE, "register_site_template").register_partial(name, source)?;
        self.clear_all();
        Ok(())
    }

    fn build(&self, group: &GroupKey, key: &str) -> Arc<GroupConfig> {
        let started = Instant::now();
        let global = self.ensure_global();
        let mut engine = rw_read(&self.site, SOURCE, "build").fork();
        let folders = self.paths.partial_folders(group);

        let mut partials = Vec::new();
        let mut ignored = Vec::new();
        let mut attempted = Vec::new();
        let mut tokens: Vec<ChangeToken> = Vec::new();

        // Folder tokens come before the listing so files added while scanning
        // still invalidate this build.
        for folder in &folders {
            tokens.extend(change_token(self.store.as_ref(), folder));
        }

        for path in scan_partials(self.store.as_ref(), &folders, &self.extension) {
            let name = partial_name(&path, &self.extension);
            if engine.has_template(&name) {
                debug!(
                    target: "vellum::compile",
                    group = %group,
                    partial = %name,
                    path = %path,
                    "Partial shadowed by a registered template"
                );
                ignored.push(path);
                continue;
            }

            tokens.extend(change_token(self.store.as_ref(), &path));
            let registered = self
                .store
                .read_content(&path)
                .map_err(|err| TemplateError::compile(&path, err.to_string()))
                .and_then(|source| engine.register_partial(&name, &source));
            match registered {
                Ok(()) => {
                    counter!(METRIC_VIEW_COMPILE, "kind" => "partial", "outcome" => "ok")
                        .increment(1);
                    trace!(target: "vellum::compile", partial = %name, path = %path, "Registered partial");
                    partials.push(name);
                }
                Err(err) => {
                    counter!(METRIC_VIEW_COMPILE, "kind" => "partial", "outcome" => "error")
                        .increment(1);
                    warn!(
                        target: "vellum::compile",
                        group = %group,
                        path = %path,
                        error = %err,
                        "Failed to compile partial, skipping it"
                    );
                }
            }
            attempted.push(path);
        }

        let polling = tokens.is_empty();
        let config = Arc::new(GroupConfig::new(engine, partials, ignored.clone()));
        let options = EntryOptions::new()
            .depends_on_key(global)
            .depends_on_all(tokens.into_iter().map(Dependency::from));
        let stored = self
            .cache
            .insert(key, CacheEntry::Config(Arc::clone(&config)), options);

        if polling && stored {
            let fingerprints: BTreeMap<String, String> = attempted
                .into_iter()
                .filter_map(|path| {
                    let fingerprint = self.store.fingerprint(&path).ok()?;
                    Some((path, fingerprint))
                })
                .collect();
            let state = PollingState::new(folders, fingerprints, ignored, key);
            self.poller.arm(&self.cache, state);
        }

        let elapsed = started.elapsed();
        histogram!(METRIC_CONFIG_BUILD_MS).record(elapsed.as_secs_f64() * 1000.0);
        debug!(
            target: "vellum::cache",
            group = %group,
            partials = config.partials().len(),
            ignored = config.ignored().len(),
            polling,
            stored,
            elapsed_ms = elapsed.as_millis() as u64,
            "Built group config"
        );
        config
    }
}
