#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use vellum::application::{
    Resolution, ResolvedView, StoreError, ViewEngine, ViewOptions, VirtualStore,
};
use vellum::cache::{CacheConfig, ChangeToken};
use vellum::domain::context::DataContext;
use vellum::domain::group::GroupKey;
use vellum::infra::jinja::JinjaEngine;
use vellum::infra::store::MemoryStore;

/// Millisecond-scale timings so expiry paths run inside a test.
pub fn fast_timings() -> CacheConfig {
    CacheConfig {
        poll_interval_ms: 40,
        missing_retry_ms: 30,
        compile_failure_retry_ms: 30,
        ..CacheConfig::default()
    }
}

pub fn engine(store: &Arc<MemoryStore>) -> ViewEngine {
    engine_with(store, ViewOptions::default())
}

pub fn engine_with(store: &Arc<MemoryStore>, options: ViewOptions) -> ViewEngine {
    ViewEngine::new(store.clone(), JinjaEngine::new(), options, fast_timings())
        .expect("valid engine options")
}

pub fn home() -> GroupKey {
    GroupKey::controller_only("Home").expect("valid group")
}

pub fn admin_home() -> GroupKey {
    GroupKey::new("Admin", "Home").expect("valid group")
}

pub fn found(resolution: Resolution) -> ResolvedView {
    match resolution {
        Resolution::Found(view) => view,
        Resolution::NotFound { searched } => panic!("view not found, searched {searched:?}"),
    }
}

pub fn data(model: Value) -> DataContext {
    DataContext::from_serialize(&model).expect("object model")
}

/// Resolve `name` for `group` and render it against `model`.
pub fn render(engine: &ViewEngine, group: &GroupKey, name: &str, model: Value) -> String {
    let view = found(engine.resolve(group, name, None).expect("resolve"));
    view.render(&data(model)).expect("render")
}

/// Store call that lets a [`RacingStore`] slip in its write.
pub enum Trigger {
    /// After `exists` answered for this path.
    Exists(&'static str),
    /// After `list_files` answered for this directory.
    ListFiles(&'static str),
}

/// Wraps a [`MemoryStore`] and writes one file right after a chosen call has
/// returned, as if another process changed the disk in between.
pub struct RacingStore {
    inner: Arc<MemoryStore>,
    trigger: Trigger,
    path: &'static str,
    content: &'static str,
    fired: AtomicBool,
}

impl RacingStore {
    pub fn new(
        inner: Arc<MemoryStore>,
        trigger: Trigger,
        path: &'static str,
        content: &'static str,
    ) -> Self {
        Self {
            inner,
            trigger,
            path,
            content,
            fired: AtomicBool::new(false),
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn race(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.write(self.path, self.content);
        }
    }
}

impl VirtualStore for RacingStore {
    fn exists(&self, path: &str) -> bool {
        let exists = self.inner.exists(path);
        if matches!(self.trigger, Trigger::Exists(target) if target == path) {
            self.race();
        }
        exists
    }

    fn is_directory(&self, path: &str) -> bool {
        self.inner.is_directory(path)
    }

    fn list_files(&self, directory: &str) -> Vec<String> {
        let files = self.inner.list_files(directory);
        if matches!(self.trigger, Trigger::ListFiles(target) if target == directory) {
            self.race();
        }
        files
    }

    fn read_content(&self, path: &str) -> Result<String, StoreError> {
        self.inner.read_content(path)
    }

    fn fingerprint(&self, path: &str) -> Result<String, StoreError> {
        self.inner.fingerprint(path)
    }

    fn change_dependency(&self, path: &str) -> Result<Option<ChangeToken>, StoreError> {
        self.inner.change_dependency(path)
    }
}

pub fn racing_engine(store: RacingStore) -> (Arc<RacingStore>, ViewEngine) {
    let store = Arc::new(store);
    let engine = ViewEngine::new(
        store.clone(),
        JinjaEngine::new(),
        ViewOptions::default(),
        fast_timings(),
    )
    .expect("valid engine options");
    (store, engine)
}
