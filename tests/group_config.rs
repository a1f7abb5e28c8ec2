mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::sleep;
use std::time::Duration;

use serde_json::json;
use vellum::application::{TemplateEngine, ViewEngine, ViewOptions};
use vellum::cache::spawn_sweeper;
use vellum::domain::template::{RenderFn, TemplateError};
use vellum::infra::jinja::JinjaEngine;
use vellum::infra::store::MemoryStore;

use support::{
    RacingStore, Trigger, admin_home, engine, fast_timings, home, racing_engine, render,
};

/// Site engine that counts how many group forks were taken from it.
struct CountingEngine {
    inner: JinjaEngine,
    forks: Arc<AtomicUsize>,
}

impl TemplateEngine for CountingEngine {
    fn fork(&self) -> Box<dyn TemplateEngine> {
        self.forks.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which a second builder could slip in.
        sleep(Duration::from_millis(20));
        self.inner.fork()
    }

    fn has_template(&self, name: &str) -> bool {
        self.inner.has_template(name)
    }

    fn register_partial(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        self.inner.register_partial(name, source)
    }

    fn compile(&self, path: &str, source: &str) -> Result<RenderFn, TemplateError> {
        self.inner.compile(path, source)
    }
}

#[test]
fn partials_are_available_to_views() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/footer.hbs", "(c) {{ year }}");
    store.write("~/Views/Home/Index.hbs", "page {% include 'footer' %}");
    let engine = engine(&store);

    assert_eq!(
        render(&engine, &home(), "Index", json!({"year": 2024})),
        "page (c) 2024"
    );
    assert_eq!(engine.get_config(&home()).partials(), ["footer"]);
}

#[test]
fn area_partials_stay_inside_their_area() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Areas/Admin/Views/_Partials/badge.hbs", "admin");
    store.write(
        "~/Views/Home/Index.hbs",
        "[{% include 'badge' ignore missing %}]",
    );
    let engine = engine(&store);

    assert_eq!(render(&engine, &admin_home(), "Index", json!({})), "[admin]");
    assert_eq!(render(&engine, &home(), "Index", json!({})), "[]");
}

#[test]
fn partial_names_replace_spaces_and_hyphens() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/site-footer.hbs", "footer");
    store.write("~/Views/_Partials/nav bar.hbs", "nav");
    store.write("~/Views/_Partials/notes.txt", "ignored");
    store.write(
        "~/Views/Home/Index.hbs",
        "{% include 'nav_bar' %}|{% include 'site_footer' %}",
    );
    let engine = engine(&store);

    assert_eq!(render(&engine, &home(), "Index", json!({})), "nav|footer");
    let config = engine.get_config(&home());
    let mut partials = config.partials().to_vec();
    partials.sort();
    assert_eq!(partials, ["nav_bar", "site_footer"]);
}

#[test]
fn registered_templates_shadow_partials() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/footer.hbs", "group footer");
    store.write("~/Views/Home/Index.hbs", "{% include 'footer' %}");
    let engine = engine(&store);
    assert_eq!(render(&engine, &home(), "Index", json!({})), "group footer");

    engine.register_template("footer", "site footer").unwrap();

    assert_eq!(render(&engine, &home(), "Index", json!({})), "site footer");
    let config = engine.get_config(&home());
    assert!(config.partials().is_empty());
    assert_eq!(config.ignored(), ["~/Views/_Partials/footer.hbs"]);
}

#[test]
fn controller_partials_shadow_shared_partials() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/Home/_Partials/footer.hbs", "home footer");
    store.write("~/Views/_Partials/footer.hbs", "site footer");
    store.write("~/Views/Home/Index.hbs", "{% include 'footer' %}");
    store.write("~/Views/Blog/Index.hbs", "{% include 'footer' %}");
    let engine = engine(&store);
    let blog = vellum::domain::group::GroupKey::controller_only("Blog").unwrap();

    assert_eq!(render(&engine, &home(), "Index", json!({})), "home footer");
    assert_eq!(render(&engine, &blog, "Index", json!({})), "site footer");
    assert_eq!(
        engine.get_config(&home()).ignored(),
        ["~/Views/_Partials/footer.hbs"]
    );
}

#[test]
fn broken_partials_are_skipped() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/broken.hbs", "{% if %}");
    store.write("~/Views/_Partials/good.hbs", "good");
    let engine = engine(&store);

    let config = engine.get_config(&home());
    assert_eq!(config.partials(), ["good"]);
    assert!(config.ignored().is_empty());
}

#[test]
fn configs_are_reused_until_invalidated() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/footer.hbs", "v1");
    let engine = engine(&store);

    let first = engine.get_config(&home());
    assert!(Arc::ptr_eq(&first, &engine.get_config(&home())));

    store.write("~/Views/_Partials/footer.hbs", "v2");
    let second = engine.get_config(&home());
    assert!(!Arc::ptr_eq(&first, &second));

    store.write("~/Views/_Partials/header.hbs", "new");
    let third = engine.get_config(&home());
    assert!(!Arc::ptr_eq(&second, &third));
    assert_eq!(third.partials().len(), 2);
}

#[test]
fn partial_change_reaches_cached_views_through_notifications() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/footer.hbs", "v1");
    store.write("~/Views/Home/Index.hbs", "{% include 'footer' %}");
    let engine = engine(&store);
    assert_eq!(render(&engine, &home(), "Index", json!({})), "v1");

    store.write("~/Views/_Partials/footer.hbs", "v2");

    assert_eq!(render(&engine, &home(), "Index", json!({})), "v2");
}

#[test]
fn clear_all_rebuilds_configs() {
    let store = Arc::new(MemoryStore::with_notifications());
    let engine = engine(&store);
    let before = engine.get_config(&home());

    engine.clear_all();

    assert!(!Arc::ptr_eq(&before, &engine.get_config(&home())));
}

#[test]
fn polled_partial_change_is_detected_after_interval() {
    let store = Arc::new(MemoryStore::without_notifications());
    store.write("~/Views/_Partials/footer.hbs", "v1");
    store.write("~/Views/Home/Index.hbs", "{% include 'footer' %}");
    let engine = engine(&store);
    assert_eq!(render(&engine, &home(), "Index", json!({})), "v1");

    store.write("~/Views/_Partials/footer.hbs", "v2");
    assert_eq!(render(&engine, &home(), "Index", json!({})), "v1");

    sleep(Duration::from_millis(120));
    assert_eq!(render(&engine, &home(), "Index", json!({})), "v2");
}

#[test]
fn polling_keeps_config_while_nothing_changes() {
    let store = Arc::new(MemoryStore::without_notifications());
    store.write("~/Views/_Partials/footer.hbs", "v1");
    let engine = engine(&store);
    let first = engine.get_config(&home());

    sleep(Duration::from_millis(120));

    assert!(Arc::ptr_eq(&first, &engine.get_config(&home())));
}

#[test]
fn polling_detects_new_partial_files() {
    let store = Arc::new(MemoryStore::without_notifications());
    store.write("~/Views/_Partials/footer.hbs", "v1");
    let engine = engine(&store);
    let first = engine.get_config(&home());

    store.write("~/Views/_Partials/header.hbs", "new");
    sleep(Duration::from_millis(120));

    let second = engine.get_config(&home());
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.partials().len(), 2);
}

#[test]
fn polling_detects_removed_partial_files() {
    let store = Arc::new(MemoryStore::without_notifications());
    store.write("~/Views/_Partials/footer.hbs", "footer");
    store.write("~/Views/_Partials/header.hbs", "header");
    let engine = engine(&store);
    let first = engine.get_config(&home());

    assert!(store.remove("~/Views/_Partials/header.hbs"));
    assert!(Arc::ptr_eq(&first, &engine.get_config(&home())));

    sleep(Duration::from_millis(120));
    let second = engine.get_config(&home());
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.partials(), ["footer"]);
}

/// Site footer shadowed by the Home controller's own footer.
fn shadowed_footer_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::without_notifications());
    store.write("~/Views/Home/_Partials/footer.hbs", "home footer");
    store.write("~/Views/_Partials/footer.hbs", "site footer");
    store.write("~/Views/Home/Index.hbs", "{% include 'footer' %}");
    store
}

#[test]
fn polling_detects_removed_ignored_files() {
    let store = shadowed_footer_store();
    let engine = engine(&store);
    let first = engine.get_config(&home());
    assert_eq!(first.ignored(), ["~/Views/_Partials/footer.hbs"]);

    assert!(store.remove("~/Views/_Partials/footer.hbs"));
    assert!(Arc::ptr_eq(&first, &engine.get_config(&home())));

    sleep(Duration::from_millis(120));
    let second = engine.get_config(&home());
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.ignored().is_empty());
    assert_eq!(render(&engine, &home(), "Index", json!({})), "home footer");
}

#[test]
fn polling_detects_files_no_longer_shadowed() {
    let store = shadowed_footer_store();
    let engine = engine(&store);
    let first = engine.get_config(&home());
    assert_eq!(render(&engine, &home(), "Index", json!({})), "home footer");

    assert!(store.remove("~/Views/Home/_Partials/footer.hbs"));
    assert!(Arc::ptr_eq(&first, &engine.get_config(&home())));

    sleep(Duration::from_millis(120));
    let second = engine.get_config(&home());
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.ignored().is_empty());
    assert_eq!(second.partials(), ["footer"]);
    assert_eq!(render(&engine, &home(), "Index", json!({})), "site footer");
}

#[test]
fn partial_added_while_scanning_reaches_the_next_lookup() {
    let inner = Arc::new(MemoryStore::with_notifications());
    inner.write("~/Views/_Partials/a.hbs", "a");
    inner.write("~/Views/Home/Index.hbs", "{% include 'a' %}{% include 'b' %}");
    let (store, engine) = racing_engine(RacingStore::new(
        inner,
        Trigger::ListFiles("~/Views/_Partials/"),
        "~/Views/_Partials/b.hbs",
        "b",
    ));

    engine.get_config(&home());
    assert!(store.fired());

    let mut partials = engine.get_config(&home()).partials().to_vec();
    partials.sort();
    assert_eq!(partials, ["a", "b"]);
    assert_eq!(render(&engine, &home(), "Index", json!({})), "ab");
}

#[test]
fn concurrent_cold_lookups_build_once() {
    let store = Arc::new(MemoryStore::with_notifications());
    store.write("~/Views/_Partials/footer.hbs", "footer");
    let forks = Arc::new(AtomicUsize::new(0));
    let site = CountingEngine {
        inner: JinjaEngine::new(),
        forks: Arc::clone(&forks),
    };
    let engine = ViewEngine::new(store, site, ViewOptions::default(), fast_timings()).unwrap();
    let barrier = Barrier::new(8);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                barrier.wait();
                engine.get_config(&home())
            });
        }
    });

    assert_eq!(forks.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sweeper_evicts_changed_config_without_reads() {
    let store = Arc::new(MemoryStore::without_notifications());
    store.write("~/Views/_Partials/footer.hbs", "v1");
    let engine = engine(&store);
    engine.get_config(&home());
    let config_key = engine.keys().config(&home());
    let sweeper = spawn_sweeper(Arc::clone(engine.cache()), Duration::from_millis(10));

    store.write("~/Views/_Partials/footer.hbs", "v2");
    store.reset_io_stats();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!engine.cache().contains_key(&config_key));
    assert_eq!(store.io_stats().reads, 0);
    assert!(store.io_stats().fingerprints >= 1);
    sweeper.abort();
}
