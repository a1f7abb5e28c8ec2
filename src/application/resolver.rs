//! View resolution.
//!
//! Turns a group and a view name into a compiled view plus its layout chain.
//! Every path tried is cached per group: compiled templates, or a missing
//! marker so repeated misses cost no I/O. Entries depend on the group config,
//! which depends on the global root, so [`ViewEngine::clear_all`] reaches all
//! of them.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, trace, warn};

use super::engine::TemplateEngine;
use super::entry::{CacheEntry, GroupConfig};
use super::error::ViewError;
use super::group_config::{GroupConfigCache, METRIC_VIEW_COMPILE};
use super::options::ViewOptions;
use super::paths::{PathResolver, ROOT_MARKER};
use super::render::ResolvedView;
use super::store::{VirtualStore, change_token, has_extension};
use crate::cache::{CacheConfig, CacheStore, ChangeToken, EntryOptions, Expiration, KeySpace};
use crate::domain::group::GroupKey;
use crate::domain::template::{CompiledTemplate, LayoutDeclaration, TemplateError};

/// Outcome of a lookup. Missing files are not errors.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(ResolvedView),
    /// Every path that was tried, in order.
    NotFound { searched: Vec<String> },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn found(self) -> Option<ResolvedView> {
        match self {
            Resolution::Found(view) => Some(view),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn searched(&self) -> &[String] {
        match self {
            Resolution::Found(_) => &[],
            Resolution::NotFound { searched } => searched,
        }
    }
}

/// Template resolution and caching over a [`VirtualStore`].
pub struct ViewEngine {
    cache: Arc<CacheStore<CacheEntry>>,
    store: Arc<dyn VirtualStore>,
    configs: GroupConfigCache,
    paths: PathResolver,
    keys: KeySpace,
    options: ViewOptions,
    timings: CacheConfig,
}

impl ViewEngine {
    /// Engine with a private cache.
    pub fn new(
        store: Arc<dyn VirtualStore>,
        site: impl TemplateEngine + 'static,
        options: ViewOptions,
        timings: CacheConfig,
    ) -> Result<Self, ViewError> {
        Self::with_cache(
            Arc::new(CacheStore::new()),
            store,
            Box::new(site),
            options,
            timings,
        )
    }

    /// Engine sharing `cache` with other engines; key prefixes keep them apart.
    pub fn with_cache(
        cache: Arc<CacheStore<CacheEntry>>,
        store: Arc<dyn VirtualStore>,
        site: Box<dyn TemplateEngine>,
        options: ViewOptions,
        timings: CacheConfig,
    ) -> Result<Self, ViewError> {
        if options.extension.len() < 2 || !options.extension.starts_with('.') {
            return Err(ViewError::invalid_argument(
                "extension",
                format!("`{}` must be a dot followed by a name", options.extension),
            ));
        }
        let keys = match options.key_prefix.as_deref() {
            Some("") => {
                return Err(ViewError::invalid_argument(
                    "key_prefix",
                    "must not be empty",
                ));
            }
            Some(prefix) => KeySpace::new(prefix),
            None => KeySpace::random(),
        };
        let paths = PathResolver::new(options.paths.clone());
        let configs = GroupConfigCache::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            site,
            paths.clone(),
            keys.clone(),
            options.extension.clone(),
            &timings,
        );
        configs.ensure_global();
        Ok(Self {
            cache,
            store,
            configs,
            paths,
            keys,
            options,
            timings,
        })
    }

    pub fn cache(&self) -> &Arc<CacheStore<CacheEntry>> {
        &self.cache
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Resolve a view and its layout chain.
    ///
    /// The chain starts at `explicit_layout` when given, otherwise at the
    /// view's own declaration, and follows each layout's declaration.
    pub fn resolve(
        &self,
        group: &GroupKey,
        name: &str,
        explicit_layout: Option<&str>,
    ) -> Result<Resolution, ViewError> {
        require_name("name", name)?;
        trace!(target: "vellum::api", group = %group, name, ?explicit_layout, "resolve");

        let config = self.configs.get(group);
        let mut searched = Vec::new();
        let view_folders = self.paths.view_folders(group);
        let Some(view) = self.find(group, &config, name, &view_folders, &mut searched) else {
            return Ok(self.not_found(group, name, searched));
        };

        let layout_folders = self.paths.layout_folders(group);
        let mut layouts: Vec<Arc<CompiledTemplate>> = Vec::new();
        let mut next = explicit_layout
            .filter(|layout| !layout.is_empty())
            .or(view.layout())
            .map(str::to_string);
        while let Some(layout_name) = next {
            let Some(layout) =
                self.find(group, &config, &layout_name, &layout_folders, &mut searched)
            else {
                return Ok(self.not_found(group, name, searched));
            };
            if layouts.iter().any(|seen| seen.path() == layout.path()) {
                warn!(
                    target: "vellum::api",
                    group = %group,
                    layout = %layout_name,
                    path = %layout.path(),
                    "Recursive layout chain"
                );
                return Err(ViewError::RecursiveLayout {
                    layout: layout_name,
                    path: layout.path().to_string(),
                });
            }
            next = layout.layout().map(str::to_string);
            layouts.push(layout);
        }

        trace!(
            target: "vellum::api",
            group = %group,
            view = %view.path(),
            layouts = layouts.len(),
            "resolved"
        );
        Ok(Resolution::Found(ResolvedView::new(view, layouts)))
    }

    /// Resolve a view without layouts.
    pub fn resolve_partial(&self, group: &GroupKey, name: &str) -> Result<Resolution, ViewError> {
        require_name("name", name)?;
        trace!(target: "vellum::api", group = %group, name, "resolve_partial");

        let config = self.configs.get(group);
        let mut searched = Vec::new();
        let folders = self.paths.view_folders(group);
        Ok(
            match self.find(group, &config, name, &folders, &mut searched) {
                Some(view) => Resolution::Found(ResolvedView::new(view, Vec::new())),
                None => self.not_found(group, name, searched),
            },
        )
    }

    /// Resolve one concrete path for `group`.
    pub fn resolve_path(
        &self,
        group: &GroupKey,
        path: &str,
    ) -> Result<Option<Arc<CompiledTemplate>>, ViewError> {
        require_name("path", path)?;
        let config = self.configs.get(group);
        Ok(self.lookup(group, &config, path))
    }

    /// The group's engine with its partials registered.
    pub fn get_config(&self, group: &GroupKey) -> Arc<GroupConfig> {
        self.configs.get(group)
    }

    /// Register a site-wide template, shadowing group partials of that name.
    /// Every cached entry of this engine is dropped.
    pub fn register_template(&self, name: &str, source: &str) -> Result<(), ViewError> {
        require_name("name", name)?;
        self.configs.register_site_template(name, source)?;
        Ok(())
    }

    /// Drop every cached entry of this engine.
    pub fn clear_all(&self) {
        trace!(target: "vellum::api", prefix = %self.keys.prefix(), "clear_all");
        self.configs.clear_all();
    }

    /// Search `folders` for `name`, recording every path tried.
    fn find(
        &self,
        group: &GroupKey,
        config: &GroupConfig,
        name: &str,
        folders: &[String],
        searched: &mut Vec<String>,
    ) -> Option<Arc<CompiledTemplate>> {
        let extension = &self.options.extension;
        if name.starts_with(ROOT_MARKER) {
            if !has_extension(name, extension) {
                debug!(
                    target: "vellum::api",
                    name,
                    extension = %extension,
                    "Absolute name without the template extension"
                );
                return None;
            }
            searched.push(name.to_string());
            return self.lookup(group, config, name);
        }

        let file = format!("{name}{extension}");
        folders.iter().find_map(|folder| {
            let path = format!("{folder}{file}");
            searched.push(path.clone());
            self.lookup(group, config, &path)
        })
    }

    /// Cache-first lookup of a single path.
    fn lookup(
        &self,
        group: &GroupKey,
        config: &GroupConfig,
        path: &str,
    ) -> Option<Arc<CompiledTemplate>> {
        let key = self.keys.path(group, path);
        match self.cache.get(&key) {
            Some(CacheEntry::Compiled(template)) => match template.fingerprint() {
                None => return Some(template),
                Some(expected) => match self.store.fingerprint(path) {
                    Ok(current) if current == expected => return Some(template),
                    _ => {
                        debug!(target: "vellum::cache", path, "Fingerprint changed, recompiling");
                        self.cache.remove(&key);
                    }
                },
            },
            Some(CacheEntry::Missing) => return None,
            _ => {}
        }

        // Taken before the store is observed so a file appearing meanwhile
        // fires the token instead of hiding behind the missing marker.
        let token = change_token(self.store.as_ref(), path);
        if !self.store.exists(path) {
            self.remember_missing(group, path, &key, token);
            return None;
        }
        self.compile(group, config, path, &key, token)
    }

    fn remember_missing(
        &self,
        group: &GroupKey,
        path: &str,
        key: &str,
        token: Option<ChangeToken>,
    ) {
        let options = EntryOptions::new().depends_on_key(self.keys.config(group));
        let options = match token {
            Some(token) => options
                .depends_on(token)
                .expires(Expiration::Sliding(self.timings.missing_sliding())),
            None => options.expires(Expiration::after(self.timings.missing_retry())),
        };
        self.cache.insert(key, CacheEntry::Missing, options);
        trace!(target: "vellum::cache", path, "Cached missing marker");
    }

    fn compile(
        &self,
        group: &GroupKey,
        config: &GroupConfig,
        path: &str,
        key: &str,
        token: Option<ChangeToken>,
    ) -> Option<Arc<CompiledTemplate>> {
        let compiled = self
            .store
            .read_content(path)
            .map_err(|err| TemplateError::compile(path, err.to_string()))
            .and_then(|source| {
                let render = config.engine().compile(path, &source)?;
                Ok((render, layout_of(path, &source)))
            });

        let (render, layout) = match compiled {
            Ok(parts) => parts,
            Err(err) => {
                counter!(METRIC_VIEW_COMPILE, "kind" => "view", "outcome" => "error").increment(1);
                warn!(
                    target: "vellum::compile",
                    group = %group,
                    path,
                    error = %err,
                    "Failed to compile view, treating it as missing"
                );
                self.cache.insert(
                    key,
                    CacheEntry::Missing,
                    EntryOptions::new()
                        .expires(Expiration::after(self.timings.compile_failure_retry())),
                );
                return None;
            }
        };
        counter!(METRIC_VIEW_COMPILE, "kind" => "view", "outcome" => "ok").increment(1);

        let fingerprint = match token {
            Some(_) => None,
            None => match self.store.fingerprint(path) {
                Ok(fingerprint) => Some(fingerprint),
                Err(err) => {
                    debug!(
                        target: "vellum::cache",
                        path,
                        error = %err,
                        "No fingerprint available, view will not be cached"
                    );
                    return Some(Arc::new(CompiledTemplate::new(path, render, None, layout)));
                }
            },
        };
        let template = Arc::new(CompiledTemplate::new(path, render, fingerprint, layout));

        if let Some(sliding) = self.options.views_sliding {
            let options = EntryOptions::new().depends_on_key(self.keys.config(group));
            let options = match token {
                Some(token) => options
                    .depends_on(token)
                    .expires(Expiration::Sliding(sliding)),
                None => options.expires(Expiration::after(self.timings.view_recheck())),
            };
            self.cache
                .insert(key, CacheEntry::Compiled(Arc::clone(&template)), options);
        }
        Some(template)
    }

    fn not_found(&self, group: &GroupKey, name: &str, searched: Vec<String>) -> Resolution {
        debug!(
            target: "vellum::api",
            group = %group,
            name,
            searched = searched.len(),
            "View not found"
        );
        Resolution::NotFound { searched }
    }
}

fn require_name(field: &'static str, value: &str) -> Result<(), ViewError> {
    if value.trim().is_empty() {
        return Err(ViewError::invalid_argument(field, "must not be empty"));
    }
    Ok(())
}

fn layout_of(path: &str, source: &str) -> Option<String> {
    match LayoutDeclaration::scan(source) {
        LayoutDeclaration::Absent => None,
        LayoutDeclaration::Named(layout) => {
            debug!(target: "vellum::compile", path, layout = %layout, "Template declares a layout");
            Some(layout)
        }
        LayoutDeclaration::Malformed(raw) => {
            warn!(
                target: "vellum::compile",
                path,
                declaration = %raw,
                "Ignoring malformed layout declaration"
            );
            None
        }
    }
}
