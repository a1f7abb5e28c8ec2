//! Values stored in the view cache.

use std::fmt;
use std::sync::Arc;

use super::engine::TemplateEngine;
use super::poller::PollingState;
use crate::domain::template::CompiledTemplate;

/// Everything the view engine keeps in its [`CacheStore`](crate::cache::CacheStore).
#[derive(Clone, Debug)]
pub enum CacheEntry {
    /// Root entry; every other entry hangs off it.
    Global,
    Config(Arc<GroupConfig>),
    Compiled(Arc<CompiledTemplate>),
    /// The path was looked up and does not resolve.
    Missing,
    Poll(Arc<PollingState>),
}

/// A group's engine: the site-wide engine plus the group's partials.
pub struct GroupConfig {
    engine: Box<dyn TemplateEngine>,
    partials: Vec<String>,
    ignored: Vec<String>,
}

impl GroupConfig {
    pub(crate) fn new(
        engine: Box<dyn TemplateEngine>,
        partials: Vec<String>,
        ignored: Vec<String>,
    ) -> Self {
        Self {
            engine,
            partials,
            ignored,
        }
    }

    pub fn engine(&self) -> &dyn TemplateEngine {
        self.engine.as_ref()
    }

    /// Names of the partials registered for this group.
    pub fn partials(&self) -> &[String] {
        &self.partials
    }

    /// Partial files shadowed by an already registered template.
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }
}

impl fmt::Debug for GroupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupConfig")
            .field("partials", &self.partials)
            .field("ignored", &self.ignored)
            .finish_non_exhaustive()
    }
}
