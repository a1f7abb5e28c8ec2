pub mod engine;
pub mod entry;
pub mod error;
pub mod group_config;
pub mod options;
pub mod paths;
pub mod poller;
pub mod render;
pub mod resolver;
pub mod store;

pub use engine::TemplateEngine;
pub use entry::{CacheEntry, GroupConfig};
pub use error::{AppError, ViewError};
pub use options::ViewOptions;
pub use paths::{PathResolver, PathSettings};
pub use poller::PollingState;
pub use render::{CompositionRenderer, ResolvedView};
pub use resolver::{Resolution, ViewEngine};
pub use store::{StoreError, VirtualStore};
