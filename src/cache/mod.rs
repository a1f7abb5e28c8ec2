//! Vellum Cache System
//!
//! A single dependency-aware store holds everything the view engine caches:
//!
//! - **global**: an empty root entry; removing it clears everything
//! - **config**: per-group partial configuration, rooted at global
//! - **paths**: compiled templates and missing markers, rooted at config
//! - **pollers**: self re-arming entries that watch partial folders when the
//!   backing store cannot push change notifications
//!
//! ## Configuration
//!
//! Timings are controlled via `vellum.toml`:
//!
//! ```toml
//! [cache]
//! poll_interval_ms = 5000
//! missing_retry_ms = 3000
//! # ... see config.rs for all options
//! ```

mod config;
mod dependency;
mod keys;
mod lock;
mod registry;
mod store;
mod sweeper;

pub use config::CacheConfig;
pub use dependency::{ChangeToken, Dependency};
pub use keys::KeySpace;
pub(crate) use lock::{mutex_lock, rw_read, rw_write};
pub use store::{
    CacheStore, EntryOptions, Expiration, ExpiryReason, UpdateAction, UpdateCallback,
};
pub(crate) use store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
pub use sweeper::spawn_sweeper;
