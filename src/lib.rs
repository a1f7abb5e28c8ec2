//! Template resolution and caching.
//!
//! [`ViewEngine`](application::ViewEngine) finds a view for a group
//! (area + controller), walks its layout chain and caches every lookup in a
//! dependency-aware [`CacheStore`](cache::CacheStore). Group partials are
//! compiled once per group and invalidated by store change tokens, or by
//! polling when the store cannot push changes.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
