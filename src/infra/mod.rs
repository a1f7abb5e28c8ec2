//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod jinja;
pub mod store;
pub mod telemetry;
