//! Domain layer types and invariants.

pub mod context;
pub mod error;
pub mod group;
pub mod sections;
pub mod template;
