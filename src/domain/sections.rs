//! Named content blocks shared by a view and its layouts during one render.
//!
//! A view (or an inner layout) defines a block; an outer layout renders it.
//! Because the view renders first and each layout after it, definitions made
//! earlier in the chain are visible to everything rendered later.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use crate::cache::mutex_lock;

use super::error::DomainError;

const SOURCE: &str = "domain::sections";

/// How a definition combines with earlier content under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionMode {
    #[default]
    Replace,
    Append,
    Prepend,
}

impl FromStr for SectionMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            "prepend" => Ok(Self::Prepend),
            other => Err(DomainError::validation(
                "mode",
                format!("must be one of [replace, append, prepend] but was `{other}`"),
            )),
        }
    }
}

/// Per-render section store.
#[derive(Debug, Default)]
pub struct Sections {
    blocks: Mutex<HashMap<String, String>>,
}

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, name: &str, content: &str, mode: SectionMode) -> Result<(), DomainError> {
        if name.is_empty() {
            return Err(DomainError::validation("name", "section name is required"));
        }
        let mut blocks = mutex_lock(&self.blocks, SOURCE, "define");
        let slot = blocks.entry(name.to_string()).or_default();
        match mode {
            SectionMode::Replace => *slot = content.to_string(),
            SectionMode::Append => slot.push_str(content),
            SectionMode::Prepend => slot.insert_str(0, content),
        }
        Ok(())
    }

    /// Content of a section. `Ok(None)` when it is undefined and optional.
    pub fn render(&self, name: &str, required: bool) -> Result<Option<String>, DomainError> {
        if name.is_empty() {
            return Err(DomainError::validation("name", "section name is required"));
        }
        let blocks = mutex_lock(&self.blocks, SOURCE, "render");
        match blocks.get(name) {
            Some(content) => Ok(Some(content.clone())),
            None if required => Err(DomainError::validation(
                "name",
                format!("section `{name}` has not been defined but is required"),
            )),
            None => Ok(None),
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        mutex_lock(&self.blocks, SOURCE, "is_defined").contains_key(name)
    }
}
