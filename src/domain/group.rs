//! Routing group that scopes partials and cache entries.

use std::fmt;

use super::error::DomainError;

/// Isolation boundary for per-group configuration: an optional area plus a
/// controller. Equal keys share one cached partial configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    area: String,
    controller: String,
}

impl GroupKey {
    /// Build a key. An empty area means "no area".
    pub fn new(area: impl Into<String>, controller: impl Into<String>) -> Result<Self, DomainError> {
        let area = area.into().trim().to_string();
        let controller = controller.into().trim().to_string();

        if controller.is_empty() {
            return Err(DomainError::validation(
                "controller",
                "controller name must not be empty",
            ));
        }
        validate_segment("controller", &controller)?;
        validate_segment("area", &area)?;

        Ok(Self { area, controller })
    }

    /// Key without an area.
    pub fn controller_only(controller: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(String::new(), controller)
    }

    pub fn area(&self) -> Option<&str> {
        (!self.area.is_empty()).then_some(self.area.as_str())
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.area, self.controller)
    }
}

fn validate_segment(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.contains([':', '/', '\\']) {
        return Err(DomainError::validation(
            field,
            format!("`{value}` must not contain ':', '/' or '\\'"),
        ));
    }
    Ok(())
}
