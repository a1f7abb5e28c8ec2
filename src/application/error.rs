use thiserror::Error;

use crate::{domain::error::DomainError, domain::template::TemplateError, infra::error::InfraError};

/// Errors crossing the view engine boundary. Missing files are not errors;
/// they surface as [`Resolution::NotFound`](super::resolver::Resolution).
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("layout `{layout}` at `{path}` is already part of the layout chain")]
    RecursiveLayout { layout: String, path: String },
    #[error(transparent)]
    Render(#[from] TemplateError),
}

impl ViewError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

impl From<DomainError> for ViewError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { field, message } => Self::invalid_argument(field, message),
            DomainError::Invariant { message } => Self::invalid_argument("state", message),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("`{name}` was not found; searched: {}", searched.join(", "))]
    NotFound { name: String, searched: Vec<String> },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NotFound { .. } => 2,
            AppError::View(ViewError::InvalidArgument { .. })
            | AppError::Domain(DomainError::Validation { .. })
            | AppError::Validation(_) => 64,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::Io { .. }) => 74,
            AppError::View(_)
            | AppError::Domain(DomainError::Invariant { .. })
            | AppError::Infra(InfraError::Telemetry(_))
            | AppError::Unexpected(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validation_becomes_invalid_argument() {
        let error = ViewError::from(DomainError::validation("controller", "must not be empty"));
        assert!(matches!(
            error,
            ViewError::InvalidArgument { name: "controller", .. }
        ));
    }

    #[test]
    fn exit_codes_distinguish_not_found() {
        let missing = AppError::NotFound {
            name: "Index".to_string(),
            searched: vec!["~/Views/Home/Index.hbs".to_string()],
        };
        assert_eq!(missing.exit_code(), 2);
        assert_eq!(
            missing.to_string(),
            "`Index` was not found; searched: ~/Views/Home/Index.hbs"
        );
        assert_eq!(AppError::validation("bad").exit_code(), 64);
    }
}
