//! Virtual file store abstraction.
//!
//! Paths are virtual: `~/` rooted, `/` separated, directories end with `/`.

use thiserror::Error;
use tracing::debug;

use crate::cache::ChangeToken;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{path}` does not exist")]
    NotFound { path: String },
    #[error("`{path}` could not be read: {message}")]
    Io { path: String, message: String },
    #[error("`{path}` is not supported by this store: {reason}")]
    Unsupported { path: String, reason: &'static str },
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Read access to template sources.
pub trait VirtualStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn is_directory(&self, path: &str) -> bool;

    /// Virtual paths of the files directly inside `directory`, in a stable order.
    fn list_files(&self, directory: &str) -> Vec<String>;

    fn read_content(&self, path: &str) -> Result<String, StoreError>;

    /// Content fingerprint used when no change token is available.
    fn fingerprint(&self, path: &str) -> Result<String, StoreError>;

    /// A token that fires when `path` (or anything inside it, for a directory)
    /// changes. `Ok(None)` means the store cannot push changes.
    fn change_dependency(&self, path: &str) -> Result<Option<ChangeToken>, StoreError>;
}

/// Change token for `path`, treating store failures as "no push support".
pub(crate) fn change_token(store: &dyn VirtualStore, path: &str) -> Option<ChangeToken> {
    match store.change_dependency(path) {
        Ok(token) => token,
        Err(err) => {
            debug!(
                target: "vellum::cache",
                path,
                error = %err,
                "No change dependency available"
            );
            None
        }
    }
}

/// Case-insensitive suffix test on file extensions.
pub(crate) fn has_extension(path: &str, extension: &str) -> bool {
    path.len() >= extension.len()
        && path.is_char_boundary(path.len() - extension.len())
        && path[path.len() - extension.len()..].eq_ignore_ascii_case(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_extension("~/Views/Home/Index.hbs", ".hbs"));
        assert!(has_extension("~/Views/Home/Index.HBS", ".hbs"));
        assert!(!has_extension("~/Views/Home/Index.html", ".hbs"));
        assert!(!has_extension("hb", ".hbs"));
    }
}
