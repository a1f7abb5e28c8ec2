//! Filesystem-backed template store.
//!
//! `~/` maps to the root directory. The store cannot push change
//! notifications, so the engine validates views by fingerprint and polls
//! partial folders.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::application::paths::ROOT_MARKER;
use crate::application::store::{StoreError, VirtualStore};
use crate::cache::ChangeToken;

use super::sha256_hex;

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path onto the root, refusing anything that escapes it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = path.strip_prefix(ROOT_MARKER).unwrap_or(path);
        let relative = Path::new(relative);
        if relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(StoreError::Unsupported {
                path: path.to_string(),
                reason: "path escapes the store root",
            });
        }
        Ok(self.root.join(relative))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let absolute = self.resolve(path)?;
        fs::read(absolute).map_err(|err| map_io(path, err))
    }
}

fn map_io(path: &str, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::not_found(path)
    } else {
        StoreError::io(path, err)
    }
}

impl VirtualStore for DirectoryStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|absolute| absolute.is_file())
    }

    fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|absolute| absolute.is_dir())
    }

    fn list_files(&self, directory: &str) -> Vec<String> {
        let Ok(absolute) = self.resolve(directory) else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(absolute) else {
            return Vec::new();
        };
        let prefix = if directory.ends_with('/') {
            directory.to_string()
        } else {
            format!("{directory}/")
        };
        let mut files: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(|name| format!("{prefix}{name}"))
            .collect();
        files.sort();
        files
    }

    fn read_content(&self, path: &str) -> Result<String, StoreError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|err| StoreError::io(path, err))
    }

    fn fingerprint(&self, path: &str) -> Result<String, StoreError> {
        Ok(sha256_hex(&self.read_bytes(path)?))
    }

    fn change_dependency(&self, _path: &str) -> Result<Option<ChangeToken>, StoreError> {
        Ok(None)
    }
}
