//! [`VirtualStore`](crate::application::store::VirtualStore) adapters.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::{IoStats, MemoryStore};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes`.
fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..])
}
