//! Key-value store interface and implementations.
//!
//! Provides a trait-based KV store with an in-memory implementation for
//! testing and a redb-based implementation for persistence. The ledger's
//! uniqueness invariants (one template per identity, one attendance entry
//! per identity and day) rely on [`KVStore::put_if_absent`] being atomic:
//! two writers racing on the same key must see exactly one success.

pub mod memory;
pub mod redb;

use std::fmt;
use thiserror::Error;

/// Errors that can occur in KV store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: not found")]
    NotFound,

    #[error("kv: storage error: {0}")]
    Storage(String),
}

/// Result type for KV operations.
pub type KVResult<T> = Result<T, KVError>;

/// Key-value store trait.
///
/// Implementations must be safe for concurrent use and must bound their
/// own operations in time: a hung or unreachable backend is reported as
/// [`KVError::Storage`], never by blocking the caller indefinitely.
pub trait KVStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Set a key-value pair, overwriting any existing value.
    fn set(&self, key: &str, value: &[u8]) -> KVResult<()>;

    /// Insert a key-value pair only if the key is absent.
    ///
    /// Returns `true` if the value was inserted, `false` if the key was
    /// already present (in which case the stored value is untouched).
    /// This check-and-insert is atomic with respect to concurrent calls.
    fn put_if_absent(&self, key: &str, value: &[u8]) -> KVResult<bool>;

    /// Delete a key.
    fn delete(&self, key: &str) -> KVResult<()>;

    /// Scan for entries with a given key prefix, ordered by key.
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;
}

impl fmt::Debug for dyn KVStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KVStore {{ ... }}")
    }
}

// Re-export the implementations
pub use memory::MemoryStore;
pub use redb::RedbStore;
