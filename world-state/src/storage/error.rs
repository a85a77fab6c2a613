/// Errors returned by any [super::Storage] implementation.
///
/// Categories:
/// - Backend errors (DB/I/O, poisoned locks)
/// - Decode/length mismatches with expected/actual parameters
/// - Records that are missing or inconsistent with each other
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend I/O or database error (e.g., RocksDB).
    #[error("backend error: {0}")]
    Backend(#[from] Box<dyn core::error::Error + Send + Sync + 'static>),
    /// Key bytes had the wrong length.
    #[error("invalid key length: expected {expected} bytes, found {found}")]
    BadKeyLen { expected: usize, found: usize },
    /// Value bytes had the wrong length (e.g., a reference count).
    #[error("invalid value length for {what}: expected {expected} bytes, found {found}")]
    BadValueLen {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A record other records depend on is missing or malformed.
    #[error("storage is corrupted: {0}")]
    Corrupted(String),
    /// Higher-level type (e.g., `Word`) failed to decode from bytes.
    #[error("failed to decode value bytes")]
    Value(#[from] winter_utils::DeserializationError),
}
