use thiserror::Error;

/// The error taxonomy surfaced at the crate's API boundary.
#[derive(Debug, Error)]
pub enum MinileafError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate key on index {index}: {key}")]
    DuplicateKey { index: String, key: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("document too large: {size} bytes exceeds max of {max}")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("collection '{name}' already uses id kind {existing:?}, cannot reopen as {requested:?}")]
    CollectionIdTypeMismatch { name: String, existing: crate::document::IdKind, requested: crate::document::IdKind },

    #[error("collection not found: {0}")]
    NoSuchCollection(String),

    #[error("collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("database not found")]
    DatabaseNotFound,

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("ciphertext is corrupted or has been tampered with")]
    CorruptedCiphertext,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MinileafError>;
