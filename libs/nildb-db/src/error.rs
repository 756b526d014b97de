use thiserror::Error;

/// Failures surfaced by the persistence gateway.
///
/// The closed set mirrors the store's observable failure modes; everything
/// the gateway cannot classify lands in [`DbError::Database`].
#[derive(Debug, Error)]
pub enum DbError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("document not found")]
    DocumentNotFound,

    #[error("index already exists: {0}")]
    DuplicateIndex(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("invalid index options: {0}")]
    InvalidIndexOptions(String),

    #[error("coercion failed: {0}")]
    Coercion(String),

    #[error("database error: {0}")]
    Database(String),
}

// Server error codes the gateway distinguishes.
const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;
const CANNOT_CREATE_INDEX: i32 = 67;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const INVALID_INDEX_SPEC_OPTION: i32 = 197;

fn server_error_code(err: &mongodb::error::Error) -> Option<i32> {
    use mongodb::error::ErrorKind;

    match &*err.kind {
        ErrorKind::Command(command_error) => Some(command_error.code),
        ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write_error)) => {
            Some(write_error.code)
        }
        _ => None,
    }
}

impl DbError {
    /// Classify a driver error for a given logical target.
    #[must_use]
    pub fn from_driver(err: &mongodb::error::Error, target: &str) -> Self {
        match server_error_code(err) {
            Some(NAMESPACE_NOT_FOUND) => Self::CollectionNotFound(target.into()),
            Some(INDEX_NOT_FOUND) => Self::IndexNotFound(target.into()),
            Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT) => {
                Self::DuplicateIndex(target.into())
            }
            Some(CANNOT_CREATE_INDEX | INVALID_INDEX_SPEC_OPTION) => {
                Self::InvalidIndexOptions(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}
