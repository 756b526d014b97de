use http::StatusCode;
use thiserror::Error;

use nildb_db::DbError;
use nildb_nuc::NucError;

/// The closed error taxonomy every operation fails with.
///
/// Tags are stable strings clients match on; the REST boundary encodes
/// `{ "errors": [tag, detail, issues…] }` with the mapped status code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    DataValidation {
        message: String,
        issues: Vec<String>,
    },

    #[error("{0}")]
    Authentication(String),

    #[error("resource access denied")]
    ResourceAccessDenied,

    #[error("document not found")]
    DocumentNotFound,

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("invalid index options: {0}")]
    InvalidIndexOptions(String),

    #[error("{0}")]
    VariableInjection(String),

    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    pub fn data_validation_with_issues(message: impl Into<String>, issues: Vec<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
            issues,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// The stable tag clients dispatch on.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DataValidation { .. } => "DataValidationError",
            Self::Authentication(_) => "AuthenticationError",
            Self::ResourceAccessDenied => "ResourceAccessDeniedError",
            Self::DocumentNotFound => "DocumentNotFoundError",
            Self::CollectionNotFound(_) => "CollectionNotFoundError",
            Self::IndexNotFound(_) => "IndexNotFoundError",
            Self::InvalidIndexOptions(_) => "InvalidIndexOptionsError",
            Self::VariableInjection(_) => "VariableInjectionError",
            Self::Database(_) => "DatabaseError",
        }
    }

    /// The HTTP status the boundary encoder uses.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::DataValidation { .. }
            | Self::InvalidIndexOptions(_)
            | Self::VariableInjection(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::ResourceAccessDenied
            | Self::DocumentNotFound
            | Self::CollectionNotFound(_)
            | Self::IndexNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validation issues, when any; empty for other tags.
    #[must_use]
    pub fn issues(&self) -> &[String] {
        match self {
            Self::DataValidation { issues, .. } => issues,
            _ => &[],
        }
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::CollectionNotFound(name) => Self::CollectionNotFound(name),
            DbError::DocumentNotFound => Self::DocumentNotFound,
            DbError::DuplicateIndex(name) => {
                Self::InvalidIndexOptions(format!("index '{name}' already exists"))
            }
            DbError::IndexNotFound(name) => Self::IndexNotFound(name),
            DbError::InvalidIndexOptions(detail) => Self::InvalidIndexOptions(detail),
            DbError::Coercion(detail) => Self::data_validation(detail),
            DbError::Database(detail) => Self::Database(detail),
        }
    }
}

impl From<NucError> for Error {
    fn from(err: NucError) -> Self {
        Self::Authentication(err.to_string())
    }
}
