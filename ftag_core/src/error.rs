//! Error types for ftag_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ftag_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during tagging operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Metadata file is corrupt or incomplete.
    #[error("Invalid metadata at {path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    /// Category, tag or query name is not an identifier.
    #[error("{kind} name \"{name}\" is not allowed")]
    InvalidName { kind: &'static str, name: String },

    /// Name is reserved by the projection layout.
    #[error("Name \"{name}\" is reserved")]
    ReservedName { name: String },

    /// Category already exists.
    #[error("Category \"{name}\" already exists")]
    DuplicateCategory { name: String },

    /// Tag value already exists in its category.
    #[error("Tag \"{value}\" already exists in category \"{category}\"")]
    DuplicateTag { category: String, value: String },

    /// Query already exists.
    #[error("Query \"{name}\" already exists")]
    DuplicateQuery { name: String },

    /// Category is not declared in the database.
    #[error(
        "Unknown category \"{name}\". This is a developer error. It should never happen and it's likely a bug in ftag."
    )]
    UnknownCategory { name: String },

    /// Tag value is not declared in its category.
    #[error("Unknown tag \"{value}\" in category \"{category}\"")]
    UnknownTag { category: String, value: String },

    /// Query is not declared in the database.
    #[error("Unknown query \"{name}\"")]
    UnknownQuery { name: String },

    /// File cannot be read for fingerprinting.
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Symlink target is not absolute.
    #[error("Path is not absolute: {path}")]
    RelativePath { path: PathBuf },

    /// Filter pattern is not a valid regex.
    #[error("Invalid filter \"{pattern}\": {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// Engine configuration file is malformed.
    #[error("Invalid config at {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// A database already exists where one was about to be created.
    #[error("Database already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    /// Metadata could not be encoded.
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create a Validation error.
    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidName error.
    pub fn invalid_name(kind: &'static str, name: impl Into<String>) -> Self {
        Error::InvalidName {
            kind,
            name: name.into(),
        }
    }

    /// Create a ReservedName error.
    pub fn reserved_name(name: impl Into<String>) -> Self {
        Error::ReservedName { name: name.into() }
    }

    /// Create a DuplicateCategory error.
    pub fn duplicate_category(name: impl Into<String>) -> Self {
        Error::DuplicateCategory { name: name.into() }
    }

    /// Create a DuplicateTag error.
    pub fn duplicate_tag(category: impl Into<String>, value: impl Into<String>) -> Self {
        Error::DuplicateTag {
            category: category.into(),
            value: value.into(),
        }
    }

    /// Create a DuplicateQuery error.
    pub fn duplicate_query(name: impl Into<String>) -> Self {
        Error::DuplicateQuery { name: name.into() }
    }

    /// Create an UnknownCategory error.
    pub fn unknown_category(name: impl Into<String>) -> Self {
        Error::UnknownCategory { name: name.into() }
    }

    /// Create an UnknownTag error.
    pub fn unknown_tag(category: impl Into<String>, value: impl Into<String>) -> Self {
        Error::UnknownTag {
            category: category.into(),
            value: value.into(),
        }
    }

    /// Create an UnknownQuery error.
    pub fn unknown_query(name: impl Into<String>) -> Self {
        Error::UnknownQuery { name: name.into() }
    }

    /// Create a FileNotFound error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Error::FileNotFound { path: path.into() }
    }

    /// Create a RelativePath error.
    pub fn relative_path(path: impl Into<PathBuf>) -> Self {
        Error::RelativePath { path: path.into() }
    }

    /// Create an InvalidFilter error.
    pub fn invalid_filter(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidFilter {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an AlreadyInitialized error.
    pub fn already_initialized(path: impl Into<PathBuf>) -> Self {
        Error::AlreadyInitialized { path: path.into() }
    }

    /// Create a Serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Error::Serialization {
            reason: reason.into(),
        }
    }

    /// True for the "already exists" family of errors.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Error::DuplicateCategory { .. } | Error::DuplicateTag { .. } | Error::DuplicateQuery { .. }
        )
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
