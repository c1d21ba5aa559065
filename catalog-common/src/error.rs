//! Common error types for the AI usage catalog

use thiserror::Error;

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the catalog services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unique-name constraint violated on create or rename
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Delete rejected because dependent rows still reference the target
    #[error("Cannot delete: {0}")]
    HasDependents(String),

    /// A referenced function/team/capability id does not exist (or the
    /// team does not belong to the entry's function)
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Reassignment target team belongs to a different function
    #[error("Target team belongs to a different function")]
    CrossFunctionReassignment,

    /// The migrate-then-delete transaction could not commit atomically
    #[error("Reassignment aborted, no entries were moved: {0}")]
    PartialMigration(String),

    /// Missing or invalid session
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Account temporarily locked after repeated login failures
    #[error("Account locked: {0}")]
    Locked(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable category for API error bodies
    pub fn category(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::DuplicateName(_) => "duplicate_name",
            Error::HasDependents(_) => "has_dependents",
            Error::InvalidReference(_) => "invalid_reference",
            Error::CrossFunctionReassignment => "cross_function_reassignment",
            Error::PartialMigration(_) => "partial_migration",
            Error::Unauthorized(_) => "unauthorized",
            Error::Locked(_) => "locked",
            Error::Internal(_) => "internal",
        }
    }
}

/// True when the underlying database error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
