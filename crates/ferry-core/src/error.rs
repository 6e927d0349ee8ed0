//! Error types shared by every Ferry crate.

use thiserror::Error;

/// Result type alias using Ferry's error type.
pub type Result<T> = std::result::Result<T, FerryError>;

/// Coarse classification used for exit codes and event reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration or usage error. Never retried.
    Validation,
    /// Origin or destination I/O and protocol failures.
    Repository,
    /// Recoverable outcome: nothing to migrate.
    NoOp,
    /// Local environment (filesystem, missing binaries).
    Environment,
}

#[derive(Error, Debug)]
pub enum FerryError {
    /// Bad configuration or invalid usage
    #[error("{0}")]
    Validation(String),

    /// A transformation cannot produce its inverse
    #[error("Non-reversible transformation: {0}")]
    NonReversible(String),

    /// A transformation found nothing to do
    #[error("{0}")]
    VoidOperation(String),

    /// A reference could not be resolved to a revision
    #[error("Cannot resolve revision: {0}")]
    CannotResolveRevision(String),

    /// Repository access or protocol failure
    #[error("Repository error: {0}")]
    Repo(String),

    /// The user refused a confirmation prompt
    #[error("{0}")]
    ChangeRejected(String),

    /// The unit produces no destination delta
    #[error("{0}")]
    EmptyChange(String),

    /// The same origin revision was already written in this session
    #[error("{0}")]
    RedundantChange(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FerryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        FerryError::Validation(msg.into())
    }

    pub fn repo(msg: impl Into<String>) -> Self {
        FerryError::Repo(msg.into())
    }

    pub fn empty_change(msg: impl Into<String>) -> Self {
        FerryError::EmptyChange(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FerryError::Validation(_)
            | FerryError::NonReversible(_)
            | FerryError::VoidOperation(_) => ErrorKind::Validation,
            FerryError::CannotResolveRevision(_)
            | FerryError::Repo(_)
            | FerryError::ChangeRejected(_) => ErrorKind::Repository,
            FerryError::EmptyChange(_) | FerryError::RedundantChange(_) => ErrorKind::NoOp,
            FerryError::Io(_) => ErrorKind::Environment,
        }
    }

    /// True for both empty and redundant outcomes.
    pub fn is_empty_change(&self) -> bool {
        self.kind() == ErrorKind::NoOp
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Fail with a validation error unless `cond` holds.
pub fn check_condition(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(FerryError::Validation(msg()))
    }
}
