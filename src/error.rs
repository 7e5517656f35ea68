//! Crate-wide error type.

use std::fmt;

use crate::schema::PartitionValidation;
use crate::validate::ValidationOutcome;

/// Errors raised by the store.
///
/// Validation failures are deliberately *not* represented as a bare
/// string variant: `ValidationFailed` and `ReorgPartial` carry the
/// structured result so callers can inspect individual field/record
/// errors without re-parsing a message.
#[derive(Debug)]
pub enum Error {
    /// A file or namespace required by the operation does not exist.
    NotFound(String),
    /// A namespace or record id already exists.
    AlreadyExists(String),
    /// A partition schema failed structural validation (empty `order`,
    /// missing field entry, bad regex, unknown derivation name).
    SchemaInvalid(String),
    /// A record failed partition-schema validation.
    ValidationFailed(PartitionValidation),
    /// A whole-document schema check failed on write.
    DocumentInvalid(ValidationOutcome),
    /// A RowId did not parse against the given schema.
    RowIdInvalid(String),
    /// Underlying filesystem error other than not-found.
    Io(std::io::Error),
    /// Malformed JSON on a whole-document read.
    BadJson(serde_json::Error),
    /// A reorganization job finished with at least one irrecoverable error.
    ReorgPartial(Vec<crate::reorg::ReorgIssue>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Error::SchemaInvalid(msg) => write!(f, "invalid partition schema: {msg}"),
            Error::ValidationFailed(result) => {
                write!(f, "record failed partition-schema validation: {} error(s)", result.errors.len())
            }
            Error::DocumentInvalid(outcome) => {
                write!(f, "record failed document validation: {} error(s)", outcome.errors.len())
            }
            Error::RowIdInvalid(msg) => write!(f, "invalid rowid: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::BadJson(err) => write!(f, "malformed json: {err}"),
            Error::ReorgPartial(issues) => {
                write!(f, "reorganization finished with {} irrecoverable error(s)", issues.len())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::BadJson(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::BadJson(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
