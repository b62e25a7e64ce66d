//! Error types shared across presenced crates

use thiserror::Error;

/// Errors produced when parsing identifiers and timezones
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UtilError {
    #[error("Identifier cannot be empty")]
    EmptyId,

    #[error("Identifier '{0}' contains whitespace")]
    WhitespaceInId(String),

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),
}

pub type UtilResult<T> = std::result::Result<T, UtilError>;
