//! Error types for the engine
//!
//! Every fallible operation returns [`Error`]. The five variants mirror the
//! classic AL error taxonomy so callers that poll the context's last-error
//! register see the same small code set the C API exposed.

use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// A handle does not resolve to a live, correctly typed object
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Unrecognized parameter or token selector
    #[error("Invalid enum: {0}")]
    InvalidEnum(String),

    /// Argument outside its legal domain (empty data, unsupported format,
    /// queue capacity exceeded, not enough processed buffers, ...)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Call not legal in the object's current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Storage, voice slot, or system resource allocation failed
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}

impl Error {
    /// The register code corresponding to this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidName(_) => ErrorCode::InvalidName,
            Error::InvalidEnum(_) => ErrorCode::InvalidEnum,
            Error::InvalidValue(_) => ErrorCode::InvalidValue,
            Error::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Error::OutOfMemory(_) => ErrorCode::OutOfMemory,
        }
    }
}

/// Compact error code held by the context's last-error register.
///
/// Numeric values match the AL 1.1 constants so diagnostics line up with
/// existing tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    NoError = 0,
    InvalidName = 0xA001,
    InvalidEnum = 0xA002,
    InvalidValue = 0xA003,
    InvalidOperation = 0xA004,
    OutOfMemory = 0xA005,
}

impl ErrorCode {
    /// Canonical token name for this code
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "AL_NO_ERROR",
            ErrorCode::InvalidName => "AL_INVALID_NAME",
            ErrorCode::InvalidEnum => "AL_INVALID_ENUM",
            ErrorCode::InvalidValue => "AL_INVALID_VALUE",
            ErrorCode::InvalidOperation => "AL_INVALID_OPERATION",
            ErrorCode::OutOfMemory => "AL_OUT_OF_MEMORY",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;
