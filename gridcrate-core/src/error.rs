//! Error types for gridcrate

use std::panic::Location;
use thiserror::Error;

/// Main error type for gridcrate operations
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition of the called operation does not hold.
    #[error("{message}, file: {location}")]
    Contract {
        message: String,
        location: &'static Location<'static>,
    },

    /// A reader could not supply data the target requires.
    #[error("Missing data: {0}")]
    MissingData(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

impl Error {
    /// Contract violation reported at the caller's location
    #[track_caller]
    pub fn contract(message: impl Into<String>) -> Self {
        Error::Contract {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Whether this error reports a violated precondition.
    pub fn is_contract(&self) -> bool {
        matches!(self, Error::Contract { .. })
    }
}

/// Result type alias for gridcrate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::Contract`] unless `condition` holds.
///
/// The recorded location is the caller's, so the error points at the check
/// that was violated rather than at this function.
#[track_caller]
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::contract(message))
    }
}
