//! Error types for the Waterguard core library
//!
//! Errors are grouped into categories:
//! - Protocol errors: encoding and transport failures talking to the hub
//! - Validation errors: bad configuration or bad user input
//! - Poll errors: a refresh cycle that produced nothing usable

use thiserror::Error;

pub mod poll;
pub mod validation;

pub use self::poll::PollError;
pub use self::validation::ValidationError;
pub use crate::protocol::error::ProtocolError;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Waterguard core library
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol related errors
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Validation related errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Polling cycle errors
    #[error(transparent)]
    Poll(#[from] PollError),
}

impl Error {
    /// True for network trouble worth riding out with the previous snapshot
    pub fn is_transient_network(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_transient())
    }
}
