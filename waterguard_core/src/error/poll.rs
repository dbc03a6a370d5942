//! Polling cycle error types

use thiserror::Error;

/// Failures of a refresh cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// The hub answered nothing and there is no earlier snapshot to fall back to
    #[error("Hub returned no data and no previous snapshot is available")]
    NoData,

    /// The coordinator has been shut down
    #[error("Polling coordinator is stopped")]
    Stopped,
}
