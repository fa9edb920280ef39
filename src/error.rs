//! Engine error types.
//!
//! Storage and gateway failures are recovered at the scheduler/dispatcher
//! boundary (logged and recorded); policy failures are rejected before
//! anything is persisted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The sqlite store was unreachable or a statement failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The messaging gateway rejected or timed out a send. The payload is
    /// the raw gateway response (or transport error) for operator diagnosis.
    #[error("gateway send failed: {0}")]
    Gateway(String),

    /// An invalid reminder policy or an illegal state transition.
    #[error("policy error: {0}")]
    Policy(String),

    /// A phone number that cannot be normalized to E.164.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// The task is already completed or cancelled; nothing was sent.
    #[error("task is {status}; not sending")]
    TaskClosed { status: String },

    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<sqlite::Error> for Error {
    fn from(err: sqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
