//! Error types for fetch workers

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// the fetch capability reported a failure; the tick is skipped
    #[error("fetch failed")]
    FetchFailed,

    /// the fetch capability panicked; the worker incarnation terminates
    #[error("fetch crashed: {0}")]
    FetchCrashed(String),

    #[error("received unexpected message: {0}")]
    UnrecognizedMessage(String),

    /// the worker has stopped and its mailbox is closed
    #[error("worker is unavailable")]
    Unavailable,

    #[error("invalid worker config: {0}")]
    InvalidConfig(String),

    #[error("a worker named {0} already exists")]
    DuplicateName(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
