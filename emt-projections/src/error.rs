//! Error taxonomy for the projection runtime.

use emt_core::{ReadError, StreamId};
use thiserror::Error;

/// Raised by a projection handler. Stops the runner's current batch; the
/// checkpoint is left at the last fully applied event, so the caller's retry
/// re-delivers this event.
#[derive(Error, Debug)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Wrap any displayable error as a `HandlerError`.
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string())
    }
}

/// Errors from the checkpoint store.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The underlying storage failed.
    #[error("checkpoint storage error: {0}")]
    Storage(String),
}

/// Errors from `ProjectionRunner::project_events`.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Reading the stream failed.
    #[error("failed to read stream {stream_id}: {source}")]
    Read {
        /// The stream that failed to read.
        stream_id: StreamId,
        /// The underlying read error.
        #[source]
        source: ReadError,
    },

    /// The checkpoint store failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A handler failed while processing an event at the given stream position.
    #[error("handler failed on stream {stream_id} at position {stream_position}: {source}")]
    Handler {
        /// The stream being processed.
        stream_id: StreamId,
        /// The stream position of the event that failed.
        stream_position: u64,
        /// The underlying handler error.
        #[source]
        source: HandlerError,
    },
}
