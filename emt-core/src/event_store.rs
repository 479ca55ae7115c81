//! `EventStore` abstraction: `AppendToStream` and `ReadStream`.
//!
//! # Design
//!
//! The trait is deliberately minimal: append a batch of events to a stream under an
//! optimistic-concurrency policy, and read a range of events back out. It says
//! nothing about how streams are discovered, how projections are checkpointed, or
//! how the payload is shaped — those are layered on top in `emt-projections`.
//!
//! # Dyn Compatibility
//!
//! This trait returns `Pin<Box<dyn Future>>` instead of using `async fn` so it stays
//! object-safe (`Arc<dyn EventStore>`), which the projection runner and consumer rely
//! on to stay storage-agnostic.

use crate::event::{NewEvent, RecordedEvent};
use crate::stream::{ExpectedVersion, GlobalPosition, Partition, StreamId, StreamPosition};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by `append_to_stream`.
#[derive(Error, Debug)]
pub enum AppendError {
    /// The expected-version policy was violated: another append (or the absence of
    /// one) left the stream at a version other than what the caller required.
    #[error("version conflict on stream {stream_id}: expected {expected:?}, actual {actual}")]
    VersionConflict {
        /// The stream where the conflict occurred.
        stream_id: StreamId,
        /// The version the caller required.
        expected: ExpectedVersion,
        /// The stream's actual current version.
        actual: StreamPosition,
    },

    /// `events` was empty. Reported with the same shape as a version conflict against
    /// `NoConcurrencyCheck`, per the design's error taxonomy.
    #[error("cannot append an empty batch of events to stream {0}")]
    EmptyBatch(StreamId),

    /// The underlying storage failed. Fatal to the current operation; any
    /// transaction is rolled back.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors raised by `read_stream`.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The underlying storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Inputs to `append_to_stream`.
#[derive(Debug)]
pub struct AppendOptions {
    /// Partition (tenant) the stream belongs to.
    pub partition: Partition,
    /// Free-form tag describing the aggregate type, e.g. `"cart"`.
    pub stream_type: String,
    /// Optimistic-concurrency policy.
    pub expected_version: ExpectedVersion,
}

impl AppendOptions {
    /// Build options for a given stream type with no concurrency check and the
    /// default partition.
    #[must_use]
    pub fn new(stream_type: impl Into<String>) -> Self {
        Self {
            partition: Partition::default(),
            stream_type: stream_type.into(),
            expected_version: ExpectedVersion::NoConcurrencyCheck,
        }
    }

    /// Set the partition.
    #[must_use]
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Set the expected-version policy.
    #[must_use]
    pub const fn with_expected_version(mut self, expected_version: ExpectedVersion) -> Self {
        self.expected_version = expected_version;
        self
    }
}

/// Outcome of a successful `append_to_stream` call.
#[derive(Debug, Clone, Copy)]
pub struct AppendResult {
    /// The stream's version after this append (`previous + events.len()`).
    pub next_expected_stream_version: StreamPosition,
    /// The `global_position` assigned to the last inserted message.
    pub last_event_global_position: GlobalPosition,
    /// Whether the stream did not exist prior to this append.
    pub created_new_stream: bool,
}

/// Inputs to `read_stream`.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Partition the stream belongs to.
    pub partition: Partition,
    /// Inclusive lower bound on `stream_position` (1-based).
    pub from: Option<StreamPosition>,
    /// Inclusive upper bound on `stream_position`.
    pub to: Option<StreamPosition>,
    /// Maximum number of events to return, applied after range filtering.
    pub max_count: Option<u32>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            partition: Partition::default(),
            from: None,
            to: None,
            max_count: None,
        }
    }
}

impl ReadOptions {
    /// Options reading the whole stream in the default partition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the partition.
    #[must_use]
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Set the inclusive range `[from, to]`.
    #[must_use]
    pub const fn with_range(mut self, from: StreamPosition, to: StreamPosition) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Set `max_count`.
    #[must_use]
    pub const fn with_max_count(mut self, max_count: u32) -> Self {
        self.max_count = Some(max_count);
        self
    }
}

/// Outcome of a `read_stream` call.
#[derive(Debug)]
pub struct ReadResult {
    /// Events in the requested range, ordered by `stream_position` ascending.
    pub events: Vec<RecordedEvent>,
    /// The stream's current version at read time (not clipped by the range).
    pub current_stream_version: StreamPosition,
    /// Whether the stream exists at all.
    pub stream_exists: bool,
}

/// Transactional append-only event log with per-stream optimistic concurrency, and
/// the ranged reader over it.
///
/// Implementations must be `Send + Sync` for use across async tasks.
pub trait EventStore: Send + Sync {
    /// Append `events` to `stream_id` under the policy in `options`.
    ///
    /// # Errors
    ///
    /// - [`AppendError::EmptyBatch`] if `events` is empty.
    /// - [`AppendError::VersionConflict`] if the expected-version policy is violated.
    /// - [`AppendError::Storage`] on any underlying I/O failure.
    fn append_to_stream(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        options: AppendOptions,
    ) -> Pin<Box<dyn Future<Output = Result<AppendResult, AppendError>> + Send + '_>>;

    /// Read a range of events from `stream_id`.
    ///
    /// A missing stream is not an error: it returns `stream_exists: false` and an
    /// empty event list.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Storage`] on any underlying I/O failure.
    fn read_stream(
        &self,
        stream_id: StreamId,
        options: ReadOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ReadResult, ReadError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_options_defaults_to_no_concurrency_check() {
        let opts = AppendOptions::new("cart");
        assert_eq!(opts.expected_version, ExpectedVersion::NoConcurrencyCheck);
        assert_eq!(opts.partition, Partition::default());
    }

    #[test]
    fn read_options_builder() {
        let opts = ReadOptions::new()
            .with_range(StreamPosition::new(2), StreamPosition::new(5))
            .with_max_count(3);
        assert_eq!(opts.from, Some(StreamPosition::new(2)));
        assert_eq!(opts.to, Some(StreamPosition::new(5)));
        assert_eq!(opts.max_count, Some(3));
    }
}
