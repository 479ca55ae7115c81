//! Folding a stream of events into an in-memory aggregate.
//!
//! This is the write-side counterpart to `EventStore::read_stream`: given a type
//! that knows how to `apply` one event to itself, fold an entire stream (or a
//! single page of it) into a value plus the stream's resulting version. Command
//! handlers use this to rebuild state before deciding, then append new events with
//! `ExpectedVersion::Exact` pinned to the version they folded to.
//!
//! `aggregate_stream` composes this with `EventStore::read_stream` so callers don't
//! have to wire the two together themselves.

use crate::event::RecordedEvent;
use crate::event_store::{EventStore, ReadError, ReadOptions};
use crate::stream::{StreamId, StreamPosition};
use thiserror::Error;

/// A type that can be built up by folding a stream of recorded events.
///
/// Implementors define only `apply`; `fold` is provided for callers to reduce an
/// entire `Vec<RecordedEvent>` (as returned by `read_stream`) into a final state.
pub trait Aggregate: Default {
    /// Apply one event to `self`, mutating in place.
    ///
    /// Unknown event types are typically ignored rather than treated as errors, so
    /// aggregates can evolve without breaking replay of older events.
    fn apply(&mut self, event: &RecordedEvent);
}

/// The result of folding a stream: the aggregate state plus the version it was
/// folded to, suitable for use as `ExpectedVersion::Exact` on the next append.
#[derive(Debug, Clone)]
pub struct Folded<A> {
    /// The folded aggregate state.
    pub state: A,
    /// The stream version after the last folded event (`StreamPosition::ZERO` if no
    /// events were folded).
    pub version: StreamPosition,
}

/// Fold `events` (assumed ordered by `stream_position` ascending) into an aggregate
/// of type `A`, starting from `A::default()`.
pub fn fold<A: Aggregate>(events: &[RecordedEvent]) -> Folded<A> {
    let mut state = A::default();
    let mut version = StreamPosition::ZERO;
    for event in events {
        state.apply(event);
        version = event.stream_position;
    }
    Folded { state, version }
}

/// The result of `aggregate_stream`: folded state plus the stream's existence and
/// version at read time.
#[derive(Debug, Clone)]
pub struct Aggregated<A> {
    /// The folded aggregate state.
    pub state: A,
    /// The stream's current version at read time, as reported by `read_stream`
    /// (not derived from the fold, so it is accurate even for an empty page).
    pub current_stream_version: StreamPosition,
    /// Whether the stream exists at all.
    pub stream_exists: bool,
}

/// Errors raised by `aggregate_stream`.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// The underlying `read_stream` call failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The caller asserted an expected stream version and the read reported a
    /// different one. `0` is treated as "no events yet" on the caller's side, same
    /// as everywhere else `StreamPosition::ZERO` stands in for an empty stream.
    #[error("expected stream version {expected}, but stream is at {actual}")]
    ExpectedVersionMismatch {
        /// The version the caller required.
        expected: StreamPosition,
        /// The stream's actual version at read time.
        actual: StreamPosition,
    },
}

/// Read `stream_id` via `store.read_stream(options)`, then fold the result into an
/// aggregate of type `A`.
///
/// If `expected_stream_version` is supplied, the read's `current_stream_version` is
/// asserted against it before folding; a mismatch is reported as
/// [`AggregateError::ExpectedVersionMismatch`] rather than silently folding a stream
/// that isn't at the version the caller expected.
///
/// # Errors
///
/// Returns [`AggregateError::Read`] if the underlying read fails, or
/// [`AggregateError::ExpectedVersionMismatch`] if `expected_stream_version` is
/// supplied and doesn't match.
pub async fn aggregate_stream<A, S>(
    store: &S,
    stream_id: StreamId,
    options: ReadOptions,
    expected_stream_version: Option<StreamPosition>,
) -> Result<Aggregated<A>, AggregateError>
where
    A: Aggregate,
    S: EventStore + ?Sized,
{
    let read = store.read_stream(stream_id, options).await?;

    if let Some(expected) = expected_stream_version {
        if read.current_stream_version != expected {
            return Err(AggregateError::ExpectedVersionMismatch {
                expected,
                actual: read.current_stream_version,
            });
        }
    }

    let folded = fold::<A>(&read.events);

    Ok(Aggregated {
        state: folded.state,
        current_stream_version: read.current_stream_version,
        stream_exists: read.stream_exists,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewEvent;
    use crate::event_store::{AppendError, AppendOptions, AppendResult, ReadResult};
    use crate::stream::{GlobalPosition, Partition};
    use chrono::Utc;
    use std::future::Future;
    use std::pin::Pin;

    #[derive(Default, Debug, PartialEq)]
    struct Counter {
        count: u64,
    }

    impl Aggregate for Counter {
        fn apply(&mut self, event: &RecordedEvent) {
            if event.event_type == "Incremented" {
                self.count += 1;
            }
        }
    }

    fn recorded(stream_position: u64, event_type: &str) -> RecordedEvent {
        RecordedEvent {
            message_id: format!("m-{stream_position}"),
            stream_id: StreamId::new("counter-1"),
            partition: Partition::default(),
            event_type: event_type.to_string(),
            data: serde_json::json!({}),
            metadata: serde_json::json!({}),
            stream_position: StreamPosition::new(stream_position),
            global_position: GlobalPosition::new(stream_position as i64),
            message_kind: "E".to_string(),
            message_schema_version: "0".to_string(),
            created: Utc::now(),
        }
    }

    #[test]
    fn fold_empty_yields_default_at_zero() {
        let folded: Folded<Counter> = fold(&[]);
        assert_eq!(folded.state, Counter { count: 0 });
        assert_eq!(folded.version, StreamPosition::ZERO);
    }

    #[test]
    fn fold_applies_events_in_order_and_tracks_version() {
        let events = vec![
            recorded(1, "Incremented"),
            recorded(2, "Incremented"),
            recorded(3, "SomethingElse"),
        ];
        let folded: Folded<Counter> = fold(&events);
        assert_eq!(folded.state, Counter { count: 2 });
        assert_eq!(folded.version, StreamPosition::new(3));
    }

    /// A store fixed to return a canned `ReadResult`, for testing `aggregate_stream`
    /// without pulling in a full `EventStore` implementation.
    struct FixedStore {
        read_result: ReadResult,
    }

    impl EventStore for FixedStore {
        fn append_to_stream(
            &self,
            stream_id: StreamId,
            _events: Vec<NewEvent>,
            _options: AppendOptions,
        ) -> Pin<Box<dyn Future<Output = Result<AppendResult, AppendError>> + Send + '_>> {
            Box::pin(async move { Err(AppendError::EmptyBatch(stream_id)) })
        }

        fn read_stream(
            &self,
            _stream_id: StreamId,
            _options: ReadOptions,
        ) -> Pin<Box<dyn Future<Output = Result<ReadResult, ReadError>> + Send + '_>> {
            let events = self.read_result.events.clone();
            let current_stream_version = self.read_result.current_stream_version;
            let stream_exists = self.read_result.stream_exists;
            Box::pin(async move {
                Ok(ReadResult {
                    events,
                    current_stream_version,
                    stream_exists,
                })
            })
        }
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test will fail if aggregation fails
    async fn aggregate_stream_folds_the_read_and_reports_version_and_existence() {
        let store = FixedStore {
            read_result: ReadResult {
                events: vec![recorded(1, "Incremented"), recorded(2, "Incremented")],
                current_stream_version: StreamPosition::new(2),
                stream_exists: true,
            },
        };

        let aggregated: Aggregated<Counter> = aggregate_stream(
            &store,
            StreamId::new("counter-1"),
            ReadOptions::new(),
            None,
        )
        .await
        .expect("aggregation should succeed");

        assert_eq!(aggregated.state, Counter { count: 2 });
        assert_eq!(aggregated.current_stream_version, StreamPosition::new(2));
        assert!(aggregated.stream_exists);
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test will fail if aggregation fails
    async fn aggregate_stream_reports_missing_stream_as_default_state() {
        let store = FixedStore {
            read_result: ReadResult {
                events: vec![],
                current_stream_version: StreamPosition::ZERO,
                stream_exists: false,
            },
        };

        let aggregated: Aggregated<Counter> = aggregate_stream(
            &store,
            StreamId::new("counter-missing"),
            ReadOptions::new(),
            None,
        )
        .await
        .expect("aggregation should succeed");

        assert_eq!(aggregated.state, Counter { count: 0 });
        assert!(!aggregated.stream_exists);
    }

    #[tokio::test]
    async fn aggregate_stream_rejects_a_mismatched_expected_version() {
        let store = FixedStore {
            read_result: ReadResult {
                events: vec![recorded(1, "Incremented")],
                current_stream_version: StreamPosition::new(1),
                stream_exists: true,
            },
        };

        let result: Result<Aggregated<Counter>, AggregateError> = aggregate_stream(
            &store,
            StreamId::new("counter-1"),
            ReadOptions::new(),
            Some(StreamPosition::new(5)),
        )
        .await;

        match result {
            Err(AggregateError::ExpectedVersionMismatch { expected, actual }) => {
                assert_eq!(expected, StreamPosition::new(5));
                assert_eq!(actual, StreamPosition::new(1));
            }
            Err(AggregateError::Read(_)) | Ok(_) => {
                assert!(false, "expected ExpectedVersionMismatch");
            }
        }
    }
}
