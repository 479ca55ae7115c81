//! In-memory `EventStore` for unit-testing projections and command handlers
//! without a database.
//!
//! Implements exactly the same `append_to_stream` / `read_stream` contract as
//! `emt-postgres`'s `PostgresEventStore` — including optimistic concurrency and
//! partition isolation — backed by a `Mutex<HashMap>` instead of a transaction.

#![forbid(unsafe_code)]

use emt_core::{
    AppendError, AppendOptions, AppendResult, EventStore, ExpectedVersion, GlobalPosition,
    NewEvent, Partition, ReadError, ReadOptions, ReadResult, RecordedEvent, StreamId,
    StreamPosition, MESSAGE_KIND_EVENT,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct StreamData {
    position: StreamPosition,
    events: Vec<RecordedEvent>,
}

type Key = (String, String);

/// In-memory `EventStore`. Cloning shares the same underlying state (it's an
/// `Arc` internally), matching `PostgresEventStore`'s cheap-clone-shares-pool
/// behavior.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<Mutex<HashMap<Key, StreamData>>>,
    global_position: Arc<AtomicI64>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(stream_id: &StreamId, partition: &Partition) -> Key {
        (stream_id.as_str().to_string(), partition.as_str().to_string())
    }

    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        options: AppendOptions,
    ) -> Result<AppendResult, AppendError> {
        if events.is_empty() {
            return Err(AppendError::EmptyBatch(stream_id));
        }

        let mut streams = self.streams.lock().await;
        let key = Self::key(&stream_id, &options.partition);
        let stream_exists = streams.contains_key(&key);
        let current = streams.get(&key).map_or(StreamPosition::ZERO, |s| s.position);

        check_expected_version(&stream_id, stream_exists, current, options.expected_version)?;

        let next = current.advance_by(events.len() as u64);
        let entry = streams.entry(key).or_default();
        let mut last_global_position = GlobalPosition::new(0);

        for (i, event) in events.into_iter().enumerate() {
            let stream_position = current.advance_by(i as u64 + 1);
            let global_position =
                GlobalPosition::new(self.global_position.fetch_add(1, Ordering::SeqCst) + 1);
            let message_id = uuid::Uuid::new_v4().to_string();
            let metadata = RecordedEvent::merge_metadata(
                event.metadata,
                &message_id,
                &stream_id,
                stream_position,
                global_position,
            );

            entry.events.push(RecordedEvent {
                message_id,
                stream_id: stream_id.clone(),
                partition: options.partition.clone(),
                event_type: event.event_type,
                data: event.data,
                metadata,
                stream_position,
                global_position,
                message_kind: MESSAGE_KIND_EVENT.to_string(),
                message_schema_version: i.to_string(),
                created: chrono::Utc::now(),
            });
            last_global_position = global_position;
        }

        entry.position = next;

        Ok(AppendResult {
            next_expected_stream_version: next,
            last_event_global_position: last_global_position,
            created_new_stream: !stream_exists,
        })
    }

    async fn read(
        &self,
        stream_id: StreamId,
        options: ReadOptions,
    ) -> Result<ReadResult, ReadError> {
        let streams = self.streams.lock().await;
        let key = Self::key(&stream_id, &options.partition);

        let Some(data) = streams.get(&key) else {
            return Ok(ReadResult {
                events: vec![],
                current_stream_version: StreamPosition::ZERO,
                stream_exists: false,
            });
        };

        let mut events: Vec<RecordedEvent> = data
            .events
            .iter()
            .filter(|e| {
                options.from.is_none_or(|from| e.stream_position >= from)
                    && options.to.is_none_or(|to| e.stream_position <= to)
            })
            .cloned()
            .collect();

        if let Some(max_count) = options.max_count {
            events.truncate(max_count as usize);
        }

        Ok(ReadResult {
            events,
            current_stream_version: data.position,
            stream_exists: true,
        })
    }
}

fn check_expected_version(
    stream_id: &StreamId,
    stream_exists: bool,
    current: StreamPosition,
    expected: ExpectedVersion,
) -> Result<(), AppendError> {
    let conflict = || AppendError::VersionConflict {
        stream_id: stream_id.clone(),
        expected,
        actual: current,
    };

    match expected {
        ExpectedVersion::NoConcurrencyCheck => Ok(()),
        ExpectedVersion::StreamExists => stream_exists.then_some(()).ok_or_else(conflict),
        ExpectedVersion::StreamDoesNotExist => {
            (!stream_exists).then_some(()).ok_or_else(conflict)
        }
        ExpectedVersion::Exact(expected_position) => {
            (current == expected_position).then_some(()).ok_or_else(conflict)
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn append_to_stream(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        options: AppendOptions,
    ) -> Pin<Box<dyn Future<Output = Result<AppendResult, AppendError>> + Send + '_>> {
        Box::pin(self.append(stream_id, events, options))
    }

    fn read_stream(
        &self,
        stream_id: StreamId,
        options: ReadOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ReadResult, ReadError>> + Send + '_>> {
        Box::pin(self.read(stream_id, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_added(sku: &str) -> NewEvent {
        NewEvent::new("ItemAdded", serde_json::json!({"sku": sku}))
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test will fail if append or read fails
    async fn append_then_read_round_trips() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new("cart-1");

        let result = store
            .append_to_stream(
                stream_id.clone(),
                vec![item_added("SKU-1"), item_added("SKU-2")],
                AppendOptions::new("cart"),
            )
            .await
            .expect("append should succeed");
        assert!(result.created_new_stream);
        assert_eq!(result.next_expected_stream_version, StreamPosition::new(2));

        let read = store
            .read_stream(stream_id, ReadOptions::new())
            .await
            .expect("read should succeed");
        assert_eq!(read.events.len(), 2);
        assert_eq!(read.current_stream_version, StreamPosition::new(2));
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test will fail if the first append fails
    async fn version_conflict_on_stale_expectation() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new("cart-2");

        store
            .append_to_stream(
                stream_id.clone(),
                vec![item_added("SKU-1")],
                AppendOptions::new("cart"),
            )
            .await
            .expect("first append should succeed");

        let result = store
            .append_to_stream(
                stream_id,
                vec![item_added("SKU-2")],
                AppendOptions::new("cart")
                    .with_expected_version(ExpectedVersion::Exact(StreamPosition::ZERO)),
            )
            .await;

        assert!(matches!(result, Err(AppendError::VersionConflict { .. })));
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test will fail if append or read fails
    async fn partitions_are_isolated() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new("shared");

        store
            .append_to_stream(
                stream_id.clone(),
                vec![item_added("SKU-1")],
                AppendOptions::new("cart").with_partition(Partition::new("tenant-a")),
            )
            .await
            .expect("append should succeed");

        let read = store
            .read_stream(
                stream_id,
                ReadOptions::new().with_partition(Partition::new("tenant-b")),
            )
            .await
            .expect("read should succeed");

        assert!(!read.stream_exists);
    }
}
