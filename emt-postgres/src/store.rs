use crate::error::{from_sqlx_append, from_sqlx_read};
use chrono::{DateTime, Utc};
use emt_core::{
    AppendError, AppendOptions, AppendResult, EventStore, ExpectedVersion, GlobalPosition,
    NewEvent, Partition, ReadError, ReadOptions, ReadResult, RecordedEvent, StreamId,
    StreamPosition, MESSAGE_KIND_EVENT,
};
use sqlx::{PgPool, QueryBuilder, Row};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Stream position, as stored, can never exceed `i64::MAX` in practice (it would
/// take billions of events on a single stream); the cast is narrowing but not
/// meaningfully lossy.
#[allow(clippy::cast_possible_wrap)]
const fn position_to_i64(value: u64) -> i64 {
    value as i64
}

#[allow(clippy::cast_sign_loss)]
const fn i64_to_position(value: i64) -> u64 {
    value as u64
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    message_id: String,
    stream_id: String,
    partition: String,
    message_type: String,
    message_data: serde_json::Value,
    message_metadata: serde_json::Value,
    stream_position: i64,
    global_position: i64,
    message_kind: String,
    message_schema_version: String,
    created: DateTime<Utc>,
}

impl From<MessageRow> for RecordedEvent {
    fn from(row: MessageRow) -> Self {
        Self {
            message_id: row.message_id,
            stream_id: StreamId::new(row.stream_id),
            partition: Partition::new(row.partition),
            event_type: row.message_type,
            data: row.message_data,
            metadata: row.message_metadata,
            stream_position: StreamPosition::new(i64_to_position(row.stream_position)),
            global_position: GlobalPosition::new(row.global_position),
            message_kind: row.message_kind,
            message_schema_version: row.message_schema_version,
            created: row.created,
        }
    }
}

/// Postgres-backed `EventStore`.
///
/// Cloning is cheap: it shares the underlying connection pool.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Wrap an existing, already-connected pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool, for callers that need to share it (e.g.
    /// with `emt-projections`'s checkpoint store).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
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

        let mut tx = self.pool.begin().await.map_err(from_sqlx_append)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx_append)?;

        let existing = sqlx::query(
            "SELECT stream_position FROM streams \
             WHERE stream_id = $1 AND partition = $2 AND is_archived = false",
        )
        .bind(stream_id.as_str())
        .bind(options.partition.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(from_sqlx_append)?;

        let (stream_exists, current) = match existing {
            Some(row) => (true, StreamPosition::new(i64_to_position(row.get(0)))),
            None => (false, StreamPosition::ZERO),
        };

        check_expected_version(&stream_id, stream_exists, current, options.expected_version)?;

        let next = current.advance_by(events.len() as u64);

        if stream_exists {
            let result = sqlx::query(
                "UPDATE streams SET stream_position = $1 \
                 WHERE stream_id = $2 AND partition = $3 AND is_archived = false \
                 AND stream_position = $4",
            )
            .bind(position_to_i64(next.value()))
            .bind(stream_id.as_str())
            .bind(options.partition.as_str())
            .bind(position_to_i64(current.value()))
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx_append)?;

            if result.rows_affected() == 0 {
                warn!(
                    stream_id = %stream_id,
                    partition = %options.partition.as_str(),
                    expected = ?options.expected_version,
                    actual = %current,
                    "append rejected: version conflict"
                );
                return Err(AppendError::VersionConflict {
                    stream_id,
                    expected: options.expected_version,
                    actual: current,
                });
            }
        } else {
            sqlx::query(
                "INSERT INTO streams (stream_id, partition, stream_type, stream_position, stream_metadata) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(stream_id.as_str())
            .bind(options.partition.as_str())
            .bind(&options.stream_type)
            .bind(position_to_i64(next.value()))
            .bind(serde_json::json!({}))
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx_append)?;
        }

        // Pre-allocate one sequence value per event so the metadata embedded in
        // `message_metadata` carries the same `globalPosition` as the column the
        // row actually gets: a bare `nextval(...)` in the VALUES list would insert
        // the real position but leave the metadata blob stamped with a stale
        // placeholder.
        let global_positions: Vec<i64> = sqlx::query_scalar(
            "SELECT nextval('emt_global_message_position') FROM generate_series(1, $1)",
        )
        .bind(events.len() as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(from_sqlx_append)?;

        let mut query_builder = QueryBuilder::new(
            "INSERT INTO messages \
             (stream_id, stream_position, partition, message_kind, message_data, \
              message_metadata, message_schema_version, message_type, message_id, \
              global_position) ",
        );

        query_builder.push_values(
            events.iter().enumerate().zip(global_positions.iter().copied()),
            |mut b, ((i, event), global_position)| {
                let stream_position = current.advance_by(i as u64 + 1);
                let message_id = uuid::Uuid::new_v4().to_string();
                let metadata = RecordedEvent::merge_metadata(
                    event.metadata.clone(),
                    &message_id,
                    &stream_id,
                    stream_position,
                    GlobalPosition::new(global_position),
                );
                b.push_bind(stream_id.as_str())
                    .push_bind(position_to_i64(stream_position.value()))
                    .push_bind(options.partition.as_str())
                    .push_bind(MESSAGE_KIND_EVENT)
                    .push_bind(event.data.clone())
                    .push_bind(metadata)
                    .push_bind(i.to_string())
                    .push_bind(event.event_type.clone())
                    .push_bind(message_id)
                    .push_bind(global_position);
            },
        );

        query_builder.build().execute(&mut *tx).await.map_err(from_sqlx_append)?;

        let last_global_position = GlobalPosition::new(global_positions[global_positions.len() - 1]);

        tx.commit().await.map_err(from_sqlx_append)?;

        debug!(
            stream_id = %stream_id,
            partition = %options.partition.as_str(),
            count = events.len(),
            created_new_stream = !stream_exists,
            "appended events to stream"
        );

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
        let existing = sqlx::query(
            "SELECT stream_position FROM streams \
             WHERE stream_id = $1 AND partition = $2 AND is_archived = false",
        )
        .bind(stream_id.as_str())
        .bind(options.partition.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx_read)?;

        let Some(row) = existing else {
            return Ok(ReadResult {
                events: vec![],
                current_stream_version: StreamPosition::ZERO,
                stream_exists: false,
            });
        };

        let current_stream_version = StreamPosition::new(i64_to_position(row.get(0)));

        let mut query_builder = QueryBuilder::new(
            "SELECT message_id, stream_id, partition, message_type, message_data, \
             message_metadata, stream_position, global_position, message_kind, \
             message_schema_version, created \
             FROM messages WHERE stream_id = ",
        );
        query_builder.push_bind(stream_id.as_str());
        query_builder
            .push(" AND partition = ")
            .push_bind(options.partition.as_str());
        query_builder.push(" AND is_archived = false");

        if let Some(from) = options.from {
            query_builder
                .push(" AND stream_position >= ")
                .push_bind(position_to_i64(from.value()));
        }
        if let Some(to) = options.to {
            query_builder
                .push(" AND stream_position <= ")
                .push_bind(position_to_i64(to.value()));
        }
        query_builder.push(" ORDER BY stream_position ASC");
        if let Some(max_count) = options.max_count {
            query_builder.push(" LIMIT ").push_bind(i64::from(max_count));
        }

        let rows = query_builder
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx_read)?;

        let events: Vec<RecordedEvent> = rows.into_iter().map(RecordedEvent::from).collect();

        debug!(
            stream_id = %stream_id,
            partition = %options.partition.as_str(),
            count = events.len(),
            "read stream"
        );

        Ok(ReadResult {
            events,
            current_stream_version,
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
        ExpectedVersion::StreamExists => {
            if stream_exists {
                Ok(())
            } else {
                Err(conflict())
            }
        }
        ExpectedVersion::StreamDoesNotExist => {
            if stream_exists {
                Err(conflict())
            } else {
                Ok(())
            }
        }
        ExpectedVersion::Exact(expected_position) => {
            if current == expected_position {
                Ok(())
            } else {
                Err(conflict())
            }
        }
    }
}

impl EventStore for PostgresEventStore {
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
