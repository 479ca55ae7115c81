//! On-demand, checkpointed, bounded-batch projection over a single stream.

use crate::checkpoint::CheckpointStore;
use crate::error::RunnerError;
use crate::registry::{HandlerContext, Registry};
use emt_core::{EventStore, Partition, ReadOptions, StreamId, StreamPosition};
use sqlx::PgPool;
use std::sync::Arc;

/// Default batch size for `project_events` when the caller doesn't specify one.
pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// Inputs to `ProjectionRunner::project_events` beyond the subscription and
/// stream ids.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Partition the stream belongs to.
    pub partition: Partition,
    /// Maximum events read and processed in one call.
    pub batch_size: u32,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            partition: Partition::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Outcome of one `project_events` call.
#[derive(Debug, Clone, Copy)]
pub struct RunResult {
    /// Number of events observed (handled or skipped-for-no-handler) this call.
    pub processed: u32,
    /// The stream's current version at read time, for the caller to decide
    /// whether another batch is needed.
    pub current_stream_version: StreamPosition,
}

/// Drives a [`Registry`] over a bounded window of one stream, tracked by a
/// [`CheckpointStore`].
pub struct ProjectionRunner<S> {
    store: Arc<S>,
    checkpoints: Arc<dyn CheckpointStore>,
    registry: Arc<Registry>,
    read_model_db: PgPool,
}

impl<S: EventStore> ProjectionRunner<S> {
    /// Build a runner over `store`, checkpointing via `checkpoints`, dispatching
    /// through `registry`, with handlers writing to `read_model_db`.
    pub fn new(
        store: Arc<S>,
        checkpoints: Arc<dyn CheckpointStore>,
        registry: Arc<Registry>,
        read_model_db: PgPool,
    ) -> Self {
        Self {
            store,
            checkpoints,
            registry,
            read_model_db,
        }
    }

    /// Project up to `options.batch_size` events from `stream_id`, starting just
    /// after `subscription_id`'s last checkpoint.
    ///
    /// On handler failure the loop stops immediately; the checkpoint reflects
    /// only events whose handlers all succeeded. The caller's retry resumes from
    /// there — harmless because handlers are expected to use `upsert_if_newer`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Read`] if reading the stream fails,
    /// [`RunnerError::Checkpoint`] if the checkpoint store fails, or
    /// [`RunnerError::Handler`] if a handler fails.
    pub async fn project_events(
        &self,
        subscription_id: &str,
        stream_id: StreamId,
        options: RunnerOptions,
    ) -> Result<RunResult, RunnerError> {
        let checkpoint = self
            .checkpoints
            .get_or_create(subscription_id, &options.partition)
            .await?;

        let read = self
            .store
            .read_stream(
                stream_id.clone(),
                ReadOptions::new()
                    .with_partition(options.partition.clone())
                    .with_max_count(options.batch_size)
                    .with_range(
                        checkpoint.next(),
                        checkpoint.advance_by(u64::from(options.batch_size)),
                    ),
            )
            .await
            .map_err(|source| RunnerError::Read {
                stream_id: stream_id.clone(),
                source,
            })?;

        let ctx = HandlerContext {
            db: self.read_model_db.clone(),
            partition: options.partition.clone(),
        };

        let mut processed = 0u32;
        for event in &read.events {
            for handler in self.registry.handlers_for(&event.event_type) {
                handler
                    .handle(&ctx, event)
                    .await
                    .map_err(|source| RunnerError::Handler {
                        stream_id: stream_id.clone(),
                        stream_position: event.stream_position.value(),
                        source,
                    })?;
            }

            self.checkpoints
                .advance(subscription_id, &options.partition, event.stream_position)
                .await?;
            processed += 1;
        }

        Ok(RunResult {
            processed,
            current_stream_version: read.current_stream_version,
        })
    }
}
