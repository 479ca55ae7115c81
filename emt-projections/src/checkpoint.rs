//! Postgres-backed subscription checkpoints.
//!
//! Backs the `subscriptions` table: `(subscription_id, partition, version)` →
//! `last_processed_position`. `version` is fixed at `1`; it exists in the schema
//! for future checkpoint-format migrations but is not otherwise used here.

use crate::error::CheckpointError;
use emt_core::{Partition, StreamPosition};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

const CHECKPOINT_VERSION: i32 = 1;

#[allow(clippy::cast_possible_wrap)]
const fn position_to_i64(value: u64) -> i64 {
    value as i64
}

#[allow(clippy::cast_sign_loss)]
const fn i64_to_position(value: i64) -> u64 {
    value as u64
}

/// Tracks how far each `(subscription_id, partition)` pair has progressed
/// through its stream.
pub trait CheckpointStore: Send + Sync {
    /// Get the checkpoint for `(subscription_id, partition)`, creating it at `0`
    /// if it doesn't exist yet. The creating insert must survive concurrent
    /// creators (`ON CONFLICT DO NOTHING` followed by a read, or equivalent).
    fn get_or_create(
        &self,
        subscription_id: &str,
        partition: &Partition,
    ) -> Pin<Box<dyn Future<Output = Result<StreamPosition, CheckpointError>> + Send + '_>>;

    /// Advance the checkpoint to `position`. Never decreases it (a stale
    /// concurrent caller advancing to an older position is a no-op), per the
    /// checkpoint-monotonicity invariant.
    fn advance(
        &self,
        subscription_id: &str,
        partition: &Partition,
        position: StreamPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>>;
}

/// Postgres implementation of [`CheckpointStore`], backed by the `subscriptions`
/// table.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    fn get_or_create(
        &self,
        subscription_id: &str,
        partition: &Partition,
    ) -> Pin<Box<dyn Future<Output = Result<StreamPosition, CheckpointError>> + Send + '_>> {
        let subscription_id = subscription_id.to_string();
        let partition = partition.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO subscriptions (subscription_id, version, partition, last_processed_position) \
                 VALUES ($1, $2, $3, 0) \
                 ON CONFLICT (subscription_id, partition, version) DO NOTHING",
            )
            .bind(&subscription_id)
            .bind(CHECKPOINT_VERSION)
            .bind(partition.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

            let row = sqlx::query(
                "SELECT last_processed_position FROM subscriptions \
                 WHERE subscription_id = $1 AND partition = $2 AND version = $3",
            )
            .bind(&subscription_id)
            .bind(partition.as_str())
            .bind(CHECKPOINT_VERSION)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

            let position: i64 = sqlx::Row::get(&row, 0);
            Ok(StreamPosition::new(i64_to_position(position)))
        })
    }

    fn advance(
        &self,
        subscription_id: &str,
        partition: &Partition,
        position: StreamPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        let subscription_id = subscription_id.to_string();
        let partition = partition.clone();
        Box::pin(async move {
            sqlx::query(
                "UPDATE subscriptions SET last_processed_position = GREATEST(last_processed_position, $1) \
                 WHERE subscription_id = $2 AND partition = $3 AND version = $4",
            )
            .bind(position_to_i64(position.value()))
            .bind(&subscription_id)
            .bind(partition.as_str())
            .bind(CHECKPOINT_VERSION)
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

            Ok(())
        })
    }
}
