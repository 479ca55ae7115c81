//! Checkpointed projection runtime on top of `emt_core::EventStore`.
//!
//! Three layers, matching the write-side split between `EventStore` and
//! `emt-postgres`:
//!
//! - [`registry`]: mapping from event type to an ordered list of handlers,
//!   composable across modules via `Registry::merge`.
//! - [`upsert`]: the idempotent upsert-if-newer guard every handler should use,
//!   since the runner and consumer only guarantee at-least-once delivery.
//! - [`runner`] and [`consumer`]: the on-demand runner (bounded batch, single
//!   stream) and the long-running consumer (keyset-scans a partition's streams
//!   and drives the runner across all of them, on a poll/backoff loop).
//!
//! Checkpoints are Postgres-backed ([`checkpoint`]); the read-model handlers
//! themselves write wherever the caller's `HandlerContext::db` points, which may
//! be the same database as the event store or a dedicated one.

#![forbid(unsafe_code)]

pub mod backoff;
pub mod checkpoint;
pub mod consumer;
pub mod error;
pub mod registry;
pub mod runner;
pub mod upsert;

pub use backoff::BackoffPolicy;
pub use checkpoint::{CheckpointStore, PostgresCheckpointStore};
pub use consumer::{ConsumerConfig, ProjectionConsumer};
pub use error::{CheckpointError, HandlerError, RunnerError};
pub use registry::{Handler, HandlerContext, Registry};
pub use runner::{ProjectionRunner, RunResult, RunnerOptions, DEFAULT_BATCH_SIZE};
pub use upsert::{upsert_if_newer, UpsertOutcome};

/// Embedded migration for the `subscriptions` checkpoint table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
