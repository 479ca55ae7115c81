//! Core types and traits for the event-sourcing storage engine.
//!
//! This crate defines the write-side contract (`EventStore`, append/read options and
//! results), the message shapes that flow through it (`NewEvent`, `RecordedEvent`),
//! the identifier and position newtypes (`StreamId`, `Partition`, `StreamPosition`,
//! `GlobalPosition`), and the `aggregate_stream` helper that reads a stream and folds
//! it into caller-defined state. It has no opinion on storage backend or transport;
//! `emt-postgres` provides the Postgres-backed `EventStore`, and `emt-projections`
//! builds the checkpointed read side on top.

#![forbid(unsafe_code)]

pub mod aggregate;
pub mod event;
pub mod event_store;
pub mod stream;

pub use aggregate::{aggregate_stream, Aggregate, AggregateError, Aggregated, Folded, fold};
pub use event::{NewEvent, RecordedEvent, MESSAGE_KIND_EVENT};
pub use event_store::{
    AppendError, AppendOptions, AppendResult, EventStore, ReadError, ReadOptions, ReadResult,
};
pub use stream::{
    ExpectedVersion, GlobalPosition, ParseStreamIdError, Partition, StreamId, StreamPosition,
    DEFAULT_PARTITION,
};
