//! Postgres-backed implementation of `emt_core::EventStore`.
//!
//! Appends run inside a single `SERIALIZABLE` transaction spanning the stream
//! lookup, the `streams` upsert, and the `messages` insert, so concurrent writers
//! to the same stream either see their conditional update affect zero rows (an
//! ordinary version conflict) or get a Postgres serialization failure (retried by
//! the caller, not retried internally).
//!
//! # Example
//!
//! ```ignore
//! use emt_postgres::PostgresEventStore;
//! use sqlx::postgres::PgPoolOptions;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPoolOptions::new().connect("postgres://localhost/emt").await?;
//!     let store = PostgresEventStore::from_pool(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod error;
mod store;

pub use error::{from_sqlx_append, from_sqlx_read};
pub use store::PostgresEventStore;

/// Embedded migrations for the `streams`/`messages` tables and the global
/// position sequence. Run with `MIGRATOR.run(&pool).await`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
