//! Mapping from `sqlx::Error` to the core error types.

use emt_core::{AppendError, ReadError};
use tracing::warn;

/// Postgres error code for a serialization failure under `SERIALIZABLE` isolation.
/// A transaction that fails with this code must be retried by the caller; it is
/// not, by itself, evidence of a version conflict (we don't know the actual
/// version at that point), so it surfaces as a storage error.
const SERIALIZATION_FAILURE: &str = "40001";

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(SERIALIZATION_FAILURE))
}

/// Map a `sqlx::Error` encountered during `append_to_stream` to an `AppendError`.
#[must_use]
pub fn from_sqlx_append(err: sqlx::Error) -> AppendError {
    if is_serialization_failure(&err) {
        warn!(error = %err, "append transaction failed to serialize, caller should retry");
        return AppendError::Storage(format!(
            "transaction failed to serialize, retry the append: {err}"
        ));
    }
    AppendError::Storage(err.to_string())
}

/// Map a `sqlx::Error` encountered during `read_stream` to a `ReadError`.
#[must_use]
pub fn from_sqlx_read(err: sqlx::Error) -> ReadError {
    ReadError::Storage(err.to_string())
}
