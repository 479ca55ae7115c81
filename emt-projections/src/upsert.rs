//! Idempotent upsert-if-newer guard for read-model writes.
//!
//! Events may be re-delivered (at-least-once, see the runner and consumer docs),
//! so a handler's write must be a no-op when it has already been applied. This
//! helper makes that explicit at the call site instead of leaving it to each
//! handler to remember: `current_position` looks up the row's
//! `last_stream_position`, and `apply` is only invoked if the event is newer.

use emt_core::{RecordedEvent, StreamPosition};
use std::future::Future;

/// Whether `upsert_if_newer` actually ran `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The event was newer than the row's recorded position; `apply` ran.
    Applied,
    /// The event was stale (already applied, or older); `apply` was skipped.
    Skipped,
}

/// Apply `event` to a read-model row only if `event.stream_position` is strictly
/// greater than the row's current `last_stream_position`.
///
/// `current_position` should look up that column (returning `None` if the row
/// does not exist yet, which is treated as position `0` — any event at position
/// `1` or later is newer). `apply` should insert-or-update the row, writing
/// `last_stream_position = event.stream_position` and
/// `last_global_position = event.global_position` atomically with the domain
/// columns, typically via `INSERT ... ON CONFLICT ... DO UPDATE`.
///
/// # Errors
///
/// Propagates whatever error `current_position` or `apply` returns.
pub async fn upsert_if_newer<Lookup, LookupFut, Apply, ApplyFut, E>(
    event: &RecordedEvent,
    current_position: Lookup,
    apply: Apply,
) -> Result<UpsertOutcome, E>
where
    Lookup: FnOnce() -> LookupFut,
    LookupFut: Future<Output = Result<Option<StreamPosition>, E>>,
    Apply: FnOnce() -> ApplyFut,
    ApplyFut: Future<Output = Result<(), E>>,
{
    if let Some(prior) = current_position().await? {
        if event.stream_position <= prior {
            return Ok(UpsertOutcome::Skipped);
        }
    }
    apply().await?;
    Ok(UpsertOutcome::Applied)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use emt_core::{GlobalPosition, Partition, StreamId};

    fn event_at(stream_position: u64) -> RecordedEvent {
        RecordedEvent {
            message_id: "m-1".to_string(),
            stream_id: StreamId::new("cart-1"),
            partition: Partition::default(),
            event_type: "ItemAdded".to_string(),
            data: serde_json::json!({}),
            metadata: serde_json::json!({}),
            stream_position: StreamPosition::new(stream_position),
            global_position: GlobalPosition::new(stream_position as i64),
            message_kind: emt_core::MESSAGE_KIND_EVENT.to_string(),
            message_schema_version: "0".to_string(),
            created: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn applies_when_row_missing() {
        let event = event_at(1);
        let outcome: Result<UpsertOutcome, std::convert::Infallible> = upsert_if_newer(
            &event,
            || async { Ok(None) },
            || async { Ok(()) },
        )
        .await;
        assert!(matches!(outcome, Ok(UpsertOutcome::Applied)));
    }

    #[tokio::test]
    async fn skips_when_event_not_newer() {
        let event = event_at(2);
        let outcome: Result<UpsertOutcome, std::convert::Infallible> = upsert_if_newer(
            &event,
            || async { Ok(Some(StreamPosition::new(2))) },
            || async { panic!("apply should not run") },
        )
        .await;
        assert!(matches!(outcome, Ok(UpsertOutcome::Skipped)));
    }

    #[tokio::test]
    async fn applies_when_event_newer_than_prior() {
        let event = event_at(3);
        let outcome: Result<UpsertOutcome, std::convert::Infallible> = upsert_if_newer(
            &event,
            || async { Ok(Some(StreamPosition::new(2))) },
            || async { Ok(()) },
        )
        .await;
        assert!(matches!(outcome, Ok(UpsertOutcome::Applied)));
    }
}
