//! Mapping from event type to an ordered list of handlers.
//!
//! A `Registry` is built up with `register` and combined across modules with
//! `merge`, which concatenates handler lists per event type so independent read
//! models (e.g. a cart projection and a generator projection) compose into one
//! runner without knowing about each other.

use crate::error::HandlerError;
use emt_core::{Partition, RecordedEvent};
use sqlx::PgPool;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Context passed to every handler invocation: the read-model database and the
/// partition the event belongs to.
#[derive(Clone)]
pub struct HandlerContext {
    /// Pool for the read-model database. May be the same pool as the event
    /// store's, or a dedicated one for true write/read separation.
    pub db: PgPool,
    /// Partition (tenant) the event belongs to.
    pub partition: Partition,
}

/// A projection handler: reacts to one event type by updating a read model.
///
/// Implementations are expected to use [`crate::upsert::upsert_if_newer`] so
/// repeated invocation with the same event is a no-op (the runner and consumer
/// both provide only at-least-once delivery).
pub trait Handler: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the read-model write fails. The runner aborts
    /// the current batch on error and does not advance the checkpoint past this
    /// event.
    fn handle(
        &self,
        ctx: &HandlerContext,
        event: &RecordedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;
}

/// Mapping from event type string to an ordered list of handlers.
#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<String, Vec<Arc<dyn Handler>>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` to run for every event of type `event_type`, after any
    /// handlers already registered for that type.
    #[must_use]
    pub fn register(mut self, event_type: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.entry(event_type.into()).or_default().push(handler);
        self
    }

    /// The handlers registered for `event_type`, in registration order. Empty if
    /// none are registered (the runner still advances the checkpoint past such
    /// events — an unhandled event type is not an error).
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> &[Arc<dyn Handler>] {
        self.handlers.get(event_type).map_or(&[], Vec::as_slice)
    }

    /// Concatenate handler lists per event type across several registries,
    /// preserving each registry's internal order and the order `registries` are
    /// given in. Lets independently authored modules compose into one runner.
    #[must_use]
    pub fn merge(registries: impl IntoIterator<Item = Self>) -> Self {
        let mut merged = Self::new();
        for registry in registries {
            for (event_type, handlers) in registry.handlers {
                merged.handlers.entry(event_type).or_default().extend(handlers);
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl Handler for Counting {
        fn handle(
            &self,
            _ctx: &HandlerContext,
            _event: &RecordedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn handlers_for_unregistered_type_is_empty() {
        let registry = Registry::new();
        assert!(registry.handlers_for("ItemAdded").is_empty());
    }

    #[test]
    fn register_preserves_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new()
            .register("ItemAdded", Arc::new(Counting(counter.clone())))
            .register("ItemAdded", Arc::new(Counting(counter)));

        assert_eq!(registry.handlers_for("ItemAdded").len(), 2);
    }

    #[test]
    fn merge_concatenates_per_event_type() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cart_registry =
            Registry::new().register("ItemAdded", Arc::new(Counting(counter.clone())));
        let generator_registry =
            Registry::new().register("ItemAdded", Arc::new(Counting(counter)));

        let merged = Registry::merge([cart_registry, generator_registry]);
        assert_eq!(merged.handlers_for("ItemAdded").len(), 2);
    }
}
