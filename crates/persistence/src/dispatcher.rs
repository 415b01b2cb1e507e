//! Domain event dispatch after commit.
//!
//! The unit of work hands every event drained from a committed transaction
//! to a [`DomainEventDispatcher`]. Delivery is at-least-once from the
//! caller's point of view: a failed dispatch is reported, never undone.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::EventEnvelope;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::DispatchError;

/// Delivers committed domain events to whatever consumes them.
#[async_trait]
pub trait DomainEventDispatcher: Send + Sync {
    /// Dispatches events in the order given.
    async fn dispatch(&self, events: &[EventEnvelope]) -> Result<(), DispatchError>;
}

/// Dispatcher that only logs each event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDispatcher;

#[async_trait]
impl DomainEventDispatcher for LoggingDispatcher {
    async fn dispatch(&self, events: &[EventEnvelope]) -> Result<(), DispatchError> {
        for event in events {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                "domain event"
            );
        }
        Ok(())
    }
}

/// Dispatcher that keeps every delivered event for inspection.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    delivered: Arc<Mutex<Vec<EventEnvelope>>>,
    failure: Arc<Mutex<Option<DispatchError>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything delivered so far.
    pub async fn delivered(&self) -> Vec<EventEnvelope> {
        self.delivered.lock().await.clone()
    }

    /// Returns the event types delivered so far, in order.
    pub async fn delivered_types(&self) -> Vec<String> {
        self.delivered
            .lock()
            .await
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Makes the next dispatch fail with `error` without recording anything.
    pub async fn fail_next(&self, error: DispatchError) {
        *self.failure.lock().await = Some(error);
    }

    pub async fn clear(&self) {
        self.delivered.lock().await.clear();
    }
}

#[async_trait]
impl DomainEventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, events: &[EventEnvelope]) -> Result<(), DispatchError> {
        if let Some(error) = self.failure.lock().await.take() {
            return Err(error);
        }
        self.delivered.lock().await.extend_from_slice(events);
        Ok(())
    }
}

/// Error returned by an [`EventHandler`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Reacts to domain events of the types it subscribes to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler.
    fn name(&self) -> &'static str;

    /// Returns the event types this handler wants, e.g. `"TicketClosed"`.
    fn event_types(&self) -> &[&'static str];

    /// Handles a single event.
    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Routes each event to the handlers registered for its type.
///
/// Events nobody handles are skipped. Every delivery is attempted even after
/// a failure; the first failure is reported.
#[derive(Clone, Default)]
pub struct HandlerDispatcher {
    routes: HashMap<&'static str, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to each of its event types.
    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for event_type in handler.event_types() {
            self.routes
                .entry(event_type)
                .or_default()
                .push(Arc::clone(&handler));
        }
        self
    }

    /// Returns the number of handlers subscribed to `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes.get(event_type).map_or(0, Vec::len)
    }
}

#[async_trait]
impl DomainEventDispatcher for HandlerDispatcher {
    async fn dispatch(&self, events: &[EventEnvelope]) -> Result<(), DispatchError> {
        let mut first_failure = None;

        for event in events {
            let Some(handlers) = self.routes.get(event.event_type.as_str()) else {
                tracing::trace!(event_type = %event.event_type, "no handler registered");
                continue;
            };
            for handler in handlers {
                if let Err(e) = handler.handle(event).await {
                    tracing::warn!(
                        handler = handler.name(),
                        event_type = %event.event_type,
                        event_id = %event.event_id,
                        error = %e,
                        "event handler failed"
                    );
                    first_failure.get_or_insert(DispatchError::HandlerFailed {
                        handler: handler.name().to_string(),
                        event_type: event.event_type.clone(),
                        event_id: event.event_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::EntityId;
    use domain::DomainEvent;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct Ping;

    impl DomainEvent for Ping {
        fn event_type(&self) -> &'static str {
            "Ping"
        }
    }

    #[derive(Serialize)]
    struct Pong;

    impl DomainEvent for Pong {
        fn event_type(&self) -> &'static str {
            "Pong"
        }
    }

    fn envelope<E: DomainEvent>(event: &E) -> EventEnvelope {
        EventEnvelope::new("Probe", EntityId::new(), event, Utc::now()).unwrap()
    }

    struct Counter {
        seen: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn event_types(&self) -> &[&'static str] {
            &["Ping"]
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HandlerError::new("boom"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_by_event_type_and_skips_unhandled() {
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
            fail: false,
        });
        let dispatcher = HandlerDispatcher::new().register(counter.clone());

        dispatcher
            .dispatch(&[envelope(&Ping), envelope(&Pong), envelope(&Ping)])
            .await
            .unwrap();

        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.handler_count("Pong"), 0);
    }

    #[tokio::test]
    async fn attempts_every_delivery_and_reports_first_failure() {
        let failing = Arc::new(Counter {
            seen: AtomicUsize::new(0),
            fail: true,
        });
        let dispatcher = HandlerDispatcher::new().register(failing.clone());
        let first = envelope(&Ping);

        let err = dispatcher
            .dispatch(&[first.clone(), envelope(&Ping)])
            .await
            .unwrap_err();

        assert_eq!(failing.seen.load(Ordering::SeqCst), 2);
        assert!(matches!(
            err,
            DispatchError::HandlerFailed { event_id, .. } if event_id == first.event_id
        ));
    }

    #[tokio::test]
    async fn recording_dispatcher_injects_one_failure() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher
            .fail_next(DispatchError::Unavailable("bus down".into()))
            .await;

        assert!(dispatcher.dispatch(&[envelope(&Ping)]).await.is_err());
        dispatcher.dispatch(&[envelope(&Pong)]).await.unwrap();
        assert_eq!(dispatcher.delivered_types().await, vec!["Pong"]);
    }
}
