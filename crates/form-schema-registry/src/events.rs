//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Registry lifecycle events
//!
//! Handlers run synchronously on the emitting task, in emission order. A
//! handler that errors or panics is logged and skipped; it never changes
//! the outcome of the registry operation. The same events are also
//! published on a broadcast channel for async consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::warn;

/// Capacity of the broadcast channel; slow receivers observe `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Kind of lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryEventKind {
    Registered,
    Accessed,
    Updated,
    Deleted,
}

impl RegistryEventKind {
    /// Stable name used in logs and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "schema.registered",
            Self::Accessed => "schema.accessed",
            Self::Updated => "schema.updated",
            Self::Deleted => "schema.deleted",
        }
    }
}

impl fmt::Display for RegistryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub schema_id: String,
    pub timestamp: DateTime<Utc>,
}

impl RegistryEvent {
    /// Event stamped with the current time
    pub fn now(kind: RegistryEventKind, schema_id: impl Into<String>) -> Self {
        Self {
            kind,
            schema_id: schema_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Error type handlers may return
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Synchronous event handler
///
/// Handlers must not call back into the registry that emitted the event.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RegistryEvent) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&RegistryEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &RegistryEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Fan-out of events to handlers and channel subscribers
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    sender: broadcast::Sender<RegistryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handlers: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Register a handler
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push(handler);
    }

    /// New receiver for events emitted from now on
    pub fn subscribe_channel(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Deliver an event, returning how many handlers failed
    pub fn emit(&self, event: RegistryEvent) -> usize {
        let handlers: Vec<_> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut failures = 0;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(
                        event = %event.kind,
                        schema_id = %event.schema_id,
                        error = %e,
                        "Event handler failed"
                    );
                }
                Err(_) => {
                    failures += 1;
                    warn!(
                        event = %event.kind,
                        schema_id = %event.schema_id,
                        "Event handler panicked"
                    );
                }
            }
        }

        // no receivers is not an error
        let _ = self.sender.send(event);
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<RegistryEvent>>>, Arc<dyn EventHandler>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |event: &RegistryEvent| -> Result<(), HandlerError> {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        };
        (seen, Arc::new(handler))
    }

    #[test]
    fn test_handlers_receive_events_in_order() {
        let bus = EventBus::new();
        let (seen, handler) = recorder();
        bus.subscribe(handler);

        bus.emit(RegistryEvent::now(RegistryEventKind::Registered, "a"));
        bus.emit(RegistryEvent::now(RegistryEventKind::Updated, "a"));
        bus.emit(RegistryEvent::now(RegistryEventKind::Deleted, "a"));

        let kinds: Vec<_> = seen.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RegistryEventKind::Registered,
                RegistryEventKind::Updated,
                RegistryEventKind::Deleted
            ]
        );
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let bus = EventBus::new();
        let failing = |_: &RegistryEvent| -> Result<(), HandlerError> { Err("boom".into()) };
        let panicking = |_: &RegistryEvent| -> Result<(), HandlerError> { panic!("handler bug") };
        let (seen, recording) = recorder();

        bus.subscribe(Arc::new(failing));
        bus.subscribe(Arc::new(panicking));
        bus.subscribe(recording);

        let failures = bus.emit(RegistryEvent::now(RegistryEventKind::Accessed, "a"));
        assert_eq!(failures, 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bus.handler_count(), 3);
    }

    #[tokio::test]
    async fn test_channel_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_channel();

        bus.emit(RegistryEvent::now(RegistryEventKind::Registered, "forms.login"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, RegistryEventKind::Registered);
        assert_eq!(event.schema_id, "forms.login");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(RegistryEventKind::Registered.to_string(), "schema.registered");
        assert_eq!(RegistryEventKind::Deleted.as_str(), "schema.deleted");
    }
}
