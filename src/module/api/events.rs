//! Orchestrator event notification
//!
//! Subscribers register per event type and receive an unsubscribe handle.
//! Each callback runs inside a panic boundary so one failing subscriber
//! cannot abort delivery to the others or the emitting operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::utils::time::current_timestamp_millis;

/// Event types emitted by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "module:loaded")]
    ModuleLoaded,
    #[serde(rename = "module:unloaded")]
    ModuleUnloaded,
    #[serde(rename = "module:error")]
    ModuleError,
    #[serde(rename = "api:result")]
    ApiResult,
    #[serde(rename = "plan:start")]
    PlanStart,
    #[serde(rename = "plan:step")]
    PlanStep,
    #[serde(rename = "plan:complete")]
    PlanComplete,
    #[serde(rename = "plan:error")]
    PlanError,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::ModuleLoaded,
        EventType::ModuleUnloaded,
        EventType::ModuleError,
        EventType::ApiResult,
        EventType::PlanStart,
        EventType::PlanStep,
        EventType::PlanComplete,
        EventType::PlanError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ModuleLoaded => "module:loaded",
            EventType::ModuleUnloaded => "module:unloaded",
            EventType::ModuleError => "module:error",
            EventType::ApiResult => "api:result",
            EventType::PlanStart => "plan:start",
            EventType::PlanStep => "plan:step",
            EventType::PlanComplete => "plan:complete",
            EventType::PlanError => "plan:error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Emitting component (e.g. `registry`, `intent-bridge`)
    pub source: String,
    pub payload: Value,
}

type Callback = Arc<dyn Fn(&OrchestratorEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_type: HashMap<EventType, Vec<(u64, Callback)>>,
}

/// Event bus shared by the registry and the intent bridge
#[derive(Default)]
pub struct EventManager {
    subscribers: Arc<Mutex<Subscribers>>,
}

/// Unsubscribe handle
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: u64,
    event_types: Vec<EventType>,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        let mut subscribers = subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for event_type in &self.event_types {
            if let Some(list) = subscribers.by_type.get_mut(event_type) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback to one event type
    pub fn subscribe<F>(&self, event_type: EventType, callback: F) -> Subscription
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.subscribe_many(vec![event_type], callback)
    }

    /// Subscribe a callback to every event type
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.subscribe_many(EventType::ALL.to_vec(), callback)
    }

    /// Subscribe a callback to several event types under one handle
    pub fn subscribe_many<F>(&self, event_types: Vec<EventType>, callback: F) -> Subscription
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        for event_type in &event_types {
            subscribers
                .by_type
                .entry(*event_type)
                .or_default()
                .push((id, Arc::clone(&callback)));
        }
        debug!("Subscriber {} registered for {:?}", id, event_types);

        Subscription {
            id,
            event_types,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Subscribe with a bounded channel instead of a callback
    ///
    /// Events arriving while the channel is full are dropped.
    pub fn subscribe_channel(
        &self,
        event_types: Vec<EventType>,
        capacity: usize,
    ) -> (Subscription, mpsc::Receiver<OrchestratorEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscription = self.subscribe_many(event_types, move |event| {
            if let Err(e) = tx.try_send(event.clone()) {
                warn!("Dropping {} event for channel subscriber: {}", event.event_type, e);
            }
        });
        (subscription, rx)
    }

    /// Publish an event to every subscriber of its type
    pub fn emit(&self, event_type: EventType, source: &str, payload: Value) {
        let event = OrchestratorEvent {
            event_type,
            timestamp: current_timestamp_millis(),
            source: source.to_string(),
            payload,
        };
        self.publish(&event);
    }

    pub fn publish(&self, event: &OrchestratorEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<Callback> = {
            let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers
                .by_type
                .get(&event.event_type)
                .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!("Subscriber for {} panicked; continuing", event.event_type);
            }
        }
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_type
            .get(&event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let events = EventManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = events.subscribe(EventType::ModuleLoaded, move |e| {
            assert_eq!(e.payload["name"], "auth");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.emit(EventType::ModuleLoaded, "registry", json!({"name": "auth"}));
        events.emit(EventType::ModuleUnloaded, "registry", json!({"name": "auth"}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        events.emit(EventType::ModuleLoaded, "registry", json!({"name": "auth"}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(events.subscriber_count(EventType::ModuleLoaded), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let events = EventManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = events.subscribe(EventType::ApiResult, |_| panic!("subscriber failure"));
        let counter = Arc::clone(&hits);
        let _good = events.subscribe(EventType::ApiResult, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.emit(EventType::ApiResult, "registry", Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let events = EventManager::new();
        let (_sub, mut rx) = events.subscribe_channel(vec![EventType::PlanStart], 4);
        events.emit(EventType::PlanStart, "intent-bridge", json!({"steps": 2}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::PlanStart);
        assert_eq!(event.source, "intent-bridge");
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::ApiResult).unwrap(),
            "\"api:result\""
        );
        assert_eq!(EventType::PlanComplete.to_string(), "plan:complete");
    }
}
