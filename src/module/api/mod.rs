//! Orchestrator event surface

pub mod events;

pub use events::{EventManager, EventType, OrchestratorEvent, Subscription};
