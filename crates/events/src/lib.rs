//! Dispatch event bus and audit persistence.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DispatchEvent`]: the event envelope published after every committed
//!   dispatch mutation, carrying its field-level changes.
//! - [`EventPersistence`]: background service that writes every event to
//!   `dispatch_events` and its changes to `audit_logs`.

pub mod bus;
pub mod persistence;

pub use bus::{event_types, DispatchEvent, EventBus};
pub use persistence::EventPersistence;
