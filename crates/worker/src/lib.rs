//! The dispatcher process.
//!
//! - [`config`]: process settings read from the environment.
//! - [`trigger`]: inbound trigger messages and the PostgreSQL listener that
//!   feeds them to the dispatch service.
//! - [`notifications`]: outbound sink for committed assignments.
//! - [`shutdown`]: orderly teardown of the running process.

pub mod config;
pub mod notifications;
pub mod shutdown;
pub mod trigger;
