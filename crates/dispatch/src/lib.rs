//! Station assignment and on-duty matching.
//!
//! - [`StationRegistry`] owns every station's accident queue and driver pool,
//!   each behind its own lock.
//! - [`Matcher`] pairs the head of a station's queue with an available
//!   driver and commits both records, rolling back on failure.
//! - [`DispatchService`] maps the inbound triggers (accident reported,
//!   driver registered, status changed) onto the registry and matcher.
//! - [`DispatchStore`] is the persistence seam, with in-memory and
//!   PostgreSQL implementations.

pub mod config;
pub mod matcher;
pub mod registry;
pub mod retry;
pub mod service;
pub mod store;

pub use config::DispatchConfig;
pub use matcher::{Assignment, Matcher};
pub use registry::{StationRegistry, StationSnapshot};
pub use service::{DispatchService, RecoveryReport, StatusChange};
pub use store::{memory::MemoryStore, postgres::PgDispatchStore, DispatchStore};
