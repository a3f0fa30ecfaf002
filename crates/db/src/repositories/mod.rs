//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod accident_repo;
pub mod audit_repo;
pub mod driver_repo;
pub mod event_repo;
pub mod station_repo;

pub use accident_repo::AccidentRepo;
pub use audit_repo::AuditLogRepo;
pub use driver_repo::DriverRepo;
pub use event_repo::EventRepo;
pub use station_repo::StationRepo;
