//! Persistence layer: libSQL-backed storage for master data, engine
//! candidates and the reactivation log.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::ReactivationStore;
