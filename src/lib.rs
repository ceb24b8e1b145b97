// ============================================================================
// erptest — OpenERP test harness
// ============================================================================
//
// Drives an OpenERP installation during automated tests: throwaway
// databases, explicit per-test transactions bound to a cursor/user/context
// triple, and thin Model/Record/Wizard proxies over the server's RPC
// services. All the real work (queries, isolation, schema) happens on the
// server; this crate is the plumbing around it.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod proto;
pub mod record;
pub mod service;
pub mod testing;
pub mod transaction;
pub mod wizard;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use db::{create_database, drop_database, setup_database};
pub use error::{Error, Result};
pub use model::{Domain, Model};
pub use record::{FieldValue, Record};
pub use service::{Context, CursorId, FieldDescriptor, FieldType, OrmService};
pub use service::http::HttpService;
pub use service::memory::InMemoryServer;
pub use transaction::{Client, Transaction};
pub use wizard::Wizard;
