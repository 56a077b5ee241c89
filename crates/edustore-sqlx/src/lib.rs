// edustore-sqlx: SQLx storage adapter for EduStore.
//
// Implements the core Adapter trait over `sqlx::AnyPool`, so one binary
// serves SQLite or Postgres depending on the connection URL.

pub mod adapter;
pub mod query_builder;
pub mod schema;
pub mod transaction;

pub use adapter::SqlxAdapter;
pub use schema::{create_statements, create_table_sql};
pub use transaction::SqlxTransactionAdapter;
