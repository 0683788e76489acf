//! PostgreSQL driver.
//!
//! - [`PostgresWriter`]: target writer for PostgreSQL databases

mod writer;

pub use writer::PostgresWriter;
