//! Store driver implementations.
//!
//! - [`sqlite`]: source reader for the application's SQLite file
//! - [`postgres`]: target writer for PostgreSQL
//! - [`common`]: shared utilities (TLS)

pub mod common;
pub mod postgres;
pub mod sqlite;

pub use common::SslMode;
pub use postgres::PostgresWriter;
pub use sqlite::SqliteReader;
