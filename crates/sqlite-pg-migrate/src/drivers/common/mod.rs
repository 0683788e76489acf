//! Utilities shared by the store drivers.
//!
//! - [`tls`]: TLS configuration for PostgreSQL connections

pub mod tls;

pub use tls::SslMode;
