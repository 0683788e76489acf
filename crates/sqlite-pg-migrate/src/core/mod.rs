//! Core abstractions shared by the engine and the store drivers.
//!
//! - [`schema`]: column metadata and the [`TypeCategory`] classification
//! - [`value`]: dynamically typed cell values and source rows
//! - [`identifier`]: SQL identifier quoting and row-identifier format checks
//! - [`traits`]: the [`SourceReader`] / [`TargetWriter`] store boundaries

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use schema::{NativeColumn, TypeCategory};
pub use traits::{InsertColumn, InsertOutcome, ReadOptions, SourceReader, TargetWriter};
pub use value::{Row, Value};
