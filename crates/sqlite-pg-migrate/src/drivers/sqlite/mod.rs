//! SQLite driver.
//!
//! - [`SqliteReader`]: source reader for the application's SQLite file

mod reader;

pub use reader::SqliteReader;
