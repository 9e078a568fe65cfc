//! Persistent proposal storage.

mod sqlite;

pub use sqlite::SqliteRepository;
