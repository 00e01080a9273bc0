//! SQLite backend for the Custodia assurance store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Because the connection
//! executes closures serially on that thread, the chain-append
//! compare-and-swap (read latest hash, check, insert) is atomic per call.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
