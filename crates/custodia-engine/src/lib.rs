//! The Custodia assurance engine: the audit ledger, the job executor, the
//! retention engine, and the approval gate, all generic over an
//! [`AssuranceStore`](custodia_core::store::AssuranceStore) backend.
//!
//! Components are plain structs constructed with their dependencies — a
//! store, a blob store where content is destroyed, a lock manager, and a
//! [`Notifier`](custodia_core::notify::Notifier) sink. Nothing here is a
//! global.

pub mod approval;
pub mod blob;
pub mod error;
pub mod executor;
pub mod export;
pub mod ledger;
pub mod lock;
pub mod notify;
pub mod retention;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
