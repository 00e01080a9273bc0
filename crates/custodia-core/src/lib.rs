//! Core types and trait definitions for the Custodia assurance core.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod approval;
pub mod blob;
pub mod canonical;
pub mod error;
pub mod job;
pub mod ledger;
pub mod notify;
pub mod retention;
pub mod store;

pub use error::{Error, Result};
