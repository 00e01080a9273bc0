//! JSON REST API for Custodia.
//!
//! Exposes an axum [`Router`] backed by any
//! [`custodia_core::store::AssuranceStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility — the tenant id in a request is
//! trusted as-is.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", custodia_api::api_router(state.clone()))
//! ```

pub mod error;
pub mod ledger;
pub mod retention;
pub mod sod;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use custodia_core::{blob::BlobStore, notify::Notifier, store::AssuranceStore};
use custodia_engine::{
  approval::ApprovalGate, ledger::HashChainLedger, lock::JobLockManager,
  retention::RetentionEngine,
};

pub use error::ApiError;

/// Everything the handlers need, wired once at startup.
pub struct AppState<S, B> {
  pub store:     S,
  pub ledger:    HashChainLedger<S>,
  pub retention: RetentionEngine<S, B>,
  pub gate:      ApprovalGate<S>,
}

impl<S, B> AppState<S, B>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  pub fn new(
    store: S,
    blobs: B,
    locks: Arc<JobLockManager>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self {
      ledger:    HashChainLedger::new(store.clone(), Arc::clone(&notifier)),
      retention: RetentionEngine::new(store.clone(), blobs, locks, Arc::clone(&notifier)),
      gate:      ApprovalGate::new(store.clone(), notifier),
      store,
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, B>(state: Arc<AppState<S, B>>) -> Router<()>
where
  S: AssuranceStore + Clone + 'static,
  B: BlobStore + 'static,
{
  Router::new()
    // Audit ledger
    .route(
      "/ledger/entries",
      get(ledger::list::<S, B>).post(ledger::append::<S, B>),
    )
    .route("/ledger/verify", get(ledger::verify::<S, B>))
    // Retention
    .route("/retention/run", post(retention::run::<S, B>))
    .route("/retention/events", get(retention::events::<S, B>))
    .route("/retention/events/export", get(retention::export::<S, B>))
    // Separation of duties
    .route("/sod/check", post(sod::check::<S, B>))
    .route("/approvals", get(sod::pending::<S, B>))
    .route("/approvals/{id}/decide", post(sod::decide::<S, B>))
    .with_state(state)
}
