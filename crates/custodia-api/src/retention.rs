//! Handlers for `/retention` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/retention/run` | Runs a deletion pass synchronously |
//! | `GET`  | `/retention/events?tenant_id=[&job_id=]` | Proof records |
//! | `GET`  | `/retention/events/export` | Same filter, `text/csv` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::header,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use custodia_core::{
  blob::BlobStore,
  job::ActorType,
  retention::{DeletionEvent, DeletionJob},
  store::AssuranceStore,
};
use custodia_engine::export::deletion_events_csv;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Run ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RunBody {
  pub tenant_id:         Uuid,
  /// When set, the run is attributed to this user; otherwise to the system
  /// (scheduled runs).
  pub triggered_user_id: Option<Uuid>,
  /// Pins the clock cutoffs are computed against; defaults to the current
  /// time.
  pub now:               Option<DateTime<Utc>>,
}

/// `POST /retention/run` — executes the deletion pass and returns the
/// finalized job, including counts and any per-candidate errors.
pub async fn run<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Json(body): Json<RunBody>,
) -> Result<Json<DeletionJob>, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let triggered_by = if body.triggered_user_id.is_some() {
    ActorType::User
  } else {
    ActorType::System
  };
  let job = state
    .retention
    .run_deletion_job(body.tenant_id, triggered_by, body.triggered_user_id, body.now)
    .await?;
  Ok(Json(job))
}

// ─── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventParams {
  pub tenant_id: Uuid,
  pub job_id:    Option<Uuid>,
}

/// `GET /retention/events?tenant_id=<id>[&job_id=<id>]`
pub async fn events<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Query(params): Query<EventParams>,
) -> Result<Json<Vec<DeletionEvent>>, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let events = state
    .store
    .deletion_events(params.tenant_id, params.job_id)
    .await
    .map_err(|e| ApiError::Engine(custodia_engine::Error::store(e)))?;
  Ok(Json(events))
}

/// `GET /retention/events/export` — the same filter as `/retention/events`,
/// rendered as RFC 4180 CSV.
pub async fn export<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Query(params): Query<EventParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let events = state
    .store
    .deletion_events(params.tenant_id, params.job_id)
    .await
    .map_err(|e| ApiError::Engine(custodia_engine::Error::store(e)))?;
  let csv = deletion_events_csv(&events);
  Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}
