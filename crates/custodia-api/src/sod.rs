//! Handlers for `/sod` and `/approvals` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sod/check` | Body: a [`SodCheckRequest`] |
//! | `GET`  | `/approvals?tenant_id=` | Pending requests |
//! | `POST` | `/approvals/{id}/decide` | 409 on self-approval |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use custodia_core::{
  approval::{ApprovalDecision, ApprovalRequest},
  blob::BlobStore,
  store::AssuranceStore,
};
use custodia_engine::approval::{SodCheck, SodCheckRequest};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Check ────────────────────────────────────────────────────────────────────

/// `POST /sod/check` — evaluates the rule; when blocked, the response
/// carries the id of the pending approval request it created.
pub async fn check<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Json(request): Json<SodCheckRequest>,
) -> Result<Json<SodCheck>, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let verdict = state.gate.check(request).await?;
  Ok(Json(verdict))
}

// ─── Pending ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PendingParams {
  pub tenant_id: Uuid,
}

/// `GET /approvals?tenant_id=<id>`
pub async fn pending<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Query(params): Query<PendingParams>,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let requests = state.gate.pending(params.tenant_id).await?;
  Ok(Json(requests))
}

// ─── Decide ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DecideBody {
  pub tenant_id:  Uuid,
  pub decided_by: Uuid,
  pub decision:   ApprovalDecision,
  pub reason:     Option<String>,
}

/// `POST /approvals/{id}/decide` — body:
/// `{"tenant_id":…,"decided_by":…,"decision":"approve"}`.
pub async fn decide<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DecideBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let decided = state
    .gate
    .decide(body.tenant_id, id, body.decided_by, body.decision, body.reason)
    .await?;
  Ok((StatusCode::OK, Json(decided)))
}
