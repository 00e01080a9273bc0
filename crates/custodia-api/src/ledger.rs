//! Handlers for `/ledger` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/ledger/entries` | Query params mirror [`LedgerQuery`] |
//! | `POST` | `/ledger/entries` | Body: a [`NewLedgerEvent`] |
//! | `GET`  | `/ledger/verify?tenant_id=` | Full-chain verification |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use custodia_core::{
  blob::BlobStore,
  ledger::{LedgerEntry, LedgerQuery, NewLedgerEvent, VerifyReport},
  store::AssuranceStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub tenant_id:       Uuid,
  pub entity_type:     Option<String>,
  pub entity_id:       Option<String>,
  pub action:          Option<String>,
  pub actor_id:        Option<Uuid>,
  pub recorded_after:  Option<DateTime<Utc>>,
  pub recorded_before: Option<DateTime<Utc>>,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

/// `GET /ledger/entries?tenant_id=<id>[&entity_type=…&action=…]`
pub async fn list<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let query = LedgerQuery {
    tenant_id:       params.tenant_id,
    entity_type:     params.entity_type,
    entity_id:       params.entity_id,
    action:          params.action,
    actor_id:        params.actor_id,
    recorded_after:  params.recorded_after,
    recorded_before: params.recorded_before,
    limit:           params.limit,
    offset:          params.offset,
  };
  let entries = state.ledger.query(&query).await?;
  Ok(Json(entries))
}

// ─── Append ───────────────────────────────────────────────────────────────────

/// `POST /ledger/entries` — body: a [`NewLedgerEvent`]. The server assigns
/// id, timestamp, and both hashes.
pub async fn append<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Json(event): Json<NewLedgerEvent>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  if event.entity_type.is_empty() || event.action.is_empty() {
    return Err(ApiError::BadRequest(
      "entity_type and action must be non-empty".into(),
    ));
  }
  let entry = state.ledger.append(event).await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

// ─── Verify ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
  pub tenant_id: Uuid,
}

/// `GET /ledger/verify?tenant_id=<id>`
pub async fn verify<S, B>(
  State(state): State<Arc<AppState<S, B>>>,
  Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyReport>, ApiError>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  let report = state.ledger.verify(params.tenant_id).await?;
  Ok(Json(report))
}
