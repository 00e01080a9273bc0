//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("engine error: {0}")]
  Engine(#[source] custodia_engine::Error),
}

impl From<custodia_engine::Error> for ApiError {
  fn from(e: custodia_engine::Error) -> Self {
    use custodia_engine::Error as E;
    match e {
      E::ApprovalNotFound(id) => {
        ApiError::NotFound(format!("approval request {id} not found"))
      }
      E::ApprovalNotPending(_) | E::SelfApproval(_) | E::ChainContention { .. } => {
        ApiError::Conflict(e.to_string())
      }
      other => ApiError::Engine(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
