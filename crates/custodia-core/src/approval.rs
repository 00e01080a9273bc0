//! Separation-of-duties rules and approval requests.
//!
//! The four-eyes principle: the actor who created or edited a sensitive
//! resource cannot also approve it. A violation is not an error — it is a
//! deliberate control-flow outcome that parks the action behind a pending
//! approval, to be decided by a different user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Per-tenant master switch for the SoD rule catalog. A missing row is
/// treated as enabled — individual rules opt in on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SodPolicy {
  pub tenant_id: Uuid,
  pub enabled:   bool,
}

/// One named rule in the catalog, evaluated against an actor/creator pair
/// for a scoped resource. The id is a stable slug callers reference, e.g.
/// `"response_publish"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SodRule {
  pub id:          String,
  pub tenant_id:   Uuid,
  pub name:        String,
  pub description: String,
  pub enabled:     bool,
}

// ─── Approval requests ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
  Pending,
  Approved,
  Rejected,
}

impl ApprovalStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Approved => "APPROVED",
      Self::Rejected => "REJECTED",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "PENDING" => Ok(Self::Pending),
      "APPROVED" => Ok(Self::Approved),
      "REJECTED" => Ok(Self::Rejected),
      other => Err(Error::unknown("approval status", other)),
    }
  }
}

/// The caller's verdict on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
  Approve,
  Reject,
}

impl ApprovalDecision {
  pub fn terminal_status(self) -> ApprovalStatus {
    match self {
      Self::Approve => ApprovalStatus::Approved,
      Self::Reject => ApprovalStatus::Rejected,
    }
  }
}

/// Created when a SoD check blocks an action. Terminal states are set by a
/// user who must differ from `requested_by` — an enforced invariant, not a
/// hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
  pub id:           Uuid,
  pub tenant_id:    Uuid,
  /// The kind of blocked resource, e.g. `"response"`, `"legal_exception"`.
  pub scope_type:   String,
  pub scope_id:     Uuid,
  pub requested_by: Uuid,
  pub status:       ApprovalStatus,
  pub reason:       String,
  pub approved_by:  Option<Uuid>,
  pub approved_at:  Option<DateTime<Utc>>,
}

impl ApprovalRequest {
  pub fn pending(
    tenant_id: Uuid,
    scope_type: &str,
    scope_id: Uuid,
    requested_by: Uuid,
    reason: String,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      tenant_id,
      scope_type: scope_type.to_owned(),
      scope_id,
      requested_by,
      status: ApprovalStatus::Pending,
      reason,
      approved_by: None,
      approved_at: None,
    }
  }
}
