//! Retention policy, artifact, and deletion-proof types.
//!
//! A retention policy states how long an artifact type may be kept and how
//! it must be destroyed once expired. Deletion events are the immutable
//! evidence trail: one per artifact decision, whether the artifact was
//! deleted or blocked by a legal hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, job::{ActorType, JobStatus}};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// How expired content is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteMode {
  /// Mark the record; stored content is retained.
  SoftDelete,
  /// Remove the stored content (if any) and the record itself.
  HardDelete,
}

impl DeleteMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::SoftDelete => "SOFT_DELETE",
      Self::HardDelete => "HARD_DELETE",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "SOFT_DELETE" => Ok(Self::SoftDelete),
      "HARD_DELETE" => Ok(Self::HardDelete),
      other => Err(Error::unknown("delete mode", other)),
    }
  }
}

/// One per `(tenant, artifact_type)`. Mutable configuration, evaluated
/// fresh on every deletion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
  pub tenant_id:           Uuid,
  /// Artifact kind this policy governs, e.g. `"export"`, `"message"`.
  pub artifact_type:       String,
  pub retention_days:      u32,
  pub delete_mode:         DeleteMode,
  /// When `true`, artifacts on a case with an active legal hold are exempt.
  pub legal_hold_respects: bool,
  pub enabled:             bool,
}

impl RetentionPolicy {
  /// The creation cutoff for this policy as of `now`; artifacts created
  /// before it are due for deletion.
  pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::days(i64::from(self.retention_days))
  }
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

/// The discovery record the retention engine evaluates. The owning
/// application registers one per stored artifact; `case_id` resolves the
/// owning case for legal-hold checks and `storage_key` points at content
/// held in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
  pub id:              Uuid,
  pub tenant_id:       Uuid,
  pub artifact_type:   String,
  pub case_id:         Option<Uuid>,
  pub storage_key:     Option<String>,
  pub created_at:      DateTime<Utc>,
  /// Set by a soft delete; soft-deleted artifacts drop out of discovery.
  pub soft_deleted_at: Option<DateTime<Utc>>,
}

/// An administrative flag on a case that suspends otherwise-due deletions
/// for that case's artifacts, for every policy with `legal_hold_respects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalHold {
  pub tenant_id: Uuid,
  pub case_id:   Uuid,
  pub enabled:   bool,
  pub reason:    Option<String>,
}

// ─── Deletion jobs ───────────────────────────────────────────────────────────

/// Aggregate counts and the bounded error list for one deletion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionSummary {
  pub evaluated: u64,
  pub deleted:   u64,
  pub blocked:   u64,
  /// Per-candidate failure descriptions, truncated to a fixed cap.
  pub errors:    Vec<String>,
}

/// One per retention run invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionJob {
  pub id:                Uuid,
  pub tenant_id:         Uuid,
  pub status:            JobStatus,
  pub triggered_by:      ActorType,
  pub triggered_user_id: Option<Uuid>,
  pub started_at:        DateTime<Utc>,
  pub finished_at:       Option<DateTime<Utc>>,
  pub summary:           DeletionSummary,
}

impl DeletionJob {
  pub fn started(
    tenant_id: Uuid,
    triggered_by: ActorType,
    triggered_user_id: Option<Uuid>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      tenant_id,
      status: JobStatus::Running,
      triggered_by,
      triggered_user_id,
      started_at: Utc::now(),
      finished_at: None,
      summary: DeletionSummary::default(),
    }
  }
}

// ─── Deletion events ─────────────────────────────────────────────────────────

/// How a single artifact was (or would have been) destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeletionMethod {
  Soft,
  Hard,
}

impl DeletionMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Soft => "SOFT",
      Self::Hard => "HARD",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "SOFT" => Ok(Self::Soft),
      "HARD" => Ok(Self::Hard),
      other => Err(Error::unknown("deletion method", other)),
    }
  }
}

/// One per artifact decision, immutable once written. `proof_hash` is the
/// canonical SHA-256 of the decision payload — a standalone proof, not
/// chained to previous deletion events. `checksum_before` captures the
/// content hash ahead of a hard delete so the proof can be disputed after
/// the bytes are gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionEvent {
  pub id:                 Uuid,
  pub tenant_id:          Uuid,
  pub artifact_type:      String,
  pub artifact_id:        Uuid,
  pub case_id:            Option<Uuid>,
  pub storage_key:        Option<String>,
  pub deleted_at:         DateTime<Utc>,
  pub deletion_method:    DeletionMethod,
  pub checksum_before:    Option<String>,
  pub proof_hash:         String,
  pub job_id:             Uuid,
  pub legal_hold_blocked: bool,
  pub reason:             String,
}
