//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields (diff,
//! metadata, error lists) are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings. Enum discriminants use the `as_str` /
//! `parse` pairs defined in `custodia-core`.

use chrono::{DateTime, Utc};
use custodia_core::{
  approval::{ApprovalRequest, ApprovalStatus},
  job::{ActorType, JobRun, JobStatus},
  ledger::LedgerEntry,
  retention::{
    Artifact, DeleteMode, DeletionEvent, DeletionJob, DeletionMethod,
    DeletionSummary, LegalHold, RetentionPolicy,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_uuid_opt(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

pub fn encode_json(value: &serde_json::Value) -> String { value.to_string() }

pub fn decode_json(s: &str) -> Result<serde_json::Value> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `ledger_entries` row.
pub struct RawLedgerEntry {
  pub id:          String,
  pub tenant_id:   String,
  pub entity_type: String,
  pub entity_id:   Option<String>,
  pub action:      String,
  pub actor_id:    Option<String>,
  pub actor_type:  String,
  pub timestamp:   String,
  pub diff:        String,
  pub metadata:    String,
  pub prev_hash:   Option<String>,
  pub hash:        String,
}

impl RawLedgerEntry {
  pub fn into_entry(self) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
      id:          decode_uuid(&self.id)?,
      tenant_id:   decode_uuid(&self.tenant_id)?,
      entity_type: self.entity_type,
      entity_id:   self.entity_id,
      action:      self.action,
      actor_id:    decode_uuid_opt(self.actor_id.as_deref())?,
      actor_type:  ActorType::parse(&self.actor_type).map_err(Error::Core)?,
      timestamp:   decode_dt(&self.timestamp)?,
      diff:        decode_json(&self.diff)?,
      metadata:    decode_json(&self.metadata)?,
      prev_hash:   self.prev_hash,
      hash:        self.hash,
    })
  }
}

/// Raw strings read directly from a `job_runs` row.
pub struct RawJobRun {
  pub id:             String,
  pub tenant_id:      String,
  pub job_name:       String,
  pub status:         String,
  pub correlation_id: Option<String>,
  pub started_at:     String,
  pub finished_at:    Option<String>,
  pub error_message:  Option<String>,
}

impl RawJobRun {
  pub fn into_run(self) -> Result<JobRun> {
    Ok(JobRun {
      id:             decode_uuid(&self.id)?,
      tenant_id:      decode_uuid(&self.tenant_id)?,
      job_name:       self.job_name,
      status:         JobStatus::parse(&self.status).map_err(Error::Core)?,
      correlation_id: self.correlation_id,
      started_at:     decode_dt(&self.started_at)?,
      finished_at:    decode_dt_opt(self.finished_at.as_deref())?,
      error_message:  self.error_message,
    })
  }
}

/// Raw values read directly from a `retention_policies` row.
pub struct RawRetentionPolicy {
  pub tenant_id:           String,
  pub artifact_type:       String,
  pub retention_days:      i64,
  pub delete_mode:         String,
  pub legal_hold_respects: bool,
  pub enabled:             bool,
}

impl RawRetentionPolicy {
  pub fn into_policy(self) -> Result<RetentionPolicy> {
    Ok(RetentionPolicy {
      tenant_id:           decode_uuid(&self.tenant_id)?,
      artifact_type:       self.artifact_type,
      retention_days:      self.retention_days as u32,
      delete_mode:         DeleteMode::parse(&self.delete_mode).map_err(Error::Core)?,
      legal_hold_respects: self.legal_hold_respects,
      enabled:             self.enabled,
    })
  }
}

/// Raw values read directly from an `artifacts` row.
pub struct RawArtifact {
  pub id:              String,
  pub tenant_id:       String,
  pub artifact_type:   String,
  pub case_id:         Option<String>,
  pub storage_key:     Option<String>,
  pub created_at:      String,
  pub soft_deleted_at: Option<String>,
}

impl RawArtifact {
  pub fn into_artifact(self) -> Result<Artifact> {
    Ok(Artifact {
      id:              decode_uuid(&self.id)?,
      tenant_id:       decode_uuid(&self.tenant_id)?,
      artifact_type:   self.artifact_type,
      case_id:         decode_uuid_opt(self.case_id.as_deref())?,
      storage_key:     self.storage_key,
      created_at:      decode_dt(&self.created_at)?,
      soft_deleted_at: decode_dt_opt(self.soft_deleted_at.as_deref())?,
    })
  }
}

/// Raw values read directly from a `legal_holds` row.
pub struct RawLegalHold {
  pub tenant_id: String,
  pub case_id:   String,
  pub enabled:   bool,
  pub reason:    Option<String>,
}

impl RawLegalHold {
  pub fn into_hold(self) -> Result<LegalHold> {
    Ok(LegalHold {
      tenant_id: decode_uuid(&self.tenant_id)?,
      case_id:   decode_uuid(&self.case_id)?,
      enabled:   self.enabled,
      reason:    self.reason,
    })
  }
}

/// Raw values read directly from a `deletion_jobs` row.
pub struct RawDeletionJob {
  pub id:                String,
  pub tenant_id:         String,
  pub status:            String,
  pub triggered_by:      String,
  pub triggered_user_id: Option<String>,
  pub started_at:        String,
  pub finished_at:       Option<String>,
  pub evaluated:         i64,
  pub deleted:           i64,
  pub blocked:           i64,
  pub errors:            String,
}

impl RawDeletionJob {
  pub fn into_job(self) -> Result<DeletionJob> {
    Ok(DeletionJob {
      id:                decode_uuid(&self.id)?,
      tenant_id:         decode_uuid(&self.tenant_id)?,
      status:            JobStatus::parse(&self.status).map_err(Error::Core)?,
      triggered_by:      ActorType::parse(&self.triggered_by).map_err(Error::Core)?,
      triggered_user_id: decode_uuid_opt(self.triggered_user_id.as_deref())?,
      started_at:        decode_dt(&self.started_at)?,
      finished_at:       decode_dt_opt(self.finished_at.as_deref())?,
      summary:           DeletionSummary {
        evaluated: self.evaluated as u64,
        deleted:   self.deleted as u64,
        blocked:   self.blocked as u64,
        errors:    serde_json::from_str(&self.errors)?,
      },
    })
  }
}

/// Raw values read directly from a `deletion_events` row.
pub struct RawDeletionEvent {
  pub id:                 String,
  pub tenant_id:          String,
  pub artifact_type:      String,
  pub artifact_id:        String,
  pub case_id:            Option<String>,
  pub storage_key:        Option<String>,
  pub deleted_at:         String,
  pub deletion_method:    String,
  pub checksum_before:    Option<String>,
  pub proof_hash:         String,
  pub job_id:             String,
  pub legal_hold_blocked: bool,
  pub reason:             String,
}

impl RawDeletionEvent {
  pub fn into_event(self) -> Result<DeletionEvent> {
    Ok(DeletionEvent {
      id:                 decode_uuid(&self.id)?,
      tenant_id:          decode_uuid(&self.tenant_id)?,
      artifact_type:      self.artifact_type,
      artifact_id:        decode_uuid(&self.artifact_id)?,
      case_id:            decode_uuid_opt(self.case_id.as_deref())?,
      storage_key:        self.storage_key,
      deleted_at:         decode_dt(&self.deleted_at)?,
      deletion_method:    DeletionMethod::parse(&self.deletion_method).map_err(Error::Core)?,
      checksum_before:    self.checksum_before,
      proof_hash:         self.proof_hash,
      job_id:             decode_uuid(&self.job_id)?,
      legal_hold_blocked: self.legal_hold_blocked,
      reason:             self.reason,
    })
  }
}

/// Raw values read directly from an `approval_requests` row.
pub struct RawApproval {
  pub id:           String,
  pub tenant_id:    String,
  pub scope_type:   String,
  pub scope_id:     String,
  pub requested_by: String,
  pub status:       String,
  pub reason:       String,
  pub approved_by:  Option<String>,
  pub approved_at:  Option<String>,
}

impl RawApproval {
  pub fn into_request(self) -> Result<ApprovalRequest> {
    Ok(ApprovalRequest {
      id:           decode_uuid(&self.id)?,
      tenant_id:    decode_uuid(&self.tenant_id)?,
      scope_type:   self.scope_type,
      scope_id:     decode_uuid(&self.scope_id)?,
      requested_by: decode_uuid(&self.requested_by)?,
      status:       ApprovalStatus::parse(&self.status).map_err(Error::Core)?,
      reason:       self.reason,
      approved_by:  decode_uuid_opt(self.approved_by.as_deref())?,
      approved_at:  decode_dt_opt(self.approved_at.as_deref())?,
    })
  }
}
