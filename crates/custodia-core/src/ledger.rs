//! Ledger entry types — the tamper-evident audit log.
//!
//! Entries are immutable and chained per tenant: each entry's hash covers
//! the previous entry's hash, so a retroactive edit anywhere in a tenant's
//! history breaks verification from that point on. Corrections are new
//! entries referencing the original, never updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  canonical::{canonical_json, chain_hash, ledger_payload},
  job::ActorType,
};

// ─── Entries ─────────────────────────────────────────────────────────────────

/// One link in a tenant's audit chain. Once written, no field is ever
/// updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub id:          Uuid,
  pub tenant_id:   Uuid,
  /// The kind of resource this entry is about, e.g. `"case"`, `"response"`.
  pub entity_type: String,
  pub entity_id:   Option<String>,
  /// Upper-snake action name, e.g. `"SOD_VIOLATION"`.
  pub action:      String,
  pub actor_id:    Option<Uuid>,
  pub actor_type:  ActorType,
  pub timestamp:   DateTime<Utc>,
  /// Opaque structured change payload.
  pub diff:        Value,
  /// Opaque request context (hashed IP, user agent, correlation id, ...).
  pub metadata:    Value,
  /// Hash of the previous entry in this tenant's chain; `None` for the
  /// first entry.
  pub prev_hash:   Option<String>,
  /// `SHA256(prev_hash ‖ canonical_form(payload))`.
  pub hash:        String,
}

impl LedgerEntry {
  /// Recompute this entry's expected hash from its own stored fields.
  /// Verification compares the result against the stored `hash`.
  pub fn expected_hash(&self) -> String {
    let payload = ledger_payload(
      self.tenant_id,
      &self.entity_type,
      self.entity_id.as_deref(),
      &self.action,
      self.actor_id,
      self.actor_type,
      self.timestamp,
      &self.diff,
      &self.metadata,
    );
    chain_hash(self.prev_hash.as_deref(), &canonical_json(&payload))
  }
}

/// Input to `HashChainLedger::append`. The id, timestamp, and both hashes
/// are assigned by the ledger, never accepted from callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEvent {
  pub tenant_id:   Uuid,
  pub entity_type: String,
  pub entity_id:   Option<String>,
  pub action:      String,
  pub actor_id:    Option<Uuid>,
  pub actor_type:  ActorType,
  #[serde(default)]
  pub diff:        Value,
  #[serde(default)]
  pub metadata:    Value,
}

impl NewLedgerEvent {
  /// Convenience constructor for a system-actor event with empty payloads.
  pub fn system(tenant_id: Uuid, entity_type: &str, action: &str) -> Self {
    Self {
      tenant_id,
      entity_type: entity_type.to_owned(),
      entity_id: None,
      action: action.to_owned(),
      actor_id: None,
      actor_type: ActorType::System,
      diff: Value::Null,
      metadata: Value::Null,
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for ledger reads. Filters compose with AND.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerQuery {
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

impl LedgerQuery {
  pub fn for_tenant(tenant_id: Uuid) -> Self {
    Self {
      tenant_id,
      entity_type: None,
      entity_id: None,
      action: None,
      actor_id: None,
      recorded_after: None,
      recorded_before: None,
      limit: None,
      offset: None,
    }
  }
}

// ─── Verification ────────────────────────────────────────────────────────────

/// The result of walking a tenant's chain. Chain problems are reported
/// here as data, not as errors — only storage faults surface as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
  pub valid:               bool,
  pub total_entries:       usize,
  /// Entries checked before stopping; equals `total_entries` when valid.
  pub checked_entries:     usize,
  pub first_invalid_index: Option<usize>,
  pub first_invalid_id:    Option<Uuid>,
  pub error:               Option<String>,
}

impl VerifyReport {
  pub fn valid(total: usize) -> Self {
    Self {
      valid:               true,
      total_entries:       total,
      checked_entries:     total,
      first_invalid_index: None,
      first_invalid_id:    None,
      error:               None,
    }
  }

  pub fn invalid(total: usize, index: usize, id: Uuid, error: String) -> Self {
    Self {
      valid:               false,
      total_entries:       total,
      checked_entries:     index,
      first_invalid_index: Some(index),
      first_invalid_id:    Some(id),
      error:               Some(error),
    }
  }
}

/// Outcome of a conditional chain append. `Conflict` means another append
/// won the race for the tenant's tail; the caller re-reads the latest hash
/// and retries the whole append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAppend {
  Applied,
  Conflict,
}
