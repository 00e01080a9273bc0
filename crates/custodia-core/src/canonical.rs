//! Canonical-form serialization and the hashing primitives shared by the
//! audit ledger and the deletion-proof records.
//!
//! Hashing raw serialized JSON would produce false tamper signals whenever a
//! storage round-trip reorders keys or changes whitespace. Every digest in
//! Custodia is therefore computed over the canonical form: key-sorted,
//! whitespace-free, with `null` fields included so the payload shape is
//! stable across re-derivation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{job::ActorType, retention::DeletionMethod};

// ─── Canonical JSON ──────────────────────────────────────────────────────────

/// Serialise `value` deterministically: object keys sorted, no incidental
/// whitespace, arrays in order.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      // serde_json::Map iterates in key order (BTreeMap-backed without the
      // `preserve_order` feature), but we sort explicitly so the canonical
      // form does not depend on a feature flag.
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String((*key).clone()).to_string());
        out.push(':');
        write_canonical(&map[*key], out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    // Scalars already have a single serialized form.
    other => out.push_str(&other.to_string()),
  }
}

// ─── Digests ─────────────────────────────────────────────────────────────────

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

/// The chained ledger digest: `SHA256(prev_hash ‖ canonical_payload)`, where
/// a missing previous hash (first entry of a tenant's chain) contributes
/// nothing to the input.
pub fn chain_hash(prev_hash: Option<&str>, canonical_payload: &str) -> String {
  let mut hasher = Sha256::new();
  if let Some(prev) = prev_hash {
    hasher.update(prev.as_bytes());
  }
  hasher.update(canonical_payload.as_bytes());
  hex::encode(hasher.finalize())
}

/// RFC 3339 with fixed millisecond precision, so the timestamp hashed into a
/// payload is byte-identical to the one re-derived from storage.
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ─── Hashed payloads ─────────────────────────────────────────────────────────

/// The logical fields of a ledger entry, as the JSON object that gets
/// canonicalised and hashed. Stored hashes are recomputed from exactly these
/// fields during verification.
#[allow(clippy::too_many_arguments)]
pub fn ledger_payload(
  tenant_id: Uuid,
  entity_type: &str,
  entity_id: Option<&str>,
  action: &str,
  actor_id: Option<Uuid>,
  actor_type: ActorType,
  timestamp: DateTime<Utc>,
  diff: &Value,
  metadata: &Value,
) -> Value {
  serde_json::json!({
    "tenant_id":   tenant_id,
    "entity_type": entity_type,
    "entity_id":   entity_id,
    "action":      action,
    "actor_id":    actor_id,
    "actor_type":  actor_type.as_str(),
    "timestamp":   canonical_timestamp(timestamp),
    "diff":        diff,
    "metadata":    metadata,
  })
}

/// The decision payload hashed into a deletion event's `proof_hash`.
/// Standalone (not chained): each proof is independently verifiable.
#[allow(clippy::too_many_arguments)]
pub fn proof_payload(
  tenant_id: Uuid,
  artifact_type: &str,
  artifact_id: Uuid,
  case_id: Option<Uuid>,
  storage_key: Option<&str>,
  deleted_at: DateTime<Utc>,
  deletion_method: DeletionMethod,
  checksum_before: Option<&str>,
  job_id: Uuid,
  legal_hold_blocked: bool,
  reason: &str,
) -> Value {
  serde_json::json!({
    "tenant_id":          tenant_id,
    "artifact_type":      artifact_type,
    "artifact_id":        artifact_id,
    "case_id":            case_id,
    "storage_key":        storage_key,
    "deleted_at":         canonical_timestamp(deleted_at),
    "deletion_method":    deletion_method.as_str(),
    "checksum_before":    checksum_before,
    "legal_hold_blocked": legal_hold_blocked,
    "job_id":             job_id,
    "reason":             reason,
  })
}
