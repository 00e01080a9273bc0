//! CSV export of deletion events for auditors.

use custodia_core::{canonical::canonical_timestamp, retention::DeletionEvent};

const HEADER: &str = "id,tenant_id,artifact_type,artifact_id,case_id,\
   storage_key,deleted_at,deletion_method,checksum_before,proof_hash,job_id,\
   legal_hold_blocked,reason";

/// Render deletion events as RFC 4180 CSV: header row plus one line per
/// event, CRLF line endings, fields quoted only when they contain a comma,
/// quote, or line break.
pub fn deletion_events_csv(events: &[DeletionEvent]) -> String {
  let mut out = String::with_capacity(64 + events.len() * 128);
  out.push_str(HEADER);
  out.push_str("\r\n");

  for event in events {
    let fields = [
      event.id.to_string(),
      event.tenant_id.to_string(),
      event.artifact_type.clone(),
      event.artifact_id.to_string(),
      event.case_id.map(|id| id.to_string()).unwrap_or_default(),
      event.storage_key.clone().unwrap_or_default(),
      canonical_timestamp(event.deleted_at),
      event.deletion_method.as_str().to_owned(),
      event.checksum_before.clone().unwrap_or_default(),
      event.proof_hash.clone(),
      event.job_id.to_string(),
      event.legal_hold_blocked.to_string(),
      event.reason.clone(),
    ];
    for (i, field) in fields.iter().enumerate() {
      if i > 0 {
        out.push(',');
      }
      push_field(&mut out, field);
    }
    out.push_str("\r\n");
  }

  out
}

fn push_field(out: &mut String, field: &str) {
  if field.contains([',', '"', '\n', '\r']) {
    out.push('"');
    out.push_str(&field.replace('"', "\"\""));
    out.push('"');
  } else {
    out.push_str(field);
  }
}
