//! [`HashChainLedger`] — append, verify, and query the per-tenant audit
//! chain.

use std::sync::Arc;

use chrono::Utc;
use custodia_core::{
  canonical::{canonical_json, chain_hash, ledger_payload},
  ledger::{ChainAppend, LedgerEntry, LedgerQuery, NewLedgerEvent, VerifyReport},
  notify::{Notification, NotificationKind, Notifier},
  store::AssuranceStore,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{Error, Result};

/// Appends beyond this give up; sustained contention on one tenant's chain
/// means something upstream is misbehaving.
const MAX_APPEND_ATTEMPTS: u32 = 5;

/// The tamper-evident audit log. Each tenant has an independent chain;
/// every append links the new entry to the tenant's current tail via a
/// compare-and-swap in the store.
pub struct HashChainLedger<S> {
  store:    S,
  notifier: Arc<dyn Notifier>,
}

impl<S: AssuranceStore> HashChainLedger<S> {
  pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
    Self { store, notifier }
  }

  /// Append `event` to its tenant's chain. The id, timestamp, `prev_hash`,
  /// and `hash` are assigned here; callers never supply them.
  ///
  /// On a compare-and-swap conflict the whole derivation is redone against
  /// the new tail — re-pointing the prepared entry would hash the wrong
  /// predecessor.
  pub async fn append(&self, event: NewLedgerEvent) -> Result<LedgerEntry> {
    for attempt in 0..MAX_APPEND_ATTEMPTS {
      let prev_hash = self
        .store
        .latest_entry(event.tenant_id)
        .await
        .map_err(Error::store)?
        .map(|tail| tail.hash);

      let timestamp = Utc::now();
      let payload = ledger_payload(
        event.tenant_id,
        &event.entity_type,
        event.entity_id.as_deref(),
        &event.action,
        event.actor_id,
        event.actor_type,
        timestamp,
        &event.diff,
        &event.metadata,
      );
      let hash = chain_hash(prev_hash.as_deref(), &canonical_json(&payload));

      let entry = LedgerEntry {
        id: Uuid::new_v4(),
        tenant_id: event.tenant_id,
        entity_type: event.entity_type.clone(),
        entity_id: event.entity_id.clone(),
        action: event.action.clone(),
        actor_id: event.actor_id,
        actor_type: event.actor_type,
        timestamp,
        diff: event.diff.clone(),
        metadata: event.metadata.clone(),
        prev_hash,
        hash,
      };

      match self
        .store
        .append_entry(entry.clone())
        .await
        .map_err(Error::store)?
      {
        ChainAppend::Applied => {
          self.notifier.publish(Notification::new(
            NotificationKind::AuditLogCreated,
            entry.tenant_id,
            serde_json::json!({
              "entry_id": entry.id,
              "action":   entry.action,
            }),
          ));
          return Ok(entry);
        }
        ChainAppend::Conflict => {
          debug!(
            tenant_id = %event.tenant_id,
            attempt,
            "chain append lost the race, re-deriving"
          );
        }
      }
    }

    Err(Error::ChainContention {
      tenant_id: event.tenant_id,
      attempts:  MAX_APPEND_ATTEMPTS,
    })
  }

  /// Walk the tenant's full chain in timestamp order, checking each link
  /// against its predecessor and each hash against a recomputation from the
  /// stored fields. An empty chain is valid.
  pub async fn verify(&self, tenant_id: Uuid) -> Result<VerifyReport> {
    let entries = self.store.entries(tenant_id).await.map_err(Error::store)?;
    let total = entries.len();

    let mut previous: Option<String> = None;
    for (index, entry) in entries.iter().enumerate() {
      if entry.prev_hash != previous {
        return Ok(self.report_invalid(
          tenant_id,
          total,
          index,
          entry,
          "chain break: prev_hash does not match the preceding entry",
        ));
      }

      if entry.expected_hash() != entry.hash {
        return Ok(self.report_invalid(
          tenant_id,
          total,
          index,
          entry,
          "hash mismatch: stored fields do not reproduce the stored hash",
        ));
      }

      previous = Some(entry.hash.clone());
    }

    Ok(VerifyReport::valid(total))
  }

  /// Filtered read of a tenant's entries.
  pub async fn query(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
    self.store.query_entries(query).await.map_err(Error::store)
  }

  fn report_invalid(
    &self,
    tenant_id: Uuid,
    total: usize,
    index: usize,
    entry: &LedgerEntry,
    description: &str,
  ) -> VerifyReport {
    error!(
      %tenant_id,
      index,
      entry_id = %entry.id,
      description,
      "audit chain verification failed"
    );
    self.notifier.publish(Notification::new(
      NotificationKind::AuditIntegrityViolation,
      tenant_id,
      serde_json::json!({
        "entry_id": entry.id,
        "index":    index,
        "error":    description,
      }),
    ));
    VerifyReport::invalid(total, index, entry.id, description.to_owned())
  }
}
