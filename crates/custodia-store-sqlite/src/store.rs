//! [`SqliteStore`] — the SQLite implementation of [`AssuranceStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use custodia_core::{
  approval::{ApprovalRequest, ApprovalStatus, SodPolicy, SodRule},
  job::{JobRun, JobStatus},
  ledger::{ChainAppend, LedgerEntry, LedgerQuery},
  retention::{
    Artifact, DeletionEvent, DeletionJob, DeletionSummary, LegalHold,
    RetentionPolicy,
  },
  store::AssuranceStore,
};

use crate::{
  Error, Result,
  encode::{
    RawApproval, RawArtifact, RawDeletionEvent, RawDeletionJob, RawJobRun,
    RawLedgerEntry, RawLegalHold, RawRetentionPolicy, encode_dt, encode_json,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Custodia assurance store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All
/// closures execute serially on the connection's dedicated thread, which is
/// what makes the chain-append compare-and-swap atomic.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row readers ─────────────────────────────────────────────────────────────

const LEDGER_COLS: &str = "id, tenant_id, entity_type, entity_id, action, \
   actor_id, actor_type, timestamp, diff, metadata, prev_hash, hash";

fn ledger_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLedgerEntry> {
  Ok(RawLedgerEntry {
    id:          row.get(0)?,
    tenant_id:   row.get(1)?,
    entity_type: row.get(2)?,
    entity_id:   row.get(3)?,
    action:      row.get(4)?,
    actor_id:    row.get(5)?,
    actor_type:  row.get(6)?,
    timestamp:   row.get(7)?,
    diff:        row.get(8)?,
    metadata:    row.get(9)?,
    prev_hash:   row.get(10)?,
    hash:        row.get(11)?,
  })
}

const RUN_COLS: &str = "id, tenant_id, job_name, status, correlation_id, \
   started_at, finished_at, error_message";

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawJobRun> {
  Ok(RawJobRun {
    id:             row.get(0)?,
    tenant_id:      row.get(1)?,
    job_name:       row.get(2)?,
    status:         row.get(3)?,
    correlation_id: row.get(4)?,
    started_at:     row.get(5)?,
    finished_at:    row.get(6)?,
    error_message:  row.get(7)?,
  })
}

const EVENT_COLS: &str = "id, tenant_id, artifact_type, artifact_id, case_id, \
   storage_key, deleted_at, deletion_method, checksum_before, proof_hash, \
   job_id, legal_hold_blocked, reason";

fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDeletionEvent> {
  Ok(RawDeletionEvent {
    id:                 row.get(0)?,
    tenant_id:          row.get(1)?,
    artifact_type:      row.get(2)?,
    artifact_id:        row.get(3)?,
    case_id:            row.get(4)?,
    storage_key:        row.get(5)?,
    deleted_at:         row.get(6)?,
    deletion_method:    row.get(7)?,
    checksum_before:    row.get(8)?,
    proof_hash:         row.get(9)?,
    job_id:             row.get(10)?,
    legal_hold_blocked: row.get(11)?,
    reason:             row.get(12)?,
  })
}

fn approval_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawApproval> {
  Ok(RawApproval {
    id:           row.get(0)?,
    tenant_id:    row.get(1)?,
    scope_type:   row.get(2)?,
    scope_id:     row.get(3)?,
    requested_by: row.get(4)?,
    status:       row.get(5)?,
    reason:       row.get(6)?,
    approved_by:  row.get(7)?,
    approved_at:  row.get(8)?,
  })
}

fn artifact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawArtifact> {
  Ok(RawArtifact {
    id:              row.get(0)?,
    tenant_id:       row.get(1)?,
    artifact_type:   row.get(2)?,
    case_id:         row.get(3)?,
    storage_key:     row.get(4)?,
    created_at:      row.get(5)?,
    soft_deleted_at: row.get(6)?,
  })
}

// ─── AssuranceStore impl ─────────────────────────────────────────────────────

impl AssuranceStore for SqliteStore {
  type Error = Error;

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn append_entry(&self, entry: LedgerEntry) -> Result<ChainAppend> {
    let id_str        = encode_uuid(entry.id);
    let tenant_str    = encode_uuid(entry.tenant_id);
    let entity_type   = entry.entity_type;
    let entity_id     = entry.entity_id;
    let action        = entry.action;
    let actor_id_str  = entry.actor_id.map(encode_uuid);
    let actor_type    = entry.actor_type.as_str().to_owned();
    let timestamp_str = encode_dt(entry.timestamp);
    let diff_str      = encode_json(&entry.diff);
    let metadata_str  = encode_json(&entry.metadata);
    let prev_hash     = entry.prev_hash;
    let hash          = entry.hash;

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Compare-and-swap on the chain tail: only insert if the tenant's
        // latest hash is still the one this entry was derived from.
        let latest: Option<String> = tx
          .query_row(
            "SELECT hash FROM ledger_entries
             WHERE tenant_id = ?1
             ORDER BY timestamp DESC LIMIT 1",
            rusqlite::params![tenant_str],
            |r| r.get(0),
          )
          .optional()?;

        if latest.as_deref() != prev_hash.as_deref() {
          return Ok(ChainAppend::Conflict);
        }

        tx.execute(
          "INSERT INTO ledger_entries (
             id, tenant_id, entity_type, entity_id, action,
             actor_id, actor_type, timestamp, diff, metadata,
             prev_hash, hash
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            id_str,
            tenant_str,
            entity_type,
            entity_id,
            action,
            actor_id_str,
            actor_type,
            timestamp_str,
            diff_str,
            metadata_str,
            prev_hash,
            hash,
          ],
        )?;
        tx.commit()?;
        Ok(ChainAppend::Applied)
      })
      .await?;

    Ok(applied)
  }

  async fn latest_entry(&self, tenant_id: Uuid) -> Result<Option<LedgerEntry>> {
    let tenant_str = encode_uuid(tenant_id);

    let raw: Option<RawLedgerEntry> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {LEDGER_COLS} FROM ledger_entries
                 WHERE tenant_id = ?1
                 ORDER BY timestamp DESC LIMIT 1"
              ),
              rusqlite::params![tenant_str],
              ledger_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawLedgerEntry::into_entry).transpose()
  }

  async fn entries(&self, tenant_id: Uuid) -> Result<Vec<LedgerEntry>> {
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawLedgerEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LEDGER_COLS} FROM ledger_entries
           WHERE tenant_id = ?1
           ORDER BY timestamp ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], ledger_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLedgerEntry::into_entry).collect()
  }

  async fn query_entries(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
    use rusqlite::types::Value as Sql;

    // Build WHERE clause dynamically; parameters collected positionally.
    let mut conds: Vec<&'static str> = vec!["tenant_id = ?"];
    let mut params: Vec<Sql> = vec![Sql::Text(encode_uuid(query.tenant_id))];

    if let Some(et) = &query.entity_type {
      conds.push("entity_type = ?");
      params.push(Sql::Text(et.clone()));
    }
    if let Some(ei) = &query.entity_id {
      conds.push("entity_id = ?");
      params.push(Sql::Text(ei.clone()));
    }
    if let Some(a) = &query.action {
      conds.push("action = ?");
      params.push(Sql::Text(a.clone()));
    }
    if let Some(actor) = query.actor_id {
      conds.push("actor_id = ?");
      params.push(Sql::Text(encode_uuid(actor)));
    }
    if let Some(after) = query.recorded_after {
      conds.push("timestamp >= ?");
      params.push(Sql::Text(encode_dt(after)));
    }
    if let Some(before) = query.recorded_before {
      conds.push("timestamp <= ?");
      params.push(Sql::Text(encode_dt(before)));
    }

    params.push(Sql::Integer(query.limit.unwrap_or(100) as i64));
    params.push(Sql::Integer(query.offset.unwrap_or(0) as i64));

    let sql = format!(
      "SELECT {LEDGER_COLS} FROM ledger_entries
       WHERE {}
       ORDER BY timestamp ASC
       LIMIT ? OFFSET ?",
      conds.join(" AND ")
    );

    let raws: Vec<RawLedgerEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), ledger_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLedgerEntry::into_entry).collect()
  }

  // ── Job runs ──────────────────────────────────────────────────────────────

  async fn insert_run(&self, run: JobRun) -> Result<()> {
    let id_str      = encode_uuid(run.id);
    let tenant_str  = encode_uuid(run.tenant_id);
    let job_name    = run.job_name;
    let status      = run.status.as_str().to_owned();
    let correlation = run.correlation_id;
    let started_str = encode_dt(run.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO job_runs (
             id, tenant_id, job_name, status, correlation_id, started_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str, tenant_str, job_name, status, correlation, started_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn finalize_run(
    &self,
    id: Uuid,
    status: JobStatus,
    finished_at: DateTime<Utc>,
    error_message: Option<String>,
  ) -> Result<()> {
    let id_str       = encode_uuid(id);
    let status_str   = status.as_str().to_owned();
    let finished_str = encode_dt(finished_at);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE job_runs
           SET status = ?2, finished_at = ?3, error_message = ?4
           WHERE id = ?1 AND status = 'RUNNING'",
          rusqlite::params![id_str, status_str, finished_str, error_message],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::RowNotFound(id));
    }
    Ok(())
  }

  async fn get_run(&self, id: Uuid) -> Result<Option<JobRun>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawJobRun> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RUN_COLS} FROM job_runs WHERE id = ?1"),
              rusqlite::params![id_str],
              run_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawJobRun::into_run).transpose()
  }

  async fn recent_success(
    &self,
    tenant_id: Uuid,
    job_name: &str,
    correlation_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Option<JobRun>> {
    let tenant_str  = encode_uuid(tenant_id);
    let job_name    = job_name.to_owned();
    let correlation = correlation_id.to_owned();
    let since_str   = encode_dt(since);

    let raw: Option<RawJobRun> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RUN_COLS} FROM job_runs
                 WHERE tenant_id = ?1 AND job_name = ?2
                   AND correlation_id = ?3 AND status = 'SUCCESS'
                   AND finished_at >= ?4
                 ORDER BY finished_at DESC LIMIT 1"
              ),
              rusqlite::params![tenant_str, job_name, correlation, since_str],
              run_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawJobRun::into_run).transpose()
  }

  // ── Retention configuration ───────────────────────────────────────────────

  async fn upsert_policy(&self, policy: RetentionPolicy) -> Result<()> {
    let tenant_str    = encode_uuid(policy.tenant_id);
    let artifact_type = policy.artifact_type;
    let days          = i64::from(policy.retention_days);
    let mode          = policy.delete_mode.as_str().to_owned();
    let respects      = policy.legal_hold_respects;
    let enabled       = policy.enabled;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO retention_policies (
             tenant_id, artifact_type, retention_days, delete_mode,
             legal_hold_respects, enabled
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (tenant_id, artifact_type) DO UPDATE SET
             retention_days = ?3, delete_mode = ?4,
             legal_hold_respects = ?5, enabled = ?6",
          rusqlite::params![tenant_str, artifact_type, days, mode, respects, enabled],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn policies(&self, tenant_id: Uuid) -> Result<Vec<RetentionPolicy>> {
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawRetentionPolicy> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, artifact_type, retention_days, delete_mode,
                  legal_hold_respects, enabled
           FROM retention_policies
           WHERE tenant_id = ?1
           ORDER BY artifact_type ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], |row| {
            Ok(RawRetentionPolicy {
              tenant_id:           row.get(0)?,
              artifact_type:       row.get(1)?,
              retention_days:      row.get(2)?,
              delete_mode:         row.get(3)?,
              legal_hold_respects: row.get(4)?,
              enabled:             row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRetentionPolicy::into_policy).collect()
  }

  async fn set_legal_hold(&self, hold: LegalHold) -> Result<()> {
    let tenant_str = encode_uuid(hold.tenant_id);
    let case_str   = encode_uuid(hold.case_id);
    let enabled    = hold.enabled;
    let reason     = hold.reason;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO legal_holds (tenant_id, case_id, enabled, reason)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (tenant_id, case_id) DO UPDATE SET
             enabled = ?3, reason = ?4",
          rusqlite::params![tenant_str, case_str, enabled, reason],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn active_legal_holds(&self, tenant_id: Uuid) -> Result<Vec<LegalHold>> {
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawLegalHold> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tenant_id, case_id, enabled, reason FROM legal_holds
           WHERE tenant_id = ?1 AND enabled = 1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], |row| {
            Ok(RawLegalHold {
              tenant_id: row.get(0)?,
              case_id:   row.get(1)?,
              enabled:   row.get(2)?,
              reason:    row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLegalHold::into_hold).collect()
  }

  // ── Artifacts ─────────────────────────────────────────────────────────────

  async fn register_artifact(&self, artifact: Artifact) -> Result<()> {
    let id_str        = encode_uuid(artifact.id);
    let tenant_str    = encode_uuid(artifact.tenant_id);
    let artifact_type = artifact.artifact_type;
    let case_str      = artifact.case_id.map(encode_uuid);
    let storage_key   = artifact.storage_key;
    let created_str   = encode_dt(artifact.created_at);
    let soft_str      = artifact.soft_deleted_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO artifacts (
             id, tenant_id, artifact_type, case_id, storage_key,
             created_at, soft_deleted_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str, tenant_str, artifact_type, case_str, storage_key,
            created_str, soft_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawArtifact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, tenant_id, artifact_type, case_id, storage_key,
                      created_at, soft_deleted_at
               FROM artifacts WHERE id = ?1",
              rusqlite::params![id_str],
              artifact_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawArtifact::into_artifact).transpose()
  }

  async fn artifacts_created_before(
    &self,
    tenant_id: Uuid,
    artifact_type: &str,
    cutoff: DateTime<Utc>,
  ) -> Result<Vec<Artifact>> {
    let tenant_str    = encode_uuid(tenant_id);
    let artifact_type = artifact_type.to_owned();
    let cutoff_str    = encode_dt(cutoff);

    let raws: Vec<RawArtifact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, tenant_id, artifact_type, case_id, storage_key,
                  created_at, soft_deleted_at
           FROM artifacts
           WHERE tenant_id = ?1 AND artifact_type = ?2
             AND created_at < ?3 AND soft_deleted_at IS NULL
           ORDER BY created_at ASC",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant_str, artifact_type, cutoff_str],
            artifact_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawArtifact::into_artifact).collect()
  }

  async fn soft_delete_artifact(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE artifacts SET soft_deleted_at = ?2 WHERE id = ?1",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::RowNotFound(id));
    }
    Ok(())
  }

  async fn remove_artifact(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM artifacts WHERE id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::RowNotFound(id));
    }
    Ok(())
  }

  // ── Deletion bookkeeping ──────────────────────────────────────────────────

  async fn insert_deletion_job(&self, job: DeletionJob) -> Result<()> {
    let id_str      = encode_uuid(job.id);
    let tenant_str  = encode_uuid(job.tenant_id);
    let status      = job.status.as_str().to_owned();
    let trigger     = job.triggered_by.as_str().to_owned();
    let user_str    = job.triggered_user_id.map(encode_uuid);
    let started_str = encode_dt(job.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO deletion_jobs (
             id, tenant_id, status, triggered_by, triggered_user_id, started_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, tenant_str, status, trigger, user_str, started_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn finalize_deletion_job(
    &self,
    id: Uuid,
    status: JobStatus,
    finished_at: DateTime<Utc>,
    summary: DeletionSummary,
  ) -> Result<()> {
    let id_str       = encode_uuid(id);
    let status_str   = status.as_str().to_owned();
    let finished_str = encode_dt(finished_at);
    let evaluated    = summary.evaluated as i64;
    let deleted      = summary.deleted as i64;
    let blocked      = summary.blocked as i64;
    let errors_str   = serde_json::to_string(&summary.errors)?;

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE deletion_jobs
           SET status = ?2, finished_at = ?3,
               evaluated = ?4, deleted = ?5, blocked = ?6, errors = ?7
           WHERE id = ?1 AND status = 'RUNNING'",
          rusqlite::params![
            id_str, status_str, finished_str, evaluated, deleted, blocked,
            errors_str,
          ],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::RowNotFound(id));
    }
    Ok(())
  }

  async fn get_deletion_job(&self, id: Uuid) -> Result<Option<DeletionJob>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawDeletionJob> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, tenant_id, status, triggered_by, triggered_user_id,
                      started_at, finished_at, evaluated, deleted, blocked, errors
               FROM deletion_jobs WHERE id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawDeletionJob {
                  id:                row.get(0)?,
                  tenant_id:         row.get(1)?,
                  status:            row.get(2)?,
                  triggered_by:      row.get(3)?,
                  triggered_user_id: row.get(4)?,
                  started_at:        row.get(5)?,
                  finished_at:       row.get(6)?,
                  evaluated:         row.get(7)?,
                  deleted:           row.get(8)?,
                  blocked:           row.get(9)?,
                  errors:            row.get(10)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDeletionJob::into_job).transpose()
  }

  async fn insert_deletion_event(&self, event: DeletionEvent) -> Result<()> {
    let id_str        = encode_uuid(event.id);
    let tenant_str    = encode_uuid(event.tenant_id);
    let artifact_type = event.artifact_type;
    let artifact_str  = encode_uuid(event.artifact_id);
    let case_str      = event.case_id.map(encode_uuid);
    let storage_key   = event.storage_key;
    let deleted_str   = encode_dt(event.deleted_at);
    let method        = event.deletion_method.as_str().to_owned();
    let checksum      = event.checksum_before;
    let proof         = event.proof_hash;
    let job_str       = encode_uuid(event.job_id);
    let blocked       = event.legal_hold_blocked;
    let reason        = event.reason;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO deletion_events (
             id, tenant_id, artifact_type, artifact_id, case_id, storage_key,
             deleted_at, deletion_method, checksum_before, proof_hash,
             job_id, legal_hold_blocked, reason
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          rusqlite::params![
            id_str, tenant_str, artifact_type, artifact_str, case_str,
            storage_key, deleted_str, method, checksum, proof, job_str,
            blocked, reason,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn deletion_events(
    &self,
    tenant_id: Uuid,
    job_id: Option<Uuid>,
  ) -> Result<Vec<DeletionEvent>> {
    let tenant_str = encode_uuid(tenant_id);
    let job_str    = job_id.map(encode_uuid);

    let raws: Vec<RawDeletionEvent> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(j) = job_str {
          let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM deletion_events
             WHERE tenant_id = ?1 AND job_id = ?2
             ORDER BY deleted_at ASC"
          ))?;
          stmt
            .query_map(rusqlite::params![tenant_str, j], event_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM deletion_events
             WHERE tenant_id = ?1
             ORDER BY deleted_at ASC"
          ))?;
          stmt
            .query_map(rusqlite::params![tenant_str], event_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDeletionEvent::into_event).collect()
  }

  // ── Separation of duties ──────────────────────────────────────────────────

  async fn sod_policy(&self, tenant_id: Uuid) -> Result<Option<SodPolicy>> {
    let tenant_str = encode_uuid(tenant_id);

    let row: Option<(String, bool)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT tenant_id, enabled FROM sod_policies WHERE tenant_id = ?1",
              rusqlite::params![tenant_str],
              |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    row
      .map(|(tenant, enabled)| {
        Ok(SodPolicy { tenant_id: crate::encode::decode_uuid(&tenant)?, enabled })
      })
      .transpose()
  }

  async fn set_sod_policy(&self, policy: SodPolicy) -> Result<()> {
    let tenant_str = encode_uuid(policy.tenant_id);
    let enabled    = policy.enabled;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sod_policies (tenant_id, enabled) VALUES (?1, ?2)
           ON CONFLICT (tenant_id) DO UPDATE SET enabled = ?2",
          rusqlite::params![tenant_str, enabled],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert_sod_rule(&self, rule: SodRule) -> Result<()> {
    let id          = rule.id;
    let tenant_str  = encode_uuid(rule.tenant_id);
    let name        = rule.name;
    let description = rule.description;
    let enabled     = rule.enabled;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sod_rules (id, tenant_id, name, description, enabled)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (tenant_id, id) DO UPDATE SET
             name = ?3, description = ?4, enabled = ?5",
          rusqlite::params![id, tenant_str, name, description, enabled],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn sod_rule(&self, tenant_id: Uuid, rule_id: &str) -> Result<Option<SodRule>> {
    let tenant_str = encode_uuid(tenant_id);
    let rule_id    = rule_id.to_owned();

    let row: Option<(String, String, String, String, bool)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, tenant_id, name, description, enabled
               FROM sod_rules WHERE tenant_id = ?1 AND id = ?2",
              rusqlite::params![tenant_str, rule_id],
              |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()?,
        )
      })
      .await?;

    row
      .map(|(id, tenant, name, description, enabled)| {
        Ok(SodRule {
          id,
          tenant_id: crate::encode::decode_uuid(&tenant)?,
          name,
          description,
          enabled,
        })
      })
      .transpose()
  }

  async fn insert_approval(&self, request: ApprovalRequest) -> Result<()> {
    let id_str     = encode_uuid(request.id);
    let tenant_str = encode_uuid(request.tenant_id);
    let scope_type = request.scope_type;
    let scope_str  = encode_uuid(request.scope_id);
    let req_by_str = encode_uuid(request.requested_by);
    let status     = request.status.as_str().to_owned();
    let reason     = request.reason;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO approval_requests (
             id, tenant_id, scope_type, scope_id, requested_by, status, reason
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str, tenant_str, scope_type, scope_str, req_by_str, status, reason,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalRequest>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawApproval> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, tenant_id, scope_type, scope_id, requested_by,
                      status, reason, approved_by, approved_at
               FROM approval_requests WHERE id = ?1",
              rusqlite::params![id_str],
              approval_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawApproval::into_request).transpose()
  }

  async fn pending_approvals(&self, tenant_id: Uuid) -> Result<Vec<ApprovalRequest>> {
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawApproval> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, tenant_id, scope_type, scope_id, requested_by,
                  status, reason, approved_by, approved_at
           FROM approval_requests
           WHERE tenant_id = ?1 AND status = 'PENDING'",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], approval_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawApproval::into_request).collect()
  }

  async fn record_decision(
    &self,
    id: Uuid,
    status: ApprovalStatus,
    decided_by: Uuid,
    decided_at: DateTime<Utc>,
    reason: Option<String>,
  ) -> Result<()> {
    let id_str     = encode_uuid(id);
    let status_str = status.as_str().to_owned();
    let by_str     = encode_uuid(decided_by);
    let at_str     = encode_dt(decided_at);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE approval_requests
           SET status = ?2, approved_by = ?3, approved_at = ?4,
               reason = COALESCE(?5, reason)
           WHERE id = ?1 AND status = 'PENDING'",
          rusqlite::params![id_str, status_str, by_str, at_str, reason],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::RowNotFound(id));
    }
    Ok(())
  }
}
