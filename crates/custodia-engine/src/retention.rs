//! [`RetentionEngine`] — policy-driven artifact deletion with legal-hold
//! exemptions and immutable deletion proofs.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use custodia_core::{
  blob::BlobStore,
  canonical::{canonical_json, proof_payload, sha256_hex},
  job::{ActorType, JobError, JobOptions, JobStatus, RetryPolicy},
  ledger::NewLedgerEvent,
  notify::{Notification, NotificationKind, Notifier},
  retention::{
    Artifact, DeleteMode, DeletionEvent, DeletionJob, DeletionMethod,
    DeletionSummary, RetentionPolicy,
  },
  store::AssuranceStore,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
  Error, Result, executor::JobExecutor, ledger::HashChainLedger,
  lock::JobLockManager,
};

/// Job name the executor locks and deduplicates retention runs under.
pub const RETENTION_JOB_NAME: &str = "retention_deletion";

/// At most this many per-candidate failure descriptions are kept on a run;
/// the counts still cover every candidate.
const ERROR_LIST_CAP: usize = 20;

const EXPIRED_REASON: &str = "retention policy expired";
const HOLD_REASON: &str = "blocked by active legal hold";

pub struct RetentionEngine<S, B> {
  store:    S,
  blobs:    B,
  ledger:   HashChainLedger<S>,
  executor: JobExecutor<S>,
  notifier: Arc<dyn Notifier>,
}

impl<S, B> RetentionEngine<S, B>
where
  S: AssuranceStore + Clone,
  B: BlobStore,
{
  pub fn new(
    store: S,
    blobs: B,
    locks: Arc<JobLockManager>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self {
      ledger: HashChainLedger::new(store.clone(), Arc::clone(&notifier)),
      executor: JobExecutor::new(store.clone(), locks),
      store,
      blobs,
      notifier,
    }
  }

  /// Run one deletion pass for `tenant_id` and return the finalized job.
  ///
  /// The `DeletionJob` row is created before anything else, so even a run
  /// rejected for lock contention leaves a finalized `Failed` record. The
  /// batch itself executes through the [`JobExecutor`]; per-candidate
  /// failures are tolerated (partial success is the contract) but make the
  /// batch error permanent — a partially-committed batch must not be
  /// retried, or proofs would be minted twice.
  ///
  /// `now` pins the clock the cutoffs are computed against; `None` uses the
  /// current time. Backdated or deterministic passes supply their own.
  pub async fn run_deletion_job(
    &self,
    tenant_id: Uuid,
    triggered_by: ActorType,
    triggered_user_id: Option<Uuid>,
    now: Option<DateTime<Utc>>,
  ) -> Result<DeletionJob> {
    let mut job = DeletionJob::started(tenant_id, triggered_by, triggered_user_id);
    self
      .store
      .insert_deletion_job(job.clone())
      .await
      .map_err(Error::store)?;

    self.notifier.publish(Notification::new(
      NotificationKind::RetentionJobStarted,
      tenant_id,
      serde_json::json!({ "job_id": job.id }),
    ));

    let mut options = JobOptions::new(RETENTION_JOB_NAME, tenant_id);
    options.retry_policy = RetryPolicy::retention();

    // The batch reports its counts through this cell so they survive a
    // failing (permanent-error) batch.
    let cell = Mutex::new(DeletionSummary::default());
    let job_id = job.id;
    let now = now.unwrap_or_else(Utc::now);
    let outcome = self
      .executor
      .run(options, || self.delete_batch(job_id, tenant_id, now, &cell))
      .await?;

    let mut summary = cell
      .into_inner()
      .unwrap_or_else(PoisonError::into_inner);
    if outcome.status == JobStatus::Failed && summary.errors.is_empty() {
      if let Some(error) = &outcome.error {
        summary.errors.push(error.clone());
      }
    }

    let finished_at = Utc::now();
    self
      .store
      .finalize_deletion_job(job.id, outcome.status, finished_at, summary.clone())
      .await
      .map_err(Error::store)?;

    let (action, kind) = match outcome.status {
      JobStatus::Failed => {
        ("DELETION_JOB_FAILED", NotificationKind::RetentionJobFailed)
      }
      _ => ("DELETION_JOB_COMPLETE", NotificationKind::RetentionJobCompleted),
    };

    let mut event = NewLedgerEvent::system(tenant_id, "deletion_job", action);
    event.entity_id = Some(job.id.to_string());
    event.actor_id = triggered_user_id;
    if triggered_user_id.is_some() {
      event.actor_type = ActorType::User;
    }
    event.diff = serde_json::json!({
      "job_id":    job.id,
      "evaluated": summary.evaluated,
      "deleted":   summary.deleted,
      "blocked":   summary.blocked,
      "errors":    summary.errors.len(),
    });
    self.ledger.append(event).await?;

    self.notifier.publish(Notification::new(
      kind,
      tenant_id,
      serde_json::json!({
        "job_id":    job.id,
        "evaluated": summary.evaluated,
        "deleted":   summary.deleted,
        "blocked":   summary.blocked,
      }),
    ));

    info!(
      %tenant_id,
      job_id = %job.id,
      status = outcome.status.as_str(),
      evaluated = summary.evaluated,
      deleted = summary.deleted,
      blocked = summary.blocked,
      "deletion job finished"
    );

    job.status = outcome.status;
    job.finished_at = Some(finished_at);
    job.summary = summary;
    Ok(job)
  }

  /// One batch attempt: evaluate every enabled policy's expired candidates.
  ///
  /// Policies and active legal holds are read once per batch, not per
  /// candidate. Store reads ahead of any deletion fail transient (a retry
  /// is safe); once candidates have been processed, any failure is
  /// permanent.
  async fn delete_batch(
    &self,
    job_id: Uuid,
    tenant_id: Uuid,
    now: DateTime<Utc>,
    cell: &Mutex<DeletionSummary>,
  ) -> std::result::Result<(), JobError> {
    let policies = self
      .store
      .policies(tenant_id)
      .await
      .map_err(|e| JobError::transient(e.to_string()))?;
    let held_cases: HashSet<Uuid> = self
      .store
      .active_legal_holds(tenant_id)
      .await
      .map_err(|e| JobError::transient(e.to_string()))?
      .into_iter()
      .map(|hold| hold.case_id)
      .collect();

    let mut summary = DeletionSummary::default();

    for policy in policies.into_iter().filter(|p| p.enabled) {
      let candidates = match self
        .store
        .artifacts_created_before(tenant_id, &policy.artifact_type, policy.cutoff(now))
        .await
      {
        Ok(candidates) => candidates,
        Err(e) => {
          // A retry is only safe while nothing has been processed yet;
          // afterwards it would re-evaluate earlier policies' candidates
          // and mint their proofs twice.
          let message =
            format!("discovery failed for {}: {e}", policy.artifact_type);
          let error = if summary.evaluated > 0 {
            JobError::permanent(message)
          } else {
            JobError::transient(message)
          };
          *cell.lock().unwrap_or_else(PoisonError::into_inner) = summary;
          return Err(error);
        }
      };

      for artifact in candidates {
        summary.evaluated += 1;

        let on_hold = policy.legal_hold_respects
          && artifact
            .case_id
            .is_some_and(|case| held_cases.contains(&case));

        let result = if on_hold {
          self.block_candidate(job_id, &policy, &artifact).await
        } else {
          self.delete_candidate(job_id, &policy, &artifact).await
        };

        match result {
          Ok(()) if on_hold => summary.blocked += 1,
          Ok(()) => summary.deleted += 1,
          Err(e) => {
            error!(
              %tenant_id,
              artifact_id = %artifact.id,
              error = %e,
              "candidate deletion failed, continuing batch"
            );
            if summary.errors.len() < ERROR_LIST_CAP {
              summary.errors.push(format!("artifact {}: {e}", artifact.id));
            }
          }
        }
      }
    }

    let failed = !summary.errors.is_empty();
    let failure = format!(
      "{} of {} candidates failed",
      summary.errors.len(),
      summary.evaluated
    );
    *cell.lock().unwrap_or_else(PoisonError::into_inner) = summary;

    if failed {
      // Deletions already committed; re-running would duplicate proofs.
      return Err(JobError::permanent(failure));
    }
    Ok(())
  }

  async fn delete_candidate(
    &self,
    job_id: Uuid,
    policy: &RetentionPolicy,
    artifact: &Artifact,
  ) -> Result<()> {
    let deleted_at = Utc::now();

    let (method, checksum_before) = match policy.delete_mode {
      DeleteMode::HardDelete => {
        // Checksum the content before it is destroyed, so the proof can be
        // disputed after the bytes are gone.
        let checksum = match &artifact.storage_key {
          Some(key) => {
            let bytes = self.blobs.download(key).await?;
            Some(sha256_hex(&bytes))
          }
          None => None,
        };
        if let Some(key) = &artifact.storage_key {
          self.blobs.delete(key).await?;
        }
        self
          .store
          .remove_artifact(artifact.id)
          .await
          .map_err(Error::store)?;
        (DeletionMethod::Hard, checksum)
      }
      DeleteMode::SoftDelete => {
        self
          .store
          .soft_delete_artifact(artifact.id, deleted_at)
          .await
          .map_err(Error::store)?;
        (DeletionMethod::Soft, None)
      }
    };

    let event = proof_event(
      job_id,
      artifact,
      method,
      checksum_before,
      deleted_at,
      false,
      EXPIRED_REASON,
    );
    let event_id = event.id;
    self
      .store
      .insert_deletion_event(event)
      .await
      .map_err(Error::store)?;

    self.notifier.publish(Notification::new(
      NotificationKind::DeletionEventCreated,
      artifact.tenant_id,
      serde_json::json!({
        "event_id":    event_id,
        "artifact_id": artifact.id,
        "method":      method.as_str(),
      }),
    ));
    Ok(())
  }

  /// Record that a due artifact was exempted by a legal hold. Nothing is
  /// deleted; the event is the evidence that retention saw and skipped it.
  async fn block_candidate(
    &self,
    job_id: Uuid,
    policy: &RetentionPolicy,
    artifact: &Artifact,
  ) -> Result<()> {
    let method = match policy.delete_mode {
      DeleteMode::HardDelete => DeletionMethod::Hard,
      DeleteMode::SoftDelete => DeletionMethod::Soft,
    };
    let event = proof_event(
      job_id,
      artifact,
      method,
      None,
      Utc::now(),
      true,
      HOLD_REASON,
    );
    self
      .store
      .insert_deletion_event(event)
      .await
      .map_err(Error::store)?;

    self.notifier.publish(Notification::new(
      NotificationKind::DeletionBlockedLegalHold,
      artifact.tenant_id,
      serde_json::json!({
        "artifact_id": artifact.id,
        "case_id":     artifact.case_id,
      }),
    ));
    Ok(())
  }
}

/// Build a deletion event whose `proof_hash` is the canonical SHA-256 of
/// the decision payload. Standalone, not chained: each proof verifies on
/// its own.
fn proof_event(
  job_id: Uuid,
  artifact: &Artifact,
  method: DeletionMethod,
  checksum_before: Option<String>,
  deleted_at: chrono::DateTime<Utc>,
  legal_hold_blocked: bool,
  reason: &str,
) -> DeletionEvent {
  let payload = proof_payload(
    artifact.tenant_id,
    &artifact.artifact_type,
    artifact.id,
    artifact.case_id,
    artifact.storage_key.as_deref(),
    deleted_at,
    method,
    checksum_before.as_deref(),
    job_id,
    legal_hold_blocked,
    reason,
  );
  let proof_hash = sha256_hex(canonical_json(&payload).as_bytes());

  DeletionEvent {
    id: Uuid::new_v4(),
    tenant_id: artifact.tenant_id,
    artifact_type: artifact.artifact_type.clone(),
    artifact_id: artifact.id,
    case_id: artifact.case_id,
    storage_key: artifact.storage_key.clone(),
    deleted_at,
    deletion_method: method,
    checksum_before,
    proof_hash,
    job_id,
    legal_hold_blocked,
    reason: reason.to_owned(),
  }
}
