//! Engine integration tests against an in-memory SQLite store.

use std::sync::{
  Arc,
  atomic::{AtomicU32, Ordering},
};

use chrono::{DateTime, Duration, Utc};
use custodia_core::{
  approval::{
    ApprovalDecision, ApprovalRequest, ApprovalStatus, SodPolicy, SodRule,
  },
  blob::BlobStore,
  canonical::sha256_hex,
  job::{ActorType, JobError, JobOptions, JobRun, JobStatus, RetryPolicy},
  ledger::{ChainAppend, LedgerEntry, LedgerQuery, NewLedgerEvent},
  notify::Notifier,
  retention::{
    Artifact, DeleteMode, DeletionEvent, DeletionJob, DeletionMethod,
    DeletionSummary, LegalHold, RetentionPolicy,
  },
  store::AssuranceStore,
};
use custodia_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{
  Error,
  approval::{ApprovalGate, SodCheckRequest},
  blob::{FsBlobStore, MemoryBlobStore},
  executor::JobExecutor,
  export::deletion_events_csv,
  ledger::HashChainLedger,
  lock::JobLockManager,
  notify::NullNotifier,
  retention::RetentionEngine,
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn notifier() -> Arc<dyn Notifier> {
  Arc::new(NullNotifier)
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
  RetryPolicy {
    max_retries,
    initial_delay_ms: 1,
    multiplier: 1.0,
    max_delay_ms: 1,
  }
}

// ─── Fault injection ─────────────────────────────────────────────────────────

/// Delegates to the SQLite store while injecting failures the real backend
/// cannot produce on demand: lost chain-append races and discovery read
/// errors.
#[derive(Clone)]
struct FaultyStore {
  inner:              SqliteStore,
  /// Remaining `append_entry` calls to reject with a conflict.
  append_conflicts:   Arc<AtomicU32>,
  /// Artifact type whose discovery reads fail.
  fail_discovery_for: Option<&'static str>,
}

impl FaultyStore {
  fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      append_conflicts: Arc::new(AtomicU32::new(0)),
      fail_discovery_for: None,
    }
  }

  fn failing_discovery_for(mut self, artifact_type: &'static str) -> Self {
    self.fail_discovery_for = Some(artifact_type);
    self
  }
}

impl AssuranceStore for FaultyStore {
  type Error = custodia_store_sqlite::Error;

  async fn append_entry(
    &self,
    entry: LedgerEntry,
  ) -> Result<ChainAppend, Self::Error> {
    if self.append_conflicts.load(Ordering::SeqCst) > 0 {
      self.append_conflicts.fetch_sub(1, Ordering::SeqCst);
      return Ok(ChainAppend::Conflict);
    }
    self.inner.append_entry(entry).await
  }

  async fn artifacts_created_before(
    &self,
    tenant_id: Uuid,
    artifact_type: &str,
    cutoff: DateTime<Utc>,
  ) -> Result<Vec<Artifact>, Self::Error> {
    if self.fail_discovery_for == Some(artifact_type) {
      return Err(custodia_store_sqlite::Error::DateParse(format!(
        "artifact row for {artifact_type}: bad created_at"
      )));
    }
    self
      .inner
      .artifacts_created_before(tenant_id, artifact_type, cutoff)
      .await
  }

  async fn latest_entry(
    &self,
    tenant_id: Uuid,
  ) -> Result<Option<LedgerEntry>, Self::Error> {
    self.inner.latest_entry(tenant_id).await
  }

  async fn entries(
    &self,
    tenant_id: Uuid,
  ) -> Result<Vec<LedgerEntry>, Self::Error> {
    self.inner.entries(tenant_id).await
  }

  async fn query_entries(
    &self,
    query: &LedgerQuery,
  ) -> Result<Vec<LedgerEntry>, Self::Error> {
    self.inner.query_entries(query).await
  }

  async fn insert_run(&self, run: JobRun) -> Result<(), Self::Error> {
    self.inner.insert_run(run).await
  }

  async fn finalize_run(
    &self,
    id: Uuid,
    status: JobStatus,
    finished_at: DateTime<Utc>,
    error_message: Option<String>,
  ) -> Result<(), Self::Error> {
    self
      .inner
      .finalize_run(id, status, finished_at, error_message)
      .await
  }

  async fn get_run(&self, id: Uuid) -> Result<Option<JobRun>, Self::Error> {
    self.inner.get_run(id).await
  }

  async fn recent_success(
    &self,
    tenant_id: Uuid,
    job_name: &str,
    correlation_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Option<JobRun>, Self::Error> {
    self
      .inner
      .recent_success(tenant_id, job_name, correlation_id, since)
      .await
  }

  async fn upsert_policy(
    &self,
    policy: RetentionPolicy,
  ) -> Result<(), Self::Error> {
    self.inner.upsert_policy(policy).await
  }

  async fn policies(
    &self,
    tenant_id: Uuid,
  ) -> Result<Vec<RetentionPolicy>, Self::Error> {
    self.inner.policies(tenant_id).await
  }

  async fn set_legal_hold(&self, hold: LegalHold) -> Result<(), Self::Error> {
    self.inner.set_legal_hold(hold).await
  }

  async fn active_legal_holds(
    &self,
    tenant_id: Uuid,
  ) -> Result<Vec<LegalHold>, Self::Error> {
    self.inner.active_legal_holds(tenant_id).await
  }

  async fn register_artifact(
    &self,
    artifact: Artifact,
  ) -> Result<(), Self::Error> {
    self.inner.register_artifact(artifact).await
  }

  async fn get_artifact(
    &self,
    id: Uuid,
  ) -> Result<Option<Artifact>, Self::Error> {
    self.inner.get_artifact(id).await
  }

  async fn soft_delete_artifact(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<(), Self::Error> {
    self.inner.soft_delete_artifact(id, at).await
  }

  async fn remove_artifact(&self, id: Uuid) -> Result<(), Self::Error> {
    self.inner.remove_artifact(id).await
  }

  async fn insert_deletion_job(
    &self,
    job: DeletionJob,
  ) -> Result<(), Self::Error> {
    self.inner.insert_deletion_job(job).await
  }

  async fn finalize_deletion_job(
    &self,
    id: Uuid,
    status: JobStatus,
    finished_at: DateTime<Utc>,
    summary: DeletionSummary,
  ) -> Result<(), Self::Error> {
    self
      .inner
      .finalize_deletion_job(id, status, finished_at, summary)
      .await
  }

  async fn get_deletion_job(
    &self,
    id: Uuid,
  ) -> Result<Option<DeletionJob>, Self::Error> {
    self.inner.get_deletion_job(id).await
  }

  async fn insert_deletion_event(
    &self,
    event: DeletionEvent,
  ) -> Result<(), Self::Error> {
    self.inner.insert_deletion_event(event).await
  }

  async fn deletion_events(
    &self,
    tenant_id: Uuid,
    job_id: Option<Uuid>,
  ) -> Result<Vec<DeletionEvent>, Self::Error> {
    self.inner.deletion_events(tenant_id, job_id).await
  }

  async fn sod_policy(
    &self,
    tenant_id: Uuid,
  ) -> Result<Option<SodPolicy>, Self::Error> {
    self.inner.sod_policy(tenant_id).await
  }

  async fn set_sod_policy(&self, policy: SodPolicy) -> Result<(), Self::Error> {
    self.inner.set_sod_policy(policy).await
  }

  async fn upsert_sod_rule(&self, rule: SodRule) -> Result<(), Self::Error> {
    self.inner.upsert_sod_rule(rule).await
  }

  async fn sod_rule(
    &self,
    tenant_id: Uuid,
    rule_id: &str,
  ) -> Result<Option<SodRule>, Self::Error> {
    self.inner.sod_rule(tenant_id, rule_id).await
  }

  async fn insert_approval(
    &self,
    request: ApprovalRequest,
  ) -> Result<(), Self::Error> {
    self.inner.insert_approval(request).await
  }

  async fn get_approval(
    &self,
    id: Uuid,
  ) -> Result<Option<ApprovalRequest>, Self::Error> {
    self.inner.get_approval(id).await
  }

  async fn pending_approvals(
    &self,
    tenant_id: Uuid,
  ) -> Result<Vec<ApprovalRequest>, Self::Error> {
    self.inner.pending_approvals(tenant_id).await
  }

  async fn record_decision(
    &self,
    id: Uuid,
    status: ApprovalStatus,
    decided_by: Uuid,
    decided_at: DateTime<Utc>,
    reason: Option<String>,
  ) -> Result<(), Self::Error> {
    self
      .inner
      .record_decision(id, status, decided_by, decided_at, reason)
      .await
  }
}

// ─── HashChainLedger ─────────────────────────────────────────────────────────

fn case_event(tenant_id: Uuid, action: &str) -> NewLedgerEvent {
  let mut event = NewLedgerEvent::system(tenant_id, "case", action);
  event.diff = serde_json::json!({ "field": ["before", "after"] });
  event
}

#[tokio::test]
async fn append_builds_a_linked_chain() {
  let s = store().await;
  let ledger = HashChainLedger::new(s.clone(), notifier());
  let tenant = Uuid::new_v4();

  let e1 = ledger.append(case_event(tenant, "CASE_CREATED")).await.unwrap();
  let e2 = ledger.append(case_event(tenant, "CASE_UPDATED")).await.unwrap();
  let e3 = ledger.append(case_event(tenant, "CASE_CLOSED")).await.unwrap();

  assert!(e1.prev_hash.is_none());
  assert_eq!(e2.prev_hash.as_deref(), Some(e1.hash.as_str()));
  assert_eq!(e3.prev_hash.as_deref(), Some(e2.hash.as_str()));

  let report = ledger.verify(tenant).await.unwrap();
  assert!(report.valid);
  assert_eq!(report.total_entries, 3);
  assert_eq!(report.checked_entries, 3);
}

#[tokio::test]
async fn verify_empty_chain_is_valid() {
  let s = store().await;
  let ledger = HashChainLedger::new(s, notifier());
  let report = ledger.verify(Uuid::new_v4()).await.unwrap();
  assert!(report.valid);
  assert_eq!(report.total_entries, 0);
}

#[tokio::test]
async fn verify_detects_forged_entry() {
  let s = store().await;
  let ledger = HashChainLedger::new(s.clone(), notifier());
  let tenant = Uuid::new_v4();

  let good = ledger.append(case_event(tenant, "CASE_CREATED")).await.unwrap();

  // A forged entry correctly points at the tail (so the CAS accepts it)
  // but its stored hash does not match its stored fields.
  let forged = LedgerEntry {
    id: Uuid::new_v4(),
    tenant_id: tenant,
    entity_type: "case".into(),
    entity_id: None,
    action: "CASE_DELETED".into(),
    actor_id: None,
    actor_type: ActorType::System,
    timestamp: Utc::now(),
    diff: serde_json::Value::Null,
    metadata: serde_json::Value::Null,
    prev_hash: Some(good.hash.clone()),
    hash: "f".repeat(64),
  };
  s.append_entry(forged.clone()).await.unwrap();

  let report = ledger.verify(tenant).await.unwrap();
  assert!(!report.valid);
  assert_eq!(report.total_entries, 2);
  assert_eq!(report.first_invalid_index, Some(1));
  assert_eq!(report.first_invalid_id, Some(forged.id));
  assert!(report.error.unwrap().contains("hash mismatch"));
}

#[tokio::test]
async fn verify_detects_chain_break() {
  let s = store().await;
  let ledger = HashChainLedger::new(s.clone(), notifier());
  let tenant = Uuid::new_v4();

  let e1 = ledger.append(case_event(tenant, "CASE_CREATED")).await.unwrap();
  let tail = ledger.append(case_event(tenant, "CASE_UPDATED")).await.unwrap();

  // A backdated entry pointing at the tail passes the CAS but breaks the
  // link order the verifier walks. Its own hash is self-consistent, so the
  // broken link is the defect reported.
  let mut rogue = LedgerEntry {
    id: Uuid::new_v4(),
    tenant_id: tenant,
    entity_type: "case".into(),
    entity_id: None,
    action: "CASE_REOPENED".into(),
    actor_id: None,
    actor_type: ActorType::System,
    timestamp: e1.timestamp - Duration::seconds(5),
    diff: serde_json::Value::Null,
    metadata: serde_json::Value::Null,
    prev_hash: Some(tail.hash.clone()),
    hash: String::new(),
  };
  rogue.hash = rogue.expected_hash();
  s.append_entry(rogue.clone()).await.unwrap();

  let report = ledger.verify(tenant).await.unwrap();
  assert!(!report.valid);
  assert_eq!(report.total_entries, 3);
  assert_eq!(report.first_invalid_index, Some(0));
  assert_eq!(report.first_invalid_id, Some(rogue.id));
  assert!(report.error.unwrap().contains("chain break"));
}

#[tokio::test]
async fn append_retries_past_a_lost_race() {
  let s = store().await;
  let faulty = FaultyStore::new(s.clone());
  let ledger = HashChainLedger::new(faulty.clone(), notifier());
  let tenant = Uuid::new_v4();

  let first = ledger.append(case_event(tenant, "CASE_CREATED")).await.unwrap();

  // The next append loses the swap twice before it lands; each loss forces
  // a re-derivation against the tail.
  faulty.append_conflicts.store(2, Ordering::SeqCst);
  let second = ledger.append(case_event(tenant, "CASE_UPDATED")).await.unwrap();

  assert_eq!(faulty.append_conflicts.load(Ordering::SeqCst), 0);
  assert_eq!(second.prev_hash.as_deref(), Some(first.hash.as_str()));

  let report = ledger.verify(tenant).await.unwrap();
  assert!(report.valid);
  assert_eq!(report.total_entries, 2);
}

#[tokio::test]
async fn append_gives_up_under_sustained_contention() {
  let s = store().await;
  let faulty = FaultyStore::new(s.clone());
  faulty.append_conflicts.store(u32::MAX, Ordering::SeqCst);
  let ledger = HashChainLedger::new(faulty, notifier());
  let tenant = Uuid::new_v4();

  let result = ledger.append(case_event(tenant, "CASE_CREATED")).await;
  assert!(matches!(result, Err(Error::ChainContention { .. })));
  // Nothing landed on the chain.
  assert!(s.entries(tenant).await.unwrap().is_empty());
}

#[tokio::test]
async fn tenant_chains_are_independent() {
  let s = store().await;
  let ledger = HashChainLedger::new(s.clone(), notifier());
  let (healthy, tampered) = (Uuid::new_v4(), Uuid::new_v4());

  ledger.append(case_event(healthy, "CASE_CREATED")).await.unwrap();
  let tail = ledger.append(case_event(tampered, "CASE_CREATED")).await.unwrap();

  let forged = LedgerEntry {
    id: Uuid::new_v4(),
    tenant_id: tampered,
    entity_type: "case".into(),
    entity_id: None,
    action: "CASE_UPDATED".into(),
    actor_id: None,
    actor_type: ActorType::System,
    timestamp: Utc::now(),
    diff: serde_json::Value::Null,
    metadata: serde_json::Value::Null,
    prev_hash: Some(tail.hash.clone()),
    hash: "0".repeat(64),
  };
  s.append_entry(forged).await.unwrap();

  assert!(!ledger.verify(tampered).await.unwrap().valid);
  assert!(ledger.verify(healthy).await.unwrap().valid);
}

#[tokio::test]
async fn query_passes_filters_through() {
  let s = store().await;
  let ledger = HashChainLedger::new(s, notifier());
  let tenant = Uuid::new_v4();

  ledger.append(case_event(tenant, "CASE_CREATED")).await.unwrap();
  ledger.append(case_event(tenant, "CASE_UPDATED")).await.unwrap();

  let mut query = LedgerQuery::for_tenant(tenant);
  query.action = Some("CASE_UPDATED".into());
  let hits = ledger.query(&query).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].action, "CASE_UPDATED");
}

// ─── JobExecutor ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_run_is_rejected() {
  let s = store().await;
  let locks = JobLockManager::new();
  let executor = JobExecutor::new(s, Arc::clone(&locks));
  let tenant = Uuid::new_v4();

  // Simulate a run in flight by holding the lock directly.
  let _held = locks.acquire("nightly_export", tenant).unwrap();

  let outcome = executor
    .run(JobOptions::new("nightly_export", tenant), || async {
      Ok::<_, JobError>(())
    })
    .await
    .unwrap();

  assert_eq!(outcome.status, JobStatus::Failed);
  assert!(outcome.job_run_id.is_none());
  assert_eq!(outcome.attempts, 0);
  assert!(outcome.error.unwrap().contains("already running"));
}

#[tokio::test]
async fn lock_released_after_run() {
  let s = store().await;
  let locks = JobLockManager::new();
  let executor = JobExecutor::new(s, Arc::clone(&locks));
  let tenant = Uuid::new_v4();

  let first = executor
    .run(JobOptions::new("nightly_export", tenant), || async {
      Ok::<_, JobError>(())
    })
    .await
    .unwrap();
  assert_eq!(first.status, JobStatus::Success);

  // Same pair is free again.
  assert!(locks.acquire("nightly_export", tenant).is_some());
}

#[tokio::test]
async fn idempotency_skips_recent_success() {
  let s = store().await;
  let executor = JobExecutor::new(s, JobLockManager::new());
  let tenant = Uuid::new_v4();
  let executions = Arc::new(AtomicU32::new(0));

  let mut options = JobOptions::new("send_confirmation", tenant);
  options.idempotency_key = Some("request-42".into());

  let counter = Arc::clone(&executions);
  let first = executor
    .run(options.clone(), move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, JobError>("sent")
      }
    })
    .await
    .unwrap();
  assert_eq!(first.status, JobStatus::Success);
  let first_run = first.job_run_id.unwrap();

  let counter = Arc::clone(&executions);
  let second = executor
    .run(options, move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, JobError>("sent")
      }
    })
    .await
    .unwrap();

  assert_eq!(second.status, JobStatus::Success);
  assert_eq!(second.job_run_id, Some(first_run));
  assert!(second.message.unwrap().contains("skipped"));
  assert_eq!(second.attempts, 0);
  assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
  let s = store().await;
  let executor = JobExecutor::new(s.clone(), JobLockManager::new());
  let tenant = Uuid::new_v4();
  let executions = Arc::new(AtomicU32::new(0));

  let mut options = JobOptions::new("flaky_delivery", tenant);
  options.retry_policy = fast_retry(3);

  let counter = Arc::clone(&executions);
  let outcome = executor
    .run(options, move || {
      let counter = Arc::clone(&counter);
      async move {
        // Fails twice, succeeds on the third attempt.
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
          Err(JobError::transient("connection reset"))
        } else {
          Ok("delivered")
        }
      }
    })
    .await
    .unwrap();

  assert_eq!(outcome.status, JobStatus::Success);
  assert_eq!(outcome.attempts, 3);
  assert_eq!(outcome.data, Some("delivered"));

  let run = s.get_run(outcome.job_run_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(run.status, JobStatus::Success);
  assert!(run.error_message.is_none());
}

#[tokio::test]
async fn retries_exhausted_finalizes_failed() {
  let s = store().await;
  let locks = JobLockManager::new();
  let executor = JobExecutor::new(s.clone(), Arc::clone(&locks));
  let tenant = Uuid::new_v4();

  let mut options = JobOptions::new("flaky_delivery", tenant);
  options.retry_policy = fast_retry(2);

  let outcome = executor
    .run(options, || async {
      Err::<(), _>(JobError::transient("still down"))
    })
    .await
    .unwrap();

  assert_eq!(outcome.status, JobStatus::Failed);
  assert_eq!(outcome.attempts, 3); // initial + 2 retries
  assert_eq!(outcome.error.as_deref(), Some("still down"));

  let run = s.get_run(outcome.job_run_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(run.status, JobStatus::Failed);
  assert_eq!(run.error_message.as_deref(), Some("still down"));

  // The lock was released on the failure path too.
  assert!(locks.acquire("flaky_delivery", tenant).is_some());
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
  let s = store().await;
  let executor = JobExecutor::new(s, JobLockManager::new());
  let tenant = Uuid::new_v4();
  let executions = Arc::new(AtomicU32::new(0));

  let mut options = JobOptions::new("flaky_delivery", tenant);
  options.retry_policy = fast_retry(5);

  let counter = Arc::clone(&executions);
  let outcome = executor
    .run(options, move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(JobError::permanent("validation failed"))
      }
    })
    .await
    .unwrap();

  assert_eq!(outcome.status, JobStatus::Failed);
  assert_eq!(outcome.attempts, 1);
  assert_eq!(executions.load(Ordering::SeqCst), 1);
}

// ─── RetentionEngine ─────────────────────────────────────────────────────────

fn policy(tenant_id: Uuid, artifact_type: &str, mode: DeleteMode) -> RetentionPolicy {
  RetentionPolicy {
    tenant_id,
    artifact_type: artifact_type.to_owned(),
    retention_days: 30,
    delete_mode: mode,
    legal_hold_respects: true,
    enabled: true,
  }
}

fn expired_artifact(
  tenant_id: Uuid,
  artifact_type: &str,
  case_id: Option<Uuid>,
  storage_key: Option<&str>,
) -> Artifact {
  Artifact {
    id: Uuid::new_v4(),
    tenant_id,
    artifact_type: artifact_type.to_owned(),
    case_id,
    storage_key: storage_key.map(str::to_owned),
    created_at: Utc::now() - Duration::days(45),
    soft_deleted_at: None,
  }
}

async fn retention_setup(
) -> (SqliteStore, Arc<MemoryBlobStore>, RetentionEngine<SqliteStore, Arc<MemoryBlobStore>>) {
  let s = store().await;
  let blobs = Arc::new(MemoryBlobStore::new());
  let engine = RetentionEngine::new(
    s.clone(),
    Arc::clone(&blobs),
    JobLockManager::new(),
    notifier(),
  );
  (s, blobs, engine)
}

#[tokio::test]
async fn hard_delete_destroys_content_and_records_proof() {
  let (s, blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();

  s.upsert_policy(policy(tenant, "export", DeleteMode::HardDelete))
    .await
    .unwrap();

  let content = b"subject access request export".to_vec();
  blobs.insert("blob-1", content.clone());
  let artifact = expired_artifact(tenant, "export", None, Some("blob-1"));
  s.register_artifact(artifact.clone()).await.unwrap();

  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();

  assert_eq!(job.status, JobStatus::Success);
  assert_eq!(job.summary.evaluated, 1);
  assert_eq!(job.summary.deleted, 1);
  assert_eq!(job.summary.blocked, 0);

  // Content and record are gone.
  assert!(!blobs.contains("blob-1"));
  assert!(s.get_artifact(artifact.id).await.unwrap().is_none());

  // The proof captures the pre-deletion checksum.
  let events = s.deletion_events(tenant, Some(job.id)).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].deletion_method, DeletionMethod::Hard);
  assert_eq!(events[0].checksum_before.as_deref(), Some(sha256_hex(&content).as_str()));
  assert!(!events[0].legal_hold_blocked);
  assert_eq!(events[0].proof_hash.len(), 64);

  // The run is also on the audit chain.
  let mut query = LedgerQuery::for_tenant(tenant);
  query.action = Some("DELETION_JOB_COMPLETE".into());
  let ledger = HashChainLedger::new(s, notifier());
  assert_eq!(ledger.query(&query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn soft_delete_marks_record_and_stops_rediscovery() {
  let (s, _blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();

  s.upsert_policy(policy(tenant, "message", DeleteMode::SoftDelete))
    .await
    .unwrap();
  let artifact = expired_artifact(tenant, "message", None, None);
  s.register_artifact(artifact.clone()).await.unwrap();

  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();
  assert_eq!(job.summary.deleted, 1);

  let stored = s.get_artifact(artifact.id).await.unwrap().unwrap();
  assert!(stored.soft_deleted_at.is_some());

  // A second pass finds nothing: soft-deleted artifacts leave discovery.
  let again = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();
  assert_eq!(again.summary.evaluated, 0);
}

#[tokio::test]
async fn legal_hold_blocks_and_leaves_evidence() {
  let (s, blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();
  let held_case = Uuid::new_v4();

  s.upsert_policy(policy(tenant, "export", DeleteMode::HardDelete))
    .await
    .unwrap();
  s.set_legal_hold(LegalHold {
    tenant_id: tenant,
    case_id:   held_case,
    enabled:   true,
    reason:    Some("litigation".into()),
  })
  .await
  .unwrap();

  blobs.insert("held-blob", b"evidence".to_vec());
  let held = expired_artifact(tenant, "export", Some(held_case), Some("held-blob"));
  let free = expired_artifact(tenant, "export", Some(Uuid::new_v4()), None);
  s.register_artifact(held.clone()).await.unwrap();
  s.register_artifact(free.clone()).await.unwrap();

  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();

  assert_eq!(job.status, JobStatus::Success);
  assert_eq!(job.summary.evaluated, 2);
  assert_eq!(job.summary.deleted, 1);
  assert_eq!(job.summary.blocked, 1);

  // The held artifact and its content survive.
  assert!(s.get_artifact(held.id).await.unwrap().is_some());
  assert!(blobs.contains("held-blob"));
  assert!(s.get_artifact(free.id).await.unwrap().is_none());

  let events = s.deletion_events(tenant, Some(job.id)).await.unwrap();
  let blocked: Vec<_> = events.iter().filter(|e| e.legal_hold_blocked).collect();
  assert_eq!(blocked.len(), 1);
  assert_eq!(blocked[0].artifact_id, held.id);
  assert!(blocked[0].checksum_before.is_none());
}

#[tokio::test]
async fn partial_failure_continues_and_fails_the_job() {
  let (s, blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();

  s.upsert_policy(policy(tenant, "export", DeleteMode::HardDelete))
    .await
    .unwrap();

  // Four deletable artifacts plus one whose content is missing from the
  // blob store, which fails its checksum download.
  let mut good = Vec::new();
  for i in 0..4 {
    let key = format!("blob-{i}");
    blobs.insert(&key, vec![i as u8; 8]);
    let artifact = expired_artifact(tenant, "export", None, Some(&key));
    s.register_artifact(artifact.clone()).await.unwrap();
    good.push(artifact);
  }
  let broken = expired_artifact(tenant, "export", None, Some("missing-blob"));
  s.register_artifact(broken.clone()).await.unwrap();

  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();

  assert_eq!(job.status, JobStatus::Failed);
  assert_eq!(job.summary.evaluated, 5);
  assert_eq!(job.summary.deleted, 4);
  assert_eq!(job.summary.errors.len(), 1);
  assert!(job.summary.errors[0].contains(&broken.id.to_string()));

  // The good deletions committed despite the failure.
  for artifact in &good {
    assert!(s.get_artifact(artifact.id).await.unwrap().is_none());
  }
  assert!(s.get_artifact(broken.id).await.unwrap().is_some());
  assert_eq!(s.deletion_events(tenant, Some(job.id)).await.unwrap().len(), 4);

  // Partial failures are permanent: the batch ran exactly once.
  let run_query = s.get_deletion_job(job.id).await.unwrap().unwrap();
  assert_eq!(run_query.status, JobStatus::Failed);
}

#[tokio::test]
async fn deletion_cutoff_follows_injected_clock() {
  let (s, _blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();

  s.upsert_policy(policy(tenant, "message", DeleteMode::SoftDelete))
    .await
    .unwrap();
  let mut fresh = expired_artifact(tenant, "message", None, None);
  fresh.created_at = Utc::now();
  s.register_artifact(fresh.clone()).await.unwrap();

  // Against the real clock the artifact is inside its retention window.
  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();
  assert_eq!(job.summary.evaluated, 0);

  // Pinning the clock past the window makes it due.
  let pinned = Utc::now() + Duration::days(31);
  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, Some(pinned))
    .await
    .unwrap();
  assert_eq!(job.summary.evaluated, 1);
  assert_eq!(job.summary.deleted, 1);
}

#[tokio::test]
async fn mid_batch_discovery_failure_does_not_remint_proofs() {
  let s = store().await;
  let faulty = FaultyStore::new(s.clone()).failing_discovery_for("message");
  let blobs = Arc::new(MemoryBlobStore::new());
  let engine = RetentionEngine::new(
    faulty,
    Arc::clone(&blobs),
    JobLockManager::new(),
    notifier(),
  );
  let tenant = Uuid::new_v4();

  // The first policy writes a blocked proof for its held candidate; the
  // second policy's discovery then fails.
  s.upsert_policy(policy(tenant, "export", DeleteMode::HardDelete))
    .await
    .unwrap();
  s.upsert_policy(policy(tenant, "message", DeleteMode::SoftDelete))
    .await
    .unwrap();
  let held_case = Uuid::new_v4();
  s.set_legal_hold(LegalHold {
    tenant_id: tenant,
    case_id:   held_case,
    enabled:   true,
    reason:    None,
  })
  .await
  .unwrap();
  s.register_artifact(expired_artifact(tenant, "export", Some(held_case), None))
    .await
    .unwrap();

  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();

  // The run fails without being retried: a retry would re-evaluate the
  // first policy's candidate and mint its blocked proof twice. The counts
  // gathered before the failure survive.
  assert_eq!(job.status, JobStatus::Failed);
  assert_eq!(job.summary.evaluated, 1);
  assert_eq!(job.summary.blocked, 1);
  assert!(job.summary.errors[0].contains("discovery failed"));

  let events = s.deletion_events(tenant, Some(job.id)).await.unwrap();
  assert_eq!(events.len(), 1);
  assert!(events[0].legal_hold_blocked);
}

#[tokio::test]
async fn disabled_policy_is_ignored() {
  let (s, _blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();

  let mut disabled = policy(tenant, "export", DeleteMode::SoftDelete);
  disabled.enabled = false;
  s.upsert_policy(disabled).await.unwrap();
  s.register_artifact(expired_artifact(tenant, "export", None, None))
    .await
    .unwrap();

  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();
  assert_eq!(job.summary.evaluated, 0);
  assert_eq!(job.summary.deleted, 0);
}

// ─── ApprovalGate ────────────────────────────────────────────────────────────

async fn gate_setup(tenant: Uuid) -> (SqliteStore, ApprovalGate<SqliteStore>) {
  let s = store().await;
  s.upsert_sod_rule(SodRule {
    id:          "response_publish".into(),
    tenant_id:   tenant,
    name:        "Response publishing".into(),
    description: "Creator may not publish their own response".into(),
    enabled:     true,
  })
  .await
  .unwrap();
  let gate = ApprovalGate::new(s.clone(), notifier());
  (s, gate)
}

fn check_request(tenant: Uuid, actor: Uuid, creator: Uuid) -> SodCheckRequest {
  SodCheckRequest {
    tenant_id:  tenant,
    rule_id:    "response_publish".into(),
    scope_type: "response".into(),
    scope_id:   Uuid::new_v4(),
    actor_id:   actor,
    creator_id: creator,
    reason:     None,
  }
}

#[tokio::test]
async fn creator_is_blocked_and_approval_created() {
  let tenant = Uuid::new_v4();
  let (s, gate) = gate_setup(tenant).await;
  let user = Uuid::new_v4();

  let check = gate.check(check_request(tenant, user, user)).await.unwrap();
  assert!(!check.allowed);
  assert_eq!(check.violated_rule.as_deref(), Some("response_publish"));

  let approval = s
    .get_approval(check.approval_id.unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(approval.status, ApprovalStatus::Pending);
  assert_eq!(approval.requested_by, user);

  // The violation is on the audit chain.
  let mut query = LedgerQuery::for_tenant(tenant);
  query.action = Some("SOD_VIOLATION".into());
  let ledger = HashChainLedger::new(s, notifier());
  assert_eq!(ledger.query(&query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn different_actor_is_allowed() {
  let tenant = Uuid::new_v4();
  let (_s, gate) = gate_setup(tenant).await;

  let check = gate
    .check(check_request(tenant, Uuid::new_v4(), Uuid::new_v4()))
    .await
    .unwrap();
  assert!(check.allowed);
  assert!(check.approval_id.is_none());
}

#[tokio::test]
async fn disabled_configuration_allows() {
  let tenant = Uuid::new_v4();
  let (s, gate) = gate_setup(tenant).await;
  let user = Uuid::new_v4();

  // Unknown rule id: allow.
  let mut unknown = check_request(tenant, user, user);
  unknown.rule_id = "unknown_rule".into();
  assert!(gate.check(unknown).await.unwrap().allowed);

  // Disabled tenant policy: allow even for the creator.
  s.set_sod_policy(SodPolicy { tenant_id: tenant, enabled: false })
    .await
    .unwrap();
  assert!(gate.check(check_request(tenant, user, user)).await.unwrap().allowed);
}

#[tokio::test]
async fn four_eyes_decision_flow() {
  let tenant = Uuid::new_v4();
  let (s, gate) = gate_setup(tenant).await;
  let creator = Uuid::new_v4();
  let approver = Uuid::new_v4();

  let check = gate.check(check_request(tenant, creator, creator)).await.unwrap();
  let approval_id = check.approval_id.unwrap();

  let decided = gate
    .decide(
      tenant,
      approval_id,
      approver,
      ApprovalDecision::Approve,
      Some("reviewed the response".into()),
    )
    .await
    .unwrap();

  assert_eq!(decided.status, ApprovalStatus::Approved);
  assert_eq!(decided.approved_by, Some(approver));
  assert_eq!(decided.reason, "reviewed the response");

  // A decided request cannot be decided again.
  let again = gate
    .decide(tenant, approval_id, approver, ApprovalDecision::Reject, None)
    .await;
  assert!(matches!(again, Err(Error::ApprovalNotPending(_))));

  let stored = s.get_approval(approval_id).await.unwrap().unwrap();
  assert_eq!(stored.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn self_approval_is_always_rejected() {
  let tenant = Uuid::new_v4();
  let (s, gate) = gate_setup(tenant).await;
  let creator = Uuid::new_v4();

  let check = gate.check(check_request(tenant, creator, creator)).await.unwrap();
  let approval_id = check.approval_id.unwrap();

  let result = gate
    .decide(tenant, approval_id, creator, ApprovalDecision::Approve, None)
    .await;
  assert!(matches!(result, Err(Error::SelfApproval(_))));

  // Still holds with the tenant SoD policy disabled: the block is the
  // gate's own invariant, not a configurable rule.
  s.set_sod_policy(SodPolicy { tenant_id: tenant, enabled: false })
    .await
    .unwrap();
  let result = gate
    .decide(tenant, approval_id, creator, ApprovalDecision::Approve, None)
    .await;
  assert!(matches!(result, Err(Error::SelfApproval(_))));

  // The request is untouched.
  let stored = s.get_approval(approval_id).await.unwrap().unwrap();
  assert_eq!(stored.status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn decide_missing_or_foreign_request_errors() {
  let tenant = Uuid::new_v4();
  let (s, gate) = gate_setup(tenant).await;

  let missing = gate
    .decide(tenant, Uuid::new_v4(), Uuid::new_v4(), ApprovalDecision::Approve, None)
    .await;
  assert!(matches!(missing, Err(Error::ApprovalNotFound(_))));

  // An approval belonging to another tenant looks missing.
  let foreign = ApprovalRequest::pending(
    Uuid::new_v4(),
    "response",
    Uuid::new_v4(),
    Uuid::new_v4(),
    "foreign".into(),
  );
  s.insert_approval(foreign.clone()).await.unwrap();
  let result = gate
    .decide(tenant, foreign.id, Uuid::new_v4(), ApprovalDecision::Approve, None)
    .await;
  assert!(matches!(result, Err(Error::ApprovalNotFound(_))));
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn csv_export_quotes_embedded_delimiters() {
  let (s, _blobs, engine) = retention_setup().await;
  let tenant = Uuid::new_v4();

  s.upsert_policy(policy(tenant, "export", DeleteMode::SoftDelete))
    .await
    .unwrap();
  s.register_artifact(expired_artifact(tenant, "export", None, None))
    .await
    .unwrap();
  let job = engine
    .run_deletion_job(tenant, ActorType::System, None, None)
    .await
    .unwrap();

  let mut events = s.deletion_events(tenant, Some(job.id)).await.unwrap();
  events[0].reason = "expired, see \"policy\"".into();

  let csv = deletion_events_csv(&events);
  let mut lines = csv.split("\r\n");
  let header = lines.next().unwrap();
  assert!(header.starts_with("id,tenant_id,artifact_type"));
  assert!(header.ends_with("legal_hold_blocked,reason"));

  let row = lines.next().unwrap();
  assert!(row.contains("\"expired, see \"\"policy\"\"\""));
  assert!(row.contains("SOFT"));
}

// ─── Blob stores ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn fs_blob_store_roundtrip() {
  let root = std::env::temp_dir().join(format!("custodia-test-{}", Uuid::new_v4()));
  let blobs = FsBlobStore::new(&root).await.unwrap();

  let content = b"attachment bytes".to_vec();
  let stored = blobs
    .upload(content.clone(), "../sneaky/report.pdf", "application/pdf")
    .await
    .unwrap();
  assert_eq!(stored.size, content.len() as u64);
  assert_eq!(stored.hash, sha256_hex(&content));
  // Path components of the filename are stripped from the key.
  assert!(stored.storage_key.ends_with("report.pdf"));
  assert!(!stored.storage_key.contains('/'));

  assert_eq!(blobs.download(&stored.storage_key).await.unwrap(), content);
  blobs.delete(&stored.storage_key).await.unwrap();
  assert!(blobs.download(&stored.storage_key).await.is_err());

  tokio::fs::remove_dir_all(&root).await.ok();
}

#[tokio::test]
async fn memory_blob_store_reports_missing_keys() {
  let blobs = MemoryBlobStore::new();
  assert!(blobs.download("nope").await.is_err());
  assert!(blobs.delete("nope").await.is_err());

  blobs.insert("k", vec![1, 2, 3]);
  assert_eq!(blobs.download("k").await.unwrap(), vec![1, 2, 3]);
  blobs.delete("k").await.unwrap();
  assert!(!blobs.contains("k"));
}
