//! The `AssuranceStore` trait — persistence seam for the assurance core.
//!
//! The trait is implemented by storage backends (e.g.
//! `custodia-store-sqlite`). Higher layers (`custodia-engine`,
//! `custodia-api`) depend on this abstraction, not on any concrete backend.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  approval::{ApprovalRequest, ApprovalStatus, SodPolicy, SodRule},
  job::{JobRun, JobStatus},
  ledger::{ChainAppend, LedgerEntry, LedgerQuery},
  retention::{Artifact, DeletionEvent, DeletionJob, DeletionSummary, LegalHold, RetentionPolicy},
};

/// Abstraction over an assurance-core storage backend.
///
/// Ledger entries and deletion events are append-only; job runs and
/// deletion jobs are finalized exactly once; configuration rows (policies,
/// holds, rules) are plain mutable state.
pub trait AssuranceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Conditionally append `entry` to its tenant's chain.
  ///
  /// The insert only applies when `entry.prev_hash` still matches the
  /// tenant's latest entry hash — a compare-and-swap on the chain tail.
  /// Returns [`ChainAppend::Conflict`] when a concurrent append won the
  /// race; the caller re-derives the entry and retries.
  fn append_entry(
    &self,
    entry: LedgerEntry,
  ) -> impl Future<Output = Result<ChainAppend, Self::Error>> + Send + '_;

  /// The most recent entry of a tenant's chain, by timestamp.
  fn latest_entry(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<LedgerEntry>, Self::Error>> + Send + '_;

  /// All entries for a tenant in timestamp order — the verification scan.
  fn entries(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;

  /// Filtered page of entries for external consumers.
  fn query_entries<'a>(
    &'a self,
    query: &'a LedgerQuery,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + 'a;

  // ── Job runs ──────────────────────────────────────────────────────────

  fn insert_run(
    &self,
    run: JobRun,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Finalize a run exactly once with its terminal status.
  fn finalize_run(
    &self,
    id: Uuid,
    status: JobStatus,
    finished_at: DateTime<Utc>,
    error_message: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_run(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<JobRun>, Self::Error>> + Send + '_;

  /// A successful run of `job_name` for this tenant whose correlation id
  /// equals `correlation_id` and which finished at or after `since`.
  /// The idempotency-window lookup.
  fn recent_success<'a>(
    &'a self,
    tenant_id: Uuid,
    job_name: &'a str,
    correlation_id: &'a str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<JobRun>, Self::Error>> + Send + 'a;

  // ── Retention configuration ───────────────────────────────────────────

  fn upsert_policy(
    &self,
    policy: RetentionPolicy,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn policies(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<RetentionPolicy>, Self::Error>> + Send + '_;

  fn set_legal_hold(
    &self,
    hold: LegalHold,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Holds with `enabled = true` for the tenant. Read once per deletion
  /// run, not per candidate.
  fn active_legal_holds(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LegalHold>, Self::Error>> + Send + '_;

  // ── Artifacts ─────────────────────────────────────────────────────────

  fn register_artifact(
    &self,
    artifact: Artifact,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_artifact(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Artifact>, Self::Error>> + Send + '_;

  /// Discovery: artifacts of `artifact_type` created strictly before
  /// `cutoff`, excluding soft-deleted ones.
  fn artifacts_created_before<'a>(
    &'a self,
    tenant_id: Uuid,
    artifact_type: &'a str,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Artifact>, Self::Error>> + Send + 'a;

  fn soft_delete_artifact(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove the artifact record entirely (hard delete).
  fn remove_artifact(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Deletion bookkeeping ──────────────────────────────────────────────

  fn insert_deletion_job(
    &self,
    job: DeletionJob,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn finalize_deletion_job(
    &self,
    id: Uuid,
    status: JobStatus,
    finished_at: DateTime<Utc>,
    summary: DeletionSummary,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_deletion_job(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DeletionJob>, Self::Error>> + Send + '_;

  fn insert_deletion_event(
    &self,
    event: DeletionEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Deletion events for a tenant, optionally restricted to one job,
  /// oldest first.
  fn deletion_events(
    &self,
    tenant_id: Uuid,
    job_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<DeletionEvent>, Self::Error>> + Send + '_;

  // ── Separation of duties ──────────────────────────────────────────────

  fn sod_policy(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<SodPolicy>, Self::Error>> + Send + '_;

  fn set_sod_policy(
    &self,
    policy: SodPolicy,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn upsert_sod_rule(
    &self,
    rule: SodRule,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn sod_rule<'a>(
    &'a self,
    tenant_id: Uuid,
    rule_id: &'a str,
  ) -> impl Future<Output = Result<Option<SodRule>, Self::Error>> + Send + 'a;

  fn insert_approval(
    &self,
    request: ApprovalRequest,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_approval(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ApprovalRequest>, Self::Error>> + Send + '_;

  fn pending_approvals(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ApprovalRequest>, Self::Error>> + Send + '_;

  /// Stamp a terminal decision onto a pending approval, optionally
  /// replacing the stored reason.
  fn record_decision(
    &self,
    id: Uuid,
    status: ApprovalStatus,
    decided_by: Uuid,
    decided_at: DateTime<Utc>,
    reason: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
