//! Job run bookkeeping and retry policy types for the job executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Actors ──────────────────────────────────────────────────────────────────

/// Who performed an action: a human user or the system itself.
/// Also used for `DeletionJob::triggered_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActorType {
  User,
  System,
}

impl ActorType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::User => "USER",
      Self::System => "SYSTEM",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "USER" => Ok(Self::User),
      "SYSTEM" => Ok(Self::System),
      other => Err(Error::unknown("actor type", other)),
    }
  }
}

// ─── Job runs ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
  Running,
  Success,
  Failed,
}

impl JobStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Running => "RUNNING",
      Self::Success => "SUCCESS",
      Self::Failed => "FAILED",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "RUNNING" => Ok(Self::Running),
      "SUCCESS" => Ok(Self::Success),
      "FAILED" => Ok(Self::Failed),
      other => Err(Error::unknown("job status", other)),
    }
  }
}

/// One execution of a named, tenant-scoped job. Created in `Running` state
/// at job start and finalized exactly once at job end. Doubles as the
/// idempotency lookup table via `correlation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
  pub id:             Uuid,
  pub tenant_id:      Uuid,
  pub job_name:       String,
  pub status:         JobStatus,
  pub correlation_id: Option<String>,
  pub started_at:     DateTime<Utc>,
  pub finished_at:    Option<DateTime<Utc>>,
  pub error_message:  Option<String>,
}

impl JobRun {
  /// A fresh `Running` row for an execution starting now.
  pub fn started(
    tenant_id: Uuid,
    job_name: &str,
    correlation_id: Option<String>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      tenant_id,
      job_name: job_name.to_owned(),
      status: JobStatus::Running,
      correlation_id,
      started_at: Utc::now(),
      finished_at: None,
      error_message: None,
    }
  }
}

// ─── Retry policy ────────────────────────────────────────────────────────────

/// Bounded exponential backoff: the `n`-th retry (0-based) sleeps
/// `min(initial_delay_ms × multiplier^n, max_delay_ms)` before executing.
///
/// The named presets are configuration for different job classes, not
/// separate algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub max_retries:      u32,
  pub initial_delay_ms: u64,
  pub multiplier:       f64,
  pub max_delay_ms:     u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries:      2,
      initial_delay_ms: 1_000,
      multiplier:       2.0,
      max_delay_ms:     30_000,
    }
  }
}

impl RetryPolicy {
  /// No retries at all; a single attempt decides the run.
  pub fn none() -> Self {
    Self { max_retries: 0, initial_delay_ms: 0, multiplier: 1.0, max_delay_ms: 0 }
  }

  /// Fast retries for webhook-style delivery.
  pub fn webhook() -> Self {
    Self {
      max_retries:      3,
      initial_delay_ms: 200,
      multiplier:       2.0,
      max_delay_ms:     2_000,
    }
  }

  /// Slower cadence for retention runs, which do real work per attempt.
  pub fn retention() -> Self {
    Self {
      max_retries:      2,
      initial_delay_ms: 5_000,
      multiplier:       2.0,
      max_delay_ms:     60_000,
    }
  }

  /// A single near-immediate retry for periodic snapshot jobs.
  pub fn snapshot() -> Self {
    Self { max_retries: 1, initial_delay_ms: 50, multiplier: 1.0, max_delay_ms: 50 }
  }

  /// Backoff before the `retry_index`-th retry (0-based), capped.
  pub fn delay_ms(&self, retry_index: u32) -> u64 {
    let raw =
      self.initial_delay_ms as f64 * self.multiplier.powi(retry_index as i32);
    (raw as u64).min(self.max_delay_ms)
  }
}

// ─── Executor surface ────────────────────────────────────────────────────────

/// Options for one `JobExecutor::run` invocation.
#[derive(Debug, Clone)]
pub struct JobOptions {
  pub job_name:        String,
  pub tenant_id:       Uuid,
  /// Caller-supplied dedup token; looked up against recent successful runs.
  pub idempotency_key: Option<String>,
  pub retry_policy:    RetryPolicy,
  pub correlation_id:  Option<String>,
}

impl JobOptions {
  pub fn new(job_name: &str, tenant_id: Uuid) -> Self {
    Self {
      job_name: job_name.to_owned(),
      tenant_id,
      idempotency_key: None,
      retry_policy: RetryPolicy::default(),
      correlation_id: None,
    }
  }
}

/// What a job body returns on failure. `retryable` decides whether the
/// executor re-attempts under the run's retry policy.
#[derive(Debug, Clone)]
pub struct JobError {
  pub message:   String,
  pub retryable: bool,
}

impl JobError {
  pub fn transient(message: impl Into<String>) -> Self {
    Self { message: message.into(), retryable: true }
  }

  pub fn permanent(message: impl Into<String>) -> Self {
    Self { message: message.into(), retryable: false }
  }
}

/// Structured result handed back to the caller of `JobExecutor::run`.
/// Expected conditions (contention, idempotent skip, exhausted retries) are
/// expressed here, never as `Err`.
#[derive(Debug, Clone)]
pub struct JobOutcome<T> {
  /// `None` when the run was rejected before a row was created (contention).
  pub job_run_id:  Option<Uuid>,
  pub status:      JobStatus,
  pub data:        Option<T>,
  pub error:       Option<String>,
  /// Explanatory note for non-error outcomes, e.g. an idempotency skip.
  pub message:     Option<String>,
  pub duration_ms: u64,
  /// Number of times the job body executed.
  pub attempts:    u32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn delay_grows_and_caps() {
    let p = RetryPolicy {
      max_retries:      5,
      initial_delay_ms: 100,
      multiplier:       2.0,
      max_delay_ms:     350,
    };
    assert_eq!(p.delay_ms(0), 100);
    assert_eq!(p.delay_ms(1), 200);
    assert_eq!(p.delay_ms(2), 350); // capped from 400
    assert_eq!(p.delay_ms(10), 350);
  }

  #[test]
  fn actor_type_roundtrip() {
    for t in [ActorType::User, ActorType::System] {
      assert_eq!(ActorType::parse(t.as_str()).unwrap(), t);
    }
    assert!(ActorType::parse("robot").is_err());
  }
}
