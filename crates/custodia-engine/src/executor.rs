//! [`JobExecutor`] — run a job body under a process-local lock with
//! idempotency deduplication, bounded retries, and run-row bookkeeping.

use std::{future::Future, sync::Arc, time::Instant};

use chrono::{Duration, Utc};
use custodia_core::{
  job::{JobError, JobOptions, JobOutcome, JobRun, JobStatus},
  store::AssuranceStore,
};
use tracing::{info, warn};

use crate::{Error, Result, lock::JobLockManager};

/// How recently an identical successful run must have finished for a new
/// invocation with the same idempotency key to be skipped.
pub const IDEMPOTENCY_WINDOW_SECS: i64 = 60;

/// Persisted error messages are capped so a pathological failure cannot
/// bloat the run table.
const ERROR_MESSAGE_MAX: usize = 1_024;

pub struct JobExecutor<S> {
  store: S,
  locks: Arc<JobLockManager>,
}

impl<S: AssuranceStore> JobExecutor<S> {
  pub fn new(store: S, locks: Arc<JobLockManager>) -> Self {
    Self { store, locks }
  }

  /// Execute `job` under `options`.
  ///
  /// Expected conditions — lock contention, an idempotency skip, exhausted
  /// retries — come back inside the [`JobOutcome`], never as `Err`. Only
  /// infrastructure faults (the store failing) error out.
  ///
  /// Retries run inline in the caller's task: the backoff sleep happens
  /// here, not on a background queue, so the outcome always reflects the
  /// final attempt.
  pub async fn run<T, Fut>(
    &self,
    options: JobOptions,
    mut job: impl FnMut() -> Fut,
  ) -> Result<JobOutcome<T>>
  where
    Fut: Future<Output = std::result::Result<T, JobError>>,
  {
    let started = Instant::now();

    let Some(_guard) = self.locks.acquire(&options.job_name, options.tenant_id)
    else {
      warn!(
        job_name = %options.job_name,
        tenant_id = %options.tenant_id,
        "job rejected: already running"
      );
      return Ok(JobOutcome {
        job_run_id:  None,
        status:      JobStatus::Failed,
        data:        None,
        error:       Some(format!(
          "job '{}' is already running for tenant {}",
          options.job_name, options.tenant_id
        )),
        message:     None,
        duration_ms: started.elapsed().as_millis() as u64,
        attempts:    0,
      });
    };

    if let Some(key) = &options.idempotency_key {
      let since = Utc::now() - Duration::seconds(IDEMPOTENCY_WINDOW_SECS);
      if let Some(prior) = self
        .store
        .recent_success(options.tenant_id, &options.job_name, key, since)
        .await
        .map_err(Error::store)?
      {
        info!(
          job_name = %options.job_name,
          tenant_id = %options.tenant_id,
          prior_run = %prior.id,
          "job skipped: identical run succeeded within the idempotency window"
        );
        return Ok(JobOutcome {
          job_run_id:  Some(prior.id),
          status:      JobStatus::Success,
          data:        None,
          error:       None,
          message:     Some(format!(
            "skipped: run {} with the same idempotency key succeeded recently",
            prior.id
          )),
          duration_ms: started.elapsed().as_millis() as u64,
          attempts:    0,
        });
      }
    }

    // The idempotency key doubles as the run's correlation id, so future
    // invocations can find this run in the dedup lookup.
    let correlation = options
      .idempotency_key
      .clone()
      .or_else(|| options.correlation_id.clone());
    let run = JobRun::started(options.tenant_id, &options.job_name, correlation);
    self
      .store
      .insert_run(run.clone())
      .await
      .map_err(Error::store)?;

    let policy = options.retry_policy;
    let mut attempts: u32 = 0;
    let mut data: Option<T> = None;
    let mut last_error: Option<JobError> = None;

    while attempts <= policy.max_retries {
      if attempts > 0 {
        let delay = policy.delay_ms(attempts - 1);
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
      }
      attempts += 1;

      match job().await {
        Ok(value) => {
          data = Some(value);
          last_error = None;
          break;
        }
        Err(e) => {
          warn!(
            job_name = %options.job_name,
            tenant_id = %options.tenant_id,
            attempt = attempts,
            retryable = e.retryable,
            error = %e.message,
            "job attempt failed"
          );
          let retryable = e.retryable;
          last_error = Some(e);
          if !retryable {
            break;
          }
        }
      }
    }

    let status = if data.is_some() {
      JobStatus::Success
    } else {
      JobStatus::Failed
    };
    let error_message = last_error.map(|e| truncate_message(&e.message));

    self
      .store
      .finalize_run(run.id, status, Utc::now(), error_message.clone())
      .await
      .map_err(Error::store)?;

    Ok(JobOutcome {
      job_run_id: Some(run.id),
      status,
      data,
      error: error_message,
      message: None,
      duration_ms: started.elapsed().as_millis() as u64,
      attempts,
    })
  }
}

fn truncate_message(message: &str) -> String {
  if message.len() <= ERROR_MESSAGE_MAX {
    return message.to_owned();
  }
  let mut end = ERROR_MESSAGE_MAX;
  while !message.is_char_boundary(end) {
    end -= 1;
  }
  message[..end].to_owned()
}
