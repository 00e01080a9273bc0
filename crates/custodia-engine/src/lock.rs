//! Process-local job locking.
//!
//! One lock per `(job_name, tenant_id)` pair, held by at most one caller in
//! this process. The scope is a documented limitation: a multi-process
//! deployment needs a distributed lease behind the same interface.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, PoisonError},
};

use uuid::Uuid;

/// Tracks which jobs are currently running. Shared via `Arc` between every
/// executor in the process; never a global.
#[derive(Default)]
pub struct JobLockManager {
  held: Mutex<HashSet<(String, Uuid)>>,
}

impl JobLockManager {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Try to take the lock for `(job_name, tenant_id)`. Returns `None` when
  /// it is already held; the caller fails fast rather than queueing.
  pub fn acquire(
    self: &Arc<Self>,
    job_name: &str,
    tenant_id: Uuid,
  ) -> Option<JobLockGuard> {
    let key = (job_name.to_owned(), tenant_id);
    let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
    if !held.insert(key.clone()) {
      return None;
    }
    Some(JobLockGuard { manager: Arc::clone(self), key })
  }
}

/// Releases the lock on drop, so every exit path — success, error, panic
/// unwind — frees it.
pub struct JobLockGuard {
  manager: Arc<JobLockManager>,
  key:     (String, Uuid),
}

impl Drop for JobLockGuard {
  fn drop(&mut self) {
    self
      .manager
      .held
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.key);
  }
}
