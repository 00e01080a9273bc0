//! Error type for `custodia-engine`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A storage backend failure, boxed so the engine stays generic over the
  /// backend's own error type.
  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("blob store error: {0}")]
  Blob(#[from] custodia_core::blob::BlobError),

  /// The chain-append compare-and-swap lost the race on every attempt.
  #[error("ledger append contention for tenant {tenant_id} after {attempts} attempts")]
  ChainContention { tenant_id: Uuid, attempts: u32 },

  #[error("approval request not found: {0}")]
  ApprovalNotFound(Uuid),

  #[error("approval request already decided: {0}")]
  ApprovalNotPending(Uuid),

  /// The requester tried to decide their own approval. Always rejected,
  /// regardless of tenant SoD configuration.
  #[error("user {0} cannot decide their own approval request")]
  SelfApproval(Uuid),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
