//! The artifact content storage contract.
//!
//! The retention engine uses this to checksum and hard-delete stored
//! content. Implementations live outside this crate (filesystem-backed and
//! in-memory variants ship with `custodia-engine`).

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata returned by a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlob {
  pub storage_key:  String,
  pub size:         u64,
  /// Lowercase hex SHA-256 of the stored bytes.
  pub hash:         String,
  pub content_type: String,
}

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("blob not found: {0}")]
  NotFound(String),

  #[error("blob io error: {0}")]
  Io(String),
}

impl From<std::io::Error> for BlobError {
  fn from(e: std::io::Error) -> Self {
    BlobError::Io(e.to_string())
  }
}

/// Abstraction over artifact content storage. Implemented for `Arc<B>` so
/// a store can be shared between the engine and other holders.
pub trait BlobStore: Send + Sync {
  fn upload(
    &self,
    bytes: Vec<u8>,
    filename: &str,
    content_type: &str,
  ) -> impl Future<Output = Result<StoredBlob, BlobError>> + Send;

  fn download(
    &self,
    storage_key: &str,
  ) -> impl Future<Output = Result<Vec<u8>, BlobError>> + Send;

  fn delete(
    &self,
    storage_key: &str,
  ) -> impl Future<Output = Result<(), BlobError>> + Send;
}

impl<B: BlobStore> BlobStore for std::sync::Arc<B> {
  async fn upload(
    &self,
    bytes: Vec<u8>,
    filename: &str,
    content_type: &str,
  ) -> Result<StoredBlob, BlobError> {
    (**self).upload(bytes, filename, content_type).await
  }

  async fn download(&self, storage_key: &str) -> Result<Vec<u8>, BlobError> {
    (**self).download(storage_key).await
  }

  async fn delete(&self, storage_key: &str) -> Result<(), BlobError> {
    (**self).delete(storage_key).await
  }
}
