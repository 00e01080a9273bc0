//! Blob store implementations: filesystem-backed and in-memory.

use std::{
  collections::HashMap,
  path::PathBuf,
  sync::{Mutex, PoisonError},
};

use custodia_core::{
  blob::{BlobError, BlobStore, StoredBlob},
  canonical::sha256_hex,
};
use uuid::Uuid;

// ─── Filesystem ──────────────────────────────────────────────────────────────

/// Stores blobs as flat files under a root directory. Keys are generated on
/// upload and never contain path separators, so a stored key can never
/// escape the root.
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
    let root = root.into();
    tokio::fs::create_dir_all(&root).await?;
    Ok(Self { root })
  }

  fn path_for(&self, storage_key: &str) -> Result<PathBuf, BlobError> {
    if storage_key.is_empty()
      || storage_key.contains(['/', '\\'])
      || storage_key.contains("..")
    {
      return Err(BlobError::Io(format!("invalid storage key: {storage_key}")));
    }
    Ok(self.root.join(storage_key))
  }
}

impl BlobStore for FsBlobStore {
  async fn upload(
    &self,
    bytes: Vec<u8>,
    filename: &str,
    content_type: &str,
  ) -> Result<StoredBlob, BlobError> {
    // Only the final path component of the caller's filename survives.
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let storage_key = format!("{}-{}", Uuid::new_v4(), name);
    let hash = sha256_hex(&bytes);
    let size = bytes.len() as u64;

    tokio::fs::write(self.path_for(&storage_key)?, &bytes).await?;

    Ok(StoredBlob {
      storage_key,
      size,
      hash,
      content_type: content_type.to_owned(),
    })
  }

  async fn download(&self, storage_key: &str) -> Result<Vec<u8>, BlobError> {
    let path = self.path_for(storage_key)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(BlobError::NotFound(storage_key.to_owned()))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn delete(&self, storage_key: &str) -> Result<(), BlobError> {
    let path = self.path_for(storage_key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(BlobError::NotFound(storage_key.to_owned()))
      }
      Err(e) => Err(e.into()),
    }
  }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// Mutex-guarded map. Used by tests and small deployments.
#[derive(Default)]
pub struct MemoryBlobStore {
  blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a blob under a known key, bypassing upload key generation.
  pub fn insert(&self, storage_key: &str, bytes: Vec<u8>) {
    self
      .blobs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(storage_key.to_owned(), bytes);
  }

  pub fn contains(&self, storage_key: &str) -> bool {
    self
      .blobs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(storage_key)
  }
}

impl BlobStore for MemoryBlobStore {
  async fn upload(
    &self,
    bytes: Vec<u8>,
    filename: &str,
    content_type: &str,
  ) -> Result<StoredBlob, BlobError> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let storage_key = format!("{}-{}", Uuid::new_v4(), name);
    let hash = sha256_hex(&bytes);
    let size = bytes.len() as u64;
    self
      .blobs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(storage_key.clone(), bytes);
    Ok(StoredBlob {
      storage_key,
      size,
      hash,
      content_type: content_type.to_owned(),
    })
  }

  async fn download(&self, storage_key: &str) -> Result<Vec<u8>, BlobError> {
    self
      .blobs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(storage_key)
      .cloned()
      .ok_or_else(|| BlobError::NotFound(storage_key.to_owned()))
  }

  async fn delete(&self, storage_key: &str) -> Result<(), BlobError> {
    self
      .blobs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(storage_key)
      .map(|_| ())
      .ok_or_else(|| BlobError::NotFound(storage_key.to_owned()))
  }
}
