//! Error types for `custodia-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A stored discriminant string did not match any known variant.
  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownDiscriminant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn unknown(kind: &'static str, value: &str) -> Self {
    Self::UnknownDiscriminant { kind, value: value.to_owned() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
