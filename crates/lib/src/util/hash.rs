//! Content digests for serialized graph records.
//!
//! This module provides:
//! - `Digest`: a `sha256:<hex>` identifier for a byte sequence
//! - `Hashable`: fingerprinting of any serializable value via its canonical JSON form

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub type HashError = serde_json::Error;

/// A content digest identifying a serialized record.
///
/// # Format
///
/// The digest is the algorithm name, a colon and the lowercase hexadecimal
/// SHA-256 of the content, e.g. `"sha256:9f86d081884c7d65..."`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(pub String);

impl Digest {
  pub const ALGORITHM: &'static str = "sha256";

  /// Digest arbitrary bytes.
  pub fn from_bytes(data: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest(format!("{}:{:x}", Self::ALGORITHM, hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The hex portion of the digest, without the algorithm prefix.
  pub fn encoded(&self) -> &str {
    self.0.split_once(':').map(|(_, hex)| hex).unwrap_or(&self.0)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl std::fmt::Display for Digest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Fingerprint a value by digesting its JSON serialization.
///
/// Implementors must only contain ordered collections (`BTreeMap`, `Vec`) so
/// that equal values always serialize to the same bytes.
pub trait Hashable: Serialize {
  fn compute_digest(&self) -> Result<Digest, HashError> {
    let serialized = serde_json::to_vec(self)?;
    Ok(Digest::from_bytes(&serialized))
  }
}
