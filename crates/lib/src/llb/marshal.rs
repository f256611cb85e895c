//! Per-node memoization of marshal results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::llb::constraints::Constraints;
use crate::llb::types::{LlbError, OpMetadata};
use crate::util::hash::Digest;

/// A serialized node: its digest, its bytes and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marshalled {
  pub digest: Digest,
  pub bytes: Arc<[u8]>,
  pub metadata: OpMetadata,
}

/// Memoizes a node's marshal result per constraints fingerprint.
///
/// The lock is held across the check and the store, so concurrent callers
/// marshalling with equal constraints observe exactly one serialization.
/// Entries are never replaced once written.
#[derive(Debug, Default)]
pub struct MarshalCache {
  entries: Mutex<HashMap<Digest, Marshalled>>,
}

impl MarshalCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the cached result for `constraints`, or run `marshal` and cache
  /// what it produces. Failures are not cached.
  pub fn get_or_marshal<F>(&self, constraints: &Constraints, marshal: F) -> Result<Marshalled, LlbError>
  where
    F: FnOnce() -> Result<(Vec<u8>, OpMetadata), LlbError>,
  {
    let key = constraints.fingerprint()?;
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(hit) = entries.get(&key) {
      return Ok(hit.clone());
    }

    let (bytes, metadata) = marshal()?;
    let marshalled = Marshalled {
      digest: Digest::from_bytes(&bytes),
      bytes: bytes.into(),
      metadata,
    };
    trace!(digest = %marshalled.digest, key = %key, "marshalled op");
    entries.insert(key, marshalled.clone());
    Ok(marshalled)
  }

  pub fn is_cached(&self, constraints: &Constraints) -> bool {
    let Ok(key) = constraints.fingerprint() else {
      return false;
    };
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(&key)
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
