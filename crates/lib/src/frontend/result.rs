//! Result of a nested solve.
//!
//! A `SolveResult` is an accumulator: collaborators may populate it
//! incrementally from several tasks, so every field sits behind one lock.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::llb::definition::{Definition, DefinitionOp};
use crate::llb::types::LlbError;
use crate::llb::vertex::Output;

#[derive(Debug, Error)]
pub enum ResultError {
  /// Named references are present but no primary one was set.
  #[error("invalid map result")]
  InvalidMapResult,

  #[error(transparent)]
  Definition(#[from] LlbError),
}

/// Owned contents of a `SolveResult`.
#[derive(Debug, Clone)]
pub struct ResultParts<R> {
  pub reference: Option<R>,
  pub refs: BTreeMap<String, R>,
  pub metadata: BTreeMap<String, Vec<u8>>,
  pub definition: Option<Definition>,
  pub output: Option<Output>,
}

impl<R> Default for ResultParts<R> {
  fn default() -> Self {
    Self {
      reference: None,
      refs: BTreeMap::new(),
      metadata: BTreeMap::new(),
      definition: None,
      output: None,
    }
  }
}

/// A primary reference, named references, metadata and optionally the
/// definition that produced them.
#[derive(Debug)]
pub struct SolveResult<R> {
  parts: Mutex<ResultParts<R>>,
}

impl<R> Default for SolveResult<R> {
  fn default() -> Self {
    Self {
      parts: Mutex::new(ResultParts::default()),
    }
  }
}

impl<R: Clone> SolveResult<R> {
  pub fn new() -> Self {
    Self::default()
  }

  /// A result whose primary reference is `reference`.
  pub fn with_ref(reference: R) -> Self {
    let result = Self::new();
    result.set_ref(reference);
    result
  }

  fn lock(&self) -> MutexGuard<'_, ResultParts<R>> {
    self.parts.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn set_ref(&self, reference: R) {
    self.lock().reference = Some(reference);
  }

  pub fn add_ref(&self, key: &str, reference: R) {
    self.lock().refs.insert(key.to_string(), reference);
  }

  pub fn add_meta(&self, key: &str, value: Vec<u8>) {
    self.lock().metadata.insert(key.to_string(), value);
  }

  /// Record the definition that produced this result and keep its
  /// reconstructed principal output.
  pub fn set_definition(&self, definition: Definition) -> Result<(), ResultError> {
    let op = DefinitionOp::new(&definition)?;
    let output = op.output();
    let mut parts = self.lock();
    parts.definition = Some(definition);
    parts.output = output;
    Ok(())
  }

  pub fn reference(&self) -> Option<R> {
    self.lock().reference.clone()
  }

  pub fn refs(&self) -> BTreeMap<String, R> {
    self.lock().refs.clone()
  }

  pub fn meta(&self, key: &str) -> Option<Vec<u8>> {
    self.lock().metadata.get(key).cloned()
  }

  pub fn definition(&self) -> Option<Definition> {
    self.lock().definition.clone()
  }

  pub fn output(&self) -> Option<Output> {
    self.lock().output.clone()
  }

  /// The primary reference, for callers that expect a single result.
  ///
  /// A result that only carries named references cannot be used this way.
  pub fn single_ref(&self) -> Result<Option<R>, ResultError> {
    let parts = self.lock();
    if !parts.refs.is_empty() && parts.reference.is_none() {
      return Err(ResultError::InvalidMapResult);
    }
    Ok(parts.reference.clone())
  }

  /// Visit the primary reference, then every named one in key order.
  ///
  /// Every reference is visited even after a failure; the first error is
  /// returned.
  pub fn each_ref<E, F>(&self, mut f: F) -> Result<(), E>
  where
    F: FnMut(&R) -> Result<(), E>,
  {
    let parts = self.lock();
    let mut first_err = None;
    for reference in parts.reference.iter().chain(parts.refs.values()) {
      if let Err(err) = f(reference)
        && first_err.is_none()
      {
        first_err = Some(err);
      }
    }
    first_err.map_or(Ok(()), Err)
  }

  pub fn into_parts(self) -> ResultParts<R> {
    self.parts.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}
