//! Types for executing nested-build ops.
//!
//! This module defines the error type, the collaborator contracts the
//! scheduler and snapshot manager provide, the cache map and the execution
//! configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::consts::{DEFAULT_DEFINITION_FILENAME, DEFINITION_FILENAME_ENV};
use crate::frontend::result::ResultError;
use crate::llb::types::LlbError;
use crate::util::hash::Digest;

/// Errors that can occur while executing a build op.
#[derive(Debug, Error)]
pub enum ExecError {
  /// The op handed to the executor is not a build op.
  #[error("invalid build op: {0}")]
  InvalidOp(String),

  /// The builder input index is out of range for the op's declared inputs.
  #[error("invalid input index {index} ({len} inputs)")]
  InvalidInputIndex { index: usize, len: usize },

  /// The scheduler did not supply a result for the builder input.
  #[error("no input result for builder slot {0}")]
  MissingDefinitionInput(usize),

  /// A predecessor result is not backed by a mountable filesystem.
  #[error("invalid reference for build {0}")]
  InvalidReference(String),

  /// Mounting a filesystem reference failed.
  #[error("failed to mount {id}: {message}")]
  Mount { id: String, message: String },

  /// The definition path does not resolve beneath the mount root.
  #[error("working dir {path} points to invalid target: {source}")]
  InvalidPath {
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// The definition file could not be opened or read.
  #[error("failed to open {}: {source}", path.display())]
  OpenDefinition {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The embedded definition could not be decoded.
  #[error(transparent)]
  Definition(#[from] LlbError),

  /// The nested solve produced an unusable result shape.
  #[error(transparent)]
  Result(#[from] ResultError),

  /// The nested solve produced no primary reference.
  #[error("nested solve returned no result")]
  EmptyResult,

  /// The enclosing build was cancelled.
  #[error("nested solve cancelled")]
  Cancelled,

  /// An error reported by a collaborator, passed through as is.
  #[error(transparent)]
  Delegated(Box<dyn std::error::Error + Send + Sync>),
}

impl ExecError {
  pub fn delegated<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    ExecError::Delegated(Box::new(err))
  }

  /// Whether the outer scheduler may reasonably retry the node.
  ///
  /// Structural and type errors are deterministic and never retryable.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ExecError::Mount { .. } | ExecError::OpenDefinition { .. } | ExecError::Delegated(_)
    )
  }
}

/// What backs a solver result.
pub enum ResultSys<'a> {
  /// A worker-owned, mountable filesystem reference.
  Worker(&'a WorkerRef),
  /// Any other kind of result, named for diagnostics.
  Other(&'a str),
}

/// A result produced by the outer scheduler for one graph node.
#[async_trait]
pub trait SolverResult: Send + Sync + fmt::Debug {
  fn id(&self) -> String;

  fn sys(&self) -> ResultSys<'_>;

  /// Drop this reference. Called for references the nested build does not return.
  async fn release(&self) -> Result<(), ExecError>;
}

/// Shared handle to a solver result.
pub type SolverRef = Arc<dyn SolverResult>;

/// A worker-owned filesystem result.
#[derive(Debug, Clone)]
pub struct WorkerRef {
  pub immutable_ref: Arc<dyn ImmutableRef>,
}

/// A content-addressed, read-only filesystem snapshot.
#[async_trait]
pub trait ImmutableRef: Send + Sync + fmt::Debug {
  fn id(&self) -> String;

  /// Prepare a mount of this snapshot.
  async fn mount(&self, readonly: bool) -> Result<Box<dyn Mountable>, ExecError>;
}

/// A prepared mount that can be attached to a local path.
pub trait Mountable: Send {
  /// Attach the filesystem and return its local root.
  fn mount(&mut self) -> Result<PathBuf, ExecError>;

  fn unmount(&mut self) -> Result<(), ExecError>;
}

/// Cache key contribution of one input.
///
/// Build ops never refine their key from input content, so selectors are
/// always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMapDep {
  pub selector: Option<Digest>,
}

/// Cache key of an op: a digest of its own payload plus one slot per input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMap {
  pub digest: Digest,
  pub deps: Vec<CacheMapDep>,
}

/// Configuration for build op execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
  /// Definition path used when the op records no filename attribute.
  pub definition_filename: String,
}

impl Default for ExecConfig {
  fn default() -> Self {
    Self {
      definition_filename: DEFAULT_DEFINITION_FILENAME.to_string(),
    }
  }
}

impl ExecConfig {
  /// Defaults, with the definition filename overridable through the
  /// `NESTBUILD_DEFINITION_FILENAME` environment variable.
  pub fn from_env() -> Self {
    match std::env::var(DEFINITION_FILENAME_ENV) {
      Ok(filename) if !filename.is_empty() => Self {
        definition_filename: filename,
      },
      _ => Self::default(),
    }
  }
}
