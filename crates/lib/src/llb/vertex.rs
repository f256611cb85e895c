//! Graph vertices and the output handles that connect them.

use std::fmt;
use std::sync::Arc;

use crate::llb::constraints::Constraints;
use crate::llb::marshal::Marshalled;
use crate::llb::types::{Input, LlbError, OutputIndex};
use crate::platform::Platform;

/// A node in the build graph.
///
/// Identity is derived from the marshalled bytes: two vertices that marshal
/// to the same bytes under the same constraints are interchangeable.
pub trait Vertex: Send + Sync + fmt::Debug {
  /// Check internal consistency before marshalling.
  fn validate(&self) -> Result<(), LlbError>;

  /// Serialize this node under `constraints`. Repeated calls with equal
  /// constraints must return byte-identical results.
  fn marshal(&self, constraints: &Constraints) -> Result<Marshalled, LlbError>;

  /// Ordered inputs of this node.
  fn inputs(&self) -> Vec<Output>;
}

/// A handle to one result slot of a vertex.
#[derive(Clone)]
pub struct Output {
  vertex: Arc<dyn Vertex>,
  index: OutputIndex,
  platform: Option<Platform>,
}

impl Output {
  pub fn new(vertex: Arc<dyn Vertex>, index: OutputIndex, platform: Option<Platform>) -> Self {
    Self {
      vertex,
      index,
      platform,
    }
  }

  pub fn vertex(&self) -> &Arc<dyn Vertex> {
    &self.vertex
  }

  pub fn index(&self) -> OutputIndex {
    self.index
  }

  pub fn platform(&self) -> Option<&Platform> {
    self.platform.as_ref()
  }

  /// Convert into a serializable reference by marshalling the owning vertex.
  pub fn to_input(&self, constraints: &Constraints) -> Result<Input, LlbError> {
    let marshalled = self.vertex.marshal(constraints)?;
    Ok(Input {
      digest: marshalled.digest,
      index: self.index,
    })
  }
}

impl fmt::Debug for Output {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Output")
      .field("vertex", &self.vertex)
      .field("index", &self.index)
      .field("platform", &self.platform)
      .finish()
  }
}
