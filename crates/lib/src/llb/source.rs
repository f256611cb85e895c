//! Leaf vertices that import content into the graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::llb::constraints::{Constraints, marshal_constraints};
use crate::llb::marshal::{MarshalCache, Marshalled};
use crate::llb::state::State;
use crate::llb::types::{LlbError, OpKind, SourceSpec};
use crate::llb::vertex::{Output, Vertex};

/// A source op such as `image://alpine:3.20` or `local://context`.
#[derive(Debug)]
pub struct SourceOp {
  identifier: String,
  attrs: BTreeMap<String, String>,
  constraints: Constraints,
  cache: MarshalCache,
}

impl SourceOp {
  pub fn new(identifier: &str, attrs: BTreeMap<String, String>, constraints: Constraints) -> Arc<Self> {
    Arc::new(Self {
      identifier: identifier.to_string(),
      attrs,
      constraints,
      cache: MarshalCache::new(),
    })
  }

  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub fn output(self: &Arc<Self>) -> Output {
    let vertex: Arc<dyn Vertex> = self.clone();
    Output::new(vertex, 0, self.constraints.platform.clone())
  }
}

impl Vertex for SourceOp {
  fn validate(&self) -> Result<(), LlbError> {
    match self.identifier.split_once("://") {
      Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(()),
      _ => Err(LlbError::InvalidSource(format!(
        "identifier {:?} must have the form scheme://ref",
        self.identifier
      ))),
    }
  }

  fn marshal(&self, constraints: &Constraints) -> Result<Marshalled, LlbError> {
    self.cache.get_or_marshal(constraints, || {
      self.validate()?;
      let (mut op, metadata) = marshal_constraints(constraints, &self.constraints);
      op.op = Some(OpKind::Source(SourceSpec {
        identifier: self.identifier.clone(),
        attrs: self.attrs.clone(),
      }));
      Ok((op.to_bytes()?, metadata))
    })
  }

  fn inputs(&self) -> Vec<Output> {
    Vec::new()
  }
}

/// A state whose output is the content named by `identifier`.
pub fn source(identifier: &str) -> State {
  source_with(identifier, BTreeMap::new(), Constraints::default())
}

pub fn source_with(identifier: &str, attrs: BTreeMap<String, String>, constraints: Constraints) -> State {
  State::new(Some(SourceOp::new(identifier, attrs, constraints).output()))
}
