//! Graph states: an output handle plus the process metadata a frontend
//! root carries (arguments, environment, working directory).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::consts::{CAP_CONSTRAINTS, CAP_META_IGNORE_CACHE, CAP_PLATFORM};
use crate::llb::constraints::Constraints;
use crate::llb::definition::Definition;
use crate::llb::types::{LlbError, Op, OpMetadata};
use crate::llb::vertex::{Output, Vertex};
use crate::util::hash::Digest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessMeta {
  pub args: Vec<String>,
  /// `KEY=value` pairs, in insertion order.
  pub env: Vec<String>,
  pub dir: String,
}

/// An opaque graph-construction value. Its only graph-observable property is
/// its output handle; `None` means "no-op" (scratch).
#[derive(Debug, Clone, Default)]
pub struct State {
  output: Option<Output>,
  meta: ProcessMeta,
}

impl State {
  pub fn new(output: Option<Output>) -> Self {
    Self {
      output,
      meta: ProcessMeta::default(),
    }
  }

  /// A state with no output.
  pub fn scratch() -> Self {
    Self::default()
  }

  pub fn output(&self) -> Option<&Output> {
    self.output.as_ref()
  }

  pub fn args(&self) -> &[String] {
    &self.meta.args
  }

  pub fn env(&self) -> &[String] {
    &self.meta.env
  }

  pub fn dir(&self) -> &str {
    &self.meta.dir
  }

  pub fn with_args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.meta.args = args.into_iter().map(Into::into).collect();
    self
  }

  /// Set `key` in the environment, replacing an earlier value.
  pub fn add_env(mut self, key: &str, value: &str) -> Self {
    let prefix = format!("{}=", key);
    self.meta.env.retain(|entry| !entry.starts_with(&prefix));
    self.meta.env.push(format!("{}{}", prefix, value));
    self
  }

  pub fn with_dir(mut self, dir: &str) -> Self {
    self.meta.dir = dir.to_string();
    self
  }

  /// Serialize the whole graph reachable from this state's output.
  ///
  /// Records are emitted dependencies-first, each digest at most once, and
  /// followed by a synthetic terminal record whose only input is this state's
  /// output. A state with no output marshals to an empty definition.
  pub fn marshal(&self, constraints: &Constraints) -> Result<Definition, LlbError> {
    let mut def = Definition::default();
    let Some(output) = &self.output else {
      return Ok(def);
    };

    let mut seen = HashSet::new();
    marshal_vertex(output.vertex(), constraints, &mut def, &mut seen)?;

    let terminal = Op {
      inputs: vec![output.to_input(constraints)?],
      ..Default::default()
    };
    let bytes = terminal.to_bytes()?;
    let digest = Digest::from_bytes(&bytes);

    let mut metadata = OpMetadata::default();
    metadata.caps.insert(CAP_CONSTRAINTS.to_string(), true);
    metadata.caps.insert(CAP_PLATFORM.to_string(), true);
    if def.metadata.values().any(|md| md.ignore_cache) {
      metadata.caps.insert(CAP_META_IGNORE_CACHE.to_string(), true);
    }

    if seen.insert(digest.clone()) {
      def.def.push(bytes);
    }
    def.metadata.insert(digest, metadata);

    debug!(records = def.def.len(), "marshalled definition");
    Ok(def)
  }
}

/// Emit `vertex` after its inputs, skipping any digest already seen.
///
/// Deduplication is by marshalled digest rather than vertex identity:
/// reconstructed vertices are allocated afresh on every `inputs()` call.
fn marshal_vertex(
  vertex: &Arc<dyn Vertex>,
  constraints: &Constraints,
  def: &mut Definition,
  seen: &mut HashSet<Digest>,
) -> Result<(), LlbError> {
  let marshalled = vertex.marshal(constraints)?;
  if !seen.insert(marshalled.digest.clone()) {
    return Ok(());
  }

  for input in vertex.inputs() {
    marshal_vertex(input.vertex(), constraints, def, seen)?;
  }

  def.def.push(marshalled.bytes.to_vec());
  def.metadata.insert(marshalled.digest, marshalled.metadata);
  Ok(())
}
