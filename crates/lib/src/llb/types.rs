//! Serialized op model.
//!
//! These are the records that get digested and written into a `Definition`.
//! Every collection is ordered so that serialization is byte-for-byte
//! deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llb::definition::Definition;
use crate::platform::Platform;
use crate::util::hash::Digest;

/// Index of a result slot produced by a node.
pub type OutputIndex = u32;

/// Index into a node's ordered input list.
pub type InputIndex = u32;

/// Errors raised while building, marshalling or decoding a graph.
#[derive(Debug, Error)]
pub enum LlbError {
  #[error("invalid definition op with no ops")]
  EmptyDefinition,

  #[error("invalid definition op with unknown op {0}")]
  UnknownOp(Digest),

  #[error("invalid definition op with unknown metadata {0}")]
  UnknownMetadata(Digest),

  #[error("invalid definition op with invalid index {index}")]
  InvalidIndex { index: OutputIndex },

  #[error("terminal op {0} declares no inputs")]
  MissingTerminalInput(Digest),

  #[error("op {op} references unknown input {input}")]
  DanglingInput { op: Digest, input: Digest },

  #[error("definition contains a dependency cycle")]
  CycleDetected,

  #[error("invalid source op: {0}")]
  InvalidSource(String),

  #[error("failed to parse llb op: {0}")]
  Decode(#[source] serde_json::Error),

  #[error("failed to serialize llb op: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("failed to parse definition: {0}")]
  ParseDefinition(#[source] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Reference to result slot `index` of the op with digest `digest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Input {
  pub digest: Digest,
  pub index: OutputIndex,
}

/// Worker selection filters recorded on an op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConstraints {
  #[serde(default)]
  pub filter: Vec<String>,
}

/// Per-op metadata. Stored beside the op in a definition, never inside the
/// op bytes, so it does not contribute to the op digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpMetadata {
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub ignore_cache: bool,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub description: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub caps: BTreeMap<String, bool>,
}

impl OpMetadata {
  /// Merge `other` into `self`. Descriptions from `other` win, capabilities
  /// accumulate and `ignore_cache` is sticky.
  pub fn merge(&mut self, other: &OpMetadata) {
    if other.ignore_cache {
      self.ignore_cache = true;
    }
    for (key, value) in &other.description {
      self.description.insert(key.clone(), value.clone());
    }
    for key in other.caps.keys() {
      self.caps.insert(key.clone(), true);
    }
  }
}

/// A leaf op that imports content from outside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
  pub identifier: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub attrs: BTreeMap<String, String>,
}

/// Payload of a nested-build op.
///
/// The two builders carry disjoint data, so they are separate variants rather
/// than one struct with a discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "builder", rename_all = "snake_case")]
pub enum BuildSpec {
  /// Solve a definition read from the filesystem of input `definition_input`.
  Definition {
    definition_input: InputIndex,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
  },
  /// Run an external frontend whose root filesystem is input `root_input`.
  Frontend {
    root_input: InputIndex,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    cwd: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    defs: BTreeMap<String, Definition>,
  },
}

impl BuildSpec {
  /// The input slot whose filesystem this builder consumes.
  pub fn builder_input(&self) -> InputIndex {
    match self {
      BuildSpec::Definition { definition_input, .. } => *definition_input,
      BuildSpec::Frontend { root_input, .. } => *root_input,
    }
  }

  pub fn attrs(&self) -> &BTreeMap<String, String> {
    match self {
      BuildSpec::Definition { attrs, .. } | BuildSpec::Frontend { attrs, .. } => attrs,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      BuildSpec::Definition { .. } => "definition",
      BuildSpec::Frontend { .. } => "frontend",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
  Source(SourceSpec),
  Build(BuildSpec),
}

/// One serialized graph node. A node with no `op` is the synthetic terminal
/// that marks a definition's principal output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub inputs: Vec<Input>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub op: Option<OpKind>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub platform: Option<Platform>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub constraints: Option<WorkerConstraints>,
}

impl Op {
  pub fn to_bytes(&self) -> Result<Vec<u8>, LlbError> {
    serde_json::to_vec(self).map_err(LlbError::Encode)
  }

  pub fn from_bytes(data: &[u8]) -> Result<Self, LlbError> {
    serde_json::from_slice(data).map_err(LlbError::Decode)
  }

  /// Short label for diagnostics.
  pub fn kind(&self) -> String {
    match &self.op {
      None => "terminal".to_string(),
      Some(OpKind::Source(source)) => format!("source {}", source.identifier),
      Some(OpKind::Build(build)) => format!("build ({})", build.kind()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod op_metadata {
    use super::*;

    #[test]
    fn merge_overrides_descriptions_and_unions_caps() {
      let mut base = OpMetadata::default();
      base.description.insert("a".to_string(), "1".to_string());
      base.caps.insert("x".to_string(), true);

      let mut over = OpMetadata::default();
      over.description.insert("a".to_string(), "2".to_string());
      over.caps.insert("y".to_string(), true);
      over.ignore_cache = true;

      base.merge(&over);

      assert_eq!(base.description["a"], "2");
      assert!(base.caps["x"]);
      assert!(base.caps["y"]);
      assert!(base.ignore_cache);
    }

    #[test]
    fn merge_with_empty_is_identity() {
      let mut md = OpMetadata::default();
      md.description.insert("k".to_string(), "v".to_string());
      let before = md.clone();

      md.merge(&OpMetadata::default());

      assert_eq!(md, before);
    }
  }

  mod op {
    use super::*;

    fn source_op() -> Op {
      Op {
        inputs: vec![],
        op: Some(OpKind::Source(SourceSpec {
          identifier: "local://context".to_string(),
          attrs: BTreeMap::new(),
        })),
        platform: Some(Platform::new("linux", "amd64")),
        constraints: Some(WorkerConstraints::default()),
      }
    }

    #[test]
    fn bytes_roundtrip() {
      let op = source_op();
      let bytes = op.to_bytes().unwrap();
      assert_eq!(Op::from_bytes(&bytes).unwrap(), op);
    }

    #[test]
    fn reserializing_decoded_op_is_stable() {
      let bytes = source_op().to_bytes().unwrap();
      let again = Op::from_bytes(&bytes).unwrap().to_bytes().unwrap();
      assert_eq!(bytes, again);
    }

    #[test]
    fn build_spec_is_tagged_by_builder() {
      let op = Op {
        op: Some(OpKind::Build(BuildSpec::Definition {
          definition_input: 0,
          attrs: BTreeMap::new(),
        })),
        ..Default::default()
      };
      let json = String::from_utf8(op.to_bytes().unwrap()).unwrap();
      assert!(json.contains(r#""builder":"definition""#));
    }

    #[test]
    fn from_bytes_rejects_garbage() {
      assert!(matches!(Op::from_bytes(b"not json"), Err(LlbError::Decode(_))));
    }

    #[test]
    fn terminal_kind_label() {
      assert_eq!(Op::default().kind(), "terminal");
      assert_eq!(source_op().kind(), "source local://context");
    }
  }
}
