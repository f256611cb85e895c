//! The flat, digest-indexed form of a graph and its reconstruction.
//!
//! A `Definition` has no pointers, only digests, so it can be written to a
//! file or sent over the wire and rebuilt by any process with the same
//! decoder. `DefinitionOp` turns it back into navigable vertices lazily:
//! every reconstructed node shares one read-only table of decoded ops and
//! only differs in the `(digest, index)` coordinate it points at.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llb::constraints::{Constraints, marshal_constraints};
use crate::llb::marshal::{MarshalCache, Marshalled};
use crate::llb::types::{Input, LlbError, Op, OpMetadata, OutputIndex};
use crate::llb::vertex::{Output, Vertex};
use crate::util::hash::Digest;

/// Serialized graph: ordered op records plus per-digest metadata.
///
/// The last record is the synthetic terminal whose first input is the graph's
/// principal output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
  #[serde(with = "hex_records")]
  pub def: Vec<Vec<u8>>,
  #[serde(default)]
  pub metadata: BTreeMap<Digest, OpMetadata>,
}

impl Definition {
  pub fn is_empty(&self) -> bool {
    self.def.is_empty()
  }

  pub fn len(&self) -> usize {
    self.def.len()
  }

  /// Digest of the final (terminal) record.
  pub fn last(&self) -> Option<Digest> {
    self.def.last().map(|dt| Digest::from_bytes(dt))
  }

  /// Digests of every record, in record order.
  pub fn digests(&self) -> impl Iterator<Item = Digest> + '_ {
    self.def.iter().map(|dt| Digest::from_bytes(dt))
  }

  /// The principal output: the terminal record's first input.
  pub fn head(&self) -> Result<Option<Input>, LlbError> {
    let Some(last) = self.def.last() else {
      return Ok(None);
    };
    let terminal = Op::from_bytes(last)?;
    Ok(terminal.inputs.into_iter().next())
  }

  /// Decode every record, keyed by its digest.
  pub fn decode_ops(&self) -> Result<BTreeMap<Digest, Op>, LlbError> {
    self
      .def
      .iter()
      .map(|dt| Ok((Digest::from_bytes(dt), Op::from_bytes(dt)?)))
      .collect()
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>, LlbError> {
    serde_json::to_vec(self).map_err(LlbError::Encode)
  }

  pub fn from_bytes(data: &[u8]) -> Result<Self, LlbError> {
    serde_json::from_slice(data).map_err(LlbError::ParseDefinition)
  }

  pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), LlbError> {
    writer.write_all(&self.to_bytes()?)?;
    writer.flush()?;
    Ok(())
  }

  pub fn read_from<R: Read>(mut reader: R) -> Result<Self, LlbError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Self::from_bytes(&data)
  }
}

/// Records are hex strings on the wire so the file stays plain JSON.
mod hex_records {
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::SerializeSeq};

  pub fn serialize<S: Serializer>(records: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(records.len()))?;
    for record in records {
      seq.serialize_element(&hex::encode(record))?;
    }
    seq.end()
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
    let encoded = Vec::<String>::deserialize(deserializer)?;
    encoded
      .iter()
      .map(|record| hex::decode(record).map_err(D::Error::custom))
      .collect()
  }
}

/// A vertex reconstructed from a `Definition`.
#[derive(Debug)]
pub struct DefinitionOp {
  ops: Arc<BTreeMap<Digest, Op>>,
  metadata: Arc<BTreeMap<Digest, OpMetadata>>,
  last: Option<Digest>,
  digest: Digest,
  index: OutputIndex,
  cache: MarshalCache,
}

impl DefinitionOp {
  /// Decode `def` and point at its principal output: the node and slot the
  /// terminal record refers to.
  ///
  /// An empty definition decodes to an op that fails validation.
  pub fn new(def: &Definition) -> Result<Arc<Self>, LlbError> {
    let mut ops = BTreeMap::new();
    let mut last = None;

    for dt in &def.def {
      let op = Op::from_bytes(dt)?;
      let digest = Digest::from_bytes(dt);
      ops.insert(digest.clone(), op);
      last = Some(digest);
    }

    let (digest, index) = match &last {
      None => (Digest::default(), 0),
      Some(last) => {
        let head = ops.get(last).and_then(|terminal| terminal.inputs.first());
        match head {
          Some(input) => (input.digest.clone(), input.index),
          None => return Err(LlbError::MissingTerminalInput(last.clone())),
        }
      }
    };

    debug!(ops = ops.len(), entry = %digest, index, "decoded definition");

    Ok(Arc::new(Self {
      ops: Arc::new(ops),
      metadata: Arc::new(def.metadata.clone()),
      last,
      digest,
      index,
      cache: MarshalCache::new(),
    }))
  }

  /// A sibling node sharing the same decoded tables.
  fn at(&self, digest: Digest, index: OutputIndex) -> Arc<Self> {
    Arc::new(Self {
      ops: Arc::clone(&self.ops),
      metadata: Arc::clone(&self.metadata),
      last: self.last.clone(),
      digest,
      index,
      cache: MarshalCache::new(),
    })
  }

  pub fn digest(&self) -> &Digest {
    &self.digest
  }

  pub fn index(&self) -> OutputIndex {
    self.index
  }

  /// Digest of the terminal record of the decoded definition.
  pub fn last(&self) -> Option<&Digest> {
    self.last.as_ref()
  }

  pub fn op(&self) -> Option<&Op> {
    self.ops.get(&self.digest)
  }

  /// Whether `other` was decoded from the same definition as `self`.
  pub fn shares_tables_with(&self, other: &DefinitionOp) -> bool {
    Arc::ptr_eq(&self.ops, &other.ops) && Arc::ptr_eq(&self.metadata, &other.metadata)
  }

  /// Output handle for the slot this node points at, or `None` if the entry
  /// digest is not part of the decoded definition.
  pub fn output(self: &Arc<Self>) -> Option<Output> {
    let op = self.op()?;
    let vertex: Arc<dyn Vertex> = self.clone();
    Some(Output::new(vertex, self.index, op.platform.clone()))
  }
}

impl Vertex for DefinitionOp {
  fn validate(&self) -> Result<(), LlbError> {
    if self.ops.is_empty() || self.metadata.is_empty() {
      return Err(LlbError::EmptyDefinition);
    }

    let op = self
      .ops
      .get(&self.digest)
      .ok_or_else(|| LlbError::UnknownOp(self.digest.clone()))?;

    if !self.metadata.contains_key(&self.digest) {
      return Err(LlbError::UnknownMetadata(self.digest.clone()));
    }

    // Leaf ops declare no inputs but still expose slot 0.
    let slots = op.inputs.len().max(1);
    if self.index as usize >= slots {
      return Err(LlbError::InvalidIndex { index: self.index });
    }

    Ok(())
  }

  fn marshal(&self, constraints: &Constraints) -> Result<Marshalled, LlbError> {
    self.cache.get_or_marshal(constraints, || {
      self.validate()?;
      let op = self
        .ops
        .get(&self.digest)
        .ok_or_else(|| LlbError::UnknownOp(self.digest.clone()))?;
      let metadata = self
        .metadata
        .get(&self.digest)
        .ok_or_else(|| LlbError::UnknownMetadata(self.digest.clone()))?;

      // The node reproduces exactly what it was serialized with, so its own
      // recorded constraints take precedence over the caller's.
      let recorded = Constraints {
        platform: op.platform.clone(),
        worker_constraints: op.constraints.as_ref().map(|c| c.filter.clone()).unwrap_or_default(),
        metadata: metadata.clone(),
      };

      let (mut pop, md) = marshal_constraints(constraints, &recorded);
      pop.op = op.op.clone();
      pop.inputs = op.inputs.clone();

      Ok((pop.to_bytes()?, md))
    })
  }

  fn inputs(&self) -> Vec<Output> {
    let Some(op) = self.op() else {
      return Vec::new();
    };

    op.inputs
      .iter()
      .map(|input| {
        let child = self.at(input.digest.clone(), input.index);
        let platform = child.op().and_then(|o| o.platform.clone()).or_else(|| op.platform.clone());
        let vertex: Arc<dyn Vertex> = child;
        Output::new(vertex, input.index, platform)
      })
      .collect()
  }
}
