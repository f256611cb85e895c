//! Ambient marshal-time constraints.

use serde::Serialize;

use crate::consts::DESCRIPTION_CUSTOM_NAME;
use crate::llb::types::{LlbError, Op, OpMetadata, WorkerConstraints};
use crate::platform::Platform;
use crate::util::hash::{Digest, Hashable};

/// Caller-supplied build parameters merged into every node at marshal time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Constraints {
  pub platform: Option<Platform>,
  pub worker_constraints: Vec<String>,
  pub metadata: OpMetadata,
}

impl Hashable for Constraints {}

impl Constraints {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_platform(mut self, platform: Platform) -> Self {
    self.platform = Some(platform);
    self
  }

  pub fn with_worker_constraint(mut self, filter: &str) -> Self {
    self.worker_constraints.push(filter.to_string());
    self
  }

  pub fn with_description(mut self, key: &str, value: &str) -> Self {
    self.metadata.description.insert(key.to_string(), value.to_string());
    self
  }

  /// Human-readable name for the node, shown by progress and inspection tools.
  pub fn with_custom_name(self, name: &str) -> Self {
    self.with_description(DESCRIPTION_CUSTOM_NAME, name)
  }

  pub fn with_cap(mut self, cap: &str) -> Self {
    self.metadata.caps.insert(cap.to_string(), true);
    self
  }

  pub fn ignore_cache(mut self) -> Self {
    self.metadata.ignore_cache = true;
    self
  }

  /// Key under which marshal results for these constraints are cached.
  pub fn fingerprint(&self) -> Result<Digest, LlbError> {
    self.compute_digest().map_err(LlbError::Encode)
  }
}

/// Merge node-level `override_` constraints onto ambient `base` constraints.
///
/// The override platform replaces the base platform, worker filters are
/// appended and metadata is merged. Returns an op skeleton carrying the
/// effective platform and filters, plus the effective metadata.
pub fn marshal_constraints(base: &Constraints, override_: &Constraints) -> (Op, OpMetadata) {
  let platform = override_
    .platform
    .clone()
    .or_else(|| base.platform.clone())
    .unwrap_or_else(Platform::host);

  let mut filter = base.worker_constraints.clone();
  filter.extend(override_.worker_constraints.iter().cloned());

  let mut metadata = base.metadata.clone();
  metadata.merge(&override_.metadata);

  let op = Op {
    platform: Some(platform),
    constraints: Some(WorkerConstraints { filter }),
    ..Default::default()
  };
  (op, metadata)
}
