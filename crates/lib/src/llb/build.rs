//! Lazy nested solves as graph nodes.
//!
//! A build op represents "solve this other graph" as a single vertex, either
//! by reading a definition out of an upstream filesystem, or by running a
//! frontend against a root filesystem.
//!
//! # Example
//!
//! ```ignore
//! let ctx = source("local://context");
//! let nested = build(&ctx, BuildInfo::new().with_filename("/out/def.json"));
//! let def = nested.marshal(&Constraints::new())?;
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::consts::{ATTR_DEFINITION_FILENAME, CAP_BUILD_OP_DEFINITION_FILENAME, DEFAULT_DEFINITION_FILENAME};
use crate::llb::constraints::{Constraints, marshal_constraints};
use crate::llb::definition::Definition;
use crate::llb::marshal::{MarshalCache, Marshalled};
use crate::llb::state::State;
use crate::llb::types::{BuildSpec, LlbError, OpKind};
use crate::llb::vertex::{Output, Vertex};

/// Options for a definition-based build.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
  pub definition_filename: Option<String>,
  pub constraints: Constraints,
}

impl BuildInfo {
  pub fn new() -> Self {
    Self::default()
  }

  /// Read the definition from `filename` in the source filesystem instead of
  /// the default location.
  pub fn with_filename(mut self, filename: &str) -> Self {
    self.definition_filename = Some(filename.to_string());
    self
  }

  pub fn with_constraints(mut self, constraints: Constraints) -> Self {
    self.constraints = constraints;
    self
  }
}

/// Options for a frontend-based build.
#[derive(Debug, Clone, Default)]
pub struct FrontendInfo {
  pub inputs: BTreeMap<String, State>,
  pub opts: BTreeMap<String, String>,
  pub constraints: Constraints,
}

impl FrontendInfo {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pass `input` to the frontend under `key`, as a full definition.
  pub fn with_input(mut self, key: &str, input: State) -> Self {
    self.inputs.insert(key.to_string(), input);
    self
  }

  pub fn with_opt(mut self, key: &str, value: &str) -> Self {
    self.opts.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_constraints(mut self, constraints: Constraints) -> Self {
    self.constraints = constraints;
    self
  }
}

#[derive(Debug)]
enum Builder {
  Definition {
    filename: Option<String>,
  },
  Frontend {
    inputs: BTreeMap<String, State>,
    opts: BTreeMap<String, String>,
    /// Named inputs marshalled on first use.
    resolved: Mutex<Option<Arc<BTreeMap<String, Definition>>>>,
  },
}

/// A vertex whose output is the result of a nested solve.
#[derive(Debug)]
pub struct BuildOp {
  builder: Builder,
  root: State,
  inputs: Vec<Output>,
  constraints: Constraints,
  cache: MarshalCache,
}

impl BuildOp {
  /// A build that solves the definition found in `source`'s filesystem.
  pub fn new_definition(source: &State, info: BuildInfo) -> Arc<Self> {
    Arc::new(Self {
      builder: Builder::Definition {
        filename: info.definition_filename,
      },
      root: source.clone(),
      inputs: source.output().cloned().into_iter().collect(),
      constraints: info.constraints,
      cache: MarshalCache::new(),
    })
  }

  /// A build that runs the frontend whose filesystem is `root`.
  pub fn new_frontend(root: &State, info: FrontendInfo) -> Arc<Self> {
    Arc::new(Self {
      builder: Builder::Frontend {
        inputs: info.inputs,
        opts: info.opts,
        resolved: Mutex::new(None),
      },
      root: root.clone(),
      inputs: root.output().cloned().into_iter().collect(),
      constraints: info.constraints,
      cache: MarshalCache::new(),
    })
  }

  /// The sole output, or `None` when the source/root state has no output.
  pub fn output(self: &Arc<Self>) -> Option<Output> {
    if self.inputs.is_empty() {
      return None;
    }
    let vertex: Arc<dyn Vertex> = self.clone();
    Some(Output::new(vertex, 0, self.constraints.platform.clone()))
  }

  /// Marshal every named frontend input under the node's own constraints,
  /// once per node. Inputs are resolved in name order and the first failure
  /// stops resolution.
  fn resolve_frontend_inputs(&self) -> Result<Arc<BTreeMap<String, Definition>>, LlbError> {
    let Builder::Frontend { inputs, resolved, .. } = &self.builder else {
      return Ok(Arc::new(BTreeMap::new()));
    };

    let mut resolved = resolved.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(defs) = resolved.as_ref() {
      return Ok(Arc::clone(defs));
    }

    let mut defs = BTreeMap::new();
    for (key, state) in inputs {
      debug!(input = %key, "resolving frontend input");
      defs.insert(key.clone(), state.marshal(&self.constraints)?);
    }

    let defs = Arc::new(defs);
    *resolved = Some(Arc::clone(&defs));
    Ok(defs)
  }

  fn build_spec(&self) -> Result<BuildSpec, LlbError> {
    match &self.builder {
      Builder::Definition { filename } => {
        let mut attrs = BTreeMap::new();
        if let Some(filename) = filename.as_deref().filter(|f| *f != DEFAULT_DEFINITION_FILENAME) {
          attrs.insert(ATTR_DEFINITION_FILENAME.to_string(), filename.to_string());
        }
        Ok(BuildSpec::Definition {
          definition_input: 0,
          attrs,
        })
      }
      Builder::Frontend { opts, .. } => {
        let defs = self.resolve_frontend_inputs()?;
        Ok(BuildSpec::Frontend {
          root_input: 0,
          args: self.root.args().to_vec(),
          env: self.root.env().to_vec(),
          cwd: self.root.dir().to_string(),
          attrs: opts.clone(),
          defs: (*defs).clone(),
        })
      }
    }
  }
}

impl Vertex for BuildOp {
  fn validate(&self) -> Result<(), LlbError> {
    self.resolve_frontend_inputs().map(|_| ())
  }

  fn marshal(&self, constraints: &Constraints) -> Result<Marshalled, LlbError> {
    self.cache.get_or_marshal(constraints, || {
      self.validate()?;
      let spec = self.build_spec()?;

      let own = self.constraints.clone().with_cap(CAP_BUILD_OP_DEFINITION_FILENAME);
      let (mut op, metadata) = marshal_constraints(constraints, &own);
      op.op = Some(OpKind::Build(spec));
      for input in &self.inputs {
        op.inputs.push(input.to_input(constraints)?);
      }

      Ok((op.to_bytes()?, metadata))
    })
  }

  fn inputs(&self) -> Vec<Output> {
    self.inputs.clone()
  }
}

/// A state representing the result of solving the definition stored in
/// `source`'s filesystem.
pub fn build(source: &State, info: BuildInfo) -> State {
  State::new(BuildOp::new_definition(source, info).output())
}

/// A state representing the result of running the frontend in `root`.
pub fn frontend(root: &State, info: FrontendInfo) -> State {
  State::new(BuildOp::new_frontend(root, info).output())
}
