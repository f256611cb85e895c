//! Runtime execution of nested-build ops.
//!
//! A definition build mounts its input, reads the embedded definition and
//! solves it through the bridge. A frontend build hands its root filesystem
//! to the frontend executor. Either way the nested result's primary reference
//! becomes the op's only output.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consts::{ATTR_DEFINITION_FILENAME, BUILD_CACHE_TYPE};
use crate::frontend::bridge::{FrontendBridge, FrontendExecutor, FrontendRequest, ImageConfig, SolveRequest, WorkerInfo};
use crate::frontend::result::SolveResult;
use crate::llb::definition::Definition;
use crate::llb::types::{BuildSpec, LlbError, Op, OpKind};
use crate::solver::mount::{MountGuard, root_path};
use crate::solver::types::{CacheMap, CacheMapDep, ExecConfig, ExecError, ResultSys, SolverRef, WorkerRef};
use crate::util::hash::Hashable;

#[derive(Serialize)]
struct CacheKey<'a> {
  #[serde(rename = "type")]
  kind: &'static str,
  exec: &'a BuildSpec,
}

impl Hashable for CacheKey<'_> {}

/// Executes one build op on behalf of the outer scheduler.
pub struct BuildOpExec {
  spec: BuildSpec,
  input_count: usize,
  bridge: Arc<dyn FrontendBridge>,
  executor: Arc<dyn FrontendExecutor>,
  worker_infos: Vec<WorkerInfo>,
  config: ExecConfig,
}

impl BuildOpExec {
  /// Prepare `op`, which declares `input_count` inputs, for execution.
  pub fn new(
    input_count: usize,
    op: &Op,
    bridge: Arc<dyn FrontendBridge>,
    executor: Arc<dyn FrontendExecutor>,
    worker_infos: Vec<WorkerInfo>,
    config: ExecConfig,
  ) -> Result<Self, ExecError> {
    let Some(OpKind::Build(spec)) = &op.op else {
      return Err(ExecError::InvalidOp(op.kind()));
    };

    let index = spec.builder_input() as usize;
    if index >= input_count {
      return Err(ExecError::InvalidInputIndex {
        index,
        len: input_count,
      });
    }

    Ok(Self {
      spec: spec.clone(),
      input_count,
      bridge,
      executor,
      worker_infos,
      config,
    })
  }

  pub fn spec(&self) -> &BuildSpec {
    &self.spec
  }

  /// Cache key for this op. It depends only on the payload; no input
  /// contributes a content selector.
  pub fn cache_map(&self) -> Result<CacheMap, ExecError> {
    let key = CacheKey {
      kind: BUILD_CACHE_TYPE,
      exec: &self.spec,
    };
    let digest = key.compute_digest().map_err(LlbError::Encode)?;
    Ok(CacheMap {
      digest,
      deps: vec![CacheMapDep::default(); self.input_count],
    })
  }

  /// Run the nested build against the resolved `inputs`.
  ///
  /// Returns exactly one result. Named references of the nested result are
  /// released.
  pub async fn exec(&self, cancel: &CancellationToken, inputs: &[SolverRef]) -> Result<Vec<SolverRef>, ExecError> {
    let result = match &self.spec {
      BuildSpec::Definition { definition_input, attrs } => {
        self.exec_definition(cancel, inputs, *definition_input as usize, attrs).await?
      }
      BuildSpec::Frontend {
        root_input,
        args,
        env,
        cwd,
        attrs,
        defs,
      } => {
        let rootfs = builder_input(inputs, *root_input as usize)?;
        worker_ref(rootfs)?;

        let req = FrontendRequest {
          rootfs: Arc::clone(rootfs),
          image_config: ImageConfig {
            entrypoint: args.clone(),
            env: env.clone(),
            working_dir: cwd.clone(),
          },
          attrs: attrs.clone(),
          inputs: defs.clone(),
        };
        info!(rootfs = %req.rootfs.id(), inputs = req.inputs.len(), "running frontend");

        let bridge = Arc::clone(&self.bridge);
        tokio::select! {
          biased;
          _ = cancel.cancelled() => return Err(ExecError::Cancelled),
          res = self.executor.exec_with_frontend(cancel, bridge, &self.worker_infos, req) => res?,
        }
      }
    };

    Ok(vec![finish(result).await?])
  }

  async fn exec_definition(
    &self,
    cancel: &CancellationToken,
    inputs: &[SolverRef],
    index: usize,
    attrs: &BTreeMap<String, String>,
  ) -> Result<SolveResult<SolverRef>, ExecError> {
    let input = builder_input(inputs, index)?;
    let worker = worker_ref(input)?;
    let filename = attrs
      .get(ATTR_DEFINITION_FILENAME)
      .unwrap_or(&self.config.definition_filename);

    let definition = read_definition(worker, filename).await?;
    info!(
      input = %input.id(),
      records = definition.len(),
      last = ?definition.last(),
      "solving nested definition"
    );

    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(ExecError::Cancelled),
      res = self.bridge.solve(cancel, SolveRequest { definition }) => res,
    }
  }
}

fn builder_input(inputs: &[SolverRef], index: usize) -> Result<&SolverRef, ExecError> {
  inputs.get(index).ok_or(ExecError::MissingDefinitionInput(index))
}

fn worker_ref(input: &SolverRef) -> Result<&WorkerRef, ExecError> {
  match input.sys() {
    ResultSys::Worker(worker) => Ok(worker),
    ResultSys::Other(kind) => Err(ExecError::InvalidReference(kind.to_string())),
  }
}

/// Mount `worker` read-only and decode the definition at `filename`.
///
/// The mount is released before returning on every path.
async fn read_definition(worker: &WorkerRef, filename: &str) -> Result<Definition, ExecError> {
  let mountable = worker.immutable_ref.mount(true).await?;
  let mut guard = MountGuard::new(mountable);
  let root = guard.mount()?;

  let path = root_path(&root, filename)?;
  debug!(path = ?path, "reading definition");
  let data = tokio::fs::read(&path)
    .await
    .map_err(|source| ExecError::OpenDefinition { path, source })?;

  guard.unmount()?;
  Ok(Definition::from_bytes(&data)?)
}

/// Release named references and return the primary one.
async fn finish(result: SolveResult<SolverRef>) -> Result<SolverRef, ExecError> {
  let parts = result.into_parts();
  for (key, reference) in parts.refs {
    if let Err(err) = reference.release().await {
      warn!(key = %key, error = %err, "failed to release nested result");
    }
  }
  parts.reference.ok_or(ExecError::EmptyResult)
}
