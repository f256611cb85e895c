//! Contracts for handing nested graphs back to the solver.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::frontend::result::SolveResult;
use crate::llb::definition::Definition;
use crate::platform::Platform;
use crate::solver::types::{ExecError, SolverRef};

/// A request to solve a complete definition.
#[derive(Debug, Clone, Default)]
pub struct SolveRequest {
  pub definition: Definition,
}

/// Recursive entry point into the solver.
#[async_trait]
pub trait FrontendBridge: Send + Sync {
  /// Solve `req` to completion. Implementations should stop promptly once
  /// `cancel` fires.
  async fn solve(&self, cancel: &CancellationToken, req: SolveRequest) -> Result<SolveResult<SolverRef>, ExecError>;
}

/// Process configuration for a frontend container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
  pub entrypoint: Vec<String>,
  pub env: Vec<String>,
  pub working_dir: String,
}

/// A worker available to frontends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
  pub id: String,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
  #[serde(default)]
  pub platforms: Vec<Platform>,
}

/// Everything a frontend run needs besides the bridge.
#[derive(Debug, Clone)]
pub struct FrontendRequest {
  /// Root filesystem the frontend process runs in.
  pub rootfs: SolverRef,
  pub image_config: ImageConfig,
  pub attrs: BTreeMap<String, String>,
  /// Named definitions the frontend may solve through the bridge.
  pub inputs: BTreeMap<String, Definition>,
}

/// Runs a frontend container that talks back to the solver through a bridge.
#[async_trait]
pub trait FrontendExecutor: Send + Sync {
  async fn exec_with_frontend(
    &self,
    cancel: &CancellationToken,
    bridge: Arc<dyn FrontendBridge>,
    worker_infos: &[WorkerInfo],
    req: FrontendRequest,
  ) -> Result<SolveResult<SolverRef>, ExecError>;
}
