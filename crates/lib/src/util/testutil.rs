//! Test fakes for nestbuild-lib.
//!
//! In-memory stand-ins for the collaborators a build op talks to: graph
//! vertices with call counters, mountable snapshots, solver results, the
//! solver bridge and the frontend executor.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::frontend::bridge::{FrontendBridge, FrontendExecutor, FrontendRequest, SolveRequest, WorkerInfo};
use crate::frontend::result::SolveResult;
use crate::llb::constraints::Constraints;
use crate::llb::marshal::Marshalled;
use crate::llb::source::SourceOp;
use crate::llb::state::State;
use crate::llb::types::LlbError;
use crate::llb::vertex::{Output, Vertex};
use crate::solver::types::{ExecError, ImmutableRef, Mountable, ResultSys, SolverRef, SolverResult, WorkerRef};

/// A source vertex that counts how often it is marshalled.
#[derive(Debug)]
pub struct CountingVertex {
  inner: Arc<SourceOp>,
  fail: bool,
  calls: Arc<AtomicUsize>,
}

impl CountingVertex {
  pub fn ok(identifier: &str) -> (State, Arc<AtomicUsize>) {
    Self::state(identifier, false)
  }

  /// A vertex whose validation and marshalling always fail.
  pub fn failing() -> (State, Arc<AtomicUsize>) {
    Self::state("image://failing", true)
  }

  fn state(identifier: &str, fail: bool) -> (State, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let vertex: Arc<dyn Vertex> = Arc::new(Self {
      inner: SourceOp::new(identifier, BTreeMap::new(), Constraints::default()),
      fail,
      calls: Arc::clone(&calls),
    });
    (State::new(Some(Output::new(vertex, 0, None))), calls)
  }

  fn failure() -> LlbError {
    LlbError::InvalidSource("counting vertex configured to fail".to_string())
  }
}

impl Vertex for CountingVertex {
  fn validate(&self) -> Result<(), LlbError> {
    if self.fail {
      return Err(Self::failure());
    }
    self.inner.validate()
  }

  fn marshal(&self, constraints: &Constraints) -> Result<Marshalled, LlbError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      return Err(Self::failure());
    }
    self.inner.marshal(constraints)
  }

  fn inputs(&self) -> Vec<Output> {
    Vec::new()
  }
}

/// Shared mount/unmount counters.
#[derive(Debug, Clone, Default)]
pub struct MountCounters {
  mounts: Arc<AtomicUsize>,
  unmounts: Arc<AtomicUsize>,
}

impl MountCounters {
  pub fn mounts(&self) -> usize {
    self.mounts.load(Ordering::SeqCst)
  }

  pub fn unmounts(&self) -> usize {
    self.unmounts.load(Ordering::SeqCst)
  }
}

/// A mount that resolves to an existing local directory.
pub struct FakeMountable {
  root: PathBuf,
  fail: bool,
  counters: MountCounters,
}

impl FakeMountable {
  pub fn new(root: PathBuf) -> Self {
    Self {
      root,
      fail: false,
      counters: MountCounters::default(),
    }
  }

  pub fn failing(mut self) -> Self {
    self.fail = true;
    self
  }

  pub fn counters(&self) -> MountCounters {
    self.counters.clone()
  }
}

impl Mountable for FakeMountable {
  fn mount(&mut self) -> Result<PathBuf, ExecError> {
    if self.fail {
      return Err(ExecError::Mount {
        id: "fake".to_string(),
        message: "mount refused".to_string(),
      });
    }
    self.counters.mounts.fetch_add(1, Ordering::SeqCst);
    Ok(self.root.clone())
  }

  fn unmount(&mut self) -> Result<(), ExecError> {
    self.counters.unmounts.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// A snapshot backed by a local directory.
#[derive(Debug)]
pub struct FakeImmutableRef {
  id: String,
  root: PathBuf,
  fail_mount: bool,
  counters: MountCounters,
}

#[async_trait]
impl ImmutableRef for FakeImmutableRef {
  fn id(&self) -> String {
    self.id.clone()
  }

  async fn mount(&self, _readonly: bool) -> Result<Box<dyn Mountable>, ExecError> {
    Ok(Box::new(FakeMountable {
      root: self.root.clone(),
      fail: self.fail_mount,
      counters: self.counters.clone(),
    }))
  }
}

#[derive(Debug)]
enum FakeSys {
  Worker(WorkerRef),
  Other(&'static str),
}

/// A solver result that records whether it was released.
#[derive(Debug)]
pub struct FakeResult {
  id: String,
  sys: FakeSys,
  released: AtomicBool,
  fail_release: bool,
}

impl FakeResult {
  /// A worker result whose filesystem is the directory `root`.
  pub fn worker(id: &str, root: PathBuf) -> (SolverRef, MountCounters) {
    Self::worker_with(id, root, false)
  }

  /// A worker result whose mounts always fail.
  pub fn unmountable(id: &str) -> (SolverRef, MountCounters) {
    Self::worker_with(id, PathBuf::from("/nonexistent"), true)
  }

  fn worker_with(id: &str, root: PathBuf, fail_mount: bool) -> (SolverRef, MountCounters) {
    let counters = MountCounters::default();
    let immutable_ref = Arc::new(FakeImmutableRef {
      id: id.to_string(),
      root,
      fail_mount,
      counters: counters.clone(),
    });
    let result: SolverRef = Arc::new(Self {
      id: id.to_string(),
      sys: FakeSys::Worker(WorkerRef { immutable_ref }),
      released: AtomicBool::new(false),
      fail_release: false,
    });
    (result, counters)
  }

  /// A result that is not backed by a worker filesystem.
  pub fn other(id: &str, kind: &'static str) -> Arc<Self> {
    Arc::new(Self {
      id: id.to_string(),
      sys: FakeSys::Other(kind),
      released: AtomicBool::new(false),
      fail_release: false,
    })
  }

  /// A plain result whose release reports an error.
  pub fn sticky(id: &str) -> Arc<Self> {
    Arc::new(Self {
      id: id.to_string(),
      sys: FakeSys::Other("sticky"),
      released: AtomicBool::new(false),
      fail_release: true,
    })
  }

  pub fn released(&self) -> bool {
    self.released.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl SolverResult for FakeResult {
  fn id(&self) -> String {
    self.id.clone()
  }

  fn sys(&self) -> ResultSys<'_> {
    match &self.sys {
      FakeSys::Worker(worker) => ResultSys::Worker(worker),
      FakeSys::Other(kind) => ResultSys::Other(kind),
    }
  }

  async fn release(&self) -> Result<(), ExecError> {
    self.released.store(true, Ordering::SeqCst);
    if self.fail_release {
      return Err(ExecError::delegated(std::io::Error::other("release refused")));
    }
    Ok(())
  }
}

/// Canned outcome shared by the fake bridge and executor.
#[derive(Default)]
struct Outcome {
  primary: Option<SolverRef>,
  named: BTreeMap<String, SolverRef>,
  error: Mutex<Option<ExecError>>,
  hang: bool,
}

impl Outcome {
  async fn produce(&self) -> Result<SolveResult<SolverRef>, ExecError> {
    if self.hang {
      std::future::pending::<()>().await;
    }
    let error = self.error.lock().unwrap().take();
    if let Some(err) = error {
      return Err(err);
    }
    let result = SolveResult::new();
    if let Some(primary) = &self.primary {
      result.set_ref(Arc::clone(primary));
    }
    for (key, reference) in &self.named {
      result.add_ref(key, Arc::clone(reference));
    }
    Ok(result)
  }
}

/// A bridge that records requests and returns a canned result.
#[derive(Default)]
pub struct FakeBridge {
  outcome: Outcome,
  requests: Mutex<Vec<SolveRequest>>,
}

impl FakeBridge {
  pub fn returning(primary: SolverRef) -> Self {
    let mut bridge = Self::default();
    bridge.outcome.primary = Some(primary);
    bridge
  }

  /// A bridge whose results carry no primary reference.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn failing(err: ExecError) -> Self {
    let bridge = Self::default();
    *bridge.outcome.error.lock().unwrap() = Some(err);
    bridge
  }

  /// A bridge whose solves never complete.
  pub fn hanging() -> Self {
    let mut bridge = Self::default();
    bridge.outcome.hang = true;
    bridge
  }

  pub fn with_named(mut self, key: &str, reference: SolverRef) -> Self {
    self.outcome.named.insert(key.to_string(), reference);
    self
  }

  pub fn requests(&self) -> Vec<SolveRequest> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl FrontendBridge for FakeBridge {
  async fn solve(&self, _cancel: &CancellationToken, req: SolveRequest) -> Result<SolveResult<SolverRef>, ExecError> {
    self.requests.lock().unwrap().push(req);
    self.outcome.produce().await
  }
}

/// A frontend executor that records requests and returns a canned result.
#[derive(Default)]
pub struct FakeExecutor {
  outcome: Outcome,
  requests: Mutex<Vec<(FrontendRequest, usize)>>,
}

impl FakeExecutor {
  pub fn returning(primary: SolverRef) -> Self {
    let mut executor = Self::default();
    executor.outcome.primary = Some(primary);
    executor
  }

  pub fn failing(err: ExecError) -> Self {
    let executor = Self::default();
    *executor.outcome.error.lock().unwrap() = Some(err);
    executor
  }

  pub fn hanging() -> Self {
    let mut executor = Self::default();
    executor.outcome.hang = true;
    executor
  }

  /// Recorded requests, each with the number of workers it was offered.
  pub fn requests(&self) -> Vec<(FrontendRequest, usize)> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl FrontendExecutor for FakeExecutor {
  async fn exec_with_frontend(
    &self,
    _cancel: &CancellationToken,
    _bridge: Arc<dyn FrontendBridge>,
    worker_infos: &[WorkerInfo],
    req: FrontendRequest,
  ) -> Result<SolveResult<SolverRef>, ExecError> {
    self.requests.lock().unwrap().push((req, worker_infos.len()));
    self.outcome.produce().await
  }
}
