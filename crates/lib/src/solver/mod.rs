//! Solve-time execution of nested builds.
//!
//! The outer scheduler resolves an op's inputs and hands them to
//! [`ops::BuildOpExec`], which recursively solves the nested graph through a
//! [`crate::frontend::FrontendBridge`].

pub mod mount;
pub mod ops;
pub mod types;

pub use types::{
  CacheMap, CacheMapDep, ExecConfig, ExecError, ImmutableRef, Mountable, ResultSys, SolverRef, SolverResult, WorkerRef,
};
