//! Frontend-facing types: the nested solve result and the bridge contracts.

pub mod bridge;
pub mod result;

pub use bridge::{FrontendBridge, FrontendExecutor, FrontendRequest, ImageConfig, SolveRequest, WorkerInfo};
pub use result::{ResultError, ResultParts, SolveResult};
