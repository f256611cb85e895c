//! Graph construction and serialization.
//!
//! This module provides:
//! - `Vertex` / `Output`: graph nodes and handles to their result slots
//! - `State`: the value user code composes, marshalled into a `Definition`
//! - `BuildOp`: nested solves as graph nodes (`build`, `frontend`)
//! - `DefinitionOp`: a graph reconstructed from a serialized `Definition`

pub mod build;
pub mod constraints;
pub mod definition;
pub mod graph;
pub mod marshal;
pub mod source;
pub mod state;
pub mod types;
pub mod vertex;

pub use build::{BuildInfo, BuildOp, FrontendInfo, build, frontend};
pub use constraints::Constraints;
pub use definition::{Definition, DefinitionOp};
pub use graph::DefinitionGraph;
pub use marshal::{MarshalCache, Marshalled};
pub use source::{SourceOp, source, source_with};
pub use state::State;
pub use types::{BuildSpec, Input, LlbError, Op, OpKind, OpMetadata};
pub use vertex::{Output, Vertex};
