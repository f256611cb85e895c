//! nestbuild-lib: nested builds for a content-addressed build graph
//!
//! This crate provides:
//! - `llb`: graph construction, including ops whose result is itself a solve
//! - `frontend`: the nested solve result and bridge contracts
//! - `solver`: runtime execution of nested-build ops
//! - `platform`: target platform descriptors

pub mod consts;
pub mod frontend;
pub mod llb;
pub mod platform;
pub mod solver;
pub mod util;
