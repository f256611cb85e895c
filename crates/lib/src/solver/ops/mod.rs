//! Runtime implementations of graph ops.

pub mod build;

pub use build::BuildOpExec;
