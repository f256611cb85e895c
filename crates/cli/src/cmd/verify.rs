//! Implementation of the `nestbuild verify` command.
//!
//! A definition passes when every record decodes, its principal output is a
//! valid entry point, no input references a missing record, and rebuilding
//! the graph from it reproduces exactly the same records.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

use nestbuild_lib::llb::{Constraints, Definition, DefinitionGraph, DefinitionOp, State, Vertex};

use crate::cmd::load_definition;
use crate::output::{print_error, print_success};

fn verify(def: &Definition) -> Result<()> {
  let op = DefinitionOp::new(def).context("Failed to decode definition")?;
  op.validate().context("Invalid principal output")?;

  let graph = DefinitionGraph::from_definition(def).context("Invalid record graph")?;
  debug!(records = graph.len(), roots = graph.roots().len(), "graph checked");

  let reencoded = State::new(op.output())
    .marshal(&Constraints::default())
    .context("Failed to re-encode definition")?;

  let original: BTreeSet<_> = def.digests().collect();
  let rebuilt: BTreeSet<_> = reencoded.digests().collect();
  if original != rebuilt {
    let unreachable = original.difference(&rebuilt).count();
    bail!("re-encoding does not reproduce the definition ({} unreachable records)", unreachable);
  }
  if def.last() != reencoded.last() {
    bail!("re-encoding produced a different terminal record");
  }
  Ok(())
}

pub fn cmd_verify(file: &Path) -> Result<()> {
  let def = load_definition(file)?;
  match verify(&def) {
    Ok(()) => {
      print_success(&format!("{} is valid ({} records)", file.display(), def.len()));
      Ok(())
    }
    Err(err) => {
      print_error(&format!("{} is invalid", file.display()));
      Err(err)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use nestbuild_lib::llb::types::WorkerConstraints;
  use nestbuild_lib::llb::{BuildInfo, FrontendInfo, Input, Op, OpMetadata, build, frontend, source};
  use nestbuild_lib::platform::Platform;
  use nestbuild_lib::util::hash::Digest;

  fn push(def: &mut Definition, op: &Op) -> Digest {
    let bytes = op.to_bytes().unwrap();
    let digest = Digest::from_bytes(&bytes);
    def.def.push(bytes);
    def.metadata.insert(digest.clone(), OpMetadata::default());
    digest
  }

  fn over(inputs: &[&Digest], arch: &str) -> Op {
    Op {
      inputs: inputs
        .iter()
        .map(|digest| Input {
          digest: (*digest).clone(),
          index: 0,
        })
        .collect(),
      op: None,
      platform: Some(Platform::new("linux", arch)),
      constraints: Some(WorkerConstraints::default()),
    }
  }

  #[test]
  fn accepts_marshalled_graph() {
    let inner = frontend(
      &source("image://frontend").with_args(["/run"]),
      FrontendInfo::new().with_input("context", source("local://context")),
    );
    let def = build(&inner, BuildInfo::new()).marshal(&Constraints::new()).unwrap();

    assert!(verify(&def).is_ok());
  }

  #[test]
  fn accepts_branched_graph() {
    let mut def = Definition::default();
    let mut heads = Vec::new();
    for (identifier, arch) in [("image://a", "amd64"), ("image://b", "arm64")] {
      let leaf = source(identifier).marshal(&Constraints::new()).unwrap();
      let leaf_digest = Digest::from_bytes(&leaf.def[0]);
      def.def.push(leaf.def[0].clone());
      def.metadata.insert(leaf_digest.clone(), OpMetadata::default());
      heads.push(push(&mut def, &over(&[&leaf_digest], arch)));
    }
    let top = push(&mut def, &over(&[&heads[0], &heads[1]], "riscv64"));
    let terminal = Op {
      inputs: vec![Input { digest: top, index: 0 }],
      ..Default::default()
    };
    push(&mut def, &terminal);

    verify(&def).unwrap();
  }

  #[test]
  fn rejects_empty_definition() {
    assert!(verify(&Definition::default()).is_err());
  }

  #[test]
  fn rejects_unreachable_records() {
    let mut def = source("image://alpine").marshal(&Constraints::new()).unwrap();
    let stray = source("image://stray").marshal(&Constraints::new()).unwrap();
    def.def.insert(0, stray.def[0].clone());
    def.metadata.extend(stray.metadata);

    let err = verify(&def).unwrap_err();
    assert!(err.to_string().contains("unreachable"));
  }

  #[test]
  fn rejects_terminal_without_input() {
    let def = Definition {
      def: vec![Op::default().to_bytes().unwrap()],
      metadata: Default::default(),
    };
    assert!(verify(&def).is_err());
  }
}
