//! Dependency view over a decoded definition.
//!
//! Used to check a definition before it is solved: every input must point at
//! a record of the same definition, and records can be listed in dependency
//! order.

use std::collections::{BTreeMap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::llb::definition::Definition;
use crate::llb::types::{LlbError, Op, OutputIndex};
use crate::util::hash::Digest;

pub struct DefinitionGraph {
  /// Edges run from dependency to dependent, weighted by the consumed slot.
  graph: DiGraph<Digest, OutputIndex>,
  nodes: HashMap<Digest, NodeIndex>,
  ops: BTreeMap<Digest, Op>,
}

impl DefinitionGraph {
  /// Build the graph, rejecting inputs that reference unknown records.
  pub fn from_definition(def: &Definition) -> Result<Self, LlbError> {
    let ops = def.decode_ops()?;
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for digest in ops.keys() {
      let idx = graph.add_node(digest.clone());
      nodes.insert(digest.clone(), idx);
    }

    for (digest, op) in &ops {
      let dependent = nodes[digest];
      for input in &op.inputs {
        let Some(&dependency) = nodes.get(&input.digest) else {
          return Err(LlbError::DanglingInput {
            op: digest.clone(),
            input: input.digest.clone(),
          });
        };
        graph.add_edge(dependency, dependent, input.index);
      }
    }

    let dag = Self { graph, nodes, ops };
    dag.topological_order()?;
    Ok(dag)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn op(&self, digest: &Digest) -> Option<&Op> {
    self.ops.get(digest)
  }

  /// Records in an order where dependencies come before dependents.
  pub fn topological_order(&self) -> Result<Vec<Digest>, LlbError> {
    let sorted = toposort(&self.graph, None).map_err(|_| LlbError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Direct dependencies of `digest`.
  pub fn dependencies(&self, digest: &Digest) -> Vec<Digest> {
    self.neighbors(digest, Direction::Incoming)
  }

  /// Records that consume `digest`.
  pub fn dependents(&self, digest: &Digest) -> Vec<Digest> {
    self.neighbors(digest, Direction::Outgoing)
  }

  /// Records with no inputs.
  pub fn roots(&self) -> Vec<Digest> {
    let mut roots: Vec<Digest> = self
      .graph
      .node_indices()
      .filter(|&idx| self.graph.neighbors_directed(idx, Direction::Incoming).next().is_none())
      .map(|idx| self.graph[idx].clone())
      .collect();
    roots.sort();
    roots
  }

  fn neighbors(&self, digest: &Digest, direction: Direction) -> Vec<Digest> {
    let Some(&idx) = self.nodes.get(digest) else {
      return Vec::new();
    };
    let mut found: Vec<Digest> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    found.sort();
    found.dedup();
    found
  }
}
