use crate::flowgraph::{Node, NodeKind};
use crate::{graph, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A basic block: a straight-line sequence of nodes in one function.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BasicBlock {
    index: usize,
    function: usize,
    nodes: Vec<Node>,
}

impl BasicBlock {
    pub(crate) fn new(index: usize, function: usize) -> BasicBlock {
        BasicBlock {
            index,
            function,
            nodes: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The index of the function this block belongs to.
    pub fn function(&self) -> usize {
        self.function
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn first_node(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub(crate) fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Returns true if this block holds a foreign marker.
    pub fn is_foreign_marker(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.kind() == NodeKind::ForeignMarker)
    }

    /// Check the structural constraints of this block, given its number of
    /// successors. A call must be the last node of its block. A foreign
    /// marker must be alone in its block, and the block may have at most one
    /// successor.
    pub fn check(&self, successors: usize) -> Result<(), Error> {
        if let Some((_, init)) = self.nodes.split_last() {
            if let Some(call) = init.iter().find(|node| node.kind() == NodeKind::Call) {
                return Err(Error::InternalInvariant(format!(
                    "Call at node {} does not end block {}",
                    call.index(),
                    self.index
                )));
            }
        }
        if self.is_foreign_marker() {
            if self.nodes.len() != 1 {
                return Err(Error::InternalInvariant(format!(
                    "Foreign marker in block {} shares the block with {} other nodes",
                    self.index,
                    self.nodes.len() - 1
                )));
            }
            if successors > 1 {
                return Err(Error::InternalInvariant(format!(
                    "Foreign marker block {} has {} successors",
                    self.index, successors
                )));
            }
        }
        Ok(())
    }
}

impl graph::Vertex for BasicBlock {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: {} ]", self.index)?;
        for node in self.nodes.iter() {
            writeln!(f, "{}", node)?;
        }
        Ok(())
    }
}
