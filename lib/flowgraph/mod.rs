//! The flow graph the analysis runs over.
//!
//! A `FlowGraph` is a directed `Graph` of `BasicBlock`s. Each block holds a
//! sequence of `Node`s, and belongs to one `Function`. The first function is
//! the program body.
//!
//! Flow graphs are normally produced by a front end. The builder methods
//! here (`add_function`, `new_block`, `add_node`, `edge`) are what a front
//! end, or a test, uses to assemble one.

mod block;
mod function;
mod node;

pub use self::block::BasicBlock;
pub use self::function::Function;
pub use self::node::{BinaryOp, Constant, Node, NodeKind, Operation, PropertyName, Register};

use crate::{graph, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An edge between two basic blocks.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Edge {
    head: usize,
    tail: usize,
}

impl graph::Edge for Edge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}->{})", self.head, self.tail)
    }
}

/// A flow graph.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FlowGraph {
    graph: graph::Graph<BasicBlock, Edge>,
    functions: Vec<Function>,
    // node index -> block index
    node_blocks: BTreeMap<usize, usize>,
    next_block: usize,
}

impl FlowGraph {
    /// Create a flow graph holding an empty program body.
    pub fn new() -> FlowGraph {
        let mut flow_graph = FlowGraph {
            graph: graph::Graph::new(),
            functions: Vec::new(),
            node_blocks: BTreeMap::new(),
            next_block: 0,
        };
        flow_graph.push_function(None, Vec::new(), Vec::new());
        flow_graph
    }

    fn push_function(
        &mut self,
        name: Option<String>,
        parameters: Vec<String>,
        variables: Vec<String>,
    ) -> usize {
        let index = self.functions.len();
        let entry = self.next_block;
        self.next_block += 1;
        self.graph.insert_vertex(BasicBlock::new(entry, index));
        self.functions
            .push(Function::new(index, name, parameters, variables, entry));
        index
    }

    /// Add a function and its entry block. Returns the index of the function.
    pub fn add_function<S: Into<String>>(
        &mut self,
        name: S,
        parameters: Vec<String>,
        variables: Vec<String>,
    ) -> usize {
        self.push_function(Some(name.into()), parameters, variables)
    }

    /// Add an empty block to `function`. Returns the index of the block.
    pub fn new_block(&mut self, function: usize) -> Result<usize, Error> {
        if function >= self.functions.len() {
            return Err(format!("No function with index {}", function).into());
        }
        let index = self.next_block;
        self.next_block += 1;
        self.graph.insert_vertex(BasicBlock::new(index, function));
        Ok(index)
    }

    /// Append a node to `block`. Returns the index of the node.
    pub fn add_node(&mut self, block: usize, operation: Operation) -> Result<usize, Error> {
        let index = self.node_blocks.len();
        self.graph
            .vertex_mut(block)
            .map_err(|_| Error::FlowGraphBlockNotFound(block))?
            .push(Node::new(index, block, operation));
        self.node_blocks.insert(index, block);
        Ok(index)
    }

    /// Add a control-flow edge from `head` to `tail`.
    pub fn edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph.insert_edge(Edge { head, tail })
    }

    pub fn graph(&self) -> &graph::Graph<BasicBlock, Edge> {
        &self.graph
    }

    /// The program body. Only a flow graph which was deserialized can lack
    /// one.
    pub fn main(&self) -> Result<&Function, Error> {
        self.functions
            .first()
            .ok_or_else(|| Error::InternalInvariant("Flow graph has no program body".to_string()))
    }

    pub fn function(&self, index: usize) -> Result<&Function, Error> {
        self.functions
            .get(index)
            .ok_or_else(|| format!("No function with index {}", index).into())
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn block(&self, index: usize) -> Result<&BasicBlock, Error> {
        self.graph
            .vertex(index)
            .map_err(|_| Error::FlowGraphBlockNotFound(index))
    }

    pub fn blocks(&self) -> Vec<&BasicBlock> {
        self.graph.vertices()
    }

    /// The function owning `block`.
    pub fn function_of_block(&self, block: usize) -> Result<&Function, Error> {
        self.function(self.block(block)?.function())
    }

    pub fn node(&self, index: usize) -> Result<&Node, Error> {
        let block = self
            .node_blocks
            .get(&index)
            .ok_or(Error::FlowGraphNodeNotFound(index))?;
        self.block(*block)?
            .nodes()
            .iter()
            .find(|node| node.index() == index)
            .ok_or(Error::FlowGraphNodeNotFound(index))
    }

    pub fn successor_indices(&self, block: usize) -> Result<Vec<usize>, Error> {
        self.graph
            .successor_indices(block)
            .map_err(|_| Error::FlowGraphBlockNotFound(block))
    }

    /// The only successor of `block`. Fails if the block has zero or several
    /// successors.
    pub fn single_successor(&self, block: usize) -> Result<usize, Error> {
        let successors = self.successor_indices(block)?;
        match successors.as_slice() {
            [successor] => Ok(*successor),
            _ => Err(Error::InternalInvariant(format!(
                "Block {} has {} successors, expected exactly one",
                block,
                successors.len()
            ))),
        }
    }

    /// Every foreign marker node, in node order.
    pub fn foreign_markers(&self) -> Vec<&Node> {
        let mut markers: Vec<&Node> = self
            .graph
            .vertices()
            .into_iter()
            .flat_map(|block| block.nodes().iter())
            .filter(|node| node.kind() == NodeKind::ForeignMarker)
            .collect();
        markers.sort_by_key(|node| node.index());
        markers
    }

    /// Check the structural constraints of every block.
    pub fn check(&self) -> Result<(), Error> {
        self.main()?;
        for block in self.graph.vertices() {
            let successors = self.successor_indices(block.index())?;
            block.check(successors.len())?;
        }
        Ok(())
    }

    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

impl Default for FlowGraph {
    fn default() -> FlowGraph {
        FlowGraph::new()
    }
}

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for function in self.functions.iter() {
            writeln!(f, "function {}", function.name())?;
            for block in self
                .graph
                .vertices()
                .into_iter()
                .filter(|block| block.function() == function.index())
            {
                write!(f, "{}", block)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_query() {
        let mut flow_graph = FlowGraph::new();
        let entry = flow_graph.main().unwrap().entry();
        let n0 = flow_graph
            .add_node(entry, Operation::read_variable(0, "Java"))
            .unwrap();
        let next = flow_graph.new_block(0).unwrap();
        let n1 = flow_graph.add_node(next, Operation::Nop).unwrap();
        flow_graph.edge(entry, next).unwrap();

        assert_eq!(flow_graph.node(n0).unwrap().block(), entry);
        assert_eq!(flow_graph.node(n1).unwrap().kind(), NodeKind::Nop);
        assert_eq!(flow_graph.single_successor(entry).unwrap(), next);
        assert!(flow_graph.dot_graph().contains("0 -> 1;"));
        assert!(flow_graph.single_successor(next).is_err());
        assert!(matches!(
            flow_graph.node(9),
            Err(Error::FlowGraphNodeNotFound(9))
        ));
        assert!(matches!(
            flow_graph.add_node(42, Operation::Nop),
            Err(Error::FlowGraphBlockNotFound(42))
        ));
    }

    #[test]
    fn foreign_marker_needs_its_own_block() {
        let mut flow_graph = FlowGraph::new();
        let entry = flow_graph.main().unwrap().entry();
        let marker = flow_graph.new_block(0).unwrap();
        let a = flow_graph.new_block(0).unwrap();
        let b = flow_graph.new_block(0).unwrap();
        flow_graph
            .add_node(marker, Operation::foreign_marker(1))
            .unwrap();
        flow_graph.edge(entry, marker).unwrap();
        flow_graph.edge(marker, a).unwrap();
        assert!(flow_graph.check().is_ok());
        assert_eq!(flow_graph.foreign_markers().len(), 1);

        flow_graph.edge(marker, b).unwrap();
        assert!(flow_graph.check().is_err());

        let mut crowded = FlowGraph::new();
        let entry = crowded.main().unwrap().entry();
        crowded.add_node(entry, Operation::Nop).unwrap();
        crowded
            .add_node(entry, Operation::foreign_marker(1))
            .unwrap();
        assert!(matches!(
            crowded.check(),
            Err(Error::InternalInvariant(_))
        ));
    }

    #[test]
    fn calls_end_their_block() {
        let mut flow_graph = FlowGraph::new();
        let entry = flow_graph.main().unwrap().entry();
        flow_graph.add_node(entry, Operation::new_object(0)).unwrap();
        flow_graph
            .add_node(entry, Operation::method_call(Some(1), 0, "f", vec![]))
            .unwrap();
        assert!(flow_graph.check().is_ok());

        let after = flow_graph.add_node(entry, Operation::Nop).unwrap();
        match flow_graph.check() {
            Err(Error::InternalInvariant(message)) => {
                assert!(message.contains(&format!("node {}", after - 1)))
            }
            other => panic!("expected the call to be rejected, got {:?}", other),
        }
    }

    #[test]
    fn deserialized_graph_without_program_body() {
        let mut json = serde_json::to_value(&FlowGraph::new()).unwrap();
        json["functions"] = serde_json::Value::Array(Vec::new());
        let empty: FlowGraph = serde_json::from_str(&json.to_string()).unwrap();
        assert!(matches!(empty.main(), Err(Error::InternalInvariant(_))));
        assert!(empty.check().is_err());
    }

    #[test]
    fn functions() {
        let mut flow_graph = FlowGraph::new();
        let f = flow_graph.add_function(
            "f",
            vec!["a".to_string(), "b".to_string()],
            vec!["x".to_string()],
        );
        let function = flow_graph.function(f).unwrap();
        assert_eq!(function.parameter_index("b"), Some(1));
        assert!(function.declares("x"));
        assert!(!function.declares("Java"));
        assert!(flow_graph.main().unwrap().is_main());
        assert_eq!(
            flow_graph.function_of_block(function.entry()).unwrap().name(),
            "f"
        );
    }
}
