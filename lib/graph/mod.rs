//! Implements a directed graph, used to connect the basic blocks of a flow
//! graph.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::Error;

pub trait Vertex: Clone {
    // The index of this vertex.
    fn index(&self) -> usize;
    // A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
}

pub trait Edge: Clone {
    /// The index of the head vertex.
    fn head(&self) -> usize;
    /// The index of the tail vertex.
    fn tail(&self) -> usize;
}

/// A directed graph.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, Default)]
pub struct Graph<V: Vertex, E: Edge> {
    vertices: BTreeMap<usize, V>,
    edges: BTreeMap<(usize, usize), E>,
    successors: BTreeMap<usize, BTreeSet<usize>>,
}

impl<V, E> Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    pub fn new() -> Graph<V, E> {
        Graph {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            successors: BTreeMap::new(),
        }
    }

    /// Returns true if the vertex with the given index exists in this graph
    pub fn has_vertex(&self, index: usize) -> bool {
        self.vertices.contains_key(&index)
    }

    /// Inserts a vertex into the graph. A vertex already present at the same
    /// index is replaced.
    pub fn insert_vertex(&mut self, v: V) {
        let index = v.index();
        self.successors.entry(index).or_default();
        self.vertices.insert(index, v);
    }

    /// Inserts an edge into the graph. Both vertices must already exist.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        if !self.has_vertex(edge.head()) {
            return Err(Error::GraphVertexNotFound(edge.head()));
        }
        if !self.has_vertex(edge.tail()) {
            return Err(Error::GraphVertexNotFound(edge.tail()));
        }

        let (head, tail) = (edge.head(), edge.tail());
        self.successors.entry(head).or_default().insert(tail);
        self.edges.insert((head, tail), edge);

        Ok(())
    }

    /// Returns the indices of all immediate successors of a vertex from the graph.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.successors
            .get(&index)
            .map(|successors| successors.iter().cloned().collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Compute the reverse post order of all vertices reachable from root.
    ///
    /// The worklist driver uses this order as its priority, so blocks are
    /// visited after their forward predecessors where possible.
    pub fn compute_reverse_post_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut order: Vec<usize> = Vec::new();
        // (vertex, successors already pushed)
        let mut stack: Vec<(usize, bool)> = vec![(root, false)];

        while let Some((vertex, expanded)) = stack.pop() {
            if expanded {
                order.push(vertex);
                continue;
            }
            if !visited.insert(vertex) {
                continue;
            }
            stack.push((vertex, true));
            if let Some(successors) = self.successors.get(&vertex) {
                for &successor in successors.iter().rev() {
                    if !visited.contains(&successor) {
                        stack.push((successor, false));
                    }
                }
            }
        }

        order.reverse();
        Ok(order)
    }

    /// Returns all vertices in the graph.
    pub fn vertices(&self) -> Vec<&V> {
        self.vertices.values().collect()
    }

    /// Fetches a vertex from the graph by index.
    pub fn vertex(&self, index: usize) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    // Fetches a mutable instance of a vertex.
    pub fn vertex_mut(&mut self, index: usize) -> Result<&mut V, Error> {
        self.vertices
            .get_mut(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Returns a string in the graphviz format
    pub fn dot_graph(&self) -> String {
        let vertices = self
            .vertices
            .values()
            .map(|v| {
                format!(
                    "{} [shape=\"box\", label=\"{}\"];",
                    v.index(),
                    v.dot_label().replace('"', "\\\"").replace('\n', "\\l")
                )
            })
            .collect::<Vec<String>>();

        let edges = self
            .edges
            .keys()
            .map(|(head, tail)| format!("{} -> {};", head, tail))
            .collect::<Vec<String>>();

        format!(
            "digraph G {{\n{}\n\n{}\n}}",
            vertices.join("\n"),
            edges.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Vertex for usize {
        fn index(&self) -> usize {
            *self
        }

        fn dot_label(&self) -> String {
            self.to_string()
        }
    }

    impl Edge for (usize, usize) {
        fn head(&self) -> usize {
            self.0
        }

        fn tail(&self) -> usize {
            self.1
        }
    }

    /**
     * 1 -> 2 -> 3 -> 5
     *      |         ^
     *      +--> 4 ---+
     *           ^    |
     *           +----+ (5 -> 4 back edge)
     */
    fn create_test_graph() -> Graph<usize, (usize, usize)> {
        let mut graph = Graph::new();

        for i in 1..=5 {
            graph.insert_vertex(i);
        }

        graph.insert_edge((1, 2)).unwrap();
        graph.insert_edge((2, 3)).unwrap();
        graph.insert_edge((2, 4)).unwrap();
        graph.insert_edge((3, 5)).unwrap();
        graph.insert_edge((4, 5)).unwrap();
        graph.insert_edge((5, 4)).unwrap();

        graph
    }

    #[test]
    fn test_reverse_post_order() {
        let graph = create_test_graph();
        let order = graph.compute_reverse_post_order(1).unwrap();

        assert_eq!(order.len(), 5);
        assert_eq!(order[0], 1);
        assert_eq!(order[1], 2);
        let position = |v: usize| order.iter().position(|&x| x == v).unwrap();
        assert!(position(3) < position(5));
    }

    #[test]
    fn test_missing_vertex() {
        let mut graph = create_test_graph();
        assert!(matches!(
            graph.insert_edge((1, 9)),
            Err(Error::GraphVertexNotFound(9))
        ));
        assert!(graph.successor_indices(9).is_err());
    }
}
