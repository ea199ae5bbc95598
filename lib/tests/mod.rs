//! Scenario tests, and the harness they share with the unit tests.

use crate::analysis::transfer::{foreign, Dispatcher, Propagation, TransferContext};
use crate::analysis::{Monitor, Propagator, State};
use crate::bridge::TableBridge;
use crate::flowgraph::{FlowGraph, Node, Operation, Register};
use crate::lattice::{Canonicalizer, Context, ObjectLabel, PKey, Value};
use crate::{Error, Options};
use std::collections::BTreeSet;

mod driver;

/// Records every state pushed to a successor block.
#[derive(Debug, Default)]
pub(crate) struct RecordingPropagator {
    pub pushes: Vec<(usize, Context)>,
    pub states: Vec<State>,
}

impl Propagator for RecordingPropagator {
    fn propagate_to_basic_block(
        &mut self,
        state: State,
        block: usize,
        context: &Context,
    ) -> Result<(), Error> {
        self.pushes.push((block, context.clone()));
        self.states.push(state);
        Ok(())
    }
}

/// Records the monitor hooks, by node index.
#[derive(Debug, Default)]
pub(crate) struct RecordingMonitor {
    pub property_writes: Vec<(usize, BTreeSet<ObjectLabel>, PKey)>,
    pub variables: Vec<(usize, String, Value)>,
    pub foreign_queries: Vec<(usize, String, String)>,
}

impl Monitor for RecordingMonitor {
    fn visit_property_write(&mut self, node: &Node, labels: &BTreeSet<ObjectLabel>, key: &PKey) {
        self.property_writes
            .push((node.index(), labels.clone(), key.clone()));
    }

    fn visit_variable_or_property(
        &mut self,
        node: &Node,
        name: &str,
        value: &Value,
        _context: &Context,
    ) {
        self.variables
            .push((node.index(), name.to_string(), value.clone()));
    }

    fn visit_foreign_query(&mut self, node: &Node, class: &str, member: &str) {
        self.foreign_queries
            .push((node.index(), class.to_string(), member.to_string()));
    }
}

/// A single block of the program body, with one successor, and everything
/// needed to transfer its nodes directly.
pub(crate) struct Harness {
    pub flow_graph: FlowGraph,
    pub block: usize,
    pub successor: usize,
    pub canonicalizer: Canonicalizer,
    pub state: State,
    pub bridge: TableBridge,
    pub monitor: RecordingMonitor,
    pub propagator: RecordingPropagator,
    pub options: Options,
}

impl Harness {
    pub fn new() -> Harness {
        let flow_graph = FlowGraph::new();
        let main = flow_graph.main().unwrap().index();
        Harness::for_function(flow_graph, main)
    }

    /// A harness for the entry block of a function `f` declaring
    /// `parameters`, entered without arguments.
    pub fn in_function(parameters: &[&str]) -> Harness {
        let mut flow_graph = FlowGraph::new();
        let parameters = parameters.iter().map(|p| p.to_string()).collect();
        let f = flow_graph.add_function("f", parameters, Vec::new());
        let mut harness = Harness::for_function(flow_graph, f);
        let function = harness.flow_graph.function(f).unwrap().clone();
        harness
            .state
            .enter_function(&mut harness.canonicalizer, &function, &[])
            .unwrap();
        harness
    }

    fn for_function(mut flow_graph: FlowGraph, function: usize) -> Harness {
        let block = flow_graph.function(function).unwrap().entry();
        let successor = flow_graph.new_block(function).unwrap();
        flow_graph.edge(block, successor).unwrap();
        let mut canonicalizer = Canonicalizer::new();
        let state = State::new(&mut canonicalizer, function, Context::main(), false);
        Harness {
            flow_graph,
            block,
            successor,
            canonicalizer,
            state,
            bridge: TableBridge::new(),
            monitor: RecordingMonitor::default(),
            propagator: RecordingPropagator::default(),
            options: Options::new(),
        }
    }

    /// Append a node to the block. Returns its index.
    pub fn node(&mut self, operation: Operation) -> usize {
        self.flow_graph.add_node(self.block, operation).unwrap()
    }

    /// Transfer the whole block with the ordinary semantics.
    pub fn run_base(&mut self) -> Result<Propagation, Error> {
        self.run(&Dispatcher::new())
    }

    /// Transfer the whole block with the foreign layer in place.
    pub fn run_foreign(&mut self) -> Result<Propagation, Error> {
        self.run(&Dispatcher::new().with_layer(foreign::layer()))
    }

    pub fn run(&mut self, dispatcher: &Dispatcher) -> Result<Propagation, Error> {
        let block = self.flow_graph.block(self.block)?;
        let mut ctx = TransferContext {
            state: &mut self.state,
            flow_graph: &self.flow_graph,
            canonicalizer: &mut self.canonicalizer,
            bridge: &mut self.bridge,
            monitor: &mut self.monitor,
            propagator: &mut self.propagator,
            options: &self.options,
        };
        dispatcher.transfer_block(&mut ctx, block)
    }

    /// The value of a register which must have been written.
    pub fn register(&self, register: Register) -> Value {
        self.state.register(register).cloned().unwrap()
    }
}
