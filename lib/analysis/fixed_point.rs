//! A worklist driver computing a fixed point over a `FlowGraph`.
//!
//! The driver keeps one entry state per (block, context) pair. A pair is
//! processed by transferring every node of its block, in order, on a copy of
//! its entry state. Unless a handler took over propagation, the resulting
//! state is then merged into the entry states of every successor block. A
//! pair is queued again whenever its entry state grows.

use crate::analysis::transfer::{Dispatcher, Propagation, TransferContext};
use crate::analysis::{Monitor, Propagator, State};
use crate::bridge::ForeignBridge;
use crate::flowgraph::FlowGraph;
use crate::lattice::{Canonicalizer, Context, Value};
use crate::{BlockAndContext, Error, Options};
use std::collections::{BTreeMap, BTreeSet};

/// The entry states of every (block, context) pair reached so far.
#[derive(Debug, Default)]
struct BlockStates {
    states: BTreeMap<(usize, Context), State>,
    // pairs whose entry state changed since they were last queued
    pending: Vec<(usize, Context)>,
}

impl Propagator for BlockStates {
    fn propagate_to_basic_block(
        &mut self,
        mut state: State,
        block: usize,
        context: &Context,
    ) -> Result<(), Error> {
        let key = (block, context.clone());
        let changed = match self.states.get_mut(&key) {
            Some(entry) => entry.join(&state),
            None => {
                state.freeze_heap();
                self.states.insert(key.clone(), state);
                true
            }
        };
        if changed {
            trace!("entry state of block {} in context {} changed", block, context);
            self.pending.push(key);
        }
        Ok(())
    }
}

/// The result of an analysis run.
#[derive(Debug)]
pub struct AnalysisResult {
    run: u64,
    states: BTreeMap<(usize, Context), State>,
    iterations: usize,
    unsound: Vec<Error>,
}

impl AnalysisResult {
    /// The run of the canonicalizer this result belongs to.
    pub fn run(&self) -> u64 {
        self.run
    }

    /// The entry state of `block` under `context`, if it was reached.
    pub fn state(&self, block: usize, context: &Context) -> Option<&State> {
        self.states.get(&(block, context.clone()))
    }

    pub fn states(&self) -> &BTreeMap<(usize, Context), State> {
        &self.states
    }

    /// The number of (block, context) pairs processed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The cross-language errors the run continued past. Each marks a point
    /// from which the result may be unsound.
    pub fn unsound(&self) -> &[Error] {
        &self.unsound
    }

    pub fn is_sound(&self) -> bool {
        self.unsound.is_empty()
    }
}

/// A forward analysis of a flow graph with a given dispatcher.
pub struct Analysis<'a> {
    flow_graph: &'a FlowGraph,
    dispatcher: &'a Dispatcher,
    options: &'a Options,
}

impl<'a> Analysis<'a> {
    pub fn new(
        flow_graph: &'a FlowGraph,
        dispatcher: &'a Dispatcher,
        options: &'a Options,
    ) -> Analysis<'a> {
        Analysis {
            flow_graph,
            dispatcher,
            options,
        }
    }

    /// Run the analysis from the entry of the program body and of every
    /// other function.
    ///
    /// The canonicalizer is reset first, so labels and tokens of earlier runs
    /// are not reused.
    pub fn run(
        &self,
        canonicalizer: &mut Canonicalizer,
        bridge: &mut dyn ForeignBridge,
        monitor: &mut dyn Monitor,
    ) -> Result<AnalysisResult, Error> {
        canonicalizer.reset();
        let run = canonicalizer.run();
        self.flow_graph.check()?;

        let main = self.flow_graph.main()?;
        let entry = main.entry();
        let priorities: BTreeMap<usize, usize> = self
            .flow_graph
            .graph()
            .compute_reverse_post_order(entry)?
            .into_iter()
            .enumerate()
            .map(|(priority, block)| (block, priority))
            .collect();
        let priority = |block: usize| priorities.get(&block).cloned().unwrap_or(usize::MAX);

        let mut block_states = BlockStates::default();
        let initial = State::new(
            canonicalizer,
            main.index(),
            Context::main(),
            self.options.copy_on_write_disabled(),
        );
        block_states.propagate_to_basic_block(initial, entry, &Context::main())?;

        // Calls are not resolved, so every other function is entered once
        // from an unknown caller.
        for function in self.flow_graph.functions().iter().filter(|f| !f.is_main()) {
            let mut state = State::new(
                canonicalizer,
                function.index(),
                Context::main(),
                self.options.copy_on_write_disabled(),
            );
            let arguments = vec![Value::any_primitive(); function.parameters().len()];
            state.enter_function(canonicalizer, function, &arguments)?;
            block_states.propagate_to_basic_block(state, function.entry(), &Context::main())?;
        }

        let mut queue: BTreeSet<(usize, usize, Context)> = BTreeSet::new();
        let mut iterations = 0;
        let mut unsound = Vec::new();

        loop {
            for (block, context) in block_states.pending.drain(..) {
                queue.insert((priority(block), block, context));
            }
            let (block_index, context) = match queue.iter().next().cloned() {
                Some(next) => {
                    queue.remove(&next);
                    (next.1, next.2)
                }
                None => break,
            };

            iterations += 1;
            if iterations > self.options.max_iterations() {
                return Err(Error::Analysis(format!(
                    "No fixed point after {} iterations",
                    self.options.max_iterations()
                )));
            }
            trace!(
                "iteration {}: block {} in context {}",
                iterations,
                block_index,
                context
            );

            let mut state = block_states
                .states
                .get(&(block_index, context.clone()))
                .cloned()
                .ok_or_else(|| {
                    Error::InternalInvariant(format!(
                        "Block {} in context {} was queued without a state",
                        block_index, context
                    ))
                })?;
            let block = self.flow_graph.block(block_index)?;

            let outcome = {
                let mut ctx = TransferContext {
                    state: &mut state,
                    flow_graph: self.flow_graph,
                    canonicalizer: &mut *canonicalizer,
                    bridge: &mut *bridge,
                    monitor: &mut *monitor,
                    propagator: &mut block_states,
                    options: self.options,
                };
                self.dispatcher.transfer_block(&mut ctx, block)
            };

            match outcome {
                Ok(Propagation::Default) => {
                    state.freeze_heap();
                    for successor in self.flow_graph.successor_indices(block_index)? {
                        block_states.propagate_to_basic_block(
                            state.clone(),
                            successor,
                            &context,
                        )?;
                    }
                }
                Ok(Propagation::Handled) => {}
                Err(error) => {
                    let error = error.at(
                        run,
                        BlockAndContext {
                            block: block_index,
                            context: context.clone(),
                        },
                    );
                    if error.is_fatal() || !self.options.continue_on_cross_language_error() {
                        return Err(error);
                    }
                    warn!("{}", error);
                    unsound.push(error);
                }
            }
        }

        debug!(
            "run {} reached a fixed point after {} iterations",
            run, iterations
        );
        Ok(AnalysisResult {
            run,
            states: block_states.states,
            iterations,
            unsound,
        })
    }
}
