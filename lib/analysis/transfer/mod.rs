//! Per-node transfer functions.
//!
//! A `Dispatcher` maps every `NodeKind` to a `Handler`. The base table in
//! `base` gives the ordinary semantics. An extension layer, such as
//! `foreign::layer`, is a partial table merged over the base table. Its
//! handlers may delegate to the base handler of the same kind through
//! `Dispatcher::fallback`.
//!
//! A handler returns `Propagation::Default` when the driver should continue
//! as usual, and `Propagation::Handled` when the handler has already pushed
//! the resulting state to the successor block itself.

pub mod base;
pub mod foreign;

use crate::analysis::{Monitor, Propagator, State};
use crate::bridge::ForeignBridge;
use crate::flowgraph::{BasicBlock, FlowGraph, Node, NodeKind};
use crate::lattice::Canonicalizer;
use crate::{Error, Options};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt;

/// What the driver should do after a node has been transferred.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Propagation {
    /// Continue with the next node, or propagate to every successor.
    Default,
    /// The handler propagated the state itself. The rest of the block is
    /// skipped.
    Handled,
}

/// Everything a handler may read or modify.
pub struct TransferContext<'a> {
    pub state: &'a mut State,
    pub flow_graph: &'a FlowGraph,
    pub canonicalizer: &'a mut Canonicalizer,
    pub bridge: &'a mut dyn ForeignBridge,
    pub monitor: &'a mut dyn Monitor,
    pub propagator: &'a mut dyn Propagator,
    pub options: &'a Options,
}

/// A transfer function for one kind of node.
pub type Handler = fn(&Dispatcher, &mut TransferContext<'_>, &Node) -> Result<Propagation, Error>;

/// A, possibly partial, map from node kinds to handlers.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: FxHashMap<NodeKind, Handler>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

impl HandlerTable {
    pub fn new() -> HandlerTable {
        HandlerTable::default()
    }

    pub fn insert(&mut self, kind: NodeKind, handler: Handler) -> &mut HandlerTable {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: NodeKind) -> Option<Handler> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> BTreeSet<NodeKind> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Dispatches nodes to their transfer functions.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    base: HandlerTable,
    effective: HandlerTable,
    overrides: BTreeSet<NodeKind>,
}

impl Dispatcher {
    /// A dispatcher with the ordinary semantics only.
    pub fn new() -> Dispatcher {
        let base = base::table();
        Dispatcher {
            effective: base.clone(),
            base,
            overrides: BTreeSet::new(),
        }
    }

    /// Merge `layer` over the current handlers. Later layers win.
    pub fn with_layer(mut self, layer: HandlerTable) -> Dispatcher {
        for (kind, handler) in layer.handlers {
            self.effective.insert(kind, handler);
            self.overrides.insert(kind);
        }
        self
    }

    /// Returns true if some layer overrides the base handler for `kind`.
    pub fn is_overridden(&self, kind: NodeKind) -> bool {
        self.overrides.contains(&kind)
    }

    /// Transfer a single node with its effective handler.
    pub fn dispatch(
        &self,
        ctx: &mut TransferContext<'_>,
        node: &Node,
    ) -> Result<Propagation, Error> {
        trace!("transfer {}", node);
        let handler = self.effective.get(node.kind()).ok_or_else(|| {
            Error::InternalInvariant(format!("No transfer function for {:?}", node.kind()))
        })?;
        handler(self, ctx, node)
    }

    /// Transfer a node with the base handler, ignoring every layer.
    pub fn fallback(
        &self,
        ctx: &mut TransferContext<'_>,
        node: &Node,
    ) -> Result<Propagation, Error> {
        let handler = self.base.get(node.kind()).ok_or_else(|| {
            Error::InternalInvariant(format!("No base transfer function for {:?}", node.kind()))
        })?;
        handler(self, ctx, node)
    }

    /// Transfer every node of `block` in order. Only the last node of a block
    /// may propagate the state itself.
    pub fn transfer_block(
        &self,
        ctx: &mut TransferContext<'_>,
        block: &BasicBlock,
    ) -> Result<Propagation, Error> {
        let nodes = block.nodes();
        for (position, node) in nodes.iter().enumerate() {
            if self.dispatch(ctx, node)? == Propagation::Handled {
                if position + 1 != nodes.len() {
                    return Err(Error::InternalInvariant(format!(
                        "Node {} propagated block {} with {} nodes left",
                        node.index(),
                        block.index(),
                        nodes.len() - position - 1
                    )));
                }
                return Ok(Propagation::Handled);
            }
        }
        Ok(Propagation::Default)
    }
}

impl Default for Dispatcher {
    fn default() -> Dispatcher {
        Dispatcher::new()
    }
}

/// Clone the current state and push it to the single successor of the
/// node's block. Used by handlers which return `Propagation::Handled`.
pub fn propagate_clone(ctx: &mut TransferContext<'_>, node: &Node) -> Result<(), Error> {
    let successor = ctx.flow_graph.single_successor(node.block())?;
    ctx.state.freeze_heap();
    let state = ctx.state.clone();
    let context = state.context().clone();
    debug!(
        "node {} propagates to block {} in context {}",
        node.index(),
        successor,
        context
    );
    ctx.propagator
        .propagate_to_basic_block(state, successor, &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_: &Dispatcher, _: &mut TransferContext<'_>, _: &Node) -> Result<Propagation, Error> {
        Ok(Propagation::Handled)
    }

    #[test]
    fn layers_override_single_kinds() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.is_overridden(NodeKind::Nop));

        let mut layer = HandlerTable::new();
        layer.insert(NodeKind::Nop, nop);
        let dispatcher = dispatcher.with_layer(layer);
        assert!(dispatcher.is_overridden(NodeKind::Nop));
        assert!(!dispatcher.is_overridden(NodeKind::Call));
        assert_eq!(dispatcher.effective.len(), dispatcher.base.len());
    }

    #[test]
    fn base_table_is_total() {
        let kinds = base::table().kinds();
        for kind in [
            NodeKind::Constant,
            NodeKind::ReadVariable,
            NodeKind::WriteVariable,
            NodeKind::ReadProperty,
            NodeKind::WriteProperty,
            NodeKind::NewObject,
            NodeKind::Call,
            NodeKind::BinaryOperator,
            NodeKind::ForeignMarker,
            NodeKind::Nop,
        ]
        .iter()
        {
            assert!(kinds.contains(kind), "{:?}", kind);
        }
    }
}
