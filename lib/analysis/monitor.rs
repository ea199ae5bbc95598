use crate::flowgraph::Node;
use crate::lattice::{Context, ObjectLabel, PKey, Value};
use std::collections::BTreeSet;

/// Observes the analysis as it runs.
///
/// Every hook has an empty default, so a monitor only implements what it
/// cares about.
pub trait Monitor {
    /// A property `key` was written on the objects in `labels`.
    fn visit_property_write(&mut self, _node: &Node, _labels: &BTreeSet<ObjectLabel>, _key: &PKey) {
    }

    /// A variable, or a property standing in for one, was written with
    /// `value`.
    fn visit_variable_or_property(
        &mut self,
        _node: &Node,
        _name: &str,
        _value: &Value,
        _context: &Context,
    ) {
    }

    /// The foreign bridge was asked about `member` of `class`.
    fn visit_foreign_query(&mut self, _node: &Node, _class: &str, _member: &str) {}
}

/// A `Monitor` which ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {}
