use crate::lattice::{
    Context, Kind, LabelTable, Obj, ObjectLabel, PKey, PartitionToken, TokenTable, TypeTag, Value,
};
use std::rc::Rc;

/// Owns the intern tables and the shared `Obj` templates of one analysis run.
///
/// A `Canonicalizer` is passed by reference to everything which creates
/// labels or tokens. Its tables only grow during a run. Call `reset` before
/// starting an independent run.
#[derive(Debug)]
pub struct Canonicalizer {
    run: u64,
    labels: LabelTable,
    tokens: TokenTable,
    none: Rc<Obj>,
    none_modified: Rc<Obj>,
    absent_modified: Rc<Obj>,
    unknown: Rc<Obj>,
}

impl Canonicalizer {
    pub fn new() -> Canonicalizer {
        Canonicalizer::for_run(0)
    }

    fn for_run(run: u64) -> Canonicalizer {
        Canonicalizer {
            run,
            labels: LabelTable::new(),
            tokens: TokenTable::new(run),
            none: Rc::new(Obj::none().freeze()),
            none_modified: Rc::new(Obj::none_modified().freeze()),
            absent_modified: Rc::new(Obj::absent_modified().freeze()),
            unknown: Rc::new(Obj::unknown().freeze()),
        }
    }

    /// Drop every interned label and token and start a new run.
    pub fn reset(&mut self) {
        let run = self.run + 1;
        debug!(
            "Resetting canonicalizer after run {} ({} labels, {} tokens)",
            self.run,
            self.labels.len(),
            self.tokens.len()
        );
        *self = Canonicalizer::for_run(run);
    }

    /// The current run. Errors raised during a run are tagged with it.
    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    pub fn make_label(&mut self, node: usize, kind: Kind) -> ObjectLabel {
        self.labels.make(node, kind)
    }

    pub fn make_foreign_label<S: Into<String>>(
        &mut self,
        node: usize,
        kind: Kind,
        foreign_name: S,
    ) -> ObjectLabel {
        self.labels.make_foreign(node, kind, foreign_name)
    }

    /// Replace every object label of `value` by the label of this run. Used
    /// for values built outside the run, such as the answers of a foreign
    /// bridge.
    pub fn canonicalize_value(&mut self, value: &Value) -> Value {
        value
            .all_object_labels()
            .iter()
            .fold(value.clone(), |value, label| {
                let interned = self.labels.intern(label);
                value.replace_object_label(label, &interned)
            })
    }

    pub fn make_property_name_token(&mut self, node: usize, property: PKey) -> PartitionToken {
        self.tokens.make_property_name(node, property)
    }

    pub fn make_type_token(&mut self, node: usize, tag: TypeTag) -> PartitionToken {
        self.tokens.make_type(node, tag)
    }

    pub fn make_function_token(
        &mut self,
        node: usize,
        context: Context,
        nested: Option<PartitionToken>,
    ) -> PartitionToken {
        self.tokens.make_function(node, context, nested)
    }

    /// The frozen object where every property is none.
    pub fn none(&self) -> Rc<Obj> {
        self.none.clone()
    }

    pub fn none_modified(&self) -> Rc<Obj> {
        self.none_modified.clone()
    }

    pub fn absent_modified(&self) -> Rc<Obj> {
        self.absent_modified.clone()
    }

    pub fn unknown(&self) -> Rc<Obj> {
        self.unknown.clone()
    }
}

impl Default for Canonicalizer {
    fn default() -> Canonicalizer {
        Canonicalizer::new()
    }
}
