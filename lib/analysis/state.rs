//! The abstract program state.

use crate::flowgraph::{Function, Register};
use crate::lattice::{Canonicalizer, Context, Kind, Obj, ObjectLabel, PKey, Value};
use crate::Error;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// The node the global object is labelled with. No flow-graph node has this
/// index.
pub const GLOBAL_OBJECT_NODE: usize = usize::MAX;

/// An abstract program state: registers, heap and context.
///
/// Heap objects are reference counted and shared between states. A state
/// only mutates an object after making it its own, see `object_mut`.
#[derive(Clone, Debug)]
pub struct State {
    registers: FxHashMap<Register, Value>,
    heap: FxHashMap<ObjectLabel, Rc<Obj>>,
    context: Context,
    function: usize,
    global: ObjectLabel,
    // register -> node which definitely wrote it
    must_reaching_defs: FxHashMap<Register, usize>,
    // register -> property it definitely equals
    must_equals: FxHashMap<Register, (ObjectLabel, PKey)>,
    copy_on_write_disabled: bool,
}

impl State {
    /// A state at the entry of `function`, with an empty global object.
    pub fn new(
        canonicalizer: &mut Canonicalizer,
        function: usize,
        context: Context,
        copy_on_write_disabled: bool,
    ) -> State {
        let global = canonicalizer.make_label(GLOBAL_OBJECT_NODE, Kind::Object);
        let mut heap = FxHashMap::default();
        heap.insert(global.clone(), canonicalizer.absent_modified());
        State {
            registers: FxHashMap::default(),
            heap,
            context,
            function,
            global,
            must_reaching_defs: FxHashMap::default(),
            must_equals: FxHashMap::default(),
            copy_on_write_disabled,
        }
    }

    /// Allocate the activation and `arguments` objects of `function`, for a
    /// call passing `arguments`. Parameters without an argument are
    /// `undefined`, as are the declared variables.
    pub fn enter_function(
        &mut self,
        canonicalizer: &mut Canonicalizer,
        function: &Function,
        arguments: &[Value],
    ) -> Result<(), Error> {
        if function.is_main() {
            return Ok(());
        }
        let mut activation = Obj::absent_modified();
        let mut arguments_object = Obj::absent_modified();
        for (index, parameter) in function.parameters().iter().enumerate() {
            let value = arguments.get(index).cloned().unwrap_or_else(Value::undef);
            activation.set_property(PKey::str(parameter.as_str()), value.join_modified())?;
            arguments_object.set_property(PKey::str(index.to_string()), value.join_modified())?;
        }
        for variable in function.variables() {
            activation.set_property(PKey::str(variable.as_str()), Value::undef().join_modified())?;
        }
        trace!(
            "entering {} with {} arguments",
            function.name(),
            arguments.len()
        );
        self.new_object(
            canonicalizer.make_label(function.index(), Kind::Activation),
            activation,
        );
        self.new_object(
            canonicalizer.make_label(function.index(), Kind::Arguments),
            arguments_object,
        );
        Ok(())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The index of the function this state belongs to.
    pub fn function(&self) -> usize {
        self.function
    }

    pub fn global(&self) -> &ObjectLabel {
        &self.global
    }

    /// The value of a register, if it has been written.
    pub fn register(&self, register: Register) -> Option<&Value> {
        self.registers.get(&register)
    }

    /// The value of a register. Reading a register which was never written
    /// is an error.
    pub fn read_register(&self, register: Register) -> Result<&Value, Error> {
        self.registers
            .get(&register)
            .ok_or_else(|| Error::Analysis(format!("Reading undefined register v{}", register)))
    }

    pub fn write_register(&mut self, register: Register, value: Value) {
        self.registers.insert(register, value);
        self.must_equals.remove(&register);
    }

    pub fn add_must_reaching_def(&mut self, register: Register, node: usize) {
        self.must_reaching_defs.insert(register, node);
    }

    /// The node which definitely wrote `register`, if there is one.
    pub fn must_reaching_def(&self, register: Register) -> Option<usize> {
        self.must_reaching_defs.get(&register).cloned()
    }

    /// Record that `register` holds the value of the given property.
    pub fn add_must_equals(&mut self, register: Register, label: ObjectLabel, key: PKey) {
        self.must_equals.insert(register, (label, key));
    }

    pub fn must_equals(&self, register: Register) -> Option<&(ObjectLabel, PKey)> {
        self.must_equals.get(&register)
    }

    pub fn object(&self, label: &ObjectLabel) -> Option<&Obj> {
        self.heap.get(label).map(|obj| obj.as_ref())
    }

    /// Returns true if the object of `label` is the same instance in both
    /// states.
    pub fn shares_object(&self, other: &State, label: &ObjectLabel) -> bool {
        match (self.heap.get(label), other.heap.get(label)) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// A writable view of the object of `label`.
    ///
    /// When the stored object is frozen, or shared with another state, it is
    /// replaced by a private copy first.
    pub fn object_mut(&mut self, label: &ObjectLabel) -> Result<&mut Obj, Error> {
        let copy_on_write_disabled = self.copy_on_write_disabled;
        let entry = self
            .heap
            .get_mut(label)
            .ok_or_else(|| Error::Analysis(format!("No heap object for {}", label)))?;
        let needs_copy = match Rc::get_mut(entry) {
            Some(obj) => !obj.is_writable(),
            None => true,
        };
        if needs_copy {
            trace!("Copying heap object {}", label);
            let copy = if copy_on_write_disabled {
                entry.deep_copy()
            } else {
                entry.copy()
            };
            *entry = Rc::new(copy);
        }
        Rc::get_mut(entry).ok_or_else(|| {
            Error::InternalInvariant(format!("Heap object {} is still shared after copying", label))
        })
    }

    /// Store a freshly allocated object. When `label` already has an object,
    /// the label is a summary and the two are joined.
    pub fn new_object(&mut self, label: ObjectLabel, obj: Obj) {
        let obj = match self.heap.get(&label) {
            Some(existing) => existing.join(&obj),
            None => obj,
        };
        self.heap.insert(label, Rc::new(obj));
    }

    /// Read a property from every object in `labels`.
    pub fn read_property(&self, labels: &BTreeSet<ObjectLabel>, key: &PKey) -> Value {
        labels
            .iter()
            .filter_map(|label| self.object(label))
            .fold(Value::none(), |value, obj| value.join(obj.get_property(key)))
    }

    /// Read every property of every object in `labels`, for a property name
    /// which is not known statically.
    pub fn read_any_property(&self, labels: &BTreeSet<ObjectLabel>) -> Value {
        let mut value = Value::none();
        for obj in labels.iter().filter_map(|label| self.object(label)) {
            value = value
                .join(obj.default_numeric_property())
                .join(obj.default_other_property());
            for property in obj.properties().values() {
                value = value.join(property);
            }
        }
        value
    }

    /// Write a property of every object in `labels`. A single label is
    /// updated strongly, several labels weakly.
    pub fn write_property(
        &mut self,
        labels: &BTreeSet<ObjectLabel>,
        key: &PKey,
        value: &Value,
    ) -> Result<(), Error> {
        self.store_property(labels, key, value, labels.len() == 1)
    }

    /// Write a property of every object in `labels`, keeping what each
    /// object held before.
    pub fn weak_write_property(
        &mut self,
        labels: &BTreeSet<ObjectLabel>,
        key: &PKey,
        value: &Value,
    ) -> Result<(), Error> {
        self.store_property(labels, key, value, false)
    }

    fn store_property(
        &mut self,
        labels: &BTreeSet<ObjectLabel>,
        key: &PKey,
        value: &Value,
        strong: bool,
    ) -> Result<(), Error> {
        let value = value.join_modified();
        for label in labels {
            if !self.heap.contains_key(label) {
                self.heap
                    .insert(label.clone(), Rc::new(Obj::absent_modified()));
            }
            let obj = self.object_mut(label)?;
            let new_value = if strong {
                value.clone()
            } else {
                obj.get_property(key).join(&value)
            };
            obj.set_property(key.clone(), new_value)?;
        }
        Ok(())
    }

    /// Write a value to every property of every object in `labels`, for a
    /// property name which is not known statically.
    pub fn write_any_property(
        &mut self,
        labels: &BTreeSet<ObjectLabel>,
        value: &Value,
    ) -> Result<(), Error> {
        let value = value.join_absent().join_modified();
        for label in labels {
            if !self.heap.contains_key(label) {
                continue;
            }
            let obj = self.object_mut(label)?;
            let numeric = obj.default_numeric_property().join(&value);
            obj.set_default_numeric_property(numeric)?;
            let other = obj.default_other_property().join(&value);
            obj.set_default_other_property(other)?;
            let properties = obj
                .properties()
                .iter()
                .map(|(key, property)| (key.clone(), property.join(&value)))
                .collect();
            obj.set_properties(properties)?;
        }
        Ok(())
    }

    /// The object holding the variable `name` in `function`: its activation
    /// object when the function declares it, the global object otherwise.
    pub fn variable_object(
        &self,
        canonicalizer: &mut Canonicalizer,
        function: &Function,
        name: &str,
    ) -> ObjectLabel {
        if !function.is_main() && function.declares(name) {
            canonicalizer.make_label(function.index(), Kind::Activation)
        } else {
            self.global.clone()
        }
    }

    /// Read the variable `name`. A variable which may be absent reads as
    /// `undefined` as well.
    pub fn read_variable(
        &self,
        canonicalizer: &mut Canonicalizer,
        function: &Function,
        name: &str,
    ) -> Value {
        let label = self.variable_object(canonicalizer, function, name);
        let value = self
            .object(&label)
            .map(|obj| obj.get_property(&PKey::str(name)).clone())
            .unwrap_or_else(Value::absent);
        let present = value
            .restrict_to_not_absent()
            .restrict_to_not_modified()
            .remove_attributes();
        if value.is_maybe_absent() {
            present.join(&Value::undef())
        } else {
            present
        }
    }

    /// Write the variable `name`. Returns the objects written to, and whether
    /// the write was definite.
    pub fn write_variable(
        &mut self,
        canonicalizer: &mut Canonicalizer,
        function: &Function,
        name: &str,
        value: &Value,
    ) -> Result<(BTreeSet<ObjectLabel>, bool), Error> {
        let label = self.variable_object(canonicalizer, function, name);
        let labels: BTreeSet<ObjectLabel> = std::iter::once(label).collect();
        self.write_property(&labels, &PKey::str(name), value)?;
        Ok((labels, true))
    }

    /// Freeze every heap object, so this state can be cloned and shared.
    pub fn freeze_heap(&mut self) {
        for obj in self.heap.values_mut() {
            if obj.is_writable() {
                *obj = Rc::new(obj.copy().freeze());
            }
        }
    }

    /// Join `other` into this state. Returns true if this state changed.
    pub fn join(&mut self, other: &State) -> bool {
        let mut changed = false;

        for (register, value) in other.registers.iter() {
            let joined = match self.registers.get(register) {
                Some(existing) if existing == value => continue,
                Some(existing) => {
                    let joined = existing.join(value);
                    if &joined == existing {
                        continue;
                    }
                    joined
                }
                None => value.clone(),
            };
            self.registers.insert(*register, joined);
            changed = true;
        }

        for (label, obj) in other.heap.iter() {
            let joined = match self.heap.get(label) {
                Some(existing) if Rc::ptr_eq(existing, obj) || **existing == **obj => continue,
                Some(existing) => {
                    let joined = existing.join(obj);
                    if joined == **existing {
                        continue;
                    }
                    Rc::new(joined.freeze())
                }
                None if obj.is_writable() => Rc::new(obj.copy().freeze()),
                None => obj.clone(),
            };
            self.heap.insert(label.clone(), joined);
            changed = true;
        }

        let defs = &other.must_reaching_defs;
        self.must_reaching_defs
            .retain(|register, node| defs.get(register) == Some(node));
        let equals = &other.must_equals;
        self.must_equals
            .retain(|register, property| equals.get(register) == Some(property));

        changed
    }

    /// Render this state as JSON, for diagnostics.
    pub fn to_json(&self) -> Result<String, Error> {
        #[derive(Serialize)]
        struct View<'s> {
            context: &'s Context,
            function: usize,
            registers: BTreeMap<Register, &'s Value>,
            heap: BTreeMap<String, &'s Obj>,
        }
        let view = View {
            context: &self.context,
            function: self.function,
            registers: self.registers.iter().map(|(r, v)| (*r, v)).collect(),
            heap: self
                .heap
                .iter()
                .map(|(label, obj)| (label.to_string(), obj.as_ref()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::FlowGraph;

    fn state(canonicalizer: &mut Canonicalizer) -> State {
        State::new(canonicalizer, 0, Context::main(), false)
    }

    #[test]
    fn object_mut_copies_shared_objects() {
        let mut canonicalizer = Canonicalizer::new();
        let label = canonicalizer.make_label(1, Kind::Object);
        let mut a = state(&mut canonicalizer);
        a.new_object(label.clone(), Obj::absent_modified());
        a.freeze_heap();

        let b = a.clone();
        assert!(a.shares_object(&b, &label));

        a.object_mut(&label)
            .unwrap()
            .set_property(PKey::str("x"), Value::null())
            .unwrap();
        assert!(!a.shares_object(&b, &label));
        assert_eq!(
            b.object(&label).unwrap().get_property(&PKey::str("x")),
            &Value::absent_modified()
        );
        assert_eq!(
            a.object(&label).unwrap().get_property(&PKey::str("x")),
            &Value::null()
        );
    }

    #[test]
    fn strong_and_weak_property_writes() {
        let mut canonicalizer = Canonicalizer::new();
        let o1 = canonicalizer.make_label(1, Kind::Object);
        let o2 = canonicalizer.make_label(2, Kind::Object);
        let mut s = state(&mut canonicalizer);
        s.new_object(o1.clone(), Obj::absent_modified());
        s.new_object(o2.clone(), Obj::absent_modified());

        let one: BTreeSet<ObjectLabel> = std::iter::once(o1.clone()).collect();
        let both: BTreeSet<ObjectLabel> = vec![o1.clone(), o2.clone()].into_iter().collect();
        let key = PKey::str("p");

        s.write_property(&one, &key, &Value::null()).unwrap();
        s.write_property(&one, &key, &Value::undef()).unwrap();
        assert_eq!(s.read_property(&one, &key), Value::undef().join_modified());

        s.write_property(&both, &key, &Value::str("s")).unwrap();
        let read = s.read_property(&both, &key);
        assert!(read.is_maybe_undef());
        assert!(read.is_maybe_str());
        assert!(read.is_maybe_absent());

        let before = s.read_property(&one, &key);
        s.weak_write_property(&one, &key, &Value::null()).unwrap();
        assert_eq!(
            s.read_property(&one, &key),
            before.join(&Value::null().join_modified())
        );
    }

    #[test]
    fn entering_a_function_binds_parameters() {
        let mut canonicalizer = Canonicalizer::new();
        let mut flow_graph = FlowGraph::new();
        let f = flow_graph.add_function(
            "f",
            vec!["a".to_string(), "b".to_string()],
            vec!["x".to_string()],
        );
        let function = flow_graph.function(f).unwrap().clone();
        let mut s = State::new(&mut canonicalizer, f, Context::main(), false);
        s.enter_function(&mut canonicalizer, &function, &[Value::null()])
            .unwrap();

        assert_eq!(s.read_variable(&mut canonicalizer, &function, "a"), Value::null());
        assert_eq!(s.read_variable(&mut canonicalizer, &function, "b"), Value::undef());
        assert_eq!(s.read_variable(&mut canonicalizer, &function, "x"), Value::undef());

        let arguments = canonicalizer.make_label(f, Kind::Arguments);
        let arguments = s.object(&arguments).unwrap();
        assert_eq!(arguments.get_property(&PKey::str("0")), &Value::null().join_modified());
        assert_eq!(arguments.get_property(&PKey::str("1")), &Value::undef().join_modified());
    }

    #[test]
    fn variables_live_in_activation_or_global_object() {
        let mut canonicalizer = Canonicalizer::new();
        let mut flow_graph = FlowGraph::new();
        let f = flow_graph.add_function("f", vec!["a".to_string()], Vec::new());
        let function = flow_graph.function(f).unwrap().clone();
        let mut s = State::new(&mut canonicalizer, f, Context::main(), false);
        let activation = canonicalizer.make_label(f, Kind::Activation);
        s.new_object(activation.clone(), Obj::absent_modified());

        let (labels, definite) = s
            .write_variable(&mut canonicalizer, &function, "a", &Value::null())
            .unwrap();
        assert!(definite);
        assert!(labels.contains(&activation));
        let (labels, _) = s
            .write_variable(&mut canonicalizer, &function, "g", &Value::any_num())
            .unwrap();
        assert!(labels.contains(s.global()));

        assert_eq!(
            s.read_variable(&mut canonicalizer, &function, "a"),
            Value::null()
        );
        assert_eq!(
            s.read_variable(&mut canonicalizer, &function, "g"),
            Value::any_num()
        );
        assert_eq!(
            s.read_variable(&mut canonicalizer, &function, "missing"),
            Value::undef()
        );
    }

    #[test]
    fn join_reports_growth() {
        let mut canonicalizer = Canonicalizer::new();
        let label = canonicalizer.make_label(1, Kind::Object);
        let mut a = state(&mut canonicalizer);
        a.write_register(0, Value::null());
        a.add_must_reaching_def(0, 3);
        a.new_object(label.clone(), Obj::absent_modified());
        a.freeze_heap();

        let mut b = a.clone();
        assert!(!a.join(&b));

        b.write_register(0, Value::undef());
        b.add_must_reaching_def(0, 4);
        let one: BTreeSet<ObjectLabel> = std::iter::once(label.clone()).collect();
        b.write_property(&one, &PKey::str("x"), &Value::null())
            .unwrap();

        assert!(a.join(&b));
        assert_eq!(
            a.read_register(0).unwrap(),
            &Value::null().join(&Value::undef())
        );
        assert_eq!(a.must_reaching_def(0), None);
        assert!(a
            .object(&label)
            .unwrap()
            .get_property(&PKey::str("x"))
            .is_maybe_absent());
        assert!(!a.join(&b));
    }

    #[test]
    fn undefined_register() {
        let mut canonicalizer = Canonicalizer::new();
        let s = state(&mut canonicalizer);
        assert!(matches!(s.read_register(7), Err(Error::Analysis(_))));
        assert!(s.register(7).is_none());
    }

    #[test]
    fn json_dump() {
        let mut canonicalizer = Canonicalizer::new();
        let mut s = state(&mut canonicalizer);
        s.write_register(2, Value::str("x"));
        let json = s.to_json().unwrap();
        assert!(json.contains("\"registers\""));
        assert!(json.contains("@Object#node"));
    }
}
