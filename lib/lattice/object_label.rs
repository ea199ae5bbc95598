//! Identities of abstract heap objects.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// The kind of an abstract object.
///
/// Other components branch exhaustively on `Kind`, so this enumeration is
/// closed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Kind {
    Object,
    Function,
    Array,
    Symbol,
    String,
    Number,
    Boolean,
    Date,
    RegExp,
    Error,
    Math,
    Activation,
    Arguments,
    /// An instance of a foreign class.
    ForeignObject,
    /// An uninstantiated foreign class, the value of `Java.type(name)`.
    ForeignTypeToken,
    /// The foreign namespace root, the value of `Java`.
    ForeignRoot,
}

impl Kind {
    /// Returns true for the kinds which are modelled by the foreign bridge.
    pub fn is_foreign(&self) -> bool {
        matches!(
            self,
            Kind::ForeignObject | Kind::ForeignTypeToken | Kind::ForeignRoot
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Kind::Object => "Object",
            Kind::Function => "Function",
            Kind::Array => "Array",
            Kind::Symbol => "Symbol",
            Kind::String => "String",
            Kind::Number => "Number",
            Kind::Boolean => "Boolean",
            Kind::Date => "Date",
            Kind::RegExp => "RegExp",
            Kind::Error => "Error",
            Kind::Math => "Math",
            Kind::Activation => "activation",
            Kind::Arguments => "arguments",
            Kind::ForeignObject => "ForeignObject",
            Kind::ForeignTypeToken => "ForeignType",
            Kind::ForeignRoot => "ForeignRoot",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
struct LabelKey {
    node: usize,
    kind: Kind,
    foreign_name: Option<String>,
}

/// The interned identity of one abstract heap object.
///
/// Two labels are equal when their originating node, kind and foreign class
/// name are equal. Labels created through the same `LabelTable` share one
/// allocation, which makes the common comparison a pointer comparison.
#[derive(Clone, Debug, Serialize)]
pub struct ObjectLabel(Rc<LabelKey>);

impl ObjectLabel {
    /// The index of the flow-graph node this label was created at.
    pub fn node(&self) -> usize {
        self.0.node
    }

    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    /// The foreign class name. Only set for `ForeignObject` and
    /// `ForeignTypeToken` labels.
    pub fn foreign_name(&self) -> Option<&str> {
        self.0.foreign_name.as_deref()
    }

    pub fn is_foreign(&self) -> bool {
        self.0.kind.is_foreign()
    }
}

impl PartialEq for ObjectLabel {
    fn eq(&self, other: &ObjectLabel) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for ObjectLabel {}

impl Hash for ObjectLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl PartialOrd for ObjectLabel {
    fn partial_cmp(&self, other: &ObjectLabel) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectLabel {
    fn cmp(&self, other: &ObjectLabel) -> Ordering {
        self.0
            .node
            .cmp(&other.0.node)
            .then(self.0.kind.cmp(&other.0.kind))
            .then_with(|| self.0.foreign_name.cmp(&other.0.foreign_name))
    }
}

impl fmt::Display for ObjectLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.foreign_name {
            Some(ref name) => write!(f, "@{}<{}>#node{}", self.0.kind, name, self.0.node),
            None => write!(f, "@{}#node{}", self.0.kind, self.0.node),
        }
    }
}

/// Canonicalization table for `ObjectLabel`.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: FxHashMap<LabelKey, ObjectLabel>,
}

impl LabelTable {
    pub fn new() -> LabelTable {
        LabelTable::default()
    }

    fn canonicalize(&mut self, key: LabelKey) -> ObjectLabel {
        self.labels
            .entry(key)
            .or_insert_with_key(|key| ObjectLabel(Rc::new(key.clone())))
            .clone()
    }

    /// Get the label of kind `kind` created at `node`.
    pub fn make(&mut self, node: usize, kind: Kind) -> ObjectLabel {
        self.canonicalize(LabelKey {
            node,
            kind,
            foreign_name: None,
        })
    }

    /// Get the label of a foreign kind created at `node` for the foreign class
    /// `foreign_name`.
    pub fn make_foreign<S: Into<String>>(
        &mut self,
        node: usize,
        kind: Kind,
        foreign_name: S,
    ) -> ObjectLabel {
        self.canonicalize(LabelKey {
            node,
            kind,
            foreign_name: Some(foreign_name.into()),
        })
    }

    /// The label of this table equal to `label`, which may have been created
    /// elsewhere.
    pub fn intern(&mut self, label: &ObjectLabel) -> ObjectLabel {
        self.canonicalize(label.0.as_ref().clone())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
