use crate::lattice::{ObjectLabel, PKey};
use serde::Serialize;
use std::fmt;

/// Which slot of an abstract object a property reference designates.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum PropertyKind {
    Ordinary(PKey),
    DefaultNumeric,
    DefaultOther,
    InternalValue,
    InternalPrototype,
}

/// A reference to one slot of one abstract object.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ObjectProperty {
    label: ObjectLabel,
    kind: PropertyKind,
}

impl ObjectProperty {
    pub fn new(label: ObjectLabel, kind: PropertyKind) -> ObjectProperty {
        ObjectProperty { label, kind }
    }

    pub fn ordinary(label: ObjectLabel, key: PKey) -> ObjectProperty {
        ObjectProperty::new(label, PropertyKind::Ordinary(key))
    }

    pub fn default_numeric(label: ObjectLabel) -> ObjectProperty {
        ObjectProperty::new(label, PropertyKind::DefaultNumeric)
    }

    pub fn default_other(label: ObjectLabel) -> ObjectProperty {
        ObjectProperty::new(label, PropertyKind::DefaultOther)
    }

    pub fn internal_value(label: ObjectLabel) -> ObjectProperty {
        ObjectProperty::new(label, PropertyKind::InternalValue)
    }

    pub fn internal_prototype(label: ObjectLabel) -> ObjectProperty {
        ObjectProperty::new(label, PropertyKind::InternalPrototype)
    }

    pub fn label(&self) -> &ObjectLabel {
        &self.label
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }
}

impl fmt::Display for ObjectProperty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            PropertyKind::Ordinary(ref key) => write!(f, "{}.{}", self.label, key),
            PropertyKind::DefaultNumeric => write!(f, "{}.[[DefaultNumeric]]", self.label),
            PropertyKind::DefaultOther => write!(f, "{}.[[DefaultOther]]", self.label),
            PropertyKind::InternalValue => write!(f, "{}.[[Value]]", self.label),
            PropertyKind::InternalPrototype => write!(f, "{}.[[Prototype]]", self.label),
        }
    }
}
