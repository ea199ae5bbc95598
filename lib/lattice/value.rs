//! Abstract values.
//!
//! A `Value` summarizes the set of JavaScript values a register or property
//! may hold. Only as much of the primitive lattice is modelled as is needed
//! to describe object properties: each primitive type is a flag, and a
//! string is either one known string or any string.
//!
//! Besides its primitive and object parts, a `Value` in a property slot
//! tracks whether the property may be absent, whether it may have been
//! modified since function entry, and its attributes.

use crate::lattice::{ObjectLabel, PartitionToken, Renamings};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

bitflags! {
    /// Flags of an abstract value.
    #[derive(Deserialize, Serialize)]
    pub struct Flags: u32 {
        const UNDEF         = 1 << 0;
        const NULL          = 1 << 1;
        const TRUE          = 1 << 2;
        const FALSE         = 1 << 3;
        const NUM           = 1 << 4;
        const STR           = 1 << 5;
        const ABSENT        = 1 << 6;
        const MODIFIED      = 1 << 7;
        const UNKNOWN       = 1 << 8;
        const DONTDELETE    = 1 << 9;
        const NOTDONTDELETE = 1 << 10;
        const DONTENUM      = 1 << 11;
        const NOTDONTENUM   = 1 << 12;
        const READONLY      = 1 << 13;
        const NOTREADONLY   = 1 << 14;

        const BOOL = Self::TRUE.bits | Self::FALSE.bits;
        const PRIMITIVE = Self::UNDEF.bits | Self::NULL.bits | Self::BOOL.bits
            | Self::NUM.bits | Self::STR.bits;
        const ATTRIBUTES = Self::DONTDELETE.bits | Self::NOTDONTDELETE.bits
            | Self::DONTENUM.bits | Self::NOTDONTENUM.bits
            | Self::READONLY.bits | Self::NOTREADONLY.bits;
    }
}

/// How a value relates to the foreign language, decided from the kinds of
/// its object labels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Foreign<'v> {
    /// The foreign namespace root.
    Root(&'v ObjectLabel),
    /// An uninstantiated foreign class.
    TypeToken(&'v ObjectLabel),
    /// An instance of a foreign class.
    Object(&'v ObjectLabel),
}

impl<'v> Foreign<'v> {
    pub fn label(&self) -> &'v ObjectLabel {
        match *self {
            Foreign::Root(label) | Foreign::TypeToken(label) | Foreign::Object(label) => label,
        }
    }

    /// The foreign class name, absent for the namespace root.
    pub fn class_name(&self) -> Option<&'v str> {
        self.label().foreign_name()
    }
}

/// An abstract value.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Value {
    flags: Flags,
    // A single known string. Set only when `STR` is not.
    string: Option<String>,
    labels: BTreeSet<ObjectLabel>,
    #[serde(serialize_with = "serialize_partitions")]
    partitions: Option<Rc<BTreeMap<PartitionToken, Value>>>,
}

fn serialize_partitions<S: Serializer>(
    partitions: &Option<Rc<BTreeMap<PartitionToken, Value>>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match partitions {
        Some(partitions) => serializer
            .collect_map(partitions.iter().map(|(token, value)| (token.to_string(), value))),
        None => serializer.serialize_none(),
    }
}

impl Value {
    fn with_flags(flags: Flags) -> Value {
        Value {
            flags,
            string: None,
            labels: BTreeSet::new(),
            partitions: None,
        }
    }

    /// The bottom value.
    pub fn none() -> Value {
        Value::with_flags(Flags::empty())
    }

    /// The bottom value, marked as maybe modified.
    pub fn none_modified() -> Value {
        Value::with_flags(Flags::MODIFIED)
    }

    /// A value which has not been summarized yet, and must be recovered from
    /// elsewhere before it is used.
    pub fn unknown() -> Value {
        Value::with_flags(Flags::UNKNOWN)
    }

    /// The value of a property which is definitely absent.
    pub fn absent() -> Value {
        Value::with_flags(Flags::ABSENT)
    }

    pub fn absent_modified() -> Value {
        Value::with_flags(Flags::ABSENT | Flags::MODIFIED)
    }

    pub fn undef() -> Value {
        Value::with_flags(Flags::UNDEF)
    }

    pub fn null() -> Value {
        Value::with_flags(Flags::NULL)
    }

    pub fn bool(b: bool) -> Value {
        Value::with_flags(if b { Flags::TRUE } else { Flags::FALSE })
    }

    pub fn any_bool() -> Value {
        Value::with_flags(Flags::BOOL)
    }

    pub fn any_num() -> Value {
        Value::with_flags(Flags::NUM)
    }

    pub fn any_str() -> Value {
        Value::with_flags(Flags::STR)
    }

    /// Any primitive value.
    pub fn any_primitive() -> Value {
        Value::with_flags(Flags::PRIMITIVE)
    }

    pub fn str<S: Into<String>>(s: S) -> Value {
        Value {
            flags: Flags::empty(),
            string: Some(s.into()),
            labels: BTreeSet::new(),
            partitions: None,
        }
    }

    pub fn object(label: ObjectLabel) -> Value {
        Value::objects(std::iter::once(label).collect())
    }

    pub fn objects(labels: BTreeSet<ObjectLabel>) -> Value {
        Value {
            flags: Flags::empty(),
            string: None,
            labels,
            partitions: None,
        }
    }

    /// A value split into partitions. The value itself is the join of all
    /// partitions.
    pub fn partitioned(partitions: BTreeMap<PartitionToken, Value>) -> Value {
        let mut summary = partitions
            .values()
            .fold(Value::none(), |summary, part| summary.join(&part.collapse_partitions()));
        if !partitions.is_empty() {
            summary.partitions = Some(Rc::new(partitions));
        }
        summary
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Returns true if this value has not been summarized yet.
    pub fn is_unknown(&self) -> bool {
        self.flags.contains(Flags::UNKNOWN)
    }

    /// Returns true if this is the bottom value, ignoring the modified flag
    /// and attributes.
    pub fn is_none(&self) -> bool {
        !self
            .flags
            .intersects(Flags::PRIMITIVE | Flags::ABSENT | Flags::UNKNOWN)
            && self.string.is_none()
            && self.labels.is_empty()
    }

    pub fn is_maybe_absent(&self) -> bool {
        self.flags.contains(Flags::ABSENT)
    }

    pub fn is_maybe_modified(&self) -> bool {
        self.flags.contains(Flags::MODIFIED)
    }

    /// Returns true if this value may be some actual JavaScript value.
    pub fn is_maybe_present(&self) -> bool {
        self.flags.intersects(Flags::PRIMITIVE) || self.string.is_some() || !self.labels.is_empty()
    }

    pub fn is_maybe_present_or_unknown(&self) -> bool {
        self.is_unknown() || self.is_maybe_present()
    }

    /// Returns true if this value may be a value of an object type.
    pub fn is_maybe_object(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn is_maybe_primitive(&self) -> bool {
        self.flags.intersects(Flags::PRIMITIVE) || self.string.is_some()
    }

    pub fn is_maybe_undef(&self) -> bool {
        self.flags.contains(Flags::UNDEF)
    }

    pub fn is_maybe_str(&self) -> bool {
        self.flags.contains(Flags::STR) || self.string.is_some()
    }

    pub fn is_maybe_num(&self) -> bool {
        self.flags.contains(Flags::NUM)
    }

    /// The known string, if this value is exactly one string.
    pub fn get_str(&self) -> Option<&str> {
        let others = self.flags.intersects(Flags::PRIMITIVE | Flags::UNKNOWN);
        match self.string {
            Some(ref s) if !others && self.labels.is_empty() => Some(s),
            _ => None,
        }
    }

    /// The known string part of this value, ignoring other parts.
    pub fn string_part(&self) -> Option<&str> {
        self.string.as_deref()
    }

    pub fn object_labels(&self) -> &BTreeSet<ObjectLabel> {
        &self.labels
    }

    /// Every label reachable from this value, including partitions.
    pub fn all_object_labels(&self) -> BTreeSet<ObjectLabel> {
        let mut labels = self.labels.clone();
        if let Some(ref partitions) = self.partitions {
            for part in partitions.values() {
                labels.extend(part.all_object_labels());
            }
        }
        labels
    }

    pub fn contains_object_label(&self, label: &ObjectLabel) -> bool {
        self.labels.contains(label)
            || self
                .partitions
                .as_ref()
                .map(|partitions| partitions.values().any(|part| part.contains_object_label(label)))
                .unwrap_or(false)
    }

    /// The foreign interpretation of this value, decided by the first label of
    /// a foreign kind.
    pub fn foreign(&self) -> Option<Foreign<'_>> {
        self.foreign_labels().next()
    }

    /// Every foreign interpretation of this value, one per foreign label.
    pub fn foreign_labels(&self) -> impl Iterator<Item = Foreign<'_>> + '_ {
        self.labels.iter().filter_map(|label| match label.kind() {
            crate::lattice::Kind::ForeignRoot => Some(Foreign::Root(label)),
            crate::lattice::Kind::ForeignTypeToken => Some(Foreign::TypeToken(label)),
            crate::lattice::Kind::ForeignObject => Some(Foreign::Object(label)),
            _ => None,
        })
    }

    pub fn is_foreign_object(&self) -> bool {
        self.foreign_labels()
            .any(|foreign| matches!(foreign, Foreign::Object(_)))
    }

    pub fn is_foreign_type_token(&self) -> bool {
        self.foreign_labels()
            .any(|foreign| matches!(foreign, Foreign::TypeToken(_)))
    }

    pub fn is_foreign_root(&self) -> bool {
        self.foreign_labels()
            .any(|foreign| matches!(foreign, Foreign::Root(_)))
    }

    /// Join this value with another.
    ///
    /// An unknown value absorbs everything it is joined with, as its true
    /// content is not available here.
    pub fn join(&self, other: &Value) -> Value {
        if self.is_unknown() || other.is_unknown() {
            return Value::unknown();
        }
        if self == other {
            return self.clone();
        }

        let mut flags = self.flags | other.flags;
        let string = match (&self.string, &other.string) {
            (Some(a), Some(b)) if a != b => {
                flags |= Flags::STR;
                None
            }
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        let string = if flags.contains(Flags::STR) {
            None
        } else {
            string
        };

        let partitions = match (&self.partitions, &other.partitions) {
            (Some(a), Some(b)) => {
                let mut merged = (**a).clone();
                for (token, part) in b.iter() {
                    let joined = match merged.get(token) {
                        Some(existing) => existing.join(part),
                        None => part.clone(),
                    };
                    merged.insert(token.clone(), joined);
                }
                Some(Rc::new(merged))
            }
            (Some(a), None) if other.is_none() => Some(a.clone()),
            (None, Some(b)) if self.is_none() => Some(b.clone()),
            _ => None,
        };

        Value {
            flags,
            string,
            labels: self.labels.union(&other.labels).cloned().collect(),
            partitions,
        }
    }

    pub fn join_absent(&self) -> Value {
        let mut value = self.clone();
        value.flags |= Flags::ABSENT;
        value
    }

    pub fn join_modified(&self) -> Value {
        let mut value = self.clone();
        value.flags |= Flags::MODIFIED;
        value
    }

    pub fn restrict_to_not_modified(&self) -> Value {
        let mut value = self.clone();
        value.flags.remove(Flags::MODIFIED);
        value
    }

    pub fn restrict_to_not_absent(&self) -> Value {
        let mut value = self.clone();
        value.flags.remove(Flags::ABSENT);
        value
    }

    /// Restrict this value to its object part.
    pub fn restrict_to_objects(&self) -> Value {
        Value::objects(self.labels.clone())
    }

    /// Restrict this value to the parts the foreign language has no say in:
    /// primitives and ordinary objects. Partitions are collapsed.
    pub fn restrict_to_not_foreign(&self) -> Value {
        let mut value = self.collapse_partitions();
        value.labels.retain(|label| !label.is_foreign());
        value
    }

    pub fn remove_attributes(&self) -> Value {
        let mut value = self.clone();
        value.flags.remove(Flags::ATTRIBUTES);
        value
    }

    pub fn set_dont_delete(&self) -> Value {
        let mut value = self.clone();
        value.flags.remove(Flags::NOTDONTDELETE);
        value.flags.insert(Flags::DONTDELETE);
        value
    }

    pub fn set_dont_enum(&self) -> Value {
        let mut value = self.clone();
        value.flags.remove(Flags::NOTDONTENUM);
        value.flags.insert(Flags::DONTENUM);
        value
    }

    pub fn set_read_only(&self) -> Value {
        let mut value = self.clone();
        value.flags.remove(Flags::NOTREADONLY);
        value.flags.insert(Flags::READONLY);
        value
    }

    pub fn is_dont_delete(&self) -> bool {
        self.flags.contains(Flags::DONTDELETE) && !self.flags.contains(Flags::NOTDONTDELETE)
    }

    pub fn is_dont_enum(&self) -> bool {
        self.flags.contains(Flags::DONTENUM) && !self.flags.contains(Flags::NOTDONTENUM)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(Flags::READONLY) && !self.flags.contains(Flags::NOTREADONLY)
    }

    pub fn is_partitioned(&self) -> bool {
        self.partitions.is_some()
    }

    /// The partition of this value under the given token.
    pub fn partition(&self, token: &PartitionToken) -> Option<&Value> {
        self.partitions
            .as_ref()
            .and_then(|partitions| partitions.get(token))
    }

    pub fn partition_tokens(&self) -> Vec<&PartitionToken> {
        match self.partitions {
            Some(ref partitions) => partitions.keys().collect(),
            None => Vec::new(),
        }
    }

    /// Drop the partitioning of this value, keeping the joined value.
    pub fn collapse_partitions(&self) -> Value {
        if self.partitions.is_none() {
            return self.clone();
        }
        let mut value = self.clone();
        value.partitions = None;
        value
    }

    /// Remove the partitions introduced at any of the given nodes.
    pub fn remove_partitions(&self, nodes: &BTreeSet<usize>) -> Value {
        let partitions = match self.partitions {
            Some(ref partitions) => partitions,
            None => return self.clone(),
        };
        if nodes.is_empty() {
            return self.clone();
        }
        let remaining: BTreeMap<PartitionToken, Value> = partitions
            .iter()
            .filter(|(token, _)| !nodes.contains(&token.node()))
            .map(|(token, part)| (token.clone(), part.clone()))
            .collect();
        let mut value = self.clone();
        value.partitions = if remaining.is_empty() {
            None
        } else {
            Some(Rc::new(remaining))
        };
        value
    }

    pub fn rename(&self, renamings: &Renamings) -> Value {
        if renamings.is_empty() {
            return self.clone();
        }
        let mut value = self.clone();
        value.labels = renamings.rename_all(&self.labels);
        value.partitions = self.partitions.as_ref().map(|partitions| {
            Rc::new(
                partitions
                    .iter()
                    .map(|(token, part)| (token.clone(), part.rename(renamings)))
                    .collect(),
            )
        });
        value
    }

    /// Replace `old` by `new`. Unknown values are left alone.
    pub fn replace_object_label(&self, old: &ObjectLabel, new: &ObjectLabel) -> Value {
        if self.is_unknown() || !self.contains_object_label(old) {
            return self.clone();
        }
        let mut value = self.clone();
        if value.labels.remove(old) {
            value.labels.insert(new.clone());
        }
        value.partitions = self.partitions.as_ref().map(|partitions| {
            Rc::new(
                partitions
                    .iter()
                    .map(|(token, part)| (token.clone(), part.replace_object_label(old, new)))
                    .collect(),
            )
        });
        value
    }

    /// Describe what this value adds to `old`, which is assumed to be smaller.
    pub fn diff(&self, old: &Value, b: &mut String) {
        let mut added = Vec::new();
        let new_flags = self.flags - old.flags;
        if !new_flags.is_empty() {
            added.push(format!("{}", Value::with_flags(new_flags)));
        }
        if self.string != old.string {
            if let Some(ref s) = self.string {
                added.push(format!("\"{}\"", s.escape_default()));
            }
        }
        for label in self.labels.difference(&old.labels) {
            added.push(label.to_string());
        }
        for token in self.partition_tokens() {
            if old.partition(token).is_none() {
                added.push(format!("partition {}", token));
            }
        }
        b.push_str(&format!("added: {}", added.join(", ")));
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "?");
        }
        let mut parts: Vec<String> = Vec::new();
        if self.flags.contains(Flags::UNDEF) {
            parts.push("Undef".to_string());
        }
        if self.flags.contains(Flags::NULL) {
            parts.push("Null".to_string());
        }
        if self.flags.contains(Flags::BOOL) {
            parts.push("Bool".to_string());
        } else if self.flags.contains(Flags::TRUE) {
            parts.push("true".to_string());
        } else if self.flags.contains(Flags::FALSE) {
            parts.push("false".to_string());
        }
        if self.flags.contains(Flags::NUM) {
            parts.push("Num".to_string());
        }
        if self.flags.contains(Flags::STR) {
            parts.push("Str".to_string());
        } else if let Some(ref s) = self.string {
            parts.push(format!("\"{}\"", s.escape_default()));
        }
        if !self.labels.is_empty() {
            parts.push(format!(
                "{{{}}}",
                self.labels
                    .iter()
                    .map(|label| label.to_string())
                    .collect::<Vec<String>>()
                    .join(",")
            ));
        }
        if self.flags.contains(Flags::ABSENT) {
            parts.push("absent".to_string());
        }
        if parts.is_empty() {
            parts.push("<none>".to_string());
        }
        if self.flags.contains(Flags::MODIFIED) {
            parts.push("modified".to_string());
        }
        let mut attributes = Vec::new();
        if self.flags.contains(Flags::DONTDELETE) {
            attributes.push("DontDelete");
        }
        if self.flags.contains(Flags::DONTENUM) {
            attributes.push("DontEnum");
        }
        if self.flags.contains(Flags::READONLY) {
            attributes.push("ReadOnly");
        }
        if !attributes.is_empty() {
            parts.push(format!("({})", attributes.join(",")));
        }
        write!(f, "{}", parts.join("|"))?;
        if let Some(ref partitions) = self.partitions {
            write!(
                f,
                " partitions[{}]",
                partitions
                    .iter()
                    .map(|(token, part)| format!("{}: {}", token, part))
                    .collect::<Vec<String>>()
                    .join("; ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{Context, Kind, LabelTable, TokenTable, TypeTag};

    #[test]
    fn join_strings() {
        let a = Value::str("a");
        assert_eq!(a.join(&Value::str("a")), a);
        let ab = a.join(&Value::str("b"));
        assert!(ab.is_maybe_str());
        assert_eq!(ab.get_str(), None);
        assert_eq!(ab, Value::any_str());
        assert_eq!(a.get_str(), Some("a"));
        assert_eq!(a.join(&Value::undef()).get_str(), None);
    }

    #[test]
    fn presence() {
        assert!(Value::none().is_none());
        assert!(Value::none_modified().is_none());
        assert!(!Value::absent().is_none());
        assert!(!Value::absent().is_maybe_present());
        assert!(Value::undef().join_absent().is_maybe_absent());
        assert!(Value::unknown().is_maybe_present_or_unknown());
        assert!(!Value::unknown().is_maybe_present());
    }

    #[test]
    fn unknown_absorbs() {
        assert!(Value::unknown().join(&Value::undef()).is_unknown());
        assert!(Value::any_num().join(&Value::unknown()).is_unknown());
    }

    #[test]
    fn attributes() {
        let v = Value::undef().set_dont_delete().set_dont_enum().set_read_only();
        assert!(v.is_dont_delete());
        assert!(v.is_dont_enum());
        assert!(v.is_read_only());
        let plain = v.remove_attributes();
        assert!(!plain.is_read_only());
        assert_eq!(plain, Value::undef());
    }

    #[test]
    fn foreign_discrimination() {
        let mut labels = LabelTable::new();
        let object = Value::object(labels.make(1, Kind::Object));
        let root = Value::object(labels.make(2, Kind::ForeignRoot));
        let token = Value::object(labels.make_foreign(3, Kind::ForeignTypeToken, "a.B"));
        let instance = Value::object(labels.make_foreign(4, Kind::ForeignObject, "a.B"));

        assert_eq!(object.foreign(), None);
        assert!(matches!(root.foreign(), Some(Foreign::Root(_))));
        assert!(matches!(token.foreign(), Some(Foreign::TypeToken(_))));
        assert_eq!(instance.foreign().and_then(|f| f.class_name()), Some("a.B"));
        assert!(instance.is_foreign_object());
        assert!(!instance.is_foreign_type_token());
        // a string naming a class is not a foreign value
        assert_eq!(Value::str("a.B").foreign(), None);

        let mixed = object.join(&instance).join(&root).join(&Value::null());
        let ordinary = mixed.restrict_to_not_foreign();
        assert_eq!(ordinary, object.join(&Value::null()));
        assert_eq!(ordinary.foreign(), None);
        assert!(instance.restrict_to_not_foreign().is_none());
    }

    #[test]
    fn partitions_are_removed_by_node() {
        let mut tokens = TokenTable::new(0);
        let t1 = tokens.make_type(1, TypeTag::String);
        let t2 = tokens.make_type(2, TypeTag::Number);
        let t3 = tokens.make_any_function(2, Context::main());

        let mut parts = BTreeMap::new();
        parts.insert(t1.clone(), Value::str("x"));
        parts.insert(t2.clone(), Value::any_num());
        parts.insert(t3.clone(), Value::undef());
        let value = Value::partitioned(parts);

        assert!(value.is_maybe_str());
        assert!(value.is_maybe_num());
        assert!(value.is_maybe_undef());

        let nodes: BTreeSet<usize> = std::iter::once(2).collect();
        let stripped = value.remove_partitions(&nodes);
        assert_eq!(stripped.partition_tokens(), vec![&t1]);
        assert!(stripped.partition(&t2).is_none());
        // the joined value is retained
        assert!(stripped.is_maybe_num());

        let all: BTreeSet<usize> = vec![1, 2].into_iter().collect();
        assert!(!value.remove_partitions(&all).is_partitioned());
    }

    #[test]
    fn rename_splits_labels() {
        let mut labels = LabelTable::new();
        let old = labels.make(1, Kind::Object);
        let new1 = labels.make(2, Kind::Object);
        let new2 = labels.make(3, Kind::Object);
        let mut renamings = Renamings::new();
        renamings.add(old.clone(), new1.clone());
        renamings.add(old.clone(), new2.clone());

        let renamed = Value::object(old.clone()).join(&Value::null()).rename(&renamings);
        assert!(!renamed.contains_object_label(&old));
        assert!(renamed.contains_object_label(&new1));
        assert!(renamed.contains_object_label(&new2));
        assert!(renamed.flags().contains(Flags::NULL));
    }

    #[test]
    fn display() {
        assert_eq!(Value::none().to_string(), "<none>");
        assert_eq!(Value::unknown().to_string(), "?");
        assert_eq!(Value::undef().join_absent().to_string(), "Undef|absent");
        assert_eq!(Value::str("x").join_modified().to_string(), "\"x\"|modified");
    }
}
