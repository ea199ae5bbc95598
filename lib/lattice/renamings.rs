use crate::lattice::ObjectLabel;
use std::collections::{BTreeMap, BTreeSet};

/// A substitution of object labels.
///
/// One label may be renamed to several labels, as happens when a
/// recursion-induced label is duplicated. Labels without an entry rename to
/// themselves.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Renamings {
    map: BTreeMap<ObjectLabel, BTreeSet<ObjectLabel>>,
}

impl Renamings {
    pub fn new() -> Renamings {
        Renamings::default()
    }

    /// Add `new` to the labels `old` is renamed to.
    pub fn add(&mut self, old: ObjectLabel, new: ObjectLabel) {
        self.map.entry(old).or_default().insert(new);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The labels `label` is renamed to.
    pub fn rename(&self, label: &ObjectLabel) -> BTreeSet<ObjectLabel> {
        match self.map.get(label) {
            Some(labels) => labels.clone(),
            None => std::iter::once(label.clone()).collect(),
        }
    }

    /// Rename every label in the given set.
    pub fn rename_all(&self, labels: &BTreeSet<ObjectLabel>) -> BTreeSet<ObjectLabel> {
        labels.iter().flat_map(|label| self.rename(label)).collect()
    }
}
