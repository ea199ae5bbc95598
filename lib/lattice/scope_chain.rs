use crate::lattice::{ObjectLabel, Renamings};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// The `[[Scope]]` of a function object: a chain of sets of object labels,
/// innermost first.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ScopeChain {
    objects: BTreeSet<ObjectLabel>,
    next: Option<Rc<ScopeChain>>,
}

impl ScopeChain {
    pub fn new(objects: BTreeSet<ObjectLabel>, next: Option<ScopeChain>) -> ScopeChain {
        ScopeChain {
            objects,
            next: next.map(Rc::new),
        }
    }

    /// The labels of the innermost scope object.
    pub fn objects(&self) -> &BTreeSet<ObjectLabel> {
        &self.objects
    }

    pub fn next(&self) -> Option<&ScopeChain> {
        self.next.as_deref()
    }

    /// Join two scope chains level by level. The result is `None` only if both
    /// are empty.
    pub fn add(a: Option<&ScopeChain>, b: Option<&ScopeChain>) -> Option<ScopeChain> {
        match (a, b) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) => {
                if a == b {
                    return Some(a.clone());
                }
                let objects = a.objects.union(&b.objects).cloned().collect();
                let next = ScopeChain::add(a.next(), b.next());
                Some(ScopeChain::new(objects, next))
            }
        }
    }

    pub fn rename(&self, renamings: &Renamings) -> ScopeChain {
        ScopeChain::new(
            renamings.rename_all(&self.objects),
            self.next().map(|next| next.rename(renamings)),
        )
    }

    pub fn replace_object_label(&self, old: &ObjectLabel, new: &ObjectLabel) -> ScopeChain {
        let objects = self
            .objects
            .iter()
            .map(|label| if label == old { new.clone() } else { label.clone() })
            .collect();
        ScopeChain::new(
            objects,
            self.next().map(|next| next.replace_object_label(old, new)),
        )
    }

    /// Every label appearing anywhere in this chain.
    pub fn object_labels(&self) -> BTreeSet<ObjectLabel> {
        let mut labels = BTreeSet::new();
        let mut chain = Some(self);
        while let Some(scope) = chain {
            labels.extend(scope.objects.iter().cloned());
            chain = scope.next();
        }
        labels
    }

    pub fn contains_object_label(&self, label: &ObjectLabel) -> bool {
        let mut chain = Some(self);
        while let Some(scope) = chain {
            if scope.objects.contains(label) {
                return true;
            }
            chain = scope.next();
        }
        false
    }
}

impl fmt::Display for ScopeChain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut levels = Vec::new();
        let mut chain = Some(self);
        while let Some(scope) = chain {
            levels.push(format!(
                "{{{}}}",
                scope
                    .objects
                    .iter()
                    .map(|label| label.to_string())
                    .collect::<Vec<String>>()
                    .join(",")
            ));
            chain = scope.next();
        }
        write!(f, "{}", levels.join(" -> "))
    }
}
