use crate::lattice::{ObjectLabel, Renamings};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A property key: a string name, or a symbol identified by its object label.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum PKey {
    Str(String),
    Symbol(ObjectLabel),
}

impl PKey {
    pub fn str<S: Into<String>>(name: S) -> PKey {
        PKey::Str(name.into())
    }

    /// Returns true if this key is an array index, and is therefore summarized
    /// by the default numeric property of an object.
    pub fn is_numeric(&self) -> bool {
        match self {
            PKey::Str(s) => is_array_index(s),
            PKey::Symbol(_) => false,
        }
    }

    /// The string name of this key, if it is not a symbol.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PKey::Str(s) => Some(s),
            PKey::Symbol(_) => None,
        }
    }

    pub fn rename(&self, renamings: &Renamings) -> BTreeSet<PKey> {
        match self {
            PKey::Str(_) => std::iter::once(self.clone()).collect(),
            PKey::Symbol(label) => renamings
                .rename(label)
                .into_iter()
                .map(PKey::Symbol)
                .collect(),
        }
    }

    pub fn replace_object_label(&self, old: &ObjectLabel, new: &ObjectLabel) -> PKey {
        match self {
            PKey::Symbol(label) if label == old => PKey::Symbol(new.clone()),
            _ => self.clone(),
        }
    }

    pub fn contains_object_label(&self, label: &ObjectLabel) -> bool {
        matches!(self, PKey::Symbol(l) if l == label)
    }

    /// Render this key the way it would appear in an object literal.
    pub fn to_string_escaped(&self) -> String {
        match self {
            PKey::Str(s) => {
                let simple = !s.is_empty()
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
                if simple {
                    s.clone()
                } else {
                    format!("\"{}\"", s.escape_default())
                }
            }
            PKey::Symbol(label) => format!("[{}]", label),
        }
    }
}

impl fmt::Display for PKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PKey::Str(s) => write!(f, "{}", s),
            PKey::Symbol(label) => write!(f, "{}", label),
        }
    }
}

impl From<&str> for PKey {
    fn from(name: &str) -> PKey {
        PKey::Str(name.to_string())
    }
}

/// A canonical array index: a decimal integer below 2^32 - 1 with no leading
/// zeros.
fn is_array_index(s: &str) -> bool {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return false;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match s.parse::<u64>() {
        Ok(n) => n < u64::from(u32::MAX),
        Err(_) => false,
    }
}

#[test]
fn numeric_keys() {
    assert!(PKey::str("0").is_numeric());
    assert!(PKey::str("4294967294").is_numeric());
    assert!(!PKey::str("4294967295").is_numeric());
    assert!(!PKey::str("01").is_numeric());
    assert!(!PKey::str("-1").is_numeric());
    assert!(!PKey::str("length").is_numeric());
    assert!(!PKey::str("").is_numeric());
}

#[test]
fn escaped_keys() {
    assert_eq!(PKey::str("foo").to_string_escaped(), "foo");
    assert_eq!(PKey::str("a b").to_string_escaped(), "\"a b\"");
}
