//! Abstract heap objects.
//!
//! An `Obj` describes every property of the concrete objects summarized by
//! one `ObjectLabel`. Properties not listed explicitly are described by two
//! default slots, one for array-index names and one for all other names.
//!
//! Property maps are reference counted. Copying an `Obj` shares the map, and
//! whichever side writes first materializes its own copy. Once an `Obj` is
//! frozen it may be aliased freely, and every mutator fails with
//! `Error::InternalInvariant`.

use crate::lattice::{
    ObjectLabel, ObjectProperty, PKey, PropertyKind, Renamings, Resolver, ScopeChain, Value,
};
use crate::Error;
use rustc_hash::FxHasher;
use serde::{Serialize, Serializer};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// The explicit properties of an abstract object.
pub type PropertyMap = BTreeMap<PKey, Value>;

/// An abstract heap object.
#[derive(Debug, Serialize)]
pub struct Obj {
    #[serde(serialize_with = "serialize_properties")]
    properties: Rc<PropertyMap>,
    default_numeric_property: Value,
    default_other_property: Value,
    internal_prototype: Value,
    internal_value: Value,
    // `None` when the scope chain is empty or unknown.
    scope: Option<ScopeChain>,
    scope_unknown: bool,
    #[serde(skip)]
    writable: bool,
    // 0 until computed. Only cached while the object is frozen.
    #[serde(skip)]
    hash_code: Cell<u64>,
}

fn serialize_properties<S: Serializer>(
    properties: &Rc<PropertyMap>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(properties.iter().map(|(key, value)| (key.to_string(), value)))
}

fn check_default(v: &Value, slot: &str) -> Result<(), Error> {
    if !v.is_unknown() && v.is_maybe_present() && !v.is_maybe_absent() {
        return Err(Error::InternalInvariant(format!(
            "Illegal {} property: {}",
            slot, v
        )));
    }
    Ok(())
}

impl Obj {
    fn with_slots(slot: Value, scope_unknown: bool) -> Obj {
        Obj {
            properties: Rc::new(PropertyMap::new()),
            default_numeric_property: slot.clone(),
            default_other_property: slot.clone(),
            internal_prototype: slot.clone(),
            internal_value: slot,
            scope: None,
            scope_unknown,
            writable: true,
            hash_code: Cell::new(0),
        }
    }

    /// An object where every property is none and the scope chain is empty.
    pub fn none() -> Obj {
        Obj::with_slots(Value::none(), false)
    }

    /// An object where every property is none, but maybe modified.
    pub fn none_modified() -> Obj {
        Obj::with_slots(Value::none_modified(), false)
    }

    /// An object where every property is absent, but maybe modified.
    pub fn absent_modified() -> Obj {
        Obj::with_slots(Value::absent_modified(), false)
    }

    /// An object where every property, and the scope chain, is unknown.
    pub fn unknown() -> Obj {
        Obj::with_slots(Value::unknown(), true)
    }

    /// A fresh, writable copy of this object.
    ///
    /// The property map is shared with `self` until one of the two writes to
    /// it.
    pub fn copy(&self) -> Obj {
        Obj {
            properties: self.properties.clone(),
            default_numeric_property: self.default_numeric_property.clone(),
            default_other_property: self.default_other_property.clone(),
            internal_prototype: self.internal_prototype.clone(),
            internal_value: self.internal_value.clone(),
            scope: self.scope.clone(),
            scope_unknown: self.scope_unknown,
            writable: true,
            hash_code: Cell::new(0),
        }
    }

    /// A fresh, writable copy of this object which does not share its
    /// property map.
    pub fn deep_copy(&self) -> Obj {
        let mut obj = self.copy();
        obj.properties = Rc::new((*self.properties).clone());
        obj
    }

    /// Make this object immutable, so it may be shared.
    pub fn freeze(mut self) -> Obj {
        self.writable = false;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns true if the property map of this object is not shared.
    pub fn is_writable_properties(&self) -> bool {
        Rc::strong_count(&self.properties) == 1
    }

    fn check_writable(&self) -> Result<(), Error> {
        if !self.writable {
            return Err(Error::InternalInvariant(
                "Attempt to modify non-writable Obj".to_string(),
            ));
        }
        Ok(())
    }

    fn properties_mut(&mut self) -> &mut PropertyMap {
        if !self.is_writable_properties() {
            trace!("Materializing {} shared properties", self.properties.len());
        }
        Rc::make_mut(&mut self.properties)
    }

    fn set_to_none(&mut self) {
        self.properties = Rc::new(PropertyMap::new());
        self.default_numeric_property = Value::none();
        self.default_other_property = Value::none();
        self.internal_prototype = Value::none();
        self.internal_value = Value::none();
        self.scope = None;
        self.scope_unknown = false;
    }

    fn slots(&self) -> [&Value; 4] {
        [
            &self.default_numeric_property,
            &self.default_other_property,
            &self.internal_prototype,
            &self.internal_value,
        ]
    }

    /// Returns true if every property, and the scope chain, is unknown.
    pub fn is_unknown(&self) -> bool {
        self.properties.values().all(|v| v.is_unknown())
            && self.slots().iter().all(|v| v.is_unknown())
            && self.scope_unknown
    }

    /// Returns true if every property is none and the scope chain is empty.
    pub fn is_all_none(&self) -> bool {
        self.properties.values().all(|v| v.is_none())
            && self.slots().iter().all(|v| v.is_none())
            && !self.scope_unknown
            && self.scope.is_none()
    }

    /// Returns true if some property is none. The scope chain is ignored.
    pub fn is_some_none(&self) -> bool {
        self.properties.values().any(|v| v.is_none()) || self.slots().iter().any(|v| v.is_none())
    }

    pub fn is_some_modified(&self) -> bool {
        self.properties.values().any(|v| v.is_maybe_modified())
            || self.slots().iter().any(|v| v.is_maybe_modified())
    }

    /// The value of the given property, falling back to the matching default
    /// slot. The result may be unknown.
    pub fn get_property(&self, key: &PKey) -> &Value {
        match self.properties.get(key) {
            Some(value) => value,
            None => self.default_property(key),
        }
    }

    fn default_property(&self, key: &PKey) -> &Value {
        if key.is_numeric() {
            &self.default_numeric_property
        } else {
            &self.default_other_property
        }
    }

    pub fn set_property(&mut self, key: PKey, value: Value) -> Result<(), Error> {
        self.check_writable()?;
        self.properties_mut().insert(key, value);
        Ok(())
    }

    /// The explicit property names, excluding the default slots.
    pub fn property_names(&self) -> impl Iterator<Item = &PKey> {
        self.properties.keys()
    }

    /// The explicit properties, excluding the default slots.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: PropertyMap) -> Result<(), Error> {
        self.check_writable()?;
        self.properties = Rc::new(properties);
        Ok(())
    }

    pub fn default_numeric_property(&self) -> &Value {
        &self.default_numeric_property
    }

    pub fn set_default_numeric_property(&mut self, value: Value) -> Result<(), Error> {
        self.check_writable()?;
        check_default(&value, "default numeric")?;
        self.default_numeric_property = value;
        Ok(())
    }

    pub fn default_other_property(&self) -> &Value {
        &self.default_other_property
    }

    pub fn set_default_other_property(&mut self, value: Value) -> Result<(), Error> {
        self.check_writable()?;
        check_default(&value, "default non-numeric")?;
        self.default_other_property = value;
        Ok(())
    }

    /// The `[[Value]]` slot.
    pub fn internal_value(&self) -> &Value {
        &self.internal_value
    }

    pub fn set_internal_value(&mut self, value: Value) -> Result<(), Error> {
        self.check_writable()?;
        self.internal_value = value;
        Ok(())
    }

    /// The `[[Prototype]]` slot.
    pub fn internal_prototype(&self) -> &Value {
        &self.internal_prototype
    }

    pub fn set_internal_prototype(&mut self, value: Value) -> Result<(), Error> {
        self.check_writable()?;
        self.internal_prototype = value;
        Ok(())
    }

    /// The `[[Scope]]` slot. Fails if the scope chain is unknown.
    pub fn scope_chain(&self) -> Result<Option<&ScopeChain>, Error> {
        if self.scope_unknown {
            return Err(Error::InternalInvariant(
                "Calling scope_chain when scope is 'unknown'".to_string(),
            ));
        }
        Ok(self.scope.as_ref())
    }

    pub fn set_scope_chain(&mut self, scope: Option<ScopeChain>) -> Result<(), Error> {
        self.check_writable()?;
        self.scope = scope;
        self.scope_unknown = false;
        Ok(())
    }

    pub fn set_scope_chain_unknown(&mut self) -> Result<(), Error> {
        self.check_writable()?;
        self.scope = None;
        self.scope_unknown = true;
        Ok(())
    }

    /// Join `scope` into the `[[Scope]]` slot. Returns true if the slot
    /// changed.
    pub fn add_to_scope_chain(&mut self, scope: &ScopeChain) -> Result<bool, Error> {
        self.check_writable()?;
        if self.scope_unknown {
            return Err(Error::InternalInvariant(
                "Calling add_to_scope_chain when scope is 'unknown'".to_string(),
            ));
        }
        let joined = ScopeChain::add(self.scope.as_ref(), Some(scope));
        let changed = joined.is_some() && joined != self.scope;
        self.scope = joined;
        Ok(changed)
    }

    pub fn is_scope_chain_unknown(&self) -> bool {
        self.scope_unknown
    }

    /// Remove the maybe-modified flag from every property.
    pub fn clear_modified(&mut self) -> Result<(), Error> {
        self.check_writable()?;
        let properties = self
            .properties
            .iter()
            .map(|(key, value)| (key.clone(), value.restrict_to_not_modified()))
            .collect();
        self.properties = Rc::new(properties);
        self.default_numeric_property = self.default_numeric_property.restrict_to_not_modified();
        self.default_other_property = self.default_other_property.restrict_to_not_modified();
        self.internal_prototype = self.internal_prototype.restrict_to_not_modified();
        self.internal_value = self.internal_value.restrict_to_not_modified();
        Ok(())
    }

    /// A new object with every label renamed. When a key is renamed to a key
    /// which is already present, the two values are joined.
    pub fn rename(&self, renamings: &Renamings) -> Obj {
        let mut properties = PropertyMap::new();
        for (key, value) in self.properties.iter() {
            let renamed = value.rename(renamings);
            for key in key.rename(renamings) {
                let joined = match properties.get(&key) {
                    Some(existing) => renamed.join(existing),
                    None => renamed.clone(),
                };
                properties.insert(key, joined);
            }
        }
        Obj {
            properties: Rc::new(properties),
            default_numeric_property: self.default_numeric_property.rename(renamings),
            default_other_property: self.default_other_property.rename(renamings),
            internal_prototype: self.internal_prototype.rename(renamings),
            internal_value: self.internal_value.rename(renamings),
            scope: self.scope.as_ref().map(|scope| scope.rename(renamings)),
            scope_unknown: self.scope_unknown,
            writable: true,
            hash_code: Cell::new(0),
        }
    }

    /// Replace every slot of this object which is definitely not modified by
    /// the corresponding slot of `other`, the object as it was at the call
    /// site. Partitions introduced at any of `nodes` are stripped from the
    /// replacing values.
    pub fn replace_non_modified_parts(
        &mut self,
        other: &Obj,
        nodes: &BTreeSet<usize>,
    ) -> Result<(), Error> {
        self.check_writable()?;

        let mut properties = PropertyMap::new();
        for (key, value) in self.properties.iter() {
            let value = if value.is_maybe_modified() {
                value.clone()
            } else {
                other.get_property(key).remove_partitions(nodes)
            };
            properties.insert(key.clone(), value);
        }

        let numeric_modified = self.default_numeric_property.is_maybe_modified();
        let other_modified = self.default_other_property.is_maybe_modified();
        for (key, value) in other.properties.iter() {
            let default_modified = if key.is_numeric() {
                numeric_modified
            } else {
                other_modified
            };
            if !default_modified && !properties.contains_key(key) {
                properties.insert(key.clone(), value.remove_partitions(nodes));
            }
        }

        if !numeric_modified {
            self.default_numeric_property = other.default_numeric_property.remove_partitions(nodes);
        }
        if !other_modified {
            self.default_other_property = other.default_other_property.remove_partitions(nodes);
        }
        if !self.internal_prototype.is_maybe_modified() {
            self.internal_prototype = other.internal_prototype.remove_partitions(nodes);
        }
        if !self.internal_value.is_maybe_modified() {
            self.internal_value = other.internal_value.remove_partitions(nodes);
        }
        if self.scope_unknown && !other.scope_unknown {
            self.scope = other.scope.clone();
            self.scope_unknown = false;
        }

        // Explicit properties equal to their default carry no information.
        let (numeric, non_numeric) = (&self.default_numeric_property, &self.default_other_property);
        properties.retain(|key, value| {
            let default = if key.is_numeric() { numeric } else { non_numeric };
            value != default
        });
        self.properties = Rc::new(properties);

        if self.is_some_none() {
            self.set_to_none();
        }
        Ok(())
    }

    /// Replace every occurrence of `old` by `new`. Unknown values are left
    /// alone.
    pub fn replace_object_label(&mut self, old: &ObjectLabel, new: &ObjectLabel) -> Result<(), Error> {
        self.check_writable()?;
        let properties = self
            .properties
            .iter()
            .map(|(key, value)| {
                (
                    key.replace_object_label(old, new),
                    value.replace_object_label(old, new),
                )
            })
            .collect();
        self.properties = Rc::new(properties);
        self.scope = self
            .scope
            .as_ref()
            .map(|scope| scope.replace_object_label(old, new));
        self.default_numeric_property = self.default_numeric_property.replace_object_label(old, new);
        self.default_other_property = self.default_other_property.replace_object_label(old, new);
        self.internal_prototype = self.internal_prototype.replace_object_label(old, new);
        self.internal_value = self.internal_value.replace_object_label(old, new);
        Ok(())
    }

    /// Every label used in this object. Unknown values contribute nothing.
    pub fn all_object_labels(&self) -> BTreeSet<ObjectLabel> {
        let mut labels = BTreeSet::new();
        for value in self.properties.values() {
            labels.extend(value.all_object_labels());
        }
        for value in self.slots().iter() {
            labels.extend(value.all_object_labels());
        }
        if let Some(ref scope) = self.scope {
            labels.extend(scope.object_labels());
        }
        labels
    }

    pub fn contains_object_label(&self, label: &ObjectLabel) -> bool {
        self.slots().iter().any(|v| v.contains_object_label(label))
            || self
                .properties
                .iter()
                .any(|(key, value)| key.contains_object_label(label) || value.contains_object_label(label))
            || self
                .scope
                .as_ref()
                .map(|scope| scope.contains_object_label(label))
                .unwrap_or(false)
    }

    /// The value of the slot designated by `property`. The label of the
    /// property reference is not consulted.
    pub fn get_value(&self, property: &ObjectProperty) -> &Value {
        match property.kind() {
            PropertyKind::Ordinary(key) => self.get_property(key),
            PropertyKind::DefaultNumeric => &self.default_numeric_property,
            PropertyKind::DefaultOther => &self.default_other_property,
            PropertyKind::InternalValue => &self.internal_value,
            PropertyKind::InternalPrototype => &self.internal_prototype,
        }
    }

    pub fn set_value(&mut self, property: &ObjectProperty, value: Value) -> Result<(), Error> {
        match property.kind() {
            PropertyKind::Ordinary(key) => self.set_property(key.clone(), value),
            PropertyKind::DefaultNumeric => self.set_default_numeric_property(value),
            PropertyKind::DefaultOther => self.set_default_other_property(value),
            PropertyKind::InternalValue => self.set_internal_value(value),
            PropertyKind::InternalPrototype => self.set_internal_prototype(value),
        }
    }

    /// Trim this object against `template`, the object stored for `label`
    /// at the call site.
    ///
    /// Every property explicit in `template` becomes explicit here before the
    /// default slots change, so no property silently falls through to a
    /// trimmed default. Each slot is then resolved through `resolver`.
    pub fn localize(
        &mut self,
        template: &Obj,
        label: &ObjectLabel,
        resolver: &dyn Resolver,
    ) -> Result<(), Error> {
        self.check_writable()?;

        let materialized: Vec<(PKey, Value)> = template
            .properties
            .keys()
            .map(|key| (key.clone(), self.get_property(key).clone()))
            .collect();
        self.properties_mut().extend(materialized);

        self.default_numeric_property = resolver.localize(
            &self.default_numeric_property,
            &template.default_numeric_property,
            &ObjectProperty::default_numeric(label.clone()),
        )?;
        self.default_other_property = resolver.localize(
            &self.default_other_property,
            &template.default_other_property,
            &ObjectProperty::default_other(label.clone()),
        )?;
        self.internal_value = resolver.localize(
            &self.internal_value,
            &template.internal_value,
            &ObjectProperty::internal_value(label.clone()),
        )?;
        self.internal_prototype = resolver.localize(
            &self.internal_prototype,
            &template.internal_prototype,
            &ObjectProperty::internal_prototype(label.clone()),
        )?;

        let template_scope = if template.scope_unknown {
            None
        } else {
            template.scope.as_ref()
        };
        if !self.scope_unknown || !template.scope_unknown {
            self.scope =
                resolver.localize_scope_chain(self.scope.as_ref(), self.scope_unknown, template_scope)?;
            self.scope_unknown = false;
        }

        let mut properties = PropertyMap::new();
        for (key, value) in self.properties.iter() {
            let localized = resolver.localize(
                value,
                template.get_property(key),
                &ObjectProperty::ordinary(label.clone(), key.clone()),
            )?;
            properties.insert(key.clone(), localized);
        }
        self.properties = Rc::new(properties);
        Ok(())
    }

    /// Make the given properties explicit, with the value they currently
    /// read as.
    pub fn materialize<'a, I>(&mut self, names: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.check_writable()?;
        let materialized: Vec<(PKey, Value)> = names
            .into_iter()
            .map(|name| {
                let key = PKey::str(name);
                let value = self.get_property(&key).clone();
                (key, value)
            })
            .collect();
        self.properties_mut().extend(materialized);
        Ok(())
    }

    /// The pointwise join of two objects, as a new writable object.
    pub fn join(&self, other: &Obj) -> Obj {
        let mut properties = PropertyMap::new();
        let keys: BTreeSet<&PKey> = self
            .properties
            .keys()
            .chain(other.properties.keys())
            .collect();
        for key in keys {
            properties.insert(
                key.clone(),
                self.get_property(key).join(other.get_property(key)),
            );
        }

        let scope_unknown = self.scope_unknown || other.scope_unknown;
        let scope = if scope_unknown {
            None
        } else {
            ScopeChain::add(self.scope.as_ref(), other.scope.as_ref())
        };

        Obj {
            properties: Rc::new(properties),
            default_numeric_property: self
                .default_numeric_property
                .join(&other.default_numeric_property),
            default_other_property: self
                .default_other_property
                .join(&other.default_other_property),
            internal_prototype: self.internal_prototype.join(&other.internal_prototype),
            internal_value: self.internal_value.join(&other.internal_value),
            scope,
            scope_unknown,
            writable: true,
            hash_code: Cell::new(0),
        }
    }

    /// Describe how this object differs from `old`, which is assumed to be
    /// smaller.
    pub fn diff(&self, old: &Obj) -> String {
        let mut b = String::new();
        for (key, value) in self.properties.iter() {
            match old.properties.get(key) {
                None => b.push_str(&format!("\n        new property: {}", key)),
                Some(old_value) if old_value != value => {
                    b.push_str(&format!("\n        changed property: {}: ", key));
                    value.diff(old_value, &mut b);
                    b.push_str(&format!(" was: {}", old_value));
                }
                Some(_) => {}
            }
        }
        let slots = [
            ("default_numeric_property", &self.default_numeric_property, &old.default_numeric_property),
            ("default_other_property", &self.default_other_property, &old.default_other_property),
            ("internal_prototype", &self.internal_prototype, &old.internal_prototype),
            ("internal_value", &self.internal_value, &old.internal_value),
        ];
        for (name, value, old_value) in slots.iter() {
            if value != old_value {
                b.push_str(&format!("\n        changed {}: ", name));
                value.diff(old_value, &mut b);
                b.push_str(&format!(" was: {}", old_value));
            }
        }
        if self.scope_unknown != old.scope_unknown {
            b.push_str(&format!(
                "\n        changed scope_unknown: {} was: {}",
                self.scope_unknown, old.scope_unknown
            ));
        }
        b
    }

    /// The maybe-modified properties of this object, one per line. Internal
    /// slots other than the defaults are included, the scope chain is not.
    pub fn print_modified(&self) -> String {
        let mut b = String::new();
        for (key, value) in self.properties.iter() {
            if value.is_maybe_modified() && value.is_maybe_present_or_unknown() {
                b.push_str(&format!("\n    {}: {}", key.to_string_escaped(), value));
            }
        }
        let slots = [
            ("[[DefaultNumeric]]", &self.default_numeric_property),
            ("[[DefaultOther]]", &self.default_other_property),
            ("[[Prototype]]", &self.internal_prototype),
            ("[[Value]]", &self.internal_value),
        ];
        for (name, value) in slots.iter() {
            if value.is_maybe_modified() && value.is_maybe_present_or_unknown() {
                b.push_str(&format!("\n    {} = {}", name, value));
            }
        }
        b
    }

    /// The structural hash of this object. Cached once the object is frozen.
    pub fn hash_code(&self) -> u64 {
        if !self.writable && self.hash_code.get() != 0 {
            return self.hash_code.get();
        }
        let mut hasher = FxHasher::default();
        self.properties.hash(&mut hasher);
        self.scope.hash(&mut hasher);
        self.scope_unknown.hash(&mut hasher);
        for value in self.slots().iter() {
            value.hash(&mut hasher);
        }
        let h = match hasher.finish() {
            0 => 1,
            h => h,
        };
        if !self.writable {
            self.hash_code.set(h);
        }
        h
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Obj) -> bool {
        std::ptr::eq(self, other)
            || (self.properties == other.properties
                && self.scope == other.scope
                && self.scope_unknown == other.scope_unknown
                && self.default_numeric_property == other.default_numeric_property
                && self.default_other_property == other.default_other_property
                && self.internal_prototype == other.internal_prototype
                && self.internal_value == other.internal_value)
    }
}

impl Eq for Obj {}

impl Hash for Obj {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code())
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.default_numeric_property.is_none() {
            parts.push("<none>".to_string());
        }
        for (key, value) in self.properties.iter() {
            if value == self.default_property(key) {
                continue;
            }
            parts.push(format!("{}:{}", key.to_string_escaped(), value));
        }
        let slots = [
            ("[[DefaultNumeric]]", &self.default_numeric_property),
            ("[[DefaultOther]]", &self.default_other_property),
            ("[[Prototype]]", &self.internal_prototype),
            ("[[Value]]", &self.internal_value),
        ];
        for (name, value) in slots.iter() {
            if value.is_maybe_present_or_unknown() {
                parts.push(format!("{}={}", name, value));
            }
        }
        if let Some(ref scope) = self.scope {
            parts.push(format!("[[Scope]]={}", scope));
        } else if self.scope_unknown {
            parts.push("[[Scope]]=?".to_string());
        }
        write!(f, "{{{}}}", parts.join(","))
    }
}
