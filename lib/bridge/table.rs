use crate::bridge::ForeignBridge;
use crate::lattice::{Foreign, Kind, LabelTable, Value};
use crate::Error;
use std::collections::BTreeMap;

/// The members of one foreign class, as seen by a `TableBridge`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassDescription {
    name: String,
    fields: BTreeMap<String, Value>,
    methods: BTreeMap<String, Value>,
    static_methods: BTreeMap<String, Value>,
    constructible: bool,
}

impl ClassDescription {
    /// A constructible class without members.
    pub fn new<S: Into<String>>(name: S) -> ClassDescription {
        ClassDescription {
            name: name.into(),
            constructible: true,
            ..Default::default()
        }
    }

    pub fn field<S: Into<String>>(mut self, name: S, value: Value) -> ClassDescription {
        self.fields.insert(name.into(), value);
        self
    }

    /// An instance method returning `value`. Use `Value::absent()` for a
    /// method without a result.
    pub fn method<S: Into<String>>(mut self, name: S, value: Value) -> ClassDescription {
        self.methods.insert(name.into(), value);
        self
    }

    pub fn static_method<S: Into<String>>(mut self, name: S, value: Value) -> ClassDescription {
        self.static_methods.insert(name.into(), value);
        self
    }

    pub fn constructible(mut self, constructible: bool) -> ClassDescription {
        self.constructible = constructible;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

/// A question a `TableBridge` was asked.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    PropertyValue {
        class: String,
        property: String,
    },
    FunctionValue {
        class: String,
        function: String,
    },
    CallFunction {
        class: String,
        function: String,
        arguments: Vec<Value>,
    },
    SetProperty {
        class: String,
        property: String,
        value: Value,
    },
    NewObject {
        site: usize,
        class: String,
    },
}

/// A `ForeignBridge` answering from in-memory class descriptions.
///
/// Every query is recorded, in order, and can be inspected with `queries`.
/// Foreign object labels come from a table of the bridge's own, which
/// outlives analysis runs; the transfer functions re-intern every answer
/// with the run's `Canonicalizer`.
#[derive(Debug, Default)]
pub struct TableBridge {
    classes: BTreeMap<String, ClassDescription>,
    labels: LabelTable,
    queries: Vec<Query>,
    resumed: Vec<String>,
}

impl TableBridge {
    pub fn new() -> TableBridge {
        TableBridge::default()
    }

    pub fn with_class(mut self, class: ClassDescription) -> TableBridge {
        self.add_class(class);
        self
    }

    pub fn add_class(&mut self, class: ClassDescription) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn class(&self, name: &str) -> Option<&ClassDescription> {
        self.classes.get(name)
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// The code passed to `resume`, in order.
    pub fn resumed(&self) -> &[String] {
        &self.resumed
    }

    fn lookup(&self, class: &str) -> Result<&ClassDescription, Error> {
        self.classes
            .get(class)
            .ok_or_else(|| Error::cross_language(format!("Unknown foreign class {}", class)))
    }

    /// The class names of the foreign objects in `receiver`.
    fn receiver_classes(receiver: &Value) -> Result<Vec<String>, Error> {
        let classes: Vec<String> = receiver
            .foreign_labels()
            .filter_map(|foreign| match foreign {
                Foreign::Object(_) | Foreign::TypeToken(_) => foreign.class_name(),
                Foreign::Root(_) => None,
            })
            .map(|class| class.to_string())
            .collect();
        if classes.is_empty() {
            return Err(Error::cross_language(format!(
                "Receiver {} is not a foreign object",
                receiver
            )));
        }
        Ok(classes)
    }
}

fn member<'c>(
    members: &'c BTreeMap<String, Value>,
    class: &str,
    kind: &str,
    name: &str,
) -> Result<&'c Value, Error> {
    members.get(name).ok_or_else(|| {
        Error::cross_language(format!("Foreign class {} has no {} {}", class, kind, name))
    })
}

impl ForeignBridge for TableBridge {
    fn query_property_value(&mut self, class: &str, property: &str) -> Result<Value, Error> {
        debug!("query property {}.{}", class, property);
        self.queries.push(Query::PropertyValue {
            class: class.to_string(),
            property: property.to_string(),
        });
        let description = self.lookup(class)?;
        Ok(member(&description.fields, class, "field", property)?.clone())
    }

    fn query_function_value(&mut self, class: &str, function: &str) -> Result<Value, Error> {
        debug!("query function {}.{}", class, function);
        self.queries.push(Query::FunctionValue {
            class: class.to_string(),
            function: function.to_string(),
        });
        let description = self.lookup(class)?;
        Ok(member(&description.static_methods, class, "static method", function)?.clone())
    }

    fn call_function(
        &mut self,
        receiver: &Value,
        function: &str,
        arguments: &[Value],
    ) -> Result<Value, Error> {
        let mut value = Value::none();
        for class in TableBridge::receiver_classes(receiver)? {
            debug!("call {}.{} with {} arguments", class, function, arguments.len());
            self.queries.push(Query::CallFunction {
                class: class.clone(),
                function: function.to_string(),
                arguments: arguments.to_vec(),
            });
            let description = self.lookup(&class)?;
            value = value.join(member(&description.methods, &class, "method", function)?);
        }
        Ok(value)
    }

    fn set_property(
        &mut self,
        receiver: &Value,
        property: &str,
        value: &Value,
    ) -> Result<(), Error> {
        for class in TableBridge::receiver_classes(receiver)? {
            debug!("set {}.{} to {}", class, property, value);
            self.queries.push(Query::SetProperty {
                class: class.clone(),
                property: property.to_string(),
                value: value.clone(),
            });
            let description = self.classes.get_mut(&class).ok_or_else(|| {
                Error::cross_language(format!("Unknown foreign class {}", class))
            })?;
            let field = description.fields.get_mut(property).ok_or_else(|| {
                Error::cross_language(format!("Foreign class {} has no field {}", class, property))
            })?;
            *field = field.join(value);
        }
        Ok(())
    }

    fn new_object(&mut self, site: usize, class: &str) -> Result<Value, Error> {
        debug!("new {} at node {}", class, site);
        self.queries.push(Query::NewObject {
            site,
            class: class.to_string(),
        });
        if !self.lookup(class)?.constructible {
            return Err(Error::cross_language(format!(
                "Foreign class {} can not be constructed",
                class
            )));
        }
        let label = self.labels.make_foreign(site, Kind::ForeignObject, class);
        Ok(Value::object(label))
    }

    fn resume(&mut self, code: &str) -> Result<(), Error> {
        trace!("resume {}", code);
        self.resumed.push(code.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> TableBridge {
        TableBridge::new().with_class(
            ClassDescription::new("com.example.Foo")
                .field("count", Value::any_num())
                .method("bar", Value::any_str())
                .method("reset", Value::absent())
                .static_method("of", Value::null()),
        )
    }

    #[test]
    fn answers_and_records_queries() {
        let mut bridge = bridge();
        assert_eq!(
            bridge
                .query_property_value("com.example.Foo", "count")
                .unwrap(),
            Value::any_num()
        );
        assert_eq!(
            bridge.query_function_value("com.example.Foo", "of").unwrap(),
            Value::null()
        );
        let object = bridge.new_object(4, "com.example.Foo").unwrap();
        assert!(object.is_foreign_object());
        assert_eq!(
            bridge.call_function(&object, "bar", &[Value::null()]).unwrap(),
            Value::any_str()
        );
        assert_eq!(bridge.queries().len(), 4);
        assert_eq!(
            bridge.queries()[3],
            Query::CallFunction {
                class: "com.example.Foo".to_string(),
                function: "bar".to_string(),
                arguments: vec![Value::null()],
            }
        );
    }

    #[test]
    fn set_property_joins_into_the_field() {
        let mut bridge = bridge();
        let object = bridge.new_object(1, "com.example.Foo").unwrap();
        bridge
            .set_property(&object, "count", &Value::undef())
            .unwrap();
        let count = &bridge.class("com.example.Foo").unwrap().fields()["count"];
        assert!(count.is_maybe_num());
        assert!(count.is_maybe_undef());
    }

    #[test]
    fn unknown_members_are_cross_language_errors() {
        let mut bridge = bridge();
        let error = bridge
            .query_property_value("com.example.Missing", "x")
            .unwrap_err();
        assert!(!error.is_fatal());
        assert!(bridge
            .query_property_value("com.example.Foo", "missing")
            .is_err());
        assert!(bridge
            .call_function(&Value::null(), "bar", &[])
            .is_err());

        let mut bridge = TableBridge::new()
            .with_class(ClassDescription::new("com.example.Util").constructible(false));
        assert!(matches!(
            bridge.new_object(0, "com.example.Util"),
            Err(Error::CrossLanguage { .. })
        ));
    }

    #[test]
    fn resume_is_recorded() {
        let mut bridge = TableBridge::new();
        bridge.resume("run()").unwrap();
        assert_eq!(bridge.resumed(), &["run()".to_string()]);
    }
}
