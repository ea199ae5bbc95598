//! The ordinary transfer functions.

use crate::analysis::transfer::{Dispatcher, HandlerTable, Propagation, TransferContext};
use crate::flowgraph::{BinaryOp, Constant, Node, NodeKind, Operation, PropertyName, Register};
use crate::lattice::{Kind, Obj, PKey, Value};
use crate::Error;
use std::collections::BTreeSet;

/// The handler table with the ordinary semantics for every node kind.
pub fn table() -> HandlerTable {
    let mut table = HandlerTable::new();
    table
        .insert(NodeKind::Constant, constant)
        .insert(NodeKind::ReadVariable, read_variable)
        .insert(NodeKind::WriteVariable, write_variable)
        .insert(NodeKind::ReadProperty, read_property)
        .insert(NodeKind::WriteProperty, write_property)
        .insert(NodeKind::NewObject, new_object)
        .insert(NodeKind::Call, call)
        .insert(NodeKind::BinaryOperator, binary_operator)
        .insert(NodeKind::ForeignMarker, nop)
        .insert(NodeKind::Nop, nop);
    table
}

pub(crate) fn unexpected(node: &Node) -> Error {
    Error::InternalInvariant(format!(
        "Unexpected operation for {:?} handler: {}",
        node.kind(),
        node
    ))
}

/// Write `value` to `register` as the definite result of `node`.
pub(crate) fn write_result(ctx: &mut TransferContext<'_>, node: &Node, register: Register, value: Value) {
    ctx.state.write_register(register, value);
    ctx.state.add_must_reaching_def(register, node.index());
}

/// The property key of a property access, if it is known statically.
pub(crate) fn property_key(
    ctx: &TransferContext<'_>,
    property: &PropertyName,
) -> Result<Option<PKey>, Error> {
    Ok(match property {
        PropertyName::Fixed(name) => Some(PKey::str(name.as_str())),
        PropertyName::Dynamic(register) => ctx
            .state
            .read_register(*register)?
            .get_str()
            .map(PKey::str),
    })
}

fn constant(_: &Dispatcher, ctx: &mut TransferContext<'_>, node: &Node) -> Result<Propagation, Error> {
    let (result, value) = match node.operation() {
        Operation::Constant { result, value } => (*result, value),
        _ => return Err(unexpected(node)),
    };
    let value = match value {
        Constant::Undefined => Value::undef(),
        Constant::Null => Value::null(),
        Constant::Boolean(b) => Value::bool(*b),
        Constant::Number(_) => Value::any_num(),
        Constant::String(s) => Value::str(s.as_str()),
    };
    write_result(ctx, node, result, value);
    Ok(Propagation::Default)
}

fn read_variable(
    _: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (result, name) = match node.operation() {
        Operation::ReadVariable { result, name } => (*result, name),
        _ => return Err(unexpected(node)),
    };
    let flow_graph = ctx.flow_graph;
    let function = flow_graph.function(ctx.state.function())?;
    let value = ctx.state.read_variable(ctx.canonicalizer, function, name);
    let context = ctx.state.context().clone();
    ctx.monitor
        .visit_variable_or_property(node, name, &value, &context);
    write_result(ctx, node, result, value);
    Ok(Propagation::Default)
}

/// Bind `name` to `value`, and do the bookkeeping shared by every variable
/// write: the `arguments` object of the function, monitor hooks and the
/// must-equals facts of `value_register`.
pub(crate) fn record_variable_write(
    ctx: &mut TransferContext<'_>,
    node: &Node,
    name: &str,
    value_register: Register,
    value: Value,
) -> Result<(), Error> {
    let flow_graph = ctx.flow_graph;
    let function = flow_graph.function(ctx.state.function())?;
    let (labels, definite) =
        ctx.state
            .write_variable(ctx.canonicalizer, function, name, &value)?;

    if let Some(index) = function.parameter_index(name) {
        let arguments = ctx
            .canonicalizer
            .make_label(function.index(), Kind::Arguments);
        if ctx.state.object(&arguments).is_some() {
            let labels: BTreeSet<_> = std::iter::once(arguments).collect();
            ctx.state
                .write_property(&labels, &PKey::str(index.to_string()), &value)?;
        }
    }

    let context = ctx.state.context().clone();
    ctx.monitor
        .visit_variable_or_property(node, name, &value, &context);
    ctx.monitor
        .visit_property_write(node, &labels, &PKey::str(name));

    if definite {
        if let Some(label) = labels.into_iter().next() {
            ctx.state
                .add_must_equals(value_register, label, PKey::str(name));
        }
    }
    Ok(())
}

fn write_variable(
    _: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (name, value_register) = match node.operation() {
        Operation::WriteVariable { name, value } => (name, *value),
        _ => return Err(unexpected(node)),
    };
    let value = ctx
        .state
        .read_register(value_register)?
        .remove_attributes()
        .collapse_partitions();
    record_variable_write(ctx, node, name, value_register, value)?;
    Ok(Propagation::Default)
}

fn read_property(
    _: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (result, base, property) = match node.operation() {
        Operation::ReadProperty {
            result,
            base,
            property,
        } => (*result, *base, property),
        _ => return Err(unexpected(node)),
    };
    let base_value = ctx.state.read_register(base)?.clone();
    let labels = base_value.object_labels();
    let key = property_key(ctx, property)?;

    let raw = match key {
        Some(ref key) => ctx.state.read_property(labels, key),
        None => ctx.state.read_any_property(labels),
    };
    let mut value = raw
        .restrict_to_not_absent()
        .restrict_to_not_modified()
        .remove_attributes();
    if raw.is_maybe_absent() {
        value = value.join(&Value::undef());
    }
    if base_value.is_maybe_primitive() {
        value = value.join(&Value::any_primitive());
    }

    if let Some(result) = result {
        write_result(ctx, node, result, value);
        if let (Some(key), 1) = (key, labels.len()) {
            if let Some(label) = labels.iter().next() {
                ctx.state.add_must_equals(result, label.clone(), key);
            }
        }
    }
    Ok(Propagation::Default)
}

fn write_property(
    _: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (base, property, value) = match node.operation() {
        Operation::WriteProperty {
            base,
            property,
            value,
        } => (*base, property, *value),
        _ => return Err(unexpected(node)),
    };
    let labels = ctx.state.read_register(base)?.object_labels().clone();
    let value = ctx.state.read_register(value)?.remove_attributes();
    match property_key(ctx, property)? {
        Some(key) => {
            ctx.monitor.visit_property_write(node, &labels, &key);
            ctx.state.write_property(&labels, &key, &value)?;
        }
        None => {
            trace!("node {} writes an unknown property", node.index());
            ctx.state.write_any_property(&labels, &value)?;
        }
    }
    Ok(Propagation::Default)
}

fn new_object(
    _: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let result = match node.operation() {
        Operation::NewObject { result } => *result,
        _ => return Err(unexpected(node)),
    };
    let label = ctx.canonicalizer.make_label(node.index(), Kind::Object);
    ctx.state.new_object(label.clone(), Obj::absent_modified());
    write_result(ctx, node, result, Value::object(label));
    Ok(Propagation::Default)
}

/// Calls are not resolved to callees. The result is any primitive, or a
/// fresh object for a constructor call.
fn call(_: &Dispatcher, ctx: &mut TransferContext<'_>, node: &Node) -> Result<Propagation, Error> {
    let (result, arguments, constructor) = match node.operation() {
        Operation::Call {
            result,
            arguments,
            constructor,
            ..
        } => (*result, arguments, *constructor),
        _ => return Err(unexpected(node)),
    };
    for argument in arguments {
        ctx.state.read_register(*argument)?;
    }
    debug!("call at node {} is not resolved", node.index());

    let value = if constructor {
        let label = ctx.canonicalizer.make_label(node.index(), Kind::Object);
        ctx.state.new_object(label.clone(), Obj::absent_modified());
        Value::object(label)
    } else {
        Value::any_primitive()
    };
    if let Some(result) = result {
        write_result(ctx, node, result, value);
    }
    Ok(Propagation::Default)
}

fn binary_operator(
    _: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (result, op, lhs, rhs) = match node.operation() {
        Operation::BinaryOperator {
            result,
            op,
            lhs,
            rhs,
        } => (*result, *op, *lhs, *rhs),
        _ => return Err(unexpected(node)),
    };
    let lhs = ctx.state.read_register(lhs)?;
    let rhs = ctx.state.read_register(rhs)?;
    let value = match op {
        BinaryOp::Add => match (lhs.get_str(), rhs.get_str()) {
            (Some(l), Some(r)) => Value::str(format!("{}{}", l, r)),
            _ => {
                let maybe_str = lhs.is_maybe_str()
                    || rhs.is_maybe_str()
                    || lhs.is_maybe_object()
                    || rhs.is_maybe_object();
                if maybe_str {
                    Value::any_str().join(&Value::any_num())
                } else {
                    Value::any_num()
                }
            }
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => Value::any_num(),
        BinaryOp::Eq | BinaryOp::StrictEq | BinaryOp::Lt => Value::any_bool(),
    };
    write_result(ctx, node, result, value);
    Ok(Propagation::Default)
}

fn nop(_: &Dispatcher, _: &mut TransferContext<'_>, _: &Node) -> Result<Propagation, Error> {
    Ok(Propagation::Default)
}

#[cfg(test)]
mod tests {
    use crate::flowgraph::{BinaryOp, Constant, Operation};
    use crate::lattice::{Kind, PKey, Value};
    use crate::tests::Harness;

    #[test]
    fn constants_and_arithmetic() {
        let mut harness = Harness::new();
        harness.node(Operation::constant(0, Constant::String("a".to_string())));
        harness.node(Operation::constant(1, Constant::String("b".to_string())));
        harness.node(Operation::binary(2, BinaryOp::Add, 0, 1));
        harness.node(Operation::constant(3, Constant::Number(1.5)));
        harness.node(Operation::binary(4, BinaryOp::Add, 3, 3));
        harness.node(Operation::binary(5, BinaryOp::Lt, 3, 0));
        harness.node(Operation::binary(6, BinaryOp::Add, 3, 0));
        harness.run_base().unwrap();

        assert_eq!(harness.register(2), Value::str("ab"));
        assert_eq!(harness.register(4), Value::any_num());
        assert_eq!(harness.register(5), Value::any_bool());
        assert!(harness.register(6).is_maybe_str());
        assert!(harness.register(6).is_maybe_num());
    }

    #[test]
    fn properties_of_new_objects() {
        let mut harness = Harness::new();
        harness.node(Operation::new_object(0));
        harness.node(Operation::constant(1, Constant::Null));
        harness.node(Operation::write_property(0, "p", 1));
        harness.node(Operation::read_property(Some(2), 0, "p"));
        harness.node(Operation::read_property(Some(3), 0, "q"));
        harness.run_base().unwrap();

        assert_eq!(harness.register(2), Value::null());
        assert_eq!(harness.register(3), Value::undef());
        let label = harness.canonicalizer.make_label(0, Kind::Object);
        assert_eq!(
            harness.state.must_equals(2),
            Some(&(label, PKey::str("p")))
        );
        assert_eq!(harness.state.must_reaching_def(2), Some(3));
    }

    #[test]
    fn variables() {
        let mut harness = Harness::new();
        harness.node(Operation::constant(0, Constant::Boolean(true)));
        harness.node(Operation::write_variable("x", 0));
        harness.node(Operation::read_variable(1, "x"));
        harness.node(Operation::read_variable(2, "y"));
        harness.run_base().unwrap();

        assert_eq!(harness.register(1), Value::bool(true));
        assert_eq!(harness.register(2), Value::undef());
        assert_eq!(
            harness.state.must_equals(0).map(|(_, key)| key.clone()),
            Some(PKey::str("x"))
        );
    }

    #[test]
    fn unresolved_calls() {
        let mut harness = Harness::new();
        harness.node(Operation::new_object(0));
        harness.node(Operation::method_call(Some(1), 0, "f", vec![0]));
        harness.node(Operation::construct(2, 0, vec![]));
        harness.run_base().unwrap();

        assert_eq!(harness.register(1), Value::any_primitive());
        assert_eq!(harness.register(2).object_labels().len(), 1);
        assert!(harness.propagator.pushes.is_empty());
    }

    #[test]
    fn reading_an_undefined_register_fails() {
        let mut harness = Harness::new();
        harness.node(Operation::read_property(Some(1), 0, "p"));
        assert!(harness.run_base().is_err());
    }
}
