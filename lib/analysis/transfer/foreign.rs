//! Transfer functions for values of the foreign language.
//!
//! The namespace root (`Java` by default) evaluates to a `ForeignRoot`
//! object. Calling its type constructor (`Java.type("com.example.Foo")`)
//! yields a `ForeignTypeToken` for the named class, and constructing a type
//! token yields a `ForeignObject`. Property accesses and method calls on type
//! tokens and foreign objects are answered by the `ForeignBridge`. Every
//! other node falls back to the base semantics.
//!
//! Rules which produce a result through the bridge write it and push the
//! state to the single successor block themselves, returning
//! `Propagation::Handled`.

use crate::analysis::transfer::base::{
    property_key, record_variable_write, unexpected, write_result,
};
use crate::analysis::transfer::{
    propagate_clone, Dispatcher, HandlerTable, Propagation, TransferContext,
};
use crate::flowgraph::{Node, NodeKind, Operation, Register};
use crate::lattice::{Foreign, Kind, Obj, ObjectLabel, PKey, Value};
use crate::Error;

/// Member name reported to the monitor for constructor invocations.
const CONSTRUCTOR: &str = "<init>";

/// The handler table overriding the base semantics for foreign values.
pub fn layer() -> HandlerTable {
    let mut table = HandlerTable::new();
    table
        .insert(NodeKind::ReadVariable, read_variable)
        .insert(NodeKind::ReadProperty, read_property)
        .insert(NodeKind::WriteProperty, write_property)
        .insert(NodeKind::WriteVariable, write_variable)
        .insert(NodeKind::Call, call)
        .insert(NodeKind::ForeignMarker, foreign_marker);
    table
}

/// The foreign class name carried by a type token or foreign object label.
fn class_name(label: &ObjectLabel) -> Result<&str, Error> {
    label.foreign_name().ok_or_else(|| {
        Error::InternalInvariant(format!("Foreign label {} has no class name", label))
    })
}

/// The value a bridge returns for a member with no definable effect.
fn is_absent_sentinel(value: &Value) -> bool {
    value.is_maybe_absent() && !value.is_maybe_present_or_unknown()
}

/// The name of a foreign member. Foreign members must be named by a known
/// string.
fn member_name(node: &Node, key: Option<PKey>) -> Result<String, Error> {
    match key {
        Some(PKey::Str(name)) => Ok(name),
        Some(PKey::Symbol(label)) => Err(Error::cross_language(format!(
            "Symbol property {} of a foreign value at node {}",
            label,
            node.index()
        ))),
        None => Err(Error::cross_language(format!(
            "Property name of a foreign access at node {} is not a known string",
            node.index()
        ))),
    }
}

/// Transfer `node` with the base semantics while register `base` holds only
/// `ordinary`, the part of its value no foreign rule covers. The register is
/// restored afterwards unless the node wrote it. Returns the value the node
/// wrote to `result`.
fn transfer_ordinary_part(
    dispatcher: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
    base: Register,
    ordinary: Value,
    result: Option<Register>,
) -> Result<Option<Value>, Error> {
    let original = ctx.state.read_register(base)?.clone();
    ctx.state.write_register(base, ordinary);
    let outcome = dispatcher.fallback(ctx, node);
    if result != Some(base) {
        ctx.state.write_register(base, original);
    }
    if outcome? == Propagation::Handled {
        return Err(Error::InternalInvariant(format!(
            "Base transfer of node {} propagated the state itself",
            node.index()
        )));
    }
    Ok(result.and_then(|result| ctx.state.register(result).cloned()))
}

/// Join `value` with the result of the base semantics on the ordinary part of
/// register `base`, if there is one.
fn join_ordinary_part(
    dispatcher: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
    base: Register,
    result: Option<Register>,
    value: Value,
) -> Result<Value, Error> {
    let ordinary = ctx.state.read_register(base)?.restrict_to_not_foreign();
    if ordinary.is_none() {
        return Ok(value);
    }
    trace!("node {} also transfers {} as an ordinary value", node.index(), ordinary);
    Ok(
        match transfer_ordinary_part(dispatcher, ctx, node, base, ordinary, result)? {
            Some(ordinary_result) => value.join(&ordinary_result),
            None => value,
        },
    )
}

fn read_variable(
    dispatcher: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (result, name) = match node.operation() {
        Operation::ReadVariable { result, name } => (*result, name),
        _ => return Err(unexpected(node)),
    };
    let flow_graph = ctx.flow_graph;
    let function = flow_graph.function(ctx.state.function())?;
    if name != ctx.options.foreign_root_name() || function.declares(name) {
        return dispatcher.fallback(ctx, node);
    }

    let label = ctx
        .canonicalizer
        .make_label(node.index(), Kind::ForeignRoot);
    trace!("node {} reads the foreign root as {}", node.index(), label);
    ctx.state.new_object(label.clone(), Obj::absent_modified());
    write_result(ctx, node, result, Value::object(label));
    Ok(Propagation::Default)
}

fn read_property(
    dispatcher: &Dispatcher,
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

    match base_value.foreign() {
        None => dispatcher.fallback(ctx, node),
        Some(Foreign::Root(_))
            if !base_value.is_foreign_object() && !base_value.is_foreign_type_token() =>
        {
            let is_type = property.as_fixed() == Some(ctx.options.type_constructor_name());
            if !is_type && result.is_some() {
                return dispatcher.fallback(ctx, node);
            }
            trace!("node {} skips a read of the foreign root", node.index());
            let ordinary = base_value.restrict_to_not_foreign();
            if !ordinary.is_none() {
                transfer_ordinary_part(dispatcher, ctx, node, base, ordinary, result)?;
            }
            Ok(Propagation::Default)
        }
        Some(_) => {
            let name = member_name(node, property_key(ctx, property)?)?;
            let mut value = Value::none();
            for foreign in base_value.foreign_labels() {
                if let Foreign::Root(_) = foreign {
                    continue;
                }
                let class = class_name(foreign.label())?;
                ctx.monitor.visit_foreign_query(node, class, &name);
                let answer = ctx.bridge.query_property_value(class, &name)?;
                value = value.join(&ctx.canonicalizer.canonicalize_value(&answer));
            }
            let value = join_ordinary_part(dispatcher, ctx, node, base, result, value)?;
            if let Some(result) = result {
                write_result(ctx, node, result, value);
            }
            Ok(Propagation::Default)
        }
    }
}

fn write_property(
    dispatcher: &Dispatcher,
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
    let base_value = ctx.state.read_register(base)?.clone();
    if !base_value.is_foreign_object() && !base_value.is_foreign_type_token() {
        return dispatcher.fallback(ctx, node);
    }

    let name = member_name(node, property_key(ctx, property)?)?;
    let value = ctx.state.read_register(value)?.clone();
    for foreign in base_value.foreign_labels() {
        if let Foreign::Root(_) = foreign {
            continue;
        }
        ctx.monitor
            .visit_foreign_query(node, class_name(foreign.label())?, &name);
    }
    ctx.bridge.set_property(&base_value, &name, &value)?;

    // the base may be an ordinary object instead, which keeps its old value
    let ordinary = base_value.restrict_to_not_foreign();
    if ordinary.is_maybe_object() {
        let key = PKey::str(name);
        ctx.monitor
            .visit_property_write(node, ordinary.object_labels(), &key);
        ctx.state
            .weak_write_property(ordinary.object_labels(), &key, &value.remove_attributes())?;
    }
    Ok(Propagation::Default)
}

fn write_variable(
    dispatcher: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (name, value_register) = match node.operation() {
        Operation::WriteVariable { name, value } => (name, *value),
        _ => return Err(unexpected(node)),
    };
    let value = ctx.state.read_register(value_register)?.clone();
    if !value.is_foreign_object() {
        return dispatcher.fallback(ctx, node);
    }
    record_variable_write(ctx, node, name, value_register, value)?;
    Ok(Propagation::Default)
}

fn call(
    dispatcher: &Dispatcher,
    ctx: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    let (result, base, property, function, arguments, constructor) = match node.operation() {
        Operation::Call {
            result,
            base,
            property,
            function,
            arguments,
            constructor,
        } => (
            *result,
            *base,
            property.as_deref(),
            *function,
            arguments,
            *constructor,
        ),
        _ => return Err(unexpected(node)),
    };

    // new Foo(...) where Foo is a type token
    if constructor {
        let (function, callee) = match function {
            Some(function) => (function, ctx.state.read_register(function)?.clone()),
            None => return dispatcher.fallback(ctx, node),
        };
        let class = match callee.foreign() {
            Some(Foreign::TypeToken(label)) => class_name(label)?.to_string(),
            _ => return dispatcher.fallback(ctx, node),
        };
        for argument in arguments {
            ctx.state.read_register(*argument)?;
        }
        ctx.monitor.visit_foreign_query(node, &class, CONSTRUCTOR);
        let value = ctx.bridge.new_object(node.index(), &class)?;
        let value = ctx.canonicalizer.canonicalize_value(&value);
        let value = join_ordinary_part(dispatcher, ctx, node, function, result, value)?;
        if let Some(result) = result {
            write_result(ctx, node, result, value);
        }
        propagate_clone(ctx, node)?;
        return Ok(Propagation::Handled);
    }

    let (base, name) = match (base, property) {
        (Some(base), Some(name)) => (base, name),
        _ => return dispatcher.fallback(ctx, node),
    };
    let base_value = ctx.state.read_register(base)?.clone();
    let receiver = match base_value.foreign() {
        Some(receiver) => receiver,
        None => return dispatcher.fallback(ctx, node),
    };

    let value = match receiver {
        Foreign::Root(_) => {
            if name != ctx.options.type_constructor_name() || arguments.len() != 1 {
                return dispatcher.fallback(ctx, node);
            }
            let class = match ctx.state.read_register(arguments[0])?.get_str() {
                Some(class) => class.to_string(),
                None => {
                    return Err(Error::cross_language(format!(
                        "Argument of {}.{} at node {} is not a constant string",
                        ctx.options.foreign_root_name(),
                        name,
                        node.index()
                    )))
                }
            };
            let label = ctx.canonicalizer.make_foreign_label(
                node.index(),
                Kind::ForeignTypeToken,
                class.as_str(),
            );
            debug!("node {} creates type token {}", node.index(), label);
            ctx.state.new_object(label.clone(), Obj::absent_modified());
            Value::object(label)
                .set_dont_delete()
                .set_dont_enum()
                .set_read_only()
        }
        Foreign::Object(label) => {
            let class = class_name(label)?.to_string();
            let mut values = Vec::with_capacity(arguments.len());
            for argument in arguments {
                values.push(ctx.state.read_register(*argument)?.clone());
            }
            ctx.monitor.visit_foreign_query(node, &class, name);
            let value = ctx.bridge.call_function(&base_value, name, &values)?;
            if is_absent_sentinel(&value) {
                debug!(
                    "{}.{} at node {} has no result, using default propagation",
                    class,
                    name,
                    node.index()
                );
                let ordinary = base_value.restrict_to_not_foreign();
                if !ordinary.is_none() {
                    transfer_ordinary_part(dispatcher, ctx, node, base, ordinary, result)?;
                }
                return Ok(Propagation::Default);
            }
            ctx.canonicalizer.canonicalize_value(&value)
        }
        Foreign::TypeToken(label) => {
            let class = class_name(label)?.to_string();
            for argument in arguments {
                ctx.state.read_register(*argument)?;
            }
            ctx.monitor.visit_foreign_query(node, &class, name);
            let value = ctx.bridge.query_function_value(&class, name)?;
            ctx.canonicalizer.canonicalize_value(&value)
        }
    };

    let value = join_ordinary_part(dispatcher, ctx, node, base, result, value)?;
    if let Some(result) = result {
        write_result(ctx, node, result, value);
    }
    propagate_clone(ctx, node)?;
    Ok(Propagation::Handled)
}

fn foreign_marker(
    _: &Dispatcher,
    _: &mut TransferContext<'_>,
    node: &Node,
) -> Result<Propagation, Error> {
    match node.operation() {
        Operation::ForeignMarker { definition_site } => {
            trace!("foreign marker {} at node {}", definition_site, node.index());
            Ok(Propagation::Default)
        }
        _ => Err(unexpected(node)),
    }
}
