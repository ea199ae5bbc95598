use serde::{Deserialize, Serialize};
use std::fmt;

/// A register of the flow graph. Registers are local to a function
/// activation.
pub type Register = usize;

/// A literal operand.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Constant {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Undefined => write!(f, "undefined"),
            Constant::Null => write!(f, "null"),
            Constant::Boolean(b) => write!(f, "{}", b),
            Constant::Number(n) => write!(f, "{}", n),
            Constant::String(s) => write!(f, "\"{}\"", s.escape_default()),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    StrictEq,
    Lt,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::StrictEq => "===",
            BinaryOp::Lt => "<",
        };
        write!(f, "{}", op)
    }
}

/// The property operand of a property access.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum PropertyName {
    /// `base.name`
    Fixed(String),
    /// `base[register]`
    Dynamic(Register),
}

impl PropertyName {
    /// The property name, if it is known statically.
    pub fn as_fixed(&self) -> Option<&str> {
        match self {
            PropertyName::Fixed(name) => Some(name),
            PropertyName::Dynamic(_) => None,
        }
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PropertyName::Fixed(name) => write!(f, ".{}", name),
            PropertyName::Dynamic(register) => write!(f, "[v{}]", register),
        }
    }
}

/// The discriminant of an `Operation`. Transfer functions are dispatched on
/// it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum NodeKind {
    Constant,
    ReadVariable,
    WriteVariable,
    ReadProperty,
    WriteProperty,
    NewObject,
    Call,
    BinaryOperator,
    ForeignMarker,
    Nop,
}

/// The operation performed by a flow-graph node.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Operation {
    /// `result = constant`
    Constant { result: Register, value: Constant },
    /// `result = name`
    ReadVariable { result: Register, name: String },
    /// `name = value`
    WriteVariable { name: String, value: Register },
    /// `result = base.property`. A read without a result only exists for its
    /// side effects.
    ReadProperty {
        result: Option<Register>,
        base: Register,
        property: PropertyName,
    },
    /// `base.property = value`
    WriteProperty {
        base: Register,
        property: PropertyName,
        value: Register,
    },
    /// `result = {}`
    NewObject { result: Register },
    /// A call. A method call has a `base` and a `property`, any other call
    /// has a `function` register.
    Call {
        result: Option<Register>,
        base: Option<Register>,
        property: Option<String>,
        function: Option<Register>,
        arguments: Vec<Register>,
        constructor: bool,
    },
    /// `result = lhs op rhs`
    BinaryOperator {
        result: Register,
        op: BinaryOp,
        lhs: Register,
        rhs: Register,
    },
    /// Marks a point where control crosses into the foreign language. Has no
    /// effect on the abstract state.
    ForeignMarker { definition_site: u64 },
    Nop,
}

impl Operation {
    pub fn constant(result: Register, value: Constant) -> Operation {
        Operation::Constant { result, value }
    }

    pub fn read_variable<S: Into<String>>(result: Register, name: S) -> Operation {
        Operation::ReadVariable {
            result,
            name: name.into(),
        }
    }

    pub fn write_variable<S: Into<String>>(name: S, value: Register) -> Operation {
        Operation::WriteVariable {
            name: name.into(),
            value,
        }
    }

    pub fn read_property<S: Into<String>>(
        result: Option<Register>,
        base: Register,
        name: S,
    ) -> Operation {
        Operation::ReadProperty {
            result,
            base,
            property: PropertyName::Fixed(name.into()),
        }
    }

    pub fn write_property<S: Into<String>>(base: Register, name: S, value: Register) -> Operation {
        Operation::WriteProperty {
            base,
            property: PropertyName::Fixed(name.into()),
            value,
        }
    }

    pub fn new_object(result: Register) -> Operation {
        Operation::NewObject { result }
    }

    /// `result = base.name(arguments...)`
    pub fn method_call<S: Into<String>>(
        result: Option<Register>,
        base: Register,
        name: S,
        arguments: Vec<Register>,
    ) -> Operation {
        Operation::Call {
            result,
            base: Some(base),
            property: Some(name.into()),
            function: None,
            arguments,
            constructor: false,
        }
    }

    /// `result = function(arguments...)`
    pub fn call(result: Option<Register>, function: Register, arguments: Vec<Register>) -> Operation {
        Operation::Call {
            result,
            base: None,
            property: None,
            function: Some(function),
            arguments,
            constructor: false,
        }
    }

    /// `result = new function(arguments...)`
    pub fn construct(result: Register, function: Register, arguments: Vec<Register>) -> Operation {
        Operation::Call {
            result: Some(result),
            base: None,
            property: None,
            function: Some(function),
            arguments,
            constructor: true,
        }
    }

    pub fn binary(result: Register, op: BinaryOp, lhs: Register, rhs: Register) -> Operation {
        Operation::BinaryOperator {
            result,
            op,
            lhs,
            rhs,
        }
    }

    pub fn foreign_marker(definition_site: u64) -> Operation {
        Operation::ForeignMarker { definition_site }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Operation::Constant { .. } => NodeKind::Constant,
            Operation::ReadVariable { .. } => NodeKind::ReadVariable,
            Operation::WriteVariable { .. } => NodeKind::WriteVariable,
            Operation::ReadProperty { .. } => NodeKind::ReadProperty,
            Operation::WriteProperty { .. } => NodeKind::WriteProperty,
            Operation::NewObject { .. } => NodeKind::NewObject,
            Operation::Call { .. } => NodeKind::Call,
            Operation::BinaryOperator { .. } => NodeKind::BinaryOperator,
            Operation::ForeignMarker { .. } => NodeKind::ForeignMarker,
            Operation::Nop => NodeKind::Nop,
        }
    }

    /// The register this operation writes, if any.
    pub fn result(&self) -> Option<Register> {
        match *self {
            Operation::Constant { result, .. }
            | Operation::ReadVariable { result, .. }
            | Operation::NewObject { result }
            | Operation::BinaryOperator { result, .. } => Some(result),
            Operation::ReadProperty { result, .. } | Operation::Call { result, .. } => result,
            Operation::WriteVariable { .. }
            | Operation::WriteProperty { .. }
            | Operation::ForeignMarker { .. }
            | Operation::Nop => None,
        }
    }
}

fn registers(registers: &[Register]) -> String {
    registers
        .iter()
        .map(|register| format!("v{}", register))
        .collect::<Vec<String>>()
        .join(", ")
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Constant { result, value } => write!(f, "v{} = {}", result, value),
            Operation::ReadVariable { result, name } => write!(f, "v{} = {}", result, name),
            Operation::WriteVariable { name, value } => write!(f, "{} = v{}", name, value),
            Operation::ReadProperty {
                result,
                base,
                property,
            } => match result {
                Some(result) => write!(f, "v{} = v{}{}", result, base, property),
                None => write!(f, "v{}{}", base, property),
            },
            Operation::WriteProperty {
                base,
                property,
                value,
            } => write!(f, "v{}{} = v{}", base, property, value),
            Operation::NewObject { result } => write!(f, "v{} = {{}}", result),
            Operation::Call {
                result,
                base,
                property,
                function,
                arguments,
                constructor,
            } => {
                if let Some(result) = result {
                    write!(f, "v{} = ", result)?;
                }
                if *constructor {
                    write!(f, "new ")?;
                }
                match (base, property, function) {
                    (Some(base), Some(property), _) => write!(f, "v{}.{}", base, property)?,
                    (_, _, Some(function)) => write!(f, "v{}", function)?,
                    _ => write!(f, "?")?,
                }
                write!(f, "({})", registers(arguments))
            }
            Operation::BinaryOperator {
                result,
                op,
                lhs,
                rhs,
            } => write!(f, "v{} = v{} {} v{}", result, lhs, op, rhs),
            Operation::ForeignMarker { definition_site } => {
                write!(f, "foreign-marker {}", definition_site)
            }
            Operation::Nop => write!(f, "nop"),
        }
    }
}

/// A node of the flow graph.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Node {
    index: usize,
    block: usize,
    operation: Operation,
}

impl Node {
    pub(crate) fn new(index: usize, block: usize, operation: Operation) -> Node {
        Node {
            index,
            block,
            operation,
        }
    }

    /// The index of this node, unique in its flow graph.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The index of the block holding this node.
    pub fn block(&self) -> usize {
        self.block
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn kind(&self) -> NodeKind {
        self.operation.kind()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:03} {}", self.index, self.operation)
    }
}

#[test]
fn operation_display() {
    assert_eq!(
        Operation::method_call(Some(3), 1, "type", vec![2]).to_string(),
        "v3 = v1.type(v2)"
    );
    assert_eq!(Operation::construct(4, 3, vec![]).to_string(), "v4 = new v3()");
    assert_eq!(
        Operation::read_property(None, 1, "type").to_string(),
        "v1.type"
    );
    assert_eq!(
        Operation::constant(0, Constant::String("a\"b".to_string())).to_string(),
        "v0 = \"a\\\"b\""
    );
    assert_eq!(Operation::foreign_marker(7).kind(), NodeKind::ForeignMarker);
    assert_eq!(Operation::read_variable(0, "x").result(), Some(0));
    assert_eq!(Operation::write_variable("x", 0).result(), None);
}
