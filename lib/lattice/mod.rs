//! The abstract heap.
//!
//! * `ObjectLabel` names one abstract heap object, and carries its `Kind`.
//! * `Obj` holds the properties of an abstract object. `Obj` instances share
//! their property maps copy-on-write, and are frozen before being aliased.
//! * `Value` is the lattice element stored in object properties and registers.
//! * `PartitionToken` discriminates the partitions of a `Value` split at a
//! join point.
//! * `Canonicalizer` owns the intern tables for labels and tokens, and the
//! shared `Obj` templates. It is reset between analysis runs.

mod canonicalizer;
mod context;
mod obj;
mod object_label;
mod object_property;
mod partition_token;
mod pkey;
mod renamings;
mod resolver;
mod scope_chain;
mod value;

pub use self::canonicalizer::Canonicalizer;
pub use self::context::Context;
pub use self::obj::Obj;
pub use self::object_label::{Kind, LabelTable, ObjectLabel};
pub use self::object_property::{ObjectProperty, PropertyKind};
pub use self::partition_token::{PartitionToken, TokenKey, TokenTable, TypeTag};
pub use self::pkey::PKey;
pub use self::renamings::Renamings;
pub use self::resolver::{LocalResolver, Resolver};
pub use self::scope_chain::ScopeChain;
pub use self::value::{Flags, Foreign, Value};
