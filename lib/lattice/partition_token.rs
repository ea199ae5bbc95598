//! Tokens which keep the partitions of a joined `Value` apart.
//!
//! A token records why a value was split, and at which node. Tokens are
//! interned through a `TokenTable`, and compare in one of two modes:
//!
//! * While canonicalizing, the table compares `TokenKey`s structurally to find
//! or create the canonical instance.
//! * Once canonical, `PartitionToken` compares by identity.
//!
//! The two modes always agree for tokens of the same run, because a table
//! never hands out two instances for one key.

use crate::lattice::{Context, Kind, PKey};
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Coarse runtime types used by type partitioning.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Undef,
    Null,
    ObjObject,
    ObjFunction,
    ObjSymbol,
    ObjArray,
    ObjRegExp,
    ObjDate,
    ObjString,
    ObjNumber,
    ObjBoolean,
    ObjError,
    ObjMath,
    ObjActivation,
    ObjArguments,
    ObjForeignObject,
    ObjForeignType,
}

impl TypeTag {
    /// The type tag of objects of the given kind.
    pub fn of_kind(kind: Kind) -> TypeTag {
        match kind {
            Kind::Object => TypeTag::ObjObject,
            Kind::Function => TypeTag::ObjFunction,
            Kind::Array => TypeTag::ObjArray,
            Kind::Symbol => TypeTag::ObjSymbol,
            Kind::String => TypeTag::ObjString,
            Kind::Number => TypeTag::ObjNumber,
            Kind::Boolean => TypeTag::ObjBoolean,
            Kind::Date => TypeTag::ObjDate,
            Kind::RegExp => TypeTag::ObjRegExp,
            Kind::Error => TypeTag::ObjError,
            Kind::Math => TypeTag::ObjMath,
            Kind::Activation => TypeTag::ObjActivation,
            Kind::Arguments => TypeTag::ObjArguments,
            Kind::ForeignObject => TypeTag::ObjForeignObject,
            Kind::ForeignTypeToken | Kind::ForeignRoot => TypeTag::ObjForeignType,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::String => "String",
            TypeTag::Number => "Number",
            TypeTag::Boolean => "Boolean",
            TypeTag::Undef => "Undef",
            TypeTag::Null => "Null",
            TypeTag::ObjObject => "OBJ_Object",
            TypeTag::ObjFunction => "OBJ_Function",
            TypeTag::ObjSymbol => "OBJ_Symbol",
            TypeTag::ObjArray => "OBJ_Array",
            TypeTag::ObjRegExp => "OBJ_RegExp",
            TypeTag::ObjDate => "OBJ_Date",
            TypeTag::ObjString => "OBJ_String",
            TypeTag::ObjNumber => "OBJ_Number",
            TypeTag::ObjBoolean => "OBJ_Boolean",
            TypeTag::ObjError => "OBJ_Error",
            TypeTag::ObjMath => "OBJ_Math",
            TypeTag::ObjActivation => "OBJ_activation",
            TypeTag::ObjArguments => "OBJ_arguments",
            TypeTag::ObjForeignObject => "OBJ_Object_Foreign",
            TypeTag::ObjForeignType => "OBJ_Type_Foreign",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The structural key of a partition token.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum TokenKey {
    /// Values read through different property names at `node`.
    PropertyName { node: usize, property: PKey },
    /// Values of different types at `node`.
    Type { node: usize, tag: TypeTag },
    /// Results of the call at `node` under `context`. A nested token of
    /// `None` stands for any token.
    Function {
        node: usize,
        context: Context,
        nested: Option<PartitionToken>,
    },
}

impl TokenKey {
    /// The node where the partitioning is introduced.
    pub fn node(&self) -> usize {
        match *self {
            TokenKey::PropertyName { node, .. }
            | TokenKey::Type { node, .. }
            | TokenKey::Function { node, .. } => node,
        }
    }

    fn structural_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Serialize)]
struct TokenData {
    #[serde(skip)]
    serial: usize,
    #[serde(skip)]
    run: u64,
    #[serde(skip)]
    hash: u64,
    key: TokenKey,
}

/// An interned partition token.
#[derive(Clone, Debug, Serialize)]
pub struct PartitionToken(Rc<TokenData>);

impl PartitionToken {
    pub fn key(&self) -> &TokenKey {
        &self.0.key
    }

    /// The node where the partitioning is introduced.
    pub fn node(&self) -> usize {
        self.0.key.node()
    }

    /// Returns true if this is a function token whose nested token is ANY.
    pub fn is_any(&self) -> bool {
        matches!(self.0.key, TokenKey::Function { nested: None, .. })
    }

    /// Compare the structural keys of two tokens, regardless of whether they
    /// are canonical.
    pub fn structurally_equal(&self, other: &PartitionToken) -> bool {
        self.0.hash == other.0.hash && self.0.key == other.0.key
    }
}

impl PartialEq for PartitionToken {
    fn eq(&self, other: &PartitionToken) -> bool {
        let identical = Rc::ptr_eq(&self.0, &other.0);
        debug_assert!(
            identical || self.0.run != other.0.run || !self.structurally_equal(other),
            "two canonical partition tokens share the key {:?}",
            self.0.key
        );
        identical
    }
}

impl Eq for PartitionToken {}

impl Hash for PartitionToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl PartialOrd for PartitionToken {
    fn partial_cmp(&self, other: &PartitionToken) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tokens order by creation. This order only exists so tokens can key sorted
/// maps, and carries no meaning.
impl Ord for PartitionToken {
    fn cmp(&self, other: &PartitionToken) -> Ordering {
        self.0
            .run
            .cmp(&other.0.run)
            .then(self.0.serial.cmp(&other.0.serial))
    }
}

impl fmt::Display for PartitionToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.key {
            TokenKey::PropertyName { node, ref property } => {
                write!(f, "PROP(node={},prop={})", node, property)
            }
            TokenKey::Type { node, tag } => write!(f, "TYPE(node={},type={})", node, tag),
            TokenKey::Function {
                node,
                ref context,
                ref nested,
            } => match nested {
                Some(nested) => write!(f, "FUN(node={},context={},token={})", node, context, nested),
                None => write!(f, "FUN(node={},context={},token=ANY)", node, context),
            },
        }
    }
}

/// Canonicalization table for `PartitionToken`.
#[derive(Debug, Default)]
pub struct TokenTable {
    run: u64,
    tokens: FxHashMap<TokenKey, PartitionToken>,
}

impl TokenTable {
    pub fn new(run: u64) -> TokenTable {
        TokenTable {
            run,
            tokens: FxHashMap::default(),
        }
    }

    /// Returns the canonical token for the given key, creating it if this is
    /// the first request for the key.
    pub fn make(&mut self, key: TokenKey) -> PartitionToken {
        if let Some(token) = self.tokens.get(&key) {
            return token.clone();
        }
        let token = PartitionToken(Rc::new(TokenData {
            serial: self.tokens.len(),
            run: self.run,
            hash: key.structural_hash(),
            key: key.clone(),
        }));
        self.tokens.insert(key, token.clone());
        token
    }

    pub fn make_property_name(&mut self, node: usize, property: PKey) -> PartitionToken {
        self.make(TokenKey::PropertyName { node, property })
    }

    pub fn make_type(&mut self, node: usize, tag: TypeTag) -> PartitionToken {
        self.make(TokenKey::Type { node, tag })
    }

    pub fn make_function(
        &mut self,
        node: usize,
        context: Context,
        nested: Option<PartitionToken>,
    ) -> PartitionToken {
        self.make(TokenKey::Function {
            node,
            context,
            nested,
        })
    }

    /// The function token matching every partition at `node` under `context`.
    pub fn make_any_function(&mut self, node: usize, context: Context) -> PartitionToken {
        self.make_function(node, context, None)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
