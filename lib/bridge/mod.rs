//! The boundary to the foreign language.
//!
//! The analysis never models foreign classes itself. Whenever a transfer
//! function meets a foreign type token or a foreign object, it asks a
//! `ForeignBridge` instead. Failures to resolve a class or member are
//! reported as `Error::CrossLanguage`.

mod table;

pub use self::table::{ClassDescription, Query, TableBridge};

use crate::lattice::Value;
use crate::Error;

/// Answers questions about foreign classes.
///
/// Labels in returned values need not come from the analysis run's
/// `Canonicalizer`. They are interned by the caller.
pub trait ForeignBridge {
    /// The values the property `property` of class `class` may hold.
    fn query_property_value(&mut self, class: &str, property: &str) -> Result<Value, Error>;

    /// The value of an unapplied reference to the method `function` of class
    /// `class`.
    fn query_function_value(&mut self, class: &str, function: &str) -> Result<Value, Error>;

    /// The result of calling `function` on `receiver`. An absent value means
    /// the call has no definable effect.
    fn call_function(
        &mut self,
        receiver: &Value,
        function: &str,
        arguments: &[Value],
    ) -> Result<Value, Error>;

    /// Record a write of `property` on `receiver` on the foreign side.
    fn set_property(&mut self, receiver: &Value, property: &str, value: &Value)
        -> Result<(), Error>;

    /// A fresh instance of `class`, allocated at node `site`.
    fn new_object(&mut self, site: usize, class: &str) -> Result<Value, Error>;

    /// Let the foreign side continue a suspended analysis with `code`.
    fn resume(&mut self, code: &str) -> Result<(), Error>;
}
