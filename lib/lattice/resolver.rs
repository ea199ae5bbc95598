use crate::lattice::{ObjectProperty, ScopeChain, Value};
use crate::Error;

/// Recovers the parts of an abstract object which are still unknown after a
/// function return, by consulting the object as it was at the call site.
pub trait Resolver {
    /// Resolve `value`, the content of `property` in the object being
    /// localized, against `template`, the content of the same slot at the
    /// call site.
    fn localize(
        &self,
        value: &Value,
        template: &Value,
        property: &ObjectProperty,
    ) -> Result<Value, Error>;

    /// Resolve the scope chain of the object being localized. `None` in
    /// `template` means the call-site object has no scope chain.
    fn localize_scope_chain(
        &self,
        scope: Option<&ScopeChain>,
        scope_unknown: bool,
        template: Option<&ScopeChain>,
    ) -> Result<Option<ScopeChain>, Error>;
}

/// The resolver used inside one function: an unknown slot takes the value of
/// the template, everything else is kept.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalResolver;

impl Resolver for LocalResolver {
    fn localize(
        &self,
        value: &Value,
        template: &Value,
        _property: &ObjectProperty,
    ) -> Result<Value, Error> {
        if value.is_unknown() {
            Ok(template.clone())
        } else {
            Ok(value.clone())
        }
    }

    fn localize_scope_chain(
        &self,
        scope: Option<&ScopeChain>,
        scope_unknown: bool,
        template: Option<&ScopeChain>,
    ) -> Result<Option<ScopeChain>, Error> {
        if scope_unknown {
            Ok(template.cloned())
        } else {
            Ok(scope.cloned())
        }
    }
}
