//! Options which change the behavior of an analysis run.

use serde::{Deserialize, Serialize};
use std::default;

/// Various options that can be passed to an analysis. Options will change the
/// behavior of the heap model and of the foreign-object transfer functions.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Options {
    copy_on_write_disabled: bool,
    foreign_root_name: String,
    type_constructor_name: String,
    max_iterations: usize,
    continue_on_cross_language_error: bool,
}

impl default::Default for Options {
    fn default() -> Options {
        Options {
            copy_on_write_disabled: false,
            foreign_root_name: "Java".to_string(),
            type_constructor_name: "type".to_string(),
            max_iterations: 100_000,
            continue_on_cross_language_error: false,
        }
    }
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// Whether copying an `Obj` deep-copies its property map instead of
    /// sharing it until one side writes.
    ///
    /// Sharing is almost always what you want. Disabling it is useful when
    /// hunting aliasing bugs in the heap model.
    pub fn copy_on_write_disabled(&self) -> bool {
        self.copy_on_write_disabled
    }

    /// Set the value of the, "Copy on write disabled," option.
    pub fn set_copy_on_write_disabled(&mut self, copy_on_write_disabled: bool) {
        self.copy_on_write_disabled = copy_on_write_disabled;
    }

    /// The identifier under which the foreign namespace is reachable from
    /// analyzed code.
    pub fn foreign_root_name(&self) -> &str {
        &self.foreign_root_name
    }

    /// The member of the foreign namespace which turns a class name into a
    /// type token.
    pub fn type_constructor_name(&self) -> &str {
        &self.type_constructor_name
    }

    /// Upper bound on the number of (block, context) pairs the worklist
    /// driver will process.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Whether the worklist driver keeps going after a cross-language error.
    ///
    /// When set, the error is recorded as an unsound point of the run and
    /// nothing is propagated out of the offending block. Otherwise the run is
    /// aborted with the error.
    pub fn continue_on_cross_language_error(&self) -> bool {
        self.continue_on_cross_language_error
    }

    /// Render these options as JSON.
    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Read options from JSON.
    pub fn from_json(json: &str) -> Result<Options, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Create your options with the builder pattern.
///
/// For more details on the options, see `Options`
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder for analysis options.
    pub fn new() -> OptionsBuilder {
        OptionsBuilder {
            options: Options::default(),
        }
    }

    /// Set the, "Copy on write disabled," option. By default this is false.
    pub fn copy_on_write_disabled(mut self, copy_on_write_disabled: bool) -> OptionsBuilder {
        self.options.copy_on_write_disabled = copy_on_write_disabled;
        self
    }

    /// Set the foreign root identifier. By default this is `Java`.
    pub fn foreign_root_name<S: Into<String>>(mut self, foreign_root_name: S) -> OptionsBuilder {
        self.options.foreign_root_name = foreign_root_name.into();
        self
    }

    /// Set the type constructor member name. By default this is `type`.
    pub fn type_constructor_name<S: Into<String>>(
        mut self,
        type_constructor_name: S,
    ) -> OptionsBuilder {
        self.options.type_constructor_name = type_constructor_name.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> OptionsBuilder {
        self.options.max_iterations = max_iterations;
        self
    }

    /// Set the, "Continue on cross language error," option. By default this
    /// is false.
    pub fn continue_on_cross_language_error(mut self, continue_on: bool) -> OptionsBuilder {
        self.options.continue_on_cross_language_error = continue_on;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

impl default::Default for OptionsBuilder {
    fn default() -> OptionsBuilder {
        OptionsBuilder::new()
    }
}

#[test]
fn options_json() {
    let options = OptionsBuilder::new()
        .foreign_root_name("Packages")
        .max_iterations(10)
        .build();
    let json = options.to_json().unwrap();
    let options2 = Options::from_json(&json).unwrap();
    assert_eq!(options2.foreign_root_name(), "Packages");
    assert_eq!(options2.type_constructor_name(), "type");
    assert_eq!(options2.max_iterations(), 10);
}
