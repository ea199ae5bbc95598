use serde::{Deserialize, Serialize};

/// A function of the analyzed program.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Function {
    index: usize,
    name: Option<String>,
    parameters: Vec<String>,
    variables: Vec<String>,
    entry: usize,
}

impl Function {
    pub(crate) fn new(
        index: usize,
        name: Option<String>,
        parameters: Vec<String>,
        variables: Vec<String>,
        entry: usize,
    ) -> Function {
        Function {
            index,
            name,
            parameters,
            variables,
            entry,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The name of this function. The program body is named `<main>`.
    pub fn name(&self) -> String {
        match self.name {
            Some(ref name) => name.to_string(),
            None => "<main>".to_string(),
        }
    }

    /// Returns true if this is the program body.
    pub fn is_main(&self) -> bool {
        self.name.is_none()
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// The position of `name` in the parameter list.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|parameter| parameter == name)
    }

    /// The variables declared in this function, excluding parameters.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Returns true if `name` is a parameter or a declared variable.
    pub fn declares(&self, name: &str) -> bool {
        self.parameter_index(name).is_some() || self.variables.iter().any(|v| v == name)
    }

    /// The index of the entry block.
    pub fn entry(&self) -> usize {
        self.entry
    }
}
