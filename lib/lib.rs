//! Polyflow: the abstract-interpretation core of a whole-program analyzer for
//! JavaScript, with a boundary for values that originate from a foreign host
//! language.
//!
//! Polyflow is organized around a handful of components:
//!
//! * `lattice` - the abstract heap. `ObjectLabel` names abstract objects,
//! `Obj` holds their properties under a copy-on-write discipline, and
//! `PartitionToken` splits joined values back into precise partitions.
//! * `flowgraph` - the flow graph the analysis runs over. Building a flow
//! graph from source text is left to a front end.
//! * `analysis` - the abstract `State`, the per-node transfer function
//! `Dispatcher`, and a worklist driver.
//! * `bridge` - the `ForeignBridge` through which foreign classes are queried.
//!
//! # Foreign values
//!
//! Source code reaches the foreign language through a root identifier
//! (`Java` by default). `Java.type("com.example.Foo")` produces a type token
//! for a foreign class, `new Foo()` produces a foreign object, and property
//! reads, writes and method calls on those values are answered by the
//! `ForeignBridge` instead of the JavaScript semantics.
//!
//! ```
//! use polyflow::analysis::transfer::{foreign, Dispatcher};
//!
//! let dispatcher = Dispatcher::new().with_layer(foreign::layer());
//! assert!(dispatcher.is_overridden(polyflow::flowgraph::NodeKind::Call));
//! ```

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

use thiserror::Error;

pub mod analysis;
pub mod bridge;
pub mod flowgraph;
pub mod graph;
pub mod lattice;
pub mod options;
#[cfg(test)]
mod tests;

pub use options::{Options, OptionsBuilder};

/// A flow-graph block paired with the context it was analyzed under.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockAndContext {
    pub block: usize,
    pub context: lattice::Context,
}

impl std::fmt::Display for BlockAndContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "block {} in context {}", self.block, self.context)
    }
}

fn location_suffix(location: &Option<BlockAndContext>) -> String {
    match location {
        Some(location) => format!(" at {}", location),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Analysis error: {0}")]
    Analysis(String),
    #[error("Cross-language analysis error: {message}{}", location_suffix(.location))]
    CrossLanguage {
        message: String,
        run: Option<u64>,
        location: Option<BlockAndContext>,
    },
    #[error("{0}")]
    Custom(String),
    #[error("Flow graph block {0} not found")]
    FlowGraphBlockNotFound(usize),
    #[error("Flow graph node {0} not found")]
    FlowGraphNodeNotFound(usize),
    #[error("Graph vertex {0} not found")]
    GraphVertexNotFound(usize),
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a cross-language error. The driver fills in the run and the
    /// location when the error reaches it.
    pub fn cross_language<S: Into<String>>(message: S) -> Error {
        Error::CrossLanguage {
            message: message.into(),
            run: None,
            location: None,
        }
    }

    /// Attach the run and the (block, context) location to a cross-language
    /// error. Information the error already carries is kept. Other errors are
    /// returned unchanged.
    pub fn at(self, run: u64, at: BlockAndContext) -> Error {
        match self {
            Error::CrossLanguage {
                message,
                run: error_run,
                location,
            } => Error::CrossLanguage {
                message,
                run: error_run.or(Some(run)),
                location: location.or(Some(at)),
            },
            e => e,
        }
    }

    /// Returns true if this error means the analysis itself is broken, and the
    /// run must be aborted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::CrossLanguage { .. })
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
