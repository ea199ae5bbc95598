//! Abstract interpretation over a `FlowGraph`.

pub mod fixed_point;
mod monitor;
mod state;
pub mod transfer;

pub use self::monitor::{Monitor, NullMonitor};
pub use self::state::{State, GLOBAL_OBJECT_NODE};

use crate::lattice::Context;
use crate::Error;

/// Receives the states flowing into basic blocks.
///
/// The fixed-point driver implements this to merge states into its worklist.
/// Transfer functions which take over propagation from the driver push their
/// states here directly.
pub trait Propagator {
    /// Merge `state` into the state flowing into `block` under `context`.
    fn propagate_to_basic_block(
        &mut self,
        state: State,
        block: usize,
        context: &Context,
    ) -> Result<(), Error>;
}
