//! Maximum-throughput flow LP.
//!
//! DISPATCH consumes a target flow rate per route and direction. The flow
//! comes from a linear program over route flow variables, subject to
//! crusher and shovel service-rate caps, per-road flow conservation, and
//! a truck-inventory balance bounding the fleet the flows would need.
//!
//! Solving is delegated to an external MILP solver through the
//! [`Solver`] contract; the model itself serialises to the lp_solve
//! textual format so a failed solve can be inspected offline.
//!
//! # References
//!
//! - White, Arnold & Clevenger (1982), "Automated open-pit truck
//!   dispatching at Tyrone"
//! - Li (1990), "A methodology for the optimum control of shovel and
//!   truck operations in open-pit mining"

mod flow;
mod model;
mod solver;

pub use flow::{FlowPlanner, OneLanePolicy};
pub use model::{LpModel, RowOp};
pub use solver::{ExternalSolver, Solver};
