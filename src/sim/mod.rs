//! Discrete-event simulation kernel.
//!
//! Trucks are modelled as a timed automaton: each truck sits in one
//! [`TruckState`] while holding a scheduled [`Transition`] to the next.
//! Two queues drive a run: timed transitions in an event queue, and
//! zero-duration logical steps (queue handoffs, dispatch decisions) in an
//! instant queue that always drains before the clock advances.
//!
//! Two kernels share this machinery:
//!
//! - [`SimpleSimulator`]: single crusher, one two-lane road per shovel;
//! - [`NetworkSimulator`]: routed networks with traffic-light arbitration
//!   on one-lane roads.
//!
//! Anti-overtaking holds on every road: a truck's arrival is pushed back
//! to the latest arrival already scheduled in its direction, so trucks
//! complete in entry order regardless of sampled speeds.
//!
//! [`forecast`] adds state-restartable variants used as fitness functions
//! and by look-ahead controllers.

mod event;
pub mod forecast;
mod network;
mod simple;

pub use event::{EventQueue, StateChange, TrafficLight, Transition, TruckState};
pub use network::NetworkSimulator;
pub use simple::SimpleSimulator;

/// Travel-time multiplier for loaded trucks on simple networks (routed
/// networks carry their own factor in the input file).
pub const FULL_SLOWDOWN: f64 = 1.2;
