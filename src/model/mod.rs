//! Network model: the immutable structural description of a mine.
//!
//! Two network shapes are supported:
//!
//! - [`SimpleNetwork`]: one crusher, one dedicated two-lane road per
//!   shovel. Routing decisions are shovel indices.
//! - [`Network`]: multiple crushers and shovels connected by a road graph
//!   with two-lane and one-lane segments. Routing decisions are indices
//!   into a precomputed set of crusher-to-shovel [`Route`]s.
//!
//! Routes are enumerated once at construction by a depth-first search over
//! the road graph ([`routes`]); everything here is immutable for the life
//! of a shift.

mod network;
mod parser;
mod routes;

pub use network::{MeanSd, Network, Road, RoadKind, Route, SimpleNetwork, SimpleShovel};
pub use parser::{parse_file, write_network, write_simple, ParsedNetwork};
pub use routes::enumerate_routes;
