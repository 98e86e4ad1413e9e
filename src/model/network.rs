//! Network entity types.

use serde::{Deserialize, Serialize};

use crate::error::HaulageError;

/// A mean / standard-deviation pair describing a stochastic duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanSd {
    /// Mean duration.
    pub mean: f64,
    /// Standard deviation of the duration.
    pub sd: f64,
}

impl MeanSd {
    /// Creates a mean / standard-deviation pair.
    pub fn new(mean: f64, sd: f64) -> Self {
        Self { mean, sd }
    }
}

/// Arbitration kind of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadKind {
    /// Both directions may be used concurrently.
    TwoLane,
    /// A two-sided traffic light restricts travel to one direction at a
    /// time.
    OneLane,
}

/// A road segment between two points of the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Road {
    /// One-way travel duration.
    pub travel: MeanSd,
    /// Lane arbitration kind.
    pub kind: RoadKind,
}

impl Road {
    /// Whether the road is one-lane (traffic-light arbitrated).
    pub fn is_one_lane(&self) -> bool {
        self.kind == RoadKind::OneLane
    }
}

/// An ordered sequence of (road, direction) pairs from one crusher to one
/// shovel.
///
/// The stored order is the empty (crusher-to-shovel) direction; a loaded
/// return trip traverses the same roads in reverse with directions
/// flipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Road indices in traversal order.
    pub roads: Vec<usize>,
    /// Direction travelled on each road (0 or 1), parallel to `roads`.
    pub directions: Vec<usize>,
    /// Crusher the route leaves.
    pub crusher: usize,
    /// Shovel the route enters.
    pub shovel: usize,
}

impl Route {
    /// Number of roads in the route.
    pub fn len(&self) -> usize {
        self.roads.len()
    }

    /// Whether the route has no roads.
    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }
}

/// A shovel in a simple network: one dedicated two-lane road from the
/// crusher, plus the shovel's service time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleShovel {
    /// Travel duration between the crusher and this shovel (one way,
    /// empty).
    pub travel: MeanSd,
    /// Filling duration at this shovel.
    pub fill: MeanSd,
}

/// A single-crusher network where each shovel is reached by its own
/// two-lane road.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleNetwork {
    /// Fleet size.
    pub num_trucks: usize,
    /// Emptying duration at the crusher.
    pub empty: MeanSd,
    /// Shovels, each with its access road.
    pub shovels: Vec<SimpleShovel>,
}

impl SimpleNetwork {
    /// Number of shovels.
    pub fn num_shovels(&self) -> usize {
        self.shovels.len()
    }
}

/// A routed multi-crusher network.
///
/// Roads connect crushers, shovels and intermediate nodes; the set of
/// usable crusher-to-shovel routes is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Fleet size.
    pub num_trucks: usize,
    /// Travel-time multiplier applied to loaded (return) trips.
    pub full_slowdown: f64,
    /// Emptying duration per crusher.
    pub crushers: Vec<MeanSd>,
    /// Filling duration per shovel.
    pub shovels: Vec<MeanSd>,
    /// Road segments.
    pub roads: Vec<Road>,
    /// Enumerated crusher-to-shovel routes.
    pub routes: Vec<Route>,
    routes_from_crusher: Vec<Vec<usize>>,
    routes_from_shovel: Vec<Vec<usize>>,
}

impl Network {
    /// Assembles a network from its parts, indexing routes by endpoint.
    ///
    /// Fails if any route claims an out-of-range endpoint or if some
    /// crusher has no route out of it (trucks parked there could never be
    /// dispatched).
    pub fn new(
        num_trucks: usize,
        full_slowdown: f64,
        crushers: Vec<MeanSd>,
        shovels: Vec<MeanSd>,
        roads: Vec<Road>,
        routes: Vec<Route>,
    ) -> Result<Self, HaulageError> {
        let mut routes_from_crusher = vec![Vec::new(); crushers.len()];
        let mut routes_from_shovel = vec![Vec::new(); shovels.len()];
        for (r, route) in routes.iter().enumerate() {
            if route.crusher >= crushers.len() || route.shovel >= shovels.len() {
                return Err(HaulageError::config(format!(
                    "route {r} references crusher {} / shovel {} outside the network",
                    route.crusher, route.shovel
                )));
            }
            if route.is_empty() || route.roads.len() != route.directions.len() {
                return Err(HaulageError::config(format!("route {r} is malformed")));
            }
            routes_from_crusher[route.crusher].push(r);
            routes_from_shovel[route.shovel].push(r);
        }
        for (c, out) in routes_from_crusher.iter().enumerate() {
            if out.is_empty() {
                return Err(HaulageError::config(format!("no routes out of crusher {c}")));
            }
        }
        Ok(Self {
            num_trucks,
            full_slowdown,
            crushers,
            shovels,
            roads,
            routes,
            routes_from_crusher,
            routes_from_shovel,
        })
    }

    /// Number of crushers.
    pub fn num_crushers(&self) -> usize {
        self.crushers.len()
    }

    /// Number of shovels.
    pub fn num_shovels(&self) -> usize {
        self.shovels.len()
    }

    /// Number of roads.
    pub fn num_roads(&self) -> usize {
        self.roads.len()
    }

    /// Number of routes.
    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    /// Routes leaving the given crusher.
    pub fn routes_from_crusher(&self, crusher: usize) -> &[usize] {
        &self.routes_from_crusher[crusher]
    }

    /// Routes leaving the given shovel (in the return direction).
    pub fn routes_from_shovel(&self, shovel: usize) -> &[usize] {
        &self.routes_from_shovel[shovel]
    }

    /// For every road, the routes that traverse it together with the
    /// direction used.
    pub fn routes_on_roads(&self) -> Vec<Vec<(usize, usize)>> {
        let mut on_road = vec![Vec::new(); self.roads.len()];
        for (r, route) in self.routes.iter().enumerate() {
            for (&road, &dir) in route.roads.iter().zip(&route.directions) {
                on_road[road].push((r, dir));
            }
        }
        on_road
    }

    /// For each road, the combined service rate of all shovels it can
    /// supply (`Σ 1/fill_mean` over shovels reachable via the road).
    ///
    /// Used as a saturation estimate when scaling one-lane travel times.
    pub fn road_saturation(&self) -> Vec<f64> {
        let mut supplies = vec![vec![false; self.shovels.len()]; self.roads.len()];
        for route in &self.routes {
            for &road in &route.roads {
                supplies[road][route.shovel] = true;
            }
        }
        supplies
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.shovels)
                    .filter(|(reachable, _)| **reachable)
                    .map(|(_, fill)| 1.0 / fill.mean)
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_route_net() -> Network {
        Network::new(
            4,
            1.2,
            vec![MeanSd::new(1.0, 0.0)],
            vec![MeanSd::new(2.0, 0.0), MeanSd::new(3.0, 0.0)],
            vec![
                Road {
                    travel: MeanSd::new(5.0, 0.0),
                    kind: RoadKind::TwoLane,
                },
                Road {
                    travel: MeanSd::new(7.0, 0.0),
                    kind: RoadKind::OneLane,
                },
            ],
            vec![
                Route {
                    roads: vec![0],
                    directions: vec![0],
                    crusher: 0,
                    shovel: 0,
                },
                Route {
                    roads: vec![1],
                    directions: vec![0],
                    crusher: 0,
                    shovel: 1,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_route_indexing() {
        let net = two_route_net();
        assert_eq!(net.routes_from_crusher(0), &[0, 1]);
        assert_eq!(net.routes_from_shovel(0), &[0]);
        assert_eq!(net.routes_from_shovel(1), &[1]);
        let on_roads = net.routes_on_roads();
        assert_eq!(on_roads[0], vec![(0, 0)]);
        assert_eq!(on_roads[1], vec![(1, 0)]);
    }

    #[test]
    fn test_road_saturation() {
        let net = two_route_net();
        let sat = net.road_saturation();
        assert!((sat[0] - 0.5).abs() < 1e-12);
        assert!((sat[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_crusher_without_routes() {
        let err = Network::new(
            1,
            1.2,
            vec![MeanSd::new(1.0, 0.0), MeanSd::new(1.0, 0.0)],
            vec![MeanSd::new(2.0, 0.0)],
            vec![Road {
                travel: MeanSd::new(5.0, 0.0),
                kind: RoadKind::TwoLane,
            }],
            vec![Route {
                roads: vec![0],
                directions: vec![0],
                crusher: 0,
                shovel: 0,
            }],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_out_of_range_route() {
        let err = Network::new(
            1,
            1.2,
            vec![MeanSd::new(1.0, 0.0)],
            vec![MeanSd::new(2.0, 0.0)],
            vec![Road {
                travel: MeanSd::new(5.0, 0.0),
                kind: RoadKind::TwoLane,
            }],
            vec![Route {
                roads: vec![0],
                directions: vec![0],
                crusher: 0,
                shovel: 3,
            }],
        );
        assert!(err.is_err());
    }
}
