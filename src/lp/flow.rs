//! Flow LP construction.

use std::sync::Arc;

use log::info;

use super::model::{LpModel, RowOp};
use super::solver::Solver;
use crate::error::SolverError;
use crate::model::Network;

/// Lexicographic weight making throughput dominate truck usage in the
/// objective; doubles as the big-M constant of the restrict variant.
const LARGE: f64 = 1000.0;

/// How one-lane roads are handled in the flow model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneLanePolicy {
    /// Restrict each one-lane road to a single chosen direction
    /// (binary decision per road, big-M coupled). Guarantees no light
    /// waiting at the cost of route variety.
    Restrict,
    /// Allow both directions, inflating one-lane travel times by a
    /// saturation-based congestion estimate instead.
    Scale,
}

/// Builds the maximum-throughput flow LP for a network and extracts the
/// per-route flow rates from its solution.
pub struct FlowPlanner {
    net: Arc<Network>,
    policy: OneLanePolicy,
}

impl FlowPlanner {
    pub fn new(net: Arc<Network>, policy: OneLanePolicy) -> Self {
        Self { net, policy }
    }

    /// Mean traversal time of every route in both directions, with
    /// one-lane roads inflated by the congestion estimate when the given
    /// policy does not restrict them.
    ///
    /// Column 0 is the empty (outbound) direction, column 1 the loaded
    /// return with the full-truck slowdown applied.
    pub fn route_mean_times(net: &Network, policy: OneLanePolicy) -> Vec<[f64; 2]> {
        let saturation = net.road_saturation();
        net.routes
            .iter()
            .map(|route| {
                let mut time = 0.0;
                for &road in &route.roads {
                    let mean = net.roads[road].travel.mean;
                    let scale = if policy == OneLanePolicy::Scale && net.roads[road].is_one_lane() {
                        congestion_scale(saturation[road], mean)
                    } else {
                        1.0
                    };
                    time += mean * scale;
                }
                [time, time * net.full_slowdown]
            })
            .collect()
    }

    /// Builds the LP. Returns the model and, per route, the column
    /// indices of its two directional flow variables.
    pub fn build_model(&self) -> (LpModel, Vec<[usize; 2]>) {
        let net = &self.net;
        let nc = net.num_crushers();
        let ns = net.num_shovels();
        let nr = net.num_roads();
        let nrt = net.num_routes();
        let mut model = LpModel::new();

        let crusher_cols: Vec<usize> =
            (0..nc).map(|i| model.add_column(format!("C_{i}"))).collect();
        let shovel_cols: Vec<usize> =
            (0..ns).map(|i| model.add_column(format!("S_{i}"))).collect();
        let mut road_cols = Vec::with_capacity(nr);
        for i in 0..nr {
            road_cols.push([
                model.add_column(format!("Rd_{i}_0")),
                model.add_column(format!("Rd_{i}_1")),
            ]);
        }
        let mut route_cols = Vec::with_capacity(nrt);
        for i in 0..nrt {
            route_cols.push([
                model.add_column(format!("Rt_{i}_0")),
                model.add_column(format!("Rt_{i}_1")),
            ]);
        }
        let truck_col = model.add_column("T");
        let direction_cols: Vec<usize> = if self.policy == OneLanePolicy::Restrict {
            (0..nr).map(|i| model.add_column(format!("d_{i}"))).collect()
        } else {
            Vec::new()
        };

        model.set_objective(
            crusher_cols
                .iter()
                .map(|&c| (c, LARGE))
                .chain([(truck_col, -1.0)])
                .collect(),
        );

        // Service caps and throughput/road balance per crusher.
        for cid in 0..nc {
            model.add_row(
                vec![(crusher_cols[cid], 1.0)],
                RowOp::Le,
                1.0 / net.crushers[cid].mean,
            );
            let mut roads_out: Vec<(usize, usize)> = net
                .routes_from_crusher(cid)
                .iter()
                .map(|&r| (net.routes[r].roads[0], net.routes[r].directions[0]))
                .collect();
            roads_out.sort_unstable();
            roads_out.dedup();
            for flip in 0..2 {
                let mut coeffs = vec![(crusher_cols[cid], 1.0)];
                for &(road, dir) in &roads_out {
                    let dir = if flip == 1 { 1 - dir } else { dir };
                    coeffs.push((road_cols[road][dir], -1.0));
                }
                model.add_row(coeffs, RowOp::Eq, 0.0);
            }
        }

        // The same per shovel, using the final leg of each route.
        for sid in 0..ns {
            model.add_row(
                vec![(shovel_cols[sid], 1.0)],
                RowOp::Le,
                1.0 / net.shovels[sid].mean,
            );
            let mut roads_out: Vec<(usize, usize)> = net
                .routes_from_shovel(sid)
                .iter()
                .map(|&r| {
                    let last = net.routes[r].len() - 1;
                    (net.routes[r].roads[last], net.routes[r].directions[last])
                })
                .collect();
            roads_out.sort_unstable();
            roads_out.dedup();
            for flip in 0..2 {
                let mut coeffs = vec![(shovel_cols[sid], 1.0)];
                for &(road, dir) in &roads_out {
                    let dir = if flip == 1 { 1 - dir } else { dir };
                    coeffs.push((road_cols[road][dir], -1.0));
                }
                model.add_row(coeffs, RowOp::Eq, 0.0);
            }
        }

        // Directional road flow equals the sum of route flows over it.
        let on_roads = net.routes_on_roads();
        for road in 0..nr {
            for flow_dir in 0..2 {
                let mut coeffs = vec![(road_cols[road][flow_dir], 1.0)];
                for &(route, traversal_dir) in &on_roads[road] {
                    // A route traversing with the road's direction sends
                    // empty flow one way and loaded flow the other.
                    let column = if traversal_dir == 0 { flow_dir } else { 1 - flow_dir };
                    coeffs.push((route_cols[route][column], -1.0));
                }
                model.add_row(coeffs, RowOp::Eq, 0.0);
            }
        }

        // Truck inventory: time spent serving and hauling the flows
        // equals the fleet the flows tie up.
        let route_times = Self::route_mean_times(net, self.policy);
        let mut coeffs: Vec<(usize, f64)> = Vec::with_capacity(nc + ns + 2 * nrt + 1);
        for cid in 0..nc {
            coeffs.push((crusher_cols[cid], net.crushers[cid].mean));
        }
        for sid in 0..ns {
            coeffs.push((shovel_cols[sid], net.shovels[sid].mean));
        }
        for (route, times) in route_times.iter().enumerate() {
            coeffs.push((route_cols[route][0], times[0]));
            coeffs.push((route_cols[route][1], times[1]));
        }
        coeffs.push((truck_col, -1.0));
        model.add_row(coeffs, RowOp::Eq, 0.0);
        model.add_row(vec![(truck_col, 1.0)], RowOp::Le, net.num_trucks as f64);

        // One direction per one-lane road, big-M coupled to the binary
        // choice.
        if self.policy == OneLanePolicy::Restrict {
            for road in 0..nr {
                if net.roads[road].is_one_lane() {
                    model.add_row(
                        vec![(road_cols[road][0], 1.0), (direction_cols[road], LARGE)],
                        RowOp::Le,
                        LARGE,
                    );
                    model.add_row(
                        vec![(road_cols[road][1], 1.0), (direction_cols[road], -LARGE)],
                        RowOp::Le,
                        0.0,
                    );
                    model.set_binary(direction_cols[road]);
                }
            }
        }

        (model, route_cols)
    }

    /// Solves the flow model and returns the per-route flow rates,
    /// columns 0/1 being the empty and loaded directions.
    ///
    /// Solving is retried up to 1000 times; on persistent failure the
    /// model is written to `<name>.lp` (or `fmodel.lp`) and the last
    /// error returned. The model is also persisted on success when a
    /// name is supplied.
    pub fn flow(
        &self,
        solver: &mut dyn Solver,
        model_name: Option<&str>,
    ) -> Result<Vec<[f64; 2]>, SolverError> {
        let stem = model_name.unwrap_or("fmodel");
        let (model, route_cols) = self.build_model();
        info!(
            "solving flow model: {} columns, {} rows",
            model.num_columns(),
            model.num_rows()
        );
        let mut last_error = None;
        let mut values = None;
        for _ in 0..1000 {
            match solver.solve(&model) {
                Ok(solution) => {
                    values = Some(solution);
                    break;
                }
                Err(err) => last_error = Some(err),
            }
        }
        let values = match values {
            Some(values) => values,
            None => {
                model.write_lp(stem)?;
                return Err(last_error.expect("no solve attempt recorded"));
            }
        };
        if model_name.is_some() {
            model.write_lp(stem)?;
        }
        Ok(route_cols
            .iter()
            .map(|cols| [values[cols[0]], values[cols[1]]])
            .collect())
    }
}

/// Congestion inflation for a one-lane road: 2 at saturation above half
/// the road's service rate, interpolating down to 1 when idle.
fn congestion_scale(saturation: f64, travel_mean: f64) -> f64 {
    let threshold = 0.5 / travel_mean;
    if saturation > threshold {
        2.0
    } else {
        1.0 + 0.25 * saturation / threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MeanSd, Road, RoadKind, Route};

    fn two_shovel_net() -> Arc<Network> {
        Arc::new(
            Network::new(
                4,
                1.2,
                vec![MeanSd::new(1.0, 0.0)],
                vec![MeanSd::new(1.0, 0.0), MeanSd::new(2.0, 0.0)],
                vec![
                    Road {
                        travel: MeanSd::new(5.0, 0.0),
                        kind: RoadKind::TwoLane,
                    },
                    Road {
                        travel: MeanSd::new(5.0, 0.0),
                        kind: RoadKind::TwoLane,
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
            .unwrap(),
        )
    }

    #[test]
    fn test_model_shape() {
        let planner = FlowPlanner::new(two_shovel_net(), OneLanePolicy::Scale);
        let (model, route_cols) = planner.build_model();
        // C_0, S_0, S_1, 2 roads x 2, 2 routes x 2, T.
        assert_eq!(model.num_columns(), 1 + 2 + 4 + 4 + 1);
        assert_eq!(route_cols.len(), 2);
        assert_eq!(model.column_name(route_cols[0][0]), "Rt_0_0");
        assert_eq!(model.column_name(route_cols[1][1]), "Rt_1_1");
        assert!(model.column_index("T").is_some());
    }

    #[test]
    fn test_restrict_adds_binaries() {
        let net = Arc::new(
            Network::new(
                2,
                1.2,
                vec![MeanSd::new(1.0, 0.0)],
                vec![MeanSd::new(2.0, 0.0)],
                vec![Road {
                    travel: MeanSd::new(5.0, 0.0),
                    kind: RoadKind::OneLane,
                }],
                vec![Route {
                    roads: vec![0],
                    directions: vec![0],
                    crusher: 0,
                    shovel: 0,
                }],
            )
            .unwrap(),
        );
        let planner = FlowPlanner::new(net.clone(), OneLanePolicy::Restrict);
        let (model, _) = planner.build_model();
        assert!(model.column_index("d_0").is_some());
        assert!(model.to_lp_format().contains("bin d_0;"));
        // Scale variant has no direction columns.
        let planner = FlowPlanner::new(net, OneLanePolicy::Scale);
        let (model, _) = planner.build_model();
        assert!(model.column_index("d_0").is_none());
    }

    #[test]
    fn test_balanced_flow_is_feasible() {
        // Hand-built balanced solution: 0.1 cycles/time on route 0 only.
        let planner = FlowPlanner::new(two_shovel_net(), OneLanePolicy::Scale);
        let (model, route_cols) = planner.build_model();
        let mut values = vec![0.0; model.num_columns()];
        let flow = 0.1;
        values[route_cols[0][0]] = flow;
        values[route_cols[0][1]] = flow;
        values[model.column_index("C_0").unwrap()] = flow;
        values[model.column_index("S_0").unwrap()] = flow;
        values[model.column_index("Rd_0_0").unwrap()] = flow;
        values[model.column_index("Rd_0_1").unwrap()] = flow;
        // T = C·1 + S·1 + (5 + 6)·flow.
        values[model.column_index("T").unwrap()] = flow * (1.0 + 1.0 + 5.0 + 6.0);
        assert!(model.is_feasible(&values, 1e-9));
    }

    #[test]
    fn test_unbalanced_flow_is_infeasible() {
        let planner = FlowPlanner::new(two_shovel_net(), OneLanePolicy::Scale);
        let (model, route_cols) = planner.build_model();
        let mut values = vec![0.0; model.num_columns()];
        // Route flow with no matching road flow breaks conservation.
        values[route_cols[0][0]] = 0.1;
        assert!(!model.is_feasible(&values, 1e-9));
    }

    #[test]
    fn test_route_mean_times_scaling() {
        let net = Arc::new(
            Network::new(
                2,
                1.5,
                vec![MeanSd::new(1.0, 0.0)],
                vec![MeanSd::new(2.0, 0.0)],
                vec![Road {
                    travel: MeanSd::new(5.0, 0.0),
                    kind: RoadKind::OneLane,
                }],
                vec![Route {
                    roads: vec![0],
                    directions: vec![0],
                    crusher: 0,
                    shovel: 0,
                }],
            )
            .unwrap(),
        );
        let plain = FlowPlanner::route_mean_times(&net, OneLanePolicy::Restrict);
        assert_eq!(plain[0], [5.0, 7.5]);
        // Saturation 1/2 = 0.5 exceeds 0.5/5 = 0.1: scale doubles.
        let scaled = FlowPlanner::route_mean_times(&net, OneLanePolicy::Scale);
        assert_eq!(scaled[0], [10.0, 15.0]);
    }

    #[test]
    fn test_flow_retries_then_persists() {
        struct FailingSolver;
        impl Solver for FailingSolver {
            fn solve(&mut self, _model: &LpModel) -> Result<Vec<f64>, SolverError> {
                Err(SolverError::NonOptimal("infeasible".into()))
            }
        }
        let planner = FlowPlanner::new(two_shovel_net(), OneLanePolicy::Scale);
        let dir = std::env::temp_dir().join("haulage_flow_test");
        std::fs::create_dir_all(&dir).unwrap();
        let stem = dir.join("failed_model");
        let stem = stem.to_str().unwrap();
        let result = planner.flow(&mut FailingSolver, Some(stem));
        assert!(result.is_err());
        assert!(std::fs::metadata(format!("{stem}.lp")).is_ok());
    }

    #[test]
    fn test_flow_extracts_route_columns() {
        struct CountingSolver;
        impl Solver for CountingSolver {
            fn solve(&mut self, model: &LpModel) -> Result<Vec<f64>, SolverError> {
                // Return the column index as its value so extraction is
                // checkable.
                Ok((0..model.num_columns()).map(|i| i as f64).collect())
            }
        }
        let planner = FlowPlanner::new(two_shovel_net(), OneLanePolicy::Scale);
        let (_, route_cols) = planner.build_model();
        let flow = planner.flow(&mut CountingSolver, None).unwrap();
        assert_eq!(flow.len(), 2);
        assert_eq!(flow[0][0], route_cols[0][0] as f64);
        assert_eq!(flow[1][1], route_cols[1][1] as f64);
    }
}
