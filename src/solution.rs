//! Solution catalogue: assembling controllers by index.
//!
//! The binary (and benchmarking harnesses) pick policies by a small
//! integer. Building a solution may itself be expensive: the GA entry
//! runs its whole optimisation here, and DISPATCH solves the flow LP.

use log::info;
use rand::rngs::SmallRng;
use rand::Rng;
use std::sync::Arc;

use crate::dispatch::{
    simple_flow, Controller, CycleController, DispatchController, HeuristicController,
    HeuristicKind, MultiCycleController, NetworkDispatchController, NetworkGreedyController,
    RouteController,
};
use crate::error::HaulageError;
use crate::ga::{
    AllCycleFitness, CycleFitness, CycleGenome, GaConfig, MultiCycleGenome, MultiStringOperator,
    OperatorParams, RollingGa, StringOperator,
};
use crate::lp::{FlowPlanner, OneLanePolicy, Solver};
use crate::model::{Network, SimpleNetwork};
use crate::times::UniformTimes;

/// Forward simulations per greedy heuristic evaluation.
const HEURISTIC_SAMPLES: usize = 20;

/// GA hyperparameters shared by both network shapes.
fn ga_config() -> GaConfig {
    GaConfig {
        pop_size: 100,
        selection_size: 200,
        elitism: 0.1,
        max_gen: 500,
        con_cutoff: 501,
        bucket_size: 20,
        resample_rate: 1,
        resample_size: 1,
        allow_survivors: true,
        tournament_k: 4,
        seed: None,
    }
}

fn ga_operator_params() -> OperatorParams {
    OperatorParams {
        crossover: 0.9,
        value_mutation: 0.05,
        inversion: 0.05,
        swap: 0.0,
        relocation: 0.0,
        insertion: 0.05,
        deletion: 0.05,
        mutation_count: 1,
    }
}

/// Random string length with exponential distribution around `average`,
/// at least one gene.
fn random_length<R: Rng>(average: usize, rng: &mut R) -> usize {
    let draw: f64 = 1.0 - rng.random::<f64>();
    ((average as f64 * -draw.ln()) as usize).max(1)
}

/// Builds a simple-network solution by index.
///
/// Indices: 0 = GA cycle, 1 = MTCT, 2 = MTWT, 3 = MTST, 4 = MSWT,
/// 5 = DISPATCH.
pub fn build_simple(
    index: usize,
    net: &SimpleNetwork,
    runtime: f64,
    solver: &mut dyn Solver,
) -> Result<(String, Box<dyn Controller>), HaulageError> {
    match index {
        0 => {
            info!("running cycle GA for the simple network");
            let ns = net.num_shovels();
            let fitness =
                CycleFitness::new(net.clone(), Box::new(UniformTimes::new()), runtime, 1);
            let operator = StringOperator::new(ns, ga_operator_params());
            let builder = move |rng: &mut SmallRng| {
                let length = random_length(ns, rng);
                CycleGenome::new((0..length).map(|_| rng.random_range(0..ns)).collect())
            };
            let result = RollingGa::new(ga_config(), fitness, operator, builder).run();
            info!(
                "cycle GA finished: fitness {} after {} generations",
                result.best_fitness, result.generations
            );
            Ok((
                "Cycles by GA".into(),
                Box::new(CycleController::new(result.best.genes)),
            ))
        }
        1..=4 => {
            let kind = [
                HeuristicKind::Mtct,
                HeuristicKind::Mtwt,
                HeuristicKind::Mtst,
                HeuristicKind::Mswt,
            ][index - 1];
            let con = HeuristicController::new(
                net.clone(),
                kind,
                Box::new(UniformTimes::new()),
                HEURISTIC_SAMPLES,
            );
            Ok((
                format!("Greedy-{} ({HEURISTIC_SAMPLES} samples)", kind.tag()),
                Box::new(con),
            ))
        }
        5 => {
            let flow = simple_flow(net, solver, None)?;
            Ok((
                "DISPATCH".into(),
                Box::new(DispatchController::new(net.clone(), flow)),
            ))
        }
        other => Err(HaulageError::config(format!(
            "unknown simple-network solution index {other}"
        ))),
    }
}

/// Builds a routed-network solution by index.
///
/// Indices: 0 = GA cycles, 1 = MTCT, 2 = MTWT, 3 = MTST, 4 = MSWT,
/// 5 = DISPATCH-scale, 6 = DISPATCH-owr.
pub fn build_routed(
    index: usize,
    net: &Arc<Network>,
    runtime: f64,
    solver: &mut dyn Solver,
) -> Result<(String, Box<dyn RouteController>), HaulageError> {
    match index {
        0 => {
            info!("running cycle GA for the routed network");
            let nc = net.num_crushers();
            let ns = net.num_shovels();
            let alphabets: Vec<usize> = (0..nc)
                .map(|c| net.routes_from_crusher(c).len())
                .chain((0..ns).map(|s| net.routes_from_shovel(s).len()))
                .collect();
            let fixed_lengths = vec![0; nc + ns];
            let fitness =
                AllCycleFitness::new(net.clone(), Box::new(UniformTimes::new()), runtime, 1);
            let operator = MultiStringOperator::new(
                alphabets.clone(),
                fixed_lengths,
                (nc + ns) as f64,
                ga_operator_params(),
            );
            let builder = move |rng: &mut SmallRng| {
                let strings = alphabets
                    .iter()
                    .map(|&alphabet| {
                        let length = random_length(alphabet, rng);
                        (0..length).map(|_| rng.random_range(0..alphabet)).collect()
                    })
                    .collect();
                MultiCycleGenome::new(strings, true)
            };
            let result = RollingGa::new(ga_config(), fitness, operator, builder).run();
            info!(
                "cycle GA finished: fitness {} after {} generations",
                result.best_fitness, result.generations
            );
            let crusher_cycles: Vec<Vec<usize>> = (0..nc)
                .map(|c| {
                    result.best.strings[c]
                        .iter()
                        .map(|&g| net.routes_from_crusher(c)[g])
                        .collect()
                })
                .collect();
            let shovel_cycles: Vec<Vec<usize>> = (0..ns)
                .map(|s| {
                    result.best.strings[nc + s]
                        .iter()
                        .map(|&g| net.routes_from_shovel(s)[g])
                        .collect()
                })
                .collect();
            let con = MultiCycleController::new(
                net.num_trucks,
                nc,
                net.routes.iter().map(|r| r.crusher).collect(),
                net.routes.iter().map(|r| r.shovel).collect(),
                crusher_cycles,
                shovel_cycles,
            );
            Ok(("Cycles by GA".into(), Box::new(con)))
        }
        1..=4 => {
            let kind = [
                HeuristicKind::Mtct,
                HeuristicKind::Mtwt,
                HeuristicKind::Mtst,
                HeuristicKind::Mswt,
            ][index - 1];
            let con = NetworkGreedyController::new(
                net.clone(),
                kind,
                Box::new(UniformTimes::new()),
                HEURISTIC_SAMPLES,
                runtime,
            );
            Ok((
                format!("Greedy-{} ({HEURISTIC_SAMPLES} samples)", kind.tag()),
                Box::new(con),
            ))
        }
        5 | 6 => {
            let policy = if index == 6 {
                OneLanePolicy::Restrict
            } else {
                OneLanePolicy::Scale
            };
            let name = match policy {
                OneLanePolicy::Restrict => "DISPATCH-owr",
                OneLanePolicy::Scale => "DISPATCH-scale",
            };
            let flow = FlowPlanner::new(net.clone(), policy).flow(solver, None)?;
            let con = NetworkDispatchController::new(net.clone(), runtime, flow, policy);
            Ok((name.into(), Box::new(con)))
        }
        other => Err(HaulageError::config(format!(
            "unknown routed-network solution index {other}"
        ))),
    }
}
