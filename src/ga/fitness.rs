//! Shift-simulation fitness for cyclic dispatch schedules.
//!
//! Fitness is truckloads delivered per shift, averaged over
//! `num_samples` simulated shifts, with a geometric penalty on schedules
//! longer than the fleet can justify. A zero-length cycle scores zero
//! outright.

use std::sync::Arc;

use super::chromosome::{CycleGenome, MultiCycleGenome};
use super::FitnessFunction;
use crate::dispatch::RouteChoice;
use crate::model::{Network, SimpleNetwork};
use crate::sim::forecast::{NetworkForecast, SimpleForecast};
use crate::sim::TruckState;
use crate::times::TimeDistribution;

const LENGTH_DISCOUNT: f64 = 0.995;

/// Shovel schedules beyond this length start paying the penalty.
const IDEAL_SHOVEL_CYCLE: usize = 4;

/// Fitness of a single dispatch cycle on a simple network.
pub struct CycleFitness {
    forecast: SimpleForecast,
    num_trucks: usize,
    runtime: f64,
    num_samples: usize,
    discount: f64,
}

impl CycleFitness {
    pub fn new(
        net: SimpleNetwork,
        tgen: Box<dyn TimeDistribution>,
        runtime: f64,
        num_samples: usize,
    ) -> Self {
        let num_trucks = net.num_trucks;
        Self {
            forecast: SimpleForecast::new(net, tgen),
            num_trucks,
            runtime,
            num_samples,
            discount: LENGTH_DISCOUNT.powf(1.0 / num_trucks as f64),
        }
    }
}

impl FitnessFunction<CycleGenome> for CycleFitness {
    fn evaluate(&mut self, genome: &CycleGenome) -> f64 {
        if genome.is_empty() {
            return 0.0;
        }
        let penalty = if genome.len() > self.num_trucks {
            self.discount.powi((genome.len() - self.num_trucks) as i32)
        } else {
            1.0
        };
        let mut total = 0.0;
        for _ in 0..self.num_samples {
            self.forecast.re_ready();
            let mut position = 0;
            let genes = &genome.genes;
            self.forecast.simulate(self.runtime, &mut |_tid| {
                let out = genes[position];
                position = (position + 1) % genes.len();
                out
            });
            total += self.forecast.num_empties() as f64;
        }
        total * penalty / self.num_samples as f64
    }
}

/// Fitness of a per-location schedule bundle on a routed network.
///
/// Genes index into each location's outgoing route list; decoding maps
/// them to route indices before simulation. Crusher schedules are
/// penalised beyond the fleet size, shovel schedules beyond
/// [`IDEAL_SHOVEL_CYCLE`].
pub struct AllCycleFitness {
    net: Arc<Network>,
    forecast: NetworkForecast,
    runtime: f64,
    num_samples: usize,
    crusher_discount: f64,
}

impl AllCycleFitness {
    pub fn new(
        net: Arc<Network>,
        tgen: Box<dyn TimeDistribution>,
        runtime: f64,
        num_samples: usize,
    ) -> Self {
        let mut forecast = NetworkForecast::new(net.clone(), tgen);
        forecast.reset();
        forecast.ready();
        let crusher_discount = LENGTH_DISCOUNT.powf(1.0 / net.num_trucks as f64);
        Self {
            net,
            forecast,
            runtime,
            num_samples,
            crusher_discount,
        }
    }

    /// Decodes location-relative genes into route indices, or `None`
    /// when some string is empty. Also accumulates the length penalty.
    fn decode(&self, genome: &MultiCycleGenome) -> Option<(Vec<Vec<usize>>, f64)> {
        let nc = self.net.num_crushers();
        let mut cycles = Vec::with_capacity(genome.num_strings());
        let mut penalty = 1.0;
        for (i, string) in genome.strings.iter().enumerate() {
            if string.is_empty() {
                return None;
            }
            let (table, threshold, discount): (&[usize], usize, f64) = if i < nc {
                (
                    self.net.routes_from_crusher(i),
                    self.net.num_trucks,
                    self.crusher_discount,
                )
            } else {
                (
                    self.net.routes_from_shovel(i - nc),
                    IDEAL_SHOVEL_CYCLE,
                    LENGTH_DISCOUNT,
                )
            };
            if string.len() > threshold {
                penalty *= discount.powi((string.len() - threshold) as i32);
            }
            cycles.push(string.iter().map(|&g| table[g]).collect());
        }
        Some((cycles, penalty))
    }
}

impl FitnessFunction<MultiCycleGenome> for AllCycleFitness {
    fn evaluate(&mut self, genome: &MultiCycleGenome) -> f64 {
        let Some((cycles, penalty)) = self.decode(genome) else {
            return 0.0;
        };
        let nc = self.net.num_crushers();
        let mut total = 0.0;
        for _ in 0..self.num_samples {
            self.forecast.re_ready();
            let mut positions = vec![0usize; cycles.len()];
            self.forecast.simulate(self.runtime, &mut |req| {
                let slot = match req.location {
                    TruckState::Filling | TruckState::LeavingShovel => nc + req.shovel,
                    _ => req.crusher,
                };
                let cycle = &cycles[slot];
                let out = cycle[positions[slot]];
                positions[slot] = (positions[slot] + 1) % cycle.len();
                RouteChoice::Route(out)
            });
            total += self.forecast.num_empties() as f64;
        }
        total * penalty / self.num_samples as f64
    }
}
