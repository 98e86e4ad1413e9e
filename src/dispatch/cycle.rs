//! Cyclic-schedule controllers.
//!
//! A cyclic schedule is a fixed sequence of destinations consumed
//! round-robin; the genetic algorithm optimises these sequences and the
//! controllers here replay them.

use super::{Controller, RouteChoice, RouteController};
use crate::sim::{StateChange, TrafficLight, TruckState};

/// Replays one cyclic shovel schedule on a simple network.
#[derive(Debug, Clone)]
pub struct CycleController {
    cycle: Vec<usize>,
    position: usize,
}

impl CycleController {
    /// Creates a controller from a non-empty schedule of shovel indices.
    pub fn new(cycle: Vec<usize>) -> Self {
        assert!(!cycle.is_empty(), "empty dispatch cycle");
        Self { cycle, position: 0 }
    }

    /// The schedule being replayed.
    pub fn cycle(&self) -> &[usize] {
        &self.cycle
    }
}

impl Controller for CycleController {
    fn next_shovel(&mut self, _truck: usize) -> usize {
        let out = self.cycle[self.position];
        self.position = (self.position + 1) % self.cycle.len();
        out
    }

    fn record(&mut self, _change: &StateChange) {}

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// Replays one cyclic route schedule per location (crusher or shovel) on
/// a routed network.
///
/// Schedules hold route indices: a crusher's schedule lists routes out of
/// that crusher, a shovel's routes returning from that shovel.
#[derive(Debug, Clone)]
pub struct MultiCycleController {
    num_crushers: usize,
    route_crushers: Vec<usize>,
    route_shovels: Vec<usize>,
    crusher_cycles: Vec<Vec<usize>>,
    shovel_cycles: Vec<Vec<usize>>,
    crusher_positions: Vec<usize>,
    shovel_positions: Vec<usize>,
    at_crusher: Vec<bool>,
    assigned_crusher: Vec<usize>,
    assigned_shovel: Vec<usize>,
}

impl MultiCycleController {
    pub fn new(
        num_trucks: usize,
        num_crushers: usize,
        route_crushers: Vec<usize>,
        route_shovels: Vec<usize>,
        crusher_cycles: Vec<Vec<usize>>,
        shovel_cycles: Vec<Vec<usize>>,
    ) -> Self {
        assert!(crusher_cycles.iter().all(|c| !c.is_empty()), "empty crusher cycle");
        assert!(shovel_cycles.iter().all(|c| !c.is_empty()), "empty shovel cycle");
        let num_shovels = shovel_cycles.len();
        let mut con = Self {
            num_crushers,
            route_crushers,
            route_shovels,
            crusher_positions: vec![0; crusher_cycles.len()],
            shovel_positions: vec![0; num_shovels],
            crusher_cycles,
            shovel_cycles,
            at_crusher: vec![true; num_trucks],
            assigned_crusher: vec![0; num_trucks],
            assigned_shovel: vec![0; num_trucks],
        };
        con.reset();
        con
    }
}

impl RouteController for MultiCycleController {
    fn next_route(&mut self, truck: usize) -> RouteChoice {
        if self.at_crusher[truck] {
            let cid = self.assigned_crusher[truck];
            let cycle = &self.crusher_cycles[cid];
            let out = cycle[self.crusher_positions[cid]];
            self.crusher_positions[cid] = (self.crusher_positions[cid] + 1) % cycle.len();
            RouteChoice::Route(out)
        } else {
            let sid = self.assigned_shovel[truck];
            let cycle = &self.shovel_cycles[sid];
            let out = cycle[self.shovel_positions[sid]];
            self.shovel_positions[sid] = (self.shovel_positions[sid] + 1) % cycle.len();
            RouteChoice::Route(out)
        }
    }

    fn record(&mut self, change: &StateChange) {
        let truck = change.truck();
        let Some(route) = change.assignment else {
            return;
        };
        match change.target() {
            TruckState::Filling => self.at_crusher[truck] = false,
            TruckState::Emptying => self.at_crusher[truck] = true,
            TruckState::TravelToShovel => self.assigned_shovel[truck] = self.route_shovels[route],
            TruckState::TravelToCrusher => self.assigned_crusher[truck] = self.route_crushers[route],
            _ => {}
        }
    }

    fn record_light(&mut self, _road: usize, _light: TrafficLight) {}

    fn reset(&mut self) {
        for tid in 0..self.at_crusher.len() {
            self.at_crusher[tid] = true;
            self.assigned_crusher[tid] = tid % self.num_crushers;
        }
        for position in &mut self.crusher_positions {
            *position = 0;
        }
        for position in &mut self.shovel_positions {
            *position = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_wraps() {
        let mut con = CycleController::new(vec![2, 0, 1]);
        let picks: Vec<usize> = (0..7).map(|t| con.next_shovel(t)).collect();
        assert_eq!(picks, vec![2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_cycle_reset() {
        let mut con = CycleController::new(vec![1, 0]);
        con.next_shovel(0);
        con.reset();
        assert_eq!(con.next_shovel(0), 1);
    }

    #[test]
    #[should_panic(expected = "empty dispatch cycle")]
    fn test_empty_cycle_rejected() {
        CycleController::new(Vec::new());
    }

    #[test]
    fn test_multi_cycle_per_location() {
        // Two routes out of the one crusher (0, 1), each returning from
        // its own shovel.
        let mut con = MultiCycleController::new(
            2,
            1,
            vec![0, 0],
            vec![0, 1],
            vec![vec![0, 1]],
            vec![vec![0], vec![1]],
        );
        assert_eq!(con.next_route(0), RouteChoice::Route(0));
        assert_eq!(con.next_route(1), RouteChoice::Route(1));
        assert_eq!(con.next_route(0), RouteChoice::Route(0));
    }
}
