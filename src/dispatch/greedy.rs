//! Forward-simulation greedy heuristics for simple networks.
//!
//! For each candidate shovel the controller replays the relevant slice of
//! the mine forward in closed form — trucks already en route arrive in
//! convoy order, the shovel works its queue, loaded trucks stream back —
//! and averages a per-heuristic score over several noisy replays. The
//! candidate minimising the average wins.
//!
//! # Reference
//!
//! Tan & Ramani (1992), "Evaluation of computer truck dispatching
//! criteria"

use super::Controller;
use crate::model::SimpleNetwork;
use crate::sim::{StateChange, TruckState, FULL_SLOWDOWN};
use crate::times::TimeDistribution;

const EPSILON: f64 = 1e-6;

/// Greedy criterion to minimise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicKind {
    /// Truck cycle time: dispatch to return at the crusher.
    Mtct,
    /// Truck service time: dispatch to start of filling.
    Mtst,
    /// Truck waiting time between dispatch and filling.
    Mtwt,
    /// Shovel idle time preceding the truck's fill.
    Mswt,
}

impl HeuristicKind {
    /// Short uppercase tag used in solution names.
    pub fn tag(&self) -> &'static str {
        match self {
            HeuristicKind::Mtct => "MTCT",
            HeuristicKind::Mtst => "MTST",
            HeuristicKind::Mtwt => "MTWT",
            HeuristicKind::Mswt => "MSWT",
        }
    }
}

/// Snapshot of the live mine a simple-network heuristic replays from.
#[derive(Debug)]
struct MineView {
    truck_states: Vec<TruckState>,
    progress: Vec<f64>,
    shovel_dest: Vec<Option<usize>>,
    last_used: Vec<f64>,
    curr_time: f64,
}

impl MineView {
    fn new(num_trucks: usize, num_shovels: usize) -> Self {
        Self {
            truck_states: vec![TruckState::Waiting; num_trucks],
            progress: vec![0.0; num_trucks],
            shovel_dest: vec![None; num_trucks],
            last_used: vec![0.0; num_shovels],
            curr_time: 0.0,
        }
    }

    fn reset(&mut self) {
        for tid in 0..self.truck_states.len() {
            self.truck_states[tid] = TruckState::Waiting;
            self.progress[tid] = 0.0;
            self.shovel_dest[tid] = None;
        }
        for used in &mut self.last_used {
            *used = 0.0;
        }
        self.curr_time = 0.0;
    }

    fn record(&mut self, change: &StateChange) {
        self.curr_time = change.time();
        let truck = change.truck();
        self.truck_states[truck] = change.target();
        self.shovel_dest[truck] = change.assignment;
        if change.target() == TruckState::LeavingShovel {
            if let Some(sid) = change.assignment {
                self.last_used[sid] = self.curr_time;
            }
        }
        self.progress.copy_from_slice(&change.progress);
    }
}

/// Per-shovel traffic sorted out of a [`MineView`]: who is heading there,
/// queued there, filling there, and returning from there.
#[derive(Debug, Default, Clone)]
struct ShovelTraffic {
    /// Progress of trucks travelling to the shovel, ascending.
    travelling: Vec<f64>,
    /// Trucks queued (approaching or waiting) at the shovel.
    queued: usize,
    /// Progress of the truck currently filling, if any.
    filling: Option<f64>,
    /// Progress of trucks leaving or returning, ascending.
    returning: Vec<f64>,
}

fn sort_traffic(view: &MineView, num_shovels: usize) -> Vec<ShovelTraffic> {
    let mut traffic = vec![ShovelTraffic::default(); num_shovels];
    for tid in 0..view.truck_states.len() {
        let sid = view.shovel_dest[tid];
        match view.truck_states[tid] {
            TruckState::Waiting
            | TruckState::ApproachingCrusher
            | TruckState::WaitingAtCrusher
            | TruckState::Emptying => {}
            TruckState::TravelToShovel => {
                traffic[sid.expect("travelling truck without destination")]
                    .travelling
                    .push(view.progress[tid]);
            }
            TruckState::ApproachingShovel | TruckState::WaitingAtShovel => {
                traffic[sid.expect("queued truck without destination")].queued += 1;
            }
            TruckState::Filling => {
                traffic[sid.expect("filling truck without destination")].filling =
                    Some(view.progress[tid]);
            }
            TruckState::LeavingShovel | TruckState::TravelToCrusher => {
                traffic[sid.expect("returning truck without destination")]
                    .returning
                    .push(view.progress[tid]);
            }
            other => panic!("truck {tid} is in illegal state {other:?}"),
        }
    }
    for t in &mut traffic {
        t.travelling.sort_by(f64::total_cmp);
        t.returning.sort_by(f64::total_cmp);
    }
    traffic
}

/// Greedy heuristic controller (MTCT / MTST / MTWT / MSWT).
pub struct HeuristicController {
    kind: HeuristicKind,
    tgen: Box<dyn TimeDistribution>,
    num_samples: usize,
    net: SimpleNetwork,
    view: MineView,
}

impl HeuristicController {
    pub fn new(
        net: SimpleNetwork,
        kind: HeuristicKind,
        tgen: Box<dyn TimeDistribution>,
        num_samples: usize,
    ) -> Self {
        let view = MineView::new(net.num_trucks, net.num_shovels());
        Self {
            kind,
            tgen,
            num_samples,
            net,
            view,
        }
    }
}

impl Controller for HeuristicController {
    /// Scores every shovel by replaying its traffic forward, the
    /// requesting truck appended at progress zero, and returns the
    /// minimiser of the configured criterion.
    fn next_shovel(&mut self, truck: usize) -> usize {
        assert_eq!(
            self.view.truck_states[truck],
            TruckState::Waiting,
            "truck {truck} requested routing while not awaiting dispatch"
        );
        let ns = self.net.num_shovels();
        let mut traffic = sort_traffic(&self.view, ns);
        let mut total_cycle = vec![0.0; ns];
        let mut total_service = vec![0.0; ns];
        let mut total_truck_wait = vec![0.0; ns];
        let mut total_shovel_wait = vec![0.0; ns];
        for (sid, t) in traffic.iter_mut().enumerate() {
            // The requesting truck joins at the start of the road.
            t.travelling.insert(0, 0.0);
            let travel = self.net.shovels[sid].travel;
            let fill = self.net.shovels[sid].fill;
            for _ in 0..self.num_samples {
                // Outbound convoy: arrivals in descending progress
                // order, each at least as late as the truck ahead.
                let mut arriving = Vec::with_capacity(t.travelling.len());
                let mut max_arrival = 0.0f64;
                let mut last_progress = 1.1f64;
                for &p in t.travelling.iter().rev() {
                    if last_progress - p < EPSILON {
                        arriving.push(max_arrival);
                        continue;
                    }
                    let arr =
                        max_arrival.max(self.tgen.sample(travel.mean, travel.sd) * (1.0 - p));
                    max_arrival = arr;
                    last_progress = p;
                    arriving.push(arr);
                }
                // Inbound convoy of already-loaded trucks.
                let mut returning = Vec::new();
                max_arrival = 0.0;
                last_progress = 1.1;
                for &p in t.returning.iter().rev() {
                    if last_progress - p < EPSILON {
                        returning.push(max_arrival);
                        continue;
                    }
                    let arr = max_arrival
                        .max(FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd) * (1.0 - p));
                    max_arrival = arr;
                    last_progress = p;
                    returning.push(arr);
                }
                // Shovel service chain: current fill, queue, then the
                // convoy.
                let mut available = self.view.last_used[sid] - self.view.curr_time;
                if let Some(p) = t.filling {
                    available = self.tgen.sample(fill.mean, fill.sd) * (1.0 - p);
                    let arr = max_arrival
                        .max(available + FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd));
                    max_arrival = arr;
                    returning.push(arr);
                }
                for _ in 0..t.queued {
                    available = available.max(0.0) + self.tgen.sample(fill.mean, fill.sd);
                    let arr = max_arrival
                        .max(available + FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd));
                    max_arrival = arr;
                    returning.push(arr);
                }
                for (k, &arr_time) in arriving.iter().enumerate() {
                    if k == arriving.len() - 1 {
                        // The requester: record its service statistics.
                        total_service[sid] += available.max(arr_time);
                        total_truck_wait[sid] += (available - arr_time).max(0.0);
                        total_shovel_wait[sid] += available;
                    }
                    available = available.max(arr_time) + self.tgen.sample(fill.mean, fill.sd);
                    let arr = max_arrival
                        .max(available + FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd));
                    max_arrival = arr;
                    returning.push(arr);
                }
                total_cycle[sid] += returning.last().copied().unwrap_or(0.0);
            }
        }
        match self.kind {
            HeuristicKind::Mtct => min_index(&total_cycle),
            HeuristicKind::Mtst => min_index(&total_service),
            HeuristicKind::Mtwt => min_index(&total_truck_wait),
            HeuristicKind::Mswt => min_index(&total_shovel_wait),
        }
    }

    fn record(&mut self, change: &StateChange) {
        self.view.record(change);
    }

    fn reset(&mut self) {
        self.view.reset();
    }
}

/// MTCT variant scoring the complete cycle, crusher queue included.
///
/// The per-shovel return streams are merged in arrival order and pushed
/// through the crusher's service chain, so a candidate that funnels the
/// truck into a crusher jam scores worse even when its road is short.
pub struct MergedCycleTimeController {
    tgen: Box<dyn TimeDistribution>,
    num_samples: usize,
    net: SimpleNetwork,
    view: MineView,
}

impl MergedCycleTimeController {
    pub fn new(net: SimpleNetwork, tgen: Box<dyn TimeDistribution>, num_samples: usize) -> Self {
        let view = MineView::new(net.num_trucks, net.num_shovels());
        Self {
            tgen,
            num_samples,
            net,
            view,
        }
    }
}

impl Controller for MergedCycleTimeController {
    fn next_shovel(&mut self, truck: usize) -> usize {
        assert_eq!(
            self.view.truck_states[truck],
            TruckState::Waiting,
            "truck {truck} requested routing while not awaiting dispatch"
        );
        let ns = self.net.num_shovels();
        let mut traffic = sort_traffic(&self.view, ns);
        let mut empty_queue = 0usize;
        let mut emptying: Option<f64> = None;
        for tid in 0..self.net.num_trucks {
            match self.view.truck_states[tid] {
                TruckState::ApproachingCrusher | TruckState::WaitingAtCrusher => empty_queue += 1,
                TruckState::Emptying => emptying = Some(self.view.progress[tid]),
                _ => {}
            }
        }
        for t in &mut traffic {
            t.travelling.insert(0, 0.0);
        }
        let mut total_cycle = vec![0.0; ns];
        let empty = self.net.empty;
        for _ in 0..self.num_samples {
            // (arrival at crusher, is the requester, candidate shovel).
            let mut merged: Vec<(f64, bool, usize)> = Vec::new();
            for (sid, t) in traffic.iter().enumerate() {
                let travel = self.net.shovels[sid].travel;
                let fill = self.net.shovels[sid].fill;
                let mut arriving = Vec::with_capacity(t.travelling.len());
                let mut max_arrival = 0.0f64;
                let mut last_progress = 1.1f64;
                for &p in t.travelling.iter().rev() {
                    if last_progress - p < EPSILON {
                        arriving.push(max_arrival);
                        continue;
                    }
                    let arr =
                        max_arrival.max(self.tgen.sample(travel.mean, travel.sd) * (1.0 - p));
                    max_arrival = arr;
                    last_progress = p;
                    arriving.push(arr);
                }
                max_arrival = 0.0;
                last_progress = 1.1;
                for &p in t.returning.iter().rev() {
                    if last_progress - p < EPSILON {
                        merged.push((max_arrival, false, sid));
                        continue;
                    }
                    let arr = max_arrival
                        .max(FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd) * (1.0 - p));
                    max_arrival = arr;
                    last_progress = p;
                    merged.push((arr, false, sid));
                }
                let mut available = self.view.last_used[sid] - self.view.curr_time;
                if let Some(p) = t.filling {
                    available = self.tgen.sample(fill.mean, fill.sd) * (1.0 - p);
                    let arr = max_arrival
                        .max(available + FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd));
                    max_arrival = arr;
                    merged.push((arr, false, sid));
                }
                for _ in 0..t.queued {
                    available += self.tgen.sample(fill.mean, fill.sd);
                    let arr = max_arrival
                        .max(available + FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd));
                    max_arrival = arr;
                    merged.push((arr, false, sid));
                }
                for (k, &arr_time) in arriving.iter().enumerate() {
                    available = available.max(arr_time) + self.tgen.sample(fill.mean, fill.sd);
                    let arr = max_arrival
                        .max(available + FULL_SLOWDOWN * self.tgen.sample(travel.mean, travel.sd));
                    max_arrival = arr;
                    merged.push((arr, k == arriving.len() - 1, sid));
                }
            }
            merged.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut crusher_available = 0.0f64;
            if let Some(p) = emptying {
                crusher_available = self.tgen.sample(empty.mean, empty.sd) * (1.0 - p);
            }
            for _ in 0..empty_queue {
                crusher_available += self.tgen.sample(empty.mean, empty.sd);
            }
            for &(arr, is_requester, sid) in &merged {
                if is_requester {
                    total_cycle[sid] += crusher_available.max(arr);
                } else {
                    crusher_available =
                        crusher_available.max(arr) + self.tgen.sample(empty.mean, empty.sd);
                }
            }
        }
        min_index(&total_cycle)
    }

    fn record(&mut self, change: &StateChange) {
        self.view.record(change);
    }

    fn reset(&mut self) {
        self.view.reset();
    }
}

fn min_index(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}
