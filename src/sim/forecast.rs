//! State-restartable forward simulators.
//!
//! Look-ahead controllers and the GA need to run many short simulations:
//! either whole shifts from scratch ([`SimpleForecast`]) or continuations
//! of a live mine state with fresh random draws ([`NetworkForecast`]).
//!
//! [`NetworkForecast`] keeps a *stored state* — per-truck state, route,
//! leg and progress plus the traffic lights — that an observing controller
//! updates through [`record_event`](NetworkForecast::record_event) and
//! [`record_light`](NetworkForecast::record_light) as the outer simulation
//! emits state changes. [`ready`](NetworkForecast::ready) reconstructs the
//! derived queues from that snapshot once, and
//! [`re_ready`](NetworkForecast::re_ready) then starts any number of runs
//! from it, re-drawing the durations of partially-completed tasks scaled
//! by the remaining fraction.
//!
//! Routing during a forecast run is a capability passed to
//! [`simulate`](NetworkForecast::simulate), so one forecaster serves many
//! policies without any inheritance between them.

use std::collections::VecDeque;
use std::sync::Arc;

use super::event::{EventQueue, StateChange, TrafficLight, Transition, TruckState};
use super::FULL_SLOWDOWN;
use crate::dispatch::RouteChoice;
use crate::model::{Network, SimpleNetwork};
use crate::times::TimeDistribution;

const EPSILON: f64 = 1e-6;

/// Context handed to a routing capability when a truck needs a
/// destination during a forecast run.
#[derive(Debug, Clone, Copy)]
pub struct RoutingRequest {
    /// Truck requiring routing.
    pub truck: usize,
    /// Current simulation time.
    pub time: f64,
    /// The truck's state at the moment of the request (`Emptying` or
    /// `Waiting` at a crusher, `Filling` or `LeavingShovel` at a shovel).
    pub location: TruckState,
    /// The truck's current crusher assignment.
    pub crusher: usize,
    /// The truck's current shovel assignment.
    pub shovel: usize,
    /// Total waiting time accumulated by the truck this run, or a large
    /// value if it has not completed a service yet.
    pub waiting_time: f64,
}

/// Large sentinel returned by statistics of trucks that never completed a
/// service within a run.
pub const UNSERVICED: f64 = 1e9;

// ---------------------------------------------------------------------------
// Simple networks
// ---------------------------------------------------------------------------

/// Forward simulator for simple networks, restarted from the start of a
/// shift for every run.
pub struct SimpleForecast {
    net: SimpleNetwork,
    tgen: Box<dyn TimeDistribution>,

    num_empties: u32,
    curr_time: f64,
    event_queue: EventQueue,
    instant_queue: EventQueue,
    truck_states: Vec<TruckState>,
    assigned_shovel: Vec<Option<usize>>,
    crusher_queue: VecDeque<usize>,
    shovel_queues: Vec<VecDeque<usize>>,
    road_priority: Vec<[i64; 2]>,
    road_available: Vec<[f64; 2]>,
    road_queues: Vec<[VecDeque<usize>; 2]>,
    arrival_time: Vec<f64>,
    intended_arrival: Vec<f64>,
    last_used: Vec<f64>,
}

impl SimpleForecast {
    pub fn new(net: SimpleNetwork, tgen: Box<dyn TimeDistribution>) -> Self {
        let nt = net.num_trucks;
        let ns = net.num_shovels();
        Self {
            net,
            tgen,
            num_empties: 0,
            curr_time: 0.0,
            event_queue: EventQueue::new(),
            instant_queue: EventQueue::new(),
            truck_states: vec![TruckState::Waiting; nt],
            assigned_shovel: vec![None; nt],
            crusher_queue: VecDeque::new(),
            shovel_queues: vec![VecDeque::new(); ns],
            road_priority: vec![[0; 2]; ns],
            road_available: vec![[0.0; 2]; ns],
            road_queues: (0..ns).map(|_| [VecDeque::new(), VecDeque::new()]).collect(),
            arrival_time: vec![0.0; nt],
            intended_arrival: vec![0.0; nt],
            last_used: vec![0.0; ns],
        }
    }

    /// Rewinds to the start of a shift. Run before every simulation.
    pub fn re_ready(&mut self) {
        self.num_empties = 0;
        self.curr_time = 0.0;
        self.event_queue.clear();
        self.instant_queue.clear();
        self.crusher_queue.clear();
        for tid in 0..self.net.num_trucks {
            self.instant_queue.push(Transition::new(
                tid,
                0.0,
                TruckState::Waiting,
                TruckState::Waiting,
                self.priority(tid, TruckState::Waiting),
            ));
            self.truck_states[tid] = TruckState::Waiting;
            self.assigned_shovel[tid] = None;
            self.arrival_time[tid] = 0.0;
            self.intended_arrival[tid] = 0.0;
        }
        for sid in 0..self.net.num_shovels() {
            self.shovel_queues[sid].clear();
            self.last_used[sid] = 0.0;
            for dir in 0..2 {
                self.road_priority[sid][dir] = i64::MIN;
                self.road_available[sid][dir] = 0.0;
                self.road_queues[sid][dir].clear();
            }
        }
    }

    /// Completed dump cycles in the current run.
    pub fn num_empties(&self) -> u32 {
        self.num_empties
    }

    /// Runs forward until `runtime`, asking `routing` for a shovel on
    /// every dispatch.
    pub fn simulate(&mut self, runtime: f64, routing: &mut dyn FnMut(usize) -> usize) {
        while self.peek_next().is_some_and(|t| t.time <= runtime) {
            let next = self.pop_next().unwrap();
            self.curr_time = next.time;
            let tid = next.truck;
            if next.source != self.truck_states[tid] {
                panic!(
                    "transition {:?} -> {:?} fired while truck {tid} is in {:?}",
                    next.source, next.target, self.truck_states[tid]
                );
            }
            self.arrival_time[tid] = self.curr_time;
            match next.target {
                TruckState::Waiting => {
                    if next.source == TruckState::Emptying {
                        self.crusher_queue.pop_front();
                        if let Some(&head) = self.crusher_queue.front() {
                            self.push_instant(head, TruckState::WaitingAtCrusher, TruckState::Emptying);
                        }
                        self.num_empties += 1;
                    }
                    self.assigned_shovel[tid] = Some(routing(tid));
                    self.push_instant(tid, next.target, TruckState::TravelToShovel);
                }
                TruckState::TravelToShovel => {
                    let sid = self.shovel_of(tid);
                    let travel = self.net.shovels[sid].travel;
                    let travel_time = self.tgen.sample(travel.mean, travel.sd);
                    let arrival = self.prevent_collisions(travel_time, tid, sid, true);
                    self.event_queue.push(arrival);
                    self.road_queues[sid][0].push_back(tid);
                }
                TruckState::ApproachingShovel => {
                    let sid = self.shovel_of(tid);
                    let next_state = if self.shovel_queues[sid].is_empty() {
                        TruckState::Filling
                    } else {
                        TruckState::WaitingAtShovel
                    };
                    self.shovel_queues[sid].push_back(tid);
                    self.push_instant(tid, next.target, next_state);
                    self.road_queues[sid][0].pop_front();
                }
                TruckState::WaitingAtShovel | TruckState::WaitingAtCrusher => {}
                TruckState::Filling => {
                    let sid = self.shovel_of(tid);
                    let fill = self.net.shovels[sid].fill;
                    let fill_time = self.tgen.sample(fill.mean, fill.sd);
                    self.event_queue.push(Transition::new(
                        tid,
                        self.curr_time + fill_time,
                        next.target,
                        TruckState::LeavingShovel,
                        self.priority(tid, TruckState::LeavingShovel),
                    ));
                    self.intended_arrival[tid] = self.curr_time + fill_time;
                }
                TruckState::LeavingShovel => {
                    if next.source == TruckState::Filling {
                        let sid = self.shovel_of(tid);
                        self.shovel_queues[sid].pop_front();
                        if let Some(&head) = self.shovel_queues[sid].front() {
                            self.push_instant(head, TruckState::WaitingAtShovel, TruckState::Filling);
                        }
                        self.last_used[sid] = self.curr_time;
                    }
                    self.push_instant(tid, next.target, TruckState::TravelToCrusher);
                }
                TruckState::TravelToCrusher => {
                    let sid = self.shovel_of(tid);
                    let travel = self.net.shovels[sid].travel;
                    let travel_time = self.tgen.sample(travel.mean, travel.sd) * FULL_SLOWDOWN;
                    let arrival = self.prevent_collisions(travel_time, tid, sid, false);
                    self.event_queue.push(arrival);
                    self.road_queues[sid][1].push_back(tid);
                }
                TruckState::ApproachingCrusher => {
                    let sid = self.shovel_of(tid);
                    let next_state = if self.crusher_queue.is_empty() {
                        TruckState::Emptying
                    } else {
                        TruckState::WaitingAtCrusher
                    };
                    self.crusher_queue.push_back(tid);
                    self.push_instant(tid, next.target, next_state);
                    self.road_queues[sid][1].pop_front();
                }
                TruckState::Emptying => {
                    let empty = self.net.empty;
                    let empty_time = self.tgen.sample(empty.mean, empty.sd);
                    self.event_queue.push(Transition::new(
                        tid,
                        self.curr_time + empty_time,
                        next.target,
                        TruckState::Waiting,
                        self.priority(tid, TruckState::Waiting),
                    ));
                    self.intended_arrival[tid] = self.curr_time + empty_time;
                }
                other => panic!("truck {tid} entered illegal state {other:?}"),
            }
            self.truck_states[tid] = next.target;
        }
    }

    fn priority(&self, tid: usize, dest: TruckState) -> i64 {
        let nt = self.net.num_trucks as i64;
        let band = match dest {
            TruckState::TravelToShovel | TruckState::TravelToCrusher => 0,
            TruckState::WaitingAtShovel
            | TruckState::Filling
            | TruckState::WaitingAtCrusher
            | TruckState::Emptying => 1,
            TruckState::Waiting | TruckState::LeavingShovel => 2,
            TruckState::ApproachingShovel | TruckState::ApproachingCrusher => 3,
            other => panic!("no transition priority for {other:?}"),
        };
        band * nt + tid as i64
    }

    fn push_instant(&mut self, tid: usize, source: TruckState, target: TruckState) {
        self.instant_queue.push(Transition::new(
            tid,
            self.curr_time,
            source,
            target,
            self.priority(tid, target),
        ));
    }

    fn prevent_collisions(
        &mut self,
        travel_time: f64,
        tid: usize,
        sid: usize,
        outbound: bool,
    ) -> Transition {
        let dir = usize::from(!outbound);
        self.intended_arrival[tid] = self.curr_time + travel_time;
        let actual = self.intended_arrival[tid].max(self.road_available[sid][dir]);
        self.road_available[sid][dir] = actual;
        self.road_priority[sid][dir] += 1;
        let (travel, target) = if outbound {
            (TruckState::TravelToShovel, TruckState::ApproachingShovel)
        } else {
            (TruckState::TravelToCrusher, TruckState::ApproachingCrusher)
        };
        Transition::new(tid, actual, travel, target, self.road_priority[sid][dir])
    }

    fn shovel_of(&self, tid: usize) -> usize {
        self.assigned_shovel[tid].expect("truck moving without an assignment")
    }

    fn pop_next(&mut self) -> Option<Transition> {
        if self.instant_queue.is_empty() {
            self.event_queue.pop()
        } else {
            self.instant_queue.pop()
        }
    }

    fn peek_next(&self) -> Option<&Transition> {
        if self.instant_queue.is_empty() {
            self.event_queue.peek()
        } else {
            self.instant_queue.peek()
        }
    }
}

// ---------------------------------------------------------------------------
// Routed networks
// ---------------------------------------------------------------------------

/// Snapshot of a live mine, updated by an observing controller.
#[derive(Debug, Clone)]
struct StoredState {
    time: f64,
    locs: Vec<TruckState>,
    shovel: Vec<usize>,
    crusher: Vec<usize>,
    route: Vec<usize>,
    leg: Vec<isize>,
    progress: Vec<f64>,
    lights: Vec<TrafficLight>,
}

/// Derived queue state reconstructed from a [`StoredState`] by
/// [`NetworkForecast::ready`].
#[derive(Debug, Clone, Default)]
struct ReadyState {
    instants: Vec<Transition>,
    timed: Vec<Transition>,
    crusher_queues: Vec<VecDeque<usize>>,
    shovel_queues: Vec<VecDeque<usize>>,
    light_queues: Vec<[VecDeque<usize>; 2]>,
    road_queues: Vec<[VecDeque<usize>; 2]>,
    road_priority: Vec<[i64; 2]>,
}

/// Forward simulator for routed networks that restarts from a stored
/// mine state with fresh random draws.
pub struct NetworkForecast {
    net: Arc<Network>,
    tgen: Box<dyn TimeDistribution>,
    initial_crushers: Vec<usize>,

    stored: StoredState,
    ready_state: ReadyState,
    is_ready: bool,

    num_empties: u32,
    curr_time: f64,
    event_queue: EventQueue,
    instant_queue: EventQueue,
    truck_states: Vec<TruckState>,
    assigned_shovel: Vec<usize>,
    assigned_crusher: Vec<usize>,
    assigned_route: Vec<usize>,
    route_leg: Vec<isize>,
    crusher_queues: Vec<VecDeque<usize>>,
    shovel_queues: Vec<VecDeque<usize>>,
    light_queues: Vec<[VecDeque<usize>; 2]>,
    lights: Vec<TrafficLight>,
    road_available: Vec<[f64; 2]>,
    road_priority: Vec<[i64; 2]>,
    road_queues: Vec<[VecDeque<usize>; 2]>,

    road_waiting: Vec<f64>,
    service_waiting: Vec<f64>,
    last_service_start: Vec<f64>,
    last_wait_start: Vec<f64>,
    last_fill_end: Vec<f64>,
    last_empty_end: Vec<f64>,
    service_available: Vec<f64>,
    serviced: Vec<u32>,
    shovel_waiting: Vec<f64>,
}

impl NetworkForecast {
    /// Creates a forecaster with the default round-robin initial
    /// placement and a stored state at the start of a shift.
    pub fn new(net: Arc<Network>, tgen: Box<dyn TimeDistribution>) -> Self {
        let nt = net.num_trucks;
        let nc = net.num_crushers();
        let ns = net.num_shovels();
        let nr = net.num_roads();
        let mut forecast = Self {
            initial_crushers: (0..nt).map(|tid| tid % nc).collect(),
            stored: StoredState {
                time: 0.0,
                locs: vec![TruckState::Waiting; nt],
                shovel: vec![0; nt],
                crusher: vec![0; nt],
                route: vec![0; nt],
                leg: vec![0; nt],
                progress: vec![0.0; nt],
                lights: vec![TrafficLight::GreenRed; nr],
            },
            ready_state: ReadyState {
                crusher_queues: vec![VecDeque::new(); nc],
                shovel_queues: vec![VecDeque::new(); ns],
                light_queues: (0..nr).map(|_| [VecDeque::new(), VecDeque::new()]).collect(),
                road_queues: (0..nr).map(|_| [VecDeque::new(), VecDeque::new()]).collect(),
                road_priority: vec![[0; 2]; nr],
                ..ReadyState::default()
            },
            is_ready: false,
            num_empties: 0,
            curr_time: 0.0,
            event_queue: EventQueue::new(),
            instant_queue: EventQueue::new(),
            truck_states: vec![TruckState::Waiting; nt],
            assigned_shovel: vec![0; nt],
            assigned_crusher: vec![0; nt],
            assigned_route: vec![0; nt],
            route_leg: vec![0; nt],
            crusher_queues: vec![VecDeque::new(); nc],
            shovel_queues: vec![VecDeque::new(); ns],
            light_queues: (0..nr).map(|_| [VecDeque::new(), VecDeque::new()]).collect(),
            lights: vec![TrafficLight::GreenRed; nr],
            road_available: vec![[0.0; 2]; nr],
            road_priority: vec![[0; 2]; nr],
            road_queues: (0..nr).map(|_| [VecDeque::new(), VecDeque::new()]).collect(),
            road_waiting: vec![0.0; nt],
            service_waiting: vec![0.0; nt],
            last_service_start: vec![0.0; nt],
            last_wait_start: vec![0.0; nt],
            last_fill_end: vec![0.0; ns],
            last_empty_end: vec![0.0; nc],
            service_available: vec![0.0; nt],
            serviced: vec![0; nt],
            shovel_waiting: vec![0.0; ns],
            net,
            tgen,
        };
        forecast.reset();
        forecast
    }

    /// Overrides the crusher each truck starts the shift at.
    pub fn set_initial_crushers(&mut self, initial: Vec<usize>) {
        assert_eq!(initial.len(), self.net.num_trucks);
        self.initial_crushers = initial;
    }

    /// Time of the stored snapshot.
    pub fn stored_time(&self) -> f64 {
        self.stored.time
    }

    /// Resets the stored state to the start of a shift: every truck
    /// waiting at its initial crusher, all lights green on side 0.
    pub fn reset(&mut self) {
        self.stored.time = 0.0;
        for tid in 0..self.net.num_trucks {
            self.stored.locs[tid] = TruckState::Waiting;
            let crusher = self.initial_crushers[tid];
            self.stored.crusher[tid] = crusher;
            let route = self.net.routes_from_crusher(crusher)[0];
            self.stored.route[tid] = route;
            self.stored.shovel[tid] = self.net.routes[route].shovel;
            self.stored.leg[tid] = 0;
            self.stored.progress[tid] = 0.0;
        }
        for light in &mut self.stored.lights {
            *light = TrafficLight::GreenRed;
        }
        self.is_ready = false;
    }

    /// Folds one emitted transition into the stored state.
    pub fn record_event(&mut self, change: &StateChange) {
        self.stored.time = change.time();
        let truck = change.truck();
        self.stored.locs[truck] = change.target();
        let route = change.assignment.expect("state change without a route");
        self.stored.route[truck] = route;
        self.stored.leg[truck] = change.leg;
        self.stored.shovel[truck] = self.net.routes[route].shovel;
        self.stored.crusher[truck] = self.net.routes[route].crusher;
        self.stored.progress.copy_from_slice(&change.progress);
        self.is_ready = false;
    }

    /// Folds one traffic-light change into the stored state.
    pub fn record_light(&mut self, road: usize, light: TrafficLight) {
        self.stored.lights[road] = light;
        self.is_ready = false;
    }

    /// Whether the derived queues match the stored state.
    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// Rebuilds the derived queues from the stored state.
    ///
    /// Trucks are replayed in descending progress order (ties by index),
    /// so road and service queues come out in the order the live mine
    /// holds them: for queued trucks the progress value is the waiting
    /// time, which decreases from queue head to tail.
    pub fn ready(&mut self) {
        let nt = self.net.num_trucks;
        let mut order: Vec<usize> = (0..nt).collect();
        order.sort_by(|&a, &b| {
            self.stored.progress[b]
                .total_cmp(&self.stored.progress[a])
                .then(a.cmp(&b))
        });
        let ready = &mut self.ready_state;
        ready.instants.clear();
        ready.timed.clear();
        for queue in &mut ready.crusher_queues {
            queue.clear();
        }
        for queue in &mut ready.shovel_queues {
            queue.clear();
        }
        for road in 0..self.net.num_roads() {
            for dir in 0..2 {
                ready.light_queues[road][dir].clear();
                ready.road_queues[road][dir].clear();
                ready.road_priority[road][dir] = i64::MIN;
            }
        }
        for &tid in &order {
            let route = self.stored.route[tid];
            let leg = self.stored.leg[tid];
            let route_info = &self.net.routes[route];
            let (road, dir) = if leg >= 0 && (leg as usize) < route_info.len() {
                (route_info.roads[leg as usize], route_info.directions[leg as usize])
            } else {
                (usize::MAX, usize::MAX)
            };
            let sid = self.stored.shovel[tid];
            let cid = self.stored.crusher[tid];
            let loc = self.stored.locs[tid];
            match loc {
                TruckState::Waiting
                | TruckState::ApproachingTlOutbound
                | TruckState::ApproachingShovel
                | TruckState::LeavingShovel
                | TruckState::ApproachingTlInbound
                | TruckState::ApproachingCrusher => {
                    // Re-fires as a self-transition so the run re-decides
                    // what happens at this point.
                    ready.instants.push(Transition::new(
                        tid,
                        self.stored.time,
                        loc,
                        loc,
                        priority(&self.net, tid, loc),
                    ));
                }
                TruckState::TravelToShovel => {
                    let target = outbound_travel_target(&self.net, route, leg as usize);
                    ready.timed.push(Transition::new(
                        tid,
                        0.0,
                        TruckState::TravelToShovel,
                        target,
                        ready.road_priority[road][dir],
                    ));
                    ready.road_priority[road][dir] += 1;
                    ready.road_queues[road][dir].push_back(tid);
                }
                TruckState::StoppedAtTlOutbound => {
                    ready.light_queues[road][dir].push_back(tid);
                }
                TruckState::WaitingAtShovel => {
                    ready.shovel_queues[sid].push_back(tid);
                }
                TruckState::Filling => {
                    ready.shovel_queues[sid].push_front(tid);
                    ready.timed.push(Transition::new(
                        tid,
                        0.0,
                        TruckState::Filling,
                        TruckState::LeavingShovel,
                        priority(&self.net, tid, TruckState::LeavingShovel),
                    ));
                }
                TruckState::TravelToCrusher => {
                    let target = inbound_travel_target(&self.net, route, leg as usize);
                    ready.timed.push(Transition::new(
                        tid,
                        0.0,
                        TruckState::TravelToCrusher,
                        target,
                        ready.road_priority[road][1 - dir],
                    ));
                    ready.road_priority[road][1 - dir] += 1;
                    ready.road_queues[road][1 - dir].push_back(tid);
                }
                TruckState::StoppedAtTlInbound => {
                    ready.light_queues[road][1 - dir].push_back(tid);
                }
                TruckState::WaitingAtCrusher => {
                    ready.crusher_queues[cid].push_back(tid);
                }
                TruckState::Emptying => {
                    ready.crusher_queues[cid].push_front(tid);
                    ready.timed.push(Transition::new(
                        tid,
                        0.0,
                        TruckState::Emptying,
                        TruckState::Waiting,
                        priority(&self.net, tid, TruckState::Waiting),
                    ));
                }
                TruckState::Unused => {}
            }
        }
        // Queue heads that were waiting for a service in the snapshot
        // begin their service immediately.
        for sid in 0..self.net.num_shovels() {
            if let Some(&head) = ready.shovel_queues[sid].front() {
                if self.stored.locs[head] == TruckState::WaitingAtShovel {
                    ready.instants.push(Transition::new(
                        head,
                        self.stored.time,
                        TruckState::WaitingAtShovel,
                        TruckState::Filling,
                        priority(&self.net, head, TruckState::Filling),
                    ));
                }
            }
        }
        for cid in 0..self.net.num_crushers() {
            if let Some(&head) = ready.crusher_queues[cid].front() {
                if self.stored.locs[head] == TruckState::WaitingAtCrusher {
                    ready.instants.push(Transition::new(
                        head,
                        self.stored.time,
                        TruckState::WaitingAtCrusher,
                        TruckState::Emptying,
                        priority(&self.net, head, TruckState::Emptying),
                    ));
                }
            }
        }
        ready.timed.sort();
        self.is_ready = true;
    }

    /// Copies the ready state into the running state and re-draws the
    /// durations of partially-completed tasks, scaled by the remaining
    /// fraction. Run before every simulation.
    ///
    /// # Panics
    /// If the stored state changed since the last [`ready`](Self::ready).
    pub fn re_ready(&mut self) {
        assert!(self.is_ready, "stored state changed since ready()");
        let time = self.stored.time;
        self.num_empties = 0;
        self.curr_time = time;
        self.instant_queue.clear();
        self.instant_queue.extend_from(&self.ready_state.instants);
        for tid in 0..self.net.num_trucks {
            self.truck_states[tid] = self.stored.locs[tid];
            self.assigned_shovel[tid] = self.stored.shovel[tid];
            self.assigned_crusher[tid] = self.stored.crusher[tid];
            self.assigned_route[tid] = self.stored.route[tid];
            self.route_leg[tid] = self.stored.leg[tid];
            self.road_waiting[tid] = 0.0;
            self.service_waiting[tid] = 0.0;
            self.last_service_start[tid] = time;
            self.last_wait_start[tid] = time;
            self.service_available[tid] = time;
            self.serviced[tid] = 0;
        }
        for cid in 0..self.net.num_crushers() {
            self.crusher_queues[cid].clone_from(&self.ready_state.crusher_queues[cid]);
            self.last_empty_end[cid] = time;
        }
        for sid in 0..self.net.num_shovels() {
            self.shovel_queues[sid].clone_from(&self.ready_state.shovel_queues[sid]);
            self.last_fill_end[sid] = time;
            self.shovel_waiting[sid] = 0.0;
        }
        let mut road_progress = vec![[1.0f64; 2]; self.net.num_roads()];
        for road in 0..self.net.num_roads() {
            if self.net.roads[road].is_one_lane() {
                for dir in 0..2 {
                    self.light_queues[road][dir].clone_from(&self.ready_state.light_queues[road][dir]);
                }
                self.lights[road] = self.stored.lights[road];
            }
            for dir in 0..2 {
                self.road_available[road][dir] = time;
                self.road_priority[road][dir] = self.ready_state.road_priority[road][dir];
                self.road_queues[road][dir].clone_from(&self.ready_state.road_queues[road][dir]);
            }
        }
        self.event_queue.clear();
        for i in 0..self.ready_state.timed.len() {
            let stored = self.ready_state.timed[i];
            let tid = stored.truck;
            let route = self.assigned_route[tid];
            let leg = self.route_leg[tid];
            let route_info = &self.net.routes[route];
            let (road, dir) = if leg >= 0 && (leg as usize) < route_info.len() {
                (route_info.roads[leg as usize], route_info.directions[leg as usize])
            } else {
                (usize::MAX, usize::MAX)
            };
            let progress = self.stored.progress[tid];
            match stored.source {
                TruckState::TravelToShovel => {
                    if road_progress[road][dir] - progress > EPSILON {
                        let travel = self.net.roads[road].travel;
                        let remaining = self.tgen.sample(travel.mean, travel.sd) * (1.0 - progress);
                        self.road_available[road][dir] =
                            self.road_available[road][dir].max(self.curr_time + remaining);
                    }
                    road_progress[road][dir] = progress;
                    self.event_queue.push(Transition::new(
                        tid,
                        self.road_available[road][dir],
                        stored.source,
                        stored.target,
                        stored.priority,
                    ));
                    self.route_leg[tid] += 1;
                }
                TruckState::Filling => {
                    let fill = self.net.shovels[self.assigned_shovel[tid]];
                    let finish =
                        self.curr_time + self.tgen.sample(fill.mean, fill.sd) * (1.0 - progress);
                    self.event_queue.push(Transition::new(
                        tid,
                        finish,
                        stored.source,
                        stored.target,
                        stored.priority,
                    ));
                }
                TruckState::TravelToCrusher => {
                    let inbound = 1 - dir;
                    if road_progress[road][inbound] - progress > EPSILON {
                        let travel = self.net.roads[road].travel;
                        let remaining = self.tgen.sample(travel.mean, travel.sd)
                            * (1.0 - progress)
                            * self.net.full_slowdown;
                        self.road_available[road][inbound] =
                            self.road_available[road][inbound].max(self.curr_time + remaining);
                    }
                    road_progress[road][inbound] = progress;
                    self.event_queue.push(Transition::new(
                        tid,
                        self.road_available[road][inbound],
                        stored.source,
                        stored.target,
                        stored.priority,
                    ));
                    self.route_leg[tid] -= 1;
                }
                TruckState::Emptying => {
                    let empty = self.net.crushers[self.assigned_crusher[tid]];
                    let finish =
                        self.curr_time + self.tgen.sample(empty.mean, empty.sd) * (1.0 - progress);
                    self.event_queue.push(Transition::new(
                        tid,
                        finish,
                        stored.source,
                        stored.target,
                        stored.priority,
                    ));
                }
                other => panic!("stored timed event has invalid source {other:?}"),
            }
        }
    }

    /// Runs forward until `runtime`, or until the routing capability
    /// answers [`RouteChoice::Stop`] or every truck is parked.
    pub fn simulate(
        &mut self,
        runtime: f64,
        routing: &mut dyn FnMut(RoutingRequest) -> RouteChoice,
    ) {
        while self.has_next() && self.peek_next().is_some_and(|t| t.time <= runtime) {
            if !self.single_event(routing) {
                break;
            }
        }
    }

    fn single_event(&mut self, routing: &mut dyn FnMut(RoutingRequest) -> RouteChoice) -> bool {
        let next = self.pop_next().unwrap();
        self.curr_time = next.time;
        let tid = next.truck;
        if next.source != self.truck_states[tid] {
            panic!(
                "transition {:?} -> {:?} fired while truck {tid} is in {:?}",
                next.source, next.target, self.truck_states[tid]
            );
        }
        match next.target {
            TruckState::Waiting => {
                let cid = self.assigned_crusher[tid];
                if next.source == TruckState::Emptying {
                    self.crusher_queues[cid].pop_front();
                    if let Some(&head) = self.crusher_queues[cid].front() {
                        self.push_instant(head, TruckState::WaitingAtCrusher, TruckState::Emptying);
                    }
                    self.num_empties += 1;
                    self.serviced[tid] += 1;
                    self.last_empty_end[cid] = self.curr_time;
                }
                match routing(self.request(tid)) {
                    RouteChoice::Stop => return false,
                    RouteChoice::Park => {
                        self.push_instant(tid, next.target, TruckState::Unused);
                    }
                    RouteChoice::Route(route) => {
                        if self.net.routes[route].crusher != cid {
                            panic!("route {route} does not leave crusher {cid}");
                        }
                        self.assigned_route[tid] = route;
                        self.assigned_shovel[tid] = self.net.routes[route].shovel;
                        let first_road = self.net.routes[route].roads[0];
                        let next_state = if self.net.roads[first_road].is_one_lane() {
                            TruckState::ApproachingTlOutbound
                        } else {
                            TruckState::TravelToShovel
                        };
                        self.route_leg[tid] = 0;
                        self.push_instant(tid, next.target, next_state);
                    }
                }
            }
            TruckState::TravelToShovel => {
                let road = self.current_road(tid);
                if !self.net.roads[road].is_one_lane() {
                    self.cleared_road(tid, true);
                }
                let travel = self.net.roads[road].travel;
                let travel_time = self.tgen.sample(travel.mean, travel.sd);
                let arrival = self.prevent_collisions(travel_time, tid, true);
                self.event_queue.push(arrival);
                self.route_leg[tid] += 1;
            }
            TruckState::ApproachingTlOutbound => {
                self.cleared_road(tid, true);
                self.approach_light(tid, true);
            }
            TruckState::StoppedAtTlOutbound => {
                self.last_wait_start[tid] = self.curr_time;
                let road = self.current_road(tid);
                self.check_lights(road);
            }
            TruckState::ApproachingShovel => {
                self.cleared_road(tid, true);
                let sid = self.assigned_shovel[tid];
                let next_state = if self.shovel_queues[sid].is_empty() {
                    TruckState::Filling
                } else {
                    TruckState::WaitingAtShovel
                };
                self.shovel_queues[sid].push_back(tid);
                self.push_instant(tid, next.target, next_state);
                self.last_wait_start[tid] = self.curr_time;
            }
            TruckState::WaitingAtShovel | TruckState::WaitingAtCrusher => {}
            TruckState::Filling => {
                let sid = self.assigned_shovel[tid];
                let fill = self.net.shovels[sid];
                let fill_time = self.tgen.sample(fill.mean, fill.sd);
                self.event_queue.push(Transition::new(
                    tid,
                    self.curr_time + fill_time,
                    next.target,
                    TruckState::LeavingShovel,
                    priority(&self.net, tid, TruckState::LeavingShovel),
                ));
                self.last_service_start[tid] = self.curr_time;
                self.service_waiting[tid] += self.curr_time - self.last_wait_start[tid];
                self.service_available[tid] = self.last_fill_end[sid];
                self.shovel_waiting[sid] += self.curr_time - self.last_fill_end[sid];
            }
            TruckState::LeavingShovel => {
                let sid = self.assigned_shovel[tid];
                if next.source == TruckState::Filling {
                    self.shovel_queues[sid].pop_front();
                    if let Some(&head) = self.shovel_queues[sid].front() {
                        self.push_instant(head, TruckState::WaitingAtShovel, TruckState::Filling);
                    }
                    self.serviced[tid] += 1;
                    self.last_fill_end[sid] = self.curr_time;
                }
                match routing(self.request(tid)) {
                    RouteChoice::Stop => return false,
                    RouteChoice::Park => {
                        self.push_instant(tid, next.target, TruckState::Unused);
                    }
                    RouteChoice::Route(route) => {
                        if self.net.routes[route].shovel != sid {
                            panic!("route {route} does not leave shovel {sid}");
                        }
                        self.assigned_route[tid] = route;
                        self.assigned_crusher[tid] = self.net.routes[route].crusher;
                        let leg = self.net.routes[route].len() - 1;
                        let last_road = self.net.routes[route].roads[leg];
                        let next_state = if self.net.roads[last_road].is_one_lane() {
                            TruckState::ApproachingTlInbound
                        } else {
                            TruckState::TravelToCrusher
                        };
                        self.route_leg[tid] = leg as isize;
                        self.push_instant(tid, next.target, next_state);
                    }
                }
            }
            TruckState::TravelToCrusher => {
                let road = self.current_road(tid);
                if !self.net.roads[road].is_one_lane() {
                    self.cleared_road(tid, false);
                }
                let travel = self.net.roads[road].travel;
                let travel_time = self.tgen.sample(travel.mean, travel.sd) * self.net.full_slowdown;
                let arrival = self.prevent_collisions(travel_time, tid, false);
                self.event_queue.push(arrival);
                self.route_leg[tid] -= 1;
            }
            TruckState::ApproachingTlInbound => {
                self.cleared_road(tid, false);
                self.approach_light(tid, false);
            }
            TruckState::StoppedAtTlInbound => {
                self.last_wait_start[tid] = self.curr_time;
                let road = self.current_road(tid);
                self.check_lights(road);
            }
            TruckState::ApproachingCrusher => {
                self.cleared_road(tid, false);
                let cid = self.assigned_crusher[tid];
                let next_state = if self.crusher_queues[cid].is_empty() {
                    TruckState::Emptying
                } else {
                    TruckState::WaitingAtCrusher
                };
                self.crusher_queues[cid].push_back(tid);
                self.push_instant(tid, next.target, next_state);
                self.last_wait_start[tid] = self.curr_time;
            }
            TruckState::Emptying => {
                let cid = self.assigned_crusher[tid];
                let empty = self.net.crushers[cid];
                let empty_time = self.tgen.sample(empty.mean, empty.sd);
                self.event_queue.push(Transition::new(
                    tid,
                    self.curr_time + empty_time,
                    next.target,
                    TruckState::Waiting,
                    priority(&self.net, tid, TruckState::Waiting),
                ));
                self.last_service_start[tid] = self.curr_time;
                self.service_waiting[tid] += self.curr_time - self.last_wait_start[tid];
                self.service_available[tid] = self.last_empty_end[cid];
            }
            TruckState::Unused => {}
        }
        self.truck_states[tid] = next.target;
        true
    }

    fn request(&self, tid: usize) -> RoutingRequest {
        RoutingRequest {
            truck: tid,
            time: self.curr_time,
            location: self.truck_states[tid],
            crusher: self.assigned_crusher[tid],
            shovel: self.assigned_shovel[tid],
            waiting_time: self.total_waiting_time(tid),
        }
    }

    fn current_road(&self, tid: usize) -> usize {
        let route = &self.net.routes[self.assigned_route[tid]];
        route.roads[self.route_leg[tid] as usize]
    }

    fn approach_light(&mut self, tid: usize, outbound: bool) {
        let route = self.assigned_route[tid];
        let leg = self.route_leg[tid] as usize;
        let road = self.net.routes[route].roads[leg];
        assert!(
            self.net.roads[road].is_one_lane(),
            "truck {tid} arrived at lights on two-lane road {road}"
        );
        let route_dir = self.net.routes[route].directions[leg];
        let side = if outbound { route_dir } else { 1 - route_dir };
        let (stopped, travel, source) = if outbound {
            (
                TruckState::StoppedAtTlOutbound,
                TruckState::TravelToShovel,
                TruckState::ApproachingTlOutbound,
            )
        } else {
            (
                TruckState::StoppedAtTlInbound,
                TruckState::TravelToCrusher,
                TruckState::ApproachingTlInbound,
            )
        };
        let green_side = match self.lights[road] {
            TrafficLight::GreenRed => Some(0),
            TrafficLight::RedGreen => Some(1),
            TrafficLight::YellowRed | TrafficLight::RedYellow => None,
        };
        match green_side {
            Some(green) if green == side => self.push_instant(tid, source, travel),
            Some(green) => {
                self.push_instant(tid, source, stopped);
                self.light_queues[road][side].push_back(tid);
                self.lights[road] = if green == 0 {
                    TrafficLight::YellowRed
                } else {
                    TrafficLight::RedYellow
                };
            }
            None => {
                self.push_instant(tid, source, stopped);
                self.light_queues[road][side].push_back(tid);
            }
        }
    }

    fn check_lights(&mut self, road: usize) {
        if !self.road_queues[road][0].is_empty() || !self.road_queues[road][1].is_empty() {
            return;
        }
        let side = match self.lights[road] {
            TrafficLight::YellowRed => {
                self.lights[road] = TrafficLight::RedGreen;
                if !self.light_queues[road][0].is_empty() {
                    self.lights[road] = TrafficLight::RedYellow;
                }
                1
            }
            TrafficLight::RedYellow => {
                self.lights[road] = TrafficLight::GreenRed;
                if !self.light_queues[road][1].is_empty() {
                    self.lights[road] = TrafficLight::YellowRed;
                }
                0
            }
            _ => return,
        };
        while let Some(front) = self.light_queues[road][side].pop_front() {
            self.road_priority[road][side] += 1;
            let (source, target) = match self.truck_states[front] {
                TruckState::ApproachingTlInbound | TruckState::StoppedAtTlInbound => {
                    (TruckState::StoppedAtTlInbound, TruckState::TravelToCrusher)
                }
                TruckState::ApproachingTlOutbound | TruckState::StoppedAtTlOutbound => {
                    (TruckState::StoppedAtTlOutbound, TruckState::TravelToShovel)
                }
                other => panic!("truck {front} queued at a light while in {other:?}"),
            };
            self.instant_queue.push(Transition::new(
                front,
                self.curr_time,
                source,
                target,
                self.road_priority[road][side],
            ));
            if source == self.truck_states[front] {
                self.road_waiting[front] += self.curr_time - self.last_wait_start[front];
            }
        }
    }

    fn cleared_road(&mut self, tid: usize, outbound: bool) {
        let route = &self.net.routes[self.assigned_route[tid]];
        let start: isize = if outbound { 0 } else { route.len() as isize - 1 };
        let leg = self.route_leg[tid];
        if leg == start {
            return;
        }
        let off: isize = if outbound { -1 } else { 1 };
        let prev = (leg + off) as usize;
        let dir = route.directions[prev];
        let travelled = if outbound { dir } else { 1 - dir };
        let prev_road = route.roads[prev];
        let front = self.road_queues[prev_road][travelled].pop_front();
        if front != Some(tid) {
            panic!("truck {tid} cleared road {prev_road} ahead of {front:?}");
        }
        if self.net.roads[prev_road].is_one_lane() {
            self.check_lights(prev_road);
        }
    }

    fn prevent_collisions(&mut self, travel_time: f64, tid: usize, outbound: bool) -> Transition {
        let route_id = self.assigned_route[tid];
        let route = &self.net.routes[route_id];
        let leg = self.route_leg[tid] as usize;
        let road = route.roads[leg];
        let dir = route.directions[leg];
        let travelled = if outbound { dir } else { 1 - dir };
        let actual = (self.curr_time + travel_time).max(self.road_available[road][travelled]);
        self.road_available[road][travelled] = actual;
        let (travel, target) = if outbound {
            (
                TruckState::TravelToShovel,
                outbound_travel_target(&self.net, route_id, leg),
            )
        } else {
            (
                TruckState::TravelToCrusher,
                inbound_travel_target(&self.net, route_id, leg),
            )
        };
        self.road_priority[road][travelled] += 1;
        self.road_queues[road][travelled].push_back(tid);
        Transition::new(tid, actual, travel, target, self.road_priority[road][travelled])
    }

    fn push_instant(&mut self, tid: usize, source: TruckState, target: TruckState) {
        self.instant_queue.push(Transition::new(
            tid,
            self.curr_time,
            source,
            target,
            priority(&self.net, tid, target),
        ));
    }

    fn pop_next(&mut self) -> Option<Transition> {
        if self.instant_queue.is_empty() {
            self.event_queue.pop()
        } else {
            self.instant_queue.pop()
        }
    }

    fn peek_next(&self) -> Option<&Transition> {
        if self.instant_queue.is_empty() {
            self.event_queue.peek()
        } else {
            self.instant_queue.peek()
        }
    }

    fn has_next(&self) -> bool {
        if !self.instant_queue.is_empty() || !self.event_queue.is_empty() {
            return true;
        }
        for (tid, &state) in self.truck_states.iter().enumerate() {
            assert!(
                state == TruckState::Unused,
                "no events scheduled but truck {tid} is active in {state:?}"
            );
        }
        false
    }

    // -- per-run statistics ------------------------------------------------

    /// Completed dump cycles in the current run.
    pub fn num_empties(&self) -> u32 {
        self.num_empties
    }

    /// Total waiting time (roads and services) of a truck this run, or
    /// [`UNSERVICED`] if it completed no service.
    pub fn total_waiting_time(&self, tid: usize) -> f64 {
        if self.serviced[tid] > 0 {
            self.road_waiting[tid] + self.service_waiting[tid]
        } else {
            UNSERVICED
        }
    }

    /// Start time of a truck's most recent service this run, or
    /// [`UNSERVICED`].
    pub fn last_service_start(&self, tid: usize) -> f64 {
        if self.serviced[tid] > 0 {
            self.last_service_start[tid]
        } else {
            UNSERVICED
        }
    }

    /// When the machine of a truck's most recent service became free
    /// before that service, or [`UNSERVICED`].
    pub fn service_available_time(&self, tid: usize) -> f64 {
        if self.serviced[tid] > 0 {
            self.service_available[tid]
        } else {
            UNSERVICED
        }
    }

    /// Total idle time of a shovel this run.
    pub fn shovel_waiting_time(&self, sid: usize) -> f64 {
        self.shovel_waiting[sid]
    }
}

fn priority(net: &Network, tid: usize, dest: TruckState) -> i64 {
    let nt = net.num_trucks as i64;
    let band = match dest {
        TruckState::StoppedAtTlOutbound | TruckState::StoppedAtTlInbound => 0,
        TruckState::TravelToShovel | TruckState::TravelToCrusher => 1,
        TruckState::WaitingAtShovel
        | TruckState::Filling
        | TruckState::WaitingAtCrusher
        | TruckState::Emptying => 2,
        TruckState::ApproachingTlOutbound | TruckState::ApproachingTlInbound => 3,
        TruckState::Waiting | TruckState::LeavingShovel => 4,
        TruckState::ApproachingShovel | TruckState::ApproachingCrusher => 5,
        TruckState::Unused => return -1,
    };
    band * nt + tid as i64
}

fn outbound_travel_target(net: &Network, route: usize, leg: usize) -> TruckState {
    let route = &net.routes[route];
    if leg == route.len() - 1 {
        TruckState::ApproachingShovel
    } else if net.roads[route.roads[leg + 1]].is_one_lane() {
        TruckState::ApproachingTlOutbound
    } else {
        TruckState::TravelToShovel
    }
}

fn inbound_travel_target(net: &Network, route: usize, leg: usize) -> TruckState {
    let route = &net.routes[route];
    if leg == 0 {
        TruckState::ApproachingCrusher
    } else if net.roads[route.roads[leg - 1]].is_one_lane() {
        TruckState::ApproachingTlInbound
    } else {
        TruckState::TravelToCrusher
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{RouteChoice, RouteController};
    use crate::model::{MeanSd, Road, RoadKind, Route, SimpleShovel};
    use crate::sim::NetworkSimulator;
    use crate::times::MeanTimes;

    struct SingleRoute;

    impl RouteController for SingleRoute {
        fn next_route(&mut self, _truck: usize) -> RouteChoice {
            RouteChoice::Route(0)
        }
        fn record(&mut self, _change: &StateChange) {}
        fn record_light(&mut self, _road: usize, _light: TrafficLight) {}
        fn reset(&mut self) {}
    }

    /// Controller that mirrors the live run into a forecaster.
    struct Observer {
        forecast: NetworkForecast,
    }

    impl RouteController for Observer {
        fn next_route(&mut self, _truck: usize) -> RouteChoice {
            RouteChoice::Route(0)
        }
        fn record(&mut self, change: &StateChange) {
            self.forecast.record_event(change);
        }
        fn record_light(&mut self, road: usize, light: TrafficLight) {
            self.forecast.record_light(road, light);
        }
        fn reset(&mut self) {
            self.forecast.reset();
        }
    }

    fn one_road_net(num_trucks: usize, kind: RoadKind) -> Arc<Network> {
        Arc::new(
            Network::new(
                num_trucks,
                1.2,
                vec![MeanSd::new(1.0, 0.0)],
                vec![MeanSd::new(2.0, 0.0)],
                vec![Road {
                    travel: MeanSd::new(5.0, 0.0),
                    kind,
                }],
                vec![Route {
                    roads: vec![0],
                    directions: vec![0],
                    crusher: 0,
                    shovel: 0,
                }],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_simple_forecast_matches_deterministic_cycle() {
        let net = SimpleNetwork {
            num_trucks: 2,
            empty: MeanSd::new(1.0, 0.0),
            shovels: vec![SimpleShovel {
                travel: MeanSd::new(5.0, 0.0),
                fill: MeanSd::new(2.0, 0.0),
            }],
        };
        let mut forecast = SimpleForecast::new(net, Box::new(MeanTimes));
        for _ in 0..3 {
            forecast.re_ready();
            forecast.simulate(30.0, &mut |_tid| 0);
            assert_eq!(forecast.num_empties(), 4);
        }
    }

    #[test]
    fn test_forecast_from_shift_start_matches_shift_simulator() {
        let net = one_road_net(2, RoadKind::TwoLane);
        let mut con = SingleRoute;
        let mut sim = NetworkSimulator::new(net.clone(), Box::new(MeanTimes));
        sim.reset(&mut con);
        sim.simulate(100.0, &mut con);
        let expected = sim.empties();

        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.ready();
        forecast.re_ready();
        forecast.simulate(100.0, &mut |_req| RouteChoice::Route(0));
        assert_eq!(forecast.num_empties(), expected);
    }

    #[test]
    fn test_re_ready_is_repeatable() {
        let net = one_road_net(3, RoadKind::TwoLane);
        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.ready();
        let mut counts = Vec::new();
        for _ in 0..3 {
            forecast.re_ready();
            forecast.simulate(200.0, &mut |_req| RouteChoice::Route(0));
            counts.push(forecast.num_empties());
        }
        assert_eq!(counts[0], counts[1]);
        assert_eq!(counts[1], counts[2]);
    }

    #[test]
    fn test_record_event_then_resume_matches_uninterrupted_run() {
        // Observe a live run to some midpoint, forecast the rest, and
        // compare against the never-interrupted run. Deterministic
        // times make the match exact.
        for kind in [RoadKind::TwoLane, RoadKind::OneLane] {
            for &halfway in &[17.0, 41.0, 63.5] {
                let runtime = 150.0;
                let net = one_road_net(3, kind);

                let full = {
                    let mut con = SingleRoute;
                    let mut sim = NetworkSimulator::new(net.clone(), Box::new(MeanTimes));
                    sim.reset(&mut con);
                    sim.simulate(runtime, &mut con);
                    sim.empties()
                };

                let mut observer = Observer {
                    forecast: NetworkForecast::new(net.clone(), Box::new(MeanTimes)),
                };
                let mut sim = NetworkSimulator::new(net, Box::new(MeanTimes));
                sim.reset(&mut observer);
                sim.simulate(halfway, &mut observer);
                let so_far = sim.empties();

                let mut forecast = observer.forecast;
                forecast.ready();
                forecast.re_ready();
                forecast.simulate(runtime, &mut |_req| RouteChoice::Route(0));
                assert_eq!(
                    so_far + forecast.num_empties(),
                    full,
                    "resume mismatch at {halfway} on {kind:?}"
                );
            }
        }
    }

    #[test]
    fn test_park_takes_truck_out_of_use() {
        let net = one_road_net(1, RoadKind::TwoLane);
        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.ready();
        forecast.re_ready();
        forecast.simulate(1000.0, &mut |_req| RouteChoice::Park);
        // The lone truck parks at its first dispatch; nothing happens.
        assert_eq!(forecast.num_empties(), 0);
    }

    #[test]
    fn test_stop_terminates_run() {
        let net = one_road_net(1, RoadKind::TwoLane);
        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.ready();
        forecast.re_ready();
        let mut calls = 0;
        forecast.simulate(1000.0, &mut |_req| {
            calls += 1;
            RouteChoice::Stop
        });
        assert_eq!(calls, 1);
        assert_eq!(forecast.num_empties(), 0);
    }

    #[test]
    fn test_waiting_time_statistics() {
        // Two trucks, one shovel: somebody waits for the first fill.
        let net = one_road_net(2, RoadKind::TwoLane);
        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.ready();
        forecast.re_ready();
        forecast.simulate(100.0, &mut |_req| RouteChoice::Route(0));
        let waits: Vec<f64> = (0..2).map(|t| forecast.total_waiting_time(t)).collect();
        assert!(waits.iter().any(|&w| w > 0.0));
        assert!(waits.iter().all(|&w| w < UNSERVICED));
        assert!(forecast.shovel_waiting_time(0) >= 0.0);
    }

    #[test]
    fn test_unserviced_statistics_flagged() {
        let net = one_road_net(1, RoadKind::TwoLane);
        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.ready();
        forecast.re_ready();
        // Too short for the truck to reach the shovel.
        forecast.simulate(2.0, &mut |_req| RouteChoice::Route(0));
        assert_eq!(forecast.total_waiting_time(0), UNSERVICED);
        assert_eq!(forecast.last_service_start(0), UNSERVICED);
        assert_eq!(forecast.service_available_time(0), UNSERVICED);
    }

    #[test]
    #[should_panic(expected = "stored state changed")]
    fn test_re_ready_requires_ready() {
        let net = one_road_net(1, RoadKind::TwoLane);
        let mut forecast = NetworkForecast::new(net, Box::new(MeanTimes));
        forecast.reset();
        forecast.re_ready();
    }
}
