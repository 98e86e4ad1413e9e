//! Shift simulator for simple networks.

use std::collections::VecDeque;

use log::trace;

use super::event::{EventQueue, StateChange, Transition, TruckState};
use super::FULL_SLOWDOWN;
use crate::dispatch::Controller;
use crate::model::SimpleNetwork;
use crate::times::TimeDistribution;

/// Simulates entire shifts on a single-crusher network, delegating
/// routing to a [`Controller`].
///
/// Each shovel is reached by its own two-lane road, so road state is
/// indexed by shovel; direction 0 is the outbound (empty) side. The
/// controller is borrowed per call, so the same policy can drive many
/// simulators or be inspected between shifts.
pub struct SimpleSimulator {
    net: SimpleNetwork,
    tgen: Box<dyn TimeDistribution>,

    initialised: bool,
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

    active: f64,
    current_activity: f64,
}

impl SimpleSimulator {
    /// Creates a simulator over the given network and duration source.
    /// [`reset`](Self::reset) must run before the first shift.
    pub fn new(net: SimpleNetwork, tgen: Box<dyn TimeDistribution>) -> Self {
        let nt = net.num_trucks;
        let ns = net.num_shovels();
        Self {
            net,
            tgen,
            initialised: false,
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
            active: 0.0,
            current_activity: 0.0,
        }
    }

    /// Resets the simulator and the controller to the start of a shift:
    /// clock at zero, every truck empty and waiting at the crusher.
    pub fn reset(&mut self, con: &mut dyn Controller) {
        self.num_empties = 0;
        self.curr_time = 0.0;
        self.active = 0.0;
        self.current_activity = 0.0;
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
            for dir in 0..2 {
                self.road_priority[sid][dir] = i64::MIN;
                self.road_available[sid][dir] = 0.0;
                self.road_queues[sid][dir].clear();
            }
        }
        con.reset();
        self.initialised = true;
    }

    /// Advances the simulation until the next event would fire after
    /// `runtime`.
    pub fn simulate(&mut self, runtime: f64, con: &mut dyn Controller) {
        assert!(self.initialised, "simulator not reset before simulate");
        while self.peek_next().is_some_and(|t| t.time <= runtime) {
            self.single_event(con);
        }
    }

    /// Completed dump cycles so far.
    pub fn empties(&self) -> u32 {
        self.num_empties
    }

    /// Fraction of a shift of the given length the crusher spent
    /// emptying.
    pub fn crusher_active(&self, runtime: f64) -> f64 {
        self.active / runtime
    }

    fn single_event(&mut self, con: &mut dyn Controller) {
        let next = self.pop_next().expect("no events scheduled despite active trucks");
        self.curr_time = next.time;
        let tid = next.truck;
        let change = self.state_change(&next);
        con.record(&change);
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
                    self.active += self.current_activity;
                    trace!("{} empties at {}", self.num_empties, self.curr_time);
                }
                let shovel = con.next_shovel(tid);
                assert!(
                    shovel < self.net.num_shovels(),
                    "controller dispatched truck {tid} to unknown shovel {shovel}"
                );
                self.assigned_shovel[tid] = Some(shovel);
                trace!("truck {tid} dispatched to shovel {shovel} at {}", self.curr_time);
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
                self.pop_road_head(sid, 0, tid);
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
                self.pop_road_head(sid, 1, tid);
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
                self.current_activity = empty_time;
                self.intended_arrival[tid] = self.curr_time + empty_time;
            }
            other => panic!("truck {tid} entered illegal state {other:?}"),
        }
        self.truck_states[tid] = next.target;
    }

    /// Priority bands for instantaneous and service transitions. Travel
    /// completions never come through here; they carry road-order
    /// counters.
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

    /// Schedules a road completion, delaying it behind any slower truck
    /// ahead so arrivals replay in departure order.
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

    fn pop_road_head(&mut self, sid: usize, dir: usize, tid: usize) {
        let front = self.road_queues[sid][dir].pop_front();
        if front != Some(tid) {
            panic!("truck {tid} left road {sid}/{dir} ahead of {front:?}");
        }
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

    /// Builds the controller snapshot for a transition about to fire.
    ///
    /// Trucks on a road report the minimum fractional progress of
    /// themselves and everyone ahead of them (the convoy constraint);
    /// serviced trucks report their service fraction; queued trucks
    /// report elapsed waiting time.
    fn state_change(&self, next: &Transition) -> StateChange {
        let nt = self.net.num_trucks;
        let mut progress = vec![0.0; nt];
        let mut on_road = vec![false; nt];
        for sid in 0..self.net.num_shovels() {
            for dir in 0..2 {
                let mut min_progress = 1.0f64;
                for &t in &self.road_queues[sid][dir] {
                    let intended = (self.curr_time - self.arrival_time[t])
                        / (self.intended_arrival[t] - self.arrival_time[t]);
                    min_progress = min_progress.min(intended);
                    progress[t] = min_progress;
                    on_road[t] = true;
                }
            }
        }
        for tid in 0..nt {
            if tid == next.truck {
                continue;
            }
            match self.truck_states[tid] {
                TruckState::Waiting
                | TruckState::ApproachingShovel
                | TruckState::LeavingShovel
                | TruckState::ApproachingCrusher => {}
                TruckState::TravelToShovel | TruckState::TravelToCrusher => {
                    assert!(on_road[tid], "road queues out of sync with truck {tid}");
                }
                TruckState::Filling | TruckState::Emptying => {
                    progress[tid] = (self.curr_time - self.arrival_time[tid])
                        / (self.intended_arrival[tid] - self.arrival_time[tid]);
                }
                TruckState::WaitingAtShovel | TruckState::WaitingAtCrusher => {
                    progress[tid] = self.curr_time - self.arrival_time[tid];
                }
                other => panic!("truck {tid} is in illegal state {other:?}"),
            }
        }
        StateChange {
            transition: *next,
            assignment: self.assigned_shovel[next.truck],
            leg: 0,
            progress,
        }
    }
}
