//! Events and event queues of the truck state machine.

use std::cmp::Ordering;
use std::collections::VecDeque;

/// State of a truck in the timed-automaton model.
///
/// A truck is always in exactly one state, while holding a scheduled
/// transition into another (possibly identical) state. Traffic-light
/// states only occur on routed networks; `Unused` only when a controller
/// parks a truck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruckState {
    /// Empty at a crusher, awaiting dispatch.
    Waiting,
    /// Travelling empty towards a shovel.
    TravelToShovel,
    /// Reached a one-lane road on the outbound leg; about to read the
    /// light.
    ApproachingTlOutbound,
    /// Held at a red or yellow light on the outbound leg.
    StoppedAtTlOutbound,
    /// Arrived at the shovel; about to join its queue.
    ApproachingShovel,
    /// Queued at a busy shovel.
    WaitingAtShovel,
    /// Being loaded.
    Filling,
    /// Loaded; awaiting a return assignment.
    LeavingShovel,
    /// Travelling loaded towards a crusher.
    TravelToCrusher,
    /// Reached a one-lane road on the inbound leg; about to read the
    /// light.
    ApproachingTlInbound,
    /// Held at a red or yellow light on the inbound leg.
    StoppedAtTlInbound,
    /// Arrived at the crusher; about to join its queue.
    ApproachingCrusher,
    /// Queued at a busy crusher.
    WaitingAtCrusher,
    /// Being emptied.
    Emptying,
    /// Taken out of service by the controller.
    Unused,
}

/// State of the two-sided traffic light guarding a one-lane road.
///
/// The first letter is side 0, the second side 1. Green grants passage;
/// yellow admits no new entries while trucks clear the road; red denies
/// passage. Both-red is never produced by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficLight {
    /// Side 0 green, side 1 red.
    GreenRed,
    /// Side 0 yellow (clearing), side 1 red.
    YellowRed,
    /// Side 0 red, side 1 green.
    RedGreen,
    /// Side 0 red, side 1 yellow (clearing).
    RedYellow,
}

/// A scheduled state transition of one truck.
///
/// Transitions order by time, then by priority. Priorities define the
/// canonical interleaving of simultaneous events; travel completions use
/// per-road monotonic counters instead of state bands so arrivals replay
/// in departure order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// Transitioning truck.
    pub truck: usize,
    /// Scheduled firing time.
    pub time: f64,
    /// State the truck must be in when the transition fires.
    pub source: TruckState,
    /// State the truck moves to.
    pub target: TruckState,
    /// Tie-break priority (smaller fires first).
    pub priority: i64,
}

impl Transition {
    pub fn new(truck: usize, time: f64, source: TruckState, target: TruckState, priority: i64) -> Self {
        Self {
            truck,
            time,
            source,
            target,
            priority,
        }
    }
}

impl Eq for Transition {}

impl Ord for Transition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

impl PartialOrd for Transition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The snapshot handed to a controller after every transition.
///
/// Carries the transition itself, the transitioning truck's assignment,
/// and a progress value for every truck: the fractional completion of the
/// current timed task for moving or serviced trucks, or the elapsed
/// waiting time for stationary ones.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// The transition that just fired.
    pub transition: Transition,
    /// Assignment of the transitioning truck: the shovel on simple
    /// networks, the route on routed networks. `None` before the first
    /// dispatch on simple networks.
    pub assignment: Option<usize>,
    /// Position in the route's road list (routed networks only; may be
    /// one past either end while a truck turns around).
    pub leg: isize,
    /// Per-truck progress values.
    pub progress: Vec<f64>,
}

impl StateChange {
    /// Current simulation time (the transition's firing time).
    pub fn time(&self) -> f64 {
        self.transition.time
    }

    /// The transitioning truck.
    pub fn truck(&self) -> usize {
        self.transition.truck
    }

    /// The transitioning truck's new state.
    pub fn target(&self) -> TruckState {
        self.transition.target
    }
}

/// An insertion-sorted priority queue.
///
/// The resident population is a handful of transitions per truck, so an
/// ordered `VecDeque` beats a heap here and keeps equal-key behaviour
/// explicit: a new element is placed before the first existing element
/// that is not smaller than it.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    queue: VecDeque<Transition>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a transition at its ordered position.
    pub fn push(&mut self, transition: Transition) {
        let at = self
            .queue
            .iter()
            .position(|queued| transition <= *queued)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, transition);
    }

    /// Removes and returns the earliest transition.
    pub fn pop(&mut self) -> Option<Transition> {
        self.queue.pop_front()
    }

    /// Returns the earliest transition without removing it.
    pub fn peek(&self) -> Option<&Transition> {
        self.queue.front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Inserts every transition of a slice.
    pub fn extend_from(&mut self, transitions: &[Transition]) {
        for &t in transitions {
            self.push(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(truck: usize, time: f64, priority: i64) -> Transition {
        Transition::new(truck, time, TruckState::Waiting, TruckState::Waiting, priority)
    }

    #[test]
    fn test_orders_by_time_then_priority() {
        let mut q = EventQueue::new();
        q.push(t(0, 2.0, 0));
        q.push(t(1, 1.0, 5));
        q.push(t(2, 1.0, 3));
        assert_eq!(q.pop().unwrap().truck, 2);
        assert_eq!(q.pop().unwrap().truck, 1);
        assert_eq!(q.pop().unwrap().truck, 0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut q = EventQueue::new();
        q.push(t(0, 1.0, 0));
        assert_eq!(q.peek().unwrap().truck, 0);
        assert!(!q.is_empty());
    }

    #[test]
    fn test_negative_priorities_first() {
        // Road counters start far below the state bands.
        let mut q = EventQueue::new();
        q.push(t(0, 1.0, 4));
        q.push(t(1, 1.0, i64::MIN + 7));
        assert_eq!(q.pop().unwrap().truck, 1);
    }

    #[test]
    fn test_transition_ordering_is_total() {
        assert!(t(0, 1.0, 1) < t(0, 1.0, 2));
        assert!(t(0, 0.5, 9) < t(0, 1.0, 0));
        assert_eq!(t(0, 1.0, 1).cmp(&t(1, 1.0, 1)), Ordering::Equal);
    }
}
