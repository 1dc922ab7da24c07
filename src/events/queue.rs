//! Event queue and simulation clock.
//!
//! The queue removes events in `(time, type rank, creation sequence)` order.
//! Removing an event advances the clock to its time. The clock never moves
//! backwards: handlers may only schedule events at or after it.
//!
//! Cancellation marks an event in place. A cancelled event stays queued
//! until it reaches the front, where it is skipped and counted.

use std::collections::{BTreeMap, HashMap};

use super::event::{Event, EventId, EventKey, EventKind};
use crate::error::SimulationError;
use crate::models::Ticks;

/// One step of [`EventQueue::run_until_empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A live event to handle.
    Event(Event),
    /// Every event at this time has been handled.
    Drained(Ticks),
}

/// What the driver does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Counters of one queue's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub scheduled: u64,
    pub processed: u64,
    pub cancelled: u64,
}

/// Time-ordered queue of cancellable events.
#[derive(Debug, Clone)]
pub struct EventQueue {
    clock: Ticks,
    next_seq: u64,
    pending: BTreeMap<EventKey, Event>,
    keys: HashMap<EventId, EventKey>,
    stats: QueueStats,
}

impl EventQueue {
    /// Creates an empty queue with the clock at `clock`.
    pub fn new(clock: Ticks) -> Self {
        Self {
            clock,
            next_seq: 1,
            pending: BTreeMap::new(),
            keys: HashMap::new(),
            stats: QueueStats::default(),
        }
    }

    #[inline]
    pub fn clock(&self) -> Ticks {
        self.clock
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Queued events, cancelled ones included.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Schedules an event during processing.
    ///
    /// Fails if `time` is before the clock.
    pub fn schedule(&mut self, time: Ticks, kind: EventKind) -> Result<EventId, SimulationError> {
        if time < self.clock {
            return Err(SimulationError::EventBeforeClock {
                time,
                clock: self.clock,
            });
        }
        Ok(self.push(time, kind))
    }

    /// Publishes an event before the run starts; earlier times are clamped
    /// to the clock.
    pub fn seed(&mut self, time: Ticks, kind: EventKind) -> EventId {
        self.push(time.max(self.clock), kind)
    }

    fn push(&mut self, time: Ticks, kind: EventKind) -> EventId {
        let id = EventId(self.next_seq);
        self.next_seq += 1;
        let event = Event {
            id,
            time,
            kind,
            cancelled: false,
        };
        let key = event.key();
        self.pending.insert(key, event);
        self.keys.insert(id, key);
        self.stats.scheduled += 1;
        id
    }

    /// Marks a queued event cancelled. Returns `false` if it is no longer
    /// queued or was already cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let Some(key) = self.keys.get(&id) else {
            return false;
        };
        match self.pending.get_mut(key) {
            Some(event) if !event.cancelled => {
                event.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Cancels every queued event matching `pred`; returns how many.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&EventKind) -> bool) -> usize {
        let mut count = 0;
        for event in self.pending.values_mut() {
            if !event.cancelled && pred(&event.kind) {
                event.cancelled = true;
                count += 1;
            }
        }
        count
    }

    pub fn is_cancelled(&self, id: EventId) -> bool {
        self.keys
            .get(&id)
            .and_then(|k| self.pending.get(k))
            .is_some_and(|e| e.cancelled)
    }

    /// Time of the next live event.
    pub fn peek_time(&mut self) -> Option<Ticks> {
        self.discard_cancelled();
        self.pending.keys().next().map(|k| k.time)
    }

    /// Removes the next live event and advances the clock to it.
    pub fn pop(&mut self) -> Option<Event> {
        self.discard_cancelled();
        let (key, event) = self.pending.pop_first()?;
        self.keys.remove(&event.id);
        debug_assert!(key.time >= self.clock);
        self.clock = key.time;
        self.stats.processed += 1;
        Some(event)
    }

    /// Removes the next live event only if it is due at the current clock.
    pub fn pop_at_clock(&mut self) -> Option<Event> {
        match self.peek_time() {
            Some(t) if t == self.clock => self.pop(),
            _ => None,
        }
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if !entry.get().cancelled {
                break;
            }
            let event = entry.remove();
            self.keys.remove(&event.id);
            self.stats.cancelled += 1;
        }
    }

    /// Drives the queue until it is empty, the handler stops, or the next
    /// event lies at or past `horizon`.
    ///
    /// The handler sees every live event in order; after the last event of a
    /// timestamp (including events scheduled at that same timestamp while
    /// handling) it sees [`Step::Drained`]. Events still queued when the
    /// horizon is reached stay queued.
    pub fn run_until_empty<E>(
        &mut self,
        horizon: Option<Ticks>,
        mut handler: impl FnMut(&mut Self, Step) -> Result<Flow, E>,
    ) -> Result<(), E> {
        while let Some(next) = self.peek_time() {
            if horizon.is_some_and(|h| next >= h) {
                break;
            }
            let Some(event) = self.pop() else { break };
            if handler(self, Step::Event(event))? == Flow::Stop {
                return Ok(());
            }
            while let Some(event) = self.pop_at_clock() {
                if handler(self, Step::Event(event))? == Flow::Stop {
                    return Ok(());
                }
            }
            let now = self.clock;
            if handler(self, Step::Drained(now))? == Flow::Stop {
                return Ok(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationId, ResourceId};

    fn ready(op: u64) -> EventKind {
        EventKind::OperationReady {
            operation: OperationId(op),
        }
    }

    fn retry(r: u64) -> EventKind {
        EventKind::ResourceAvailable {
            resource: ResourceId(r),
        }
    }

    #[test]
    fn test_pop_order_and_clock() {
        let mut q = EventQueue::new(0);
        q.seed(20, ready(1));
        q.seed(10, retry(1));
        q.seed(10, ready(2));
        q.seed(10, ready(3));

        let e = q.pop().unwrap();
        assert_eq!(e.kind, ready(2));
        assert_eq!(q.clock(), 10);
        assert_eq!(q.pop().unwrap().kind, ready(3));
        assert_eq!(q.pop().unwrap().kind, retry(1));
        assert_eq!(q.pop().unwrap().time, 20);
        assert!(q.pop().is_none());
        assert_eq!(q.stats().processed, 4);
    }

    #[test]
    fn test_schedule_before_clock_is_error() {
        let mut q = EventQueue::new(0);
        q.seed(100, ready(1));
        q.pop();
        assert_eq!(
            q.schedule(50, ready(2)),
            Err(SimulationError::EventBeforeClock {
                time: 50,
                clock: 100
            })
        );
        assert!(q.schedule(100, ready(2)).is_ok());
    }

    #[test]
    fn test_seed_clamps_to_clock() {
        let mut q = EventQueue::new(500);
        q.seed(10, ready(1));
        assert_eq!(q.pop().unwrap().time, 500);
    }

    #[test]
    fn test_cancel() {
        let mut q = EventQueue::new(0);
        let a = q.seed(10, ready(1));
        q.seed(20, ready(2));
        assert!(q.cancel(a));
        assert!(q.is_cancelled(a));
        assert!(!q.cancel(a));
        assert_eq!(q.peek_time(), Some(20));
        assert_eq!(q.pop().unwrap().kind, ready(2));
        assert_eq!(q.stats().cancelled, 1);
        assert!(!q.cancel(a));
    }

    #[test]
    fn test_cancel_where() {
        let mut q = EventQueue::new(0);
        q.seed(10, ready(1));
        q.seed(10, retry(1));
        q.seed(20, ready(2));
        let n = q.cancel_where(|k| matches!(k, EventKind::OperationReady { .. }));
        assert_eq!(n, 2);
        assert_eq!(q.pop().unwrap().kind, retry(1));
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_run_until_empty_drains_each_timestamp() {
        let mut q = EventQueue::new(0);
        q.seed(10, ready(1));
        q.seed(30, ready(2));
        let mut log = Vec::new();
        q.run_until_empty::<SimulationError>(None, |q, step| {
            if let Step::Event(e) = step {
                if e.kind == ready(1) {
                    // Same-time follow-up is handled before the drain.
                    q.schedule(10, retry(1))?;
                }
            }
            log.push(step);
            Ok(Flow::Continue)
        })
        .unwrap();

        let times: Vec<String> = log
            .iter()
            .map(|s| match s {
                Step::Event(e) => format!("e{}@{}", e.kind.type_id(), e.time),
                Step::Drained(t) => format!("d@{t}"),
            })
            .collect();
        assert_eq!(times, vec!["e3@10", "e16@10", "d@10", "e3@30", "d@30"]);
    }

    #[test]
    fn test_run_until_empty_horizon_and_stop() {
        let mut q = EventQueue::new(0);
        q.seed(10, ready(1));
        q.seed(50, ready(2));
        let mut seen = 0;
        q.run_until_empty::<SimulationError>(Some(50), |_, step| {
            if matches!(step, Step::Event(_)) {
                seen += 1;
            }
            Ok(Flow::Continue)
        })
        .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(q.len(), 1);

        let mut q = EventQueue::new(0);
        q.seed(10, ready(1));
        q.seed(10, ready(2));
        let mut seen = 0;
        q.run_until_empty::<SimulationError>(None, |_, _| {
            seen += 1;
            Ok(Flow::Stop)
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_handler_error_aborts() {
        let mut q = EventQueue::new(0);
        q.seed(10, ready(1));
        q.seed(20, ready(2));
        let result = q.run_until_empty(None, |q, _| {
            q.schedule(0, ready(3))?;
            Ok::<_, SimulationError>(Flow::Continue)
        });
        assert!(matches!(
            result,
            Err(SimulationError::EventBeforeClock { time: 0, clock: 10 })
        ));
    }
}
