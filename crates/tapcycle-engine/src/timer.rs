//! One-shot timers on the engine clock
//!
//! Time is milliseconds since the engine epoch. Timers with equal deadlines
//! fire in the order they were armed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub type Millis = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    pending: BTreeMap<(Millis, TimerId), T>,
    deadlines: HashMap<TimerId, Millis>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Arm a timer firing `delay` after `now`
    pub fn after(&mut self, now: Millis, delay: Duration, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let deadline = now.saturating_add(delay.as_millis() as u64);
        self.pending.insert((deadline, id), payload);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Returns false if the timer already fired or was cancelled
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.pending.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is `<= now`
    pub fn pop_due(&mut self, now: Millis) -> Option<(TimerId, Millis, T)> {
        let key = *self.pending.keys().next()?;
        if key.0 > now {
            return None;
        }
        let payload = self.pending.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((key.1, key.0, payload))
    }

    /// Id the next armed timer will get. Timers armed from now on compare
    /// greater than or equal to it.
    pub fn watermark(&self) -> TimerId {
        TimerId(self.next_id)
    }

    /// Like [`pop_due`](Self::pop_due) for a drain that is moving the clock
    /// forward. A timer is ready if it was armed before `watermark`, or if
    /// its deadline lies past `clock`. Zero-delay timers armed mid-drain
    /// therefore wait for the next drain instead of spinning this one.
    pub fn pop_ready(
        &mut self,
        now: Millis,
        clock: Millis,
        watermark: TimerId,
    ) -> Option<(TimerId, Millis, T)> {
        let key = *self
            .pending
            .range(..=(now, TimerId(u64::MAX)))
            .map(|(key, _)| key)
            .find(|(deadline, id)| *id < watermark || *deadline > clock)?;
        let payload = self.pending.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((key.1, key.0, payload))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadlines.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
