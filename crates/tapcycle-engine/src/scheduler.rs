//! Cyclic step scheduler
//!
//! Replays the step sequence forever, one step per timer firing, until
//! stopped. The delay armed after a step is that step's own `delayAfterMs`.
//!
//! The sequence may be edited while running. The cursor is resolved against
//! the sequence as it is at dispatch time: an emptied sequence stops the run,
//! a shrunk one wraps the cursor.

use crate::engine::Wake;
use crate::timer::{Millis, TimerId, TimerQueue};
use tapcycle_core::{Error, Gesture, InputDispatcher, Point, Step};

/// What happened when the scheduler tried to run a step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Step `index` was handed to the dispatcher
    Dispatched { index: usize, gesture: Gesture },
    /// Nothing left to play; the run stopped
    Exhausted,
    /// The dispatcher refused step `index`; the run stopped
    Failed { index: usize, error: Error },
}

#[derive(Debug, Default)]
pub struct Scheduler {
    steps: Vec<Step>,
    cursor: usize,
    running: bool,
    pending: Option<TimerId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    // ---- sequence -------------------------------------------------------

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn add_tap_step(&mut self, x: f64, y: f64, delay_ms: u64) {
        self.steps.push(Step::tap(Point::new(x, y)).with_delay(delay_ms));
    }

    pub fn add_swipe_step(&mut self, from: Point, to: Point, duration_ms: u64, delay_ms: u64) {
        self.steps
            .push(Step::swipe(from, to, duration_ms).with_delay(delay_ms));
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Append several steps at once; observers never see a partial batch
    pub fn extend(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.steps.extend(steps);
    }

    /// Out-of-range indices are ignored (returns false)
    pub fn update_step_delay(&mut self, index: usize, delay_ms: u64) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                step.set_delay_after_ms(delay_ms);
                true
            }
            None => false,
        }
    }

    pub fn nudge_step_delay(&mut self, index: usize, delta_ms: i64) -> Option<u64> {
        self.steps.get_mut(index).map(|s| s.nudge_delay(delta_ms))
    }

    /// Drop every step. A running scheduler stops on its next firing.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.cursor = 0;
    }

    /// Swap in a new sequence. The cursor is kept and wrapped at the next
    /// dispatch if the new sequence is shorter.
    pub fn replace(&mut self, steps: Vec<Step>) {
        self.steps = steps;
    }

    // ---- run state ------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending
    }

    /// Start from the first step. No-op (returns None) when already running
    /// or when there is nothing to play.
    pub fn start(
        &mut self,
        now: Millis,
        timers: &mut TimerQueue<Wake>,
        dispatcher: &dyn InputDispatcher,
    ) -> Option<StepOutcome> {
        if self.running || self.steps.is_empty() {
            return None;
        }
        self.cancel_pending(timers);
        self.running = true;
        self.cursor = 0;
        tracing::info!(steps = self.steps.len(), "run started");
        Some(self.run_current(now, timers, dispatcher))
    }

    /// Idempotent; safe from any state
    pub fn stop(&mut self, timers: &mut TimerQueue<Wake>) {
        if self.running {
            tracing::info!(cursor = self.cursor, "run stopped");
        }
        self.running = false;
        self.cancel_pending(timers);
    }

    /// Handle a fired step timer. Stale timers (cancelled by a stop that
    /// raced the firing) are ignored.
    pub fn on_timer(
        &mut self,
        id: TimerId,
        now: Millis,
        timers: &mut TimerQueue<Wake>,
        dispatcher: &dyn InputDispatcher,
    ) -> Option<StepOutcome> {
        if self.pending != Some(id) {
            return None;
        }
        self.pending = None;
        if !self.running {
            return None;
        }
        Some(self.run_current(now, timers, dispatcher))
    }

    fn cancel_pending(&mut self, timers: &mut TimerQueue<Wake>) {
        if let Some(id) = self.pending.take() {
            timers.cancel(id);
        }
    }

    fn run_current(
        &mut self,
        now: Millis,
        timers: &mut TimerQueue<Wake>,
        dispatcher: &dyn InputDispatcher,
    ) -> StepOutcome {
        let len = self.steps.len();
        if len == 0 {
            tracing::debug!("sequence emptied under a running scheduler");
            self.stop(timers);
            return StepOutcome::Exhausted;
        }
        if self.cursor >= len {
            self.cursor %= len;
        }

        let index = self.cursor;
        let step = &self.steps[index];
        let gesture = step.gesture();
        let delay = step.delay_after();

        if let Err(error) = dispatcher.dispatch(&gesture) {
            tracing::error!(index, %gesture, %error, "dispatch failed, stopping run");
            self.stop(timers);
            return StepOutcome::Failed { index, error };
        }

        tracing::debug!(index, %gesture, "step dispatched");
        self.cursor = (index + 1) % len;

        if self.running {
            self.pending = Some(timers.after(now, delay, Wake::Step));
        }

        StepOutcome::Dispatched { index, gesture }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapcycle_core::RecordingDispatcher;

    struct Rig {
        sched: Scheduler,
        timers: TimerQueue<Wake>,
        dispatcher: RecordingDispatcher,
        now: Millis,
    }

    impl Rig {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                sched: Scheduler::with_steps(steps),
                timers: TimerQueue::new(),
                dispatcher: RecordingDispatcher::new(),
                now: 0,
            }
        }

        fn start(&mut self) -> Option<StepOutcome> {
            self.sched.start(self.now, &mut self.timers, &self.dispatcher)
        }

        /// Fire the next due timer, moving the clock to its deadline
        fn fire_next(&mut self) -> Option<StepOutcome> {
            let deadline = self.timers.next_deadline()?;
            self.now = deadline;
            let (id, _, _) = self.timers.pop_due(deadline)?;
            self.sched
                .on_timer(id, self.now, &mut self.timers, &self.dispatcher)
        }
    }

    fn tap(x: f64, delay: u64) -> Step {
        Step::tap(Point::new(x, x)).with_delay(delay)
    }

    #[test]
    fn start_on_empty_sequence_is_ignored() {
        let mut rig = Rig::new(vec![]);
        assert!(rig.start().is_none());
        assert!(!rig.sched.is_running());
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn start_while_running_changes_nothing() {
        let mut rig = Rig::new(vec![tap(1.0, 100), tap(2.0, 100), tap(3.0, 100)]);
        rig.start();
        rig.fire_next();
        let cursor = rig.sched.cursor();
        let pending = rig.sched.pending_timer();

        assert!(rig.start().is_none());
        assert!(rig.sched.is_running());
        assert_eq!(rig.sched.cursor(), cursor);
        assert_eq!(rig.sched.pending_timer(), pending);
        assert_eq!(rig.dispatcher.len(), 2);
    }

    #[test]
    fn cursor_returns_home_after_full_cycles() {
        let mut rig = Rig::new(vec![tap(1.0, 10), tap(2.0, 10), tap(3.0, 10)]);
        rig.start();
        let initial = rig.sched.cursor();
        // two full cycles: 3 * 2 dispatches, first one happened in start()
        for _ in 0..6 {
            rig.fire_next();
        }
        assert_eq!(rig.sched.cursor(), initial);
        assert_eq!(rig.dispatcher.len(), 7);
    }

    #[test]
    fn stop_then_start_resets_cursor() {
        let mut rig = Rig::new(vec![tap(1.0, 10), tap(2.0, 10), tap(3.0, 10)]);
        rig.start();
        rig.fire_next();
        assert_eq!(rig.sched.cursor(), 2);

        rig.sched.stop(&mut rig.timers);
        assert!(rig.timers.is_empty());
        match rig.start() {
            Some(StepOutcome::Dispatched { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rig.sched.cursor(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut rig = Rig::new(vec![tap(1.0, 10)]);
        rig.sched.stop(&mut rig.timers);
        rig.start();
        rig.sched.stop(&mut rig.timers);
        rig.sched.stop(&mut rig.timers);
        assert!(!rig.sched.is_running());
        assert!(rig.fire_next().is_none());
    }

    #[test]
    fn appended_step_is_reached_within_a_cycle() {
        let mut rig = Rig::new(vec![tap(1.0, 10), tap(2.0, 10)]);
        rig.start();
        rig.sched.push(tap(9.0, 10));
        for _ in 0..3 {
            rig.fire_next();
        }
        assert!(rig
            .dispatcher
            .gestures()
            .contains(&Gesture::Tap { at: Point::new(9.0, 9.0) }));
    }

    #[test]
    fn clear_while_running_self_stops() {
        let mut rig = Rig::new(vec![tap(1.0, 10), tap(2.0, 10)]);
        rig.start();
        rig.sched.clear();
        assert!(matches!(rig.fire_next(), Some(StepOutcome::Exhausted)));
        assert!(!rig.sched.is_running());
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn shrinking_wraps_the_cursor() {
        let mut rig = Rig::new(vec![tap(1.0, 10), tap(2.0, 10), tap(3.0, 10)]);
        rig.start();
        rig.fire_next();
        assert_eq!(rig.sched.cursor(), 2);

        rig.sched.replace(vec![tap(7.0, 10)]);
        match rig.fire_next() {
            Some(StepOutcome::Dispatched { index, gesture }) => {
                assert_eq!(index, 0);
                assert_eq!(gesture, Gesture::Tap { at: Point::new(7.0, 7.0) });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dispatch_failure_stops_but_keeps_steps() {
        let mut rig = Rig::new(vec![tap(1.0, 10), tap(2.0, 10)]);
        rig.start();
        rig.dispatcher.set_available(false);
        assert!(matches!(
            rig.fire_next(),
            Some(StepOutcome::Failed { index: 1, .. })
        ));
        assert!(!rig.sched.is_running());
        assert_eq!(rig.sched.step_count(), 2);
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn delay_comes_from_the_step_just_run() {
        let mut rig = Rig::new(vec![tap(1.0, 500), tap(2.0, 2000)]);
        rig.start();
        assert_eq!(rig.timers.next_deadline(), Some(500));
        rig.fire_next();
        assert_eq!(rig.timers.next_deadline(), Some(2500));
    }

    #[test]
    fn update_delay_ignores_bad_index() {
        let mut sched = Scheduler::with_steps(vec![tap(1.0, 10)]);
        assert!(sched.update_step_delay(0, 750));
        assert!(!sched.update_step_delay(1, 750));
        assert_eq!(sched.steps()[0].delay_after_ms(), 750);
        assert_eq!(sched.nudge_step_delay(0, -1000), Some(100));
        assert_eq!(sched.nudge_step_delay(3, 100), None);
    }
}
