//! The engine - single owner of the scheduler, the capture session and timers
//!
//! Everything here runs on one logical loop. The engine keeps its own
//! millisecond clock; whoever drives it (the [`runtime`](crate::runtime)
//! thread, or a test) moves that clock forward with [`Engine::advance_to`]
//! or [`Engine::run_due`] and timers fire in deadline order.

use crate::alarm;
use crate::capture::{CaptureEvent, CaptureKind, CaptureSession, Countdown, Effect, Stage};
use crate::scheduler::{Scheduler, StepOutcome};
use crate::timer::{Millis, TimerId, TimerQueue};
use chrono::NaiveTime;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Duration;
use tapcycle_core::{
    CaptureOverlay, Error, Gesture, GestureOutcome, GestureStatus, InputDispatcher, Point, Purpose,
    Step,
};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Countdown run before every capture stage
    pub countdown: Countdown,
    /// Play a freshly captured swipe once through the dispatcher
    pub preview_swipe: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown: Countdown::default(),
            preview_swipe: true,
        }
    }
}

/// What a timer wakes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Step,
    CaptureTick,
    ScheduledStart,
    Preview,
}

/// Notifications for observers (UI refresh, CLI output)
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StepsChanged { count: usize },
    RunStateChanged { running: bool },
    StepDispatched { at: Millis, index: usize, gesture: Gesture },
    RunFailed { index: usize, error: Error },
    /// The capture flow wants attention: a countdown value, or `None` when
    /// it is waiting for a touch
    CapturePrompt { purpose: Purpose, remaining: Option<u8> },
    CaptureFinished { kind: CaptureKind, added: usize },
    CaptureCancelled { kind: CaptureKind },
    StartScheduled { delay: Duration },
    GestureFinished(GestureOutcome),
}

struct ActiveCapture {
    session: CaptureSession,
    tick: Option<TimerId>,
}

pub struct Engine {
    config: EngineConfig,
    now: Millis,
    scheduler: Scheduler,
    timers: TimerQueue<Wake>,
    capture: Option<ActiveCapture>,
    scheduled_start: Option<TimerId>,
    preview: Option<(TimerId, Gesture)>,
    dispatcher: Box<dyn InputDispatcher>,
    overlay: Box<dyn CaptureOverlay>,
    observers: Vec<Sender<EngineEvent>>,
}

impl Engine {
    pub fn new(
        dispatcher: impl InputDispatcher + 'static,
        overlay: impl CaptureOverlay + 'static,
    ) -> Self {
        Self::with_config(dispatcher, overlay, EngineConfig::default())
    }

    pub fn with_config(
        dispatcher: impl InputDispatcher + 'static,
        overlay: impl CaptureOverlay + 'static,
        config: EngineConfig,
    ) -> Self {
        Self {
            config,
            now: 0,
            scheduler: Scheduler::new(),
            timers: TimerQueue::new(),
            capture: None,
            scheduled_start: None,
            preview: None,
            dispatcher: Box::new(dispatcher),
            overlay: Box::new(overlay),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.observers.push(tx);
        rx
    }

    fn emit(&mut self, event: EngineEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    // ========================================================================
    // Step sequence
    // ========================================================================

    pub fn steps(&self) -> &[Step] {
        self.scheduler.steps()
    }

    pub fn step_count(&self) -> usize {
        self.scheduler.step_count()
    }

    pub fn cursor(&self) -> usize {
        self.scheduler.cursor()
    }

    pub fn add_tap_step(&mut self, x: f64, y: f64, delay_ms: u64) {
        self.scheduler.add_tap_step(x, y, delay_ms);
        self.steps_changed();
    }

    pub fn add_swipe_step(&mut self, from: Point, to: Point, duration_ms: u64, delay_ms: u64) {
        self.scheduler.add_swipe_step(from, to, duration_ms, delay_ms);
        self.steps_changed();
    }

    pub fn update_step_delay(&mut self, index: usize, delay_ms: u64) -> bool {
        let updated = self.scheduler.update_step_delay(index, delay_ms);
        if updated {
            self.steps_changed();
        }
        updated
    }

    pub fn nudge_step_delay(&mut self, index: usize, delta_ms: i64) -> Option<u64> {
        let delay = self.scheduler.nudge_step_delay(index, delta_ms);
        if delay.is_some() {
            self.steps_changed();
        }
        delay
    }

    pub fn clear_steps(&mut self) {
        self.scheduler.clear();
        self.steps_changed();
    }

    /// Load a whole sequence, e.g. a saved step group
    pub fn replace_steps(&mut self, steps: Vec<Step>) {
        self.scheduler.replace(steps);
        self.steps_changed();
    }

    fn steps_changed(&mut self) {
        let count = self.scheduler.step_count();
        self.emit(EngineEvent::StepsChanged { count });
    }

    // ========================================================================
    // Run control
    // ========================================================================

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Start cycling. Returns whether a run is active afterwards; starting an
    /// empty sequence quietly does nothing.
    pub fn start(&mut self) -> bool {
        let outcome = self
            .scheduler
            .start(self.now, &mut self.timers, self.dispatcher.as_ref());
        if let Some(outcome) = outcome {
            self.emit(EngineEvent::RunStateChanged { running: true });
            self.report(outcome);
        }
        self.scheduler.is_running()
    }

    pub fn stop(&mut self) {
        let was_running = self.scheduler.is_running();
        self.scheduler.stop(&mut self.timers);
        if was_running {
            self.emit(EngineEvent::RunStateChanged { running: false });
        }
    }

    fn report(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Dispatched { index, gesture } => {
                let at = self.now;
                self.emit(EngineEvent::StepDispatched { at, index, gesture });
            }
            StepOutcome::Exhausted => {
                self.emit(EngineEvent::RunStateChanged { running: false });
            }
            StepOutcome::Failed { index, error } => {
                self.emit(EngineEvent::RunFailed { index, error });
                self.emit(EngineEvent::RunStateChanged { running: false });
            }
        }
    }

    /// Advisory only; the scheduler never waits for these
    pub fn on_gesture_outcome(&mut self, outcome: GestureOutcome) {
        match outcome.status {
            GestureStatus::Completed => {
                tracing::trace!(gesture = %outcome.gesture, "gesture completed")
            }
            GestureStatus::Cancelled => {
                tracing::warn!(gesture = %outcome.gesture, "gesture cancelled")
            }
        }
        self.emit(EngineEvent::GestureFinished(outcome));
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Start an interactive capture. An active capture is cancelled first.
    pub fn begin_capture(&mut self, kind: CaptureKind) {
        if let Some(active) = &self.capture {
            tracing::warn!(
                previous = %active.session.kind(),
                next = %kind,
                "capture already active, replacing it"
            );
            self.cancel_capture();
        }

        let mut session = CaptureSession::new(kind, self.config.countdown);
        let effects = session.advance(CaptureEvent::Begin);
        tracing::debug!(%kind, "capture started");
        self.capture = Some(ActiveCapture {
            session,
            tick: None,
        });
        self.apply_capture_effects(effects);
    }

    /// Feed a touch-down from the capture surface
    pub fn touch(&mut self, at: Point) {
        self.drive_capture(CaptureEvent::Touch(at));
    }

    pub fn cancel_capture(&mut self) {
        self.drive_capture(CaptureEvent::Cancel);
    }

    pub fn capture_stage(&self) -> Option<Stage> {
        self.capture.as_ref().map(|a| a.session.stage())
    }

    fn drive_capture(&mut self, event: CaptureEvent) {
        let Some(active) = self.capture.as_mut() else {
            return;
        };
        let effects = active.session.advance(event);
        self.apply_capture_effects(effects);
    }

    fn apply_capture_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ShowCountdown { purpose, remaining } => {
                    self.overlay.show_countdown(purpose, remaining);
                    self.emit(EngineEvent::CapturePrompt {
                        purpose,
                        remaining: Some(remaining),
                    });
                }
                Effect::ArmTick(interval) => {
                    let id = self.timers.after(self.now, interval, Wake::CaptureTick);
                    if let Some(active) = self.capture.as_mut() {
                        if let Some(old) = active.tick.replace(id) {
                            self.timers.cancel(old);
                        }
                    }
                }
                Effect::CancelTick => {
                    if let Some(id) = self.capture.as_mut().and_then(|a| a.tick.take()) {
                        self.timers.cancel(id);
                    }
                }
                Effect::ShowTouchSurface(purpose) => {
                    self.overlay.show_touch_surface(purpose);
                    self.emit(EngineEvent::CapturePrompt {
                        purpose,
                        remaining: None,
                    });
                }
                Effect::TearDownOverlay => {
                    if !self.overlay.teardown() {
                        tracing::debug!("capture overlay already gone");
                    }
                }
                Effect::Commit(steps) => {
                    let added = steps.len();
                    if let Some(kind) = self.capture.as_ref().map(|a| a.session.kind()) {
                        self.scheduler.extend(steps);
                        tracing::info!(%kind, added, total = self.scheduler.step_count(), "capture committed");
                        self.steps_changed();
                        self.emit(EngineEvent::CaptureFinished { kind, added });
                    }
                }
                Effect::Preview { gesture, after } => {
                    if !self.config.preview_swipe {
                        tracing::debug!(%gesture, "preview disabled");
                        continue;
                    }
                    let id = self.timers.after(self.now, after, Wake::Preview);
                    if let Some((old, _)) = self.preview.replace((id, gesture)) {
                        self.timers.cancel(old);
                    }
                }
                Effect::Discarded => {
                    if let Some(kind) = self.capture.as_ref().map(|a| a.session.kind()) {
                        tracing::info!(%kind, "capture cancelled");
                        self.emit(EngineEvent::CaptureCancelled { kind });
                    }
                }
            }
        }

        if self.capture.as_ref().is_some_and(|a| a.session.is_finished()) {
            if let Some(id) = self.capture.take().and_then(|a| a.tick) {
                self.timers.cancel(id);
            }
        }
    }

    // ========================================================================
    // Scheduled start
    // ========================================================================

    /// Arm a one-shot start `delay` from now, replacing any earlier one
    pub fn schedule_start_in(&mut self, delay: Duration) {
        self.clear_scheduled_start();
        let id = self.timers.after(self.now, delay, Wake::ScheduledStart);
        self.scheduled_start = Some(id);
        tracing::info!(delay_ms = delay.as_millis() as u64, "start scheduled");
        self.emit(EngineEvent::StartScheduled { delay });
    }

    /// Arm a start at the next local occurrence of `time`
    pub fn schedule_start_at(&mut self, time: NaiveTime) -> Duration {
        let delay = alarm::delay_until_local(time);
        self.schedule_start_in(delay);
        delay
    }

    pub fn clear_scheduled_start(&mut self) -> bool {
        match self.scheduled_start.take() {
            Some(id) => self.timers.cancel(id),
            None => false,
        }
    }

    pub fn has_scheduled_start(&self) -> bool {
        self.scheduled_start.is_some()
    }

    // ========================================================================
    // Clock
    // ========================================================================

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Move the clock to `now`, firing due timers in deadline order. A
    /// zero-delay timer armed while draining waits for the next call.
    pub fn advance_to(&mut self, now: Millis) {
        let mut watermark = self.timers.watermark();
        while let Some((id, deadline, wake)) = self.timers.pop_ready(now, self.now, watermark) {
            if deadline > self.now {
                self.now = deadline;
                watermark = self.timers.watermark();
            }
            self.on_wake(id, wake);
        }
        self.now = self.now.max(now);
    }

    /// Fire what is due at wall-clock time `now`. Unlike
    /// [`advance_to`](Self::advance_to) the clock jumps to `now` first, so a
    /// late wake-up fires each overdue timer once and re-arms it from the
    /// real time instead of replaying the missed deadlines in a burst.
    pub fn run_due(&mut self, now: Millis) {
        self.now = self.now.max(now);
        let watermark = self.timers.watermark();
        while let Some((id, _, wake)) = self.timers.pop_ready(self.now, self.now, watermark) {
            self.on_wake(id, wake);
        }
    }

    /// Jump to the earliest deadline and fire that one timer. Returns the new
    /// clock value, or None if nothing is armed.
    pub fn fire_next(&mut self) -> Option<Millis> {
        let deadline = self.timers.next_deadline()?;
        let (id, deadline, wake) = self.timers.pop_due(deadline)?;
        self.now = self.now.max(deadline);
        self.on_wake(id, wake);
        Some(self.now)
    }

    fn on_wake(&mut self, id: TimerId, wake: Wake) {
        match wake {
            Wake::Step => {
                let outcome = self.scheduler.on_timer(
                    id,
                    self.now,
                    &mut self.timers,
                    self.dispatcher.as_ref(),
                );
                if let Some(outcome) = outcome {
                    self.report(outcome);
                }
            }
            Wake::CaptureTick => {
                let current = self
                    .capture
                    .as_mut()
                    .filter(|a| a.tick == Some(id))
                    .map(|a| a.tick.take());
                if current.is_some() {
                    self.drive_capture(CaptureEvent::Tick);
                }
            }
            Wake::ScheduledStart => {
                if self.scheduled_start != Some(id) {
                    return;
                }
                self.scheduled_start = None;
                if self.scheduler.is_running() {
                    tracing::debug!("scheduled start fired while already running");
                } else if !self.start() {
                    tracing::info!("scheduled start fired with nothing to play");
                }
            }
            Wake::Preview => {
                if self.preview.as_ref().map(|(pending, _)| *pending) != Some(id) {
                    return;
                }
                let Some((_, gesture)) = self.preview.take() else {
                    return;
                };
                if let Err(e) = self.dispatcher.dispatch(&gesture) {
                    tracing::warn!(%gesture, error = %e, "swipe preview failed");
                }
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Shut everything down: no timer of either machine fires after this.
    /// The step sequence is kept.
    pub fn teardown(&mut self) {
        self.stop();
        if self.capture.is_some() {
            self.cancel_capture();
        }
        self.clear_scheduled_start();
        self.preview = None;
        self.timers.clear();
        tracing::debug!(steps = self.scheduler.step_count(), "engine torn down");
    }
}
