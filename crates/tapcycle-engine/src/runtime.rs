//! Engine loop on its own thread
//!
//! The [`Engine`] is owned by a single thread that blocks on three sources:
//! commands from [`EngineHandle`]s, gesture outcomes from the dispatcher,
//! and the next timer deadline. Nothing else touches engine state.

use crate::capture::{CaptureKind, Stage};
use crate::engine::{Engine, EngineEvent};
use crate::timer::Millis;
use chrono::NaiveTime;
use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender};
use serde::Serialize;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tapcycle_core::{Error, OutcomeReceiver, Point, Result, Step};

/// Requests the loop thread understands
#[derive(Debug)]
pub enum Command {
    AddTap { x: f64, y: f64, delay_ms: u64 },
    AddSwipe { from: Point, to: Point, duration_ms: u64, delay_ms: u64 },
    UpdateDelay { index: usize, delay_ms: u64 },
    NudgeDelay { index: usize, delta_ms: i64, reply: Sender<Option<u64>> },
    ReplaceSteps(Vec<Step>),
    ClearSteps,
    Start { reply: Sender<bool> },
    Stop,
    BeginCapture(CaptureKind),
    Touch(Point),
    CancelCapture,
    ScheduleStartIn(Duration),
    ScheduleStartAt { time: NaiveTime, reply: Sender<Duration> },
    ClearScheduledStart,
    Subscribe { reply: Sender<Receiver<EngineEvent>> },
    Snapshot { reply: Sender<Snapshot> },
    Shutdown,
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub running: bool,
    pub cursor: usize,
    pub steps: Vec<Step>,
    #[serde(skip)]
    pub capture: Option<Stage>,
    pub scheduled_start: bool,
}

impl Snapshot {
    fn of(engine: &Engine) -> Self {
        Self {
            running: engine.is_running(),
            cursor: engine.cursor(),
            steps: engine.steps().to_vec(),
            capture: engine.capture_stage(),
            scheduled_start: engine.has_scheduled_start(),
        }
    }
}

/// Cheap handle to an engine running on its own thread.
///
/// Dropping the handle shuts the loop down and joins it.
pub struct EngineHandle {
    tx: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

/// Move `engine` onto a new thread and return a handle to it
pub fn spawn(engine: Engine, outcomes: OutcomeReceiver) -> EngineHandle {
    let (tx, rx) = unbounded();
    let thread = std::thread::Builder::new()
        .name("tapcycle-engine".into())
        .spawn(move || run_loop(engine, rx, outcomes));

    let thread = match thread {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn engine thread");
            None
        }
    };
    EngineHandle { tx, thread }
}

fn run_loop(mut engine: Engine, commands: Receiver<Command>, outcomes: OutcomeReceiver) {
    let epoch = Instant::now();
    let elapsed = || -> Millis { epoch.elapsed().as_millis() as Millis };
    let mut outcomes_open = true;
    let mut running = true;

    tracing::debug!("engine loop started");
    while running {
        let timeout = match engine.next_deadline() {
            Some(deadline) => after(Duration::from_millis(
                deadline.saturating_sub(elapsed()),
            )),
            None => never(),
        };
        let outcome_rx = if outcomes_open {
            outcomes.clone()
        } else {
            never()
        };

        select! {
            recv(commands) -> msg => {
                engine.run_due(elapsed());
                match msg {
                    Ok(Command::Shutdown) | Err(_) => running = false,
                    Ok(cmd) => handle(&mut engine, cmd),
                }
            }
            recv(outcome_rx) -> msg => match msg {
                Ok(outcome) => engine.on_gesture_outcome(outcome),
                Err(_) => outcomes_open = false,
            },
            recv(timeout) -> _ => {}
        }
        engine.run_due(elapsed());
    }

    engine.teardown();
    tracing::debug!("engine loop stopped");
}

fn handle(engine: &mut Engine, cmd: Command) {
    match cmd {
        Command::AddTap { x, y, delay_ms } => engine.add_tap_step(x, y, delay_ms),
        Command::AddSwipe {
            from,
            to,
            duration_ms,
            delay_ms,
        } => engine.add_swipe_step(from, to, duration_ms, delay_ms),
        Command::UpdateDelay { index, delay_ms } => {
            if !engine.update_step_delay(index, delay_ms) {
                tracing::debug!(index, "delay update for missing step ignored");
            }
        }
        Command::NudgeDelay {
            index,
            delta_ms,
            reply,
        } => {
            let _ = reply.send(engine.nudge_step_delay(index, delta_ms));
        }
        Command::ReplaceSteps(steps) => engine.replace_steps(steps),
        Command::ClearSteps => engine.clear_steps(),
        Command::Start { reply } => {
            let _ = reply.send(engine.start());
        }
        Command::Stop => engine.stop(),
        Command::BeginCapture(kind) => engine.begin_capture(kind),
        Command::Touch(at) => engine.touch(at),
        Command::CancelCapture => engine.cancel_capture(),
        Command::ScheduleStartIn(delay) => engine.schedule_start_in(delay),
        Command::ScheduleStartAt { time, reply } => {
            let _ = reply.send(engine.schedule_start_at(time));
        }
        Command::ClearScheduledStart => {
            engine.clear_scheduled_start();
        }
        Command::Subscribe { reply } => {
            let _ = reply.send(engine.subscribe());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(Snapshot::of(engine));
        }
        Command::Shutdown => {}
    }
}

impl EngineHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| Error::engine_gone())
    }

    fn ask<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = bounded(1);
        self.send(make(reply))?;
        rx.recv().map_err(|_| Error::engine_gone())
    }

    pub fn add_tap_step(&self, x: f64, y: f64, delay_ms: u64) -> Result<()> {
        self.send(Command::AddTap { x, y, delay_ms })
    }

    pub fn add_swipe_step(&self, from: Point, to: Point, duration_ms: u64, delay_ms: u64) -> Result<()> {
        self.send(Command::AddSwipe {
            from,
            to,
            duration_ms,
            delay_ms,
        })
    }

    pub fn update_step_delay(&self, index: usize, delay_ms: u64) -> Result<()> {
        self.send(Command::UpdateDelay { index, delay_ms })
    }

    pub fn nudge_step_delay(&self, index: usize, delta_ms: i64) -> Result<Option<u64>> {
        self.ask(|reply| Command::NudgeDelay {
            index,
            delta_ms,
            reply,
        })
    }

    pub fn replace_steps(&self, steps: Vec<Step>) -> Result<()> {
        self.send(Command::ReplaceSteps(steps))
    }

    pub fn clear_steps(&self) -> Result<()> {
        self.send(Command::ClearSteps)
    }

    /// Returns whether a run is active afterwards
    pub fn start(&self) -> Result<bool> {
        self.ask(|reply| Command::Start { reply })
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn begin_capture(&self, kind: CaptureKind) -> Result<()> {
        self.send(Command::BeginCapture(kind))
    }

    pub fn touch(&self, at: Point) -> Result<()> {
        self.send(Command::Touch(at))
    }

    pub fn cancel_capture(&self) -> Result<()> {
        self.send(Command::CancelCapture)
    }

    pub fn schedule_start_in(&self, delay: Duration) -> Result<()> {
        self.send(Command::ScheduleStartIn(delay))
    }

    /// Returns how long until the start fires
    pub fn schedule_start_at(&self, time: NaiveTime) -> Result<Duration> {
        self.ask(|reply| Command::ScheduleStartAt { time, reply })
    }

    pub fn clear_scheduled_start(&self) -> Result<()> {
        self.send(Command::ClearScheduledStart)
    }

    pub fn subscribe(&self) -> Result<Receiver<EngineEvent>> {
        self.ask(|reply| Command::Subscribe { reply })
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.ask(|reply| Command::Snapshot { reply })
    }

    /// Stop the loop and wait for it. Everything armed is cancelled; a second
    /// call is a no-op.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapcycle_core::{outcome_channel, DryRunDispatcher, NullOverlay, RecordingDispatcher};

    fn spawn_recording() -> (EngineHandle, RecordingDispatcher) {
        let dispatcher = RecordingDispatcher::new();
        let (_tx, rx) = outcome_channel();
        let engine = Engine::new(dispatcher.clone(), NullOverlay::default());
        (spawn(engine, rx), dispatcher)
    }

    #[test]
    fn commands_apply_in_order() {
        let (handle, _) = spawn_recording();
        handle.add_tap_step(1.0, 2.0, 1000).unwrap();
        handle
            .add_swipe_step(Point::new(0.0, 0.0), Point::new(5.0, 5.0), 400, 700)
            .unwrap();
        handle.update_step_delay(0, 250).unwrap();
        assert_eq!(handle.nudge_step_delay(1, -1000).unwrap(), Some(100));

        let snap = handle.snapshot().unwrap();
        assert_eq!(snap.steps.len(), 2);
        assert_eq!(snap.steps[0].delay_after_ms(), 250);
        assert!(!snap.running);
    }

    #[test]
    fn run_dispatches_on_real_time() {
        let (handle, dispatcher) = spawn_recording();
        handle.add_tap_step(1.0, 1.0, 20).unwrap();
        assert!(handle.start().unwrap());
        std::thread::sleep(Duration::from_millis(150));
        handle.stop().unwrap();

        let snap = handle.snapshot().unwrap();
        assert!(!snap.running);
        assert!(dispatcher.len() >= 2);

        let settled = dispatcher.len();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(dispatcher.len(), settled);
    }

    #[test]
    fn outcomes_reach_subscribers() {
        let (tx, rx) = outcome_channel();
        let engine = Engine::new(
            DryRunDispatcher::new().with_outcomes(tx),
            NullOverlay::default(),
        );
        let handle = spawn(engine, rx);
        let events = handle.subscribe().unwrap();
        handle.add_tap_step(3.0, 4.0, 10_000).unwrap();
        handle.start().unwrap();

        let finished = events
            .iter()
            .take(10)
            .find(|e| matches!(e, EngineEvent::GestureFinished(_)));
        assert!(finished.is_some());
    }

    #[test]
    fn calls_after_shutdown_report_engine_gone() {
        let (mut handle, _) = spawn_recording();
        handle.shutdown();
        let err = handle.start().unwrap_err();
        assert_eq!(err.code, tapcycle_core::ErrorCode::EngineGone);
        handle.shutdown();
    }
}
