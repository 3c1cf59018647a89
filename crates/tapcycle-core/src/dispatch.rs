//! Input dispatch - the seam between the scheduler and whatever injects gestures
//!
//! Dispatch is fire-and-forget: `tap`/`swipe` return as soon as the gesture
//! is accepted. Completion is reported later as a [`GestureOutcome`] on a
//! channel and is purely advisory.

use crate::error::{Error, Result};
use crate::step::Point;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome channel capacity. Outcomes beyond this are dropped.
pub const OUTCOME_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "g", rename_all = "lowercase")]
pub enum Gesture {
    Tap { at: Point },
    Swipe { from: Point, to: Point, duration_ms: u64 },
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gesture::Tap { at } => write!(f, "tap {}", at),
            Gesture::Swipe {
                from,
                to,
                duration_ms,
            } => write!(f, "swipe {} -> {} over {}ms", from, to, duration_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureOutcome {
    pub gesture: Gesture,
    pub status: GestureStatus,
}

pub type OutcomeSender = Sender<GestureOutcome>;
pub type OutcomeReceiver = Receiver<GestureOutcome>;

pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    bounded(OUTCOME_BUFFER)
}

/// Something that can inject taps and swipes.
///
/// Callers normalize swipe durations before calling `swipe`.
pub trait InputDispatcher: Send {
    fn tap(&self, x: f64, y: f64) -> Result<()>;

    fn swipe(&self, start_x: f64, start_y: f64, end_x: f64, end_y: f64, duration_ms: u64)
        -> Result<()>;

    fn dispatch(&self, gesture: &Gesture) -> Result<()> {
        match *gesture {
            Gesture::Tap { at } => self.tap(at.x, at.y),
            Gesture::Swipe {
                from,
                to,
                duration_ms,
            } => self.swipe(from.x, from.y, to.x, to.y, duration_ms),
        }
    }
}

fn report(outcomes: &Option<OutcomeSender>, gesture: Gesture, status: GestureStatus) {
    if let Some(tx) = outcomes {
        let _ = tx.try_send(GestureOutcome { gesture, status });
    }
}

/// Logs gestures instead of injecting them
#[derive(Debug, Default)]
pub struct DryRunDispatcher {
    outcomes: Option<OutcomeSender>,
}

impl DryRunDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(mut self, tx: OutcomeSender) -> Self {
        self.outcomes = Some(tx);
        self
    }
}

impl InputDispatcher for DryRunDispatcher {
    fn tap(&self, x: f64, y: f64) -> Result<()> {
        let gesture = Gesture::Tap { at: Point::new(x, y) };
        tracing::info!(%gesture, "dry run");
        report(&self.outcomes, gesture, GestureStatus::Completed);
        Ok(())
    }

    fn swipe(&self, start_x: f64, start_y: f64, end_x: f64, end_y: f64, duration_ms: u64) -> Result<()> {
        let gesture = Gesture::Swipe {
            from: Point::new(start_x, start_y),
            to: Point::new(end_x, end_y),
            duration_ms,
        };
        tracing::info!(%gesture, "dry run");
        report(&self.outcomes, gesture, GestureStatus::Completed);
        Ok(())
    }
}

/// Keeps every accepted gesture in memory. Clones share the same log, so a
/// caller can hand one clone to the engine and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    log: Arc<Mutex<Vec<Gesture>>>,
    unavailable: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gestures(&self) -> Vec<Gesture> {
        self.log.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// While unavailable every call fails with `DispatcherUnavailable`
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn accept(&self, gesture: Gesture) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::dispatcher_unavailable("recording dispatcher switched off"));
        }
        self.log.lock().push(gesture);
        Ok(())
    }
}

impl InputDispatcher for RecordingDispatcher {
    fn tap(&self, x: f64, y: f64) -> Result<()> {
        self.accept(Gesture::Tap { at: Point::new(x, y) })
    }

    fn swipe(&self, start_x: f64, start_y: f64, end_x: f64, end_y: f64, duration_ms: u64) -> Result<()> {
        self.accept(Gesture::Swipe {
            from: Point::new(start_x, start_y),
            to: Point::new(end_x, end_y),
            duration_ms,
        })
    }
}
