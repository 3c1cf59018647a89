//! Step model - one recorded tap or swipe plus its trailing delay
//!
//! Steps are stored as camelCase JSON tagged by `kind`, e.g.
//! `{"kind":"Tap","x":10.0,"y":10.0,"delayAfterMs":500}`.

use crate::dispatch::Gesture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Delay used when a step is recorded or stored without one
pub const DEFAULT_DELAY_MS: u64 = 1000;
/// Swipe duration used when a swipe is recorded without one
pub const DEFAULT_SWIPE_DURATION_MS: u64 = 500;
/// Swipes shorter than this are dispatched with [`SWIPE_FLOOR_MS`]
pub const MIN_SWIPE_DURATION_MS: u64 = 100;
pub const SWIPE_FLOOR_MS: u64 = 300;
/// Lower bound applied when a delay is nudged downwards
pub const MIN_NUDGED_DELAY_MS: u64 = 100;

fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}

fn default_swipe_duration() -> u64 {
    DEFAULT_SWIPE_DURATION_MS
}

/// Raw screen-space coordinate. Never bounds-checked.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x as i64, self.y as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Step {
    #[serde(rename_all = "camelCase")]
    Tap {
        x: f64,
        y: f64,
        #[serde(default = "default_delay")]
        delay_after_ms: u64,
    },

    #[serde(rename_all = "camelCase")]
    Swipe {
        x: f64,
        y: f64,
        end_x: f64,
        end_y: f64,
        #[serde(default = "default_swipe_duration")]
        duration_ms: u64,
        #[serde(default = "default_delay")]
        delay_after_ms: u64,
    },
}

impl Step {
    pub fn tap(at: Point) -> Self {
        Step::Tap {
            x: at.x,
            y: at.y,
            delay_after_ms: DEFAULT_DELAY_MS,
        }
    }

    pub fn swipe(from: Point, to: Point, duration_ms: u64) -> Self {
        Step::Swipe {
            x: from.x,
            y: from.y,
            end_x: to.x,
            end_y: to.y,
            duration_ms,
            delay_after_ms: DEFAULT_DELAY_MS,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.set_delay_after_ms(delay_ms);
        self
    }

    pub fn delay_after_ms(&self) -> u64 {
        match self {
            Step::Tap { delay_after_ms, .. } | Step::Swipe { delay_after_ms, .. } => {
                *delay_after_ms
            }
        }
    }

    pub fn delay_after(&self) -> Duration {
        Duration::from_millis(self.delay_after_ms())
    }

    pub fn set_delay_after_ms(&mut self, delay_ms: u64) {
        match self {
            Step::Tap { delay_after_ms, .. } | Step::Swipe { delay_after_ms, .. } => {
                *delay_after_ms = delay_ms
            }
        }
    }

    /// Shift the delay by `delta_ms`. Decrements stop at
    /// [`MIN_NUDGED_DELAY_MS`]; increments are unbounded.
    pub fn nudge_delay(&mut self, delta_ms: i64) -> u64 {
        let current = self.delay_after_ms();
        let next = if delta_ms < 0 {
            current
                .saturating_sub(delta_ms.unsigned_abs())
                .max(MIN_NUDGED_DELAY_MS)
        } else {
            current.saturating_add(delta_ms as u64)
        };
        self.set_delay_after_ms(next);
        next
    }

    pub fn start(&self) -> Point {
        match self {
            Step::Tap { x, y, .. } | Step::Swipe { x, y, .. } => Point::new(*x, *y),
        }
    }

    /// The gesture handed to the dispatcher, with the swipe duration floor applied
    pub fn gesture(&self) -> Gesture {
        match *self {
            Step::Tap { x, y, .. } => Gesture::Tap {
                at: Point::new(x, y),
            },
            Step::Swipe {
                x,
                y,
                end_x,
                end_y,
                duration_ms,
                ..
            } => Gesture::Swipe {
                from: Point::new(x, y),
                to: Point::new(end_x, end_y),
                duration_ms: normalize_swipe_duration(duration_ms),
            },
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Tap { x, y, .. } => write!(f, "Tap {}", Point::new(*x, *y)),
            Step::Swipe {
                x, y, end_x, end_y, ..
            } => write!(
                f,
                "Swipe {} -> {}",
                Point::new(*x, *y),
                Point::new(*end_x, *end_y)
            ),
        }
    }
}

pub fn normalize_swipe_duration(duration_ms: u64) -> u64 {
    if duration_ms < MIN_SWIPE_DURATION_MS {
        SWIPE_FLOOR_MS
    } else {
        duration_ms
    }
}
