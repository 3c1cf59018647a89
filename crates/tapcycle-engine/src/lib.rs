//! tapcycle-engine - runs tap/swipe macros
//!
//! - [`scheduler`]: replays a step list in a loop, paced by each step's delay
//! - [`capture`]: countdown-then-touch flow that records new steps
//! - [`engine`]: owns both plus the timers, driven by a millisecond clock
//! - [`runtime`]: puts an engine on its own thread behind an [`EngineHandle`]
//! - [`storage`]: named step groups on disk
//!
//! ```no_run
//! use tapcycle_engine::prelude::*;
//! use tapcycle_core::{outcome_channel, DryRunDispatcher, NullOverlay};
//!
//! let (tx, rx) = outcome_channel();
//! let engine = Engine::new(DryRunDispatcher::new().with_outcomes(tx), NullOverlay::default());
//! let handle = runtime::spawn(engine, rx);
//! handle.add_tap_step(540.0, 1200.0, 800)?;
//! handle.start()?;
//! # Ok::<(), tapcycle_core::Error>(())
//! ```

pub mod alarm;
pub mod capture;
pub mod engine;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod timer;

pub use alarm::{delay_until, parse_time_of_day};
pub use capture::{CaptureEvent, CaptureKind, CaptureSession, Countdown, Effect, Stage};
pub use engine::{Engine, EngineConfig, EngineEvent, Wake};
pub use runtime::{spawn, EngineHandle, Snapshot};
pub use scheduler::{Scheduler, StepOutcome};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StepGroup, StepGroupStore};
pub use timer::{Millis, TimerId, TimerQueue};

pub mod prelude {
    pub use crate::capture::{CaptureKind, Countdown, Stage};
    pub use crate::engine::{Engine, EngineConfig, EngineEvent};
    pub use crate::runtime::{self, EngineHandle};
    pub use crate::storage::{StepGroup, StepGroupStore};
}
