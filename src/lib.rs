//! # tapcycle
//!
//! Tap/swipe macros for Android devices: record positions interactively,
//! keep them as named step groups, replay them in a loop over adb.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tapcycle::prelude::*;
//!
//! let store = StepGroupStore::open_default()?;
//! let group = store.load("daily").ok_or_else(|| Error::group_not_found("daily"))?;
//!
//! let (tx, rx) = outcome_channel();
//! let dispatcher = AdbDispatcher::new(AdbConfig::default()).with_outcomes(tx);
//! let handle = runtime::spawn(Engine::new(dispatcher, NullOverlay::default()), rx);
//! handle.replace_steps(group.steps)?;
//! handle.start()?;
//! # Ok::<(), tapcycle::Error>(())
//! ```

// Re-export the step model and dispatchers
pub use tapcycle_core::*;

pub use tapcycle_engine as engine;

pub use tapcycle_engine::{
    alarm, runtime, CaptureKind, Countdown, Engine, EngineConfig, EngineEvent, EngineHandle,
    FileStore, KeyValueStore, MemoryStore, Scheduler, Snapshot, Stage, StepGroup, StepGroupStore,
};

/// Prelude - import everything you need
pub mod prelude {
    pub use tapcycle_core::prelude::*;
    pub use tapcycle_core::{
        outcome_channel, AdbConfig, AdbDispatcher, DryRunDispatcher, NullOverlay,
    };

    pub use tapcycle_engine::prelude::*;
}
