//! tapcycle-core - building blocks for tap/swipe macros
//!
//! The step model, the input-dispatch seam the scheduler drives, and the
//! overlay seam the capture flow drives. Nothing here owns a timer.
//!
//! ## Dispatchers
//!
//! - **adb**: Android devices via `adb shell input`
//! - **dry run**: logs gestures
//! - **recording**: keeps gestures in memory (tests, previews)

pub mod dispatch;
pub mod error;
pub mod overlay;
pub mod platform;
pub mod step;

pub use dispatch::{
    outcome_channel, DryRunDispatcher, Gesture, GestureOutcome, GestureStatus, InputDispatcher,
    OutcomeReceiver, OutcomeSender, RecordingDispatcher,
};
pub use error::{Error, ErrorCode, Result};
pub use overlay::{CaptureOverlay, NullOverlay, OverlayCall, Purpose, RecordingOverlay};
pub use platform::{AdbConfig, AdbDispatcher};
pub use step::{Point, Step};

pub mod prelude {
    pub use crate::dispatch::{Gesture, GestureOutcome, GestureStatus, InputDispatcher};
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::overlay::{CaptureOverlay, Purpose};
    pub use crate::step::{Point, Step};
}
