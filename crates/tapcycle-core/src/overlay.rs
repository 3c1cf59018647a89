//! Capture overlay - the visual side of interactive recording
//!
//! The engine drives an overlay through a countdown prompt and a full-screen
//! touch surface. `teardown` is idempotent and reports whether anything was
//! actually on screen.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What the user is being asked to point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    TapTarget,
    SwipeStart,
    SwipeEnd,
}

impl Purpose {
    pub fn prompt(&self) -> &'static str {
        match self {
            Purpose::TapTarget => "pick the tap position",
            Purpose::SwipeStart => "pick the swipe start",
            Purpose::SwipeEnd => "pick the swipe end",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prompt())
    }
}

pub trait CaptureOverlay: Send {
    /// Show (or re-render) the countdown hint
    fn show_countdown(&mut self, purpose: Purpose, remaining: u8);

    /// Install the input-transparent surface that receives the next touch
    fn show_touch_surface(&mut self, purpose: Purpose);

    /// Remove whatever is on screen. Returns false if nothing was.
    fn teardown(&mut self) -> bool;
}

/// Overlay for headless use
#[derive(Debug, Default)]
pub struct NullOverlay {
    shown: bool,
}

impl CaptureOverlay for NullOverlay {
    fn show_countdown(&mut self, _purpose: Purpose, _remaining: u8) {
        self.shown = true;
    }

    fn show_touch_surface(&mut self, _purpose: Purpose) {
        self.shown = true;
    }

    fn teardown(&mut self) -> bool {
        std::mem::take(&mut self.shown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCall {
    Countdown(Purpose, u8),
    TouchSurface(Purpose),
    Teardown { was_present: bool },
}

/// Records every call; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingOverlay {
    inner: Arc<Mutex<RecordingState>>,
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<OverlayCall>,
    shown: bool,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<OverlayCall> {
        self.inner.lock().calls.clone()
    }

    pub fn is_showing(&self) -> bool {
        self.inner.lock().shown
    }

    /// Simulate the platform removing the view behind our back
    pub fn vanish(&self) {
        self.inner.lock().shown = false;
    }
}

impl CaptureOverlay for RecordingOverlay {
    fn show_countdown(&mut self, purpose: Purpose, remaining: u8) {
        let mut s = self.inner.lock();
        s.shown = true;
        s.calls.push(OverlayCall::Countdown(purpose, remaining));
    }

    fn show_touch_surface(&mut self, purpose: Purpose) {
        let mut s = self.inner.lock();
        s.shown = true;
        s.calls.push(OverlayCall::TouchSurface(purpose));
    }

    fn teardown(&mut self) -> bool {
        let mut s = self.inner.lock();
        let was_present = std::mem::take(&mut s.shown);
        s.calls.push(OverlayCall::Teardown { was_present });
        was_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_is_idempotent() {
        let mut overlay = NullOverlay::default();
        assert!(!overlay.teardown());
        overlay.show_countdown(Purpose::TapTarget, 3);
        assert!(overlay.teardown());
        assert!(!overlay.teardown());
    }

    #[test]
    fn recording_overlay_notices_vanished_views() {
        let observed = RecordingOverlay::new();
        let mut overlay = observed.clone();
        overlay.show_touch_surface(Purpose::SwipeEnd);
        observed.vanish();
        assert!(!overlay.teardown());
        assert_eq!(
            observed.calls().last(),
            Some(&OverlayCall::Teardown { was_present: false })
        );
    }
}
