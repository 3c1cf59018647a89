//! Terminal stand-in for the on-screen capture overlay

use std::io::{self, Write};
use tapcycle::{CaptureOverlay, Purpose};

/// Prints countdowns and touch prompts to stdout
#[derive(Debug, Default)]
pub struct TerminalOverlay {
    shown: bool,
}

impl CaptureOverlay for TerminalOverlay {
    fn show_countdown(&mut self, purpose: Purpose, remaining: u8) {
        print!("\r{} in {}...", purpose, remaining);
        let _ = io::stdout().flush();
        self.shown = true;
    }

    fn show_touch_surface(&mut self, purpose: Purpose) {
        println!("\r{}: enter `x y` (or `cancel`)", purpose);
        self.shown = true;
    }

    fn teardown(&mut self) -> bool {
        if self.shown {
            print!("\r\x1b[K");
            let _ = io::stdout().flush();
        }
        std::mem::take(&mut self.shown)
    }
}
