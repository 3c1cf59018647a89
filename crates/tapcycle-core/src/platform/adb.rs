//! Android input injection through `adb shell input`
//!
//! Each gesture spawns one adb process. A waiter thread reaps it and reports
//! the outcome, so `tap`/`swipe` return as soon as the process is running.

use crate::dispatch::{Gesture, GestureOutcome, GestureStatus, InputDispatcher, OutcomeSender};
use crate::error::{Error, Result};
use crate::step::Point;
use std::process::{Command, Stdio};
use std::thread;

#[derive(Debug, Clone)]
pub struct AdbConfig {
    /// adb executable, resolved through PATH when not absolute
    pub adb_path: String,
    /// Device serial (`adb -s`); None targets the only attached device
    pub serial: Option<String>,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            serial: None,
        }
    }
}

pub struct AdbDispatcher {
    config: AdbConfig,
    outcomes: Option<OutcomeSender>,
}

impl AdbDispatcher {
    pub fn new(config: AdbConfig) -> Self {
        Self {
            config,
            outcomes: None,
        }
    }

    pub fn with_outcomes(mut self, tx: OutcomeSender) -> Self {
        self.outcomes = Some(tx);
        self
    }

    pub fn config(&self) -> &AdbConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.adb_path);
        if let Some(serial) = &self.config.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd
    }

    /// Serials of attached devices in the `device` state
    pub fn devices(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.config.adb_path)
            .arg("devices")
            .output()
            .map_err(|e| Error::dispatcher_unavailable(&e.to_string()))?;

        if !output.status.success() {
            return Err(Error::dispatcher_unavailable("`adb devices` failed"));
        }

        Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
    }

    fn spawn(&self, gesture: Gesture) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(input_args(&gesture))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            Error::dispatcher_unavailable(&format!("could not run {}: {}", self.config.adb_path, e))
                .with_suggestions(vec![
                    "Install Android platform-tools and make sure adb is on PATH".to_string(),
                ])
        })?;

        tracing::debug!(%gesture, pid = child.id(), "gesture sent");

        let tx = self.outcomes.clone();
        thread::spawn(move || {
            let status = match child.wait_with_output() {
                Ok(out) if out.status.success() => GestureStatus::Completed,
                Ok(out) => {
                    tracing::debug!(
                        %gesture,
                        stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                        "adb input exited with {}",
                        out.status
                    );
                    GestureStatus::Cancelled
                }
                Err(e) => {
                    tracing::debug!(%gesture, error = %e, "lost track of adb process");
                    GestureStatus::Cancelled
                }
            };
            if let Some(tx) = tx {
                let _ = tx.try_send(GestureOutcome { gesture, status });
            }
        });

        Ok(())
    }
}

impl InputDispatcher for AdbDispatcher {
    fn tap(&self, x: f64, y: f64) -> Result<()> {
        self.spawn(Gesture::Tap { at: Point::new(x, y) })
    }

    fn swipe(&self, start_x: f64, start_y: f64, end_x: f64, end_y: f64, duration_ms: u64) -> Result<()> {
        self.spawn(Gesture::Swipe {
            from: Point::new(start_x, start_y),
            to: Point::new(end_x, end_y),
            duration_ms,
        })
    }
}

/// Arguments after `adb [-s serial]`
fn input_args(gesture: &Gesture) -> Vec<String> {
    let px = |v: f64| format!("{}", v.round() as i64);
    match gesture {
        Gesture::Tap { at } => vec![
            "shell".into(),
            "input".into(),
            "tap".into(),
            px(at.x),
            px(at.y),
        ],
        Gesture::Swipe {
            from,
            to,
            duration_ms,
        } => vec![
            "shell".into(),
            "input".into(),
            "swipe".into(),
            px(from.x),
            px(from.y),
            px(to.x),
            px(to.y),
            duration_ms.to_string(),
        ],
    }
}

fn parse_devices(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|l| !l.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn tap_args() {
        let args = input_args(&Gesture::Tap { at: Point::new(10.4, 20.6) });
        assert_eq!(args, ["shell", "input", "tap", "10", "21"]);
    }

    #[test]
    fn swipe_args() {
        let args = input_args(&Gesture::Swipe {
            from: Point::new(0.0, 0.0),
            to: Point::new(100.0, 250.0),
            duration_ms: 300,
        });
        assert_eq!(args, ["shell", "input", "swipe", "0", "0", "100", "250", "300"]);
    }

    #[test]
    fn parses_device_listing() {
        let listing = "* daemon started successfully\n\
                       List of devices attached\n\
                       emulator-5554\tdevice\n\
                       R58M123ABC\tunauthorized\n\
                       192.168.1.20:5555\tdevice\n\n";
        assert_eq!(parse_devices(listing), ["emulator-5554", "192.168.1.20:5555"]);
    }

    #[test]
    fn missing_adb_is_unavailable() {
        let d = AdbDispatcher::new(AdbConfig {
            adb_path: "/nonexistent/tapcycle-adb".to_string(),
            serial: None,
        });
        let err = d.tap(1.0, 1.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::DispatcherUnavailable);
    }
}
