//! Platform adapters
//!
//! Concrete dispatchers for real devices.
//!
//! - **Android**: `adb shell input` (any host with adb installed)

pub mod adb;

pub use adb::{AdbConfig, AdbDispatcher};
