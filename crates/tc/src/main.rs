//! tc - tapcycle CLI
//!
//! Record tap/swipe macros, keep them as named step groups, and replay them
//! in a loop on an Android device through adb.

mod overlay;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver};
use serde::Serialize;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use tapcycle::prelude::*;
use tapcycle::{alarm, Scheduler};

use crate::overlay::TerminalOverlay;

#[derive(Parser)]
#[command(name = "tc")]
#[command(about = "tapcycle - record and replay tap/swipe macros on Android devices")]
#[command(version)]
struct Cli {
    /// Step-group directory (default: ~/.tapcycle)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // === Step groups ===
    /// List saved step groups
    List,
    /// Show the steps of a group
    Show {
        group: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete a group
    Delete { group: String },
    /// Rename a group
    Rename { old: String, new: String },

    // === Editing ===
    /// Append a tap (creates the group if needed)
    AddTap {
        group: String,
        x: f64,
        y: f64,
        /// Wait after the tap, in ms
        #[arg(long, default_value = "1000")]
        delay: u64,
    },
    /// Append a swipe (creates the group if needed)
    AddSwipe {
        group: String,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        /// Swipe duration in ms; below 100 plays as 300
        #[arg(long, default_value = "500")]
        duration: u64,
        /// Wait after the swipe, in ms
        #[arg(long, default_value = "1000")]
        delay: u64,
    },
    /// Set the wait after step INDEX
    SetDelay {
        group: String,
        index: usize,
        delay: u64,
    },
    /// Lengthen or shorten the wait after step INDEX (shortening stops at 100ms)
    Nudge {
        group: String,
        index: usize,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },

    // === Playback ===
    /// Replay a group in a loop until Ctrl+C
    Run {
        group: String,
        /// Log gestures instead of sending them
        #[arg(long)]
        dry_run: bool,
        /// Device serial
        #[arg(long)]
        serial: Option<String>,
        #[arg(long, default_value = "adb")]
        adb: String,
        /// Wait until this local time (HH:MM:SS) before starting
        #[arg(long)]
        at: Option<String>,
    },
    /// Capture new steps from typed coordinates and append them to a group
    Record {
        group: String,
        #[arg(long, default_value = "tap")]
        kind: CaptureKind,
        /// Countdown seconds before each pick
        #[arg(long, default_value = "3")]
        countdown: u8,
    },
    /// List attached adb devices
    Devices {
        #[arg(long, default_value = "adb")]
        adb: String,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match open_store(cli.dir) {
        Ok(mut store) => dispatch(&mut store, cli.command),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(store: &mut StepGroupStore, command: Commands) -> Result<()> {
    match command {
        Commands::List => list(store),
        Commands::Show { group, json } => with_json(json, || show(store, &group, json)),
        Commands::Delete { group } => delete(store, &group),
        Commands::Rename { old, new } => rename(store, &old, &new),
        Commands::AddTap { group, x, y, delay } => add_tap(store, &group, x, y, delay),
        Commands::AddSwipe { group, x1, y1, x2, y2, duration, delay } => {
            add_swipe(store, &group, Point::new(x1, y1), Point::new(x2, y2), duration, delay)
        }
        Commands::SetDelay { group, index, delay } => set_delay(store, &group, index, delay),
        Commands::Nudge { group, index, delta } => nudge(store, &group, index, delta),
        Commands::Run { group, dry_run, serial, adb, at } => {
            run(store, &group, dry_run, AdbConfig { adb_path: adb, serial }, at.as_deref())
        }
        Commands::Record { group, kind, countdown } => record(store, &group, kind, countdown),
        Commands::Devices { adb } => devices(adb),
    }
}

/// In JSON mode, structured errors are also printed as an `Output`
fn with_json<F>(json: bool, f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match f() {
        Ok(()) => Ok(()),
        Err(e) => {
            if json {
                if let Some(err) = e.downcast_ref::<Error>() {
                    print_json(&Output::<()>::err(err.clone()))?;
                }
            }
            Err(e)
        }
    }
}

fn open_store(dir: Option<PathBuf>) -> Result<StepGroupStore> {
    let store = match &dir {
        Some(dir) => StepGroupStore::open(dir),
        None => StepGroupStore::open_default(),
    };
    store.context("Failed to open step-group store")
}

fn load_group(store: &StepGroupStore, name: &str) -> Result<StepGroup> {
    store
        .load(name)
        .ok_or_else(|| Error::group_not_found(name).into())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Step groups
// ══════════════════════════════════════════════════════════════════════════════

fn list(store: &StepGroupStore) -> Result<()> {
    let names = store.list_names()?;
    if names.is_empty() {
        println!("No step groups saved.");
        return Ok(());
    }
    for name in names {
        match store.load(&name) {
            Some(group) => println!("{} ({} steps)", name, group.steps.len()),
            None => println!("{} (unreadable)", name),
        }
    }
    Ok(())
}

fn show(store: &StepGroupStore, name: &str, json: bool) -> Result<()> {
    let group = load_group(store, name)?;
    if json {
        return print_json(&Output::ok(group));
    }
    let cycle_ms: u64 = group.steps.iter().map(Step::delay_after_ms).sum();
    println!("Name: {}", group.name);
    println!("Steps: {}", group.steps.len());
    println!("Cycle: {}ms", cycle_ms);
    for (i, step) in group.steps.iter().enumerate() {
        println!("{:>3}: {}, then {}ms", i, step, step.delay_after_ms());
    }
    Ok(())
}

fn delete(store: &mut StepGroupStore, name: &str) -> Result<()> {
    store.delete(name)?;
    println!("Deleted: {}", name);
    Ok(())
}

fn rename(store: &mut StepGroupStore, old: &str, new: &str) -> Result<()> {
    if store.rename(old, new)? {
        println!("Renamed: {} -> {}", old, new);
    } else {
        println!("No step group named {}, nothing renamed", old);
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Editing
// ══════════════════════════════════════════════════════════════════════════════

/// Load `name` into a scheduler, apply `f`, save. Returns the new step count.
fn edit<F>(store: &mut StepGroupStore, name: &str, create: bool, f: F) -> Result<usize>
where
    F: FnOnce(&mut Scheduler) -> Result<()>,
{
    let steps = match store.load(name) {
        Some(group) => group.steps,
        None if create => Vec::new(),
        None => return Err(Error::group_not_found(name).into()),
    };
    let mut scheduler = Scheduler::with_steps(steps);
    f(&mut scheduler)?;
    store.save(name, scheduler.steps())?;
    Ok(scheduler.step_count())
}

fn add_tap(store: &mut StepGroupStore, name: &str, x: f64, y: f64, delay: u64) -> Result<()> {
    let count = edit(store, name, true, |s| {
        s.add_tap_step(x, y, delay);
        Ok(())
    })?;
    println!("Added tap {} to {} ({} steps)", Point::new(x, y), name, count);
    Ok(())
}

fn add_swipe(
    store: &mut StepGroupStore,
    name: &str,
    from: Point,
    to: Point,
    duration: u64,
    delay: u64,
) -> Result<()> {
    let count = edit(store, name, true, |s| {
        s.add_swipe_step(from, to, duration, delay);
        Ok(())
    })?;
    println!("Added swipe {} -> {} to {} ({} steps)", from, to, name, count);
    Ok(())
}

fn set_delay(store: &mut StepGroupStore, name: &str, index: usize, delay: u64) -> Result<()> {
    edit(store, name, false, |s| {
        if !s.update_step_delay(index, delay) {
            bail!("{} has no step {}", name, index);
        }
        Ok(())
    })?;
    println!("Step {} of {} now waits {}ms", index, name, delay);
    Ok(())
}

fn nudge(store: &mut StepGroupStore, name: &str, index: usize, delta: i64) -> Result<()> {
    let mut delay = 0;
    edit(store, name, false, |s| {
        delay = s
            .nudge_step_delay(index, delta)
            .with_context(|| format!("{} has no step {}", name, index))?;
        Ok(())
    })?;
    println!("Step {} of {} now waits {}ms", index, name, delay);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Playback
// ══════════════════════════════════════════════════════════════════════════════

/// Fires once on the first Ctrl+C
fn interrupt_channel() -> Result<Receiver<()>> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    Ok(rx)
}

fn run(
    store: &StepGroupStore,
    name: &str,
    dry_run: bool,
    adb: AdbConfig,
    at: Option<&str>,
) -> Result<()> {
    let group = load_group(store, name)?;
    if group.steps.is_empty() {
        println!("{} has no steps, nothing to run.", name);
        return Ok(());
    }
    let start_at = at.map(alarm::parse_time_of_day).transpose()?;

    let (tx, rx) = outcome_channel();
    let engine = if dry_run {
        Engine::new(DryRunDispatcher::new().with_outcomes(tx), NullOverlay::default())
    } else {
        let dispatcher = AdbDispatcher::new(adb).with_outcomes(tx);
        let attached = dispatcher.devices().context("adb is not usable")?;
        if attached.is_empty() {
            bail!("No adb device attached");
        }
        Engine::new(dispatcher, NullOverlay::default())
    };

    let mut handle = runtime::spawn(engine, rx);
    let events = handle.subscribe()?;
    let steps = group.steps.len();
    handle.replace_steps(group.steps)?;

    match start_at {
        Some(time) => {
            let delay = handle.schedule_start_at(time)?;
            println!(
                "{} ({} steps) starts at {} (in {}s). Ctrl+C to stop.",
                name,
                steps,
                time.format("%H:%M:%S"),
                delay.as_secs()
            );
        }
        None => {
            handle.start()?;
            println!("Running {} ({} steps). Ctrl+C to stop.", name, steps);
        }
    }

    let interrupted = interrupt_channel()?;
    let mut progress = RunProgress::default();
    let mut running = true;
    while running {
        select! {
            recv(interrupted) -> _ => {
                tracing::info!("interrupted");
                running = false;
            }
            recv(events) -> event => match event {
                Ok(event) => running = progress.observe(event),
                Err(_) => running = false,
            },
        }
    }
    handle.shutdown();

    if let Some((index, error)) = progress.failure {
        return Err(anyhow::Error::new(error).context(format!("Step {} of {} failed", index, name)));
    }
    println!("Stopped after {} gestures.", progress.dispatched);
    Ok(())
}

/// What `run` has seen of the engine so far
#[derive(Debug, Default)]
struct RunProgress {
    dispatched: usize,
    failure: Option<(usize, tapcycle::Error)>,
}

impl RunProgress {
    /// Returns whether the run should keep going
    fn observe(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::StepDispatched { index, gesture, .. } => {
                self.dispatched += 1;
                println!("#{} {}", index, gesture);
                true
            }
            EngineEvent::RunFailed { index, error } => {
                tracing::warn!(index, %error, "run failed");
                self.failure = Some((index, error));
                false
            }
            EngineEvent::RunStateChanged { running: false } if self.failure.is_none() => {
                tracing::info!(dispatched = self.dispatched, "run stopped");
                false
            }
            event => {
                tracing::debug!(?event, "engine event");
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TouchInput {
    At(Point),
    Cancel,
}

/// `x y`, `x,y` or `cancel`
fn parse_touch(line: &str) -> Option<TouchInput> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("cancel") || line.eq_ignore_ascii_case("q") {
        return Some(TouchInput::Cancel);
    }
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(TouchInput::At(Point::new(x, y)))
}

/// Lines from stdin, read on a helper thread
fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn record(store: &mut StepGroupStore, name: &str, kind: CaptureKind, countdown: u8) -> Result<()> {
    let existing = store.load(name).map(|g| g.steps).unwrap_or_default();

    // the session ends on commit, before a preview could play
    let config = EngineConfig {
        countdown: Countdown {
            ticks: countdown,
            interval: Duration::from_secs(1),
        },
        preview_swipe: false,
    };
    let (_tx, rx) = outcome_channel();
    let engine = Engine::with_config(DryRunDispatcher::new(), TerminalOverlay::default(), config);
    let mut handle = runtime::spawn(engine, rx);
    let events = handle.subscribe()?;
    handle.replace_steps(existing)?;

    let interrupted = interrupt_channel()?;
    let lines = stdin_lines();
    let mut stdin_open = true;

    println!("Recording a {} into {}", kind, name);
    handle.begin_capture(kind)?;

    let mut added = None;
    let mut running = true;
    while running {
        let input = if stdin_open { lines.clone() } else { never() };
        select! {
            recv(interrupted) -> _ => handle.cancel_capture()?,
            recv(input) -> line => match line {
                Ok(line) => match parse_touch(&line) {
                    Some(TouchInput::At(at)) => handle.touch(at)?,
                    Some(TouchInput::Cancel) => handle.cancel_capture()?,
                    None => println!("Expected `x y` or `cancel`"),
                },
                Err(_) => {
                    stdin_open = false;
                    handle.cancel_capture()?;
                }
            },
            recv(events) -> event => match event {
                Ok(EngineEvent::CaptureFinished { added: n, .. }) => {
                    added = Some(n);
                    running = false;
                }
                Ok(EngineEvent::CaptureCancelled { .. }) | Err(_) => running = false,
                Ok(event) => tracing::debug!(?event, "engine event"),
            },
        }
    }

    let snapshot = handle.snapshot()?;
    handle.shutdown();

    match added {
        Some(n) => {
            store.save(name, &snapshot.steps)?;
            println!("Added {} steps to {} ({} total)", n, name, snapshot.steps.len());
        }
        None => println!("Capture cancelled, {} unchanged.", name),
    }
    Ok(())
}

fn devices(adb: String) -> Result<()> {
    let dispatcher = AdbDispatcher::new(AdbConfig { adb_path: adb, serial: None });
    let serials = dispatcher.devices()?;
    if serials.is_empty() {
        println!("No devices attached.");
    }
    for serial in serials {
        println!("{}", serial);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_touch_forms() {
        assert_eq!(
            parse_touch("120 640"),
            Some(TouchInput::At(Point::new(120.0, 640.0)))
        );
        assert_eq!(
            parse_touch(" 12.5, 7 "),
            Some(TouchInput::At(Point::new(12.5, 7.0)))
        );
        assert_eq!(parse_touch("Cancel"), Some(TouchInput::Cancel));
        assert_eq!(parse_touch("1 2 3"), None);
        assert_eq!(parse_touch("left"), None);
        assert_eq!(parse_touch(""), None);
    }

    #[test]
    fn cli_parses_negative_nudge() {
        let cli = Cli::try_parse_from(["tc", "nudge", "farm", "2", "-100"]).unwrap();
        match cli.command {
            Commands::Nudge { group, index, delta } => {
                assert_eq!(group, "farm");
                assert_eq!(index, 2);
                assert_eq!(delta, -100);
            }
            _ => panic!("expected nudge"),
        }
    }

    #[test]
    fn cli_parses_record_kind() {
        let cli = Cli::try_parse_from(["tc", "--dir", "/tmp/x", "record", "g", "--kind", "combo"])
            .unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(
            cli.command,
            Commands::Record { kind: CaptureKind::Combo, countdown: 3, .. }
        ));
    }

    #[test]
    fn run_progress_stops_on_failure_or_stop() {
        let mut progress = RunProgress::default();
        let tap = Gesture::Tap { at: Point::new(1.0, 1.0) };
        assert!(progress.observe(EngineEvent::RunStateChanged { running: true }));
        assert!(progress.observe(EngineEvent::StepDispatched { at: 0, index: 0, gesture: tap }));
        assert!(progress.observe(EngineEvent::StepsChanged { count: 1 }));
        assert_eq!(progress.dispatched, 1);

        let error = tapcycle::Error::dispatcher_unavailable("no device");
        assert!(!progress.observe(EngineEvent::RunFailed { index: 0, error }));
        assert!(matches!(progress.failure, Some((0, _))));

        let mut stopped = RunProgress::default();
        assert!(!stopped.observe(EngineEvent::RunStateChanged { running: false }));
        assert!(stopped.failure.is_none());
    }

    #[test]
    fn edit_creates_and_updates_groups() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StepGroupStore::open(dir.path()).unwrap();

        add_tap(&mut store, "g", 1.0, 2.0, 400).unwrap();
        add_swipe(&mut store, "g", Point::new(0.0, 0.0), Point::new(5.0, 5.0), 50, 900).unwrap();
        set_delay(&mut store, "g", 0, 250).unwrap();
        nudge(&mut store, "g", 1, -2000).unwrap();

        let steps = store.load("g").unwrap().steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].delay_after_ms(), 250);
        assert_eq!(steps[1].delay_after_ms(), 100);
        assert!(set_delay(&mut store, "g", 9, 1).is_err());
        assert!(nudge(&mut store, "missing", 0, 1).is_err());
    }
}
