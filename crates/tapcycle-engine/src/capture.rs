//! Interactive capture state machine
//!
//! A session walks through one or more stages. Each stage is a countdown
//! (one tick per interval) followed by a wait for a single touch. The end of
//! a plain swipe capture skips the countdown and only settles briefly, so
//! the finger can go straight from start to end. When the last stage gets
//! its touch the captured points are turned into steps and committed in one
//! batch; a plain swipe is then previewed once.
//!
//! The machine is pure: [`CaptureSession::advance`] takes an event and
//! returns the effects the engine must carry out (overlay calls, timers,
//! the final commit). Nothing here touches a clock or a screen.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tapcycle_core::step::DEFAULT_SWIPE_DURATION_MS;
use tapcycle_core::{Gesture, Point, Purpose, Step};

/// Pause between the swipe start touch and the swipe end surface
pub const SWIPE_END_SETTLE: Duration = Duration::from_millis(500);

/// How long after a swipe commit the preview gesture runs
pub const PREVIEW_DELAY: Duration = Duration::from_secs(1);

pub const PREVIEW_SWIPE_MS: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// One tap
    Tap,
    /// Swipe start, then swipe end
    Swipe,
    /// Tap, swipe start, swipe end, tap
    Combo,
}

impl CaptureKind {
    pub fn stages(&self) -> &'static [Purpose] {
        match self {
            CaptureKind::Tap => &[Purpose::TapTarget],
            CaptureKind::Swipe => &[Purpose::SwipeStart, Purpose::SwipeEnd],
            CaptureKind::Combo => &[
                Purpose::TapTarget,
                Purpose::SwipeStart,
                Purpose::SwipeEnd,
                Purpose::TapTarget,
            ],
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureKind::Tap => "tap",
            CaptureKind::Swipe => "swipe",
            CaptureKind::Combo => "combo",
        })
    }
}

impl FromStr for CaptureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tap" => Ok(CaptureKind::Tap),
            "swipe" => Ok(CaptureKind::Swipe),
            "combo" => Ok(CaptureKind::Combo),
            other => Err(format!("unknown capture kind '{}' (tap, swipe, combo)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Countdown { remaining: u8, purpose: Purpose },
    /// Short pause with nothing on screen before the touch surface
    Settling(Purpose),
    AwaitingTouch(Purpose),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEvent {
    Begin,
    Tick,
    Touch(Point),
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowCountdown { purpose: Purpose, remaining: u8 },
    ArmTick(Duration),
    CancelTick,
    ShowTouchSurface(Purpose),
    TearDownOverlay,
    Commit(Vec<Step>),
    /// Play `gesture` once, `after` the commit, so the user sees the result
    Preview { gesture: Gesture, after: Duration },
    Discarded,
}

#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    pub ticks: u8,
    pub interval: Duration,
}

impl Default for Countdown {
    fn default() -> Self {
        Self {
            ticks: 3,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    kind: CaptureKind,
    countdown: Countdown,
    stage: Stage,
    stage_index: usize,
    points: Vec<Point>,
}

impl CaptureSession {
    pub fn new(kind: CaptureKind, countdown: Countdown) -> Self {
        Self {
            kind,
            countdown,
            stage: Stage::Idle,
            stage_index: 0,
            points: Vec::with_capacity(kind.stages().len()),
        }
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn captured(&self) -> &[Point] {
        &self.points
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn advance(&mut self, event: CaptureEvent) -> Vec<Effect> {
        let mut fx = Vec::new();

        match (self.stage, event) {
            (Stage::Idle, CaptureEvent::Begin) => {
                self.enter_stage(&mut fx);
            }

            (Stage::Countdown { remaining, purpose }, CaptureEvent::Tick) => {
                if remaining > 1 {
                    let remaining = remaining - 1;
                    self.stage = Stage::Countdown { remaining, purpose };
                    fx.push(Effect::ShowCountdown { purpose, remaining });
                    fx.push(Effect::ArmTick(self.countdown.interval));
                } else {
                    fx.push(Effect::TearDownOverlay);
                    self.await_touch(purpose, &mut fx);
                }
            }

            (Stage::Settling(purpose), CaptureEvent::Tick) => {
                self.await_touch(purpose, &mut fx);
            }

            (Stage::AwaitingTouch(_), CaptureEvent::Touch(at)) => {
                self.points.push(at);
                fx.push(Effect::TearDownOverlay);
                self.stage_index += 1;
                if self.stage_index < self.kind.stages().len() {
                    self.enter_stage(&mut fx);
                } else {
                    self.stage = Stage::Done;
                    fx.push(Effect::Commit(self.materialize()));
                    if let Some(gesture) = self.preview() {
                        fx.push(Effect::Preview {
                            gesture,
                            after: PREVIEW_DELAY,
                        });
                    }
                }
            }

            (Stage::Countdown { .. } | Stage::Settling(_), CaptureEvent::Cancel) => {
                fx.push(Effect::CancelTick);
                fx.push(Effect::TearDownOverlay);
                self.discard(&mut fx);
            }

            (Stage::AwaitingTouch(_), CaptureEvent::Cancel) => {
                fx.push(Effect::TearDownOverlay);
                self.discard(&mut fx);
            }

            // Touches before the surface is up, stale ticks, and anything
            // after Done are dropped.
            (stage, event) => {
                tracing::trace!(?stage, ?event, "capture event ignored");
            }
        }

        fx
    }

    fn enter_stage(&mut self, fx: &mut Vec<Effect>) {
        let purpose = self.kind.stages()[self.stage_index];
        if self.kind == CaptureKind::Swipe && purpose == Purpose::SwipeEnd {
            self.stage = Stage::Settling(purpose);
            fx.push(Effect::ArmTick(SWIPE_END_SETTLE));
            return;
        }
        if self.countdown.ticks == 0 {
            self.await_touch(purpose, fx);
            return;
        }
        let remaining = self.countdown.ticks;
        self.stage = Stage::Countdown { remaining, purpose };
        fx.push(Effect::ShowCountdown { purpose, remaining });
        fx.push(Effect::ArmTick(self.countdown.interval));
    }

    fn await_touch(&mut self, purpose: Purpose, fx: &mut Vec<Effect>) {
        self.stage = Stage::AwaitingTouch(purpose);
        fx.push(Effect::ShowTouchSurface(purpose));
    }

    fn discard(&mut self, fx: &mut Vec<Effect>) {
        self.points.clear();
        self.stage = Stage::Done;
        fx.push(Effect::Discarded);
    }

    fn preview(&self) -> Option<Gesture> {
        match (self.kind, self.points.as_slice()) {
            (CaptureKind::Swipe, [from, to]) => Some(Gesture::Swipe {
                from: *from,
                to: *to,
                duration_ms: PREVIEW_SWIPE_MS,
            }),
            _ => None,
        }
    }

    fn materialize(&self) -> Vec<Step> {
        match (self.kind, self.points.as_slice()) {
            (CaptureKind::Tap, [at]) => vec![Step::tap(*at)],
            (CaptureKind::Swipe, [from, to]) => {
                vec![Step::swipe(*from, *to, DEFAULT_SWIPE_DURATION_MS)]
            }
            (CaptureKind::Combo, [first, from, to, second]) => vec![
                Step::tap(*first),
                Step::swipe(*from, *to, DEFAULT_SWIPE_DURATION_MS),
                Step::tap(*second),
            ],
            (kind, points) => {
                // stage_index only reaches the end after one point per stage
                tracing::error!(%kind, captured = points.len(), "capture ended with wrong point count");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> Countdown {
        Countdown {
            ticks: 3,
            interval: Duration::from_secs(1),
        }
    }

    /// Run a stage's countdown to the touch surface
    fn count_down(s: &mut CaptureSession) {
        for _ in 0..3 {
            s.advance(CaptureEvent::Tick);
        }
        assert!(matches!(s.stage(), Stage::AwaitingTouch(_)));
    }

    #[test]
    fn begin_shows_full_countdown() {
        let mut s = CaptureSession::new(CaptureKind::Tap, quick());
        let fx = s.advance(CaptureEvent::Begin);
        assert_eq!(
            fx,
            vec![
                Effect::ShowCountdown { purpose: Purpose::TapTarget, remaining: 3 },
                Effect::ArmTick(Duration::from_secs(1)),
            ]
        );
    }

    #[test]
    fn countdown_rerenders_then_installs_surface() {
        let mut s = CaptureSession::new(CaptureKind::Tap, quick());
        s.advance(CaptureEvent::Begin);
        assert_eq!(
            s.advance(CaptureEvent::Tick)[0],
            Effect::ShowCountdown { purpose: Purpose::TapTarget, remaining: 2 }
        );
        s.advance(CaptureEvent::Tick);
        assert_eq!(
            s.advance(CaptureEvent::Tick),
            vec![
                Effect::TearDownOverlay,
                Effect::ShowTouchSurface(Purpose::TapTarget),
            ]
        );
        assert_eq!(s.stage(), Stage::AwaitingTouch(Purpose::TapTarget));
    }

    #[test]
    fn single_tap_commits_one_step() {
        let mut s = CaptureSession::new(CaptureKind::Tap, quick());
        s.advance(CaptureEvent::Begin);
        count_down(&mut s);
        let fx = s.advance(CaptureEvent::Touch(Point::new(40.0, 80.0)));
        assert_eq!(
            fx,
            vec![
                Effect::TearDownOverlay,
                Effect::Commit(vec![Step::tap(Point::new(40.0, 80.0))]),
            ]
        );
        assert!(s.is_finished());
    }

    #[test]
    fn touch_during_countdown_is_ignored() {
        let mut s = CaptureSession::new(CaptureKind::Tap, quick());
        s.advance(CaptureEvent::Begin);
        assert!(s.advance(CaptureEvent::Touch(Point::new(1.0, 1.0))).is_empty());
        assert!(s.captured().is_empty());
    }

    #[test]
    fn combo_commits_tap_swipe_tap() {
        let (a, b, c, d) = (
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
            Point::new(4.0, 4.0),
        );
        let mut s = CaptureSession::new(CaptureKind::Combo, quick());
        s.advance(CaptureEvent::Begin);

        let mut last = Vec::new();
        for (i, p) in [a, b, c, d].into_iter().enumerate() {
            count_down(&mut s);
            last = s.advance(CaptureEvent::Touch(p));
            if i < 3 {
                assert!(matches!(s.stage(), Stage::Countdown { remaining: 3, .. }));
            }
        }

        assert_eq!(
            last.last(),
            Some(&Effect::Commit(vec![
                Step::tap(a),
                Step::swipe(b, c, DEFAULT_SWIPE_DURATION_MS),
                Step::tap(d),
            ]))
        );
    }

    #[test]
    fn combo_stage_prompts_follow_the_plan() {
        let mut s = CaptureSession::new(CaptureKind::Combo, quick());
        s.advance(CaptureEvent::Begin);
        let mut seen = Vec::new();
        for _ in 0..4 {
            count_down(&mut s);
            if let Stage::AwaitingTouch(p) = s.stage() {
                seen.push(p);
            }
            s.advance(CaptureEvent::Touch(Point::default()));
        }
        assert_eq!(seen, CaptureKind::Combo.stages());
    }

    #[test]
    fn cancel_mid_combo_discards_everything() {
        let mut s = CaptureSession::new(CaptureKind::Combo, quick());
        s.advance(CaptureEvent::Begin);
        count_down(&mut s);
        s.advance(CaptureEvent::Touch(Point::new(1.0, 1.0)));
        count_down(&mut s);
        s.advance(CaptureEvent::Touch(Point::new(2.0, 2.0)));

        let fx = s.advance(CaptureEvent::Cancel);
        assert_eq!(
            fx,
            vec![Effect::CancelTick, Effect::TearDownOverlay, Effect::Discarded]
        );
        assert!(s.is_finished());
        assert!(s.captured().is_empty());
        assert!(s.advance(CaptureEvent::Touch(Point::new(3.0, 3.0))).is_empty());
    }

    #[test]
    fn swipe_end_settles_without_a_countdown() {
        let (from, to) = (Point::new(10.0, 10.0), Point::new(90.0, 400.0));
        let mut s = CaptureSession::new(CaptureKind::Swipe, quick());
        s.advance(CaptureEvent::Begin);
        count_down(&mut s);

        assert_eq!(
            s.advance(CaptureEvent::Touch(from)),
            vec![Effect::TearDownOverlay, Effect::ArmTick(SWIPE_END_SETTLE)]
        );
        assert_eq!(s.stage(), Stage::Settling(Purpose::SwipeEnd));
        assert!(s.advance(CaptureEvent::Touch(to)).is_empty());

        assert_eq!(
            s.advance(CaptureEvent::Tick),
            vec![Effect::ShowTouchSurface(Purpose::SwipeEnd)]
        );
        assert_eq!(
            s.advance(CaptureEvent::Touch(to)),
            vec![
                Effect::TearDownOverlay,
                Effect::Commit(vec![Step::swipe(from, to, DEFAULT_SWIPE_DURATION_MS)]),
                Effect::Preview {
                    gesture: Gesture::Swipe { from, to, duration_ms: PREVIEW_SWIPE_MS },
                    after: PREVIEW_DELAY,
                },
            ]
        );
    }

    #[test]
    fn cancel_while_settling() {
        let mut s = CaptureSession::new(CaptureKind::Swipe, quick());
        s.advance(CaptureEvent::Begin);
        count_down(&mut s);
        s.advance(CaptureEvent::Touch(Point::new(1.0, 1.0)));
        assert_eq!(
            s.advance(CaptureEvent::Cancel),
            vec![Effect::CancelTick, Effect::TearDownOverlay, Effect::Discarded]
        );
        assert!(s.captured().is_empty());
    }

    #[test]
    fn cancel_while_awaiting_touch() {
        let mut s = CaptureSession::new(CaptureKind::Swipe, quick());
        s.advance(CaptureEvent::Begin);
        count_down(&mut s);
        assert_eq!(
            s.advance(CaptureEvent::Cancel),
            vec![Effect::TearDownOverlay, Effect::Discarded]
        );
    }

    #[test]
    fn cancel_before_begin_is_a_no_op() {
        let mut s = CaptureSession::new(CaptureKind::Tap, quick());
        assert!(s.advance(CaptureEvent::Cancel).is_empty());
        assert_eq!(s.stage(), Stage::Idle);
    }

    #[test]
    fn zero_tick_countdown_goes_straight_to_touch() {
        let mut s = CaptureSession::new(
            CaptureKind::Combo,
            Countdown { ticks: 0, interval: Duration::ZERO },
        );
        assert_eq!(
            s.advance(CaptureEvent::Begin),
            vec![Effect::ShowTouchSurface(Purpose::TapTarget)]
        );
        let fx = s.advance(CaptureEvent::Touch(Point::new(0.0, 0.0)));
        assert_eq!(fx.last(), Some(&Effect::ShowTouchSurface(Purpose::SwipeStart)));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Combo".parse::<CaptureKind>(), Ok(CaptureKind::Combo));
        assert!("drag".parse::<CaptureKind>().is_err());
    }
}
