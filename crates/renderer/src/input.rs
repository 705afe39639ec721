//! Normalizes heterogeneous input sources into a single eased pointer state.
//!
//! Hosts translate window events into [`InputEvent`]s carrying normalized
//! [0,1]² coordinates; the tracker owns easing, velocity smoothing, and the
//! inactivity relaxation. Event handlers only move the target; the eased
//! `current` position advances exclusively from [`PointerTracker::tick`],
//! which the frame loop calls once per frame.

use std::time::{Duration, Instant};

/// Normalized distance a single event may move the target before it is
/// treated as a discontinuity (pointer re-entry, teleporting touch).
const DISCONTINUITY_THRESHOLD: f32 = 0.5;
/// Velocity magnitude ceiling in UV units per second.
const MAX_VELOCITY: f32 = 5.0;
/// Exponential damping rate applied to velocity between events.
const VELOCITY_DAMPING: f32 = 6.0;
/// Input silence before the easing factor starts relaxing.
const INACTIVITY_TIMEOUT: Duration = Duration::from_millis(100);
/// Time over which the easing factor decays to its minimum.
const EASING_DECAY: Duration = Duration::from_secs(2);
/// Fraction of the configured easing retained once fully relaxed.
const MIN_EASING_FRACTION: f32 = 0.1;
/// Arrow-key nudge distance in normalized space.
const KEY_STEP: f32 = 0.05;

const SURFACE_CENTER: [f32; 2] = [0.5, 0.5];

/// Discrete keyboard interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    NudgeLeft,
    NudgeRight,
    NudgeUp,
    NudgeDown,
    Recenter,
}

/// Input messages accepted by the tracker. Positions are normalized to
/// [0,1]² with the origin at the top-left of the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerMove { position: [f32; 2] },
    PointerEnter { position: [f32; 2] },
    PointerLeave,
    TouchStart { position: [f32; 2] },
    TouchMove { position: [f32; 2] },
    TouchEnd,
    Key(KeyCommand),
}

/// Snapshot handed to the render loop each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    pub current: [f32; 2],
    pub target: [f32; 2],
    pub velocity: [f32; 2],
    pub active: bool,
    pub last_move: Option<Instant>,
}

pub struct PointerTracker {
    current: [f32; 2],
    target: [f32; 2],
    velocity: [f32; 2],
    active: bool,
    last_move: Option<Instant>,
    last_tick: Option<Instant>,
    easing: f32,
    smoothing: f32,
}

impl PointerTracker {
    /// `easing` is the per-tick interpolation factor toward the target;
    /// `smoothing` is the EMA weight given to the previous velocity.
    pub fn new(easing: f32, smoothing: f32) -> Self {
        Self {
            current: SURFACE_CENTER,
            target: SURFACE_CENTER,
            velocity: [0.0, 0.0],
            active: false,
            last_move: None,
            last_tick: None,
            easing: easing.clamp(1e-3, 1.0),
            smoothing: smoothing.clamp(0.0, 0.999),
        }
    }

    pub fn handle_event(&mut self, event: InputEvent, now: Instant) {
        match event {
            InputEvent::PointerMove { position } | InputEvent::TouchMove { position } => {
                self.move_target(position, now);
            }
            InputEvent::PointerEnter { position } | InputEvent::TouchStart { position } => {
                // Re-entry after a gap: snap rather than extrapolate.
                self.snap_to(position, now);
            }
            InputEvent::PointerLeave | InputEvent::TouchEnd => {
                self.active = false;
            }
            InputEvent::Key(command) => {
                let target = match command {
                    KeyCommand::NudgeLeft => [self.target[0] - KEY_STEP, self.target[1]],
                    KeyCommand::NudgeRight => [self.target[0] + KEY_STEP, self.target[1]],
                    KeyCommand::NudgeUp => [self.target[0], self.target[1] - KEY_STEP],
                    KeyCommand::NudgeDown => [self.target[0], self.target[1] + KEY_STEP],
                    KeyCommand::Recenter => SURFACE_CENTER,
                };
                self.move_target(clamp_uv(target), now);
            }
        }
    }

    /// Advances `current` toward `target` and damps velocity. Called once
    /// per animation frame by the owner of the render loop.
    pub fn tick(&mut self, now: Instant) {
        let dt = self
            .last_tick
            .map(|previous| now.saturating_duration_since(previous).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let easing = self.effective_easing(now);
        self.current[0] += (self.target[0] - self.current[0]) * easing;
        self.current[1] += (self.target[1] - self.current[1]) * easing;

        if dt > 0.0 {
            let damping = (-dt * VELOCITY_DAMPING).exp();
            self.velocity[0] *= damping;
            self.velocity[1] *= damping;
        }
    }

    pub fn state(&self) -> PointerState {
        PointerState {
            current: self.current,
            target: self.target,
            velocity: self.velocity,
            active: self.active,
            last_move: self.last_move,
        }
    }

    /// Restores a preserved state after context recovery.
    pub fn restore(&mut self, state: PointerState) {
        self.current = state.current;
        self.target = state.target;
        self.velocity = state.velocity;
        self.active = state.active;
        self.last_move = state.last_move;
    }

    fn move_target(&mut self, position: [f32; 2], now: Instant) {
        let position = clamp_uv(position);
        let delta = [position[0] - self.target[0], position[1] - self.target[1]];
        let distance = (delta[0] * delta[0] + delta[1] * delta[1]).sqrt();

        if self.last_move.is_none() || distance > DISCONTINUITY_THRESHOLD {
            self.snap_to(position, now);
            return;
        }

        let elapsed = self
            .last_move
            .map(|previous| now.saturating_duration_since(previous).as_secs_f32())
            .unwrap_or(0.0)
            .max(1e-3);
        let raw = [delta[0] / elapsed, delta[1] / elapsed];
        let blend = 1.0 - self.smoothing;
        let mut velocity = [
            self.velocity[0] * self.smoothing + raw[0] * blend,
            self.velocity[1] * self.smoothing + raw[1] * blend,
        ];
        let magnitude = (velocity[0] * velocity[0] + velocity[1] * velocity[1]).sqrt();
        if magnitude > MAX_VELOCITY {
            let scale = MAX_VELOCITY / magnitude;
            velocity[0] *= scale;
            velocity[1] *= scale;
        }

        self.velocity = velocity;
        self.target = position;
        self.active = true;
        self.last_move = Some(now);
    }

    fn snap_to(&mut self, position: [f32; 2], now: Instant) {
        let position = clamp_uv(position);
        self.current = position;
        self.target = position;
        self.velocity = [0.0, 0.0];
        self.active = true;
        self.last_move = Some(now);
    }

    /// Easing factor after the inactivity relaxation: full strength while
    /// input is arriving, decaying smoothly toward a floor once the pointer
    /// goes quiet so the distortion relaxes instead of freezing.
    fn effective_easing(&self, now: Instant) -> f32 {
        let Some(last_move) = self.last_move else {
            return self.easing;
        };
        let idle = now.saturating_duration_since(last_move);
        if idle <= INACTIVITY_TIMEOUT {
            return self.easing;
        }
        let progress = ((idle - INACTIVITY_TIMEOUT).as_secs_f32()
            / EASING_DECAY.as_secs_f32())
        .clamp(0.0, 1.0);
        let eased = progress * progress * (3.0 - 2.0 * progress);
        self.easing * (1.0 - eased * (1.0 - MIN_EASING_FRACTION))
    }
}

fn clamp_uv(position: [f32; 2]) -> [f32; 2] {
    [position[0].clamp(0.0, 1.0), position[1].clamp(0.0, 1.0)]
}
