//! Rolling frame-rate measurement and hysteresis-gated quality stepping.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use effectconfig::QualitySetting;

/// Bounded sample window; oldest samples evicted FIFO.
const SAMPLE_WINDOW: usize = 60;
/// Instantaneous frame rates outside this range are treated as outliers.
const MIN_FPS: f32 = 1.0;
const MAX_FPS: f32 = 240.0;
/// Minimum time between quality-tier changes.
const TIER_COOLDOWN: Duration = Duration::from_millis(3000);
/// Average below `target * DOWNGRADE_BAND` steps the tier down; above
/// `target * UPGRADE_BAND` steps it up.
const DOWNGRADE_BAND: f32 = 0.8;
const UPGRADE_BAND: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl From<QualitySetting> for QualityTier {
    fn from(value: QualitySetting) -> Self {
        match value {
            QualitySetting::Low => Self::Low,
            QualitySetting::Medium => Self::Medium,
            QualitySetting::High => Self::High,
        }
    }
}

/// Fixed preset bundled with each tier. Cheaper tiers disable the costliest
/// optional effects rather than only shrinking resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierPreset {
    pub max_pixel_ratio: f32,
    pub texture_cap: u32,
    pub advanced_grid: bool,
    pub velocity_effects: bool,
    pub target_fps: f32,
}

impl QualityTier {
    pub fn preset(self) -> TierPreset {
        match self {
            QualityTier::Low => TierPreset {
                max_pixel_ratio: 1.0,
                texture_cap: 1024,
                advanced_grid: false,
                velocity_effects: false,
                target_fps: 30.0,
            },
            QualityTier::Medium => TierPreset {
                max_pixel_ratio: 1.5,
                texture_cap: 2048,
                advanced_grid: true,
                velocity_effects: false,
                target_fps: 45.0,
            },
            QualityTier::High => TierPreset {
                max_pixel_ratio: 2.0,
                texture_cap: 4096,
                advanced_grid: true,
                velocity_effects: true,
                target_fps: 60.0,
            },
        }
    }

    fn step_down(self) -> Option<Self> {
        match self {
            QualityTier::High => Some(QualityTier::Medium),
            QualityTier::Medium => Some(QualityTier::Low),
            QualityTier::Low => None,
        }
    }

    fn step_up(self) -> Option<Self> {
        match self {
            QualityTier::Low => Some(QualityTier::Medium),
            QualityTier::Medium => Some(QualityTier::High),
            QualityTier::High => None,
        }
    }
}

/// Rolling window of instantaneous frame rates.
pub struct PerformanceMonitor {
    samples: VecDeque<f32>,
    last_frame: Option<Instant>,
    frame_count: u64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(SAMPLE_WINDOW),
            last_frame: None,
            frame_count: 0,
        }
    }

    /// Records a frame timestamp and returns the clamped instantaneous FPS,
    /// or `None` for the first frame after a reset.
    pub fn record_frame(&mut self, now: Instant) -> Option<f32> {
        self.frame_count += 1;
        let previous = self.last_frame.replace(now)?;
        let delta = now.saturating_duration_since(previous).as_secs_f32();
        if delta <= 0.0 {
            return None;
        }
        let fps = (1.0 / delta).clamp(MIN_FPS, MAX_FPS);
        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
        Some(fps)
    }

    pub fn average_fps(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Clears timing history. Used after context recovery, where
    /// elapsed-time data from before the gap is meaningless.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_frame = None;
        self.frame_count = 0;
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary exposed to the host for optional on-screen diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSummary {
    pub average_fps: Option<f32>,
    pub frame_count: u64,
    pub tier: QualityTier,
}

/// Steps the quality tier one level at a time, gated by a cooldown and a
/// threshold band around the active tier's target frame rate.
pub struct QualityController {
    tier: QualityTier,
    last_change: Option<Instant>,
}

impl QualityController {
    pub fn new(initial: QualityTier) -> Self {
        Self {
            tier: initial,
            last_change: None,
        }
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// Forces the tier without touching the cooldown clock. Used when
    /// restoring a preserved tier after recovery.
    pub fn restore_tier(&mut self, tier: QualityTier) {
        self.tier = tier;
        self.last_change = None;
    }

    /// Evaluates the rolling average against the active tier's band.
    /// Returns the new tier when a transition fires.
    pub fn evaluate(&mut self, average_fps: f32, now: Instant) -> Option<QualityTier> {
        if let Some(last) = self.last_change {
            if now.saturating_duration_since(last) < TIER_COOLDOWN {
                return None;
            }
        }

        let target = self.tier.preset().target_fps;
        let next = if average_fps < target * DOWNGRADE_BAND {
            self.tier.step_down()
        } else if average_fps > target * UPGRADE_BAND {
            self.tier.step_up()
        } else {
            None
        }?;

        tracing::debug!(
            from = ?self.tier,
            to = ?next,
            average_fps,
            target,
            "quality tier transition"
        );
        self.tier = next;
        self.last_change = Some(now);
        Some(next)
    }
}
