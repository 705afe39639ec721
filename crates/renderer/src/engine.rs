//! Top-level engine: owns the GPU state, drives the lifecycle machine, and
//! exposes the host-facing operations.

use std::time::Instant;

use effectconfig::{EffectConfig, ImageFit};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::distortion::auto_pointer;
use crate::gpu::uniforms::{EffectUniforms, FrameParams};
use crate::gpu::{ContextError, GpuState, PipelineVariant, TextureStatus};
use crate::input::{InputEvent, PointerState, PointerTracker};
use crate::lifecycle::{
    transition, FallbackReason, LifecycleEvent, Phase, RecoveryDecision, RecoverySnapshot,
    RecoveryState,
};
use crate::perf::{PerformanceMonitor, PerformanceSummary, QualityController, QualityTier};
use crate::runtime::{BoxedTimeSource, SystemTimeSource};

/// Host-supplied renderer used while the engine sits in a fallback phase.
/// Typically a static-image blitter; the engine keeps feeding it pointer
/// state so a CPU approximation can still react to input.
pub trait FallbackRenderer: Send {
    fn render(&mut self, pointer: &PointerState, config: &EffectConfig);
}

/// Maps display UV to texture UV for an image fit mode. `scale` and
/// `offset` feed the `fit` uniform slot; out-of-range samples are clamped
/// by the sampler.
pub(crate) fn compute_fit(
    image: (u32, u32),
    surface: (u32, u32),
    fit: ImageFit,
) -> ([f32; 2], [f32; 2]) {
    let (iw, ih) = image;
    let (sw, sh) = surface;
    if iw == 0 || ih == 0 || sw == 0 || sh == 0 {
        return ([1.0, 1.0], [0.0, 0.0]);
    }
    // Ratio of surface aspect to image aspect; 1.0 means they match.
    let ratio = (sw as f32 / sh as f32) / (iw as f32 / ih as f32);
    let scale = match fit {
        ImageFit::Fill => [1.0, 1.0],
        ImageFit::Cover => {
            if ratio >= 1.0 {
                [1.0, 1.0 / ratio]
            } else {
                [ratio, 1.0]
            }
        }
        ImageFit::Contain => {
            if ratio >= 1.0 {
                [ratio, 1.0]
            } else {
                [1.0, 1.0 / ratio]
            }
        }
    };
    let offset = [(1.0 - scale[0]) * 0.5, (1.0 - scale[1]) * 0.5];
    (scale, offset)
}

fn source_from_config(config: &EffectConfig) -> Option<String> {
    if config.image_src.is_empty() {
        None
    } else {
        Some(config.image_src.clone())
    }
}

pub struct Engine<T> {
    target: T,
    config: EffectConfig,
    phase: Phase,
    recovery: RecoveryState,
    pending_recovery_at: Option<Instant>,
    snapshot: Option<RecoverySnapshot>,
    gpu: Option<GpuState>,
    tracker: PointerTracker,
    monitor: PerformanceMonitor,
    quality: QualityController,
    time: BoxedTimeSource,
    image_source: Option<String>,
    size: PhysicalSize<u32>,
    pixel_ratio: f32,
    fallback: Option<Box<dyn FallbackRenderer>>,
}

impl<T> Engine<T>
where
    T: HasDisplayHandle + HasWindowHandle,
{
    /// Builds the engine and attempts GPU initialization immediately. A
    /// machine with no usable adapter produces an engine already demoted to
    /// its fallback phase rather than an error.
    pub fn new(
        target: T,
        size: PhysicalSize<u32>,
        pixel_ratio: f32,
        config: EffectConfig,
    ) -> Self {
        let tracker = PointerTracker::new(config.mouse_easing, config.mouse_smoothing);
        let mut engine = Self {
            target,
            quality: QualityController::new(QualityTier::from(config.quality)),
            image_source: source_from_config(&config),
            config,
            phase: Phase::Uninitialized,
            recovery: RecoveryState::new(),
            pending_recovery_at: None,
            snapshot: None,
            gpu: None,
            tracker,
            monitor: PerformanceMonitor::new(),
            time: Box::new(SystemTimeSource::new()),
            size,
            pixel_ratio,
            fallback: None,
        };
        engine.initialize();
        engine
    }

    fn initialize(&mut self) {
        self.phase = transition(self.phase, LifecycleEvent::InitializationStarted);
        match GpuState::new(&self.target, self.size) {
            Ok(gpu) => {
                let tier = gpu.capabilities().initial_tier(self.config.quality);
                self.quality.restore_tier(tier);
                self.gpu = Some(gpu);
                self.phase = transition(self.phase, LifecycleEvent::InitializationSucceeded);
                if self.gpu.as_ref().map(GpuState::variant) == Some(PipelineVariant::Minimal) {
                    tracing::warn!("running with the minimal shader variant");
                }
                if let Some(source) = self.image_source.clone() {
                    self.load_image(&source);
                }
            }
            Err(ContextError::NoAdapter) => {
                tracing::error!("no GPU adapter; entering fallback");
                self.phase = transition(
                    self.phase,
                    LifecycleEvent::RecoveryAbandoned(FallbackReason::GpuUnavailable),
                );
            }
            Err(ContextError::Init(err)) => {
                tracing::error!(error = %err, "GPU initialization failed; entering fallback");
                self.phase = transition(self.phase, LifecycleEvent::InitializationFailed);
            }
        }
    }

    /// Per-frame housekeeping: pointer easing, texture polling, quality
    /// evaluation, and recovery scheduling. Call before `render_frame`.
    pub fn pump(&mut self, now: Instant) {
        self.tracker.tick(now);
        match self.phase {
            Phase::Running => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.poll_textures();
                }
                if let Some(average) = self.monitor.average_fps() {
                    if let Some(tier) = self.quality.evaluate(average, now) {
                        tracing::info!(?tier, "quality tier changed");
                    }
                }
            }
            Phase::ContextLost => {
                if self.pending_recovery_at.is_some_and(|at| now >= at) {
                    self.pending_recovery_at = None;
                    self.attempt_recovery(now);
                }
            }
            Phase::Fallback(_) => {
                if let Some(renderer) = self.fallback.as_mut() {
                    renderer.render(&self.tracker.state(), &self.config);
                }
            }
            _ => {}
        }
    }

    fn attempt_recovery(&mut self, now: Instant) {
        self.phase = transition(self.phase, LifecycleEvent::RecoveryStarted);
        match GpuState::new(&self.target, self.size) {
            Ok(gpu) => {
                self.gpu = Some(gpu);
                self.recovery.record_success();
                self.phase = transition(self.phase, LifecycleEvent::RecoverySucceeded);
                self.restore_snapshot();
                tracing::info!("context recovered");
            }
            Err(err) => {
                tracing::warn!(error = %err, "recovery attempt failed");
                self.phase = transition(self.phase, LifecycleEvent::ContextLost);
                self.schedule_recovery(now);
            }
        }
    }

    /// Host-forced teardown and rebuild; the only way out of a fallback
    /// phase. Resets the loss budget.
    pub fn force_reinitialize(&mut self) {
        self.phase = transition(self.phase, LifecycleEvent::ForceReinitialize);
        self.gpu = None;
        self.recovery = RecoveryState::new();
        self.pending_recovery_at = None;
        self.monitor.reset();
        self.initialize();
    }
}

impl<T> Engine<T> {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn fallback_state(&self) -> Option<FallbackReason> {
        match self.phase {
            Phase::Fallback(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Replaces the effect configuration. Easing and smoothing knobs take
    /// effect on the next pointer event, a changed image source starts
    /// loading immediately, everything else applies on the next frame.
    pub fn set_config(&mut self, config: EffectConfig) {
        self.tracker = {
            let mut tracker = PointerTracker::new(config.mouse_easing, config.mouse_smoothing);
            tracker.restore(self.tracker.state());
            tracker
        };
        let source = source_from_config(&config);
        let source_changed = source != self.image_source;
        self.config = config;
        if source_changed {
            self.load_image(&source.unwrap_or_default());
        }
    }

    pub fn set_fallback_renderer(&mut self, renderer: Box<dyn FallbackRenderer>) {
        self.fallback = Some(renderer);
    }

    pub fn handle_input(&mut self, event: InputEvent, now: Instant) {
        self.tracker.handle_event(event, now);
    }

    /// Starts an asynchronous image load. An empty source clears the image.
    pub fn load_image(&mut self, source: &str) {
        self.image_source = if source.is_empty() {
            None
        } else {
            Some(source.to_string())
        };
        if let Some(gpu) = self.gpu.as_mut() {
            let cap = self.quality.tier().preset().texture_cap;
            gpu.request_image(source, cap);
        }
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>, pixel_ratio: f32) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.size = size;
        self.pixel_ratio = pixel_ratio;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(size);
        }
    }

    pub fn texture_status(&self) -> Option<TextureStatus> {
        self.gpu.as_ref().map(|gpu| gpu.texture_status().clone())
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            average_fps: self.monitor.average_fps(),
            frame_count: self.monitor.frame_count(),
            tier: self.quality.tier(),
        }
    }

    /// Renders one frame when the engine is running; a no-op otherwise.
    pub fn render_frame(&mut self, now: Instant) {
        if self.phase != Phase::Running {
            return;
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        let sample = self.time.sample();
        let pointer_state = self.tracker.state();
        let effect_time = sample.seconds;

        // Idle auto-animation substitutes an orbiting synthetic pointer.
        let pointer = if self.config.auto_animation && !pointer_state.active {
            auto_pointer(effect_time, self.config.animation_speed)
        } else {
            pointer_state.current
        };

        let preset = self.quality.tier().preset();
        let image = gpu.texture_dimensions().unwrap_or((1, 1));
        let (uv_scale, uv_offset) = compute_fit(
            image,
            (self.size.width, self.size.height),
            self.config.image_fit,
        );
        let frame = FrameParams {
            pointer,
            velocity: pointer_state.velocity,
            time: effect_time,
            width: self.size.width,
            height: self.size.height,
            pixel_ratio: self.pixel_ratio.min(preset.max_pixel_ratio),
            advanced_grid: preset.advanced_grid,
            velocity_effects: preset.velocity_effects,
            uv_scale,
            uv_offset,
        };
        let uniforms = EffectUniforms::pack(&self.config, &frame);

        match gpu.render(&uniforms) {
            Ok(()) => {
                self.monitor.record_frame(now);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::debug!("surface acquire timed out; skipping frame");
            }
            Err(wgpu::SurfaceError::Outdated) => {
                gpu.reconfigure();
            }
            Err(err) => {
                tracing::warn!(error = ?err, "surface error; treating as context loss");
                self.handle_context_loss(now);
            }
        }
    }

    fn capture_snapshot(&self) -> RecoverySnapshot {
        RecoverySnapshot {
            pointer: self.tracker.state(),
            tier: self.quality.tier(),
            image_source: self.image_source.clone(),
            dimensions: (self.size.width, self.size.height),
        }
    }

    /// Captures state, tears down the device, and schedules recovery.
    pub fn handle_context_loss(&mut self, now: Instant) {
        if matches!(self.phase, Phase::Fallback(_)) {
            return;
        }
        self.snapshot = Some(self.capture_snapshot());
        self.gpu = None;
        self.recovery.record_loss(now);
        self.phase = transition(self.phase, LifecycleEvent::ContextLost);
        self.schedule_recovery(now);
    }

    fn schedule_recovery(&mut self, now: Instant) {
        match self.recovery.next_attempt(now) {
            RecoveryDecision::Retry { delay } => {
                tracing::info!(?delay, "scheduling context recovery");
                self.pending_recovery_at = Some(now + delay);
            }
            RecoveryDecision::GiveUp(reason) => {
                tracing::error!(reason = reason.as_str(), "abandoning context recovery");
                self.phase = transition(self.phase, LifecycleEvent::RecoveryAbandoned(reason));
            }
        }
    }

    /// Replays the pre-loss snapshot verbatim, except for the performance
    /// window, which restarts empty so stale frame timings cannot trigger a
    /// spurious tier change.
    fn restore_snapshot(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        self.tracker.restore(snapshot.pointer);
        self.quality.restore_tier(snapshot.tier);
        self.monitor.reset();
        self.resize(
            PhysicalSize::new(snapshot.dimensions.0, snapshot.dimensions.1),
            self.pixel_ratio,
        );
        if let Some(source) = snapshot.image_source {
            self.load_image(&source);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Engine with no window target and no device; exercises the state
    /// machinery that does not need a GPU.
    fn detached() -> Engine<()> {
        let config = EffectConfig::default();
        Engine {
            target: (),
            quality: QualityController::new(QualityTier::from(config.quality)),
            tracker: PointerTracker::new(config.mouse_easing, config.mouse_smoothing),
            image_source: source_from_config(&config),
            config,
            phase: Phase::Running,
            recovery: RecoveryState::new(),
            pending_recovery_at: None,
            snapshot: None,
            gpu: None,
            monitor: PerformanceMonitor::new(),
            time: Box::new(SystemTimeSource::new()),
            size: PhysicalSize::new(800, 600),
            pixel_ratio: 1.0,
            fallback: None,
        }
    }

    #[test]
    fn fill_fit_is_identity() {
        assert_eq!(
            compute_fit((800, 600), (1920, 1080), ImageFit::Fill),
            ([1.0, 1.0], [0.0, 0.0])
        );
    }

    #[test]
    fn cover_crops_the_longer_image_axis() {
        // Square image on a 2:1 surface: full width, central half of height.
        let (scale, offset) = compute_fit((1000, 1000), (2000, 1000), ImageFit::Cover);
        assert_eq!(scale[0], 1.0);
        assert!((scale[1] - 0.5).abs() < 1e-6);
        assert!((offset[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn contain_extends_past_the_texture() {
        // Square image on a 2:1 surface letterboxes horizontally, so the
        // sampled span exceeds [0,1] and the offset goes negative.
        let (scale, offset) = compute_fit((1000, 1000), (2000, 1000), ImageFit::Contain);
        assert!((scale[0] - 2.0).abs() < 1e-6);
        assert_eq!(scale[1], 1.0);
        assert!((offset[0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_dimensions_fall_back_to_identity() {
        assert_eq!(
            compute_fit((0, 0), (1920, 1080), ImageFit::Cover),
            ([1.0, 1.0], [0.0, 0.0])
        );
    }

    #[test]
    fn cover_and_contain_agree_when_aspects_match() {
        let cover = compute_fit((1600, 900), (1920, 1080), ImageFit::Cover);
        let contain = compute_fit((1600, 900), (1920, 1080), ImageFit::Contain);
        assert_eq!(cover, contain);
        assert_eq!(cover, ([1.0, 1.0], [0.0, 0.0]));
    }

    #[test]
    fn context_loss_snapshot_restores_interaction_but_resets_perf_history() {
        let mut engine = detached();
        let t0 = Instant::now();
        engine.handle_input(InputEvent::PointerEnter { position: [0.3, 0.6] }, t0);
        engine.handle_input(
            InputEvent::PointerMove {
                position: [0.32, 0.58],
            },
            t0 + Duration::from_millis(16),
        );
        engine.quality.restore_tier(QualityTier::Low);
        engine.image_source = Some("waves.png".to_string());
        engine.monitor.record_frame(t0);
        engine.monitor.record_frame(t0 + Duration::from_millis(16));
        let before = engine.tracker.state();

        engine.handle_context_loss(t0 + Duration::from_millis(32));
        assert_eq!(engine.phase(), Phase::ContextLost);
        assert!(engine.pending_recovery_at.is_some());

        // State drifts while the device is gone; restore must undo it.
        engine.handle_input(InputEvent::PointerLeave, t0 + Duration::from_millis(40));
        engine.quality.restore_tier(QualityTier::High);

        engine.restore_snapshot();
        assert_eq!(engine.tracker.state(), before);
        assert_eq!(engine.quality.tier(), QualityTier::Low);
        assert_eq!(engine.monitor.frame_count(), 0);
        assert_eq!(engine.image_source.as_deref(), Some("waves.png"));
    }

    #[test]
    fn context_loss_in_fallback_is_ignored() {
        let mut engine = detached();
        engine.phase = Phase::Fallback(FallbackReason::GpuUnavailable);
        engine.handle_context_loss(Instant::now());
        assert_eq!(
            engine.phase(),
            Phase::Fallback(FallbackReason::GpuUnavailable)
        );
        assert!(engine.snapshot.is_none());
    }

    #[test]
    fn configured_image_source_is_adopted_and_follows_updates() {
        let mut config = EffectConfig::default();
        config.image_src = "assets/waves.png".to_string();
        assert_eq!(
            source_from_config(&config).as_deref(),
            Some("assets/waves.png")
        );
        assert_eq!(source_from_config(&EffectConfig::default()), None);

        let mut engine = detached();
        assert_eq!(engine.image_source, None);

        let mut updated = engine.config().clone();
        updated.image_src = "assets/clouds.png".to_string();
        engine.set_config(updated);
        assert_eq!(engine.image_source.as_deref(), Some("assets/clouds.png"));

        let mut cleared = engine.config().clone();
        cleared.image_src = String::new();
        engine.set_config(cleared);
        assert_eq!(engine.image_source, None);
    }
}
