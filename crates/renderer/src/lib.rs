//! Interactive image-distortion engine.
//!
//! A textured full-screen quad is displaced in real time by one of four
//! procedural algorithms driven by pointer, touch, and keyboard input, with
//! an optional grid overlay composited on top. The engine adapts its quality
//! tier to the measured frame rate and survives GPU context loss through a
//! bounded recovery loop.

pub mod capability;
mod compile;
pub mod distortion;
pub mod engine;
pub mod gpu;
pub mod grid;
pub mod input;
pub mod lifecycle;
pub mod perf;
pub mod runtime;

pub use capability::DeviceCapabilities;
pub use engine::{Engine, FallbackRenderer};
pub use gpu::{ContextError, PipelineVariant, TextureStatus};
pub use input::{InputEvent, KeyCommand, PointerState, PointerTracker};
pub use lifecycle::{FallbackReason, Phase, RecoverySnapshot};
pub use perf::{PerformanceSummary, QualityTier, TierPreset};
pub use runtime::{BoxedTimeSource, FixedTimeSource, SystemTimeSource, TimeSample, TimeSource};
