//! Engine lifecycle phases and GPU context-loss recovery policy.
//!
//! The phase machine is pure so transitions can be tested without a device.
//! `RecoveryState` owns the retry budget and backoff schedule; the engine
//! consults it after every loss and demotes to a sticky fallback phase when
//! the budget runs out.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::input::PointerState;
use crate::perf::QualityTier;

/// Retry budget per loss episode.
const MAX_RECOVERY_ATTEMPTS: u32 = 3;
/// Total context losses tolerated over the engine's lifetime.
const MAX_CONTEXT_LOSSES: u32 = 10;
/// Base delay before the first recovery attempt; doubles each attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Upper bound on any single backoff delay, jitter included.
const BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Random jitter added to each delay, as a fraction of the exponential term.
const JITTER_FRACTION: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    GpuUnavailable,
    ContextLossPermanent,
    InitializationFailed,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::GpuUnavailable => "gpu_unavailable",
            FallbackReason::ContextLossPermanent => "context_loss_permanent",
            FallbackReason::InitializationFailed => "initialization_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Running,
    ContextLost,
    Recovering,
    Fallback(FallbackReason),
}

impl Phase {
    pub fn is_fallback(self) -> bool {
        matches!(self, Phase::Fallback(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    InitializationStarted,
    InitializationSucceeded,
    InitializationFailed,
    ContextLost,
    RecoveryStarted,
    RecoverySucceeded,
    RecoveryAbandoned(FallbackReason),
    /// Host explicitly tears down and rebuilds; the only exit from fallback.
    ForceReinitialize,
}

/// Applies one event to the phase machine. Unexpected events leave the phase
/// unchanged; a fallback phase is sticky for everything except an explicit
/// host reinitialize.
pub fn transition(phase: Phase, event: LifecycleEvent) -> Phase {
    use LifecycleEvent as E;
    use Phase as P;

    let next = match (phase, event) {
        (_, E::ForceReinitialize) => P::Uninitialized,
        (P::Fallback(_), _) => phase,
        (P::Uninitialized, E::InitializationStarted) => P::Initializing,
        (P::Initializing, E::InitializationSucceeded) => P::Running,
        (P::Initializing, E::InitializationFailed) => {
            P::Fallback(FallbackReason::InitializationFailed)
        }
        (P::Running, E::ContextLost) => P::ContextLost,
        (P::Recovering, E::ContextLost) => P::ContextLost,
        (P::ContextLost, E::RecoveryStarted) => P::Recovering,
        (P::Recovering, E::RecoverySucceeded) => P::Running,
        (_, E::RecoveryAbandoned(reason)) => P::Fallback(reason),
        _ => {
            tracing::warn!(?phase, ?event, "ignoring lifecycle event");
            phase
        }
    };
    if next != phase {
        tracing::debug!(from = ?phase, to = ?next, "lifecycle transition");
    }
    next
}

/// Decision returned when the engine asks whether to retry after a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Schedule the next attempt after `delay`.
    Retry { delay: Duration },
    /// Budget exhausted; demote to fallback.
    GiveUp(FallbackReason),
}

/// Tracks the retry budget across context losses and produces the
/// exponential backoff schedule.
pub struct RecoveryState {
    attempts: u32,
    loss_count: u32,
    last_loss: Option<Instant>,
    rng: StdRng,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            attempts: 0,
            loss_count: 0,
            last_loss: None,
            rng,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn loss_count(&self) -> u32 {
        self.loss_count
    }

    /// Records a context loss, opening a new retry episode.
    pub fn record_loss(&mut self, now: Instant) {
        self.loss_count += 1;
        self.attempts = 0;
        self.last_loss = Some(now);
        tracing::warn!(loss_count = self.loss_count, "gpu context lost");
    }

    /// Closes the current episode after a successful rebuild. The lifetime
    /// loss counter is deliberately kept.
    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.last_loss = None;
    }

    /// Consumes one retry from the budget. Returns the delay before the
    /// attempt should run, or the reason to give up.
    pub fn next_attempt(&mut self, now: Instant) -> RecoveryDecision {
        if self.loss_count >= MAX_CONTEXT_LOSSES {
            return RecoveryDecision::GiveUp(FallbackReason::ContextLossPermanent);
        }
        if self.attempts >= MAX_RECOVERY_ATTEMPTS {
            return RecoveryDecision::GiveUp(FallbackReason::ContextLossPermanent);
        }

        let exponential = BACKOFF_BASE * 2u32.pow(self.attempts);
        let jitter = exponential.mul_f32(self.rng.gen::<f32>() * JITTER_FRACTION);
        let mut delay = (exponential + jitter).min(BACKOFF_CAP);

        // Never retry sooner than the base interval after the loss itself.
        if let Some(loss) = self.last_loss {
            let earliest = loss + BACKOFF_BASE;
            let scheduled = now + delay;
            if scheduled < earliest {
                delay = earliest.saturating_duration_since(now);
            }
        }

        self.attempts += 1;
        RecoveryDecision::Retry { delay }
    }
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Interaction and presentation state captured at loss time and replayed
/// verbatim after a rebuild. Performance history is intentionally absent:
/// frame timings from before the gap would poison the quality controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySnapshot {
    pub pointer: PointerState,
    pub tier: QualityTier,
    pub image_source: Option<String>,
    pub dimensions: (u32, u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> RecoveryState {
        RecoveryState::with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn happy_path_reaches_running() {
        let mut phase = Phase::Uninitialized;
        phase = transition(phase, LifecycleEvent::InitializationStarted);
        assert_eq!(phase, Phase::Initializing);
        phase = transition(phase, LifecycleEvent::InitializationSucceeded);
        assert_eq!(phase, Phase::Running);
    }

    #[test]
    fn init_failure_demotes_with_reason() {
        let phase = transition(Phase::Initializing, LifecycleEvent::InitializationFailed);
        assert_eq!(phase, Phase::Fallback(FallbackReason::InitializationFailed));
    }

    #[test]
    fn fallback_is_sticky_except_force_reinit() {
        let fallback = Phase::Fallback(FallbackReason::GpuUnavailable);
        assert_eq!(
            transition(fallback, LifecycleEvent::InitializationStarted),
            fallback
        );
        assert_eq!(
            transition(fallback, LifecycleEvent::RecoverySucceeded),
            fallback
        );
        assert_eq!(
            transition(fallback, LifecycleEvent::ForceReinitialize),
            Phase::Uninitialized
        );
    }

    #[test]
    fn loss_during_recovery_restarts_the_loop() {
        let mut phase = Phase::Running;
        phase = transition(phase, LifecycleEvent::ContextLost);
        assert_eq!(phase, Phase::ContextLost);
        phase = transition(phase, LifecycleEvent::RecoveryStarted);
        assert_eq!(phase, Phase::Recovering);
        phase = transition(phase, LifecycleEvent::ContextLost);
        assert_eq!(phase, Phase::ContextLost);
    }

    #[test]
    fn unexpected_events_are_ignored() {
        assert_eq!(
            transition(Phase::Running, LifecycleEvent::RecoverySucceeded),
            Phase::Running
        );
        assert_eq!(
            transition(Phase::Uninitialized, LifecycleEvent::ContextLost),
            Phase::Uninitialized
        );
    }

    #[test]
    fn backoff_doubles_and_stays_within_jitter_bounds() {
        let mut recovery = seeded();
        let now = Instant::now();
        recovery.record_loss(now);

        let mut expected_base = BACKOFF_BASE;
        for _ in 0..MAX_RECOVERY_ATTEMPTS {
            match recovery.next_attempt(now) {
                RecoveryDecision::Retry { delay } => {
                    assert!(delay >= expected_base, "delay {delay:?} < {expected_base:?}");
                    assert!(
                        delay <= expected_base.mul_f32(1.0 + JITTER_FRACTION),
                        "delay {delay:?} exceeds jitter bound"
                    );
                }
                RecoveryDecision::GiveUp(_) => panic!("budget exhausted early"),
            }
            expected_base *= 2;
        }
    }

    #[test]
    fn fourth_attempt_gives_up() {
        let mut recovery = seeded();
        let now = Instant::now();
        recovery.record_loss(now);
        for _ in 0..MAX_RECOVERY_ATTEMPTS {
            assert!(matches!(
                recovery.next_attempt(now),
                RecoveryDecision::Retry { .. }
            ));
        }
        assert_eq!(
            recovery.next_attempt(now),
            RecoveryDecision::GiveUp(FallbackReason::ContextLossPermanent)
        );
    }

    #[test]
    fn success_resets_the_episode_but_not_the_lifetime_count() {
        let mut recovery = seeded();
        let now = Instant::now();
        recovery.record_loss(now);
        let _ = recovery.next_attempt(now);
        let _ = recovery.next_attempt(now);
        recovery.record_success();
        assert_eq!(recovery.attempts(), 0);
        assert_eq!(recovery.loss_count(), 1);

        recovery.record_loss(now);
        assert!(matches!(
            recovery.next_attempt(now),
            RecoveryDecision::Retry { .. }
        ));
    }

    #[test]
    fn repeated_losses_eventually_go_permanent() {
        let mut recovery = seeded();
        let mut now = Instant::now();
        for _ in 0..MAX_CONTEXT_LOSSES {
            recovery.record_loss(now);
            recovery.record_success();
            now += Duration::from_secs(60);
        }
        recovery.record_loss(now);
        assert_eq!(
            recovery.next_attempt(now),
            RecoveryDecision::GiveUp(FallbackReason::ContextLossPermanent)
        );
    }

    #[test]
    fn delay_is_capped() {
        let mut recovery = seeded();
        let now = Instant::now();
        recovery.record_loss(now);
        for _ in 0..MAX_RECOVERY_ATTEMPTS {
            if let RecoveryDecision::Retry { delay } = recovery.next_attempt(now) {
                assert!(delay <= BACKOFF_CAP);
            }
        }
    }

    #[test]
    fn reasons_serialize_to_wire_names() {
        assert_eq!(FallbackReason::GpuUnavailable.as_str(), "gpu_unavailable");
        assert_eq!(
            FallbackReason::ContextLossPermanent.as_str(),
            "context_loss_permanent"
        );
        assert_eq!(
            FallbackReason::InitializationFailed.as_str(),
            "initialization_failed"
        );
    }
}
