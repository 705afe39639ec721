//! CPU reference implementations of the four displacement algorithms.
//!
//! The GLSL in `compile.rs` evaluates the same formulas per fragment; these
//! functions exist so the numeric edge cases (zero-distance guards, fall-off
//! monotonicity, velocity gating) are testable without a GPU, and so the
//! host's fallback renderer can approximate the effect on the CPU.
//!
//! All coordinates are normalized UV space ([0,1]×[0,1]).

use effectconfig::EffectConfig;

/// Below this distance every algorithm returns the identity UV.
pub const EPS: f32 = 1e-4;

/// Softening term added to the magnetic inverse-square denominator.
const MAGNETIC_SOFTENING: f32 = 1e-3;
/// Ceiling on the magnetic force term so near-pointer samples stay bounded.
const MAGNETIC_FORCE_CAP: f32 = 12.0;
const MAGNETIC_GAIN: f32 = 0.02;

const RIPPLE_SPEED: f32 = 3.0;
const RIPPLE_GAIN: f32 = 0.08;
/// Secondary perpendicular wave: frequency ratio, phase offset, mix weight.
const RIPPLE_SECONDARY_FREQ: f32 = 0.6;
const RIPPLE_SECONDARY_PHASE: f32 = 1.7;
const RIPPLE_SECONDARY_MIX: f32 = 0.35;

const VORTEX_SOFTENING: f32 = 0.05;
const VORTEX_MAX_TIGHTNESS: f32 = 8.0;
const VORTEX_ANGLE_GAIN: f32 = 0.6;
const VORTEX_PULL: f32 = 0.05;

const FLUID_BASE_SCALE: f32 = 3.0;
const FLUID_DETAIL_SCALE: f32 = 8.0;
const FLUID_ADVECT: f32 = 0.3;
const FLUID_DETAIL_DRIFT: f32 = 0.2;
/// 70/30 blend between the base fbm field and the high-frequency layer.
const FLUID_DETAIL_MIX: f32 = 0.3;
const FLUID_GAIN: f32 = 0.1;
const FLUID_WOBBLE_GAIN: f32 = 0.01;

const VELOCITY_GAIN: f32 = 0.15;

// Aesthetic tunables for the idle "breathing" animation. These were chosen
// by eye; nothing downstream depends on the exact values.
const AUTO_ORBIT_RADIUS: f32 = 0.18;
const AUTO_ORBIT_RATE_X: f32 = 0.31;
const AUTO_ORBIT_RATE_Y: f32 = 0.23;
const AUTO_PULSE_RATE: f32 = 2.0;
const AUTO_PULSE_DEPTH: f32 = 0.35;
const AUTO_BREATH_WEIGHTS: [f32; 3] = [0.3, 0.2, 0.1];
const AUTO_BREATH_RATES: [f32; 3] = [0.7, 1.3, 2.9];
const AUTO_SPIN_RATE: f32 = 0.4;
const AUTO_RIPPLE_RATES: [f32; 2] = [1.1, 1.9];
const AUTO_RIPPLE_WEIGHT: f32 = 0.25;

/// Which displacement function the engine evaluates. Mirrors the config enum
/// so the renderer does not leak `effectconfig` types into the shader path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionKind {
    #[default]
    Fluid,
    Magnetic,
    Ripple,
    Vortex,
}

impl From<effectconfig::DistortionType> for DistortionKind {
    fn from(value: effectconfig::DistortionType) -> Self {
        match value {
            effectconfig::DistortionType::Fluid => Self::Fluid,
            effectconfig::DistortionType::Magnetic => Self::Magnetic,
            effectconfig::DistortionType::Ripple => Self::Ripple,
            effectconfig::DistortionType::Vortex => Self::Vortex,
        }
    }
}

/// Flat snapshot of every numeric knob the algorithms read. Copied out of
/// the host configuration each frame; never mutated by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionParams {
    pub intensity: f32,
    pub radius: f32,
    pub falloff: f32,
    pub magnetic_strength: f32,
    pub magnetic_polarity: f32,
    pub ripple_frequency: f32,
    pub ripple_amplitude: f32,
    pub ripple_decay: f32,
    pub vortex_strength: f32,
    pub vortex_tightness: f32,
    pub interaction_radius: f32,
    pub interaction_falloff: f32,
    pub velocity_influence: f32,
    pub auto_animation: bool,
    pub animation_speed: f32,
}

impl DistortionParams {
    pub fn from_config(config: &EffectConfig) -> Self {
        Self {
            intensity: config.intensity,
            radius: config.radius,
            falloff: config.falloff,
            magnetic_strength: config.magnetic_strength,
            magnetic_polarity: config.magnetic_polarity,
            ripple_frequency: config.ripple_frequency,
            ripple_amplitude: config.ripple_amplitude,
            ripple_decay: config.ripple_decay,
            vortex_strength: config.vortex_strength,
            vortex_tightness: config.vortex_tightness,
            interaction_radius: config.interaction_radius,
            interaction_falloff: config.interaction_falloff,
            velocity_influence: config.velocity_influence,
            auto_animation: config.auto_animation,
            animation_speed: config.animation_speed,
        }
    }
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self::from_config(&EffectConfig::default())
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Shared fall-off policy: `(1 - smoothstep(0, radius, dist))^exponent`.
///
/// Used both for the algorithm-specific intensity fall-off and, with the
/// interaction knobs, for gating velocity effects. Monotonically
/// non-increasing in `dist`; exactly zero at and beyond `radius`.
pub fn falloff(dist: f32, radius: f32, exponent: f32) -> f32 {
    (1.0 - smoothstep(0.0, radius.max(EPS), dist)).powf(exponent.max(EPS))
}

fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn length(v: [f32; 2]) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn hash(p: [f32; 2]) -> f32 {
    fract((p[0] * 127.1 + p[1] * 311.7).sin() * 43758.547)
}

/// Smoothly interpolated value noise over an integer lattice, range [0, 1].
fn value_noise(p: [f32; 2]) -> f32 {
    let i = [p[0].floor(), p[1].floor()];
    let f = [p[0] - i[0], p[1] - i[1]];
    let u = [
        f[0] * f[0] * (3.0 - 2.0 * f[0]),
        f[1] * f[1] * (3.0 - 2.0 * f[1]),
    ];
    let a = hash(i);
    let b = hash([i[0] + 1.0, i[1]]);
    let c = hash([i[0], i[1] + 1.0]);
    let d = hash([i[0] + 1.0, i[1] + 1.0]);
    let x0 = a + (b - a) * u[0];
    let x1 = c + (d - c) * u[0];
    x0 + (x1 - x0) * u[1]
}

/// Two-octave fbm, range [0, 0.75].
fn fbm(p: [f32; 2]) -> f32 {
    let mut total = 0.0;
    let mut amplitude = 0.5;
    let mut q = p;
    for _ in 0..2 {
        total += amplitude * value_noise(q);
        q = [q[0] * 2.0, q[1] * 2.0];
        amplitude *= 0.5;
    }
    total
}

/// Multi-frequency breathing envelope for auto-animation, roughly [-0.6, 0.6].
fn breathing(time: f32, speed: f32) -> f32 {
    AUTO_BREATH_WEIGHTS
        .iter()
        .zip(AUTO_BREATH_RATES.iter())
        .map(|(weight, rate)| weight * (time * rate * speed).sin())
        .sum()
}

/// Synthetic pointer position used while auto-animation runs without input:
/// a slow Lissajous orbit around the surface center.
pub fn auto_pointer(time: f32, speed: f32) -> [f32; 2] {
    [
        0.5 + AUTO_ORBIT_RADIUS * (time * AUTO_ORBIT_RATE_X * speed * std::f32::consts::TAU).sin(),
        0.5 + AUTO_ORBIT_RADIUS * (time * AUTO_ORBIT_RATE_Y * speed * std::f32::consts::TAU).cos(),
    ]
}

/// Multi-octave noise field advected by time, shaped by the radial fall-off.
pub fn fluid(uv: [f32; 2], pointer: [f32; 2], time: f32, p: &DistortionParams) -> [f32; 2] {
    let dist = length(sub(uv, pointer));
    let fall = falloff(dist, p.radius, p.falloff);
    let speed = p.animation_speed;

    let base = [
        uv[0] * FLUID_BASE_SCALE + time * FLUID_ADVECT * speed,
        uv[1] * FLUID_BASE_SCALE - time * FLUID_ADVECT * speed * 0.7,
    ];
    let detail = [
        uv[0] * FLUID_DETAIL_SCALE - time * FLUID_DETAIL_DRIFT * speed,
        uv[1] * FLUID_DETAIL_SCALE + time * FLUID_DETAIL_DRIFT * speed,
    ];
    // 70/30 blend of the coarse and fine layers, recentered to [-1, 1].
    let nx = fbm(base) * (1.0 - FLUID_DETAIL_MIX) + value_noise(detail) * FLUID_DETAIL_MIX;
    let ny = fbm([base[1] + 13.7, base[0] + 5.3]) * (1.0 - FLUID_DETAIL_MIX)
        + value_noise([detail[1] + 7.1, detail[0] + 2.9]) * FLUID_DETAIL_MIX;
    let offset = [(nx - 0.375) * 2.0, (ny - 0.375) * 2.0];

    let mut amount = p.intensity * fall * FLUID_GAIN;
    let mut wobble = [
        (time * 1.3 * speed).sin() * FLUID_WOBBLE_GAIN * p.intensity * fall,
        (time * 1.7 * speed).cos() * FLUID_WOBBLE_GAIN * p.intensity * fall,
    ];
    if p.auto_animation {
        amount *= 1.0 + breathing(time, speed);
        wobble[0] += breathing(time * 1.9, speed) * FLUID_WOBBLE_GAIN * p.intensity;
        wobble[1] += breathing(time * 2.3 + 4.2, speed) * FLUID_WOBBLE_GAIN * p.intensity;
    }

    [
        uv[0] + offset[0] * amount + wobble[0],
        uv[1] + offset[1] * amount + wobble[1],
    ]
}

/// Exponential fall-off combined with a softened inverse-square force term.
/// Positive polarity attracts samples toward the pointer, negative repels.
pub fn magnetic(uv: [f32; 2], pointer: [f32; 2], time: f32, p: &DistortionParams) -> [f32; 2] {
    let to_pointer = sub(pointer, uv);
    let dist = length(to_pointer);
    if dist < EPS {
        return uv;
    }
    let dir = [to_pointer[0] / dist, to_pointer[1] / dist];

    let exp_fall = (-dist / p.radius.max(EPS)).exp();
    let force = (p.magnetic_strength / (dist * dist + MAGNETIC_SOFTENING)).min(MAGNETIC_FORCE_CAP);
    let shaped = falloff(dist, p.radius, p.falloff);

    let mut magnitude =
        p.intensity * p.magnetic_polarity * exp_fall * force * shaped * MAGNETIC_GAIN;
    if p.auto_animation {
        magnitude *= 1.0 + AUTO_PULSE_DEPTH * (time * AUTO_PULSE_RATE * p.animation_speed).sin();
    }

    [uv[0] + dir[0] * magnitude, uv[1] + dir[1] * magnitude]
}

/// Radial sine wave with exponential distance decay, plus a weaker
/// perpendicular wave at a detuned frequency for visual complexity.
pub fn ripple(uv: [f32; 2], pointer: [f32; 2], time: f32, p: &DistortionParams) -> [f32; 2] {
    let from_pointer = sub(uv, pointer);
    let dist = length(from_pointer);
    if dist < EPS {
        return uv;
    }
    let dir = [from_pointer[0] / dist, from_pointer[1] / dist];
    let perp = [-dir[1], dir[0]];
    let speed = p.animation_speed;

    let decay = (-dist * p.ripple_decay).exp();
    let shaped = falloff(dist, p.radius, p.falloff);
    let phase = dist * p.ripple_frequency - time * RIPPLE_SPEED * speed;
    let mut wave = phase.sin() * p.ripple_amplitude * decay;
    let wave2 = (dist * p.ripple_frequency * RIPPLE_SECONDARY_FREQ
        - time * RIPPLE_SPEED * speed * 0.8
        + RIPPLE_SECONDARY_PHASE)
        .sin()
        * p.ripple_amplitude
        * RIPPLE_SECONDARY_MIX
        * decay;

    if p.auto_animation {
        for (index, rate) in AUTO_RIPPLE_RATES.iter().enumerate() {
            let generator = (dist * p.ripple_frequency * (1.0 + index as f32 * 0.5)
                - time * rate * speed * RIPPLE_SPEED
                + index as f32 * 2.1)
                .sin();
            wave += generator * p.ripple_amplitude * AUTO_RIPPLE_WEIGHT * decay;
        }
    }

    let gain = p.intensity * shaped * RIPPLE_GAIN;
    [
        uv[0] + (dir[0] * wave + perp[0] * wave2) * gain,
        uv[1] + (dir[1] * wave + perp[1] * wave2) * gain,
    ]
}

/// Rotates the pointer-to-point vector by a fall-off- and
/// tightness-dependent angle; the displacement is the rotation delta plus a
/// small inward pull.
pub fn vortex(uv: [f32; 2], pointer: [f32; 2], time: f32, p: &DistortionParams) -> [f32; 2] {
    let v = sub(uv, pointer);
    let dist = length(v);
    if dist < EPS {
        return uv;
    }

    let shaped = falloff(dist, p.radius, p.falloff);
    let tightness = (p.vortex_tightness / (dist + VORTEX_SOFTENING)).min(VORTEX_MAX_TIGHTNESS);
    let mut angle = p.vortex_strength * shaped * tightness * VORTEX_ANGLE_GAIN;
    if p.auto_animation {
        let speed = p.animation_speed;
        angle += time * AUTO_SPIN_RATE * speed * shaped;
        angle *= 1.0 + breathing(time, speed) * 0.5;
    }

    let (sin, cos) = angle.sin_cos();
    let rotated = [v[0] * cos - v[1] * sin, v[0] * sin + v[1] * cos];
    let pull = VORTEX_PULL * shaped * p.intensity;

    [
        uv[0] + (rotated[0] - v[0]) * p.intensity - v[0] / dist * pull * dist,
        uv[1] + (rotated[1] - v[1]) * p.intensity - v[1] / dist * pull * dist,
    ]
}

/// Evaluates the selected algorithm and blends in the velocity-driven term,
/// which is gated by the interaction fall-off regardless of the algorithm.
pub fn displace(
    kind: DistortionKind,
    uv: [f32; 2],
    pointer: [f32; 2],
    velocity: [f32; 2],
    time: f32,
    params: &DistortionParams,
) -> [f32; 2] {
    let base = match kind {
        DistortionKind::Fluid => fluid(uv, pointer, time, params),
        DistortionKind::Magnetic => magnetic(uv, pointer, time, params),
        DistortionKind::Ripple => ripple(uv, pointer, time, params),
        DistortionKind::Vortex => vortex(uv, pointer, time, params),
    };

    let dist = length(sub(uv, pointer));
    let gate = falloff(dist, params.interaction_radius, params.interaction_falloff);
    let influence = params.velocity_influence * gate * VELOCITY_GAIN;
    [
        base[0] + velocity[0] * influence,
        base[1] + velocity[1] * influence,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTER: [f32; 2] = [0.5, 0.5];

    fn assert_finite(uv: [f32; 2]) {
        assert!(uv[0].is_finite() && uv[1].is_finite(), "non-finite uv {uv:?}");
    }

    #[test]
    fn zero_distance_is_guarded_for_all_algorithms() {
        let params = DistortionParams::default();
        for kind in [
            DistortionKind::Fluid,
            DistortionKind::Magnetic,
            DistortionKind::Ripple,
            DistortionKind::Vortex,
        ] {
            let out = displace(kind, CENTER, CENTER, [0.0, 0.0], 1.25, &params);
            assert_finite(out);
        }
        // Magnetic/ripple/vortex return the identity exactly at the pointer.
        assert_eq!(magnetic(CENTER, CENTER, 0.7, &params), CENTER);
        assert_eq!(ripple(CENTER, CENTER, 0.7, &params), CENTER);
        assert_eq!(vortex(CENTER, CENTER, 0.7, &params), CENTER);
    }

    #[test]
    fn center_is_guarded_under_auto_animation() {
        let params = DistortionParams {
            auto_animation: true,
            ..DistortionParams::default()
        };
        for time in [0.0, 0.33, 7.5, 1000.0] {
            let pointer = auto_pointer(time, params.animation_speed);
            for kind in [
                DistortionKind::Fluid,
                DistortionKind::Magnetic,
                DistortionKind::Ripple,
                DistortionKind::Vortex,
            ] {
                assert_finite(displace(kind, pointer, pointer, [0.0, 0.0], time, &params));
                assert_finite(displace(kind, CENTER, pointer, [0.0, 0.0], time, &params));
            }
        }
    }

    #[test]
    fn falloff_is_monotonically_non_increasing() {
        for exponent in [0.5, 0.8, 1.0, 2.5] {
            let mut previous = f32::INFINITY;
            for step in 0..=100 {
                let dist = step as f32 * 0.01;
                let value = falloff(dist, 0.3, exponent);
                assert!(
                    value <= previous + f32::EPSILON,
                    "falloff increased at dist {dist} (exp {exponent})"
                );
                assert!(value.is_finite() && value >= 0.0);
                previous = value;
            }
        }
    }

    #[test]
    fn falloff_vanishes_at_radius() {
        assert_eq!(falloff(0.3, 0.3, 0.8), 0.0);
        assert_eq!(falloff(0.9, 0.3, 0.8), 0.0);
        assert!(falloff(0.0, 0.3, 0.8) > 0.99);
    }

    #[test]
    fn magnetic_attracts_inward_and_fades_at_boundary() {
        // End-to-end scenario from the design brief: magnetic, intensity 0.5,
        // radius 0.3, polarity 1.0, pointer at the image center.
        let params = DistortionParams {
            intensity: 0.5,
            radius: 0.3,
            magnetic_polarity: 1.0,
            ..DistortionParams::default()
        };

        assert_eq!(magnetic(CENTER, CENTER, 0.0, &params), CENTER);

        // Halfway inside the radius the sample moves toward the pointer.
        let uv = [0.5 + 0.15, 0.5];
        let out = magnetic(uv, CENTER, 0.0, &params);
        let moved = [out[0] - uv[0], out[1] - uv[1]];
        assert!(moved[0] < 0.0, "expected attraction toward the pointer");
        assert!(moved[1].abs() < 1e-6);

        // At the fall-off boundary the displacement magnitude is ~zero.
        let boundary = [0.5 + 0.3, 0.5];
        let out = magnetic(boundary, CENTER, 0.0, &params);
        let magnitude = length(sub(out, boundary));
        assert!(magnitude < 1e-6, "boundary magnitude {magnitude}");
    }

    #[test]
    fn magnetic_polarity_flips_direction() {
        let attract = DistortionParams::default();
        let repel = DistortionParams {
            magnetic_polarity: -1.0,
            ..DistortionParams::default()
        };
        let uv = [0.6, 0.5];
        let toward = magnetic(uv, CENTER, 0.0, &attract)[0] - uv[0];
        let away = magnetic(uv, CENTER, 0.0, &repel)[0] - uv[0];
        assert!(toward < 0.0);
        assert!(away > 0.0);
        assert!((toward + away).abs() < 1e-6);
    }

    #[test]
    fn vortex_rotation_stays_bounded_near_center() {
        let params = DistortionParams::default();
        for step in 1..50 {
            let uv = [0.5 + step as f32 * 1e-4, 0.5];
            let out = vortex(uv, CENTER, 2.0, &params);
            assert_finite(out);
            assert!(length(sub(out, uv)) < 0.1);
        }
    }

    #[test]
    fn velocity_term_is_gated_by_interaction_falloff() {
        let params = DistortionParams::default();
        let velocity = [2.0, -1.0];
        // Outside the interaction radius the velocity term contributes nothing.
        let far = [0.95, 0.95];
        let with = displace(DistortionKind::Ripple, far, CENTER, velocity, 0.4, &params);
        let without = displace(DistortionKind::Ripple, far, CENTER, [0.0, 0.0], 0.4, &params);
        assert_eq!(with, without);

        // Inside it does.
        let near = [0.55, 0.5];
        let with = displace(DistortionKind::Ripple, near, CENTER, velocity, 0.4, &params);
        let without = displace(DistortionKind::Ripple, near, CENTER, [0.0, 0.0], 0.4, &params);
        assert!(with[0] > without[0]);
        assert!(with[1] < without[1]);
    }

    #[test]
    fn fluid_displacement_is_small_and_finite() {
        let params = DistortionParams::default();
        for step in 0..20 {
            let uv = [step as f32 / 20.0, 1.0 - step as f32 / 20.0];
            let out = fluid(uv, CENTER, 3.1, &params);
            assert_finite(out);
            assert!(length(sub(out, uv)) < 0.2);
        }
    }

    #[test]
    fn noise_is_deterministic_and_normalized() {
        for step in 0..50 {
            let p = [step as f32 * 0.37, step as f32 * 0.91];
            let a = value_noise(p);
            let b = value_noise(p);
            assert_eq!(a, b);
            assert!((0.0..=1.0).contains(&a));
            assert!((0.0..=0.75).contains(&fbm(p)));
        }
    }
}
