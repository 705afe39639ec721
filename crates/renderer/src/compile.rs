//! GLSL sources and shader-module compilation.
//!
//! The fragment shaders evaluate the same displacement and grid formulas as
//! the CPU reference code in `distortion.rs` and `grid.rs`; the constants are
//! duplicated here and must be kept in step with those modules. The uniform
//! block mirrors [`EffectUniforms`](crate::gpu::uniforms::EffectUniforms)
//! slot for slot.

use std::borrow::Cow;

use anyhow::{bail, Result};
use wgpu::naga::ShaderStage;

/// Compiles a GLSL module and surfaces validation failures as errors instead
/// of uncaptured device callbacks.
fn compile_glsl(
    device: &wgpu::Device,
    label: &str,
    source: Cow<'static, str>,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: source,
            stage,
            defines: &[],
        },
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        bail!("shader '{label}' failed validation: {error}");
    }
    Ok(module)
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "fullscreen triangle vertex",
        Cow::Borrowed(VERTEX_SHADER_GLSL),
        ShaderStage::Vertex,
    )
}

/// Compiles the primary fragment shader: all four distortion algorithms plus
/// the full grid compositor, switched per frame through the uniform block.
pub(crate) fn compile_effect_fragment(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "effect fragment",
        Cow::Owned(effect_fragment_source()),
        ShaderStage::Fragment,
    )
}

/// Compiles the reduced fragment shader used when the primary one fails to
/// validate: undistorted image plus fine grid lines only.
pub(crate) fn compile_minimal_fragment(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "minimal fragment",
        Cow::Owned(minimal_fragment_source()),
        ShaderStage::Fragment,
    )
}

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    // UV origin is the top-left corner, matching pointer coordinates and
    // image row order; NDC y points the other way.
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Uniform block declaration shared by both fragment shaders. Slot layout
/// matches `EffectUniforms` in `gpu/uniforms.rs`.
const FRAGMENT_PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform EffectParams {
    vec4 surface;     // width, height, pixel_ratio, time
    vec4 pointer;     // position.xy, velocity.xy
    vec4 interaction; // velocity_effects, velocity_influence, radius, falloff
    vec4 effect;      // algorithm, intensity, radius, falloff
    vec4 params_a;    // magnetic_strength, polarity, ripple_freq, ripple_amp
    vec4 params_b;    // ripple_decay, vortex_strength, vortex_tightness, auto
    vec4 grid_a;      // show_grid, cell_size, grid_opacity, thickness_px
    vec4 grid_color;  // rgb, blend_mode
    vec4 grid_b;      // grid_mode, advanced_grid, image_opacity, anim_speed
    vec4 fit;         // uv scale.xy, offset.xy
} ubo;

layout(set = 1, binding = 0) uniform texture2D image_texture;
layout(set = 1, binding = 1) uniform sampler image_sampler;
";

const EFFECT_FRAGMENT_BODY: &str = r"
const float EPS = 1e-4;

const float MAGNETIC_SOFTENING = 1e-3;
const float MAGNETIC_FORCE_CAP = 12.0;
const float MAGNETIC_GAIN = 0.02;

const float RIPPLE_SPEED = 3.0;
const float RIPPLE_GAIN = 0.08;
const float RIPPLE_SECONDARY_FREQ = 0.6;
const float RIPPLE_SECONDARY_PHASE = 1.7;
const float RIPPLE_SECONDARY_MIX = 0.35;

const float VORTEX_SOFTENING = 0.05;
const float VORTEX_MAX_TIGHTNESS = 8.0;
const float VORTEX_ANGLE_GAIN = 0.6;
const float VORTEX_PULL = 0.05;

const float FLUID_BASE_SCALE = 3.0;
const float FLUID_DETAIL_SCALE = 8.0;
const float FLUID_ADVECT = 0.3;
const float FLUID_DETAIL_DRIFT = 0.2;
const float FLUID_DETAIL_MIX = 0.3;
const float FLUID_GAIN = 0.1;
const float FLUID_WOBBLE_GAIN = 0.01;

const float VELOCITY_GAIN = 0.15;

const float AUTO_PULSE_RATE = 2.0;
const float AUTO_PULSE_DEPTH = 0.35;
const float AUTO_SPIN_RATE = 0.4;
const float AUTO_RIPPLE_WEIGHT = 0.25;

float falloff_shape(float dist, float radius, float exponent) {
    float t = 1.0 - smoothstep(0.0, max(radius, EPS), dist);
    return pow(t, max(exponent, EPS));
}

float hash2(vec2 p) {
    return fract(sin(p.x * 127.1 + p.y * 311.7) * 43758.547);
}

float value_noise(vec2 p) {
    vec2 i = floor(p);
    vec2 f = fract(p);
    vec2 u = f * f * (3.0 - 2.0 * f);
    float a = hash2(i);
    float b = hash2(i + vec2(1.0, 0.0));
    float c = hash2(i + vec2(0.0, 1.0));
    float d = hash2(i + vec2(1.0, 1.0));
    return mix(mix(a, b, u.x), mix(c, d, u.x), u.y);
}

float fbm(vec2 p) {
    float total = 0.5 * value_noise(p);
    total += 0.25 * value_noise(p * 2.0);
    return total;
}

float breathing(float t, float speed) {
    return 0.3 * sin(t * 0.7 * speed)
         + 0.2 * sin(t * 1.3 * speed)
         + 0.1 * sin(t * 2.9 * speed);
}

vec2 fluid_uv(vec2 uv, vec2 pointer, float t) {
    float dist = length(uv - pointer);
    float fall = falloff_shape(dist, ubo.effect.z, ubo.effect.w);
    float speed = ubo.grid_b.w;
    float intensity = ubo.effect.y;

    vec2 base = vec2(
        uv.x * FLUID_BASE_SCALE + t * FLUID_ADVECT * speed,
        uv.y * FLUID_BASE_SCALE - t * FLUID_ADVECT * speed * 0.7);
    vec2 detail = vec2(
        uv.x * FLUID_DETAIL_SCALE - t * FLUID_DETAIL_DRIFT * speed,
        uv.y * FLUID_DETAIL_SCALE + t * FLUID_DETAIL_DRIFT * speed);
    float nx = fbm(base) * (1.0 - FLUID_DETAIL_MIX)
        + value_noise(detail) * FLUID_DETAIL_MIX;
    float ny = fbm(vec2(base.y + 13.7, base.x + 5.3)) * (1.0 - FLUID_DETAIL_MIX)
        + value_noise(vec2(detail.y + 7.1, detail.x + 2.9)) * FLUID_DETAIL_MIX;
    vec2 offset = (vec2(nx, ny) - 0.375) * 2.0;

    float amount = intensity * fall * FLUID_GAIN;
    vec2 wobble = vec2(
        sin(t * 1.3 * speed) * FLUID_WOBBLE_GAIN * intensity * fall,
        cos(t * 1.7 * speed) * FLUID_WOBBLE_GAIN * intensity * fall);
    if (ubo.params_b.w > 0.5) {
        amount *= 1.0 + breathing(t, speed);
        wobble.x += breathing(t * 1.9, speed) * FLUID_WOBBLE_GAIN * intensity;
        wobble.y += breathing(t * 2.3 + 4.2, speed) * FLUID_WOBBLE_GAIN * intensity;
    }
    return uv + offset * amount + wobble;
}

vec2 magnetic_uv(vec2 uv, vec2 pointer, float t) {
    vec2 to_pointer = pointer - uv;
    float dist = length(to_pointer);
    if (dist < EPS) {
        return uv;
    }
    vec2 dir = to_pointer / dist;
    float exp_fall = exp(-dist / max(ubo.effect.z, EPS));
    float force = min(
        ubo.params_a.x / (dist * dist + MAGNETIC_SOFTENING),
        MAGNETIC_FORCE_CAP);
    float shaped = falloff_shape(dist, ubo.effect.z, ubo.effect.w);
    float magnitude = ubo.effect.y * ubo.params_a.y
        * exp_fall * force * shaped * MAGNETIC_GAIN;
    if (ubo.params_b.w > 0.5) {
        magnitude *= 1.0 + AUTO_PULSE_DEPTH * sin(t * AUTO_PULSE_RATE * ubo.grid_b.w);
    }
    return uv + dir * magnitude;
}

vec2 ripple_uv(vec2 uv, vec2 pointer, float t) {
    vec2 from_pointer = uv - pointer;
    float dist = length(from_pointer);
    if (dist < EPS) {
        return uv;
    }
    vec2 dir = from_pointer / dist;
    vec2 perp = vec2(-dir.y, dir.x);
    float speed = ubo.grid_b.w;
    float frequency = ubo.params_a.z;
    float amplitude = ubo.params_a.w;

    float decay = exp(-dist * ubo.params_b.x);
    float shaped = falloff_shape(dist, ubo.effect.z, ubo.effect.w);
    float wave = sin(dist * frequency - t * RIPPLE_SPEED * speed) * amplitude * decay;
    float wave2 = sin(dist * frequency * RIPPLE_SECONDARY_FREQ
            - t * RIPPLE_SPEED * speed * 0.8 + RIPPLE_SECONDARY_PHASE)
        * amplitude * RIPPLE_SECONDARY_MIX * decay;

    if (ubo.params_b.w > 0.5) {
        wave += sin(dist * frequency - t * 1.1 * speed * RIPPLE_SPEED)
            * amplitude * AUTO_RIPPLE_WEIGHT * decay;
        wave += sin(dist * frequency * 1.5 - t * 1.9 * speed * RIPPLE_SPEED + 2.1)
            * amplitude * AUTO_RIPPLE_WEIGHT * decay;
    }

    float gain = ubo.effect.y * shaped * RIPPLE_GAIN;
    return uv + (dir * wave + perp * wave2) * gain;
}

vec2 vortex_uv(vec2 uv, vec2 pointer, float t) {
    vec2 v = uv - pointer;
    float dist = length(v);
    if (dist < EPS) {
        return uv;
    }
    float shaped = falloff_shape(dist, ubo.effect.z, ubo.effect.w);
    float tightness = min(
        ubo.params_b.z / (dist + VORTEX_SOFTENING),
        VORTEX_MAX_TIGHTNESS);
    float angle = ubo.params_b.y * shaped * tightness * VORTEX_ANGLE_GAIN;
    if (ubo.params_b.w > 0.5) {
        float speed = ubo.grid_b.w;
        angle += t * AUTO_SPIN_RATE * speed * shaped;
        angle *= 1.0 + breathing(t, speed) * 0.5;
    }
    float s = sin(angle);
    float c = cos(angle);
    vec2 rotated = vec2(v.x * c - v.y * s, v.x * s + v.y * c);
    float pull = VORTEX_PULL * shaped * ubo.effect.y;
    return uv + (rotated - v) * ubo.effect.y - v * pull;
}

vec2 displace(vec2 uv, vec2 pointer, vec2 velocity, float t) {
    int algorithm = int(ubo.effect.x + 0.5);
    vec2 base;
    if (algorithm == 1) {
        base = magnetic_uv(uv, pointer, t);
    } else if (algorithm == 2) {
        base = ripple_uv(uv, pointer, t);
    } else if (algorithm == 3) {
        base = vortex_uv(uv, pointer, t);
    } else {
        base = fluid_uv(uv, pointer, t);
    }

    float dist = length(uv - pointer);
    float gate = falloff_shape(dist, ubo.interaction.z, ubo.interaction.w);
    float influence = ubo.interaction.x * ubo.interaction.y * gate * VELOCITY_GAIN;
    return base + velocity * influence;
}

float line_mask(float coord, float cell, float half_width, float aa) {
    float pos = abs(fract(coord / cell)) * cell;
    float dist = min(pos, cell - pos);
    return clamp(1.0 - clamp((dist - half_width) / aa, 0.0, 1.0), 0.0, 1.0);
}

float axis_mask(vec2 uv, float cell, float half_width, float aa) {
    return max(line_mask(uv.x, cell, half_width, aa),
               line_mask(uv.y, cell, half_width, aa));
}

float grid_intensity(vec2 uv, float aa) {
    float cell = ubo.grid_a.y;
    float half_width = ubo.grid_a.w * 0.5 / ubo.surface.y;
    float fine = axis_mask(uv, cell, half_width, aa);
    if (ubo.grid_b.y < 0.5) {
        return clamp(fine, 0.0, 1.0);
    }
    float medium = axis_mask(uv, cell * 5.0, half_width, aa) * 0.6;
    float major = axis_mask(uv, cell * 0.1, half_width * 0.5, aa) * 0.8;
    return clamp(max(fine, max(medium, major)), 0.0, 1.0);
}

float overlay_channel(float base, float grid) {
    return base < 0.5
        ? 2.0 * base * grid
        : 1.0 - 2.0 * (1.0 - base) * (1.0 - grid);
}

vec3 blend_grid(vec3 base, float mask) {
    vec3 grid = ubo.grid_color.rgb;
    int mode = int(ubo.grid_color.w + 0.5);
    vec3 combined;
    if (mode == 1) {
        combined = base * grid;
    } else if (mode == 2) {
        combined = 1.0 - (1.0 - base) * (1.0 - grid);
    } else if (mode == 3) {
        combined = vec3(
            overlay_channel(base.r, grid.r),
            overlay_channel(base.g, grid.g),
            overlay_channel(base.b, grid.b));
    } else if (mode == 4) {
        combined = min(base + grid, vec3(1.0));
    } else {
        combined = grid;
    }
    return mix(base, combined, clamp(mask, 0.0, 1.0));
}

void main() {
    vec2 uv = v_uv;
    vec2 pointer = ubo.pointer.xy;
    vec2 velocity = ubo.pointer.zw;
    float t = ubo.surface.w;

    vec2 distorted = displace(uv, pointer, velocity, t);

    int grid_mode = int(ubo.grid_b.x + 0.5);
    vec2 grid_uv = uv;
    if (grid_mode == 1) {
        grid_uv = distorted;
    } else if (grid_mode == 2) {
        // Counter-phased pass: time runs backwards on a detuned clock and
        // the displacement is halved, so the grid contrasts with the image.
        vec2 detuned = displace(uv, pointer, vec2(0.0), 7.0 - t * 1.3);
        grid_uv = uv + (detuned - uv) * 0.5;
    }

    vec2 sample_uv = clamp(distorted * ubo.fit.xy + ubo.fit.zw, 0.0, 1.0);
    vec3 base = texture(sampler2D(image_texture, image_sampler), sample_uv).rgb
        * ubo.grid_b.z;

    if (ubo.grid_a.x > 0.5) {
        float aa = max(fwidth(grid_uv.x) + fwidth(grid_uv.y), 1e-6);
        float mask = grid_intensity(grid_uv, aa) * ubo.grid_a.z;
        base = blend_grid(base, mask);
    }

    outColor = vec4(base, 1.0);
}
";

const MINIMAL_FRAGMENT_BODY: &str = r"
float line_mask(float coord, float cell, float half_width, float aa) {
    float pos = abs(fract(coord / cell)) * cell;
    float dist = min(pos, cell - pos);
    return clamp(1.0 - clamp((dist - half_width) / aa, 0.0, 1.0), 0.0, 1.0);
}

void main() {
    vec2 uv = v_uv;
    vec2 sample_uv = clamp(uv * ubo.fit.xy + ubo.fit.zw, 0.0, 1.0);
    vec3 base = texture(sampler2D(image_texture, image_sampler), sample_uv).rgb
        * ubo.grid_b.z;

    if (ubo.grid_a.x > 0.5) {
        float aa = max(fwidth(uv.x) + fwidth(uv.y), 1e-6);
        float cell = ubo.grid_a.y;
        float half_width = ubo.grid_a.w * 0.5 / ubo.surface.y;
        float mask = max(line_mask(uv.x, cell, half_width, aa),
                         line_mask(uv.y, cell, half_width, aa))
            * ubo.grid_a.z;
        base = mix(base, ubo.grid_color.rgb, clamp(mask, 0.0, 1.0));
    }

    outColor = vec4(base, 1.0);
}
";

// The prelude is shared so the two fragment shaders cannot drift apart in
// their uniform block declarations.
fn effect_fragment_source() -> String {
    format!("{FRAGMENT_PRELUDE}{EFFECT_FRAGMENT_BODY}")
}

fn minimal_fragment_source() -> String {
    format!("{FRAGMENT_PRELUDE}{MINIMAL_FRAGMENT_BODY}")
}
