//! std140 uniform block shared with the GLSL in `compile.rs`.

use bytemuck::{Pod, Zeroable};
use effectconfig::{DistortionType, EffectConfig, GridBlendMode, GridDistortionMode};

/// Per-frame parameter block. Every field is a vec4 so the Rust layout and
/// the std140 layout agree without padding games. Field slots are documented
/// next to the matching GLSL declaration in `compile.rs`.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectUniforms {
    /// surface: width, height, pixel_ratio, time.
    pub surface: [f32; 4],
    /// pointer: position.xy, velocity.xy.
    pub pointer: [f32; 4],
    /// interaction: velocity_effects flag, velocity_influence,
    /// interaction_radius, interaction_falloff.
    pub interaction: [f32; 4],
    /// effect: algorithm index, intensity, radius, falloff exponent.
    pub effect: [f32; 4],
    /// params_a: magnetic_strength, magnetic_polarity, ripple_frequency,
    /// ripple_amplitude.
    pub params_a: [f32; 4],
    /// params_b: ripple_decay, vortex_strength, vortex_tightness,
    /// auto_animation flag.
    pub params_b: [f32; 4],
    /// grid_a: show_grid flag, fine cell size in UV units (1 / grid_size),
    /// grid_opacity, grid_thickness in pixels.
    pub grid_a: [f32; 4],
    /// grid_color: rgb, blend mode index.
    pub grid_color: [f32; 4],
    /// grid_b: grid distortion mode index, advanced_grid flag,
    /// image_opacity, animation_speed.
    pub grid_b: [f32; 4],
    /// fit: sample-space UV scale.xy and offset.xy for the image fit.
    pub fit: [f32; 4],
}

// All-vec4 layout: no interior padding, size is a multiple of the alignment.
unsafe impl Zeroable for EffectUniforms {}
unsafe impl Pod for EffectUniforms {}

fn algorithm_index(kind: DistortionType) -> f32 {
    match kind {
        DistortionType::Fluid => 0.0,
        DistortionType::Magnetic => 1.0,
        DistortionType::Ripple => 2.0,
        DistortionType::Vortex => 3.0,
    }
}

fn blend_index(mode: GridBlendMode) -> f32 {
    match mode {
        GridBlendMode::Normal => 0.0,
        GridBlendMode::Multiply => 1.0,
        GridBlendMode::Screen => 2.0,
        GridBlendMode::Overlay => 3.0,
        GridBlendMode::Add => 4.0,
    }
}

fn grid_mode_index(mode: GridDistortionMode) -> f32 {
    match mode {
        GridDistortionMode::Undistorted => 0.0,
        GridDistortionMode::Follow => 1.0,
        GridDistortionMode::Independent => 2.0,
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Everything the uniform block needs that varies per frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
    pub pointer: [f32; 2],
    pub velocity: [f32; 2],
    pub time: f32,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    /// Tier-gated toggles from the active quality preset.
    pub advanced_grid: bool,
    pub velocity_effects: bool,
    /// Image-fit transform mapping display UV into texture UV.
    pub uv_scale: [f32; 2],
    pub uv_offset: [f32; 2],
}

impl EffectUniforms {
    pub fn pack(config: &EffectConfig, frame: &FrameParams) -> Self {
        let grid_rgb = config.grid_color_rgb().unwrap_or([1.0, 1.0, 1.0]);
        Self {
            surface: [
                frame.width as f32,
                frame.height as f32,
                frame.pixel_ratio,
                frame.time,
            ],
            pointer: [
                frame.pointer[0],
                frame.pointer[1],
                frame.velocity[0],
                frame.velocity[1],
            ],
            interaction: [
                flag(frame.velocity_effects),
                config.velocity_influence,
                config.interaction_radius,
                config.interaction_falloff,
            ],
            effect: [
                algorithm_index(config.distortion_type),
                config.intensity,
                config.radius,
                config.falloff,
            ],
            params_a: [
                config.magnetic_strength,
                config.magnetic_polarity,
                config.ripple_frequency,
                config.ripple_amplitude,
            ],
            params_b: [
                config.ripple_decay,
                config.vortex_strength,
                config.vortex_tightness,
                flag(config.auto_animation),
            ],
            grid_a: [
                flag(config.show_grid),
                1.0 / config.grid_size.max(1.0),
                config.grid_opacity,
                config.grid_thickness,
            ],
            grid_color: [
                grid_rgb[0],
                grid_rgb[1],
                grid_rgb[2],
                blend_index(config.grid_blend_mode),
            ],
            grid_b: [
                grid_mode_index(config.grid_distortion_mode),
                flag(frame.advanced_grid),
                config.image_opacity,
                config.animation_speed,
            ],
            fit: [
                frame.uv_scale[0],
                frame.uv_scale[1],
                frame.uv_offset[0],
                frame.uv_offset[1],
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FrameParams {
        FrameParams {
            pointer: [0.25, 0.75],
            velocity: [0.5, -0.5],
            time: 2.0,
            width: 800,
            height: 600,
            pixel_ratio: 2.0,
            advanced_grid: true,
            velocity_effects: true,
            uv_scale: [1.0, 1.0],
            uv_offset: [0.0, 0.0],
        }
    }

    #[test]
    fn block_size_matches_ten_vec4s() {
        assert_eq!(std::mem::size_of::<EffectUniforms>(), 160);
        assert_eq!(std::mem::align_of::<EffectUniforms>(), 16);
    }

    #[test]
    fn pack_encodes_enums_as_stable_indices() {
        let mut config = EffectConfig::default();
        config.distortion_type = DistortionType::Vortex;
        config.grid_blend_mode = GridBlendMode::Overlay;
        config.grid_distortion_mode = GridDistortionMode::Independent;
        let uniforms = EffectUniforms::pack(&config, &frame());
        assert_eq!(uniforms.effect[0], 3.0);
        assert_eq!(uniforms.grid_color[3], 3.0);
        assert_eq!(uniforms.grid_b[0], 2.0);
    }

    #[test]
    fn grid_size_is_normalized_to_uv_cells() {
        let config = EffectConfig::default();
        let uniforms = EffectUniforms::pack(&config, &frame());
        // Default 20 cells across a [0,1] axis → 0.05 fine cell.
        assert!((uniforms.grid_a[1] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn bad_grid_color_falls_back_to_white() {
        let mut config = EffectConfig::default();
        config.grid_color = "not-a-color".to_string();
        let uniforms = EffectUniforms::pack(&config, &frame());
        assert_eq!(&uniforms.grid_color[0..3], &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn bytes_round_trip_through_bytemuck() {
        let uniforms = EffectUniforms::pack(&EffectConfig::default(), &frame());
        let bytes = bytemuck::bytes_of(&uniforms);
        assert_eq!(bytes.len(), 160);
        let back: &EffectUniforms = bytemuck::from_bytes(bytes);
        assert_eq!(*back, uniforms);
    }
}
