//! Configuration surface for the warpgrid engine.
//!
//! The host (CLI, design tool, embedding shell) hands the engine a single
//! [`EffectConfig`] record. Every knob carries the documented default so a
//! completely empty TOML document is a valid configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which displacement algorithm the fragment stage evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistortionType {
    #[default]
    Fluid,
    Magnetic,
    Ripple,
    Vortex,
}

/// How the grid layer is composited over the distorted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GridBlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Add,
}

/// Whether grid lines sample distorted UVs, and which flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GridDistortionMode {
    Undistorted,
    #[default]
    Follow,
    Independent,
}

/// How the source image maps onto the surface rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    #[default]
    Cover,
    Contain,
    Fill,
}

/// Initial quality tier requested by the host. The adaptive controller may
/// move away from it at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySetting {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EffectConfig {
    // Shared distortion controls.
    pub distortion_type: DistortionType,
    pub intensity: f32,
    pub radius: f32,
    pub falloff: f32,

    // Algorithm-specific knobs.
    pub magnetic_strength: f32,
    pub magnetic_polarity: f32,
    pub ripple_frequency: f32,
    pub ripple_amplitude: f32,
    pub ripple_decay: f32,
    pub vortex_strength: f32,
    pub vortex_tightness: f32,

    // Grid overlay.
    pub show_grid: bool,
    pub grid_size: f32,
    pub grid_opacity: f32,
    pub grid_color: String,
    pub grid_thickness: f32,
    pub grid_blend_mode: GridBlendMode,
    pub grid_distortion_mode: GridDistortionMode,

    // Interaction model.
    pub mouse_easing: f32,
    pub interaction_radius: f32,
    pub interaction_falloff: f32,
    pub velocity_influence: f32,
    pub mouse_smoothing: f32,

    // Idle animation.
    pub auto_animation: bool,
    pub animation_speed: f32,

    // Image source.
    pub image_src: String,
    pub image_opacity: f32,
    pub image_fit: ImageFit,

    // Performance.
    pub quality: QualitySetting,
    pub show_performance_info: bool,

    // Relayed to the host's accessibility layer; the engine never reads it.
    pub aria_label: String,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            distortion_type: DistortionType::Fluid,
            intensity: 0.5,
            radius: 0.3,
            falloff: 0.8,
            magnetic_strength: 1.0,
            magnetic_polarity: 1.0,
            ripple_frequency: 10.0,
            ripple_amplitude: 0.5,
            ripple_decay: 2.0,
            vortex_strength: 2.0,
            vortex_tightness: 1.0,
            show_grid: true,
            grid_size: 20.0,
            grid_opacity: 0.3,
            grid_color: "#ffffff".to_string(),
            grid_thickness: 1.0,
            grid_blend_mode: GridBlendMode::Normal,
            grid_distortion_mode: GridDistortionMode::Follow,
            mouse_easing: 0.1,
            interaction_radius: 0.3,
            interaction_falloff: 0.8,
            velocity_influence: 0.5,
            mouse_smoothing: 0.8,
            auto_animation: false,
            animation_speed: 1.0,
            image_src: String::new(),
            image_opacity: 1.0,
            image_fit: ImageFit::Cover,
            quality: QualitySetting::Medium,
            show_performance_info: false,
            aria_label: String::new(),
        }
    }
}

impl EffectConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: EffectConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses `grid_color` as `#rrggbb` into normalized RGB.
    pub fn grid_color_rgb(&self) -> Result<[f32; 3], ConfigError> {
        parse_hex_color(&self.grid_color)
            .ok_or_else(|| ConfigError::Invalid(format!("invalid grid_color '{}'", self.grid_color)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
            if condition {
                Ok(())
            } else {
                Err(ConfigError::Invalid(message.to_string()))
            }
        }

        ensure(
            self.intensity.is_finite() && self.intensity >= 0.0,
            "intensity must be finite and >= 0",
        )?;
        ensure(
            self.radius.is_finite() && self.radius > 0.0,
            "radius must be finite and > 0",
        )?;
        ensure(
            self.falloff.is_finite() && self.falloff > 0.0,
            "falloff must be finite and > 0",
        )?;
        ensure(
            self.ripple_frequency.is_finite() && self.ripple_frequency > 0.0,
            "ripple_frequency must be > 0",
        )?;
        ensure(self.ripple_decay >= 0.0, "ripple_decay must be >= 0")?;
        ensure(
            self.magnetic_polarity == 1.0 || self.magnetic_polarity == -1.0,
            "magnetic_polarity must be 1.0 (attract) or -1.0 (repel)",
        )?;
        ensure(self.grid_size > 0.0, "grid_size must be > 0")?;
        ensure(
            (0.0..=1.0).contains(&self.grid_opacity),
            "grid_opacity must be within [0, 1]",
        )?;
        ensure(self.grid_thickness > 0.0, "grid_thickness must be > 0")?;
        ensure(
            self.mouse_easing > 0.0 && self.mouse_easing <= 1.0,
            "mouse_easing must be within (0, 1]",
        )?;
        ensure(
            self.interaction_radius > 0.0,
            "interaction_radius must be > 0",
        )?;
        ensure(
            self.interaction_falloff > 0.0,
            "interaction_falloff must be > 0",
        )?;
        ensure(
            (0.0..1.0).contains(&self.mouse_smoothing),
            "mouse_smoothing must be within [0, 1)",
        )?;
        ensure(
            self.velocity_influence >= 0.0,
            "velocity_influence must be >= 0",
        )?;
        ensure(self.animation_speed > 0.0, "animation_speed must be > 0")?;
        ensure(
            (0.0..=1.0).contains(&self.image_opacity),
            "image_opacity must be within [0, 1]",
        )?;
        self.grid_color_rgb().map(|_| ())
    }
}

fn parse_hex_color(raw: &str) -> Option<[f32; 3]> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map(|value| value as f32 / 255.0)
            .ok()
    };
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EffectConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config.distortion_type, DistortionType::Fluid);
        assert_eq!(config.intensity, 0.5);
        assert_eq!(config.radius, 0.3);
        assert_eq!(config.falloff, 0.8);
        assert_eq!(config.ripple_frequency, 10.0);
        assert_eq!(config.vortex_strength, 2.0);
        assert!(config.show_grid);
        assert_eq!(config.grid_size, 20.0);
        assert_eq!(config.grid_blend_mode, GridBlendMode::Normal);
        assert_eq!(config.grid_distortion_mode, GridDistortionMode::Follow);
        assert_eq!(config.mouse_easing, 0.1);
        assert_eq!(config.quality, QualitySetting::Medium);
        assert!(!config.auto_animation);
        assert_eq!(config.image_fit, ImageFit::Cover);
    }

    #[test]
    fn parses_overrides() {
        let config = EffectConfig::from_toml_str(
            r#"
distortion_type = "magnetic"
intensity = 0.8
magnetic_polarity = -1.0
grid_blend_mode = "overlay"
grid_distortion_mode = "independent"
quality = "low"
image_src = "assets/waves.png"
"#,
        )
        .expect("parse config");
        assert_eq!(config.distortion_type, DistortionType::Magnetic);
        assert_eq!(config.intensity, 0.8);
        assert_eq!(config.magnetic_polarity, -1.0);
        assert_eq!(config.grid_blend_mode, GridBlendMode::Overlay);
        assert_eq!(
            config.grid_distortion_mode,
            GridDistortionMode::Independent
        );
        assert_eq!(config.quality, QualitySetting::Low);
        assert_eq!(config.image_src, "assets/waves.png");
    }

    #[test]
    fn rejects_out_of_range_opacity() {
        let err = EffectConfig::from_toml_str("grid_opacity = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_fractional_polarity() {
        let err = EffectConfig::from_toml_str("magnetic_polarity = 0.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_grid_color() {
        let err = EffectConfig::from_toml_str(r#"grid_color = "white""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn parses_hex_grid_color() {
        let config = EffectConfig::from_toml_str(r##"grid_color = "#3366cc""##).unwrap();
        let rgb = config.grid_color_rgb().unwrap();
        assert!((rgb[0] - 0x33 as f32 / 255.0).abs() < 1e-6);
        assert!((rgb[1] - 0x66 as f32 / 255.0).abs() < 1e-6);
        assert!((rgb[2] - 0xcc as f32 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_unknown_distortion_type() {
        let err = EffectConfig::from_toml_str(r#"distortion_type = "swirl""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
