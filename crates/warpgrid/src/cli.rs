use std::path::PathBuf;

use clap::Parser;
use effectconfig::{DistortionType, QualitySetting};

#[derive(Parser, Debug)]
#[command(
    name = "warpgrid",
    author,
    version,
    about = "Interactive image distortion viewer",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Image to distort. Omit to run against the placeholder checkerboard.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Effect configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Distortion algorithm (`fluid`, `magnetic`, `ripple`, `vortex`).
    #[arg(long, value_name = "MODE", value_parser = parse_distortion)]
    pub distortion: Option<DistortionType>,

    /// Starting quality tier (`low`, `medium`, `high`).
    #[arg(long, value_name = "TIER", value_parser = parse_quality)]
    pub quality: Option<QualitySetting>,

    /// Animate the effect even without pointer input.
    #[arg(long)]
    pub auto_animate: bool,

    /// Disable the grid overlay.
    #[arg(long)]
    pub no_grid: bool,

    /// Initial window size as WIDTHxHEIGHT.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,
}

fn parse_distortion(value: &str) -> Result<DistortionType, String> {
    match value.to_ascii_lowercase().as_str() {
        "fluid" => Ok(DistortionType::Fluid),
        "magnetic" => Ok(DistortionType::Magnetic),
        "ripple" => Ok(DistortionType::Ripple),
        "vortex" => Ok(DistortionType::Vortex),
        other => Err(format!(
            "unknown distortion `{other}` (expected fluid, magnetic, ripple, or vortex)"
        )),
    }
}

fn parse_quality(value: &str) -> Result<QualitySetting, String> {
    match value.to_ascii_lowercase().as_str() {
        "low" => Ok(QualitySetting::Low),
        "medium" => Ok(QualitySetting::Medium),
        "high" => Ok(QualitySetting::High),
        other => Err(format!(
            "unknown quality `{other}` (expected low, medium, or high)"
        )),
    }
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: u32 = width.parse().map_err(|_| format!("bad width `{width}`"))?;
    let height: u32 = height
        .parse()
        .map_err(|_| format!("bad height `{height}`"))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be non-zero".to_string());
    }
    Ok((width, height))
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distortion_names_parse_case_insensitively() {
        assert_eq!(parse_distortion("Vortex"), Ok(DistortionType::Vortex));
        assert!(parse_distortion("swirl").is_err());
    }

    #[test]
    fn size_requires_both_dimensions() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
    }
}
