//! CPU mirror of the procedural grid compositor.
//!
//! The GLSL grid in `compile.rs` uses `fwidth` for screen-space
//! anti-aliasing; the CPU mirror takes the pixel footprint explicitly so the
//! blend and mask math can be verified in unit tests and reused by fallback
//! renderers.

use effectconfig::GridBlendMode;

/// Relative scale and weight of the three nested line sets.
const FINE_SCALE: f32 = 1.0;
const MEDIUM_SCALE: f32 = 5.0;
const MAJOR_SCALE: f32 = 0.1;
const FINE_WEIGHT: f32 = 1.0;
const MEDIUM_WEIGHT: f32 = 0.6;
const MAJOR_WEIGHT: f32 = 0.8;

fn line_mask(coord: f32, cell: f32, thickness: f32, footprint: f32) -> f32 {
    if cell <= 0.0 {
        return 0.0;
    }
    let position = (coord / cell).fract().abs() * cell;
    let distance = position.min(cell - position);
    let half_width = thickness * 0.5;
    // Anti-aliased step: fully on inside the line, fading over one footprint.
    let aa = footprint.max(1e-6);
    (1.0 - ((distance - half_width) / aa).clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

fn axis_mask(u: f32, v: f32, cell: f32, thickness: f32, footprint: f32) -> f32 {
    line_mask(u, cell, thickness, footprint).max(line_mask(v, cell, thickness, footprint))
}

/// Anti-aliased grid-line intensity at `uv`, combining fine, medium, and
/// major lines by weighted max. `size` is the fine cell size in UV units;
/// `footprint` is the UV extent of one output pixel. When `advanced` is
/// false (cheap quality tiers) only the fine lines are evaluated.
pub fn grid_intensity(
    uv: [f32; 2],
    size: f32,
    thickness: f32,
    footprint: f32,
    advanced: bool,
) -> f32 {
    let fine = axis_mask(uv[0], uv[1], size * FINE_SCALE, thickness, footprint) * FINE_WEIGHT;
    if !advanced {
        return fine.clamp(0.0, 1.0);
    }
    let medium =
        axis_mask(uv[0], uv[1], size * MEDIUM_SCALE, thickness, footprint) * MEDIUM_WEIGHT;
    let major = axis_mask(
        uv[0],
        uv[1],
        size * MAJOR_SCALE,
        thickness * 0.5,
        footprint,
    ) * MAJOR_WEIGHT;
    fine.max(medium).max(major).clamp(0.0, 1.0)
}

fn mix3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn overlay_channel(base: f32, grid: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * grid
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - grid)
    }
}

/// Composites the grid color over the base color. `mask` is the grid-line
/// intensity already multiplied by the configured opacity.
pub fn blend(mode: GridBlendMode, base: [f32; 3], grid: [f32; 3], mask: f32) -> [f32; 3] {
    let mask = mask.clamp(0.0, 1.0);
    let combined = match mode {
        GridBlendMode::Normal => grid,
        GridBlendMode::Multiply => [base[0] * grid[0], base[1] * grid[1], base[2] * grid[2]],
        GridBlendMode::Screen => [
            1.0 - (1.0 - base[0]) * (1.0 - grid[0]),
            1.0 - (1.0 - base[1]) * (1.0 - grid[1]),
            1.0 - (1.0 - base[2]) * (1.0 - grid[2]),
        ],
        GridBlendMode::Overlay => [
            overlay_channel(base[0], grid[0]),
            overlay_channel(base[1], grid[1]),
            overlay_channel(base[2], grid[2]),
        ],
        GridBlendMode::Add => [
            (base[0] + grid[0]).min(1.0),
            (base[1] + grid[1]).min(1.0),
            (base[2] + grid[2]).min(1.0),
        ],
    };
    mix3(base, combined, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAY: [f32; 3] = [0.4, 0.4, 0.4];
    const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

    #[test]
    fn zero_mask_leaves_base_untouched() {
        for mode in [
            GridBlendMode::Normal,
            GridBlendMode::Multiply,
            GridBlendMode::Screen,
            GridBlendMode::Overlay,
            GridBlendMode::Add,
        ] {
            assert_eq!(blend(mode, GRAY, WHITE, 0.0), GRAY);
        }
    }

    #[test]
    fn normal_blend_reaches_grid_color_at_full_mask() {
        assert_eq!(blend(GridBlendMode::Normal, GRAY, WHITE, 1.0), WHITE);
    }

    #[test]
    fn overlay_uses_conditional_doubling() {
        // base < 0.5 → 2 * base * grid
        let dark = blend(GridBlendMode::Overlay, [0.25; 3], [0.5; 3], 1.0);
        assert!((dark[0] - 0.25).abs() < 1e-6);
        // base >= 0.5 → 1 - 2 * (1 - base) * (1 - grid)
        let bright = blend(GridBlendMode::Overlay, [0.75; 3], [0.5; 3], 1.0);
        assert!((bright[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn screen_never_darkens_and_add_saturates() {
        let screened = blend(GridBlendMode::Screen, GRAY, [0.5; 3], 1.0);
        assert!(screened[0] >= GRAY[0]);
        let added = blend(GridBlendMode::Add, [0.9; 3], [0.9; 3], 1.0);
        assert_eq!(added, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn grid_lines_peak_on_cell_edges() {
        let size = 0.1;
        let footprint = 0.002;
        let on_line = grid_intensity([0.2, 0.555], size, 0.004, footprint, true);
        let off_line = grid_intensity([0.255, 0.555], size, 0.004, footprint, true);
        assert!(on_line > 0.9, "on-line intensity {on_line}");
        assert!(off_line < 0.1, "off-line intensity {off_line}");
    }

    #[test]
    fn basic_mode_skips_nested_scales() {
        let size = 0.1;
        let footprint = 0.001;
        // A point on a major line (cell = size * 0.1) but between fine lines.
        let uv = [0.25, 0.55];
        let advanced = grid_intensity(uv, size, 0.004, footprint, true);
        let basic = grid_intensity(uv, size, 0.004, footprint, false);
        assert!(advanced > basic);
    }

    #[test]
    fn intensity_is_always_normalized() {
        for x in 0..40 {
            for y in 0..40 {
                let uv = [x as f32 / 40.0, y as f32 / 40.0];
                let value = grid_intensity(uv, 0.05, 0.01, 0.003, true);
                assert!((0.0..=1.0).contains(&value));
            }
        }
    }
}
