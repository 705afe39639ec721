//! Adapter capability probe used to pick a sane starting quality tier.

use effectconfig::QualitySetting;

use crate::perf::QualityTier;

/// Texture limit below which an adapter is treated as low-end.
const LOW_END_TEXTURE_LIMIT: u32 = 4096;

/// Snapshot of the limits and identity of the selected adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
    pub max_buffer_size: u64,
}

impl DeviceCapabilities {
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();
        Self {
            name: info.name,
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
        }
    }

    /// Software rasterizers (llvmpipe, SwiftShader) report as CPU devices or
    /// carry a telltale name.
    pub fn is_software(&self) -> bool {
        if matches!(self.device_type, wgpu::DeviceType::Cpu) {
            return true;
        }
        let name = self.name.to_ascii_lowercase();
        name.contains("llvmpipe") || name.contains("swiftshader") || name.contains("softpipe")
    }

    pub fn is_low_end(&self) -> bool {
        self.is_software() || self.max_texture_dimension < LOW_END_TEXTURE_LIMIT
    }

    /// Clamps a requested texture edge to what the adapter can sample.
    pub fn clamp_texture_extent(&self, requested: u32) -> u32 {
        requested.min(self.max_texture_dimension).max(1)
    }

    /// Starting tier for the quality controller. The configured preference
    /// wins unless the adapter clearly cannot sustain it.
    pub fn initial_tier(&self, preference: QualitySetting) -> QualityTier {
        let requested = QualityTier::from(preference);
        let ceiling = if self.is_software() {
            QualityTier::Low
        } else if self.is_low_end() {
            QualityTier::Medium
        } else {
            QualityTier::High
        };
        requested.min(ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(name: &str, device_type: wgpu::DeviceType, max_texture: u32) -> DeviceCapabilities {
        DeviceCapabilities {
            name: name.to_string(),
            backend: wgpu::Backend::Vulkan,
            device_type,
            max_texture_dimension: max_texture,
            max_buffer_size: 1 << 28,
        }
    }

    #[test]
    fn cpu_adapters_are_software() {
        assert!(caps("some device", wgpu::DeviceType::Cpu, 8192).is_software());
    }

    #[test]
    fn llvmpipe_is_software_regardless_of_reported_type() {
        let probe = caps(
            "llvmpipe (LLVM 17.0.6, 256 bits)",
            wgpu::DeviceType::VirtualGpu,
            8192,
        );
        assert!(probe.is_software());
    }

    #[test]
    fn software_adapter_forces_low_tier() {
        let probe = caps("SwiftShader Device", wgpu::DeviceType::Cpu, 8192);
        assert_eq!(probe.initial_tier(QualitySetting::High), QualityTier::Low);
    }

    #[test]
    fn low_end_adapter_caps_at_medium() {
        let probe = caps("Mali-G52", wgpu::DeviceType::IntegratedGpu, 2048);
        assert_eq!(probe.initial_tier(QualitySetting::High), QualityTier::Medium);
        assert_eq!(probe.initial_tier(QualitySetting::Low), QualityTier::Low);
    }

    #[test]
    fn discrete_adapter_honors_the_preference() {
        let probe = caps("GeForce RTX 3060", wgpu::DeviceType::DiscreteGpu, 16384);
        assert_eq!(probe.initial_tier(QualitySetting::High), QualityTier::High);
        assert_eq!(probe.initial_tier(QualitySetting::Medium), QualityTier::Medium);
    }

    #[test]
    fn texture_extent_is_clamped_to_the_limit() {
        let probe = caps("Mali-G52", wgpu::DeviceType::IntegratedGpu, 2048);
        assert_eq!(probe.clamp_texture_extent(4096), 2048);
        assert_eq!(probe.clamp_texture_extent(512), 512);
        assert_eq!(probe.clamp_texture_extent(0), 1);
    }
}
