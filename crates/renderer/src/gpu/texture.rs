//! Image loading and GPU texture ownership.
//!
//! Decoding runs on a worker thread so a slow disk or a large JPEG never
//! stalls the render loop; results come back over a channel and are applied
//! during `poll`. A load that fails all retries is replaced by a procedural
//! checkerboard placeholder and the engine keeps rendering.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use wgpu::util::{DeviceExt, TextureDataOrder};

/// Attempts per load request before giving up on the source.
const LOAD_ATTEMPTS: u32 = 3;
/// Base delay between attempts; doubled each retry.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
/// Resampling below this fraction of the source edge is not worth the
/// quality loss; the original is uploaded instead.
const DOWNSIZE_THRESHOLD: f32 = 0.8;
/// Checkerboard cell edge in pixels.
const PLACEHOLDER_CELL: u32 = 8;
/// Placeholder edge used before any load request arrives with a tier cap.
const DEFAULT_PLACEHOLDER_EXTENT: u32 = 64;

/// Caps a decoded image to the tier's texture budget. Returns `None` when
/// the image already fits, or when the capped size would retain more than
/// 80% of the source edge (a marginal win that is not worth resampling).
/// `hard_limit` is the adapter's maximum texture dimension; an image above
/// it is always resized, the threshold applies only to the tier cap.
pub fn plan_downsize(width: u32, height: u32, cap: u32, hard_limit: u32) -> Option<(u32, u32)> {
    let largest = width.max(height);
    if largest == 0 {
        return None;
    }
    let target = if largest > hard_limit {
        cap.min(hard_limit)
    } else {
        if largest <= cap {
            return None;
        }
        let scale = cap as f32 / largest as f32;
        if scale > DOWNSIZE_THRESHOLD {
            return None;
        }
        cap
    };
    let scale = target as f32 / largest as f32;
    let target_width = ((width as f32 * scale).round() as u32).max(1);
    let target_height = ((height as f32 * scale).round() as u32).max(1);
    Some((target_width, target_height))
}

/// Two-tone checkerboard in RGBA8. Deterministic so tests and screenshots
/// are stable.
pub fn checkerboard_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let cell = (x / PLACEHOLDER_CELL + y / PLACEHOLDER_CELL) % 2;
            let value = if cell == 0 { 0x66 } else { 0x44 };
            pixels.extend_from_slice(&[value, value, value, 0xff]);
        }
    }
    pixels
}

struct DecodedImage {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

struct LoadRequest {
    generation: u64,
    path: PathBuf,
    cap: u32,
    hard_limit: u32,
}

struct LoadResult {
    generation: u64,
    source: String,
    outcome: Result<DecodedImage, String>,
}

/// Retrying only makes sense for failures that can clear up on their own.
/// A missing or unreadable file and corrupt image data are permanent.
fn is_transient(error: &image::ImageError) -> bool {
    match error {
        image::ImageError::IoError(io) => !matches!(
            io.kind(),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
        ),
        _ => false,
    }
}

fn decode_with_retries(request: &LoadRequest) -> Result<DecodedImage, String> {
    let mut last_error = String::new();
    for attempt in 0..LOAD_ATTEMPTS {
        if attempt > 0 {
            thread::sleep(RETRY_BASE_DELAY * (1 << (attempt - 1)));
        }
        match image::open(&request.path) {
            Ok(decoded) => {
                let mut rgba = decoded.into_rgba8();
                if let Some((width, height)) =
                    plan_downsize(rgba.width(), rgba.height(), request.cap, request.hard_limit)
                {
                    tracing::debug!(
                        from_width = rgba.width(),
                        from_height = rgba.height(),
                        width,
                        height,
                        "downsizing image to texture budget"
                    );
                    rgba = image::imageops::resize(
                        &rgba,
                        width,
                        height,
                        image::imageops::FilterType::Triangle,
                    );
                }
                return Ok(DecodedImage {
                    width: rgba.width(),
                    height: rgba.height(),
                    pixels: rgba.into_raw(),
                });
            }
            Err(err) => {
                let transient = is_transient(&err);
                last_error = err.to_string();
                tracing::warn!(
                    path = %request.path.display(),
                    attempt = attempt + 1,
                    transient,
                    error = %last_error,
                    "image decode failed"
                );
                if !transient {
                    break;
                }
            }
        }
    }
    Err(last_error)
}

fn spawn_loader(requests: Receiver<LoadRequest>, results: Sender<LoadResult>) {
    thread::spawn(move || {
        while let Ok(request) = requests.recv() {
            let source = request.path.display().to_string();
            let outcome = decode_with_retries(&request);
            if results
                .send(LoadResult {
                    generation: request.generation,
                    source,
                    outcome,
                })
                .is_err()
            {
                break;
            }
        }
    });
}

/// The texture currently bound for sampling.
pub(crate) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    fn from_pixels(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// What the host sees when it asks about the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureStatus {
    pub source: Option<String>,
    /// True when the checkerboard placeholder is showing instead of the
    /// requested image.
    pub placeholder: bool,
    pub pending: bool,
}

pub(crate) struct TextureManager {
    request_tx: Sender<LoadRequest>,
    result_rx: Receiver<LoadResult>,
    generation: u64,
    current: Option<GpuTexture>,
    sampler: wgpu::Sampler,
    status: TextureStatus,
    /// Tier texture cap from the most recent load request; failed loads get
    /// a placeholder at this size.
    placeholder_extent: u32,
}

impl TextureManager {
    pub fn new(device: &wgpu::Device) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        spawn_loader(request_rx, result_tx);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            request_tx,
            result_rx,
            generation: 0,
            current: None,
            sampler,
            status: TextureStatus {
                source: None,
                placeholder: true,
                pending: false,
            },
            placeholder_extent: DEFAULT_PLACEHOLDER_EXTENT,
        }
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn status(&self) -> &TextureStatus {
        &self.status
    }

    pub fn current(&self) -> Option<&GpuTexture> {
        self.current.as_ref()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.current.as_ref().map(|t| (t.width, t.height))
    }

    /// Requests a new image. An empty source drops the image synchronously
    /// and shows the placeholder. Stale in-flight results are discarded by
    /// generation.
    pub fn request_load(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &str,
        cap: u32,
        hard_limit: u32,
    ) {
        self.generation += 1;
        self.placeholder_extent = cap.min(hard_limit).max(1);
        if source.is_empty() {
            self.install_placeholder(device, queue);
            self.status = TextureStatus {
                source: None,
                placeholder: true,
                pending: false,
            };
            return;
        }

        self.status = TextureStatus {
            source: Some(source.to_string()),
            placeholder: self.status.placeholder,
            pending: true,
        };
        // Loader thread gone means the process is shutting down.
        let _ = self.request_tx.send(LoadRequest {
            generation: self.generation,
            path: PathBuf::from(source),
            cap,
            hard_limit,
        });
    }

    /// Drains finished loads. Returns true when the bound texture changed
    /// and the caller must rebuild its bind group.
    pub fn poll(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let mut changed = false;
        loop {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    if result.generation != self.generation {
                        continue;
                    }
                    self.status.pending = false;
                    match result.outcome {
                        Ok(decoded) => {
                            self.replace(GpuTexture::from_pixels(
                                device,
                                queue,
                                "effect image",
                                &decoded.pixels,
                                decoded.width,
                                decoded.height,
                            ));
                            self.status.placeholder = false;
                            tracing::info!(
                                source = %result.source,
                                width = decoded.width,
                                height = decoded.height,
                                "image texture ready"
                            );
                        }
                        Err(error) => {
                            tracing::warn!(
                                source = %result.source,
                                %error,
                                "image failed to load; showing placeholder"
                            );
                            self.install_placeholder(device, queue);
                        }
                    }
                    changed = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }

    /// Guarantees a bindable texture exists, installing the placeholder on
    /// first use.
    pub fn ensure_texture(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        if self.current.is_some() {
            return false;
        }
        self.install_placeholder(device, queue);
        true
    }

    fn install_placeholder(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let extent = self.placeholder_extent;
        let pixels = checkerboard_pixels(extent, extent);
        self.replace(GpuTexture::from_pixels(
            device,
            queue,
            "placeholder texture",
            &pixels,
            extent,
            extent,
        ));
        self.status.placeholder = true;
    }

    fn replace(&mut self, next: GpuTexture) {
        if let Some(previous) = self.current.take() {
            previous.texture.destroy();
        }
        self.current = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_within_the_cap_are_not_resized() {
        assert_eq!(plan_downsize(1024, 768, 2048, 8192), None);
        assert_eq!(plan_downsize(2048, 2048, 2048, 8192), None);
    }

    #[test]
    fn marginal_downsizes_are_skipped() {
        // 2400 → 2048 keeps ~85% of the edge; not worth resampling.
        assert_eq!(plan_downsize(2400, 1200, 2048, 8192), None);
    }

    #[test]
    fn large_images_are_scaled_to_the_cap() {
        let (width, height) = plan_downsize(8192, 4096, 2048, 8192).expect("downsize planned");
        assert_eq!(width, 2048);
        assert_eq!(height, 1024);
    }

    #[test]
    fn device_limit_overrides_the_marginal_skip() {
        // Same marginal ratio as above, but 2400 px cannot be sampled on a
        // 2048-limit adapter, so the resize must happen anyway.
        let (width, height) = plan_downsize(2400, 1200, 2048, 2048).expect("downsize planned");
        assert_eq!(width, 2048);
        assert_eq!(height, 1024);
    }

    #[test]
    fn oversized_images_land_on_the_smaller_of_cap_and_limit() {
        let (width, height) = plan_downsize(5000, 5000, 1024, 4096).expect("downsize planned");
        assert_eq!(width, 1024);
        assert_eq!(height, 1024);
    }

    #[test]
    fn downsize_preserves_aspect_and_never_hits_zero() {
        let (width, height) = plan_downsize(10000, 3, 1024, 16384).expect("downsize planned");
        assert_eq!(width, 1024);
        assert_eq!(height, 1);
    }

    #[test]
    fn missing_files_and_corrupt_data_are_not_transient() {
        let missing = image::ImageError::IoError(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!is_transient(&missing));

        let corrupt = image::ImageError::Decoding(image::error::DecodingError::new(
            image::error::ImageFormatHint::Unknown,
            "truncated stream",
        ));
        assert!(!is_transient(&corrupt));

        let flaky = image::ImageError::IoError(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(is_transient(&flaky));
    }

    #[test]
    fn nonexistent_paths_fail_without_retry_sleeps() {
        let request = LoadRequest {
            generation: 1,
            path: PathBuf::from("/nonexistent/directory/image.png"),
            cap: 1024,
            hard_limit: 2048,
        };
        let started = std::time::Instant::now();
        assert!(decode_with_retries(&request).is_err());
        assert!(started.elapsed() < RETRY_BASE_DELAY);
    }

    #[test]
    fn checkerboard_is_deterministic_and_opaque() {
        let a = checkerboard_pixels(32, 32);
        let b = checkerboard_pixels(32, 32);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32 * 32 * 4);
        assert!(a.chunks_exact(4).all(|px| px[3] == 0xff));
        // Both tones appear.
        assert!(a.chunks_exact(4).any(|px| px[0] == 0x66));
        assert!(a.chunks_exact(4).any(|px| px[0] == 0x44));
    }
}
