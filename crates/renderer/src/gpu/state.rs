use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::capability::DeviceCapabilities;

use super::context::{ContextError, GpuContext};
use super::pipeline::{EffectPipeline, PipelineLayouts, PipelineVariant};
use super::texture::{TextureManager, TextureStatus};
use super::uniforms::EffectUniforms;

/// Owns the device, the render pipeline, and the per-frame resources.
/// Destroyed wholesale on context loss and rebuilt by the engine.
pub(crate) struct GpuState {
    context: GpuContext,
    pipeline: EffectPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    textures: TextureManager,
    texture_bind_group: wgpu::BindGroup,
    layouts: PipelineLayouts,
}

impl GpuState {
    pub(crate) fn new<T>(target: &T, size: PhysicalSize<u32>) -> Result<Self, ContextError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size)?;
        let layouts =
            PipelineLayouts::new(&context.device).map_err(ContextError::Init)?;
        let pipeline = EffectPipeline::new(&context.device, &layouts, context.surface_format)
            .map_err(ContextError::Init)?;

        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform buffer"),
            size: std::mem::size_of::<EffectUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        let mut textures = TextureManager::new(&context.device);
        textures.ensure_texture(&context.device, &context.queue);
        let texture_bind_group = build_texture_bind_group(&context, &layouts, &textures);

        Ok(Self {
            context,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            textures,
            texture_bind_group,
            layouts,
        })
    }

    pub(crate) fn capabilities(&self) -> &DeviceCapabilities {
        &self.context.capabilities
    }

    pub(crate) fn variant(&self) -> PipelineVariant {
        self.pipeline.variant
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn texture_status(&self) -> &TextureStatus {
        self.textures.status()
    }

    pub(crate) fn texture_dimensions(&self) -> Option<(u32, u32)> {
        self.textures.dimensions()
    }

    pub(crate) fn resize(&mut self, size: PhysicalSize<u32>) {
        self.context.resize(size);
    }

    pub(crate) fn reconfigure(&self) {
        self.context.reconfigure();
    }

    pub(crate) fn request_image(&mut self, source: &str, cap: u32) {
        let hard_limit = self.context.capabilities.max_texture_dimension;
        self.textures.request_load(
            &self.context.device,
            &self.context.queue,
            source,
            cap,
            hard_limit,
        );
    }

    /// Applies finished image loads; rebuilds the texture bind group when
    /// the bound texture changed.
    pub(crate) fn poll_textures(&mut self) {
        if self.textures.poll(&self.context.device, &self.context.queue) {
            self.texture_bind_group =
                build_texture_bind_group(&self.context, &self.layouts, &self.textures);
        }
    }

    pub(crate) fn render(&mut self, uniforms: &EffectUniforms) -> Result<(), wgpu::SurfaceError> {
        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, &self.texture_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn build_texture_bind_group(
    context: &GpuContext,
    layouts: &PipelineLayouts,
    textures: &TextureManager,
) -> wgpu::BindGroup {
    let current = textures
        .current()
        .expect("texture manager always holds a texture after ensure_texture");
    context.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("image bind group"),
        layout: &layouts.texture_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&current.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(textures.sampler()),
            },
        ],
    })
}
