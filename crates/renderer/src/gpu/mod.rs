mod context;
mod pipeline;
mod state;
pub mod texture;
pub mod uniforms;

pub use context::ContextError;
pub use pipeline::PipelineVariant;
pub use texture::TextureStatus;

pub(crate) use state::GpuState;
