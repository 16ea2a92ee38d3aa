//! Resource objects (spec §4.3): vertex/index buffers, textures, stage
//! surfaces, samplers, and swap-chain layers, each behind its own
//! [`crate::handle::HandleTable`] so handles are strongly typed per kind
//! (spec §9 design note — one table per resource kind, not a single
//! tagged-union table).

pub mod depth_stencil;
pub mod index_buffer;
pub mod sampler;
pub mod stage_surface;
pub mod swapchain;
pub mod texture;
pub mod vertex_buffer;

pub use depth_stencil::DepthStencilTexture;
pub use index_buffer::{IndexBuffer, IndexFormat};
pub use sampler::SamplerState;
pub use stage_surface::StageSurface;
pub use swapchain::SwapChain;
pub use texture::{Texture, TextureKind};
pub use vertex_buffer::VertexBuffer;

use crate::handle::HandleTable;

/// Backing storage shared by every resource kind that can be either
/// uploaded once (`Static`) or refreshed every frame out of the transient
/// pool (`Dynamic`) — spec §4.2/§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageHint {
    Static,
    Dynamic,
}

/// The handle tables instantiated by the device (spec §4.1, §4.3).
/// Shader and pipeline handles live in [`crate::device`] and
/// [`crate::pipeline`] respectively, since they are built from these
/// resources rather than being one themselves.
#[derive(Default)]
pub struct ResourceTables {
    pub vertex_buffers: HandleTable<VertexBuffer>,
    pub index_buffers: HandleTable<IndexBuffer>,
    pub textures: HandleTable<Texture>,
    pub depth_stencil_textures: HandleTable<DepthStencilTexture>,
    pub stage_surfaces: HandleTable<StageSurface>,
    pub samplers: HandleTable<SamplerState>,
    pub swapchains: HandleTable<SwapChain>,
}

impl ResourceTables {
    pub fn new() -> Self {
        Self::default()
    }
}
