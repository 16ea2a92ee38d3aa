//! Depth-stencil textures (spec §4.3): a managed 2D texture created in a
//! depth/stencil pixel format and bound as the depth-stencil attachment of a
//! render pass, never sampled from a shader.

use crate::format::{depth_stencil_to_metal, DepthStencilFormat};

pub struct DepthStencilTexture {
    pub handle: metal::Texture,
    pub format: DepthStencilFormat,
    pub width: u32,
    pub height: u32,
}

impl DepthStencilTexture {
    pub fn new(device: &metal::Device, format: DepthStencilFormat, width: u32, height: u32) -> Self {
        let desc = metal::TextureDescriptor::new();
        desc.set_pixel_format(depth_stencil_to_metal(format));
        desc.set_width(width as u64);
        desc.set_height(height as u64);
        desc.set_texture_type(metal::MTLTextureType::D2);
        desc.set_storage_mode(metal::MTLStorageMode::Private);
        desc.set_usage(metal::MTLTextureUsage::RenderTarget);
        let handle = device.new_texture(&desc);
        DepthStencilTexture {
            handle,
            format,
            width,
            height,
        }
    }
}
