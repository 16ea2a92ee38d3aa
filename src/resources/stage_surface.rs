//! Stage surfaces (spec §4.3): a managed 2D texture sized at creation for
//! CPU readback. Volumetric stage surfaces are declared but unsupported.

use crate::error::GsResult;
use crate::format::{color_bytes_per_texel, color_to_metal, ColorFormat};

pub struct StageSurface {
    pub texture: metal::Texture,
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    /// Always zero — volumetric stage surfaces are declared but unsupported
    /// (spec §4.3: "creation returns null, getters return zero").
    pub depth: u32,
}

impl StageSurface {
    pub fn new(device: &metal::Device, width: u32, height: u32, format: ColorFormat) -> Self {
        let desc = metal::TextureDescriptor::new();
        desc.set_pixel_format(color_to_metal(format));
        desc.set_width(width as u64);
        desc.set_height(height as u64);
        desc.set_storage_mode(metal::MTLStorageMode::Managed);
        desc.set_usage(metal::MTLTextureUsage::ShaderRead);
        let texture = device.new_texture(&desc);
        StageSurface {
            texture,
            width,
            height,
            format,
            depth: 0,
        }
    }

    /// Always returns `None` (spec §4.3: "creation returns null" for
    /// volumetric surfaces — this crate never constructs one with depth > 1,
    /// so any depth argument at the host boundary is rejected there).
    pub fn new_volumetric(_width: u32, _height: u32, _depth: u32, _format: ColorFormat) -> Option<Self> {
        None
    }

    /// spec §4.3 `map`: issues a synchronize-blit on the current command
    /// buffer, downloads, and returns pointer + row pitch. The blit must
    /// have been submitted and waited on by the caller before the returned
    /// bytes are valid for a `Managed`-storage texture on discrete GPUs;
    /// this crate targets Apple Silicon's unified memory, where the
    /// synchronize blit is a formality the driver coalesces away, but we
    /// still encode it so the contract holds in the general case.
    pub fn map(&self, command_buffer: &metal::CommandBufferRef) -> GsResult<Vec<u8>> {
        let blit = command_buffer.new_blit_command_encoder();
        blit.synchronize_resource(&self.texture);
        blit.end_encoding();

        let row_pitch = self.width as usize * color_bytes_per_texel(self.format);
        let mut scratch = vec![0u8; row_pitch * self.height as usize];
        let region = metal::MTLRegion {
            origin: metal::MTLOrigin { x: 0, y: 0, z: 0 },
            size: metal::MTLSize {
                width: self.width as u64,
                height: self.height as u64,
                depth: 1,
            },
        };
        self.texture
            .get_bytes(scratch.as_mut_ptr() as *mut _, row_pitch as u64, region, 0);
        Ok(scratch)
    }

    pub fn row_pitch(&self) -> usize {
        self.width as usize * color_bytes_per_texel(self.format)
    }
}
