//! Textures (spec §4.3): 2D and cube, mip-by-mip upload, `BUILD_MIPMAPS`,
//! `map`/`unmap`, `copy`/`copy_region`, `open_from_iosurface`.

use crate::error::{GsError, GsResult};
use crate::format::{color_bytes_per_texel, color_to_metal, ColorFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Texture2D,
    Cube,
}

bitflags::bitflags! {
    /// Creation flags (spec §4.3: `BUILD_MIPMAPS` requests a blit-encoder
    /// mip generation pass on the current command buffer).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: u32 {
        const BUILD_MIPMAPS = 1 << 0;
    }
}

/// A single mip level of CPU-side source data, handed in at creation time
/// (spec §4.3: "uploaded mip-by-mip with width/height halving per level").
pub struct MipLevel<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

pub struct Texture {
    pub handle: metal::Texture,
    pub kind: TextureKind,
    pub format: ColorFormat,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
}

impl Texture {
    pub fn new(
        device: &metal::Device,
        kind: TextureKind,
        format: ColorFormat,
        width: u32,
        height: u32,
        mip_count: u32,
        initial_data: &[MipLevel<'_>],
        flags: TextureFlags,
        command_buffer: Option<&metal::CommandBufferRef>,
    ) -> GsResult<Self> {
        if width == 0 || height == 0 {
            return Err(GsError::ContractViolation(
                "texture width/height must be non-zero".to_string(),
            ));
        }

        let desc = metal::TextureDescriptor::new();
        desc.set_pixel_format(color_to_metal(format));
        desc.set_width(width as u64);
        desc.set_height(height as u64);
        desc.set_mipmap_level_count(mip_count.max(1) as u64);
        desc.set_texture_type(match kind {
            TextureKind::Texture2D => metal::MTLTextureType::D2,
            TextureKind::Cube => metal::MTLTextureType::Cube,
        });
        desc.set_usage(metal::MTLTextureUsage::ShaderRead | metal::MTLTextureUsage::ShaderWrite);
        desc.set_storage_mode(metal::MTLStorageMode::Managed);

        let handle = device.new_texture(&desc);

        for (level_index, level) in initial_data.iter().enumerate() {
            let bytes_per_row = level.width as usize * color_bytes_per_texel(format);
            if level.data.len() < bytes_per_row * level.height as usize {
                return Err(GsError::ContractViolation(
                    "mip level data smaller than width*height*bpp".to_string(),
                ));
            }
            let region = metal::MTLRegion {
                origin: metal::MTLOrigin { x: 0, y: 0, z: 0 },
                size: metal::MTLSize {
                    width: level.width as u64,
                    height: level.height as u64,
                    depth: 1,
                },
            };
            handle.replace_region(
                region,
                level_index as u64,
                level.data.as_ptr() as *const _,
                bytes_per_row as u64,
            );
        }

        if flags.contains(TextureFlags::BUILD_MIPMAPS) {
            if let Some(cmd_buf) = command_buffer {
                let blit = cmd_buf.new_blit_command_encoder();
                blit.generate_mipmaps(&handle);
                blit.end_encoding();
            }
        }

        Ok(Texture {
            handle,
            kind,
            format,
            width,
            height,
            mip_count: mip_count.max(1),
        })
    }

    /// spec §4.3 `open_from_iosurface`: wraps an externally-owned surface;
    /// pixel format is derived from the surface FourCC. `io_surface` is the
    /// caller-owned `IOSurfaceRef`, passed through as an opaque pointer since
    /// the IOSurface framework itself is outside this crate's dependency
    /// stack (grounded on the rest of this module reaching for raw `objc`
    /// message sends wherever the `metal` crate has no typed wrapper).
    pub fn open_from_iosurface(
        device: &metal::Device,
        io_surface: *mut std::ffi::c_void,
        width: u32,
        height: u32,
        fourcc: u32,
    ) -> GsResult<Self> {
        let format = fourcc_to_color_format(fourcc)?;
        let desc = metal::TextureDescriptor::new();
        desc.set_pixel_format(color_to_metal(format));
        desc.set_width(width as u64);
        desc.set_height(height as u64);
        desc.set_texture_type(metal::MTLTextureType::D2);
        desc.set_storage_mode(metal::MTLStorageMode::Managed);

        let handle: metal::Texture = unsafe {
            use foreign_types::ForeignType;
            use objc::{msg_send, sel, sel_impl};
            let device_ptr = device.as_ptr() as *mut objc::runtime::Object;
            let raw: *mut objc::runtime::Object = msg_send![
                device_ptr,
                newTextureWithDescriptor: desc.as_ref()
                iosurface: io_surface
                plane: 0usize
            ];
            metal::Texture::from_ptr(raw as *mut _)
        };

        Ok(Texture {
            handle,
            kind: TextureKind::Texture2D,
            format,
            width,
            height,
            mip_count: 1,
        })
    }

    /// spec §4.3 `map`/`unmap`: downloads and later re-uploads the level-0
    /// image through a CPU-side scratch array.
    pub fn map(&self) -> Vec<u8> {
        let bytes_per_row = self.width as usize * color_bytes_per_texel(self.format);
        let mut scratch = vec![0u8; bytes_per_row * self.height as usize];
        let region = metal::MTLRegion {
            origin: metal::MTLOrigin { x: 0, y: 0, z: 0 },
            size: metal::MTLSize {
                width: self.width as u64,
                height: self.height as u64,
                depth: 1,
            },
        };
        self.handle.get_bytes(
            scratch.as_mut_ptr() as *mut _,
            bytes_per_row as u64,
            region,
            0,
        );
        scratch
    }

    pub fn unmap(&self, scratch: &[u8]) -> GsResult<()> {
        let bytes_per_row = self.width as usize * color_bytes_per_texel(self.format);
        if scratch.len() < bytes_per_row * self.height as usize {
            return Err(GsError::ContractViolation(
                "unmap scratch buffer smaller than level-0 image".to_string(),
            ));
        }
        let region = metal::MTLRegion {
            origin: metal::MTLOrigin { x: 0, y: 0, z: 0 },
            size: metal::MTLSize {
                width: self.width as u64,
                height: self.height as u64,
                depth: 1,
            },
        };
        self.handle
            .replace_region(region, 0, scratch.as_ptr() as *const _, bytes_per_row as u64);
        Ok(())
    }

    /// spec §4.3 `copy`/`copy_region`: region bounds default to the full
    /// source; the destination must be large enough to hold the region —
    /// violation is fatal.
    pub fn copy_region(
        &self,
        dest: &Texture,
        src_origin: (u32, u32),
        size: (u32, u32),
        dest_origin: (u32, u32),
        command_buffer: &metal::CommandBufferRef,
    ) -> GsResult<()> {
        if dest_origin.0 + size.0 > dest.width || dest_origin.1 + size.1 > dest.height {
            return Err(GsError::ContractViolation(
                "copy_region destination too small for region".to_string(),
            ));
        }
        let blit = command_buffer.new_blit_command_encoder();
        blit.copy_from_texture(
            &self.handle,
            0,
            0,
            metal::MTLOrigin {
                x: src_origin.0 as u64,
                y: src_origin.1 as u64,
                z: 0,
            },
            metal::MTLSize {
                width: size.0 as u64,
                height: size.1 as u64,
                depth: 1,
            },
            &dest.handle,
            0,
            0,
            metal::MTLOrigin {
                x: dest_origin.0 as u64,
                y: dest_origin.1 as u64,
                z: 0,
            },
        );
        blit.end_encoding();
        Ok(())
    }

    pub fn copy(&self, dest: &Texture, command_buffer: &metal::CommandBufferRef) -> GsResult<()> {
        self.copy_region(dest, (0, 0), (self.width, self.height), (0, 0), command_buffer)
    }
}

/// spec §4.3: "BGRA -> 8-bit BGRA unorm; `l10r` -> 10-bit BGR + 2-bit A unorm".
fn fourcc_to_color_format(fourcc: u32) -> GsResult<ColorFormat> {
    match &fourcc.to_be_bytes() {
        b"BGRA" => Ok(ColorFormat::Bgra8Unorm),
        b"l10r" => Ok(ColorFormat::R10g10b10a2Unorm),
        _ => Err(GsError::ContractViolation(format!(
            "unsupported IOSurface FourCC: {fourcc:#010x}"
        ))),
    }
}
