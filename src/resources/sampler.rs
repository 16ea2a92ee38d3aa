//! Sampler state objects (spec §4.3), built from the shader transpiler's
//! [`crate::shader::ir::SamplerInfo`] (spec §4.4 Stage 7).

use crate::error::GsResult;
use crate::shader::ir::{AddressMode, FilterMode, SamplerInfo};

pub struct SamplerState {
    pub handle: metal::SamplerState,
}

fn metal_address_mode(mode: AddressMode) -> metal::MTLSamplerAddressMode {
    match mode {
        AddressMode::Wrap => metal::MTLSamplerAddressMode::Repeat,
        AddressMode::Clamp => metal::MTLSamplerAddressMode::ClampToEdge,
        AddressMode::Mirror => metal::MTLSamplerAddressMode::MirrorRepeat,
        AddressMode::Border => metal::MTLSamplerAddressMode::ClampToBorderColor,
    }
}

fn metal_min_mag_filter(filter: FilterMode) -> metal::MTLSamplerMinMagFilter {
    match filter {
        FilterMode::Point => metal::MTLSamplerMinMagFilter::Nearest,
        FilterMode::Linear | FilterMode::Anisotropic => metal::MTLSamplerMinMagFilter::Linear,
    }
}

fn metal_mip_filter(filter: FilterMode) -> metal::MTLSamplerMipFilter {
    match filter {
        FilterMode::Point => metal::MTLSamplerMipFilter::Nearest,
        FilterMode::Linear | FilterMode::Anisotropic => metal::MTLSamplerMipFilter::Linear,
    }
}

/// Packed 32-bit RGBA border color (spec §4.4 `SamplerInfo::border_color`)
/// snapped to the four border colors Metal actually supports.
fn metal_border_color(packed: u32) -> metal::MTLSamplerBorderColor {
    match packed {
        0x0000_0000 => metal::MTLSamplerBorderColor::TransparentBlack,
        0xFF00_00FF | 0x000000FF => metal::MTLSamplerBorderColor::OpaqueBlack,
        _ => metal::MTLSamplerBorderColor::OpaqueWhite,
    }
}

impl SamplerState {
    pub fn new(device: &metal::Device, info: &SamplerInfo) -> GsResult<Self> {
        let desc = metal::SamplerDescriptor::new();
        desc.set_address_mode_s(metal_address_mode(info.address_u));
        desc.set_address_mode_t(metal_address_mode(info.address_v));
        desc.set_address_mode_r(metal_address_mode(info.address_w));
        desc.set_min_filter(metal_min_mag_filter(info.filter));
        desc.set_mag_filter(metal_min_mag_filter(info.filter));
        desc.set_mip_filter(metal_mip_filter(info.filter));
        desc.set_border_color(metal_border_color(info.border_color));
        if matches!(info.filter, FilterMode::Anisotropic) {
            desc.set_max_anisotropy(info.max_anisotropy.max(1) as u64);
        }
        let handle = device.new_sampler(&desc);
        Ok(SamplerState { handle })
    }
}
