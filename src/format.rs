//! Pixel format tables (spec §6): the host's small, legacy enum of color and
//! depth/stencil formats, mapped onto `metal::MTLPixelFormat`.

/// Color formats the host surface can create resources in. Covers both the
/// formats the resource layer actively uploads (`Rgba8Unorm` and friends)
/// and the rest of the normative host→Metal table (spec §6) that a host
/// shader or swap chain may still request even though this backend never
/// builds upload data for them (`A8Unorm`, the block-compressed formats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R10g10b10a2Unorm,
    A8Unorm,
    Rgba16Unorm,
    R16Unorm,
    Rg8Unorm,
    Dxt1,
    Dxt3,
    Dxt5,
}

/// Depth/stencil formats, tracking whether the format carries a stencil
/// plane (spec §4.5: stencil attachment is only bound when present).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilFormat {
    Depth16Unorm,
    Depth24UnormStencil8,
    Depth32Float,
    Depth32FloatStencil8,
    Stencil8,
}

impl DepthStencilFormat {
    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            DepthStencilFormat::Depth32FloatStencil8
                | DepthStencilFormat::Depth24UnormStencil8
                | DepthStencilFormat::Stencil8
        )
    }

    pub fn has_depth(self) -> bool {
        !matches!(self, DepthStencilFormat::Stencil8)
    }
}

pub fn color_to_metal(format: ColorFormat) -> metal::MTLPixelFormat {
    use metal::MTLPixelFormat::*;
    match format {
        ColorFormat::Rgba8Unorm => RGBA8Unorm,
        ColorFormat::Rgba8UnormSrgb => RGBA8Unorm_sRGB,
        ColorFormat::Bgra8Unorm => BGRA8Unorm,
        ColorFormat::Bgra8UnormSrgb => BGRA8Unorm_sRGB,
        ColorFormat::R8Unorm => R8Unorm,
        ColorFormat::R16Float => R16Float,
        ColorFormat::Rg16Float => RG16Float,
        ColorFormat::Rgba16Float => RGBA16Float,
        ColorFormat::R32Float => R32Float,
        ColorFormat::Rg32Float => RG32Float,
        ColorFormat::Rgba32Float => RGBA32Float,
        ColorFormat::R10g10b10a2Unorm => RGB10A2Unorm,
        ColorFormat::A8Unorm => A8Unorm,
        ColorFormat::Rgba16Unorm => RGBA16Unorm,
        ColorFormat::R16Unorm => R16Unorm,
        ColorFormat::Rg8Unorm => RG8Unorm,
        ColorFormat::Dxt1 => BC1_RGBA,
        ColorFormat::Dxt3 => BC2_RGBA,
        ColorFormat::Dxt5 => BC3_RGBA,
    }
}

pub fn depth_stencil_to_metal(format: DepthStencilFormat) -> metal::MTLPixelFormat {
    use metal::MTLPixelFormat::*;
    match format {
        DepthStencilFormat::Depth16Unorm => Depth16Unorm,
        DepthStencilFormat::Depth24UnormStencil8 => Depth24Unorm_Stencil8,
        DepthStencilFormat::Depth32Float => Depth32Float,
        DepthStencilFormat::Depth32FloatStencil8 => Depth32Float_Stencil8,
        DepthStencilFormat::Stencil8 => Stencil8,
    }
}

/// Bytes per texel for the color formats the resource layer needs to size
/// upload buffers (spec §4.3). Block-compressed formats (DXT1/3/5) have no
/// per-texel size — this backend never builds CPU-side upload data for them,
/// so callers must not reach these arms; see DESIGN.md.
pub fn color_bytes_per_texel(format: ColorFormat) -> usize {
    match format {
        ColorFormat::R8Unorm | ColorFormat::A8Unorm => 1,
        ColorFormat::R16Float | ColorFormat::R16Unorm | ColorFormat::Rg8Unorm => 2,
        ColorFormat::Rgba8Unorm
        | ColorFormat::Rgba8UnormSrgb
        | ColorFormat::Bgra8Unorm
        | ColorFormat::Bgra8UnormSrgb
        | ColorFormat::Rg16Float
        | ColorFormat::R32Float
        | ColorFormat::R10g10b10a2Unorm => 4,
        ColorFormat::Rgba16Float | ColorFormat::Rg32Float | ColorFormat::Rgba16Unorm => 8,
        ColorFormat::Rgba32Float => 16,
        ColorFormat::Dxt1 | ColorFormat::Dxt3 | ColorFormat::Dxt5 => {
            unreachable!("block-compressed formats are never CPU-upload sized")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_stencil_combined_format_reports_both_planes() {
        assert!(DepthStencilFormat::Depth32FloatStencil8.has_stencil());
        assert!(DepthStencilFormat::Depth32FloatStencil8.has_depth());
    }

    #[test]
    fn stencil_only_format_has_no_depth_plane() {
        assert!(!DepthStencilFormat::Stencil8.has_depth());
    }

    #[test]
    fn bytes_per_texel_matches_known_formats() {
        assert_eq!(color_bytes_per_texel(ColorFormat::R8Unorm), 1);
        assert_eq!(color_bytes_per_texel(ColorFormat::Rgba8Unorm), 4);
        assert_eq!(color_bytes_per_texel(ColorFormat::Rgba32Float), 16);
    }
}
