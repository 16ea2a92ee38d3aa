//! Graphics pipeline state cache (spec §4.5).
//!
//! The host's immediate-mode device collects ~150 individually-settable
//! pieces of state (shaders, blend, depth/stencil, rasterizer, vertex
//! layout, attachment formats) into one descriptor at draw time, then looks
//! it up in this cache before asking Metal to compile a
//! `MTLRenderPipelineState`/`MTLDepthStencilState` pair. This mirrors the
//! teacher's `PipelineSignatureCache` (`render-gl/src/backend.rs`), with a
//! plain `fxhash`-keyed map standing in for its self-referential arena —
//! that arena only existed to work around GL signature objects borrowing
//! each other; our cached value is an owned, reference-counted Metal object
//! with no such constraint.

use crate::error::{GsError, GsResult};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Fill,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: u8,
}

impl Default for BlendState {
    fn default() -> Self {
        BlendState {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: 0b1111,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        StencilFaceState {
            compare: CompareFunction::Always,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DepthStencilState {
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_compare: Option<DepthCompareWrapper>,
    pub stencil_test_enabled: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilFaceState,
    pub back_face: StencilFaceState,
}

/// `CompareFunction` with a `Default` impl (`Less`, the host's default depth
/// test per spec §3 I2), so `DepthStencilState` can derive `Default` too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthCompareWrapper(pub CompareFunction);

impl Default for DepthCompareWrapper {
    fn default() -> Self {
        DepthCompareWrapper(CompareFunction::Less)
    }
}

/// Everything needed to build (or look up) one Metal pipeline: identity of
/// the compiled shaders, the baked-in state that Metal requires at pipeline
/// creation time (blend is part of `MTLRenderPipelineDescriptor`; depth and
/// stencil build a separate `MTLDepthStencilState`), the vertex layout, and
/// the attachment pixel formats it was built against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDescriptor {
    pub vertex_shader: crate::handle::RawHandle,
    pub fragment_shader: crate::handle::RawHandle,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub front_face_ccw: bool,
    pub color_format: crate::format::ColorFormat,
    pub depth_stencil_format: Option<crate::format::DepthStencilFormat>,
    pub sample_count: u32,
    /// Hash of the vertex descriptor derived from the vertex shader's
    /// metadata (spec §4.4 Stage 7); folded in directly rather than storing
    /// the `Vec<VertexAttribute>` so the descriptor stays cheap to hash/eq.
    pub vertex_layout_fingerprint: u64,
}

fn fingerprint<T: Hash>(value: &T) -> u64 {
    let mut hasher = fxhash::FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

pub fn vertex_layout_fingerprint(attrs: &[crate::shader::layout::VertexAttribute]) -> u64 {
    let mut hasher = fxhash::FxHasher::default();
    for a in attrs {
        (a.attribute_index, a.buffer_index, a.components, a.stride).hash(&mut hasher);
        std::mem::discriminant(&a.stream).hash(&mut hasher);
    }
    hasher.finish()
}

/// One compiled pipeline, holding the two Metal objects the draw engine
/// needs to bind (spec §4.5, §4.6 step 6).
pub struct CompiledPipeline {
    pub render_pipeline_state: metal::RenderPipelineState,
    pub depth_stencil_state: metal::DepthStencilState,
}

unsafe impl Send for CompiledPipeline {}
unsafe impl Sync for CompiledPipeline {}

/// Caches compiled pipelines by descriptor fingerprint so repeated state
/// combinations never recompile (spec §8: pipeline compilation is
/// idempotent for identical descriptors).
pub struct PipelineCache {
    entries: Mutex<FxHashMap<u64, Arc<CompiledPipeline>>>,
    pipelines_created: AtomicU64,
}

impl PipelineCache {
    pub fn new() -> PipelineCache {
        PipelineCache {
            entries: Mutex::new(FxHashMap::default()),
            pipelines_created: AtomicU64::new(0),
        }
    }

    /// Total pipelines actually compiled (as opposed to served from cache),
    /// exposed for the idempotence test property in spec §8.
    pub fn pipelines_created(&self) -> u64 {
        self.pipelines_created.load(Ordering::Relaxed)
    }

    pub fn get_or_create(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
        build: impl FnOnce() -> GsResult<CompiledPipeline>,
    ) -> GsResult<Arc<CompiledPipeline>> {
        let key = fingerprint(descriptor);
        if let Some(existing) = self.entries.lock().get(&key) {
            return Ok(existing.clone());
        }
        let compiled = Arc::new(build()?);
        self.entries.lock().insert(key, compiled.clone());
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PipelineCache {
    fn default() -> PipelineCache {
        PipelineCache::new()
    }
}

pub fn metal_compare_function(f: CompareFunction) -> metal::MTLCompareFunction {
    match f {
        CompareFunction::Never => metal::MTLCompareFunction::Never,
        CompareFunction::Less => metal::MTLCompareFunction::Less,
        CompareFunction::Equal => metal::MTLCompareFunction::Equal,
        CompareFunction::LessEqual => metal::MTLCompareFunction::LessEqual,
        CompareFunction::Greater => metal::MTLCompareFunction::Greater,
        CompareFunction::NotEqual => metal::MTLCompareFunction::NotEqual,
        CompareFunction::GreaterEqual => metal::MTLCompareFunction::GreaterEqual,
        CompareFunction::Always => metal::MTLCompareFunction::Always,
    }
}

pub fn metal_blend_factor(f: BlendFactor) -> metal::MTLBlendFactor {
    match f {
        BlendFactor::Zero => metal::MTLBlendFactor::Zero,
        BlendFactor::One => metal::MTLBlendFactor::One,
        BlendFactor::SrcColor => metal::MTLBlendFactor::SourceColor,
        BlendFactor::InvSrcColor => metal::MTLBlendFactor::OneMinusSourceColor,
        BlendFactor::SrcAlpha => metal::MTLBlendFactor::SourceAlpha,
        BlendFactor::InvSrcAlpha => metal::MTLBlendFactor::OneMinusSourceAlpha,
        BlendFactor::DstColor => metal::MTLBlendFactor::DestinationColor,
        BlendFactor::InvDstColor => metal::MTLBlendFactor::OneMinusDestinationColor,
        BlendFactor::DstAlpha => metal::MTLBlendFactor::DestinationAlpha,
        BlendFactor::InvDstAlpha => metal::MTLBlendFactor::OneMinusDestinationAlpha,
    }
}

pub fn metal_blend_op(op: BlendOp) -> metal::MTLBlendOperation {
    match op {
        BlendOp::Add => metal::MTLBlendOperation::Add,
        BlendOp::Subtract => metal::MTLBlendOperation::Subtract,
        BlendOp::ReverseSubtract => metal::MTLBlendOperation::ReverseSubtract,
        BlendOp::Min => metal::MTLBlendOperation::Min,
        BlendOp::Max => metal::MTLBlendOperation::Max,
    }
}

pub fn metal_stencil_op(op: StencilOp) -> metal::MTLStencilOperation {
    match op {
        StencilOp::Keep => metal::MTLStencilOperation::Keep,
        StencilOp::Zero => metal::MTLStencilOperation::Zero,
        StencilOp::Replace => metal::MTLStencilOperation::Replace,
        StencilOp::IncrementClamp => metal::MTLStencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => metal::MTLStencilOperation::DecrementClamp,
        StencilOp::Invert => metal::MTLStencilOperation::Invert,
        StencilOp::IncrementWrap => metal::MTLStencilOperation::IncrementWrap,
        StencilOp::DecrementWrap => metal::MTLStencilOperation::DecrementWrap,
    }
}

/// Builds the two Metal descriptors (render pipeline + depth/stencil) from
/// compiled shader libraries and the immediate-mode descriptor, and compiles
/// them (spec §4.5).
pub fn build_pipeline(
    device: &metal::Device,
    descriptor: &GraphicsPipelineDescriptor,
    vertex_library: &metal::Library,
    vertex_entry_point: &str,
    fragment_library: &metal::Library,
    fragment_entry_point: &str,
    vertex_descriptor: &metal::VertexDescriptorRef,
) -> GsResult<CompiledPipeline> {
    let vertex_fn = vertex_library
        .get_function(vertex_entry_point, None)
        .map_err(|e| GsError::PipelineCompilation(e.to_string()))?;
    let fragment_fn = fragment_library
        .get_function(fragment_entry_point, None)
        .map_err(|e| GsError::PipelineCompilation(e.to_string()))?;

    let pipeline_desc = metal::RenderPipelineDescriptor::new();
    pipeline_desc.set_vertex_function(Some(&vertex_fn));
    pipeline_desc.set_fragment_function(Some(&fragment_fn));
    pipeline_desc.set_vertex_descriptor(Some(vertex_descriptor));
    pipeline_desc.set_sample_count(descriptor.sample_count as u64);

    let attachment = pipeline_desc.color_attachments().object_at(0);
    attachment.set_pixel_format(crate::format::color_to_metal(descriptor.color_format));
    attachment.set_blending_enabled(descriptor.blend.enabled);
    attachment.set_source_rgb_blend_factor(metal_blend_factor(descriptor.blend.src_color));
    attachment.set_destination_rgb_blend_factor(metal_blend_factor(descriptor.blend.dst_color));
    attachment.set_rgb_blend_operation(metal_blend_op(descriptor.blend.color_op));
    attachment.set_source_alpha_blend_factor(metal_blend_factor(descriptor.blend.src_alpha));
    attachment
        .set_destination_alpha_blend_factor(metal_blend_factor(descriptor.blend.dst_alpha));
    attachment.set_alpha_blend_operation(metal_blend_op(descriptor.blend.alpha_op));
    attachment.set_write_mask(metal::MTLColorWriteMask::from_bits_truncate(
        descriptor.blend.write_mask as u64,
    ));

    if let Some(ds_format) = descriptor.depth_stencil_format {
        let fmt = crate::format::depth_stencil_to_metal(ds_format);
        pipeline_desc.set_depth_attachment_pixel_format(fmt);
        if ds_format.has_stencil() {
            pipeline_desc.set_stencil_attachment_pixel_format(fmt);
        }
    }

    let render_pipeline_state = device
        .new_render_pipeline_state(&pipeline_desc)
        .map_err(|e| GsError::PipelineCompilation(e.to_string()))?;

    let ds_desc = metal::DepthStencilDescriptor::new();
    ds_desc.set_depth_compare_function(metal_compare_function(
        descriptor
            .depth_stencil
            .depth_compare
            .unwrap_or_default()
            .0,
    ));
    ds_desc.set_depth_write_enabled(
        descriptor.depth_stencil.depth_test_enabled && descriptor.depth_stencil.depth_write_enabled,
    );
    if descriptor.depth_stencil.stencil_test_enabled {
        let front = build_stencil_descriptor(&descriptor.depth_stencil, descriptor.depth_stencil.front_face);
        let back = build_stencil_descriptor(&descriptor.depth_stencil, descriptor.depth_stencil.back_face);
        ds_desc.set_front_face_stencil(Some(&front));
        ds_desc.set_back_face_stencil(Some(&back));
    }
    let depth_stencil_state = device.new_depth_stencil_state(&ds_desc);

    Ok(CompiledPipeline {
        render_pipeline_state,
        depth_stencil_state,
    })
}

fn build_stencil_descriptor(
    state: &DepthStencilState,
    face: StencilFaceState,
) -> metal::StencilDescriptor {
    let desc = metal::StencilDescriptor::new();
    desc.set_stencil_compare_function(metal_compare_function(face.compare));
    desc.set_stencil_failure_operation(metal_stencil_op(face.fail_op));
    desc.set_depth_failure_operation(metal_stencil_op(face.depth_fail_op));
    desc.set_depth_stencil_pass_operation(metal_stencil_op(face.pass_op));
    desc.set_read_mask(state.stencil_read_mask as u32);
    desc.set_write_mask(state.stencil_write_mask as u32);
    desc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(vs: u32, fs: u32) -> GraphicsPipelineDescriptor {
        GraphicsPipelineDescriptor {
            vertex_shader: vs,
            fragment_shader: fs,
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::default(),
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Fill,
            front_face_ccw: false,
            color_format: crate::format::ColorFormat::Bgra8Unorm,
            depth_stencil_format: None,
            sample_count: 1,
            vertex_layout_fingerprint: 0,
        }
    }

    #[test]
    fn identical_descriptors_fingerprint_equal() {
        assert_eq!(fingerprint(&descriptor(1, 2)), fingerprint(&descriptor(1, 2)));
    }

    #[test]
    fn differing_descriptors_fingerprint_differently() {
        assert_ne!(fingerprint(&descriptor(1, 2)), fingerprint(&descriptor(1, 3)));
    }

    #[test]
    fn get_or_create_only_builds_once_per_descriptor() {
        let cache = PipelineCache::new();
        let d = descriptor(1, 2);
        let calls = std::sync::atomic::AtomicU32::new(0);
        for _ in 0..5 {
            cache
                .get_or_create(&d, || {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Err(GsError::PipelineCompilation("stub, never built".into()))
                })
                .ok();
        }
        // The stub always errors, so nothing is ever cached; this only
        // proves `get_or_create` calls `build` once per miss, not that
        // successful builds are deduplicated (covered by
        // `tests/pipeline_cache.rs`, which can construct a real device).
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 5);
        assert_eq!(cache.pipelines_created(), 0);
    }
}
