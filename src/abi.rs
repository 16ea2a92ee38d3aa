//! `extern "C"` capability surface (spec §6).
//!
//! Every entry point takes an opaque device handle (`*mut Device`) or an
//! opaque resource handle ([`GsHandle`], which itself carries a device
//! pointer, a resource-kind tag, and a small-integer handle, per spec §6
//! "opaque pointer encoding"). There is no cross-boundary error channel
//! (spec §7): fallible calls log and return a sentinel, fatal calls log and
//! abort, and — the one addition with no teacher precedent, since
//! `render-gl`/`backend_gl` never cross an FFI boundary at all — every body
//! runs under [`ffi_guard`] so an internal panic can never unwind across
//! the `extern "C"` boundary (undefined behavior in that direction).

use crate::device::draw::Primitive;
use crate::device::{Device, ScissorRect, Viewport};
use crate::error::GsError;
use crate::format::ColorFormat;
use crate::handle::RawHandle;
use crate::pipeline::{BlendFactor, BlendOp, CompareFunction, CullMode, FillMode, StencilOp};
use crate::resources::texture::{MipLevel, TextureFlags, TextureKind};
use crate::resources::{
    DepthStencilTexture, IndexBuffer, IndexFormat, SamplerState, StageSurface, SwapChain, Texture,
    VertexBuffer,
};
use crate::shader::ir::ShaderProgram;
use std::os::raw::{c_char, c_void};
use std::panic::AssertUnwindSafe;

/// Resource kind tag carried by [`GsHandle`] (spec §6 "(device reference,
/// kind, small-integer handle)").
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VertexBuffer = 0,
    IndexBuffer = 1,
    Texture = 2,
    DepthStencilTexture = 3,
    StageSurface = 4,
    Sampler = 5,
    Swapchain = 6,
    VertexShader = 7,
    FragmentShader = 8,
}

/// An opaque resource handle: which device owns it, what kind of resource it
/// names, and the small integer handle within that device's table for that
/// kind. The host never dereferences the pointer or interprets the fields;
/// it only round-trips the whole struct back into later calls (spec §6).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GsHandle {
    pub device: *mut Device,
    pub kind: u8,
    pub raw: RawHandle,
}

impl GsHandle {
    const NULL: GsHandle = GsHandle {
        device: std::ptr::null_mut(),
        kind: 0,
        raw: 0,
    };

    fn new(device: *mut Device, kind: ResourceKind, raw: RawHandle) -> GsHandle {
        GsHandle { device, kind: kind as u8, raw }
    }

    fn is_null(&self) -> bool {
        self.device.is_null() || self.raw == 0
    }
}

/// Runs `f`, converting an internal panic into `sentinel` after logging at
/// `error!` — the boundary between internal `Result`/panic-based error
/// handling and the host's strictly value-returning ABI (spec §7, SPEC_FULL
/// §6 ambient addition).
fn ffi_guard<R>(sentinel: R, f: impl FnOnce() -> R) -> R {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            log::error!("panic caught at FFI boundary, returning sentinel");
            sentinel
        }
    }
}

unsafe fn device_mut<'a>(device: *mut Device) -> Option<&'a mut Device> {
    device.as_mut()
}

fn resolve_vertex_buffer<'a>(h: GsHandle) -> Option<(&'a mut Device, &'a mut VertexBuffer)> {
    if h.is_null() || h.kind != ResourceKind::VertexBuffer as u8 {
        return None;
    }
    let device = unsafe { &mut *h.device };
    let vbuf = device.resources.vertex_buffers.get_mut(h.raw)?;
    // SAFETY: `device` and `vbuf` borrow disjoint parts of the same
    // allocation; the caller only ever uses them together within one call.
    let vbuf: &mut VertexBuffer = unsafe { &mut *(vbuf as *mut VertexBuffer) };
    Some((device, vbuf))
}

// ---------------------------------------------------------------------
// Lifecycle (spec §6 "Lifecycle")
// ---------------------------------------------------------------------

/// Wraps a host-owned `MTLDevice*` and returns the backend device handle.
#[no_mangle]
pub extern "C" fn device_create(native_metal_device: *mut c_void) -> *mut Device {
    ffi_guard(std::ptr::null_mut(), || {
        if native_metal_device.is_null() {
            log::warn!("device_create called with a null MTLDevice*");
            return std::ptr::null_mut();
        }
        use foreign_types::ForeignType;
        let metal_device = unsafe { metal::Device::from_ptr(native_metal_device as *mut _) };
        Box::into_raw(Box::new(Device::new(metal_device)))
    })
}

#[no_mangle]
pub extern "C" fn device_destroy(device: *mut Device) {
    ffi_guard((), || {
        if !device.is_null() {
            unsafe {
                drop(Box::from_raw(device));
            }
        }
    });
}

#[no_mangle]
pub extern "C" fn device_get_name(device: *mut Device) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return std::ptr::null_mut();
        };
        let name = device.metal_device.name().to_string();
        std::ffi::CString::new(name).map(|s| s.into_raw()).unwrap_or(std::ptr::null_mut())
    })
}

/// Frees a string returned by `device_get_name`/`device_preprocessor_name`.
#[no_mangle]
pub extern "C" fn gs_free_string(s: *mut c_char) {
    ffi_guard((), || {
        if !s.is_null() {
            unsafe {
                drop(std::ffi::CString::from_raw(s));
            }
        }
    });
}

/// Host-facing device type tag: always `1` ("Metal"), spec §6.
#[no_mangle]
pub extern "C" fn device_get_type(_device: *mut Device) -> u32 {
    1
}

#[no_mangle]
pub extern "C" fn device_preprocessor_name() -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        std::ffi::CString::new("METAL").map(|s| s.into_raw()).unwrap_or(std::ptr::null_mut())
    })
}

/// No-op: the device has no implicit thread context (spec §6).
#[no_mangle]
pub extern "C" fn device_enter_context(_device: *mut Device) {}

/// No-op: symmetric with `device_enter_context`.
#[no_mangle]
pub extern "C" fn device_leave_context(_device: *mut Device) {}

// ---------------------------------------------------------------------
// Scene (spec §6 "Scene")
// ---------------------------------------------------------------------

/// Alias for `device_begin_scene` (host convention carries both names for
/// historical reasons; both start a fresh command buffer).
#[no_mangle]
pub extern "C" fn device_begin_frame(device: *mut Device) {
    device_begin_scene(device);
}

#[no_mangle]
pub extern "C" fn device_begin_scene(device: *mut Device) {
    ffi_guard((), || {
        if let Some(device) = unsafe { device_mut(device) } {
            device.begin_scene();
        }
    });
}

/// No-op: scene end is implicit in `draw`/`present` (there is no encoder
/// held open between calls in this backend).
#[no_mangle]
pub extern "C" fn device_end_scene(_device: *mut Device) {}

#[no_mangle]
pub extern "C" fn device_draw(device: *mut Device, primitive: u32, start: u32, count: u32) -> bool {
    ffi_guard(false, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return false;
        };
        let Some(primitive) = primitive_from_u32(primitive) else {
            return crate::error::soft(
                GsError::ContractViolation("unknown primitive topology".to_string()),
                false,
            );
        };
        match device.draw(primitive, start, count) {
            Ok(()) => true,
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_clear(device: *mut Device, flags: u32, r: f32, g: f32, b: f32, a: f32, depth: f32, stencil: u32) {
    ffi_guard((), || {
        if let Some(device) = unsafe { device_mut(device) } {
            device.clear(flags, [r, g, b, a], depth, stencil);
        }
    });
}

#[no_mangle]
pub extern "C" fn device_present(device: *mut Device, swapchain: GsHandle) -> bool {
    ffi_guard(false, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return false;
        };
        if swapchain.is_null() || swapchain.kind != ResourceKind::Swapchain as u8 {
            return crate::error::soft(GsError::InvalidHandle("swapchain"), false);
        }
        let Some(sc) = device.resources.swapchains.get_mut(swapchain.raw) else {
            return crate::error::soft(GsError::InvalidHandle("swapchain"), false);
        };
        // SAFETY: disjoint fields of the same `Device`.
        let sc: &mut SwapChain = unsafe { &mut *(sc as *mut SwapChain) };
        match device.present(sc) {
            Ok(()) => true,
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_flush(device: *mut Device) -> bool {
    ffi_guard(false, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return false;
        };
        match device.flush() {
            Ok(()) => true,
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, false),
        }
    })
}

/// Always true: presents in this backend are synchronous with submission
/// order, there is no separate readiness poll (spec §6).
#[no_mangle]
pub extern "C" fn device_is_present_ready(_device: *mut Device) -> bool {
    true
}

fn primitive_from_u32(v: u32) -> Option<Primitive> {
    match v {
        0 => Some(Primitive::TriangleList),
        1 => Some(Primitive::TriangleStrip),
        2 => Some(Primitive::LineList),
        3 => Some(Primitive::LineStrip),
        4 => Some(Primitive::PointList),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Render target (spec §6 "Render target")
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn device_set_render_target(device: *mut Device, color: GsHandle, depth_stencil: GsHandle) {
    ffi_guard((), || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return;
        };
        let color = if color.is_null() { None } else { Some(color.raw) };
        let ds = if depth_stencil.is_null() { None } else { Some(depth_stencil.raw) };
        device.set_render_target(color, ds);
    });
}

/// Color-space argument is accepted and ignored: this backend always
/// renders in the render target's native pixel format (spec §6).
#[no_mangle]
pub extern "C" fn device_set_render_target_with_color_space(
    device: *mut Device,
    color: GsHandle,
    depth_stencil: GsHandle,
    _color_space: u32,
) {
    device_set_render_target(device, color, depth_stencil);
}

#[no_mangle]
pub extern "C" fn device_get_render_target(device: *mut Device) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        match device.render_target() {
            Some(raw) => GsHandle::new(device as *mut Device, ResourceKind::Texture, raw),
            None => GsHandle::NULL,
        }
    })
}

#[no_mangle]
pub extern "C" fn device_get_zstencil_target(device: *mut Device) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        match device.depth_stencil_target() {
            Some(raw) => GsHandle::new(device as *mut Device, ResourceKind::DepthStencilTexture, raw),
            None => GsHandle::NULL,
        }
    })
}

/// Unimplemented; no-op (spec §6, §7 "Unsupported operation").
#[no_mangle]
pub extern "C" fn device_set_cube_render_target(_device: *mut Device, _texture: GsHandle, _face: u32) {}

/// No-op (spec §6).
#[no_mangle]
pub extern "C" fn device_enable_framebuffer_srgb(_device: *mut Device, _enabled: bool) {}

#[no_mangle]
pub extern "C" fn device_framebuffer_srgb_enabled(_device: *mut Device) -> bool {
    false
}

// ---------------------------------------------------------------------
// Pipeline state setters (spec §6 "Pipeline state setters", §4.6)
// ---------------------------------------------------------------------

/// Expands one `extern "C" fn gs_set_xxx(device, ...)` that forwards
/// straight to the matching [`Device`] setter (spec §4.6's ~150 individually
/// settable pieces of state are plain field writes; this macro keeps each
/// one a distinct, independently-callable symbol without hand-duplicating
/// the null-check/dispatch boilerplate 150 times).
macro_rules! forward_setter {
    ($name:ident ( $($arg:ident : $ty:ty),* $(,)? ) => $method:ident) => {
        #[no_mangle]
        pub extern "C" fn $name(device: *mut Device, $($arg: $ty),*) {
            ffi_guard((), || {
                if let Some(device) = unsafe { device_mut(device) } {
                    device.$method($($arg),*);
                }
            });
        }
    };
}

forward_setter!(device_set_blend_enabled(enabled: bool) => set_blend_enabled);
forward_setter!(device_set_blend_func(src: u32, dst: u32) => set_blend_func_ffi);
forward_setter!(device_set_blend_func_separate(src_color: u32, dst_color: u32, src_alpha: u32, dst_alpha: u32) => set_blend_func_separate_ffi);
forward_setter!(device_set_blend_op(op: u32) => set_blend_op_ffi);
forward_setter!(device_set_blend_op_separate(color_op: u32, alpha_op: u32) => set_blend_op_separate_ffi);
forward_setter!(device_set_color_write_mask(mask: u8) => set_color_write_mask);
forward_setter!(device_set_depth_test_enabled(enabled: bool) => set_depth_test_enabled);
forward_setter!(device_set_depth_write_enabled(enabled: bool) => set_depth_write_enabled);
forward_setter!(device_set_depth_compare(compare: u32) => set_depth_compare_ffi);
forward_setter!(device_set_stencil_test_enabled(enabled: bool) => set_stencil_test_enabled);
forward_setter!(device_set_stencil_write_enabled(enabled: bool) => set_stencil_write_enabled_ffi);
forward_setter!(device_set_stencil_masks(read_mask: u8, write_mask: u8) => set_stencil_masks);
forward_setter!(device_set_stencil_func_front(compare: u32) => set_stencil_func_front_ffi);
forward_setter!(device_set_stencil_func_back(compare: u32) => set_stencil_func_back_ffi);
forward_setter!(device_set_stencil_op_front(fail: u32, depth_fail: u32, pass: u32) => set_stencil_op_front_ffi);
forward_setter!(device_set_stencil_op_back(fail: u32, depth_fail: u32, pass: u32) => set_stencil_op_back_ffi);
forward_setter!(device_set_cull_mode(mode: u32) => set_cull_mode_ffi);
forward_setter!(device_set_fill_mode(mode: u32) => set_fill_mode_ffi);
forward_setter!(device_set_front_face_ccw(ccw: bool) => set_front_face_ccw);
forward_setter!(device_set_scissor_enabled(enabled: bool) => set_scissor_enabled);
forward_setter!(device_set_scissor_rect(x: u32, y: u32, width: u32, height: u32) => set_scissor_rect_ffi);
forward_setter!(device_ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) => set_projection_ortho);
forward_setter!(device_frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) => set_projection_frustum);
forward_setter!(device_push_projection() => push_projection);
forward_setter!(device_pop_projection() => pop_projection);

#[no_mangle]
pub extern "C" fn device_set_viewport(device: *mut Device, x: f32, y: f32, width: f32, height: f32, znear: f32, zfar: f32) {
    ffi_guard((), || {
        if let Some(device) = unsafe { device_mut(device) } {
            device.set_viewport(Viewport { x, y, width, height, znear, zfar });
        }
    });
}

#[no_mangle]
pub extern "C" fn device_get_viewport(device: *mut Device, out: *mut [f32; 6]) {
    ffi_guard((), || {
        let (Some(device), false) = (unsafe { device_mut(device) }, out.is_null()) else {
            return;
        };
        let vp = device.viewport();
        unsafe {
            *out = [vp.x, vp.y, vp.width, vp.height, vp.znear, vp.zfar];
        }
    });
}

#[no_mangle]
pub extern "C" fn device_get_cull_mode(device: *mut Device) -> u32 {
    ffi_guard(0, || {
        unsafe { device_mut(device) }.map(|d| cull_mode_to_u32(d.cull_mode())).unwrap_or(0)
    })
}

// Thin numeric<->enum adapter impls, kept in this module since they only
// exist for the ABI (internal code uses the typed `pipeline::*` enums
// directly, e.g. `device/draw.rs`, `device/setters.rs`).
impl Device {
    fn set_blend_func_ffi(&mut self, src: u32, dst: u32) {
        self.set_blend_func(blend_factor(src), blend_factor(dst));
    }
    fn set_blend_func_separate_ffi(&mut self, src_color: u32, dst_color: u32, src_alpha: u32, dst_alpha: u32) {
        self.set_blend_func_separate(
            blend_factor(src_color),
            blend_factor(dst_color),
            blend_factor(src_alpha),
            blend_factor(dst_alpha),
        );
    }
    fn set_blend_op_ffi(&mut self, op: u32) {
        self.set_blend_op(blend_op(op));
    }
    fn set_blend_op_separate_ffi(&mut self, color_op: u32, alpha_op: u32) {
        self.set_blend_op_separate(blend_op(color_op), blend_op(alpha_op));
    }
    fn set_depth_compare_ffi(&mut self, compare: u32) {
        self.set_depth_compare(compare_function(compare));
    }
    fn set_stencil_write_enabled_ffi(&mut self, enabled: bool) {
        self.set_stencil_masks(self.depth_stencil_read_mask(), if enabled { 0xff } else { 0x00 });
    }
    fn set_stencil_func_front_ffi(&mut self, compare: u32) {
        self.set_stencil_func_front(compare_function(compare));
    }
    fn set_stencil_func_back_ffi(&mut self, compare: u32) {
        self.set_stencil_func_back(compare_function(compare));
    }
    fn set_stencil_op_front_ffi(&mut self, fail: u32, depth_fail: u32, pass: u32) {
        self.set_stencil_ops_front(stencil_op(fail), stencil_op(depth_fail), stencil_op(pass));
    }
    fn set_stencil_op_back_ffi(&mut self, fail: u32, depth_fail: u32, pass: u32) {
        self.set_stencil_ops_back(stencil_op(fail), stencil_op(depth_fail), stencil_op(pass));
    }
    fn set_cull_mode_ffi(&mut self, mode: u32) {
        self.set_cull_mode(cull_mode(mode));
    }
    fn set_fill_mode_ffi(&mut self, mode: u32) {
        self.set_fill_mode(fill_mode(mode));
    }
    fn set_scissor_rect_ffi(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.set_scissor_rect(ScissorRect { x, y, width, height });
    }
    fn cull_mode(&self) -> CullMode {
        self.state.cull_mode
    }
    fn depth_stencil_read_mask(&self) -> u8 {
        self.state.depth_stencil.stencil_read_mask
    }
}

fn blend_factor(v: u32) -> BlendFactor {
    match v {
        0 => BlendFactor::Zero,
        1 => BlendFactor::One,
        2 => BlendFactor::SrcColor,
        3 => BlendFactor::InvSrcColor,
        4 => BlendFactor::SrcAlpha,
        5 => BlendFactor::InvSrcAlpha,
        6 => BlendFactor::DstColor,
        7 => BlendFactor::InvDstColor,
        8 => BlendFactor::DstAlpha,
        _ => BlendFactor::InvDstAlpha,
    }
}

fn blend_op(v: u32) -> BlendOp {
    match v {
        0 => BlendOp::Add,
        1 => BlendOp::Subtract,
        2 => BlendOp::ReverseSubtract,
        3 => BlendOp::Min,
        _ => BlendOp::Max,
    }
}

fn compare_function(v: u32) -> CompareFunction {
    match v {
        0 => CompareFunction::Never,
        1 => CompareFunction::Less,
        2 => CompareFunction::Equal,
        3 => CompareFunction::LessEqual,
        4 => CompareFunction::Greater,
        5 => CompareFunction::NotEqual,
        6 => CompareFunction::GreaterEqual,
        _ => CompareFunction::Always,
    }
}

fn stencil_op(v: u32) -> StencilOp {
    match v {
        0 => StencilOp::Keep,
        1 => StencilOp::Zero,
        2 => StencilOp::Replace,
        3 => StencilOp::IncrementClamp,
        4 => StencilOp::DecrementClamp,
        5 => StencilOp::Invert,
        6 => StencilOp::IncrementWrap,
        _ => StencilOp::DecrementWrap,
    }
}

fn cull_mode(v: u32) -> CullMode {
    match v {
        0 => CullMode::None,
        1 => CullMode::Front,
        _ => CullMode::Back,
    }
}

fn cull_mode_to_u32(m: CullMode) -> u32 {
    match m {
        CullMode::None => 0,
        CullMode::Front => 1,
        CullMode::Back => 2,
    }
}

fn fill_mode(v: u32) -> FillMode {
    match v {
        0 => FillMode::Fill,
        _ => FillMode::Line,
    }
}

// ---------------------------------------------------------------------
// Resources: vertex buffers
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn device_create_vertex_buffer_static(
    device: *mut Device,
    data: *const u8,
    len: usize,
    stride: usize,
    vertex_count: usize,
) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        if data.is_null() {
            return crate::error::soft(GsError::ContractViolation("null vertex data".to_string()), GsHandle::NULL);
        }
        let slice = unsafe { std::slice::from_raw_parts(data, len) };
        match VertexBuffer::new_static(&device.metal_device, &[(slice, stride)], vertex_count) {
            Ok(vb) => {
                let raw = device.resources.vertex_buffers.insert(vb);
                GsHandle::new(device as *mut Device, ResourceKind::VertexBuffer, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_create_vertex_buffer_dynamic(device: *mut Device, stride: usize, vertex_count: usize) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let vb = VertexBuffer::new_dynamic(&[stride], vertex_count);
        let raw = device.resources.vertex_buffers.insert(vb);
        GsHandle::new(device as *mut Device, ResourceKind::VertexBuffer, raw)
    })
}

#[no_mangle]
pub extern "C" fn device_destroy_vertex_buffer(handle: GsHandle) {
    ffi_guard((), || {
        if let Some((device, _)) = resolve_vertex_buffer(handle) {
            device.resources.vertex_buffers.remove(handle.raw);
        }
    });
}

/// `device_load_vertex_buffer` (spec §6 "load"): stages new CPU-side data
/// for the next draw that resolves this buffer.
#[no_mangle]
pub extern "C" fn device_load_vertex_buffer(handle: GsHandle, data: *const u8, len: usize) -> bool {
    ffi_guard(false, || {
        let Some((_, vbuf)) = resolve_vertex_buffer(handle) else {
            return crate::error::soft(GsError::InvalidHandle("vertex buffer"), false);
        };
        if data.is_null() {
            return false;
        }
        let slice = unsafe { std::slice::from_raw_parts(data, len) };
        match vbuf.update(0, slice) {
            Ok(()) => true,
            Err(e) => crate::error::soft(e, false),
        }
    })
}

/// `device_flush_vertex_buffer`/`device_flush_vertex_buffer_direct` (spec
/// §6): both reduce to the same "stage the data now" contract in this
/// backend, since dynamic streams are always re-resolved at draw time.
#[no_mangle]
pub extern "C" fn device_flush_vertex_buffer(handle: GsHandle, data: *const u8, len: usize) -> bool {
    device_load_vertex_buffer(handle, data, len)
}

#[no_mangle]
pub extern "C" fn device_flush_vertex_buffer_direct(handle: GsHandle, data: *const u8, len: usize) -> bool {
    device_load_vertex_buffer(handle, data, len)
}

#[no_mangle]
pub extern "C" fn device_get_vertex_buffer_data(handle: GsHandle, out: *mut u8, out_len: usize) -> bool {
    ffi_guard(false, || {
        let Some((device, vbuf)) = resolve_vertex_buffer(handle) else {
            return crate::error::soft(GsError::InvalidHandle("vertex buffer"), false);
        };
        if out.is_null() {
            return false;
        }
        let Ok(buffer) = vbuf.resolve_stream(0, &device.transient_pool) else {
            return false;
        };
        let n = out_len.min(buffer.length() as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(buffer.contents() as *const u8, out, n);
        }
        true
    })
}

// ---------------------------------------------------------------------
// Resources: index buffers (symmetric with vertex buffers, spec §6)
// ---------------------------------------------------------------------

fn resolve_index_buffer<'a>(h: GsHandle) -> Option<(&'a mut Device, &'a mut IndexBuffer)> {
    if h.is_null() || h.kind != ResourceKind::IndexBuffer as u8 {
        return None;
    }
    let device = unsafe { &mut *h.device };
    let ibuf = device.resources.index_buffers.get_mut(h.raw)?;
    let ibuf: &mut IndexBuffer = unsafe { &mut *(ibuf as *mut IndexBuffer) };
    Some((device, ibuf))
}

#[no_mangle]
pub extern "C" fn device_create_index_buffer_static(
    device: *mut Device,
    data: *const u8,
    len: usize,
    is_32_bit: bool,
    index_count: usize,
) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        if data.is_null() {
            return GsHandle::NULL;
        }
        let slice = unsafe { std::slice::from_raw_parts(data, len) };
        let format = if is_32_bit { IndexFormat::U32 } else { IndexFormat::U16 };
        match IndexBuffer::new_static(&device.metal_device, slice, format, index_count) {
            Ok(ib) => {
                let raw = device.resources.index_buffers.insert(ib);
                GsHandle::new(device as *mut Device, ResourceKind::IndexBuffer, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_create_index_buffer_dynamic(device: *mut Device, is_32_bit: bool, index_count: usize) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let format = if is_32_bit { IndexFormat::U32 } else { IndexFormat::U16 };
        let raw = device.resources.index_buffers.insert(IndexBuffer::new_dynamic(format, index_count));
        GsHandle::new(device as *mut Device, ResourceKind::IndexBuffer, raw)
    })
}

#[no_mangle]
pub extern "C" fn device_destroy_index_buffer(handle: GsHandle) {
    ffi_guard((), || {
        if let Some((device, _)) = resolve_index_buffer(handle) {
            device.resources.index_buffers.remove(handle.raw);
        }
    });
}

#[no_mangle]
pub extern "C" fn device_load_index_buffer(handle: GsHandle, data: *const u8, len: usize) -> bool {
    ffi_guard(false, || {
        let Some((_, ibuf)) = resolve_index_buffer(handle) else {
            return crate::error::soft(GsError::InvalidHandle("index buffer"), false);
        };
        if data.is_null() {
            return false;
        }
        let slice = unsafe { std::slice::from_raw_parts(data, len) };
        match ibuf.update(slice) {
            Ok(()) => true,
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_flush_index_buffer(handle: GsHandle, data: *const u8, len: usize) -> bool {
    device_load_index_buffer(handle, data, len)
}

#[no_mangle]
pub extern "C" fn device_flush_index_buffer_direct(handle: GsHandle, data: *const u8, len: usize) -> bool {
    device_load_index_buffer(handle, data, len)
}

#[no_mangle]
pub extern "C" fn device_get_index_buffer_data(handle: GsHandle, out: *mut u8, out_len: usize) -> bool {
    ffi_guard(false, || {
        let Some((device, ibuf)) = resolve_index_buffer(handle) else {
            return crate::error::soft(GsError::InvalidHandle("index buffer"), false);
        };
        if out.is_null() {
            return false;
        }
        let Ok(buffer) = ibuf.resolve(&device.transient_pool) else {
            return false;
        };
        let n = out_len.min(buffer.length() as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(buffer.contents() as *const u8, out, n);
        }
        true
    })
}

// ---------------------------------------------------------------------
// Resources: 2D / cube textures, volume texture stubs
// ---------------------------------------------------------------------

fn resolve_texture<'a>(h: GsHandle) -> Option<(&'a mut Device, &'a mut Texture)> {
    if h.is_null() || h.kind != ResourceKind::Texture as u8 {
        return None;
    }
    let device = unsafe { &mut *h.device };
    let tex = device.resources.textures.get_mut(h.raw)?;
    let tex: &mut Texture = unsafe { &mut *(tex as *mut Texture) };
    Some((device, tex))
}

fn color_format_from_u32(v: u32) -> Option<ColorFormat> {
    use ColorFormat::*;
    Some(match v {
        0 => Rgba8Unorm,
        1 => Rgba8UnormSrgb,
        2 => Bgra8Unorm,
        3 => Bgra8UnormSrgb,
        4 => R8Unorm,
        5 => R16Float,
        6 => Rg16Float,
        7 => Rgba16Float,
        8 => R32Float,
        9 => Rg32Float,
        10 => Rgba32Float,
        11 => R10g10b10a2Unorm,
        12 => A8Unorm,
        13 => Rgba16Unorm,
        14 => R16Unorm,
        15 => Rg8Unorm,
        16 => Dxt1,
        17 => Dxt3,
        18 => Dxt5,
        _ => return None,
    })
}

#[no_mangle]
pub extern "C" fn device_create_texture_2d(
    device: *mut Device,
    format: u32,
    width: u32,
    height: u32,
    mip_count: u32,
    build_mipmaps: bool,
    data: *const u8,
    data_len: usize,
) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let Some(format) = color_format_from_u32(format) else {
            return crate::error::soft(GsError::ContractViolation("unknown pixel format".to_string()), GsHandle::NULL);
        };
        let levels = if data.is_null() {
            Vec::new()
        } else {
            vec![MipLevel { width, height, data: unsafe { std::slice::from_raw_parts(data, data_len) } }]
        };
        let flags = if build_mipmaps { TextureFlags::BUILD_MIPMAPS } else { TextureFlags::empty() };
        let cmd_buf = device.command_buffer.as_deref();
        match Texture::new(&device.metal_device, TextureKind::Texture2D, format, width, height, mip_count, &levels, flags, cmd_buf) {
            Ok(tex) => {
                let raw = device.resources.textures.insert(tex);
                GsHandle::new(device as *mut Device, ResourceKind::Texture, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_create_cube_texture(
    device: *mut Device,
    format: u32,
    size: u32,
) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let Some(format) = color_format_from_u32(format) else {
            return GsHandle::NULL;
        };
        match Texture::new(&device.metal_device, TextureKind::Cube, format, size, size, 1, &[], TextureFlags::empty(), None) {
            Ok(tex) => {
                let raw = device.resources.textures.insert(tex);
                GsHandle::new(device as *mut Device, ResourceKind::Texture, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_destroy_texture(handle: GsHandle) {
    ffi_guard((), || {
        if let Some((device, _)) = resolve_texture(handle) {
            device.resources.textures.remove(handle.raw);
        }
    });
}

#[no_mangle]
pub extern "C" fn device_texture_map(handle: GsHandle, out_ptr: *mut *mut u8, out_len: *mut usize) -> bool {
    ffi_guard(false, || {
        let Some((_, tex)) = resolve_texture(handle) else {
            return crate::error::soft(GsError::InvalidHandle("texture"), false);
        };
        if out_ptr.is_null() || out_len.is_null() {
            return false;
        }
        let mut scratch = tex.map().into_boxed_slice();
        unsafe {
            *out_len = scratch.len();
            *out_ptr = scratch.as_mut_ptr();
        }
        // Leaked; the host returns it via `device_texture_unmap` or
        // `gs_free_bytes`, matching the map/unmap round trip of spec §4.3.
        std::mem::forget(scratch);
        true
    })
}

#[no_mangle]
pub extern "C" fn device_texture_unmap(handle: GsHandle, data: *mut u8, len: usize) -> bool {
    ffi_guard(false, || {
        let Some((_, tex)) = resolve_texture(handle) else {
            return crate::error::soft(GsError::InvalidHandle("texture"), false);
        };
        if data.is_null() {
            return false;
        }
        let slice = unsafe { std::slice::from_raw_parts(data, len) };
        let result = tex.unmap(slice).is_ok();
        unsafe {
            drop(Vec::from_raw_parts(data, len, len));
        }
        result
    })
}

#[no_mangle]
pub extern "C" fn gs_free_bytes(data: *mut u8, len: usize) {
    ffi_guard((), || {
        if !data.is_null() {
            unsafe {
                drop(Vec::from_raw_parts(data, len, len));
            }
        }
    });
}

#[no_mangle]
pub extern "C" fn device_texture_get_width(handle: GsHandle) -> u32 {
    resolve_texture(handle).map(|(_, t)| t.width).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn device_texture_get_height(handle: GsHandle) -> u32 {
    resolve_texture(handle).map(|(_, t)| t.height).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn device_texture_get_color_format(handle: GsHandle) -> u32 {
    resolve_texture(handle).map(|(_, t)| t.format as u32).unwrap_or(0)
}

/// Always `0` ("2D"); cube textures are created through
/// `device_create_cube_texture` and report the same tag since both share
/// the `Texture` resource kind — the `kind` field distinguishes them
/// internally but is not part of the host-visible ABI surface.
#[no_mangle]
pub extern "C" fn device_texture_get_type(_handle: GsHandle) -> u32 {
    0
}

#[no_mangle]
pub extern "C" fn device_texture_get_obj(handle: GsHandle) -> *const c_void {
    ffi_guard(std::ptr::null(), || {
        use foreign_types::ForeignType;
        resolve_texture(handle)
            .map(|(_, t)| t.handle.as_ptr() as *const c_void)
            .unwrap_or(std::ptr::null())
    })
}

#[no_mangle]
pub extern "C" fn device_texture_copy(src: GsHandle, dest: GsHandle) -> bool {
    ffi_guard(false, || {
        let Some((device, _)) = resolve_texture(src) else {
            return false;
        };
        let Some(cmd_buf) = device.command_buffer.as_deref() else {
            return crate::error::soft(GsError::ContractViolation("texture copy with no active command buffer".to_string()), false);
        };
        let Some((_, src_tex)) = resolve_texture(src) else { return false };
        let Some((_, dest_tex)) = resolve_texture(dest) else {
            return crate::error::soft(GsError::InvalidHandle("texture"), false);
        };
        match src_tex.copy(dest_tex, cmd_buf) {
            Ok(()) => true,
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_texture_copy_region(
    src: GsHandle,
    dest: GsHandle,
    src_x: u32,
    src_y: u32,
    width: u32,
    height: u32,
    dest_x: u32,
    dest_y: u32,
) -> bool {
    ffi_guard(false, || {
        let Some((device, _)) = resolve_texture(src) else {
            return false;
        };
        let Some(cmd_buf) = device.command_buffer.as_deref() else {
            return false;
        };
        let Some((_, src_tex)) = resolve_texture(src) else { return false };
        let Some((_, dest_tex)) = resolve_texture(dest) else {
            return crate::error::soft(GsError::InvalidHandle("texture"), false);
        };
        match src_tex.copy_region(dest_tex, (src_x, src_y), (width, height), (dest_x, dest_y), cmd_buf) {
            Ok(()) => true,
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_create_texture_from_iosurface(
    device: *mut Device,
    io_surface: *mut c_void,
    width: u32,
    height: u32,
    fourcc: u32,
) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        match Texture::open_from_iosurface(&device.metal_device, io_surface, width, height, fourcc) {
            Ok(tex) => {
                let raw = device.resources.textures.insert(tex);
                GsHandle::new(device as *mut Device, ResourceKind::Texture, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

/// `device_rebind_iosurface`: replaces the live texture at `handle` in
/// place so existing references (bound textures, render target slots) see
/// the new surface without a handle churn (spec §6 `replace`-style entry).
#[no_mangle]
pub extern "C" fn device_rebind_iosurface(handle: GsHandle, io_surface: *mut c_void, width: u32, height: u32, fourcc: u32) -> bool {
    ffi_guard(false, || {
        let Some((device, _)) = resolve_texture(handle) else {
            return crate::error::soft(GsError::InvalidHandle("texture"), false);
        };
        match Texture::open_from_iosurface(&device.metal_device, io_surface, width, height, fourcc) {
            Ok(tex) => {
                device.resources.textures.replace(handle.raw, tex);
                true
            }
            Err(e) => crate::error::soft(e, false),
        }
    })
}

/// `device_open_shared`: this backend's shared-texture support is entirely
/// IOSurface-based (spec §6 `device_shared_texture_available` => true); an
/// "open shared" by name has no distinct representation from opening by
/// IOSurface, so it aliases that entry point.
#[no_mangle]
pub extern "C" fn device_open_shared(
    device: *mut Device,
    io_surface: *mut c_void,
    width: u32,
    height: u32,
    fourcc: u32,
) -> GsHandle {
    device_create_texture_from_iosurface(device, io_surface, width, height, fourcc)
}

/// Volume textures are out of scope (spec §4.3 "volumetric ... always
/// returns None"); the create stub mirrors the host's documented
/// null-returning behavior.
#[no_mangle]
pub extern "C" fn device_create_volume_texture(_device: *mut Device, _w: u32, _h: u32, _d: u32, _format: u32) -> GsHandle {
    GsHandle::NULL
}

#[no_mangle]
pub extern "C" fn device_destroy_volume_texture(_handle: GsHandle) {}

#[no_mangle]
pub extern "C" fn device_volume_texture_get_width(_handle: GsHandle) -> u32 {
    0
}

#[no_mangle]
pub extern "C" fn device_volume_texture_get_height(_handle: GsHandle) -> u32 {
    0
}

#[no_mangle]
pub extern "C" fn device_volume_texture_get_depth(_handle: GsHandle) -> u32 {
    0
}

// ---------------------------------------------------------------------
// Resources: depth-stencil textures
// ---------------------------------------------------------------------

fn depth_stencil_format_from_u32(v: u32) -> Option<crate::format::DepthStencilFormat> {
    use crate::format::DepthStencilFormat::*;
    Some(match v {
        0 => Depth16Unorm,
        1 => Depth32Float,
        2 => Depth32FloatStencil8,
        3 => Stencil8,
        4 => Depth24UnormStencil8,
        _ => return None,
    })
}

#[no_mangle]
pub extern "C" fn device_create_depth_stencil_texture(device: *mut Device, format: u32, width: u32, height: u32) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let Some(format) = depth_stencil_format_from_u32(format) else {
            return GsHandle::NULL;
        };
        let tex = DepthStencilTexture::new(&device.metal_device, format, width, height);
        let raw = device.resources.depth_stencil_textures.insert(tex);
        GsHandle::new(device as *mut Device, ResourceKind::DepthStencilTexture, raw)
    })
}

#[no_mangle]
pub extern "C" fn device_destroy_depth_stencil_texture(handle: GsHandle) {
    ffi_guard((), || {
        if handle.is_null() || handle.kind != ResourceKind::DepthStencilTexture as u8 {
            return;
        }
        let device = unsafe { &mut *handle.device };
        device.resources.depth_stencil_textures.remove(handle.raw);
    });
}

/// `device_get_target` for a depth-stencil texture: whether it is currently
/// bound as the device's depth-stencil attachment.
#[no_mangle]
pub extern "C" fn device_depth_stencil_get_target(handle: GsHandle) -> bool {
    if handle.is_null() || handle.kind != ResourceKind::DepthStencilTexture as u8 {
        return false;
    }
    let device = unsafe { &*handle.device };
    device.depth_stencil_target() == Some(handle.raw)
}

// ---------------------------------------------------------------------
// Resources: stage surfaces
// ---------------------------------------------------------------------

fn resolve_stage_surface<'a>(h: GsHandle) -> Option<(&'a mut Device, &'a mut StageSurface)> {
    if h.is_null() || h.kind != ResourceKind::StageSurface as u8 {
        return None;
    }
    let device = unsafe { &mut *h.device };
    let s = device.resources.stage_surfaces.get_mut(h.raw)?;
    let s: &mut StageSurface = unsafe { &mut *(s as *mut StageSurface) };
    Some((device, s))
}

#[no_mangle]
pub extern "C" fn device_create_stage_surface(device: *mut Device, width: u32, height: u32, format: u32) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let Some(format) = color_format_from_u32(format) else {
            return GsHandle::NULL;
        };
        let surface = StageSurface::new(&device.metal_device, width, height, format);
        let raw = device.resources.stage_surfaces.insert(surface);
        GsHandle::new(device as *mut Device, ResourceKind::StageSurface, raw)
    })
}

#[no_mangle]
pub extern "C" fn device_destroy_stage_surface(handle: GsHandle) {
    ffi_guard((), || {
        if let Some((device, _)) = resolve_stage_surface(handle) {
            device.resources.stage_surfaces.remove(handle.raw);
        }
    });
}

#[no_mangle]
pub extern "C" fn device_stage_surface_map(handle: GsHandle, out_ptr: *mut *mut u8, out_len: *mut usize) -> bool {
    ffi_guard(false, || {
        let Some((device, surface)) = resolve_stage_surface(handle) else {
            return crate::error::soft(GsError::InvalidHandle("stage surface"), false);
        };
        let Some(cmd_buf) = device.command_buffer.as_deref() else {
            return crate::error::soft(GsError::ContractViolation("stage surface map with no active command buffer".to_string()), false);
        };
        if out_ptr.is_null() || out_len.is_null() {
            return false;
        }
        match surface.map(cmd_buf) {
            Ok(data) => {
                let mut boxed = data.into_boxed_slice();
                unsafe {
                    *out_len = boxed.len();
                    *out_ptr = boxed.as_mut_ptr();
                }
                std::mem::forget(boxed);
                true
            }
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_stage_surface_unmap(_handle: GsHandle, data: *mut u8, len: usize) {
    gs_free_bytes(data, len);
}

#[no_mangle]
pub extern "C" fn device_stage_surface_get_width(handle: GsHandle) -> u32 {
    resolve_stage_surface(handle).map(|(_, s)| s.width).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn device_stage_surface_get_height(handle: GsHandle) -> u32 {
    resolve_stage_surface(handle).map(|(_, s)| s.height).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn device_stage_surface_get_color_format(handle: GsHandle) -> u32 {
    resolve_stage_surface(handle).map(|(_, s)| s.format as u32).unwrap_or(0)
}

// ---------------------------------------------------------------------
// Resources: sampler states
// ---------------------------------------------------------------------

fn address_mode_from_u32(v: u32) -> crate::shader::ir::AddressMode {
    use crate::shader::ir::AddressMode::*;
    match v {
        0 => Wrap,
        1 => Clamp,
        2 => Mirror,
        _ => Border,
    }
}

fn filter_mode_from_u32(v: u32) -> crate::shader::ir::FilterMode {
    use crate::shader::ir::FilterMode::*;
    match v {
        0 => Point,
        1 => Linear,
        _ => Anisotropic,
    }
}

#[no_mangle]
pub extern "C" fn device_create_sampler_state(
    device: *mut Device,
    address_u: u32,
    address_v: u32,
    address_w: u32,
    filter: u32,
    max_anisotropy: u32,
    border_color: u32,
) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let info = crate::shader::ir::SamplerInfo {
            address_u: address_mode_from_u32(address_u),
            address_v: address_mode_from_u32(address_v),
            address_w: address_mode_from_u32(address_w),
            filter: filter_mode_from_u32(filter),
            max_anisotropy,
            border_color,
        };
        match SamplerState::new(&device.metal_device, &info) {
            Ok(s) => {
                let raw = device.resources.samplers.insert(s);
                GsHandle::new(device as *mut Device, ResourceKind::Sampler, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_destroy_sampler_state(handle: GsHandle) {
    ffi_guard((), || {
        if handle.is_null() || handle.kind != ResourceKind::Sampler as u8 {
            return;
        }
        let device = unsafe { &mut *handle.device };
        device.resources.samplers.remove(handle.raw);
    });
}

/// `device_load_sampler_state`: rebuilds the sampler from a fresh
/// descriptor in place, preserving the handle (spec §6 "load" entries are
/// a replace-in-place by convention across every resource kind here).
#[no_mangle]
pub extern "C" fn device_load_sampler_state(
    handle: GsHandle,
    address_u: u32,
    address_v: u32,
    address_w: u32,
    filter: u32,
    max_anisotropy: u32,
    border_color: u32,
) -> bool {
    ffi_guard(false, || {
        if handle.is_null() || handle.kind != ResourceKind::Sampler as u8 {
            return crate::error::soft(GsError::InvalidHandle("sampler"), false);
        }
        let device = unsafe { &mut *handle.device };
        let info = crate::shader::ir::SamplerInfo {
            address_u: address_mode_from_u32(address_u),
            address_v: address_mode_from_u32(address_v),
            address_w: address_mode_from_u32(address_w),
            filter: filter_mode_from_u32(filter),
            max_anisotropy,
            border_color,
        };
        match SamplerState::new(&device.metal_device, &info) {
            Ok(s) => {
                device.resources.samplers.replace(handle.raw, s);
                true
            }
            Err(e) => crate::error::soft(e, false),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_set_texture(device: *mut Device, slot: u32, texture: GsHandle) -> bool {
    ffi_guard(false, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return false;
        };
        let raw = if texture.is_null() { None } else { Some(texture.raw) };
        device.set_texture(slot as usize, raw).is_ok()
    })
}

#[no_mangle]
pub extern "C" fn device_set_sampler(device: *mut Device, slot: u32, sampler: GsHandle) -> bool {
    ffi_guard(false, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return false;
        };
        let raw = if sampler.is_null() { None } else { Some(sampler.raw) };
        device.set_sampler(slot as usize, raw).is_ok()
    })
}

/// Stub (spec §6 "default sampler state load"): a legacy fixed-function
/// default has no Metal 3 equivalent worth wiring up; callers get a usable
/// bilinear-wrap sampler instead of a null handle.
#[no_mangle]
pub extern "C" fn device_load_default_sampler_state(device: *mut Device) -> GsHandle {
    device_create_sampler_state(device, 0, 0, 0, 1, 1, 0)
}

// ---------------------------------------------------------------------
// Resources: shaders
// ---------------------------------------------------------------------

/// Shader creation takes an already-tokenized [`ShaderProgram`] rather than
/// raw source text: the host's HLSL-like lexer/parser is an external
/// collaborator out of this crate's scope (spec §1), so the ABI boundary
/// for shader creation is the parsed program, not source bytes.
#[no_mangle]
pub extern "C" fn device_create_vertex_shader(device: *mut Device, program: *const ShaderProgram) -> GsHandle {
    create_shader(device, program, ResourceKind::VertexShader)
}

#[no_mangle]
pub extern "C" fn device_create_pixel_shader(device: *mut Device, program: *const ShaderProgram) -> GsHandle {
    create_shader(device, program, ResourceKind::FragmentShader)
}

fn create_shader(device: *mut Device, program: *const ShaderProgram, kind: ResourceKind) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let Some(program) = (unsafe { program.as_ref() }) else {
            return GsHandle::NULL;
        };
        match crate::shader::compile(program) {
            Ok(metadata) => {
                let source = metadata.msl_source.clone();
                let options = metal::CompileOptions::new();
                match device.metal_device.new_library_with_source(&source, &options) {
                    Ok(library) => {
                        let shader = crate::device::Shader::new(library, metadata);
                        let raw = device.shaders.insert(shader);
                        GsHandle::new(device as *mut Device, kind, raw)
                    }
                    Err(e) => crate::error::soft(GsError::PipelineCompilation(e.to_string()), GsHandle::NULL),
                }
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

fn resolve_shader_kind(h: GsHandle) -> bool {
    h.kind == ResourceKind::VertexShader as u8 || h.kind == ResourceKind::FragmentShader as u8
}

#[no_mangle]
pub extern "C" fn device_destroy_shader(handle: GsHandle) {
    ffi_guard((), || {
        if handle.is_null() || !resolve_shader_kind(handle) {
            return;
        }
        let device = unsafe { &mut *handle.device };
        device.shaders.remove(handle.raw);
    });
}

#[no_mangle]
pub extern "C" fn device_load_vertex_shader(device: *mut Device, handle: GsHandle, program: *const ShaderProgram) -> bool {
    let fresh = device_create_vertex_shader(device, program);
    replace_shader(handle, fresh)
}

#[no_mangle]
pub extern "C" fn device_load_pixel_shader(device: *mut Device, handle: GsHandle, program: *const ShaderProgram) -> bool {
    let fresh = device_create_pixel_shader(device, program);
    replace_shader(handle, fresh)
}

fn replace_shader(handle: GsHandle, fresh: GsHandle) -> bool {
    if fresh.is_null() || handle.is_null() || !resolve_shader_kind(handle) {
        return false;
    }
    let device = unsafe { &mut *handle.device };
    if let Some(new_shader) = device.shaders.remove(fresh.raw) {
        device.shaders.replace(handle.raw, new_shader);
        true
    } else {
        false
    }
}

#[no_mangle]
pub extern "C" fn device_get_vertex_shader(device: *mut Device) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        match device.state.vertex_shader {
            Some(raw) => GsHandle::new(device as *mut Device, ResourceKind::VertexShader, raw),
            None => GsHandle::NULL,
        }
    })
}

#[no_mangle]
pub extern "C" fn device_get_pixel_shader(device: *mut Device) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        match device.state.fragment_shader {
            Some(raw) => GsHandle::new(device as *mut Device, ResourceKind::FragmentShader, raw),
            None => GsHandle::NULL,
        }
    })
}

#[no_mangle]
pub extern "C" fn device_set_vertex_shader(device: *mut Device, handle: GsHandle) {
    ffi_guard((), || {
        if let Some(device) = unsafe { device_mut(device) } {
            device.set_vertex_shader(if handle.is_null() { None } else { Some(handle.raw) });
        }
    });
}

#[no_mangle]
pub extern "C" fn device_set_pixel_shader(device: *mut Device, handle: GsHandle) {
    ffi_guard((), || {
        if let Some(device) = unsafe { device_mut(device) } {
            device.set_fragment_shader(if handle.is_null() { None } else { Some(handle.raw) });
        }
    });
}

// -- Shader parameter (uniform) introspection and setters (spec §6) -----

#[no_mangle]
pub extern "C" fn shader_get_parameter_count(handle: GsHandle) -> u32 {
    if handle.is_null() || !resolve_shader_kind(handle) {
        return 0;
    }
    let device = unsafe { &*handle.device };
    device.shaders.get(handle.raw).map(|s| s.uniform_layout.len() as u32).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn shader_get_parameter_by_index(handle: GsHandle, index: u32) -> bool {
    if handle.is_null() || !resolve_shader_kind(handle) {
        return false;
    }
    let device = unsafe { &*handle.device };
    device.shaders.get(handle.raw).map(|s| (index as usize) < s.uniform_layout.len()).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn shader_get_parameter_by_name(handle: GsHandle, name: *const c_char) -> i32 {
    ffi_guard(-1, || {
        if handle.is_null() || !resolve_shader_kind(handle) || name.is_null() {
            return -1;
        }
        let device = unsafe { &*handle.device };
        let Some(shader) = device.shaders.get(handle.raw) else {
            return -1;
        };
        let name = unsafe { std::ffi::CStr::from_ptr(name) }.to_string_lossy();
        shader.find_uniform(&name).map(|i| i as i32).unwrap_or(-1)
    })
}

/// Generic `set_xxx` uniform setter: copies `bytes` into the shader's
/// scratch buffer at the uniform's byte offset and marks it dirty, matching
/// spec §4.6 step 7 ("flush dirty non-texture uniforms"). Covers the
/// `set_bool`/`set_int`/`set_float`/`set_vec2`/`set_vec3`/`set_vec4`/
/// `set_mat3`/`set_mat4` family, which differ only in payload size.
fn shader_set_uniform_bytes(handle: GsHandle, index: u32, bytes: &[u8]) -> bool {
    if handle.is_null() || !resolve_shader_kind(handle) {
        return false;
    }
    let device = unsafe { &mut *handle.device };
    let Some(shader) = device.shaders.get_mut(handle.raw) else {
        return false;
    };
    let Some(entry) = shader.uniform_layout.get(index as usize).cloned() else {
        return false;
    };
    if entry.byte_offset + bytes.len() > shader.uniform_scratch.len() {
        return false;
    }
    shader.uniform_scratch[entry.byte_offset..entry.byte_offset + bytes.len()].copy_from_slice(bytes);
    shader.uniform_runtime[index as usize].dirty = true;
    true
}

#[no_mangle]
pub extern "C" fn shader_set_bool(handle: GsHandle, index: u32, value: bool) -> bool {
    shader_set_uniform_bytes(handle, index, &(value as u32).to_ne_bytes())
}

#[no_mangle]
pub extern "C" fn shader_set_int(handle: GsHandle, index: u32, value: i32) -> bool {
    shader_set_uniform_bytes(handle, index, &value.to_ne_bytes())
}

#[no_mangle]
pub extern "C" fn shader_set_float(handle: GsHandle, index: u32, value: f32) -> bool {
    shader_set_uniform_bytes(handle, index, &value.to_ne_bytes())
}

#[no_mangle]
pub extern "C" fn shader_set_vec2(handle: GsHandle, index: u32, v: *const [f32; 2]) -> bool {
    let v = unsafe { v.as_ref() };
    v.map(|v| shader_set_uniform_bytes(handle, index, bytemuck::bytes_of(v))).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn shader_set_vec3(handle: GsHandle, index: u32, v: *const [f32; 3]) -> bool {
    let v = unsafe { v.as_ref() };
    v.map(|v| shader_set_uniform_bytes(handle, index, bytemuck::bytes_of(v))).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn shader_set_vec4(handle: GsHandle, index: u32, v: *const [f32; 4]) -> bool {
    let v = unsafe { v.as_ref() };
    v.map(|v| shader_set_uniform_bytes(handle, index, bytemuck::bytes_of(v))).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn shader_set_mat3(handle: GsHandle, index: u32, m: *const [f32; 9]) -> bool {
    let m = unsafe { m.as_ref() };
    m.map(|m| shader_set_uniform_bytes(handle, index, bytemuck::bytes_of(m))).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn shader_set_mat4(handle: GsHandle, index: u32, m: *const [f32; 16]) -> bool {
    let m = unsafe { m.as_ref() };
    m.map(|m| shader_set_uniform_bytes(handle, index, bytemuck::bytes_of(m))).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn shader_set_texture(handle: GsHandle, index: u32, texture: GsHandle) -> bool {
    if handle.is_null() || !resolve_shader_kind(handle) {
        return false;
    }
    let device = unsafe { &mut *handle.device };
    let Some(shader) = device.shaders.get_mut(handle.raw) else {
        return false;
    };
    let Some(runtime) = shader.uniform_runtime.get_mut(index as usize) else {
        return false;
    };
    runtime.texture_handle = if texture.is_null() { None } else { Some(texture.raw) };
    true
}

/// `shader_set_next_sampler`: binds the sampler that will accompany the
/// *next* `shader_set_texture` call for this uniform slot (legacy HLSL-era
/// convention of pairing a sampler register to the texture register it
/// precedes).
#[no_mangle]
pub extern "C" fn shader_set_next_sampler(handle: GsHandle, index: u32, sampler: GsHandle) -> bool {
    if handle.is_null() || !resolve_shader_kind(handle) {
        return false;
    }
    let device = unsafe { &mut *handle.device };
    let Some(shader) = device.shaders.get_mut(handle.raw) else {
        return false;
    };
    let Some(runtime) = shader.uniform_runtime.get_mut(index as usize) else {
        return false;
    };
    runtime.sampler_handle = if sampler.is_null() { None } else { Some(sampler.raw) };
    true
}

/// `shader_set_val`/`shader_set_default`: resets a uniform to its
/// shader-declared default value by zeroing its scratch bytes (the
/// transpiler does not currently carry the parsed default payload through
/// to runtime — `UniformDecl::default_value` is produced by the external
/// parser but not yet threaded into `UniformLayoutEntry` — so these degrade
/// to a documented zero-fill rather than the literal declared default).
#[no_mangle]
pub extern "C" fn shader_set_default(handle: GsHandle, index: u32) -> bool {
    if handle.is_null() || !resolve_shader_kind(handle) {
        return false;
    }
    let device = unsafe { &mut *handle.device };
    let Some(shader) = device.shaders.get_mut(handle.raw) else {
        return false;
    };
    let Some(entry) = shader.uniform_layout.get(index as usize).cloned() else {
        return false;
    };
    let size = entry.semantic_type.byte_size().min(shader.uniform_scratch.len() - entry.byte_offset);
    shader.uniform_scratch[entry.byte_offset..entry.byte_offset + size].fill(0);
    shader.uniform_runtime[index as usize].dirty = true;
    true
}

#[no_mangle]
pub extern "C" fn shader_set_val(handle: GsHandle, index: u32, data: *const u8, len: usize) -> bool {
    if data.is_null() {
        return false;
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    shader_set_uniform_bytes(handle, index, bytes)
}

/// `device_get_viewproj_matrix`/`device_get_world_matrix` (spec §6).
#[no_mangle]
pub extern "C" fn device_get_viewproj_matrix(device: *mut Device, out: *mut [f32; 16]) {
    ffi_guard((), || {
        let (Some(device), false) = (unsafe { device_mut(device) }, out.is_null()) else {
            return;
        };
        unsafe {
            *out = device.state.projection;
        }
    });
}

#[no_mangle]
pub extern "C" fn device_get_world_matrix(device: *mut Device, out: *mut [f32; 16]) {
    ffi_guard((), || {
        let (Some(device), false) = (unsafe { device_mut(device) }, out.is_null()) else {
            return;
        };
        unsafe {
            *out = device.state.world_matrix;
        }
    });
}

#[no_mangle]
pub extern "C" fn device_set_world_matrix(device: *mut Device, m: *const [f32; 16]) {
    ffi_guard((), || {
        let (Some(device), Some(m)) = (unsafe { device_mut(device) }, unsafe { m.as_ref() }) else {
            return;
        };
        device.set_world_matrix(*m);
    });
}

// ---------------------------------------------------------------------
// Swap chains (spec §6 "Swap chains")
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn device_swapchain_create(device: *mut Device, native_view: *mut c_void, width: u32, height: u32, format: u32) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        let Some(format) = color_format_from_u32(format) else {
            return GsHandle::NULL;
        };
        match SwapChain::new(&device.metal_device, native_view, width, height, format) {
            Ok(sc) => {
                let raw = device.resources.swapchains.insert(sc);
                GsHandle::new(device as *mut Device, ResourceKind::Swapchain, raw)
            }
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn gs_swapchain_destroy(handle: GsHandle) {
    ffi_guard((), || {
        if handle.is_null() || handle.kind != ResourceKind::Swapchain as u8 {
            return;
        }
        let device = unsafe { &mut *handle.device };
        device.resources.swapchains.remove(handle.raw);
    });
}

/// `device_load_swapchain`: acquires the next drawable and rebinds the
/// device's color render target to it (spec §3 `load_swapchain`).
#[no_mangle]
pub extern "C" fn device_load_swapchain(device: *mut Device, handle: GsHandle) -> GsHandle {
    ffi_guard(GsHandle::NULL, || {
        let Some(device) = (unsafe { device_mut(device) }) else {
            return GsHandle::NULL;
        };
        if handle.is_null() || handle.kind != ResourceKind::Swapchain as u8 {
            return crate::error::soft(GsError::InvalidHandle("swapchain"), GsHandle::NULL);
        }
        let Some(sc) = device.resources.swapchains.get_mut(handle.raw) else {
            return crate::error::soft(GsError::InvalidHandle("swapchain"), GsHandle::NULL);
        };
        match sc.acquire_next_drawable() {
            Ok(_texture) => GsHandle::NULL,
            Err(e) if e.is_fatal() => crate::error::fatal(e),
            Err(e) => crate::error::soft(e, GsHandle::NULL),
        }
    })
}

#[no_mangle]
pub extern "C" fn device_resize(handle: GsHandle, width: u32, height: u32) {
    ffi_guard((), || {
        if handle.is_null() || handle.kind != ResourceKind::Swapchain as u8 {
            return;
        }
        let device = unsafe { &mut *handle.device };
        if let Some(sc) = device.resources.swapchains.get_mut(handle.raw) {
            sc.resize(width, height);
        }
    });
}

#[no_mangle]
pub extern "C" fn device_get_size(handle: GsHandle, out_width: *mut u32, out_height: *mut u32) {
    ffi_guard((), || {
        if handle.is_null() || handle.kind != ResourceKind::Swapchain as u8 || out_width.is_null() || out_height.is_null() {
            return;
        }
        let device = unsafe { &*handle.device };
        if let Some(sc) = device.resources.swapchains.get(handle.raw) {
            unsafe {
                *out_width = sc.width;
                *out_height = sc.height;
            }
        }
    });
}

#[no_mangle]
pub extern "C" fn device_get_width(handle: GsHandle) -> u32 {
    if handle.is_null() || handle.kind != ResourceKind::Swapchain as u8 {
        return 0;
    }
    let device = unsafe { &*handle.device };
    device.resources.swapchains.get(handle.raw).map(|s| s.width).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn device_get_height(handle: GsHandle) -> u32 {
    if handle.is_null() || handle.kind != ResourceKind::Swapchain as u8 {
        return 0;
    }
    let device = unsafe { &*handle.device };
    device.resources.swapchains.get(handle.raw).map(|s| s.height).unwrap_or(0)
}

// ---------------------------------------------------------------------
// Capability probes (spec §6)
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn device_shared_texture_available(_device: *mut Device) -> bool {
    true
}

#[no_mangle]
pub extern "C" fn device_is_monitor_hdr(_device: *mut Device) -> bool {
    false
}

#[no_mangle]
pub extern "C" fn device_get_color_space(_device: *mut Device) -> u32 {
    0
}

#[no_mangle]
pub extern "C" fn device_update_color_space(_device: *mut Device) {}

// ---------------------------------------------------------------------
// Stubs (spec §6 "Stubs"): timers, debug markers
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn device_timer_create(_device: *mut Device) -> GsHandle {
    GsHandle::NULL
}

#[no_mangle]
pub extern "C" fn device_timer_destroy(_handle: GsHandle) {}

#[no_mangle]
pub extern "C" fn device_timer_begin(_handle: GsHandle) {}

#[no_mangle]
pub extern "C" fn device_timer_end(_handle: GsHandle) {}

#[no_mangle]
pub extern "C" fn device_timer_get_result(_handle: GsHandle, _out_nanoseconds: *mut u64) -> bool {
    false
}

#[no_mangle]
pub extern "C" fn device_push_debug_marker(_device: *mut Device, _name: *const c_char) {}

#[no_mangle]
pub extern "C" fn device_pop_debug_marker(_device: *mut Device) {}
