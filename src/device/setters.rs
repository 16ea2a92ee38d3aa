//! Immediate-mode state setters (spec §4.6): ~150 distinct host entry points
//! reduced to the orthogonal state they actually mutate. Grouped the way the
//! host groups them in spec §6 — blend, depth/stencil, rasterizer, viewport/
//! scissor, projection, render target.

use super::{Device, ScissorRect, Viewport};
use crate::error::{GsError, GsResult};
use crate::handle::RawHandle;
use crate::pipeline::{BlendFactor, BlendOp, CompareFunction, CullMode, DepthCompareWrapper, FillMode, StencilFaceState, StencilOp};

impl Device {
    // -- Blend state -----------------------------------------------------

    pub fn set_blend_enabled(&mut self, enabled: bool) {
        self.state.blend.enabled = enabled;
    }

    pub fn set_blend_func(&mut self, src_color: BlendFactor, dst_color: BlendFactor) {
        self.state.blend.src_color = src_color;
        self.state.blend.dst_color = dst_color;
    }

    pub fn set_blend_func_separate(
        &mut self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.state.blend.src_color = src_color;
        self.state.blend.dst_color = dst_color;
        self.state.blend.src_alpha = src_alpha;
        self.state.blend.dst_alpha = dst_alpha;
    }

    pub fn set_blend_op(&mut self, op: BlendOp) {
        self.state.blend.color_op = op;
        self.state.blend.alpha_op = op;
    }

    pub fn set_blend_op_separate(&mut self, color_op: BlendOp, alpha_op: BlendOp) {
        self.state.blend.color_op = color_op;
        self.state.blend.alpha_op = alpha_op;
    }

    /// `mask` is the low 4 bits, R/G/B/A (spec §4.6 "color write mask").
    pub fn set_color_write_mask(&mut self, mask: u8) {
        self.state.blend.write_mask = mask & 0b1111;
    }

    // -- Depth/stencil state ----------------------------------------------

    pub fn set_depth_test_enabled(&mut self, enabled: bool) {
        self.state.depth_stencil.depth_test_enabled = enabled;
    }

    pub fn set_depth_write_enabled(&mut self, enabled: bool) {
        self.state.depth_stencil.depth_write_enabled = enabled;
    }

    pub fn set_depth_compare(&mut self, compare: CompareFunction) {
        self.state.depth_stencil.depth_compare = Some(DepthCompareWrapper(compare));
    }

    pub fn set_stencil_test_enabled(&mut self, enabled: bool) {
        self.state.depth_stencil.stencil_test_enabled = enabled;
    }

    pub fn set_stencil_masks(&mut self, read_mask: u8, write_mask: u8) {
        self.state.depth_stencil.stencil_read_mask = read_mask;
        self.state.depth_stencil.stencil_write_mask = write_mask;
    }

    pub fn set_stencil_func_front(&mut self, compare: CompareFunction) {
        self.state.depth_stencil.front_face.compare = compare;
    }

    pub fn set_stencil_func_back(&mut self, compare: CompareFunction) {
        self.state.depth_stencil.back_face.compare = compare;
    }

    pub fn set_stencil_ops_front(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        set_stencil_face_ops(&mut self.state.depth_stencil.front_face, fail, depth_fail, pass);
    }

    pub fn set_stencil_ops_back(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        set_stencil_face_ops(&mut self.state.depth_stencil.back_face, fail, depth_fail, pass);
    }

    // -- Rasterizer state --------------------------------------------------

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.cull_mode = mode;
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) {
        self.state.fill_mode = mode;
    }

    pub fn set_front_face_ccw(&mut self, ccw: bool) {
        self.state.front_face_ccw = ccw;
    }

    // -- Viewport / scissor -------------------------------------------------

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    pub fn set_scissor_enabled(&mut self, enabled: bool) {
        self.state.scissor_enabled = enabled;
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.state.scissor = rect;
    }

    // -- Projection / world matrices --------------------------------------

    /// Spec §4.6: "`ortho`/`frustum` matrix builders that write directly
    /// into `state.projection`". Column-major, right-handed, matching the
    /// `ViewProj` uniform convention written in `draw::draw`.
    pub fn set_projection_ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.state.projection = ortho(left, right, bottom, top, near, far);
    }

    pub fn set_projection_frustum(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.state.projection = frustum(left, right, bottom, top, near, far);
    }

    pub fn set_projection_matrix(&mut self, matrix: [f32; 16]) {
        self.state.projection = matrix;
    }

    pub fn set_world_matrix(&mut self, matrix: [f32; 16]) {
        self.state.world_matrix = matrix;
    }

    /// Pushes the *current* projection matrix onto the LIFO.
    pub fn push_projection(&mut self) {
        self.state.projection_stack.push(self.state.projection);
    }

    /// Pops the LIFO into the current projection matrix (spec §9: assert in
    /// debug, log-and-identity in release on underflow).
    pub fn pop_projection(&mut self) {
        self.state.projection = self.state.projection_stack.pop();
    }

    pub fn projection_stack_depth(&self) -> usize {
        self.state.projection_stack.depth()
    }

    // -- Bindings -----------------------------------------------------------

    pub fn set_vertex_buffer(&mut self, handle: Option<RawHandle>) {
        self.state.vertex_buffer = handle;
    }

    pub fn set_index_buffer(&mut self, handle: Option<RawHandle>) {
        self.state.index_buffer = handle;
    }

    pub fn set_vertex_shader(&mut self, handle: Option<RawHandle>) {
        self.state.vertex_shader = handle;
    }

    pub fn set_fragment_shader(&mut self, handle: Option<RawHandle>) {
        self.state.fragment_shader = handle;
    }

    pub fn set_texture(&mut self, slot: usize, handle: Option<RawHandle>) -> GsResult<()> {
        let slot_ref = self
            .state
            .bound_textures
            .get_mut(slot)
            .ok_or_else(|| GsError::ContractViolation(format!("texture slot {slot} out of range")))?;
        *slot_ref = handle;
        Ok(())
    }

    pub fn set_sampler(&mut self, slot: usize, handle: Option<RawHandle>) -> GsResult<()> {
        let slot_ref = self
            .state
            .bound_samplers
            .get_mut(slot)
            .ok_or_else(|| GsError::ContractViolation(format!("sampler slot {slot} out of range")))?;
        *slot_ref = handle;
        Ok(())
    }

    // -- Render target ------------------------------------------------------

    /// spec §4.6: "render-target set (texture + optional depth-stencil).
    /// Setting a null render target resets the color attachment; setting a
    /// null depth-stencil resets both depth and stencil slots."
    pub fn set_render_target(&mut self, color: Option<RawHandle>, depth_stencil: Option<RawHandle>) {
        self.state.render_target = color;
        self.state.depth_stencil_target = depth_stencil;
    }

    pub fn render_target(&self) -> Option<RawHandle> {
        self.state.render_target
    }

    pub fn depth_stencil_target(&self) -> Option<RawHandle> {
        self.state.depth_stencil_target
    }
}

fn set_stencil_face_ops(face: &mut StencilFaceState, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
    face.fail_op = fail;
    face.depth_fail_op = depth_fail;
    face.pass_op = pass;
}

/// Right-handed orthographic projection, column-major storage (spec §4.6).
fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> [f32; 16] {
    let rl = right - left;
    let tb = top - bottom;
    let fn_ = far - near;
    [
        2.0 / rl, 0.0, 0.0, 0.0,
        0.0, 2.0 / tb, 0.0, 0.0,
        0.0, 0.0, -1.0 / fn_, 0.0,
        -(right + left) / rl, -(top + bottom) / tb, -near / fn_, 1.0,
    ]
}

/// Right-handed perspective frustum, column-major storage (spec §4.6).
fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> [f32; 16] {
    let rl = right - left;
    let tb = top - bottom;
    let fn_ = far - near;
    [
        2.0 * near / rl, 0.0, 0.0, 0.0,
        0.0, 2.0 * near / tb, 0.0, 0.0,
        (right + left) / rl, (top + bottom) / tb, -far / fn_, -1.0,
        0.0, 0.0, -(far * near) / fn_, 0.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ortho_maps_near_plane_center_to_origin() {
        let m = ortho(-1.0, 1.0, -1.0, 1.0, 0.0, 2.0);
        assert_eq!(m[0], 1.0);
        assert_eq!(m[5], 1.0);
    }

    #[test]
    fn frustum_is_singular_without_a_valid_range() {
        let m = frustum(-1.0, 1.0, -1.0, 1.0, 1.0, 10.0);
        assert!(m[14] != 0.0);
    }
}
