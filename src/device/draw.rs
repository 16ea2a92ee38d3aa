//! `draw()` and the clear-to-render-pass machinery (spec §4.6 steps 1-11,
//! §8 scenario 1 "clear-only present").

use super::{clear_flags, Device, PendingClear};
use crate::error::{GsError, GsResult};
use crate::handle::RawHandle;
use crate::pipeline::{self, GraphicsPipelineDescriptor};
use crate::resources::SwapChain;
use crate::shader::layout::VertexStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

impl Primitive {
    fn metal_type(self) -> metal::MTLPrimitiveType {
        match self {
            Primitive::TriangleList => metal::MTLPrimitiveType::Triangle,
            Primitive::TriangleStrip => metal::MTLPrimitiveType::TriangleStrip,
            Primitive::LineList => metal::MTLPrimitiveType::Line,
            Primitive::LineStrip => metal::MTLPrimitiveType::LineStrip,
            Primitive::PointList => metal::MTLPrimitiveType::Point,
        }
    }
}

/// Pops the pending-clear FIFO's head if it targets `render_target` (spec
/// §4.6 step 4 / §8 "pending-clear ordering"). Entries for other targets are
/// left untouched, preserving interleaving order.
fn take_matching_clear(
    pending: &mut std::collections::VecDeque<PendingClear>,
    render_target: Option<RawHandle>,
) -> Option<PendingClear> {
    if pending.front()?.render_target == render_target {
        pending.pop_front()
    } else {
        None
    }
}

fn build_render_pass_descriptor(
    color_texture: &metal::TextureRef,
    depth_stencil_texture: Option<(&metal::TextureRef, crate::format::DepthStencilFormat)>,
    clear: Option<&PendingClear>,
) -> metal::RenderPassDescriptor {
    let desc = metal::RenderPassDescriptor::new();
    let color = desc.color_attachments().object_at(0);
    color.set_texture(Some(color_texture));

    let clear_color_flag = clear.map(|c| c.flags & clear_flags::COLOR != 0).unwrap_or(false);
    if clear_color_flag {
        let c = clear.unwrap().color;
        color.set_load_action(metal::MTLLoadAction::Clear);
        color.set_clear_color(metal::MTLClearColor::new(
            c[0] as f64,
            c[1] as f64,
            c[2] as f64,
            c[3] as f64,
        ));
    } else {
        color.set_load_action(metal::MTLLoadAction::Load);
    }
    color.set_store_action(metal::MTLStoreAction::Store);

    if let Some((ds_texture, ds_format)) = depth_stencil_texture {
        if ds_format.has_depth() {
            let depth = desc.depth_attachment();
            depth.set_texture(Some(ds_texture));
            let clear_depth_flag = clear.map(|c| c.flags & clear_flags::DEPTH != 0).unwrap_or(false);
            if clear_depth_flag {
                depth.set_load_action(metal::MTLLoadAction::Clear);
                depth.set_clear_depth(clear.unwrap().depth as f64);
            } else {
                depth.set_load_action(metal::MTLLoadAction::Load);
            }
            depth.set_store_action(metal::MTLStoreAction::Store);
        }
        if ds_format.has_stencil() {
            let stencil = desc.stencil_attachment();
            stencil.set_texture(Some(ds_texture));
            let clear_stencil_flag = clear.map(|c| c.flags & clear_flags::STENCIL != 0).unwrap_or(false);
            if clear_stencil_flag {
                stencil.set_load_action(metal::MTLLoadAction::Clear);
                stencil.set_clear_stencil(clear.unwrap().stencil);
            } else {
                stencil.set_load_action(metal::MTLLoadAction::Load);
            }
            stencil.set_store_action(metal::MTLStoreAction::Store);
        }
    }

    desc
}

/// spec §4.6 `present`: "Metal requires at least one encoder touching the
/// drawable" — when the frame issued zero draws, run an encoder whose sole
/// purpose is to flush the synthesized clear.
pub fn flush_clear_only_pass(
    device: &mut Device,
    command_buffer: &metal::CommandBufferRef,
    swapchain: &mut SwapChain,
) -> GsResult<()> {
    let drawable_texture = swapchain.acquire_next_drawable()?;
    let clear = take_matching_clear(&mut device.state.pending_clears, device.state.render_target);
    let pass = build_render_pass_descriptor(drawable_texture, None, clear.as_ref());
    let encoder = command_buffer.new_render_command_encoder(&pass);
    #[cfg(debug_assertions)]
    encoder.set_label("gs-metal: synthesized clear-only pass");
    encoder.end_encoding();
    Ok(())
}

impl Device {
    /// spec §4.6 `draw(primitive, start, count)`.
    pub fn draw(&mut self, primitive: Primitive, start: u32, count: u32) -> GsResult<()> {
        // Step 1: tolerate degenerate host call orders.
        let Some(command_buffer) = self.command_buffer.as_ref().map(|cb| cb.to_owned()) else {
            return Ok(());
        };

        // Step 2: required bindings.
        let vertex_buffer_handle = self.state.vertex_buffer.ok_or_else(|| {
            GsError::ContractViolation("draw with no bound vertex buffer".to_string())
        })?;
        let vertex_shader_handle = self
            .state
            .vertex_shader
            .ok_or_else(|| GsError::ContractViolation("draw with no bound vertex shader".to_string()))?;
        let fragment_shader_handle = self.state.fragment_shader.ok_or_else(|| {
            GsError::ContractViolation("draw with no bound fragment shader".to_string())
        })?;
        let render_target_handle = self
            .state
            .render_target
            .ok_or_else(|| GsError::ContractViolation("draw with no bound render target".to_string()))?;

        let (render_target_texture, color_format) = {
            let tex = self
                .resources
                .textures
                .get(render_target_handle)
                .ok_or_else(|| GsError::InvalidHandle("render target texture"))?;
            (tex.handle.clone(), tex.format)
        };
        let depth_stencil = self.state.depth_stencil_target.and_then(|h| {
            self.resources
                .depth_stencil_textures
                .get(h)
                .map(|d| (d.handle.clone(), d.format))
        });

        // Step 3: resolve pipeline state.
        let vertex_layout_fp = {
            let vs = self
                .shaders
                .get(vertex_shader_handle)
                .ok_or_else(|| GsError::InvalidHandle("vertex shader"))?;
            pipeline::vertex_layout_fingerprint(&vs.vertex_attributes)
        };
        let descriptor = GraphicsPipelineDescriptor {
            vertex_shader: vertex_shader_handle,
            fragment_shader: fragment_shader_handle,
            blend: self.state.blend,
            depth_stencil: self.state.depth_stencil,
            cull_mode: self.state.cull_mode,
            fill_mode: self.state.fill_mode,
            front_face_ccw: self.state.front_face_ccw,
            color_format,
            depth_stencil_format: depth_stencil.as_ref().map(|(_, f)| *f),
            sample_count: 1,
            vertex_layout_fingerprint: vertex_layout_fp,
        };

        let metal_device = self.metal_device.clone();
        let cache = &self.pipeline_cache;
        let shaders = &self.shaders;
        let compiled = cache.get_or_create(&descriptor, || {
            let vs = shaders
                .get(vertex_shader_handle)
                .ok_or_else(|| GsError::InvalidHandle("vertex shader"))?;
            let fs = shaders
                .get(fragment_shader_handle)
                .ok_or_else(|| GsError::InvalidHandle("fragment shader"))?;
            let vertex_descriptor = build_vertex_descriptor(&vs.vertex_attributes);
            pipeline::build_pipeline(
                &metal_device,
                &descriptor,
                &vs.library,
                &vs.entry_point,
                &fs.library,
                &fs.entry_point,
                &vertex_descriptor,
            )
        })?;

        // Step 4: pending-clear semantics.
        let clear = take_matching_clear(&mut self.state.pending_clears, Some(render_target_handle));

        // Step 5: render command encoder + fixed-function state.
        let pass = build_render_pass_descriptor(
            &render_target_texture,
            depth_stencil.as_ref().map(|(t, f)| (&**t, *f)),
            clear.as_ref(),
        );
        let encoder = command_buffer.new_render_command_encoder(&pass);
        #[cfg(debug_assertions)]
        encoder.set_label(&format!("gs-metal: draw onto target {:?}", render_target_handle));
        encoder.set_render_pipeline_state(&compiled.render_pipeline_state);
        encoder.set_depth_stencil_state(&compiled.depth_stencil_state);
        encoder.set_viewport(metal::MTLViewport {
            originX: self.state.viewport.x as f64,
            originY: self.state.viewport.y as f64,
            width: self.state.viewport.width as f64,
            height: self.state.viewport.height as f64,
            znear: self.state.viewport.znear as f64,
            zfar: self.state.viewport.zfar as f64,
        });
        encoder.set_front_facing_winding(if self.state.front_face_ccw {
            metal::MTLWinding::CounterClockwise
        } else {
            metal::MTLWinding::Clockwise
        });
        encoder.set_cull_mode(pipeline_cull_mode(self.state.cull_mode));
        encoder.set_triangle_fill_mode(pipeline_fill_mode(self.state.fill_mode));
        if self.state.scissor_enabled {
            encoder.set_scissor_rect(metal::MTLScissorRect {
                x: self.state.scissor.x as u64,
                y: self.state.scissor.y as u64,
                width: self.state.scissor.width as u64,
                height: self.state.scissor.height as u64,
            });
        }

        // Step 6: view-projection matrix into the vertex shader's uniform.
        let view_projection = multiply_4x4(&self.state.projection, &self.state.world_matrix);
        if let Some(vs) = self.shaders.get_mut(vertex_shader_handle) {
            if let Some(idx) = vs.find_uniform("ViewProj") {
                write_mat4(&mut vs.uniform_scratch, vs.uniform_layout[idx].byte_offset, &view_projection);
                vs.uniform_runtime[idx].dirty = false;
            }
        }

        // Step 7 + 8: flush dirty non-texture uniforms, bind texture
        // uniforms, upload uniform blocks.
        upload_shader_uniforms(
            &self.resources,
            self.shaders.get_mut(vertex_shader_handle),
            &self.transient_pool,
            encoder,
            true,
        );
        upload_shader_uniforms(
            &self.resources,
            self.shaders.get_mut(fragment_shader_handle),
            &self.transient_pool,
            encoder,
            false,
        );

        // Step 9: bind vertex streams.
        let streams_consumed = self
            .shaders
            .get(vertex_shader_handle)
            .map(|vs| vs.streams_consumed.clone())
            .unwrap_or_default();
        let vbuf = self
            .resources
            .vertex_buffers
            .get_mut(vertex_buffer_handle)
            .ok_or_else(|| GsError::InvalidHandle("vertex buffer"))?;
        for (i, stream) in streams_consumed.iter().enumerate() {
            if i >= vbuf.streams.len() {
                return Err(GsError::ContractViolation(format!(
                    "vertex buffer missing stream {stream:?} required by shader"
                )));
            }
            let buffer = vbuf.resolve_stream(i, &self.transient_pool)?;
            encoder.set_vertex_buffer(i as u64, Some(&buffer), 0);
        }

        // Step 10: bind textures/samplers to the fragment stage.
        for (slot, tex_handle) in self.state.bound_textures.iter().enumerate() {
            if let Some(h) = tex_handle {
                if let Some(tex) = self.resources.textures.get(*h) {
                    encoder.set_fragment_texture(slot as u64, Some(&tex.handle));
                }
            }
        }
        for (slot, samp_handle) in self.state.bound_samplers.iter().enumerate() {
            if let Some(h) = samp_handle {
                if let Some(samp) = self.resources.samplers.get(*h) {
                    encoder.set_fragment_sampler_state(slot as u64, Some(&samp.handle));
                }
            }
        }

        // Step 11: issue the draw.
        if let Some(index_handle) = self.state.index_buffer {
            let ibuf = self
                .resources
                .index_buffers
                .get_mut(index_handle)
                .ok_or_else(|| GsError::InvalidHandle("index buffer"))?;
            let draw_count = if count == 0 { ibuf.index_count as u32 } else { count };
            let index_buffer = ibuf.resolve(&self.transient_pool)?;
            encoder.draw_indexed_primitives(
                primitive.metal_type(),
                draw_count as u64,
                ibuf.format.metal_type(),
                &index_buffer,
                (start as usize * ibuf.format.stride()) as u64,
            );
        } else {
            encoder.draw_primitives(primitive.metal_type(), start as u64, count as u64);
        }
        encoder.end_encoding();
        self.state.frame_draw_count += 1;

        Ok(())
    }
}

fn pipeline_cull_mode(mode: crate::pipeline::CullMode) -> metal::MTLCullMode {
    match mode {
        crate::pipeline::CullMode::None => metal::MTLCullMode::None,
        crate::pipeline::CullMode::Front => metal::MTLCullMode::Front,
        crate::pipeline::CullMode::Back => metal::MTLCullMode::Back,
    }
}

fn pipeline_fill_mode(mode: crate::pipeline::FillMode) -> metal::MTLTriangleFillMode {
    match mode {
        crate::pipeline::FillMode::Fill => metal::MTLTriangleFillMode::Fill,
        crate::pipeline::FillMode::Line => metal::MTLTriangleFillMode::Lines,
    }
}

fn build_vertex_descriptor(attributes: &[crate::shader::layout::VertexAttribute]) -> metal::VertexDescriptor {
    let descriptor = metal::VertexDescriptor::new();
    for attr in attributes {
        let msl_attr = descriptor.attributes().object_at(attr.attribute_index as u64);
        msl_attr.set_format(match attr.components {
            1 => metal::MTLVertexFormat::Float,
            2 => metal::MTLVertexFormat::Float2,
            3 => metal::MTLVertexFormat::Float3,
            _ => metal::MTLVertexFormat::Float4,
        });
        msl_attr.set_buffer_index(attr.buffer_index as u64);
        msl_attr.set_offset(0);

        let layout = descriptor.layouts().object_at(attr.buffer_index as u64);
        layout.set_stride(attr.stride as u64);
        layout.set_step_function(metal::MTLVertexStepFunction::PerVertex);
    }
    descriptor
}

fn write_mat4(scratch: &mut [u8], offset: usize, m: &[f32; 16]) {
    let bytes = bytemuck::bytes_of(m);
    scratch[offset..offset + 64].copy_from_slice(bytes);
}

fn multiply_4x4(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for row in 0..4 {
        for col in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[row * 4 + k] * b[k * 4 + col];
            }
            out[row * 4 + col] = sum;
        }
    }
    out
}

/// Step 7 + 8: for each non-texture uniform marked `dirty`, copy its value
/// into the shader's scratch buffer; for texture uniforms, bind the texture
/// (and sampler, if assigned). Then upload the uniform block: inline via
/// `set_bytes` under 4096 bytes, else through a transient pool buffer.
fn upload_shader_uniforms(
    resources: &crate::resources::ResourceTables,
    shader: Option<&mut super::Shader>,
    pool: &crate::pool::TransientBufferPool,
    encoder: &metal::RenderCommandEncoderRef,
    is_vertex: bool,
) {
    let Some(shader) = shader else { return };
    if !shader.requires_uniform_block() {
        return;
    }

    const INLINE_THRESHOLD: usize = 4096;
    if shader.uniform_block_size < INLINE_THRESHOLD {
        if is_vertex {
            encoder.set_vertex_bytes(30, shader.uniform_block_size as u64, shader.uniform_scratch.as_ptr() as *const _);
        } else {
            encoder.set_fragment_bytes(30, shader.uniform_block_size as u64, shader.uniform_scratch.as_ptr() as *const _);
        }
    } else {
        let buffer = pool.get_buffer_for_size(shader.uniform_block_size);
        unsafe {
            std::ptr::copy_nonoverlapping(
                shader.uniform_scratch.as_ptr(),
                buffer.contents() as *mut u8,
                shader.uniform_block_size,
            );
        }
        if is_vertex {
            encoder.set_vertex_buffer(30, Some(&buffer), 0);
        } else {
            encoder.set_fragment_buffer(30, Some(&buffer), 0);
        }
    }

    for (idx, entry) in shader.uniform_layout.iter().enumerate() {
        if entry.semantic_type == crate::shader::layout::SemanticType::Texture {
            let runtime = &shader.uniform_runtime[idx];
            if let Some(slot) = entry.texture_slot {
                if let Some(tex_handle) = runtime.texture_handle {
                    if let Some(tex) = resources.textures.get(tex_handle) {
                        if is_vertex {
                            encoder.set_vertex_texture(slot as u64, Some(&tex.handle));
                        } else {
                            encoder.set_fragment_texture(slot as u64, Some(&tex.handle));
                        }
                    }
                }
                if let Some(samp_handle) = runtime.sampler_handle {
                    if let Some(samp) = resources.samplers.get(samp_handle) {
                        if is_vertex {
                            encoder.set_vertex_sampler_state(slot as u64, Some(&samp.handle));
                        } else {
                            encoder.set_fragment_sampler_state(slot as u64, Some(&samp.handle));
                        }
                    }
                }
            }
        }
    }
}

/// Used by `streams_for_shader` diagnostics (spec §4.3 `buffers_for_shader`).
pub fn stream_name(stream: VertexStream) -> String {
    crate::shader::layout::stream_semantic_name(stream)
}
