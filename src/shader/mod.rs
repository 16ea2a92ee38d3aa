//! HLSL-like -> MSL shader transpiler (spec §4.4).
//!
//! Entry point: [`compile`]. Consumes a pre-tokenized [`ir::ShaderProgram`]
//! (the lexer/parser that produces it is out of scope, spec §1) and produces
//! MSL source text plus the binding metadata the device layer needs to build
//! pipeline descriptors (spec §4.4 Stage 7, §4.5).

pub mod analyze;
pub mod emit;
pub mod intrinsics;
pub mod ir;
pub mod layout;

use crate::error::{GsError, GsResult};
use ir::{ShaderKind, ShaderProgram};

/// The compiled result of one shader compilation unit: MSL source text plus
/// everything the pipeline builder needs to wire it into a
/// `MTLRenderPipelineDescriptor` (spec §4.4 Stage 7).
#[derive(Debug, Clone)]
pub struct ShaderMetadata {
    pub kind: ShaderKind,
    pub msl_source: String,
    pub entry_point: String,
    pub uniform_layout: Vec<layout::UniformLayoutEntry>,
    pub uniform_block_size: usize,
    pub vertex_attributes: Vec<layout::VertexAttribute>,
    pub streams_consumed: Vec<layout::VertexStream>,
    pub sampler_descriptors: Vec<layout::SamplerDescriptor>,
}

/// Runs the full transpiler pipeline (spec §4.4 Stages 1-7) over a
/// pre-parsed program, producing MSL text and binding metadata.
///
/// Returns `GsError::MalformedShader` if the program references an
/// unsupported type or intrinsic (spec §7: malformed shader input is a soft
/// failure, surfaced to the caller rather than aborting).
pub fn compile(program: &ShaderProgram) -> GsResult<ShaderMetadata> {
    validate_program(program)?;

    // Stage 1-3: classification and call-graph propagation.
    let uniform_classes = analyze::classify_uniforms(program);
    let struct_usage = analyze::classify_structs(program);
    let function_infos = analyze::analyze_function_bodies(program, &uniform_classes);

    // Stage 4 + Stage 7 (uniform half): byte layout and texture slots.
    let (uniform_layout, uniform_block_size) = layout::layout_uniforms(program, &uniform_classes);

    // Stage 7 (vertex/sampler halves).
    let (vertex_attributes, streams_consumed) = if program.kind == ShaderKind::Vertex {
        layout::vertex_layout(program)
    } else {
        (Vec::new(), Vec::new())
    };
    let sampler_descriptors = layout::sampler_descriptors(program);

    // Stage 5-6: MSL text emission.
    let ctx = emit::EmitContext {
        program,
        uniform_classes: &uniform_classes,
        struct_usage: &struct_usage,
        function_infos: &function_infos,
    };

    let mut msl_source = String::new();
    msl_source.push_str("#include <metal_stdlib>\n#include <simd/simd.h>\nusing namespace metal;\n\n");
    msl_source.push_str(&emit::emit_uniform_struct(&uniform_layout));
    msl_source.push_str(&emit::emit_structs(&ctx));

    let entry_point = format!("{}_main", main_name(program)?);
    msl_source.push_str(&emit_functions(&ctx, &function_infos, &uniform_layout, &entry_point)?);

    Ok(ShaderMetadata {
        kind: program.kind,
        msl_source,
        entry_point,
        uniform_layout,
        uniform_block_size,
        vertex_attributes,
        streams_consumed,
        sampler_descriptors,
    })
}

fn main_name(program: &ShaderProgram) -> GsResult<&str> {
    program
        .functions
        .iter()
        .find(|f| f.name == "main")
        .map(|f| f.name.as_str())
        .ok_or_else(|| GsError::MalformedShader("shader has no `main` entry point".to_string()))
}

fn validate_program(program: &ShaderProgram) -> GsResult<()> {
    emit::validate_no_clip(program)?;
    let mut type_names: Vec<String> = Vec::new();
    for f in &program.functions {
        type_names.push(f.return_type.clone());
        for p in &f.parameters {
            type_names.push(p.type_name.clone());
        }
    }
    for s in &program.structs {
        for f in &s.fields {
            type_names.push(f.type_name.clone());
        }
    }
    for u in &program.uniforms {
        type_names.push(u.type_name.clone());
    }
    emit::validate_types(type_names)
}

/// Emits every function declaration as MSL (spec §4.4 Stage 6), including
/// the `_main` entry point wrapper.
fn emit_functions(
    ctx: &emit::EmitContext<'_>,
    function_infos: &[(String, analyze::FunctionInfo)],
    uniform_layout: &[layout::UniformLayoutEntry],
    entry_point: &str,
) -> GsResult<String> {
    let has_uniform_block = uniform_layout
        .iter()
        .any(|e| e.semantic_type != layout::SemanticType::Texture);

    let mut out = String::new();
    for func in &ctx.program.functions {
        let info = function_infos
            .iter()
            .find(|(n, _)| n == &func.name)
            .map(|(_, i)| i)
            .cloned()
            .unwrap_or_default();

        let is_main = func.name == "main";
        let signature = emit_signature(ctx, func, &info, is_main, entry_point, has_uniform_block);
        out.push_str(&signature);
        out.push_str(" {\n");

        let wrap_return = is_main
            && ctx.program.kind == ShaderKind::Fragment
            && func.return_type == "float3";
        let body_tokens = &ctx.program.tokens[func.body.clone()];
        out.push_str(&emit::rewrite_tokens(ctx, body_tokens, wrap_return));
        out.push_str("\n}\n\n");
    }
    Ok(out)
}

fn emit_signature(
    ctx: &emit::EmitContext<'_>,
    func: &ir::FunctionDecl,
    info: &analyze::FunctionInfo,
    is_main: bool,
    entry_point: &str,
    has_uniform_block: bool,
) -> String {
    let return_type = msl_return_type(ctx, func);
    let name = if is_main {
        entry_point.to_string()
    } else {
        func.name.clone()
    };

    let stage_attr = if is_main {
        match ctx.program.kind {
            ShaderKind::Vertex => " [[vertex]]",
            ShaderKind::Fragment => " [[fragment]]",
        }
    } else {
        ""
    };

    let mut params: Vec<String> = Vec::new();
    for (i, p) in func.parameters.iter().enumerate() {
        let ty = param_type(ctx, p);
        if is_main && i == 0 {
            params.push(format!("{ty} {} [[stage_in]]", p.name));
        } else {
            params.push(format!("{ty} {}", p.name));
        }
    }

    if info.requires_uniforms || (is_main && has_uniform_block) {
        if is_main {
            params.push("constant UniformData &uniforms [[buffer(30)]]".to_string());
        } else {
            params.push("constant UniformData &uniforms".to_string());
        }
    }

    let mut texture_slot = 0u32;
    for tex in &info.textures {
        if is_main {
            params.push(format!("texture2d<float> {tex} [[texture({texture_slot})]]"));
        } else {
            params.push(format!("texture2d<float> {tex}"));
        }
        texture_slot += 1;
    }
    let mut sampler_slot = 0u32;
    for samp in &info.samplers {
        if is_main {
            params.push(format!("sampler {samp} [[sampler({sampler_slot})]]"));
        } else {
            params.push(format!("sampler {samp}"));
        }
        sampler_slot += 1;
    }

    format!(
        "{return_type} {name}({}){stage_attr}",
        params.join(", ")
    )
}

fn msl_return_type(ctx: &emit::EmitContext<'_>, func: &ir::FunctionDecl) -> String {
    if ctx.struct_usage.iter().any(|(n, u)| n == &func.return_type && u.both()) {
        format!("{}_Out", func.return_type)
    } else {
        intrinsics::remap_type_keyword(&func.return_type)
            .unwrap_or(None)
            .map(str::to_string)
            .unwrap_or_else(|| func.return_type.clone())
    }
}

fn param_type(ctx: &emit::EmitContext<'_>, p: &ir::Parameter) -> String {
    let base = if ctx.struct_usage.iter().any(|(n, u)| n == &p.type_name && u.both()) {
        format!("{}_In", p.type_name)
    } else {
        intrinsics::remap_type_keyword(&p.type_name)
            .unwrap_or(None)
            .map(str::to_string)
            .unwrap_or_else(|| p.type_name.clone())
    };
    base
}
