//! Transpiler stage 4 (uniform-block byte layout) and stage 7 (the metadata
//! record: uniform layout, vertex descriptor, sampler descriptors, streams
//! consumed) — spec §4.4.

use super::analyze::UniformClass;
use super::ir::{SamplerInfo, ShaderKind, ShaderProgram};

/// The semantic type of a uniform, per the data model in spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Bool,
    Int,
    IntN(u8),
    Float,
    FloatN(u8),
    Mat4,
    Texture,
}

impl SemanticType {
    /// Parses a host type name into its semantic type. Texture types are
    /// never passed here (`UniformClass::Texture` short-circuits before this
    /// is called).
    pub fn parse(type_name: &str) -> SemanticType {
        match type_name {
            "bool" => SemanticType::Bool,
            "int" => SemanticType::Int,
            "int2" => SemanticType::IntN(2),
            "int3" => SemanticType::IntN(3),
            "int4" => SemanticType::IntN(4),
            "float" => SemanticType::Float,
            "float2" => SemanticType::FloatN(2),
            "float3" => SemanticType::FloatN(3),
            "float4" => SemanticType::FloatN(4),
            "float4x4" | "matrix" => SemanticType::Mat4,
            other => {
                log::warn!("unrecognized uniform type `{other}`, treating as float");
                SemanticType::Float
            }
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            SemanticType::Bool | SemanticType::Int | SemanticType::Float => 4,
            SemanticType::IntN(n) | SemanticType::FloatN(n) => 4 * n as usize,
            SemanticType::Mat4 => 64,
            SemanticType::Texture => 0,
        }
    }

    /// MSL member type spelling for the generated `UniformData` struct.
    pub fn msl_type(self) -> &'static str {
        match self {
            SemanticType::Bool => "bool",
            SemanticType::Int => "int",
            SemanticType::IntN(2) => "int2",
            SemanticType::IntN(3) => "int3",
            SemanticType::IntN(4) => "int4",
            SemanticType::IntN(_) => unreachable!("only int2/3/4 are produced by parse()"),
            SemanticType::Float => "float",
            SemanticType::FloatN(2) => "float2",
            SemanticType::FloatN(3) => "float3",
            SemanticType::FloatN(4) => "float4",
            SemanticType::FloatN(_) => unreachable!("only float2/3/4 are produced by parse()"),
            SemanticType::Mat4 => "float4x4",
            SemanticType::Texture => unreachable!("textures are never laid out in UniformData"),
        }
    }
}

fn round_up_16(n: usize) -> usize {
    (n + 15) & !15
}

/// One entry of the metadata record's `uniform_layout` (spec §4.4 Stage 7).
#[derive(Debug, Clone)]
pub struct UniformLayoutEntry {
    pub name: String,
    pub semantic_type: SemanticType,
    pub byte_offset: usize,
    pub texture_slot: Option<u32>,
}

/// Stage 4 + Stage 7 uniform_layout/uniform_block_size: walks the
/// non-texture uniforms in declaration order, applying the "pad up to 16 if
/// the member would cross a 16-byte boundary" rule, and assigns texture
/// slots left-to-right over the texture-class uniforms.
pub fn layout_uniforms(
    program: &ShaderProgram,
    classes: &[UniformClass],
) -> (Vec<UniformLayoutEntry>, usize) {
    let mut entries = Vec::with_capacity(program.uniforms.len());
    let mut running = 0usize;
    let mut next_texture_slot = 0u32;

    for (u, class) in program.uniforms.iter().zip(classes) {
        match class {
            UniformClass::Texture => {
                entries.push(UniformLayoutEntry {
                    name: u.name.clone(),
                    semantic_type: SemanticType::Texture,
                    byte_offset: 0,
                    texture_slot: Some(next_texture_slot),
                });
                next_texture_slot += 1;
            }
            UniformClass::Uniform => {
                let ty = SemanticType::parse(&u.type_name);
                let mut size = ty.byte_size();
                if let Some(count) = u.array_count {
                    size *= count as usize;
                }
                if running % 16 != 0 && (running % 16) + size > 16 {
                    running = round_up_16(running);
                }
                let offset = running;
                running += size;
                entries.push(UniformLayoutEntry {
                    name: u.name.clone(),
                    semantic_type: ty,
                    byte_offset: offset,
                    texture_slot: None,
                });
            }
        }
    }

    (entries, round_up_16(running))
}

/// A single attribute of the vertex input descriptor (spec §4.4 Stage 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStream {
    Position,
    Normal,
    Tangent,
    Color,
    Texcoord(u32),
}

#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub stream: VertexStream,
    pub attribute_index: u32,
    pub buffer_index: u32,
    /// Component count of the MSL vector format (`float4`, `float2`, ...).
    pub components: u8,
    pub stride: usize,
}

/// Stage 7 `vertex_descriptor` / `streams_consumed`: derived from the main
/// function's first struct parameter's field semantics.
pub fn vertex_layout(program: &ShaderProgram) -> (Vec<VertexAttribute>, Vec<VertexStream>) {
    assert_eq!(program.kind, ShaderKind::Vertex);

    let Some(main) = program.functions.iter().find(|f| f.name == "main") else {
        return (Vec::new(), Vec::new());
    };
    let Some(first_param) = main.parameters.first() else {
        return (Vec::new(), Vec::new());
    };
    let Some(input_struct) = program.structs.iter().find(|s| s.name == first_param.type_name)
    else {
        return (Vec::new(), Vec::new());
    };

    let mut attributes = Vec::new();
    let mut streams = Vec::new();
    let mut index = 0u32;

    for field in &input_struct.fields {
        let Some(semantic) = &field.semantic else {
            continue;
        };
        let stream = if semantic.is_position() {
            VertexStream::Position
        } else if semantic.is_normal() {
            VertexStream::Normal
        } else if semantic.is_tangent() {
            VertexStream::Tangent
        } else if semantic.is_color() {
            VertexStream::Color
        } else if let Some(n) = semantic.texcoord_index() {
            VertexStream::Texcoord(n)
        } else {
            continue;
        };

        let components = match stream {
            VertexStream::Position | VertexStream::Normal | VertexStream::Tangent => 4,
            VertexStream::Color => 4,
            VertexStream::Texcoord(_) => texcoord_width(&field.type_name),
        };

        attributes.push(VertexAttribute {
            stream,
            attribute_index: index,
            buffer_index: index,
            components,
            stride: components as usize * 4,
        });
        streams.push(stream);
        index += 1;
    }

    (attributes, streams)
}

fn texcoord_width(type_name: &str) -> u8 {
    match type_name {
        "float" => 1,
        "float2" => 2,
        "float3" => 3,
        "float4" => 4,
        _ => 2,
    }
}

/// Stage 7 `sampler_descriptors`: one per sampler declaration, in order,
/// translated from the legacy sampler-info struct.
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub name: String,
    pub info: SamplerInfo,
}

pub fn sampler_descriptors(program: &ShaderProgram) -> Vec<SamplerDescriptor> {
    program
        .samplers
        .iter()
        .map(|s| SamplerDescriptor {
            name: s.name.clone(),
            info: s.info,
        })
        .collect()
}

/// Reconstructs the host-facing `Semantic` a vertex stream corresponds to,
/// used when reporting diagnostics.
pub fn stream_semantic_name(stream: VertexStream) -> String {
    match stream {
        VertexStream::Position => "POSITION".into(),
        VertexStream::Normal => "NORMAL".into(),
        VertexStream::Tangent => "TANGENT".into(),
        VertexStream::Color => "COLOR".into(),
        VertexStream::Texcoord(n) => format!("TEXCOORD{n}"),
    }
}
