//! HLSL -> MSL intrinsic, function, and type-keyword remap tables (spec §4.4
//! Stage 6). Kept as flat lookup tables rather than a match-per-call-site so
//! that `emit.rs` can stay a single token-rewrite pass.

/// Simple one-name-for-another intrinsic renames.
pub fn remap_intrinsic_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "ddx" => "dfdx",
        "ddy" => "dfdy",
        "frac" => "fract",
        "lerp" => "mix",
        _ => return None,
    })
}

/// Intrinsics the host never legitimately emits for a Metal target.
pub fn is_unsupported_intrinsic(name: &str) -> bool {
    name == "clip"
}

/// HLSL type keyword -> MSL type keyword. `Err` carries the unsupported type
/// name for the transpiler's diagnostic.
pub fn remap_type_keyword(name: &str) -> Result<Option<&'static str>, &'static str> {
    Ok(Some(match name {
        "texture2d" => "texture2d<float>",
        "texture3d" => "texture3d<float>",
        "texture_cube" => "texturecube<float>",
        "half" | "half2" | "half3" | "half4" => return Ok(Some(half_to_float(name))),
        "min16float" => "float",
        "min16float2" => "float2",
        "min16float3" => "float3",
        "min16float4" => "float4",
        "min16int" => "short",
        "min16int2" => "short2",
        "min16int3" => "short3",
        "min16int4" => "short4",
        "min16uint" => "ushort",
        "min16uint2" => "ushort2",
        "min16uint3" => "ushort3",
        "min16uint4" => "ushort4",
        "double" | "min10float" | "min13int" | "texture_rect" => return Err(name_to_static(name)),
        _ => return Ok(None),
    }))
}

fn half_to_float(name: &str) -> &'static str {
    match name {
        "half" => "float",
        "half2" => "float2",
        "half3" => "float3",
        "half4" => "float4",
        _ => unreachable!(),
    }
}

/// The unsupported-type-name table above only ever sees a fixed, small set of
/// names, so a leaked `'static str` via interning is unnecessary; this just
/// satisfies the `Result<_, &'static str>` signature for the four names we
/// actually reject.
fn name_to_static(name: &str) -> &'static str {
    match name {
        "double" => "double",
        "min10float" => "min10float",
        "min13int" => "min13int",
        "texture_rect" => "texture_rect",
        _ => "<unsupported type>",
    }
}

/// `mul(a, b)` -> `(a) * (b)`; `mad(a, b, c)` -> `((a) * (b)) + (c)` (spec §4.4
/// Stage 6). Returns the rewritten expression given the already-rewritten
/// argument source strings.
pub fn rewrite_mul(a: &str, b: &str) -> String {
    format!("({a}) * ({b})")
}

pub fn rewrite_mad(a: &str, b: &str, c: &str) -> String {
    format!("(({a}) * ({b})) + ({c})")
}

/// Metal attribute for a vertex-input struct field, indexed by field
/// position (spec §4.4 Stage 5, vertex shader case).
pub fn vertex_input_attribute(index: usize) -> String {
    format!("[[attribute({index})]]")
}

/// Metal attribute for a fragment-input struct field, derived from its
/// semantic mapping (spec §4.4 Stage 5, fragment shader case).
pub fn fragment_input_attribute(semantic: &crate::shader::ir::Semantic) -> Option<&'static str> {
    if semantic.is_position() {
        Some("[[position]]")
    } else if semantic.is_vertex_id() {
        Some("[[vertex_id]]")
    } else {
        None
    }
}

/// Metal texture-sample-method remap for `Tex.Method(...)` call sites (spec
/// §4.4 Stage 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMethod {
    Sample,
    SampleBias,
    SampleGrad,
    SampleLevel,
    Load,
}

impl SampleMethod {
    pub fn parse(name: &str) -> Option<SampleMethod> {
        Some(match name {
            "Sample" => SampleMethod::Sample,
            "SampleBias" => SampleMethod::SampleBias,
            "SampleGrad" => SampleMethod::SampleGrad,
            "SampleLevel" => SampleMethod::SampleLevel,
            "Load" => SampleMethod::Load,
            _ => return None,
        })
    }

    pub fn msl_method(self) -> &'static str {
        match self {
            SampleMethod::Load => "read",
            _ => "sample",
        }
    }
}
