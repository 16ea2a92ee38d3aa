//! Input intermediate representation for the shader transpiler (spec §4.4).
//!
//! The host's HLSL-like language is tokenized and pre-parsed by an external
//! lexer/parser collaborator (out of scope, per spec §1); this module only
//! defines the Rust types that carry its output into the transpiler. The
//! transpiler itself (`analyze`, `emit`) never re-lexes text — it walks these
//! tables and this token stream, matching the teacher's `autograph-spirv`
//! idiom of treating an externally-produced flat representation (there,
//! SPIR-V words; here, tokens) as the only source of truth.

use std::ops::Range;

/// One token of the pre-lexed shader source. Spec §1: "NAME, OTHER, SPACETAB,
/// NEWLINE, NONE".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Name(String),
    Other(String),
    SpaceTab,
    Newline,
    None,
}

impl Token {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Token::Name(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_punct(&self) -> Option<&str> {
        match self {
            Token::Other(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Tokens that carry no semantic content and can be skipped when walking
    /// a function body for uniform/texture/sampler references.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::SpaceTab | Token::Newline | Token::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

/// A host-language semantic mapping attached to a struct field or uniform,
/// e.g. `POSITION`, `NORMAL`, `TEXCOORD0`, `VERTEXID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semantic(pub String);

impl Semantic {
    pub fn is_position(&self) -> bool {
        self.0.eq_ignore_ascii_case("POSITION")
    }
    pub fn is_normal(&self) -> bool {
        self.0.eq_ignore_ascii_case("NORMAL")
    }
    pub fn is_tangent(&self) -> bool {
        self.0.eq_ignore_ascii_case("TANGENT")
    }
    pub fn is_color(&self) -> bool {
        self.0.eq_ignore_ascii_case("COLOR")
    }
    pub fn is_vertex_id(&self) -> bool {
        self.0.eq_ignore_ascii_case("VERTEXID")
    }
    /// Returns the texcoord index `n` for a `TEXCOORD<n>` semantic.
    pub fn texcoord_index(&self) -> Option<u32> {
        let rest = self.0.to_ascii_uppercase();
        rest.strip_prefix("TEXCOORD")?.parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct UniformDecl {
    pub name: String,
    pub type_name: String,
    pub semantic: Option<Semantic>,
    pub is_const: bool,
    pub default_value: Vec<u8>,
    /// `None` for a scalar uniform, `Some(n)` for an array of `n` elements.
    pub array_count: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub type_name: String,
    pub semantic: Option<Semantic>,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<Parameter>,
    /// Token range of the function's body, indexing into the shader's full
    /// token stream (spec §4.4 Stage 3: "walk its body tokens").
    pub body: Range<usize>,
}

/// Legacy sampler-info struct (spec §3 SamplerState / §4.4 samplers table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Point,
    Linear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerInfo {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub filter: FilterMode,
    pub max_anisotropy: u32,
    /// Packed 32-bit RGBA border color.
    pub border_color: u32,
}

#[derive(Debug, Clone)]
pub struct SamplerDecl {
    pub name: String,
    pub info: SamplerInfo,
}

/// The full pre-parsed program handed to the transpiler for one shader
/// (vertex or fragment) compilation unit.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub kind: ShaderKind,
    pub tokens: Vec<Token>,
    pub uniforms: Vec<UniformDecl>,
    pub structs: Vec<StructDecl>,
    pub functions: Vec<FunctionDecl>,
    pub samplers: Vec<SamplerDecl>,
}
