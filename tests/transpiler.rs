//! Shader transpiler scenarios (spec §8, scenarios 5 and 6): specific
//! intrinsic and return-type rewrites, expressed against hand-built token
//! streams the way a pre-tokenized host program would arrive (spec §1: the
//! lexer/parser is an external collaborator, never re-implemented here).

use gs_metal::shader::ir::{
    FunctionDecl, Parameter, ShaderKind, ShaderProgram, Token, UniformDecl,
};

fn name(s: &str) -> Token {
    Token::Name(s.to_string())
}

fn other(s: &str) -> Token {
    Token::Other(s.to_string())
}

/// `tex.Load(int3(uv.x, uv.y, 0))` -> `tex.read(uint2(uv.x, uv.y), uint(0))`.
#[test]
fn texture_load_rewrites_to_msl_read() {
    let tokens = vec![
        name("return"),
        Token::SpaceTab,
        name("tex"),
        other("."),
        name("Load"),
        other("("),
        name("int3"),
        other("("),
        name("uv"),
        other("."),
        name("x"),
        other(","),
        Token::SpaceTab,
        name("uv"),
        other("."),
        name("y"),
        other(","),
        Token::SpaceTab,
        other("0"),
        other(")"),
        other(")"),
        other(";"),
    ];
    let body_len = tokens.len();

    let program = ShaderProgram {
        kind: ShaderKind::Fragment,
        tokens,
        uniforms: vec![UniformDecl {
            name: "tex".to_string(),
            type_name: "texture2d".to_string(),
            semantic: None,
            is_const: false,
            default_value: Vec::new(),
            array_count: None,
        }],
        structs: Vec::new(),
        functions: vec![FunctionDecl {
            name: "main".to_string(),
            return_type: "float4".to_string(),
            parameters: Vec::<Parameter>::new(),
            body: 0..body_len,
        }],
        samplers: Vec::new(),
    };

    let metadata = gs_metal::shader::compile(&program).expect("minimal program must compile");
    assert!(
        metadata.msl_source.contains("tex.read(uint2(uv.x, uv.y), uint(0))"),
        "got: {}",
        metadata.msl_source
    );
}

/// A fragment `main` returning `float3` gets its body's `return` wrapped so
/// the emitted `_main` can return MSL's required `float4`.
#[test]
fn float3_fragment_return_is_wrapped_as_float4() {
    let tokens = vec![name("return"), Token::SpaceTab, name("c"), other(";")];
    let body_len = tokens.len();

    let program = ShaderProgram {
        kind: ShaderKind::Fragment,
        tokens,
        uniforms: vec![UniformDecl {
            name: "c".to_string(),
            type_name: "float3".to_string(),
            semantic: None,
            is_const: false,
            default_value: Vec::new(),
            array_count: None,
        }],
        structs: Vec::new(),
        functions: vec![FunctionDecl {
            name: "main".to_string(),
            return_type: "float3".to_string(),
            parameters: Vec::<Parameter>::new(),
            body: 0..body_len,
        }],
        samplers: Vec::new(),
    };

    let metadata = gs_metal::shader::compile(&program).expect("minimal program must compile");
    assert!(
        metadata.msl_source.contains("return float4(uniforms.c, 1);"),
        "got: {}",
        metadata.msl_source
    );
}
