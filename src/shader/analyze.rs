//! Transpiler stages 1-3 (spec §4.4): classify uniforms, classify structs and
//! function signatures, then walk function bodies to determine which
//! uniforms/textures/samplers each function (transitively) touches.

use super::ir::{FunctionDecl, ShaderKind, ShaderProgram, Token};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformClass {
    Uniform,
    Texture,
}

/// Stage 1: fragment-shader uniforms whose type name begins with `texture`
/// are textures; everything else is a plain uniform. Declaration order is
/// preserved for later binding-index assignment.
pub fn classify_uniforms(program: &ShaderProgram) -> Vec<UniformClass> {
    program
        .uniforms
        .iter()
        .map(|u| {
            if program.kind == ShaderKind::Fragment && u.type_name.starts_with("texture") {
                UniformClass::Texture
            } else {
                UniformClass::Uniform
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructUsage {
    pub input: bool,
    pub output: bool,
}

impl StructUsage {
    pub fn both(&self) -> bool {
        self.input && self.output
    }
}

/// Stage 2: a parameter whose type matches a struct name marks that struct
/// Input-used; if the function's return type also equals the struct name,
/// the struct is additionally Output-used (the `_In`/`_Out` split happens at
/// emission time, in `emit.rs`).
pub fn classify_structs(program: &ShaderProgram) -> Vec<(String, StructUsage)> {
    let mut usage: Vec<(String, StructUsage)> = program
        .structs
        .iter()
        .map(|s| (s.name.clone(), StructUsage::default()))
        .collect();

    let find = |usage: &mut Vec<(String, StructUsage)>, name: &str| {
        usage.iter_mut().find(|(n, _)| n == name).map(|(_, u)| u)
    };

    for f in &program.functions {
        for p in &f.parameters {
            if let Some(u) = find(&mut usage, &p.type_name) {
                u.input = true;
                if f.return_type == p.type_name {
                    u.output = true;
                }
            }
        }
    }
    usage
}

#[derive(Debug, Clone, Default)]
pub struct FunctionInfo {
    pub requires_uniforms: bool,
    /// Ordered, deduplicated texture uniform names this function (or any
    /// callee) references.
    pub textures: Vec<String>,
    /// Ordered, deduplicated sampler names this function (or any callee)
    /// references.
    pub samplers: Vec<String>,
    /// Names of other host-defined functions called from this function's
    /// body, in first-encountered order.
    pub calls: Vec<String>,
}

fn push_dedup(v: &mut Vec<String>, item: &str) {
    if !v.iter().any(|x| x == item) {
        v.push(item.to_string());
    }
}

/// Stage 3, direct pass: scan each function's body tokens once, recording
/// direct uniform/texture/sampler/call references. Preceding-`.` exclusion
/// (spec: "not preceded by `.`") keeps us from treating `tex.Sample` as a
/// reference to a uniform named `Sample`.
fn analyze_function_body_direct(
    program: &ShaderProgram,
    func: &FunctionDecl,
    uniform_classes: &[UniformClass],
) -> FunctionInfo {
    let mut info = FunctionInfo::default();
    let tokens = &program.tokens[func.body.clone()];

    let mut prev_was_dot = false;
    for tok in tokens {
        match tok {
            Token::Other(p) if p == "." => {
                prev_was_dot = true;
                continue;
            }
            Token::Name(name) => {
                if !prev_was_dot {
                    if let Some(idx) = program.uniforms.iter().position(|u| &u.name == name) {
                        match uniform_classes[idx] {
                            UniformClass::Uniform => info.requires_uniforms = true,
                            UniformClass::Texture => push_dedup(&mut info.textures, name),
                        }
                    } else if program.functions.iter().any(|g| &g.name == name && g.name != func.name)
                    {
                        push_dedup(&mut info.calls, name);
                    } else if program.samplers.iter().any(|s| &s.name == name) {
                        push_dedup(&mut info.samplers, name);
                    }
                }
            }
            _ => {}
        }
        prev_was_dot = false;
    }

    info
}

/// Stage 3, propagation pass: when a function calls another analyzed
/// function, the callee's `requires_uniforms`/textures/samplers propagate
/// into the caller. Runs to a fixed point so call order in the source
/// doesn't matter.
pub fn analyze_function_bodies(
    program: &ShaderProgram,
    uniform_classes: &[UniformClass],
) -> Vec<(String, FunctionInfo)> {
    let mut infos: Vec<(String, FunctionInfo)> = program
        .functions
        .iter()
        .map(|f| {
            (
                f.name.clone(),
                analyze_function_body_direct(program, f, uniform_classes),
            )
        })
        .collect();

    loop {
        let mut changed = false;
        for i in 0..infos.len() {
            let calls = infos[i].1.calls.clone();
            for callee in &calls {
                let Some(callee_info) = infos.iter().find(|(n, _)| n == callee).map(|(_, i)| i.clone())
                else {
                    continue;
                };
                let (_, caller) = &mut infos[i];
                if callee_info.requires_uniforms && !caller.requires_uniforms {
                    caller.requires_uniforms = true;
                    changed = true;
                }
                for t in &callee_info.textures {
                    if !caller.textures.iter().any(|x| x == t) {
                        caller.textures.push(t.clone());
                        changed = true;
                    }
                }
                for s in &callee_info.samplers {
                    if !caller.samplers.iter().any(|x| x == s) {
                        caller.samplers.push(s.clone());
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    infos
}

/// Convenience: all host-defined function names referenced anywhere, used by
/// `emit.rs` to decide whether a `NAME` token is a user function call.
pub fn function_names(program: &ShaderProgram) -> HashSet<&str> {
    program.functions.iter().map(|f| f.name.as_str()).collect()
}
