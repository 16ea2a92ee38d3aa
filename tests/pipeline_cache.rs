//! Pipeline cache idempotence (spec §8): draws with identical pipeline-
//! affecting state share one cached pipeline instance, and `pipelines_created`
//! increments exactly once. The unit tests in `pipeline/mod.rs` cover the
//! fingerprinting and the build-is-called-once-per-miss behavior with a
//! stub build closure; this file exercises a real successful build, since a
//! `metal::Device` is available here.

use gs_metal::format::ColorFormat;
use gs_metal::pipeline::{
    build_pipeline, BlendState, CompiledPipeline, DepthStencilState, CullMode, FillMode,
    GraphicsPipelineDescriptor, PipelineCache,
};

const MINIMAL_MSL: &str = r#"
#include <metal_stdlib>
using namespace metal;

struct VertexOut {
    float4 position [[position]];
};

vertex VertexOut vs_main() {
    VertexOut out;
    out.position = float4(0.0, 0.0, 0.0, 1.0);
    return out;
}

fragment float4 fs_main() {
    return float4(1.0, 0.0, 0.0, 1.0);
}
"#;

fn descriptor() -> GraphicsPipelineDescriptor {
    GraphicsPipelineDescriptor {
        vertex_shader: 1,
        fragment_shader: 2,
        blend: BlendState::default(),
        depth_stencil: DepthStencilState::default(),
        cull_mode: CullMode::Back,
        fill_mode: FillMode::Fill,
        front_face_ccw: false,
        color_format: ColorFormat::Bgra8Unorm,
        depth_stencil_format: None,
        sample_count: 1,
        vertex_layout_fingerprint: 0,
    }
}

#[test]
fn repeated_draws_with_identical_state_compile_exactly_once() {
    let Some(device) = metal::Device::system_default() else {
        eprintln!("skipping: no Metal device available in this environment");
        return;
    };

    let library = device
        .new_library_with_source(MINIMAL_MSL, &metal::CompileOptions::new())
        .expect("minimal MSL must compile");
    let vertex_descriptor = metal::VertexDescriptor::new();

    let cache = PipelineCache::new();
    let d = descriptor();

    let build = || -> gs_metal::GsResult<CompiledPipeline> {
        build_pipeline(
            &device,
            &d,
            &library,
            "vs_main",
            &library,
            "fs_main",
            &vertex_descriptor,
        )
    };

    for _ in 0..100 {
        cache.get_or_create(&d, build).expect("pipeline build must succeed");
    }

    assert_eq!(cache.pipelines_created(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn distinct_descriptors_each_compile_once() {
    let Some(device) = metal::Device::system_default() else {
        eprintln!("skipping: no Metal device available in this environment");
        return;
    };

    let library = device
        .new_library_with_source(MINIMAL_MSL, &metal::CompileOptions::new())
        .expect("minimal MSL must compile");
    let vertex_descriptor = metal::VertexDescriptor::new();

    let cache = PipelineCache::new();
    let mut a = descriptor();
    a.color_format = ColorFormat::Bgra8Unorm;
    let mut b = descriptor();
    b.color_format = ColorFormat::Rgba8Unorm;

    let build = |d: &GraphicsPipelineDescriptor| {
        build_pipeline(&device, d, &library, "vs_main", &library, "fs_main", &vertex_descriptor)
    };

    cache.get_or_create(&a, || build(&a)).unwrap();
    cache.get_or_create(&b, || build(&b)).unwrap();
    cache.get_or_create(&a, || build(&a)).unwrap();

    assert_eq!(cache.pipelines_created(), 2);
    assert_eq!(cache.len(), 2);
}
