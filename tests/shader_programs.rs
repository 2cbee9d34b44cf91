//! Every program the renderer can ask for composes from the bundled WGSL.

use lumen::gpu::headless::{Command, HeadlessBackend};
use lumen::gpu::shader_composer::ShaderComposer;
use lumen::gpu::shader_key::{ShaderDefine, ShaderKey, ShaderKind};
use lumen::options::RendererOptions;
use lumen::renderer::Renderer;

/// Programs built once with the backend, independent of options.
const FIXED: [ShaderKind; 6] = [
    ShaderKind::Geometry,
    ShaderKind::Shadow,
    ShaderKind::EquirectToCube,
    ShaderKind::Irradiance,
    ShaderKind::Prefilter,
    ShaderKind::BrdfLut,
];

fn requested_programs(options: &RendererOptions) -> Vec<ShaderKey> {
    let r = Renderer::new(HeadlessBackend::new(), options).unwrap();
    r.backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::PrepareProgram(key) => Some(key.clone()),
            _ => None,
        })
        .collect()
}

fn assert_composes(composer: &mut ShaderComposer, key: &ShaderKey) {
    let composed = composer.module(key).map(|_| ());
    assert!(composed.is_ok(), "{key:?} failed: {composed:?}");
}

#[test]
fn default_renderer_programs_compose() {
    let requested = requested_programs(&RendererOptions::default());
    assert_eq!(requested.len(), 1);

    let r = Renderer::new(HeadlessBackend::new(), &RendererOptions::default()).unwrap();
    assert_eq!(&requested[0], r.frames().light_program());

    let mut composer = ShaderComposer::new().unwrap();
    for key in &requested {
        assert_composes(&mut composer, key);
    }
    for kind in FIXED {
        assert_composes(&mut composer, &ShaderKey::new(kind));
    }
    assert_eq!(composer.cached_count(), FIXED.len() + 1);
}

#[test]
fn light_program_follows_pool_capacities() {
    let mut options = RendererOptions::default();
    options.shadows.directional_capacity = 1;
    options.shadows.sphere_capacity = 7;
    options.shadows.rect_capacity = 2;

    let requested = requested_programs(&options);
    assert_eq!(requested.len(), 1, "{requested:?}");
    let key = &requested[0];
    assert_eq!(key.kind, ShaderKind::LightAccumulation);
    let expected = ShaderKey::new(ShaderKind::LightAccumulation)
        .with("MAX_DIRECTIONAL", ShaderDefine::UInt(1))
        .with("MAX_SPHERE", ShaderDefine::UInt(7))
        .with("MAX_RECT", ShaderDefine::UInt(2));
    assert_eq!(*key, expected);

    let mut composer = ShaderComposer::new().unwrap();
    assert_composes(&mut composer, key);
}
