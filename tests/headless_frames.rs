//! End-to-end behaviour of the renderer on the recording backend.

use approx::assert_relative_eq;
use glam::{Mat4, Vec2, Vec3};
use lumen::arena::GenKeyVector;
use lumen::frame::FrameCamera;
use lumen::gpu::backend::ComputeProgram;
use lumen::gpu::headless::{Command, HeadlessBackend};
use lumen::gpu::layout::{MaterialRecord, SphereLightRecord, TransformRecord};
use lumen::options::RendererOptions;
use lumen::renderer::Renderer;
use lumen::scene::{
    ImageData, ImageFormat, Material, MaterialMaps, Mesh, SphereLight,
};
use lumen::{RenderError, Result};

fn renderer() -> Result<Renderer<HeadlessBackend>> {
    Renderer::new(HeadlessBackend::new(), &RendererOptions::default())
}

fn camera() -> FrameCamera {
    FrameCamera::look_at(
        Vec3::new(0.0, 3.0, 6.0),
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_3,
        16.0 / 9.0,
        0.1,
        50.0,
    )
}

fn quad() -> Result<Mesh> {
    Mesh::new(
        vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ],
        vec![Vec3::Y; 4],
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ],
        vec![0, 2, 1, 0, 3, 2],
    )
}

fn sphere_light(x: f32) -> SphereLight {
    SphereLight::new(Vec3::new(x, 2.0, 0.0), Vec3::splat(10.0), 0.1)
}

fn sphere_record(r: &Renderer<HeadlessBackend>, slot: u64) -> SphereLightRecord {
    let buffer = r.registry().light_buffers().sphere;
    r.backend()
        .read_record(buffer, slot * size_of::<SphereLightRecord>() as u64)
        .unwrap()
}

#[test]
fn handles_stay_distinct_across_reuse() {
    let mut arena: GenKeyVector<&str> = GenKeyVector::new();
    let a = arena.insert("a");
    let b = arena.insert("b");
    assert_eq!((a.index(), a.generation()), (0, 0));
    assert_eq!((b.index(), b.generation()), (1, 0));

    assert_eq!(arena.remove(0), Some("a"));
    let c = arena.insert("c");
    assert_eq!((c.index(), c.generation()), (0, 1));

    assert!(matches!(
        arena.at(a),
        Err(RenderError::InvalidHandle { index: 0, .. })
    ));
    assert_eq!(*arena.at(c).unwrap(), "c");
    assert_eq!(*arena.at(b).unwrap(), "b");
}

#[test]
fn removed_light_loses_its_shadow_but_keeps_the_old_map() {
    let mut r = renderer().unwrap();
    let mesh = r.add_mesh(quad().unwrap()).unwrap();
    let material = r.add_material(Material::default()).unwrap();
    let _ = r.add_mesh_renderer(mesh, material, Mat4::IDENTITY).unwrap();
    let lights: Vec<_> = (0..4)
        .map(|i| r.add_sphere_light(sphere_light(i as f32)).unwrap())
        .collect();

    let first = r.render_frame(&camera()).unwrap();
    assert_eq!(first.shadow_faces, 4 * 6);

    r.remove_light(lights[2]).unwrap();
    let second = r.render_frame(&camera()).unwrap();
    assert_eq!(second.shadow_faces, 3 * 6);

    let slot = r.shadows().sphere.record(2).unwrap();
    assert_eq!(slot.updated_frame, Some(first.frame));
    assert!(slot.shadow.is_some());

    assert_eq!(sphere_record(&r, 2).shadow[0], -1);
    for live in [0, 1, 3] {
        assert_eq!(sphere_record(&r, live).shadow[0], live as i32);
    }
}

#[test]
fn irradiance_waits_on_the_environment_cube() {
    let mut r = renderer().unwrap();
    let sky = ImageData::from_rgba32f(8, 4, &[[0.5, 0.6, 0.9, 1.0]; 32]).unwrap();
    let _ = r.backend_mut().take_commands();
    let _ = r.add_environment(&sky).unwrap();

    let commands = r.backend().commands();
    let position = |program: ComputeProgram| {
        commands.iter().position(
            |c| matches!(c, Command::Dispatch { program: p, .. } if *p == program),
        )
    };
    let cube = position(ComputeProgram::EquirectToCube).unwrap();
    let irradiance = position(ComputeProgram::Irradiance).unwrap();
    assert!(cube < irradiance);

    let Command::Dispatch { output, .. } = &commands[cube] else {
        unreachable!()
    };
    assert!(commands[cube..irradiance]
        .iter()
        .any(|c| matches!(c, Command::Barrier(ids) if ids.contains(&output.texture))));
    assert!(commands[irradiance..].contains(&Command::Flush));
}

#[test]
fn identity_quad_bounds_are_exact() {
    let mut r = renderer().unwrap();
    let mesh_data = quad().unwrap();
    let local = mesh_data.bounds();
    let mesh = r.add_mesh(mesh_data).unwrap();
    let material = r.add_material(Material::from_color(Vec3::ONE)).unwrap();
    let key = r.add_mesh_renderer(mesh, material, Mat4::IDENTITY).unwrap();

    let world = r.registry().renderables().at(key).unwrap().world_aabb();
    assert_eq!(world, local);
    assert_eq!(r.registry().scene_bounds(), local);
}

#[test]
fn moved_renderer_bounds_follow_transform() {
    let mut r = renderer().unwrap();
    let mesh = r.add_mesh(quad().unwrap()).unwrap();
    let material = r.add_material(Material::default()).unwrap();
    let key = r.add_mesh_renderer(mesh, material, Mat4::IDENTITY).unwrap();

    let transform = Mat4::from_translation(Vec3::new(2.0, 1.0, 0.0))
        * Mat4::from_scale(Vec3::new(3.0, 1.0, 0.5));
    r.set_renderer_transform(key, transform).unwrap();
    let world = r.registry().renderables().at(key).unwrap().world_aabb();
    assert_relative_eq!(world.min.x, -1.0, epsilon = 1e-5);
    assert_relative_eq!(world.max.x, 5.0, epsilon = 1e-5);
    assert_relative_eq!(world.min.y, 1.0, epsilon = 1e-5);
    assert_relative_eq!(world.max.z, 0.5, epsilon = 1e-5);
}

#[test]
fn stale_texture_leaves_materials_untouched() {
    let mut r = renderer().unwrap();
    let image = ImageData::new(2, 2, ImageFormat::Rgba8Srgb, vec![200; 16]).unwrap();
    let texture = r.add_texture(&image);
    let good = r
        .add_material(Material {
            maps: MaterialMaps {
                diffuse: Some(texture),
                ..MaterialMaps::default()
            },
            ..Material::default()
        })
        .unwrap();
    assert!(r.registry().materials().is_valid(good));

    let forged = lumen::arena::GenKey::from_parts(texture.generation() + 1, texture.index());
    let before = r.registry().materials().slot_count();
    let err = r
        .add_material(Material {
            maps: MaterialMaps {
                normal: Some(forged),
                ..MaterialMaps::default()
            },
            ..Material::default()
        })
        .unwrap_err();
    assert!(matches!(err, RenderError::InvalidHandle { .. }));
    assert_eq!(r.registry().materials().slot_count(), before);
    assert_eq!(r.registry().materials().len(), 1);
}

#[test]
fn frame_passes_run_in_phase_order() {
    let mut r = renderer().unwrap();
    let mesh = r.add_mesh(quad().unwrap()).unwrap();
    let material = r.add_material(Material::default()).unwrap();
    let _ = r.add_mesh_renderer(mesh, material, Mat4::IDENTITY).unwrap();
    let _ = r.add_sphere_light(sphere_light(0.0)).unwrap();
    let _ = r.backend_mut().take_commands();

    let _ = r.render_frame(&camera()).unwrap();
    let passes: Vec<&str> = r
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::BeginFrame => Some("begin"),
            Command::ShadowPass { .. } => Some("shadow"),
            Command::GeometryPass { .. } => Some("geometry"),
            Command::LightPass { .. } => Some("light"),
            Command::EndFrame => Some("end"),
            _ => None,
        })
        .collect();
    let mut expected = vec!["begin"];
    expected.extend(["shadow"; 6]);
    expected.extend(["geometry", "light", "end"]);
    assert_eq!(passes, expected);
}

#[test]
fn frame_resize_to_same_size_keeps_targets() {
    let mut r = renderer().unwrap();
    r.resize(320, 200).unwrap();
    let _ = r.backend_mut().take_commands();
    r.resize(320, 200).unwrap();
    assert!(r
        .backend()
        .commands()
        .iter()
        .all(|c| !matches!(c, Command::CreateTexture { .. })));
    assert_eq!(r.frames().size(), (320, 200));
}

#[test]
fn renderer_records_survive_buffer_growth() {
    let mut r = renderer().unwrap();
    let mesh = r.add_mesh(quad().unwrap()).unwrap();
    let red = r.add_material(Material::from_color(Vec3::X)).unwrap();
    let blue = r.add_material(Material::from_color(Vec3::Z)).unwrap();
    let shift = Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0));
    let _ = r.add_mesh_renderer(mesh, red, shift).unwrap();
    let transforms = r.registry().transform_buffer();
    let materials = r.registry().material_buffer();

    for _ in 0..4 {
        let _ = r.add_mesh_renderer(mesh, blue, Mat4::IDENTITY).unwrap();
    }
    assert_ne!(r.registry().transform_buffer(), transforms);
    assert_ne!(r.registry().material_buffer(), materials);

    let draws = r.registry().mesh_draws();
    assert_eq!(draws.len(), 5);
    let first = draws[0];
    let t: TransformRecord = r
        .backend()
        .read_record(r.registry().transform_buffer(), u64::from(first.transform_offset))
        .unwrap();
    assert_relative_eq!(t.model[3][0], 4.0);
    let m: MaterialRecord = r
        .backend()
        .read_record(r.registry().material_buffer(), u64::from(first.material_offset))
        .unwrap();
    assert_eq!(m.diffuse, [1.0, 0.0, 0.0, 1.0]);

    let last = draws[4];
    let m: MaterialRecord = r
        .backend()
        .read_record(r.registry().material_buffer(), u64::from(last.material_offset))
        .unwrap();
    assert_eq!(m.diffuse, [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn light_array_is_rewritten_after_growth() {
    let mut r = renderer().unwrap();
    let _ = r.add_sphere_light(sphere_light(-1.0)).unwrap();
    let before = r.registry().light_buffers().sphere;

    let _ = r.backend_mut().take_commands();
    let _ = r.add_sphere_light(sphere_light(1.0)).unwrap();
    let after = r.registry().light_buffers().sphere;
    assert_ne!(before, after);

    let record = size_of::<SphereLightRecord>();
    assert!(r.backend().commands().iter().any(|c| {
        *c == Command::WriteBuffer {
            id: after,
            offset: 0,
            len: 2 * record,
        }
    }));
    assert_relative_eq!(sphere_record(&r, 0).position[0], -1.0);
    assert_relative_eq!(sphere_record(&r, 1).position[0], 1.0);
}
