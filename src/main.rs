//! `lumen-probe`: renders a small lit scene offscreen and logs per-pass
//! timings.
//!
//! Usage: `lumen-probe [options.toml] [frames]`. Without a usable GPU the
//! scene is recorded on the headless backend instead.

use std::path::PathBuf;

use glam::{Mat4, Vec2, Vec3};
use lumen::frame::FrameCamera;
use lumen::gpu::backend::RenderBackend;
use lumen::gpu::headless::HeadlessBackend;
use lumen::gpu::render_context::RenderContext;
use lumen::gpu::wgpu_backend::WgpuBackend;
use lumen::options::RendererOptions;
use lumen::renderer::Renderer;
use lumen::scene::{
    DirectionalLight, ImageData, ImageFormat, Material, MaterialMaps, Mesh, RectLight, SphereLight,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let options_path = args.next().map(PathBuf::from);
    let frames = args.next().and_then(|s| s.parse().ok()).unwrap_or(3);

    if let Err(e) = run(options_path, frames) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(options_path: Option<PathBuf>, frames: u32) -> lumen::Result<()> {
    let options = match options_path {
        Some(path) => RendererOptions::load(&path)?,
        None => RendererOptions::default(),
    };
    match pollster::block_on(RenderContext::new_headless()) {
        Ok(context) => probe(WgpuBackend::new(context)?, &options, frames),
        Err(e) => {
            log::warn!("no usable GPU ({e}); recording on the headless backend");
            probe(HeadlessBackend::new(), &options, frames)
        }
    }
}

fn probe<B: RenderBackend>(backend: B, options: &RendererOptions, frames: u32) -> lumen::Result<()> {
    let mut renderer = Renderer::new(backend, options)?;

    let checker = renderer.add_texture(&checker_image(64, 8)?);
    let floor_material = renderer.add_material(Material {
        maps: MaterialMaps {
            diffuse: Some(checker),
            ..MaterialMaps::default()
        },
        roughness: 0.8,
        ..Material::from_color(Vec3::ONE)
    })?;
    let box_material = renderer.add_material(Material {
        roughness: 0.3,
        metalness: 1.0,
        ..Material::from_color(Vec3::new(0.9, 0.6, 0.2))
    })?;

    let floor = renderer.add_mesh(cuboid(Vec3::new(5.0, 0.05, 5.0))?)?;
    let cube = renderer.add_mesh(cuboid(Vec3::splat(0.5))?)?;
    let _ = renderer.add_mesh_renderer(
        floor,
        floor_material,
        Mat4::from_translation(Vec3::new(0.0, -0.05, 0.0)),
    )?;
    let spinning = renderer.add_mesh_renderer(cube, box_material, Mat4::IDENTITY)?;
    let _ = renderer.add_wire_renderer(
        &[Vec3::ZERO, Vec3::X, Vec3::ZERO, Vec3::Y, Vec3::ZERO, Vec3::Z],
        Vec3::new(0.2, 1.0, 0.4),
        Mat4::from_translation(Vec3::new(-2.0, 0.01, -2.0)),
    )?;

    let _ = renderer.add_directional_light(DirectionalLight::new(
        Vec3::new(-0.4, -1.0, -0.3).normalize(),
        Vec3::splat(3.0),
    ))?;
    let _ = renderer.add_sphere_light(SphereLight::new(
        Vec3::new(1.5, 2.0, 1.0),
        Vec3::new(20.0, 16.0, 12.0),
        0.1,
    ))?;
    let _ = renderer.add_rect_light(RectLight::new(
        Mat4::from_translation(Vec3::new(-1.5, 2.5, 0.0))
            * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2),
        Vec3::splat(8.0),
        Vec2::new(0.5, 0.25),
    ))?;

    let sky = renderer.add_environment(&sky_image(128, 64)?)?;
    renderer.set_environment(Some(sky))?;

    let (width, height) = (options.frame.width, options.frame.height);
    let camera = FrameCamera::look_at(
        Vec3::new(3.0, 2.5, 4.0),
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_3,
        width as f32 / height as f32,
        0.05,
        100.0,
    );
    for i in 0..frames {
        let angle = i as f32 * 0.25;
        renderer.set_renderer_transform(
            spinning,
            Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)) * Mat4::from_rotation_y(angle),
        )?;
        let output = renderer.render_frame(&camera)?;
        let t = output.timings;
        log::info!(
            "frame {}: {} shadow faces | shadow {:.3} ms, geometry {:.3} ms, lighting {:.3} ms",
            output.frame,
            output.shadow_faces,
            t.shadow_ns as f64 / 1e6,
            t.geometry_ns as f64 / 1e6,
            t.lighting_ns as f64 / 1e6,
        );
    }
    Ok(())
}

/// Axis-aligned box centred on the origin, flat-shaded (4 vertices per face).
fn cuboid(half: Vec3) -> lumen::Result<Mesh> {
    let faces = [
        (Vec3::X, Vec3::Y),
        (Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::Z),
        (Vec3::Z, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y),
    ];
    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, up) in faces {
        let right = up.cross(normal);
        let base = positions.len() as u32;
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let corner = normal + right * (u * 2.0 - 1.0) + up * (v * 2.0 - 1.0);
            positions.push(corner * half);
            normals.push(normal);
            uvs.push(Vec2::new(u, 1.0 - v));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Mesh::new(positions, normals, uvs, indices)
}

fn checker_image(size: u32, cells: u32) -> lumen::Result<ImageData> {
    let cell = (size / cells).max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let v = if (x / cell + y / cell) % 2 == 0 { 230 } else { 60 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    ImageData::new(size, size, ImageFormat::Rgba8Srgb, pixels)
}

/// Equirectangular sky: blue gradient above the horizon, warm ground below.
fn sky_image(width: u32, height: u32) -> lumen::Result<ImageData> {
    let texels: Vec<[f32; 4]> = (0..height)
        .flat_map(|y| {
            let elevation = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
            (0..width).map(move |_| {
                if elevation > 0.0 {
                    let t = elevation.sqrt();
                    [0.6 - 0.4 * t, 0.7 - 0.3 * t, 1.0, 1.0]
                } else {
                    [0.3, 0.25, 0.2, 1.0]
                }
            })
        })
        .collect();
    ImageData::from_rgba32f(width, height, &texels)
}
