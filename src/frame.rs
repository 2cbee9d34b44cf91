//! Per-frame pass sequencing.
//!
//! A frame always runs frame uniforms → shadows → geometry → lighting.
//! [`FramePhase`] tracks where the orchestrator is; stepping to anything but
//! the next phase is rejected, and a frame that fails part-way is cancelled
//! on the backend so no half-recorded work is submitted.

use glam::{Mat4, Vec3};

use crate::error::{RenderError, Result};
use crate::gpu::backend::{
    BufferDesc, BufferId, BufferUsage, GBuffer, GeometryPassDesc, LightPassDesc, PassTimings,
    RenderBackend, TextureDesc, TextureId,
};
use crate::gpu::layout::FrameUniforms;
use crate::gpu::shader_key::{ShaderDefine, ShaderKey, ShaderKind};
use crate::options::FrameOptions;
use crate::registry::Registry;
use crate::shadow::ShadowPools;

/// G-buffer base color.
pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// G-buffer world normal.
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// G-buffer roughness / metalness / unlit.
pub const MATERIAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// G-buffer emitted radiance.
pub const EMISSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Scene and shadow depth.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// HDR output of the light pass.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Where a frame currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// Between frames.
    #[default]
    Idle,
    /// Frame uniforms and pending state applied.
    FrameUniforms,
    /// Shadow maps rendered.
    Shadows,
    /// G-buffer filled.
    Geometry,
    /// Light accumulation recorded.
    Lighting,
}

impl FramePhase {
    /// The only phase allowed after `self`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::FrameUniforms,
            Self::FrameUniforms => Self::Shadows,
            Self::Shadows => Self::Geometry,
            Self::Geometry => Self::Lighting,
            Self::Lighting => Self::Idle,
        }
    }

    /// Step to `to`.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] unless `to == self.next()`.
    pub fn transition(self, to: Self) -> Result<Self> {
        if to == self.next() {
            Ok(to)
        } else {
            Err(RenderError::Configuration(format!(
                "frame phase {self:?} cannot step to {to:?}"
            )))
        }
    }
}

/// Camera matrices for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCamera {
    /// World → view.
    pub view: Mat4,
    /// View → clip (depth in `[0, 1]`).
    pub projection: Mat4,
    /// Eye position.
    pub position: Vec3,
}

impl FrameCamera {
    /// Right-handed perspective camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            position: eye,
        }
    }
}

/// What a finished frame hands downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutput {
    /// Lit HDR color.
    pub color: TextureId,
    /// Scene depth.
    pub depth: TextureId,
    /// Per-pass GPU (or CPU encode) time.
    pub timings: PassTimings,
    /// Index of the frame just rendered.
    pub frame: u64,
    /// Shadow faces rendered this frame.
    pub shadow_faces: usize,
}

/// Owns the frame targets and runs the fixed pass sequence.
#[derive(Debug)]
pub struct FrameOrchestrator {
    phase: FramePhase,
    frame_index: u64,
    width: u32,
    height: u32,
    clear_color: [f32; 4],
    gbuffer: GBuffer,
    output: TextureId,
    uniforms: BufferId,
    light_program: ShaderKey,
}

impl FrameOrchestrator {
    /// Allocate frame targets sized from `options`; the light program is
    /// specialised to the shadow pools' slot capacities.
    ///
    /// # Errors
    ///
    /// The backend failed to build the light program.
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        options: &FrameOptions,
        shadows: &ShadowPools,
    ) -> Result<Self> {
        let (gbuffer, output) = create_targets(backend, options.width, options.height);
        let uniforms = backend.create_buffer(&BufferDesc {
            label: "frame uniforms".to_owned(),
            size: size_of::<FrameUniforms>() as u64,
            usage: BufferUsage::Uniform,
        });
        let [directional, sphere, rect] = shadows.capacities();
        let light_program = ShaderKey::new(ShaderKind::LightAccumulation)
            .with("MAX_DIRECTIONAL", ShaderDefine::UInt(directional))
            .with("MAX_SPHERE", ShaderDefine::UInt(sphere))
            .with("MAX_RECT", ShaderDefine::UInt(rect));
        backend.prepare_program(&light_program)?;

        Ok(Self {
            phase: FramePhase::Idle,
            frame_index: 0,
            width: options.width,
            height: options.height,
            clear_color: options.clear_color,
            gbuffer,
            output,
            uniforms,
            light_program,
        })
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frames rendered so far.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Target size.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// G-buffer targets.
    #[must_use]
    pub const fn gbuffer(&self) -> GBuffer {
        self.gbuffer
    }

    /// Light-pass program key.
    #[must_use]
    pub const fn light_program(&self) -> &ShaderKey {
        &self.light_program
    }

    /// Recreate the targets at a new size.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] for a zero extent or when called
    /// mid-frame.
    pub fn resize<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.phase != FramePhase::Idle {
            return Err(RenderError::Configuration(
                "cannot resize frame targets mid-frame".to_owned(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(RenderError::Configuration(format!(
                "frame size {width}x{height} has a zero extent"
            )));
        }
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let g = self.gbuffer;
        for id in [g.albedo, g.normal, g.material, g.emission, g.depth, self.output] {
            backend.destroy_texture(id);
        }
        let (gbuffer, output) = create_targets(backend, width, height);
        self.gbuffer = gbuffer;
        self.output = output;
        self.width = width;
        self.height = height;
        log::debug!("frame targets resized to {width}x{height}");
        Ok(())
    }

    /// Render one frame.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] if a frame is already in flight or a
    /// phase is stepped out of order; the backend frame is cancelled.
    pub fn render_frame<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut Registry,
        shadows: &mut ShadowPools,
        camera: &FrameCamera,
    ) -> Result<FrameOutput> {
        if self.phase != FramePhase::Idle {
            return Err(RenderError::Configuration(format!(
                "render_frame called during {:?}",
                self.phase
            )));
        }
        backend.begin_frame();
        match self.run_phases(backend, registry, shadows, camera) {
            Ok(output) => Ok(output),
            Err(e) => {
                log::warn!("frame {} cancelled: {e}", self.frame_index);
                backend.cancel_frame();
                self.phase = FramePhase::Idle;
                Err(e)
            }
        }
    }

    fn advance(&mut self, to: FramePhase) -> Result<()> {
        self.phase = self.phase.transition(to)?;
        Ok(())
    }

    fn run_phases<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut Registry,
        shadows: &mut ShadowPools,
        camera: &FrameCamera,
    ) -> Result<FrameOutput> {
        let frame = self.frame_index;

        self.advance(FramePhase::FrameUniforms)?;
        if registry.apply_pending_environment() {
            log::debug!("frame {frame}: environment switched");
        }
        let uniforms = self.frame_uniforms(registry, camera);
        backend.write_buffer(self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        self.advance(FramePhase::Shadows)?;
        let shadow_faces = shadows.render(backend, registry, frame);
        registry.upload_lights(backend, shadows, frame);

        self.advance(FramePhase::Geometry)?;
        let meshes = registry.mesh_draws();
        let wires = registry.wire_draws();
        backend.geometry_pass(&GeometryPassDesc {
            gbuffer: self.gbuffer,
            frame: self.uniforms,
            transforms: registry.transform_buffer(),
            materials: registry.material_buffer(),
            meshes: &meshes,
            wires: &wires,
        });

        self.advance(FramePhase::Lighting)?;
        backend.light_pass(&LightPassDesc {
            program: &self.light_program,
            frame: self.uniforms,
            gbuffer: self.gbuffer,
            output: self.output,
            clear_color: self.clear_color,
            lights: registry.light_buffers(),
            shadows: shadows.textures(),
            environment: registry.environment_binding(),
        });

        let timings = backend.end_frame();
        self.advance(FramePhase::Idle)?;
        self.frame_index += 1;
        log::trace!(
            "frame {frame}: {} meshes, {} wires, {shadow_faces} shadow faces, {} ns",
            meshes.len(),
            wires.len(),
            timings.total_ns()
        );

        Ok(FrameOutput {
            color: self.output,
            depth: self.gbuffer.depth,
            timings,
            frame,
            shadow_faces,
        })
    }

    fn frame_uniforms(&self, registry: &Registry, camera: &FrameCamera) -> FrameUniforms {
        let w = self.width as f32;
        let h = self.height as f32;
        let [directional, sphere, rect] = registry.light_counts();
        let environment = match (registry.active_environment(), registry.environment_binding()) {
            (Some(env), Some(_)) => [1.0, env.prefiltered_mips.saturating_sub(1) as f32, 0.0, 0.0],
            _ => [0.0; 4],
        };
        FrameUniforms {
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            inv_view_projection: (camera.projection * camera.view)
                .inverse()
                .to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            viewport: [w, h, 1.0 / w, 1.0 / h],
            light_counts: [directional, sphere, rect, 0],
            environment,
        }
    }
}

fn create_targets<B: RenderBackend + ?Sized>(
    backend: &mut B,
    width: u32,
    height: u32,
) -> (GBuffer, TextureId) {
    let gbuffer = GBuffer {
        albedo: backend.create_texture(&TextureDesc::attachment(
            "gbuffer albedo",
            width,
            height,
            ALBEDO_FORMAT,
        )),
        normal: backend.create_texture(&TextureDesc::attachment(
            "gbuffer normal",
            width,
            height,
            NORMAL_FORMAT,
        )),
        material: backend.create_texture(&TextureDesc::attachment(
            "gbuffer material",
            width,
            height,
            MATERIAL_FORMAT,
        )),
        emission: backend.create_texture(&TextureDesc::attachment(
            "gbuffer emission",
            width,
            height,
            EMISSION_FORMAT,
        )),
        depth: backend.create_texture(&TextureDesc::attachment(
            "gbuffer depth",
            width,
            height,
            DEPTH_FORMAT,
        )),
    };
    let output = backend.create_texture(&TextureDesc::attachment(
        "lit color",
        width,
        height,
        OUTPUT_FORMAT,
    ));
    (gbuffer, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{Command, HeadlessBackend};
    use crate::options::RendererOptions;

    #[test]
    fn phases_only_step_forward() {
        let mut phase = FramePhase::Idle;
        for to in [
            FramePhase::FrameUniforms,
            FramePhase::Shadows,
            FramePhase::Geometry,
            FramePhase::Lighting,
            FramePhase::Idle,
        ] {
            phase = phase.transition(to).unwrap();
        }
        assert_eq!(phase, FramePhase::Idle);

        let err = FramePhase::FrameUniforms
            .transition(FramePhase::Geometry)
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert!(FramePhase::Idle.transition(FramePhase::Lighting).is_err());
    }

    #[test]
    fn empty_frame_runs_every_pass_in_order() {
        let mut backend = HeadlessBackend::new();
        let options = RendererOptions::default();
        let mut shadows = ShadowPools::new(&mut backend, &options.shadows);
        let mut registry = Registry::new(&mut backend, &options);
        let mut frames = FrameOrchestrator::new(&mut backend, &options.frame, &shadows).unwrap();
        let camera = FrameCamera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.5, 0.1, 100.0);

        let _ = backend.take_commands();
        let out = frames
            .render_frame(&mut backend, &mut registry, &mut shadows, &camera)
            .unwrap();
        assert_eq!(out.frame, 0);
        assert_eq!(out.shadow_faces, 0);
        assert_eq!(frames.frame_index(), 1);
        assert_eq!(frames.phase(), FramePhase::Idle);

        let cmds = backend.commands();
        let geometry = cmds
            .iter()
            .position(|c| matches!(c, Command::GeometryPass { .. }))
            .unwrap();
        let light = cmds
            .iter()
            .position(|c| matches!(c, Command::LightPass { .. }))
            .unwrap();
        assert_eq!(cmds.first(), Some(&Command::BeginFrame));
        assert!(geometry < light);
        assert_eq!(cmds.last(), Some(&Command::EndFrame));

        let Command::LightPass {
            program,
            environment,
        } = &cmds[light]
        else {
            unreachable!()
        };
        assert_eq!(program.label(), "LightAccumulation[MAX_DIRECTIONAL=4,MAX_RECT=4,MAX_SPHERE=4]");
        assert!(environment.is_none());
    }

    #[test]
    fn resize_rejects_zero_and_recreates_targets() {
        let mut backend = HeadlessBackend::new();
        let options = RendererOptions::default();
        let shadows = ShadowPools::new(&mut backend, &options.shadows);
        let mut frames = FrameOrchestrator::new(&mut backend, &options.frame, &shadows).unwrap();
        assert!(frames.resize(&mut backend, 0, 10).is_err());

        let before = frames.gbuffer();
        frames.resize(&mut backend, 640, 480).unwrap();
        assert_eq!(frames.size(), (640, 480));
        assert_ne!(frames.gbuffer().albedo, before.albedo);
        assert!(backend.texture_desc(before.albedo).is_none());
        assert_eq!(backend.texture_desc(frames.gbuffer().depth).map(|d| d.width), Some(640));
    }
}
