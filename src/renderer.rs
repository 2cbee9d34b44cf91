//! The public facade: one object that owns a backend and everything built
//! on it.

use glam::{Mat4, Vec3};

use crate::arena::GenKey;
use crate::error::Result;
use crate::frame::{FrameCamera, FrameOrchestrator, FrameOutput};
use crate::gpu::backend::RenderBackend;
use crate::options::RendererOptions;
use crate::registry::Registry;
use crate::scene::{
    DirectionalLight, Environment, ImageData, LightKey, Material, MaterialEntry, Mesh, RectLight,
    Renderable, SphereLight, Texture,
};
use crate::shadow::ShadowPools;

/// Owns a [`RenderBackend`], the resource [`Registry`], the shadow pools and
/// the [`FrameOrchestrator`].
///
/// Every mutation goes through `&mut self` on the rendering thread; GPU
/// mirrors are updated before the call returns.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    registry: Registry,
    shadows: ShadowPools,
    frames: FrameOrchestrator,
    options: RendererOptions,
}

impl<B: RenderBackend> Renderer<B> {
    /// Validate `options` and allocate pools, buffers and frame targets on
    /// `backend`.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] for invalid options, or a shader
    /// error from building the light program.
    pub fn new(mut backend: B, options: &RendererOptions) -> Result<Self> {
        options.validate()?;
        let shadows = ShadowPools::new(&mut backend, &options.shadows);
        let registry = Registry::new(&mut backend, options);
        let frames = FrameOrchestrator::new(&mut backend, &options.frame, &shadows)?;
        log::info!(
            "renderer ready: {}x{}, shadow slots {:?}",
            options.frame.width,
            options.frame.height,
            shadows.capacities()
        );
        Ok(Self {
            backend,
            registry,
            shadows,
            frames,
            options: options.clone(),
        })
    }

    /// The backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably (e.g. to read back a frame output).
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Registered resources.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shadow slot state.
    #[must_use]
    pub const fn shadows(&self) -> &ShadowPools {
        &self.shadows
    }

    /// Frame state.
    #[must_use]
    pub const fn frames(&self) -> &FrameOrchestrator {
        &self.frames
    }

    /// Options the renderer was built with.
    #[must_use]
    pub const fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// See [`Registry::add_mesh`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] for an empty mesh.
    pub fn add_mesh(&mut self, mesh: Mesh) -> Result<GenKey<Mesh>> {
        self.registry.add_mesh(&mut self.backend, mesh)
    }

    /// See [`Registry::add_texture`]. Image validation happens earlier, in
    /// [`ImageData::new`].
    pub fn add_texture(&mut self, image: &ImageData) -> GenKey<Texture> {
        self.registry.add_texture(&mut self.backend, image)
    }

    /// See [`Registry::add_environment`].
    ///
    /// # Errors
    ///
    /// Propagates IBL precompute failures.
    pub fn add_environment(&mut self, image: &ImageData) -> Result<GenKey<Environment>> {
        self.registry.add_environment(&mut self.backend, image)
    }

    /// See [`Registry::add_material`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale texture handle.
    pub fn add_material(&mut self, material: Material) -> Result<GenKey<MaterialEntry>> {
        self.registry.add_material(&mut self.backend, material)
    }

    /// See [`Registry::add_mesh_renderer`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale mesh or material.
    pub fn add_mesh_renderer(
        &mut self,
        mesh: GenKey<Mesh>,
        material: GenKey<MaterialEntry>,
        transform: Mat4,
    ) -> Result<GenKey<Renderable>> {
        self.registry
            .add_mesh_renderer(&mut self.backend, mesh, material, transform)
    }

    /// See [`Registry::add_wire_renderer`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] for an empty or odd vertex list.
    pub fn add_wire_renderer(
        &mut self,
        positions: &[Vec3],
        color: Vec3,
        transform: Mat4,
    ) -> Result<GenKey<Renderable>> {
        self.registry
            .add_wire_renderer(&mut self.backend, positions, color, transform)
    }

    /// See [`Registry::remove_renderer`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale key.
    pub fn remove_renderer(&mut self, key: GenKey<Renderable>) -> Result<()> {
        self.registry.remove_renderer(&mut self.backend, key)
    }

    /// See [`Registry::set_renderer_transform`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale key.
    pub fn set_renderer_transform(&mut self, key: GenKey<Renderable>, transform: Mat4) -> Result<()> {
        self.registry
            .set_renderer_transform(&mut self.backend, key, transform)
    }

    /// See [`Registry::set_renderer_casts_shadows`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale key.
    pub fn set_renderer_casts_shadows(
        &mut self,
        key: GenKey<Renderable>,
        casts_shadows: bool,
    ) -> Result<()> {
        self.registry.set_renderer_casts_shadows(key, casts_shadows)
    }

    /// See [`Registry::add_directional_light`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] when every slot is taken.
    pub fn add_directional_light(
        &mut self,
        light: DirectionalLight,
    ) -> Result<GenKey<DirectionalLight>> {
        self.registry.add_directional_light(&mut self.backend, light)
    }

    /// See [`Registry::add_sphere_light`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] when every slot is taken.
    pub fn add_sphere_light(&mut self, light: SphereLight) -> Result<GenKey<SphereLight>> {
        self.registry.add_sphere_light(&mut self.backend, light)
    }

    /// See [`Registry::add_rect_light`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] when every slot is taken.
    pub fn add_rect_light(&mut self, light: RectLight) -> Result<GenKey<RectLight>> {
        self.registry.add_rect_light(&mut self.backend, light)
    }

    /// See [`Registry::remove_light`].
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale key.
    pub fn remove_light(&mut self, key: impl Into<LightKey>) -> Result<()> {
        self.registry.remove_light(&mut self.backend, key)
    }

    /// Select the environment used from the next frame on (`None` disables
    /// image-based lighting).
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::InvalidHandle`] for a stale key.
    pub fn set_environment(&mut self, key: Option<GenKey<Environment>>) -> Result<()> {
        self.registry.set_environment(key)
    }

    /// Recreate the frame targets at a new size.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] for a zero extent.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.frames.resize(&mut self.backend, width, height)?;
        self.options.frame.width = width;
        self.options.frame.height = height;
        Ok(())
    }

    /// Render one frame from `camera`.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Configuration`] if the frame state machine is
    /// violated; the partial frame is dropped.
    pub fn render_frame(&mut self, camera: &FrameCamera) -> Result<FrameOutput> {
        self.frames.render_frame(
            &mut self.backend,
            &mut self.registry,
            &mut self.shadows,
            camera,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{Command, HeadlessBackend};
    use crate::RenderError;

    fn renderer() -> Renderer<HeadlessBackend> {
        Renderer::new(HeadlessBackend::new(), &RendererOptions::default()).unwrap()
    }

    fn camera() -> FrameCamera {
        FrameCamera::look_at(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_3,
            16.0 / 9.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn invalid_options_are_rejected_before_allocation() {
        let mut options = RendererOptions::default();
        options.shadows.cube_resolution = 0;
        let err = Renderer::new(HeadlessBackend::new(), &options).err().unwrap();
        assert!(matches!(err, RenderError::Configuration(_)));
    }

    #[test]
    fn frames_count_up() {
        let mut r = renderer();
        let first = r.render_frame(&camera()).unwrap();
        let second = r.render_frame(&camera()).unwrap();
        assert_eq!(first.frame, 0);
        assert_eq!(second.frame, 1);
        assert_eq!(r.frames().frame_index(), 2);
    }

    #[test]
    fn resize_updates_options() {
        let mut r = renderer();
        r.resize(640, 360).unwrap();
        assert_eq!(r.frames().size(), (640, 360));
        assert_eq!((r.options().frame.width, r.options().frame.height), (640, 360));
        assert!(r.resize(0, 360).is_err());
    }

    #[test]
    fn wire_renderer_draws_without_casting() {
        let mut r = renderer();
        let _ = r
            .add_wire_renderer(
                &[Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
                Vec3::ONE,
                Mat4::IDENTITY,
            )
            .unwrap();
        let _ = r.add_directional_light(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE)).unwrap();
        let output = r.render_frame(&camera()).unwrap();
        assert_eq!(output.shadow_faces, 1);
        let casters: Vec<usize> = r
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::ShadowPass { casters, .. } => Some(*casters),
                _ => None,
            })
            .collect();
        assert_eq!(casters, vec![0]);
        assert!(r
            .backend()
            .commands()
            .iter()
            .any(|c| *c == Command::GeometryPass { meshes: 0, wires: 1 }));
    }
}
