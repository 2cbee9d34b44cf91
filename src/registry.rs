//! Resource registries.
//!
//! One generational arena per resource kind plus the GPU mirrors that the
//! passes bind: per-renderer transform and material ranges (aligned to the
//! device's uniform offset alignment) and one flat storage array per light
//! kind. Every `add_*` validates its inputs and referenced handles before
//! touching an arena, so a failed call leaves the registry unchanged.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::arena::{GenKey, GenKeyVector};
use crate::error::{RenderError, Result};
use crate::gpu::backend::{
    BufferDesc, BufferId, BufferUsage, EnvironmentBinding, LightBuffers, MaterialTextures,
    MeshDraw, RenderBackend, ShadowCaster, TextureDesc, WireDraw,
};
use crate::gpu::layout::{
    DirectionalLightRecord, MaterialRecord, RectLightRecord, SphereLightRecord, TransformRecord,
};
use crate::gpu::resizable_buffer::{aligned_stride, ResizableGpuBuffer};
use crate::ibl::IblPipeline;
use crate::options::RendererOptions;
use crate::scene::{
    Aabb, DirectionalLight, Environment, ImageData, LightKey, Material, MaterialEntry, Mesh,
    MeshRenderer, RectLight, Renderable, SphereLight, Texture, WireRenderer,
};
use crate::shadow::ShadowPools;

/// Every resource the renderer knows about.
#[derive(Debug)]
pub struct Registry {
    meshes: GenKeyVector<Mesh>,
    textures: GenKeyVector<Texture>,
    environments: GenKeyVector<Environment>,
    materials: GenKeyVector<MaterialEntry>,
    renderables: GenKeyVector<Renderable>,
    directional_lights: GenKeyVector<DirectionalLight>,
    sphere_lights: GenKeyVector<SphereLight>,
    rect_lights: GenKeyVector<RectLight>,
    /// Directional, sphere, rect.
    light_capacity: [usize; 3],

    transforms: ResizableGpuBuffer,
    transform_stride: u64,
    material_ranges: ResizableGpuBuffer,
    material_stride: u64,
    directional_buffer: ResizableGpuBuffer,
    sphere_buffer: ResizableGpuBuffer,
    rect_buffer: ResizableGpuBuffer,

    ibl: IblPipeline,
    active_environment: Option<GenKey<Environment>>,
    pending_environment: Option<Option<GenKey<Environment>>>,
}

impl Registry {
    /// Empty registry with light capacities taken from the shadow pools.
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, options: &RendererOptions) -> Self {
        let alignment = u64::from(backend.capabilities().min_uniform_offset_alignment);
        let transform_stride = aligned_stride(size_of::<TransformRecord>() as u64, alignment);
        let material_stride = aligned_stride(size_of::<MaterialRecord>() as u64, alignment);
        let s = &options.shadows;

        Self {
            meshes: GenKeyVector::new(),
            textures: GenKeyVector::new(),
            environments: GenKeyVector::new(),
            materials: GenKeyVector::new(),
            renderables: GenKeyVector::new(),
            directional_lights: GenKeyVector::with_capacity(s.directional_capacity as usize),
            sphere_lights: GenKeyVector::with_capacity(s.sphere_capacity as usize),
            rect_lights: GenKeyVector::with_capacity(s.rect_capacity as usize),
            light_capacity: [
                s.directional_capacity as usize,
                s.sphere_capacity as usize,
                s.rect_capacity as usize,
            ],
            transforms: ResizableGpuBuffer::new(
                backend,
                "renderer transforms",
                transform_stride,
                BufferUsage::Uniform,
            ),
            transform_stride,
            material_ranges: ResizableGpuBuffer::new(
                backend,
                "renderer materials",
                material_stride,
                BufferUsage::Uniform,
            ),
            material_stride,
            // One record each so the storage bindings are never empty.
            directional_buffer: ResizableGpuBuffer::new(
                backend,
                "directional lights",
                size_of::<DirectionalLightRecord>() as u64,
                BufferUsage::Storage,
            ),
            sphere_buffer: ResizableGpuBuffer::new(
                backend,
                "sphere lights",
                size_of::<SphereLightRecord>() as u64,
                BufferUsage::Storage,
            ),
            rect_buffer: ResizableGpuBuffer::new(
                backend,
                "rect lights",
                size_of::<RectLightRecord>() as u64,
                BufferUsage::Storage,
            ),
            ibl: IblPipeline::new(&options.ibl),
            active_environment: None,
            pending_environment: None,
        }
    }

    // -- Meshes, textures, environments, materials --------------------------

    /// Upload `mesh` and register it.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] for a mesh with no triangles.
    pub fn add_mesh<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mut mesh: Mesh,
    ) -> Result<GenKey<Mesh>> {
        if mesh.indices().is_empty() {
            return Err(RenderError::Configuration(
                "mesh has no triangles".to_owned(),
            ));
        }
        let label = format!("mesh {}", self.meshes.slot_count());
        let buffers = backend.create_mesh(&label, &mesh.vertices(), mesh.indices());
        mesh.set_gpu(buffers);
        log::debug!(
            "registered {label}: {} vertices, {} triangles",
            mesh.positions().len(),
            mesh.indices().len() / 3
        );
        Ok(self.meshes.insert(mesh))
    }

    /// Upload `image` as a sampled 2D texture.
    ///
    /// Infallible: dimensions and byte length were already checked by
    /// [`ImageData::new`].
    pub fn add_texture<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        image: &ImageData,
    ) -> GenKey<Texture> {
        let gpu = backend.create_texture(&TextureDesc::sampled_2d(
            &format!("texture {}", self.textures.slot_count()),
            image.width(),
            image.height(),
            image.format().texture_format(),
        ));
        backend.write_texture(gpu, 0, 0, &image.upload_bytes());
        self.textures.insert(Texture {
            gpu,
            width: image.width(),
            height: image.height(),
            format: image.format(),
        })
    }

    /// Convert an equirectangular image into an IBL environment.
    ///
    /// Builds the shared BRDF table on first use.
    ///
    /// # Errors
    ///
    /// Propagates precompute failures; the arena is untouched on error.
    pub fn add_environment<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        image: &ImageData,
    ) -> Result<GenKey<Environment>> {
        let _ = self.ibl.brdf_lut(backend)?;
        let environment = self.ibl.precompute(backend, image)?;
        Ok(self.environments.insert(environment))
    }

    /// Register a material.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] if any texture handle is stale; nothing
    /// is allocated in that case.
    pub fn add_material<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        material: Material,
    ) -> Result<GenKey<MaterialEntry>> {
        for key in material.maps.iter() {
            let _ = self.textures.at(key)?;
        }
        let gpu = |key: Option<GenKey<Texture>>| -> Result<_> {
            key.map(|k| self.textures.at(k).map(|t| t.gpu)).transpose()
        };
        let maps = &material.maps;
        let textures = MaterialTextures {
            diffuse: gpu(maps.diffuse)?,
            normal: gpu(maps.normal)?,
            roughness: gpu(maps.roughness)?,
            metalness: if material.merged_metal_rough {
                None
            } else {
                gpu(maps.metalness)?
            },
            emission: gpu(maps.emission)?,
        };
        let label = format!("material {}", self.materials.slot_count());
        let binding = backend.create_material_binding(&label, &textures);
        Ok(self.materials.insert(MaterialEntry { material, binding }))
    }

    // -- Renderables --------------------------------------------------------

    /// Draw `mesh` with `material` under `transform`.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] for a stale mesh or material.
    pub fn add_mesh_renderer<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: GenKey<Mesh>,
        material: GenKey<MaterialEntry>,
        transform: Mat4,
    ) -> Result<GenKey<Renderable>> {
        let local = self.meshes.at(mesh)?.bounds();
        let _ = self.materials.at(material)?;
        let key = self.renderables.insert(Renderable::Mesh(MeshRenderer {
            mesh,
            material,
            transform,
            world_aabb: local.transformed(&transform),
            casts_shadows: true,
        }));
        self.sync_renderer(backend, key.index());
        Ok(key)
    }

    /// Draw a line list (pairs of `positions`) in a flat `color`.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] if `positions` is empty or odd.
    pub fn add_wire_renderer<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        positions: &[Vec3],
        color: Vec3,
        transform: Mat4,
    ) -> Result<GenKey<Renderable>> {
        if positions.is_empty() || positions.len() % 2 != 0 {
            return Err(RenderError::Configuration(format!(
                "wire renderer needs an even, non-zero vertex count, got {}",
                positions.len()
            )));
        }
        let points: Vec<[f32; 3]> = positions.iter().map(|p| p.to_array()).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&points);
        let vertices = backend.create_buffer_init(
            &BufferDesc {
                label: format!("wire {}", self.renderables.slot_count()),
                size: bytes.len() as u64,
                usage: BufferUsage::Vertex,
            },
            bytes,
        );
        let local_aabb = Aabb::from_points(positions);
        let key = self.renderables.insert(Renderable::Wire(WireRenderer {
            vertices,
            vertex_count: positions.len() as u32,
            color,
            transform,
            local_aabb,
            world_aabb: local_aabb.transformed(&transform),
        }));
        self.sync_renderer(backend, key.index());
        Ok(key)
    }

    /// Stop drawing a renderable.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] for a stale key.
    pub fn remove_renderer<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: GenKey<Renderable>,
    ) -> Result<()> {
        let removed = self.renderables.remove_key(key)?;
        self.sync_renderer(backend, key.index());
        if let Renderable::Wire(wire) = removed {
            backend.destroy_buffer(wire.vertices);
        }
        Ok(())
    }

    /// Move a renderable.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] for a stale key.
    pub fn set_renderer_transform<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: GenKey<Renderable>,
        transform: Mat4,
    ) -> Result<()> {
        let local = match self.renderables.at(key)? {
            Renderable::Mesh(m) => self.meshes.at(m.mesh)?.bounds(),
            Renderable::Wire(w) => w.local_aabb,
        };
        match self.renderables.at_mut(key)? {
            Renderable::Mesh(m) => {
                m.transform = transform;
                m.world_aabb = local.transformed(&transform);
            }
            Renderable::Wire(w) => {
                w.transform = transform;
                w.world_aabb = local.transformed(&transform);
            }
        }
        let record = TransformRecord::new(transform);
        self.transforms.write(
            backend,
            u64::from(key.index()) * self.transform_stride,
            bytemuck::bytes_of(&record),
        );
        Ok(())
    }

    /// Toggle shadow casting for a mesh renderer. Wires never cast.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] for a stale key.
    pub fn set_renderer_casts_shadows(
        &mut self,
        key: GenKey<Renderable>,
        casts_shadows: bool,
    ) -> Result<()> {
        if let Renderable::Mesh(m) = self.renderables.at_mut(key)? {
            m.casts_shadows = casts_shadows;
        }
        Ok(())
    }

    /// Write one renderer's ranges, or every range if a buffer had to grow.
    fn sync_renderer<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, index: u32) {
        let slots = self.renderables.slot_count() as u64;
        let grew_transforms = self
            .transforms
            .resize(backend, slots * self.transform_stride);
        let grew_materials = self
            .material_ranges
            .resize(backend, slots * self.material_stride);

        if grew_transforms || grew_materials {
            self.upload_all_renderers(backend);
            return;
        }
        // Freed slots are zeroed so no stale record outlives its renderable.
        let (transform, material) = self.renderables.get_raw(index).map_or_else(
            || (TransformRecord::zeroed(), MaterialRecord::zeroed()),
            |renderable| {
                (
                    TransformRecord::new(renderable.transform()),
                    self.material_record(renderable),
                )
            },
        );
        self.transforms.write(
            backend,
            u64::from(index) * self.transform_stride,
            bytemuck::bytes_of(&transform),
        );
        self.material_ranges.write(
            backend,
            u64::from(index) * self.material_stride,
            bytemuck::bytes_of(&material),
        );
    }

    fn upload_all_renderers<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        let slots = self.renderables.slot_count();
        let t_stride = self.transform_stride as usize;
        let m_stride = self.material_stride as usize;
        let mut transforms = vec![0_u8; slots * t_stride];
        let mut materials = vec![0_u8; slots * m_stride];
        for (key, renderable) in self.renderables.iter() {
            let i = key.index() as usize;
            let t = TransformRecord::new(renderable.transform());
            transforms[i * t_stride..i * t_stride + size_of::<TransformRecord>()]
                .copy_from_slice(bytemuck::bytes_of(&t));
            let m = self.material_record(renderable);
            materials[i * m_stride..i * m_stride + size_of::<MaterialRecord>()]
                .copy_from_slice(bytemuck::bytes_of(&m));
        }
        self.transforms.write(backend, 0, &transforms);
        self.material_ranges.write(backend, 0, &materials);
        log::debug!("re-uploaded {} renderer ranges", self.renderables.len());
    }

    fn material_record(&self, renderable: &Renderable) -> MaterialRecord {
        match renderable {
            Renderable::Mesh(m) => self
                .materials
                .at(m.material)
                .map_or_else(|_| MaterialRecord::zeroed(), |e| e.material.record()),
            Renderable::Wire(w) => MaterialRecord {
                diffuse: w.color.extend(1.0).to_array(),
                emission: [0.0; 4],
                params: [1.0, 0.0, 0.0, 0.0],
                flags: [0, 0, 1, 0],
            },
        }
    }

    // -- Lights -------------------------------------------------------------

    /// Register a directional light.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] when every directional slot is taken.
    pub fn add_directional_light<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        light: DirectionalLight,
    ) -> Result<GenKey<DirectionalLight>> {
        check_capacity("directional", &self.directional_lights, self.light_capacity[0])?;
        let key = self.directional_lights.insert(light);
        sync_light_slot(
            backend,
            &mut self.directional_buffer,
            &self.directional_lights,
            key.index(),
            |l| l.record(None),
            DirectionalLightRecord::inactive(),
        );
        Ok(key)
    }

    /// Register a sphere light.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] when every sphere slot is taken.
    pub fn add_sphere_light<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        light: SphereLight,
    ) -> Result<GenKey<SphereLight>> {
        check_capacity("sphere", &self.sphere_lights, self.light_capacity[1])?;
        let key = self.sphere_lights.insert(light);
        sync_light_slot(
            backend,
            &mut self.sphere_buffer,
            &self.sphere_lights,
            key.index(),
            |l| l.record(None),
            SphereLightRecord::inactive(),
        );
        Ok(key)
    }

    /// Register a rect light.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] when every rect slot is taken.
    pub fn add_rect_light<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        light: RectLight,
    ) -> Result<GenKey<RectLight>> {
        check_capacity("rect", &self.rect_lights, self.light_capacity[2])?;
        let key = self.rect_lights.insert(light);
        sync_light_slot(
            backend,
            &mut self.rect_buffer,
            &self.rect_lights,
            key.index(),
            |l| l.record(None),
            RectLightRecord::inactive(),
        );
        Ok(key)
    }

    /// Remove a light and blank its GPU slot.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] for a stale key.
    pub fn remove_light<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: impl Into<LightKey>,
    ) -> Result<()> {
        match key.into() {
            LightKey::Directional(k) => {
                let _ = self.directional_lights.remove_key(k)?;
                write_light_record(
                    backend,
                    &self.directional_buffer,
                    k.index(),
                    &DirectionalLightRecord::inactive(),
                );
            }
            LightKey::Sphere(k) => {
                let _ = self.sphere_lights.remove_key(k)?;
                write_light_record(
                    backend,
                    &self.sphere_buffer,
                    k.index(),
                    &SphereLightRecord::inactive(),
                );
            }
            LightKey::Rect(k) => {
                let _ = self.rect_lights.remove_key(k)?;
                write_light_record(
                    backend,
                    &self.rect_buffer,
                    k.index(),
                    &RectLightRecord::inactive(),
                );
            }
        }
        Ok(())
    }

    /// Rewrite every light record with this frame's shadow bindings.
    ///
    /// A light whose pool slot was not rendered on `frame` gets shadow
    /// slot `-1`.
    pub fn upload_lights<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        shadows: &ShadowPools,
        frame: u64,
    ) {
        write_light_array(
            backend,
            &self.directional_buffer,
            &self.directional_lights,
            |slot, l| l.record(shadows.directional.fresh(slot, frame)),
            DirectionalLightRecord::inactive(),
        );
        write_light_array(
            backend,
            &self.sphere_buffer,
            &self.sphere_lights,
            |slot, l| l.record(shadows.sphere.fresh(slot, frame)),
            SphereLightRecord::inactive(),
        );
        write_light_array(
            backend,
            &self.rect_buffer,
            &self.rect_lights,
            |slot, l| l.record(shadows.rect.fresh(slot, frame)),
            RectLightRecord::inactive(),
        );
    }

    // -- Environment --------------------------------------------------------

    /// Select the environment used from the next frame on; `None` disables
    /// image-based lighting.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidHandle`] for a stale key.
    pub fn set_environment(&mut self, key: Option<GenKey<Environment>>) -> Result<()> {
        if let Some(k) = key {
            let _ = self.environments.at(k)?;
        }
        self.pending_environment = Some(key);
        Ok(())
    }

    /// Promote a pending [`Registry::set_environment`]; returns `true` if
    /// the active environment changed.
    pub fn apply_pending_environment(&mut self) -> bool {
        match self.pending_environment.take() {
            Some(key) if key != self.active_environment => {
                self.active_environment = key;
                true
            }
            _ => false,
        }
    }

    /// Environment bound by the light pass.
    #[must_use]
    pub fn active_environment(&self) -> Option<&Environment> {
        self.active_environment
            .and_then(|k| self.environments.at(k).ok())
    }

    /// Light-pass bindings for the active environment.
    #[must_use]
    pub fn environment_binding(&self) -> Option<EnvironmentBinding> {
        let env = self.active_environment()?;
        Some(EnvironmentBinding {
            irradiance: env.irradiance,
            prefiltered: env.prefiltered,
            brdf_lut: self.ibl.cached_brdf_lut()?,
        })
    }

    // -- Queries ------------------------------------------------------------

    /// Union of every renderer's world bounds.
    #[must_use]
    pub fn scene_bounds(&self) -> Aabb {
        self.renderables
            .iter()
            .fold(Aabb::EMPTY, |acc, (_, r)| acc.union(&r.world_aabb()))
    }

    /// Indexed draws for the geometry pass, in slot order.
    #[must_use]
    pub fn mesh_draws(&self) -> Vec<MeshDraw> {
        self.renderables
            .iter()
            .filter_map(|(key, r)| match r {
                Renderable::Mesh(m) => {
                    let mesh = self.meshes.at(m.mesh).ok()?.gpu()?;
                    let material = self.materials.at(m.material).ok()?.binding;
                    Some(MeshDraw {
                        mesh,
                        material,
                        transform_offset: self.transform_offset(key),
                        material_offset: self.material_offset(key),
                    })
                }
                Renderable::Wire(_) => None,
            })
            .collect()
    }

    /// Line draws for the geometry pass, in slot order.
    #[must_use]
    pub fn wire_draws(&self) -> Vec<WireDraw> {
        self.renderables
            .iter()
            .filter_map(|(key, r)| match r {
                Renderable::Wire(w) => Some(WireDraw {
                    vertices: w.vertices,
                    vertex_count: w.vertex_count,
                    transform_offset: self.transform_offset(key),
                    material_offset: self.material_offset(key),
                }),
                Renderable::Mesh(_) => None,
            })
            .collect()
    }

    /// Meshes drawn into shadow maps.
    #[must_use]
    pub fn shadow_casters(&self) -> Vec<ShadowCaster> {
        self.renderables
            .iter()
            .filter(|(_, r)| r.casts_shadows())
            .filter_map(|(key, r)| match r {
                Renderable::Mesh(m) => Some(ShadowCaster {
                    mesh: self.meshes.at(m.mesh).ok()?.gpu()?,
                    transform_offset: self.transform_offset(key),
                }),
                Renderable::Wire(_) => None,
            })
            .collect()
    }

    fn transform_offset(&self, key: GenKey<Renderable>) -> u32 {
        (u64::from(key.index()) * self.transform_stride) as u32
    }

    fn material_offset(&self, key: GenKey<Renderable>) -> u32 {
        (u64::from(key.index()) * self.material_stride) as u32
    }

    /// Per-renderer transform ranges.
    #[must_use]
    pub const fn transform_buffer(&self) -> BufferId {
        self.transforms.id()
    }

    /// Per-renderer material ranges.
    #[must_use]
    pub const fn material_buffer(&self) -> BufferId {
        self.material_ranges.id()
    }

    /// Light storage arrays.
    #[must_use]
    pub const fn light_buffers(&self) -> LightBuffers {
        LightBuffers {
            directional: self.directional_buffer.id(),
            sphere: self.sphere_buffer.id(),
            rect: self.rect_buffer.id(),
        }
    }

    /// Slots the light pass iterates per kind (directional, sphere, rect).
    #[must_use]
    pub fn light_counts(&self) -> [u32; 3] {
        [
            self.directional_lights.slot_count() as u32,
            self.sphere_lights.slot_count() as u32,
            self.rect_lights.slot_count() as u32,
        ]
    }

    /// Registered meshes.
    #[must_use]
    pub const fn meshes(&self) -> &GenKeyVector<Mesh> {
        &self.meshes
    }

    /// Registered textures.
    #[must_use]
    pub const fn textures(&self) -> &GenKeyVector<Texture> {
        &self.textures
    }

    /// Registered environments.
    #[must_use]
    pub const fn environments(&self) -> &GenKeyVector<Environment> {
        &self.environments
    }

    /// Registered materials.
    #[must_use]
    pub const fn materials(&self) -> &GenKeyVector<MaterialEntry> {
        &self.materials
    }

    /// Live renderables.
    #[must_use]
    pub const fn renderables(&self) -> &GenKeyVector<Renderable> {
        &self.renderables
    }

    /// Directional light slots.
    #[must_use]
    pub const fn directional_lights(&self) -> &GenKeyVector<DirectionalLight> {
        &self.directional_lights
    }

    /// Sphere light slots.
    #[must_use]
    pub const fn sphere_lights(&self) -> &GenKeyVector<SphereLight> {
        &self.sphere_lights
    }

    /// Rect light slots.
    #[must_use]
    pub const fn rect_lights(&self) -> &GenKeyVector<RectLight> {
        &self.rect_lights
    }

    /// The environment precompute pipeline.
    #[must_use]
    pub const fn ibl(&self) -> &IblPipeline {
        &self.ibl
    }
}

fn check_capacity<T>(kind: &str, lights: &GenKeyVector<T>, capacity: usize) -> Result<()> {
    if lights.len() >= capacity {
        return Err(RenderError::Configuration(format!(
            "all {capacity} {kind} light slots are in use"
        )));
    }
    Ok(())
}

/// Grow the array to cover every slot; after growth every record is
/// rewritten, otherwise only `slot`.
fn sync_light_slot<B, L, R>(
    backend: &mut B,
    buffer: &mut ResizableGpuBuffer,
    lights: &GenKeyVector<L>,
    slot: u32,
    record: impl Fn(&L) -> R,
    inactive: R,
) where
    B: RenderBackend + ?Sized,
    R: Pod,
{
    let required = (size_of::<R>() * lights.slot_count().max(1)) as u64;
    if buffer.resize(backend, required) {
        write_light_array(backend, buffer, lights, |_, l| record(l), inactive);
        return;
    }
    let value = lights.get_raw(slot).map_or(inactive, record);
    write_light_record(backend, buffer, slot, &value);
}

fn write_light_record<B: RenderBackend + ?Sized, R: Pod>(
    backend: &mut B,
    buffer: &ResizableGpuBuffer,
    slot: u32,
    record: &R,
) {
    buffer.write(
        backend,
        u64::from(slot) * size_of::<R>() as u64,
        bytemuck::bytes_of(record),
    );
}

fn write_light_array<B, L, R>(
    backend: &mut B,
    buffer: &ResizableGpuBuffer,
    lights: &GenKeyVector<L>,
    record: impl Fn(usize, &L) -> R,
    inactive: R,
) where
    B: RenderBackend + ?Sized,
    R: Pod,
{
    let slots = lights.slot_count();
    if slots == 0 {
        return;
    }
    let records: Vec<R> = (0..slots)
        .map(|i| lights.get_raw(i as u32).map_or(inactive, |l| record(i, l)))
        .collect();
    buffer.write(backend, 0, bytemuck::cast_slice(&records));
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::gpu::headless::{Command, HeadlessBackend};
    use crate::scene::MaterialMaps;

    fn quad() -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![Vec3::Z; 4],
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
        .unwrap()
    }

    fn setup() -> (HeadlessBackend, Registry) {
        let mut backend = HeadlessBackend::new();
        let registry = Registry::new(&mut backend, &RendererOptions::default());
        (backend, registry)
    }

    #[test]
    fn material_with_stale_texture_is_rejected_untouched() {
        let (mut backend, mut registry) = setup();
        let image = ImageData::new(1, 1, crate::scene::ImageFormat::Rgba8, vec![255; 4]).unwrap();
        let good = registry.add_texture(&mut backend, &image);
        let material = Material {
            maps: MaterialMaps {
                diffuse: Some(good),
                normal: Some(GenKey::from_parts(3, 9)),
                ..MaterialMaps::default()
            },
            ..Material::default()
        };
        let before = backend.commands().len();
        let err = registry.add_material(&mut backend, material).unwrap_err();
        assert!(err.is_invalid_handle());
        assert!(registry.materials().is_empty());
        assert_eq!(backend.commands().len(), before);
    }

    #[test]
    fn merged_material_skips_metalness_binding() {
        let (mut backend, mut registry) = setup();
        let image = ImageData::new(1, 1, crate::scene::ImageFormat::Rgba8, vec![0; 4]).unwrap();
        let tex = registry.add_texture(&mut backend, &image);
        let material = Material {
            maps: MaterialMaps {
                roughness: Some(tex),
                metalness: Some(tex),
                ..MaterialMaps::default()
            },
            merged_metal_rough: true,
            ..Material::default()
        };
        let _ = registry.add_material(&mut backend, material).unwrap();
        let textures = backend
            .commands()
            .iter()
            .rev()
            .find_map(|c| match c {
                Command::CreateMaterialBinding { textures, .. } => Some(*textures),
                _ => None,
            })
            .unwrap();
        assert!(textures.roughness.is_some());
        assert!(textures.metalness.is_none());
    }

    #[test]
    fn mesh_renderer_world_bounds_follow_transform() {
        let (mut backend, mut registry) = setup();
        let mesh = registry.add_mesh(&mut backend, quad()).unwrap();
        let material = registry
            .add_material(&mut backend, Material::default())
            .unwrap();
        let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let key = registry
            .add_mesh_renderer(&mut backend, mesh, material, transform)
            .unwrap();
        let aabb = registry.renderables().at(key).unwrap().world_aabb();
        assert_eq!(aabb.min, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 1.0, 5.0));

        registry
            .set_renderer_transform(&mut backend, key, Mat4::IDENTITY)
            .unwrap();
        assert_eq!(registry.scene_bounds().max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn renderer_ranges_are_rewritten_after_growth() {
        let (mut backend, mut registry) = setup();
        let mesh = registry.add_mesh(&mut backend, quad()).unwrap();
        let material = registry
            .add_material(&mut backend, Material::default())
            .unwrap();
        let mut keys = Vec::new();
        for i in 0..6 {
            let t = Mat4::from_translation(Vec3::X * i as f32);
            keys.push(
                registry
                    .add_mesh_renderer(&mut backend, mesh, material, t)
                    .unwrap(),
            );
        }
        let stride = 256;
        for (i, key) in keys.iter().enumerate() {
            let record: TransformRecord = backend
                .read_record(registry.transform_buffer(), u64::from(key.index()) * stride)
                .unwrap();
            assert_eq!(record.model[3][0], i as f32);
        }
        let draws = registry.mesh_draws();
        assert_eq!(draws.len(), 6);
        assert_eq!(draws[2].transform_offset, 512);
        assert_eq!(draws[2].material_offset, 512);
    }

    #[test]
    fn removed_renderer_range_is_zeroed() {
        let (mut backend, mut registry) = setup();
        let mesh = registry.add_mesh(&mut backend, quad()).unwrap();
        let material = registry
            .add_material(&mut backend, Material::from_color(Vec3::ONE))
            .unwrap();
        let keep = registry
            .add_mesh_renderer(&mut backend, mesh, material, Mat4::IDENTITY)
            .unwrap();
        let gone = registry
            .add_mesh_renderer(&mut backend, mesh, material, Mat4::from_scale(Vec3::splat(2.0)))
            .unwrap();
        registry.remove_renderer(&mut backend, gone).unwrap();

        let offset = u64::from(gone.index()) * 256;
        let t: TransformRecord = backend.read_record(registry.transform_buffer(), offset).unwrap();
        let m: MaterialRecord = backend.read_record(registry.material_buffer(), offset).unwrap();
        assert_eq!(bytemuck::bytes_of(&t), bytemuck::bytes_of(&TransformRecord::zeroed()));
        assert_eq!(bytemuck::bytes_of(&m), bytemuck::bytes_of(&MaterialRecord::zeroed()));

        let live: TransformRecord = backend
            .read_record(registry.transform_buffer(), u64::from(keep.index()) * 256)
            .unwrap();
        assert_eq!(live.model[0][0], 1.0);
    }

    #[test]
    fn wire_renderer_needs_pairs() {
        let (mut backend, mut registry) = setup();
        let err = registry
            .add_wire_renderer(&mut backend, &[Vec3::ZERO; 3], Vec3::ONE, Mat4::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert!(registry.renderables().is_empty());

        let key = registry
            .add_wire_renderer(&mut backend, &[Vec3::ZERO, Vec3::ONE], Vec3::X, Mat4::IDENTITY)
            .unwrap();
        assert_eq!(registry.wire_draws().len(), 1);
        assert!(registry.shadow_casters().is_empty());
        let m: MaterialRecord = backend
            .read_record(registry.material_buffer(), 0)
            .unwrap();
        assert_eq!(m.flags[2], 1);
        registry.remove_renderer(&mut backend, key).unwrap();
        assert!(registry.wire_draws().is_empty());
        assert!(matches!(
            backend.commands().last(),
            Some(Command::DestroyBuffer(_))
        ));
    }

    #[test]
    fn light_capacity_is_enforced() {
        let (mut backend, mut registry) = setup();
        for _ in 0..4 {
            let _ = registry
                .add_sphere_light(&mut backend, SphereLight::new(Vec3::ZERO, Vec3::ONE, 0.1))
                .unwrap();
        }
        let err = registry
            .add_sphere_light(&mut backend, SphereLight::new(Vec3::ZERO, Vec3::ONE, 0.1))
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert_eq!(registry.light_counts(), [0, 4, 0]);
    }

    #[test]
    fn removed_light_slot_is_blanked() {
        let (mut backend, mut registry) = setup();
        let a = registry
            .add_directional_light(&mut backend, DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE))
            .unwrap();
        let b = registry
            .add_directional_light(&mut backend, DirectionalLight::new(Vec3::X, Vec3::ONE))
            .unwrap();
        registry.remove_light(&mut backend, a).unwrap();
        assert!(registry.remove_light(&mut backend, a).is_err());

        let buffer = registry.light_buffers().directional;
        let blank: DirectionalLightRecord = backend.read_record(buffer, 0).unwrap();
        assert_eq!(blank, DirectionalLightRecord::inactive());
        let live: DirectionalLightRecord = backend
            .read_record(buffer, size_of::<DirectionalLightRecord>() as u64)
            .unwrap();
        assert_eq!(live.direction, [1.0, 0.0, 0.0, 1.0]);
        assert!(registry.directional_lights().at(b).is_ok());
    }

    #[test]
    fn environment_switch_waits_for_apply() {
        let (mut backend, mut registry) = setup();
        let image = ImageData::from_rgba32f(2, 1, &[[1.0; 4]; 2]).unwrap();
        let env = registry.add_environment(&mut backend, &image).unwrap();
        registry.set_environment(Some(env)).unwrap();
        assert!(registry.environment_binding().is_none());
        assert!(registry.apply_pending_environment());
        assert!(!registry.apply_pending_environment());
        let binding = registry.environment_binding().unwrap();
        assert_eq!(
            binding.irradiance,
            registry.environments().at(env).unwrap().irradiance
        );

        assert!(registry.set_environment(Some(GenKey::from_parts(1, 0))).is_err());
        registry.set_environment(None).unwrap();
        assert!(registry.apply_pending_environment());
        assert!(registry.environment_binding().is_none());
    }
}
