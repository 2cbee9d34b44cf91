//! Shadow-map pools.
//!
//! Each light kind owns a fixed-capacity pool whose slot `i` belongs to the
//! light in arena slot `i`. A slot is re-rendered on a frame iff that arena
//! slot is occupied and its light casts shadows; otherwise the slot's
//! record is left as it was and the light's GPU record carries no shadow.

/// Six-face cameras for sphere and rect lights.
pub mod cube;
/// Orthographic camera for directional lights.
pub mod directional;

use glam::{Mat4, Vec3};

use crate::gpu::backend::{
    BufferUsage, RenderBackend, ShadowCaster, ShadowPassDesc, ShadowTextures,
    TextureDesc, TextureId, TextureLayer, TextureShape,
};
use crate::gpu::layout::ShadowPassUniforms;
use crate::gpu::resizable_buffer::{aligned_stride, ResizableGpuBuffer};
use crate::options::ShadowOptions;
use crate::registry::Registry;

/// Directional shadow for one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalShadow {
    /// Light-space view-projection.
    pub view_proj: Mat4,
    /// Shadow camera position.
    pub light_position: Vec3,
    /// Diameter covered by the map.
    pub extent: f32,
}

/// Cube shadow for one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeShadow {
    /// View-projection per face, +X, -X, +Y, -Y, +Z, -Z.
    pub face_view_proj: [Mat4; 6],
    /// Light position.
    pub light_position: Vec3,
    /// Near plane.
    pub near: f32,
    /// Far plane.
    pub far: f32,
}

/// One pool slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowRecord<S> {
    /// Last computed shadow; `None` until the slot is first rendered.
    pub shadow: Option<S>,
    /// Frame the slot was last rendered on.
    pub updated_frame: Option<u64>,
}

impl<S> Default for ShadowRecord<S> {
    fn default() -> Self {
        Self {
            shadow: None,
            updated_frame: None,
        }
    }
}

/// Fixed-capacity shadow storage for one light kind.
#[derive(Debug)]
pub struct ShadowMapPool<S> {
    records: Vec<ShadowRecord<S>>,
    resolution: u32,
    /// Sampled texture: depth array (directional) or distance cube array.
    maps: TextureId,
    /// Depth attachment used while rendering cube faces.
    scratch_depth: Option<TextureId>,
}

impl<S: Copy> ShadowMapPool<S> {
    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Slot record, if `slot` is in range.
    #[must_use]
    pub fn record(&self, slot: usize) -> Option<&ShadowRecord<S>> {
        self.records.get(slot)
    }

    /// The slot's shadow if it was rendered on `frame`.
    #[must_use]
    pub fn fresh(&self, slot: usize, frame: u64) -> Option<(u32, &S)> {
        let record = self.records.get(slot)?;
        if record.updated_frame != Some(frame) {
            return None;
        }
        record.shadow.as_ref().map(|s| (slot as u32, s))
    }

    /// Sampled shadow texture.
    #[must_use]
    pub const fn maps(&self) -> TextureId {
        self.maps
    }

    /// Edge length of each map in texels.
    #[must_use]
    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    fn store(&mut self, slot: usize, shadow: S, frame: u64) {
        if let Some(record) = self.records.get_mut(slot) {
            record.shadow = Some(shadow);
            record.updated_frame = Some(frame);
        }
    }
}

/// A face queued for rendering this frame.
struct FaceJob {
    uniforms: ShadowPassUniforms,
    depth: TextureLayer,
    distance: Option<TextureLayer>,
}

/// The three per-kind pools plus the per-face uniform buffer.
#[derive(Debug)]
pub struct ShadowPools {
    /// Directional slots.
    pub directional: ShadowMapPool<DirectionalShadow>,
    /// Sphere slots.
    pub sphere: ShadowMapPool<CubeShadow>,
    /// Rect slots.
    pub rect: ShadowMapPool<CubeShadow>,
    uniforms: ResizableGpuBuffer,
    stride: u64,
    options: ShadowOptions,
}

impl ShadowPools {
    /// Allocate pool textures sized from `options`.
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, options: &ShadowOptions) -> Self {
        let alignment = u64::from(backend.capabilities().min_uniform_offset_alignment);
        let stride = aligned_stride(size_of::<ShadowPassUniforms>() as u64, alignment);

        let directional = ShadowMapPool {
            records: vec![ShadowRecord::default(); options.directional_capacity as usize],
            resolution: options.directional_resolution,
            maps: backend.create_texture(&TextureDesc {
                label: "directional shadow maps".to_owned(),
                width: options.directional_resolution,
                height: options.directional_resolution,
                layers: options.directional_capacity,
                mip_levels: 1,
                format: wgpu::TextureFormat::Depth32Float,
                shape: TextureShape::D2Array,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
            }),
            scratch_depth: None,
        };
        let sphere = Self::cube_pool(backend, "sphere", options.sphere_capacity, options.cube_resolution);
        let rect = Self::cube_pool(backend, "rect", options.rect_capacity, options.cube_resolution);
        let uniforms = ResizableGpuBuffer::new(
            backend,
            "shadow pass uniforms",
            stride * 8,
            BufferUsage::Uniform,
        );

        Self {
            directional,
            sphere,
            rect,
            uniforms,
            stride,
            options: options.clone(),
        }
    }

    fn cube_pool<B: RenderBackend + ?Sized>(
        backend: &mut B,
        kind: &str,
        capacity: u32,
        resolution: u32,
    ) -> ShadowMapPool<CubeShadow> {
        let maps = backend.create_texture(&TextureDesc {
            label: format!("{kind} shadow cubes"),
            width: resolution,
            height: resolution,
            layers: capacity * 6,
            mip_levels: 1,
            format: wgpu::TextureFormat::R32Float,
            shape: TextureShape::CubeArray,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        });
        let scratch = backend.create_texture(&TextureDesc {
            label: format!("{kind} shadow depth"),
            width: resolution,
            height: resolution,
            layers: 1,
            mip_levels: 1,
            format: wgpu::TextureFormat::Depth32Float,
            shape: TextureShape::D2,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        });
        ShadowMapPool {
            records: vec![ShadowRecord::default(); capacity as usize],
            resolution,
            maps,
            scratch_depth: Some(scratch),
        }
    }

    /// Textures sampled by the light pass.
    #[must_use]
    pub const fn textures(&self) -> ShadowTextures {
        ShadowTextures {
            directional: self.directional.maps,
            sphere: self.sphere.maps,
            rect: self.rect.maps,
        }
    }

    /// Shader define values: per-kind slot capacities.
    #[must_use]
    pub fn capacities(&self) -> [u32; 3] {
        [
            self.directional.capacity() as u32,
            self.sphere.capacity() as u32,
            self.rect.capacity() as u32,
        ]
    }

    /// Recompute and render every eligible slot for `frame`.
    ///
    /// Returns the number of faces rendered.
    pub fn render<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &Registry,
        frame: u64,
    ) -> usize {
        let mut jobs = Vec::new();
        self.plan_directional(registry, frame, &mut jobs);
        self.plan_cubes(registry, frame, &mut jobs);
        if jobs.is_empty() {
            return 0;
        }

        let _ = self.uniforms.resize(backend, self.stride * jobs.len() as u64);
        let mut bytes = vec![0_u8; (self.stride as usize) * jobs.len()];
        for (i, job) in jobs.iter().enumerate() {
            let at = i * self.stride as usize;
            bytes[at..at + size_of::<ShadowPassUniforms>()]
                .copy_from_slice(bytemuck::bytes_of(&job.uniforms));
        }
        self.uniforms.write(backend, 0, &bytes);

        let casters: Vec<ShadowCaster> = registry.shadow_casters();
        for (i, job) in jobs.iter().enumerate() {
            backend.shadow_pass(&ShadowPassDesc {
                distance: job.distance,
                depth: job.depth,
                uniforms: self.uniforms.id(),
                uniform_offset: (i as u64 * self.stride) as u32,
                transforms: registry.transform_buffer(),
                casters: &casters,
            });
        }
        log::trace!("frame {frame}: {} shadow faces", jobs.len());
        jobs.len()
    }

    fn plan_directional(&mut self, registry: &Registry, frame: u64, jobs: &mut Vec<FaceJob>) {
        let bounds = registry.scene_bounds();
        let lights = registry.directional_lights();
        for slot in 0..self.directional.capacity() {
            let Some(light) = lights.get_raw(slot as u32) else {
                continue;
            };
            if !light.casts_shadows {
                continue;
            }
            let shadow =
                directional::fit_directional(light.direction, &bounds, self.options.near_epsilon);
            jobs.push(FaceJob {
                uniforms: ShadowPassUniforms::new(
                    shadow.view_proj,
                    shadow.light_position,
                    0.0,
                    shadow.extent,
                    false,
                ),
                depth: TextureLayer {
                    texture: self.directional.maps,
                    layer: slot as u32,
                },
                distance: None,
            });
            self.directional.store(slot, shadow, frame);
        }
    }

    fn plan_cubes(&mut self, registry: &Registry, frame: u64, jobs: &mut Vec<FaceJob>) {
        let tolerance = self.options.energy_tolerance;
        let near_epsilon = self.options.near_epsilon;

        let spheres = registry.sphere_lights();
        for slot in 0..self.sphere.capacity() {
            let Some(light) = spheres.get_raw(slot as u32) else {
                continue;
            };
            if !light.casts_shadows {
                continue;
            }
            let shadow = cube::fit_cube(
                light.position,
                light.radius,
                light.intensity,
                tolerance,
                near_epsilon,
            );
            push_cube_faces(&self.sphere, slot, &shadow, jobs);
            self.sphere.store(slot, shadow, frame);
        }

        let rects = registry.rect_lights();
        for slot in 0..self.rect.capacity() {
            let Some(light) = rects.get_raw(slot as u32) else {
                continue;
            };
            if !light.casts_shadows {
                continue;
            }
            let shadow = cube::fit_cube(
                light.position(),
                light.radius(),
                light.intensity,
                tolerance,
                near_epsilon,
            );
            push_cube_faces(&self.rect, slot, &shadow, jobs);
            self.rect.store(slot, shadow, frame);
        }
    }
}

fn push_cube_faces(
    pool: &ShadowMapPool<CubeShadow>,
    slot: usize,
    shadow: &CubeShadow,
    jobs: &mut Vec<FaceJob>,
) {
    let Some(scratch) = pool.scratch_depth else {
        return;
    };
    for (face, view_proj) in shadow.face_view_proj.iter().enumerate() {
        jobs.push(FaceJob {
            uniforms: ShadowPassUniforms::new(
                *view_proj,
                shadow.light_position,
                shadow.near,
                shadow.far,
                true,
            ),
            depth: TextureLayer {
                texture: scratch,
                layer: 0,
            },
            distance: Some(TextureLayer {
                texture: pool.maps,
                layer: (slot * 6 + face) as u32,
            }),
        });
    }
}
