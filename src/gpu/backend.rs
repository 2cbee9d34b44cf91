//! The command seam between the rendering core and a GPU.
//!
//! The core never touches device objects directly. It allocates buffers and
//! textures through [`RenderBackend`], refers to them by opaque ids, and
//! describes whole passes (shadow face, G-buffer fill, light accumulation,
//! compute dispatch) as plain data. The wgpu implementation turns each
//! description into bind groups and encoded passes; the headless
//! implementation records them so pass ordering can be inspected.

use crate::error::Result;
use crate::gpu::layout::{ComputeParams, MeshVertex};
use crate::gpu::shader_key::ShaderKey;

macro_rules! gpu_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a backend-assigned raw id.
            #[must_use]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Backend-assigned raw id.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_id!(
    /// A linear GPU allocation.
    BufferId
);
gpu_id!(
    /// A GPU texture (any shape).
    TextureId
);
gpu_id!(
    /// A material's texture bind set.
    MaterialBindingId
);

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex stream.
    Vertex,
    /// 32-bit index stream.
    Index,
    /// Range-bound uniform block(s).
    Uniform,
    /// Read-only storage array.
    Storage,
}

/// Buffer creation parameters.
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug label.
    pub label: String,
    /// Size in bytes.
    pub size: u64,
    /// Binding kind.
    pub usage: BufferUsage,
}

/// Shape of a texture's default sampled view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureShape {
    /// Single 2D image.
    D2,
    /// Array of 2D layers.
    D2Array,
    /// Six-layer cube.
    Cube,
    /// `6 * n` layers viewed as `n` cubes.
    CubeArray,
}

/// Texture creation parameters.
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug label.
    pub label: String,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Array layers (6 per cube).
    pub layers: u32,
    /// Mip levels.
    pub mip_levels: u32,
    /// Texel format.
    pub format: wgpu::TextureFormat,
    /// Default view shape.
    pub shape: TextureShape,
    /// Allowed usages.
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    /// Sampled single-mip 2D texture that can be written from the CPU.
    #[must_use]
    pub fn sampled_2d(label: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            layers: 1,
            mip_levels: 1,
            format,
            shape: TextureShape::D2,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        }
    }

    /// Render target that later passes sample from.
    #[must_use]
    pub fn attachment(label: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            layers: 1,
            mip_levels: 1,
            format,
            shape: TextureShape::D2,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        }
    }

    /// Cube written by compute and sampled afterwards.
    #[must_use]
    pub fn storage_cube(label: &str, size: u32, mip_levels: u32) -> Self {
        Self {
            label: label.to_owned(),
            width: size,
            height: size,
            layers: 6,
            mip_levels,
            format: wgpu::TextureFormat::Rgba16Float,
            shape: TextureShape::Cube,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        }
    }
}

/// One layer of a texture used as a render attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayer {
    /// Target texture.
    pub texture: TextureId,
    /// Array layer.
    pub layer: u32,
}

/// GPU mirror of a registered mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    /// Interleaved [`MeshVertex`] stream.
    pub vertices: BufferId,
    /// `u32` triangle-list indices.
    pub indices: BufferId,
    /// Number of indices.
    pub index_count: u32,
}

/// Per-channel textures of a material; `None` binds the neutral fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    /// Base color map.
    pub diffuse: Option<TextureId>,
    /// Tangent-space normal map.
    pub normal: Option<TextureId>,
    /// Roughness (or packed metal-rough) map.
    pub roughness: Option<TextureId>,
    /// Metalness map.
    pub metalness: Option<TextureId>,
    /// Emission map.
    pub emission: Option<TextureId>,
}

/// One indexed draw in the geometry pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDraw {
    /// Mesh GPU mirror.
    pub mesh: MeshBuffers,
    /// Material texture set.
    pub material: MaterialBindingId,
    /// Byte offset of the renderer's transform range.
    pub transform_offset: u32,
    /// Byte offset of the renderer's material range.
    pub material_offset: u32,
}

/// One line-list draw in the geometry pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireDraw {
    /// Line-list positions (`[f32; 3]` each).
    pub vertices: BufferId,
    /// Number of vertices.
    pub vertex_count: u32,
    /// Byte offset of the renderer's transform range.
    pub transform_offset: u32,
    /// Byte offset of the renderer's material range.
    pub material_offset: u32,
}

/// A shadow-casting mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowCaster {
    /// Mesh GPU mirror.
    pub mesh: MeshBuffers,
    /// Byte offset of the renderer's transform range.
    pub transform_offset: u32,
}

/// Render one shadow face.
#[derive(Debug, Clone)]
pub struct ShadowPassDesc<'a> {
    /// Linear distance target (cube faces); `None` for depth-only faces.
    pub distance: Option<TextureLayer>,
    /// Depth target.
    pub depth: TextureLayer,
    /// Buffer of [`crate::gpu::layout::ShadowPassUniforms`] ranges.
    pub uniforms: BufferId,
    /// Byte offset of this face's range.
    pub uniform_offset: u32,
    /// Per-renderer transform buffer.
    pub transforms: BufferId,
    /// Meshes to rasterize.
    pub casters: &'a [ShadowCaster],
}

/// G-buffer channel textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBuffer {
    /// Base color.
    pub albedo: TextureId,
    /// World normal.
    pub normal: TextureId,
    /// Roughness, metalness, unlit flag.
    pub material: TextureId,
    /// Emitted radiance.
    pub emission: TextureId,
    /// Scene depth.
    pub depth: TextureId,
}

/// Fill the G-buffer.
#[derive(Debug, Clone)]
pub struct GeometryPassDesc<'a> {
    /// Targets.
    pub gbuffer: GBuffer,
    /// Frame uniform buffer.
    pub frame: BufferId,
    /// Per-renderer transform buffer.
    pub transforms: BufferId,
    /// Per-renderer material buffer.
    pub materials: BufferId,
    /// Indexed mesh draws.
    pub meshes: &'a [MeshDraw],
    /// Wire overlay draws.
    pub wires: &'a [WireDraw],
}

/// Flat light arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightBuffers {
    /// Directional light records.
    pub directional: BufferId,
    /// Sphere light records.
    pub sphere: BufferId,
    /// Rect light records.
    pub rect: BufferId,
}

/// Shadow pool textures sampled by the light pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowTextures {
    /// Depth array, one layer per directional slot.
    pub directional: TextureId,
    /// Distance cube array, one cube per sphere slot.
    pub sphere: TextureId,
    /// Distance cube array, one cube per rect slot.
    pub rect: TextureId,
}

/// IBL textures sampled by the light pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentBinding {
    /// Diffuse irradiance cube.
    pub irradiance: TextureId,
    /// Specular prefiltered cube (mip = roughness).
    pub prefiltered: TextureId,
    /// Split-sum BRDF lookup table.
    pub brdf_lut: TextureId,
}

/// Full-screen light accumulation.
#[derive(Debug, Clone)]
pub struct LightPassDesc<'a> {
    /// Shading program key.
    pub program: &'a ShaderKey,
    /// Frame uniform buffer.
    pub frame: BufferId,
    /// G-buffer inputs.
    pub gbuffer: GBuffer,
    /// Accumulated color target.
    pub output: TextureId,
    /// Color behind empty pixels.
    pub clear_color: [f32; 4],
    /// Light arrays.
    pub lights: LightBuffers,
    /// Shadow pools.
    pub shadows: ShadowTextures,
    /// Active environment; `None` binds neutral fallbacks.
    pub environment: Option<EnvironmentBinding>,
}

/// IBL compute programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeProgram {
    /// Equirectangular image → environment cube.
    EquirectToCube,
    /// Environment cube → irradiance cube.
    Irradiance,
    /// Environment cube → one prefiltered mip.
    Prefilter,
    /// Split-sum BRDF integration table.
    BrdfLut,
}

/// A mip of a texture written by a compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageTarget {
    /// Written texture.
    pub texture: TextureId,
    /// Written mip.
    pub mip: u32,
}

/// One compute dispatch.
#[derive(Debug, Clone)]
pub struct ComputeDispatch {
    /// Program to run.
    pub program: ComputeProgram,
    /// Debug label.
    pub label: String,
    /// Sampled input, if the program reads one.
    pub input: Option<TextureId>,
    /// Storage output.
    pub output: StorageTarget,
    /// Uniform parameters.
    pub params: ComputeParams,
    /// Workgroup counts.
    pub workgroups: [u32; 3],
}

/// Device properties the core depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Alignment of range-bound uniform offsets.
    pub min_uniform_offset_alignment: u32,
    /// GPU timestamp queries available.
    pub timestamp_queries: bool,
}

/// Per-pass timings in nanoseconds for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTimings {
    /// All shadow faces.
    pub shadow_ns: u64,
    /// G-buffer fill.
    pub geometry_ns: u64,
    /// Light accumulation.
    pub lighting_ns: u64,
}

impl PassTimings {
    /// Sum of all passes.
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.shadow_ns + self.geometry_ns + self.lighting_ns
    }
}

/// Executes resource and pass requests on a GPU (or records them).
///
/// All calls happen on the rendering thread. Within a frame, passes are
/// submitted in call order and each pass observes every write made by the
/// passes before it.
pub trait RenderBackend {
    /// Device properties.
    fn capabilities(&self) -> BackendCapabilities;

    /// Allocate a buffer. Contents are undefined until written.
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId;
    /// Allocate a buffer initialised with `data`.
    fn create_buffer_init(&mut self, desc: &BufferDesc, data: &[u8]) -> BufferId;
    /// Release a buffer.
    fn destroy_buffer(&mut self, id: BufferId);
    /// Copy `data` into `id` at byte `offset`.
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]);

    /// Allocate a texture.
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;
    /// Upload tightly packed texels into one layer/mip.
    fn write_texture(&mut self, id: TextureId, layer: u32, mip: u32, data: &[u8]);
    /// Release a texture.
    fn destroy_texture(&mut self, id: TextureId);

    /// Upload a mesh.
    fn create_mesh(&mut self, label: &str, vertices: &[MeshVertex], indices: &[u32]) -> MeshBuffers {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let vertices = self.create_buffer_init(
            &BufferDesc {
                label: format!("{label} vertices"),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::Vertex,
            },
            vertex_bytes,
        );
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let index_buffer = self.create_buffer_init(
            &BufferDesc {
                label: format!("{label} indices"),
                size: index_bytes.len() as u64,
                usage: BufferUsage::Index,
            },
            index_bytes,
        );
        MeshBuffers {
            vertices,
            indices: index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// Build a material's texture bind set.
    fn create_material_binding(&mut self, label: &str, textures: &MaterialTextures) -> MaterialBindingId;

    /// Build whatever a pass using `program` needs ahead of the first frame.
    ///
    /// # Errors
    ///
    /// Shader composition or pipeline creation failure.
    fn prepare_program(&mut self, program: &ShaderKey) -> Result<()> {
        let _ = program;
        Ok(())
    }

    /// Start recording a frame.
    fn begin_frame(&mut self);
    /// Render one shadow face.
    fn shadow_pass(&mut self, desc: &ShadowPassDesc<'_>);
    /// Fill the G-buffer.
    fn geometry_pass(&mut self, desc: &GeometryPassDesc<'_>);
    /// Accumulate lighting into the output target.
    fn light_pass(&mut self, desc: &LightPassDesc<'_>);
    /// Submit the frame and report the most recent pass timings available.
    fn end_frame(&mut self) -> PassTimings;
    /// Drop a partially recorded frame.
    fn cancel_frame(&mut self);

    /// Queue a compute dispatch.
    fn dispatch(&mut self, dispatch: &ComputeDispatch);
    /// Make every write to `resources` visible to subsequent dispatches.
    fn barrier(&mut self, resources: &[TextureId]);
    /// Submit queued compute work and wait for it to complete.
    fn flush(&mut self);
}
