//! GPU record layouts.
//!
//! Every record written into a GPU-mirrored buffer is declared here and must
//! match the WGSL struct of the same name in
//! `assets/shaders/modules/types.wgsl` field for field. Nothing checks this at
//! runtime: reordering a field on one side silently breaks shading. Bump
//! [`LAYOUT_VERSION`] whenever a record changes.
//!
//! All records are 16-byte multiples so they can be laid out back to back in
//! storage arrays (unpadded stride) or placed at aligned offsets in uniform
//! buffers (padded stride, see [`super::resizable_buffer::aligned_stride`]).

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Version of the record layouts declared in this module.
pub const LAYOUT_VERSION: u32 = 3;

/// Material texture presence bits (`MaterialRecord::flags[0]`).
pub mod texture_bits {
    /// Diffuse/albedo map bound.
    pub const DIFFUSE: u32 = 1 << 0;
    /// Tangent-space normal map bound.
    pub const NORMAL: u32 = 1 << 1;
    /// Roughness map bound (also metalness when packed).
    pub const ROUGHNESS: u32 = 1 << 2;
    /// Metalness map bound.
    pub const METALNESS: u32 = 1 << 3;
    /// Emission map bound.
    pub const EMISSION: u32 = 1 << 4;
}

/// Per-frame camera and scene constants.
///
/// WGSL layout:
///   view: mat4x4<f32>                 (offset 0)
///   projection: mat4x4<f32>           (offset 64)
///   inv_view_projection: mat4x4<f32>  (offset 128)
///   camera_position: vec4<f32>        (offset 192)
///   viewport: vec4<f32>               (offset 208)  width, height, 1/w, 1/h
///   light_counts: vec4<u32>           (offset 224)  dir, sphere, rect slots
///   environment: vec4<f32>            (offset 240)  enabled, max mip, -, -
///   Total: 256 bytes
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FrameUniforms {
    /// World → view.
    pub view: [[f32; 4]; 4],
    /// View → clip.
    pub projection: [[f32; 4]; 4],
    /// Clip → world, for position reconstruction in the light pass.
    pub inv_view_projection: [[f32; 4]; 4],
    /// Eye position (xyz), w unused.
    pub camera_position: [f32; 4],
    /// Width, height, 1/width, 1/height.
    pub viewport: [f32; 4],
    /// Slot counts per light kind (directional, sphere, rect), w unused.
    pub light_counts: [u32; 4],
    /// x = 1 when an environment is bound, y = prefiltered max mip level.
    pub environment: [f32; 4],
}

/// Per-renderer transform range.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct TransformRecord {
    /// Object → world.
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of `model` (upper 3x3 used).
    pub normal: [[f32; 4]; 4],
}

impl TransformRecord {
    /// Record for a world transform.
    #[must_use]
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
        }
    }
}

/// Per-renderer material range.
///
/// WGSL layout:
///   diffuse: vec4<f32>   rgb, unused
///   emission: vec4<f32>  rgb, unused
///   params: vec4<f32>    roughness, metalness, -, -
///   flags: vec4<u32>     texture bits, merged metal-rough, unlit, -
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct MaterialRecord {
    /// Base color.
    pub diffuse: [f32; 4],
    /// Emitted radiance.
    pub emission: [f32; 4],
    /// Roughness, metalness.
    pub params: [f32; 4],
    /// Texture presence bits, merged metal-rough flag, unlit flag.
    pub flags: [u32; 4],
}

/// Directional light array element (112 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct DirectionalLightRecord {
    /// Light-space view-projection of the slot's shadow map.
    pub view_proj: [[f32; 4]; 4],
    /// Direction the light travels (xyz), w = 1 when the slot is active.
    pub direction: [f32; 4],
    /// RGB radiance, w unused.
    pub intensity: [f32; 4],
    /// x = shadow slot or -1.
    pub shadow: [i32; 4],
}

impl DirectionalLightRecord {
    /// Record for an empty slot: inactive, no shadow.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            shadow: [-1, 0, 0, 0],
            ..Self::zeroed()
        }
    }
}

/// Sphere light array element (64 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct SphereLightRecord {
    /// Center (xyz), w = radius.
    pub position: [f32; 4],
    /// RGB radiance, w = 1 when the slot is active.
    pub intensity: [f32; 4],
    /// x = shadow near plane, y = shadow far plane.
    pub range: [f32; 4],
    /// x = shadow slot or -1.
    pub shadow: [i32; 4],
}

impl SphereLightRecord {
    /// Record for an empty slot: inactive, no shadow.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            shadow: [-1, 0, 0, 0],
            ..Self::zeroed()
        }
    }
}

/// Rect light array element (112 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct RectLightRecord {
    /// Light → world; the emitting face looks down local -Z.
    pub transform: [[f32; 4]; 4],
    /// RGB radiance, w = 1 when the slot is active.
    pub intensity: [f32; 4],
    /// Half extent x, half extent y, shadow near, shadow far.
    pub extent: [f32; 4],
    /// x = shadow slot or -1.
    pub shadow: [i32; 4],
}

impl RectLightRecord {
    /// Record for an empty slot: inactive, no shadow.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            shadow: [-1, 0, 0, 0],
            ..Self::zeroed()
        }
    }
}

/// Per shadow-pass constants, one aligned range per rendered face.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ShadowPassUniforms {
    /// Face view-projection.
    pub view_proj: [[f32; 4]; 4],
    /// Light position (xyz), w = far plane.
    pub light_position: [f32; 4],
    /// x = near plane, y = 1 for cube faces.
    pub params: [f32; 4],
}

impl ShadowPassUniforms {
    /// Uniforms for one shadow face.
    #[must_use]
    pub fn new(view_proj: Mat4, light_position: Vec3, near: f32, far: f32, cube: bool) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_position: light_position.extend(far).to_array(),
            params: [near, if cube { 1.0 } else { 0.0 }, 0.0, 0.0],
        }
    }
}

/// Parameters for one IBL compute dispatch.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct ComputeParams {
    /// Edge length in texels of the written mip.
    pub face_size: u32,
    /// Mip level being written.
    pub mip: u32,
    /// Monte-Carlo sample count.
    pub sample_count: u32,
    /// Total mips in the written texture.
    pub mip_count: u32,
    /// Prefilter roughness for this mip.
    pub roughness: f32,
    /// Padding to 32 bytes.
    pub _pad: [f32; 3],
}

/// Interleaved mesh vertex (56 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct MeshVertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
    /// Tangent derived from UVs.
    pub tangent: [f32; 3],
    /// Bitangent derived from UVs.
    pub bitangent: [f32; 3],
}

const _: () = assert!(size_of::<FrameUniforms>() == 256);
const _: () = assert!(size_of::<TransformRecord>() == 128);
const _: () = assert!(size_of::<MaterialRecord>() == 64);
const _: () = assert!(size_of::<DirectionalLightRecord>() == 112);
const _: () = assert!(size_of::<SphereLightRecord>() == 64);
const _: () = assert!(size_of::<RectLightRecord>() == 112);
const _: () = assert!(size_of::<ShadowPassUniforms>() == 96);
const _: () = assert!(size_of::<ComputeParams>() == 32);
const _: () = assert!(size_of::<MeshVertex>() == 56);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let record = TransformRecord::new(Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)));
        let normal = Mat4::from_cols_array_2d(&record.normal);
        assert_eq!(normal.x_axis.x, 0.5);
        assert_eq!(normal.y_axis.y, 1.0);
    }

    #[test]
    fn shadow_uniforms_pack_far_into_w() {
        let u = ShadowPassUniforms::new(Mat4::IDENTITY, Vec3::new(1.0, 2.0, 3.0), 0.1, 9.0, true);
        assert_eq!(u.light_position, [1.0, 2.0, 3.0, 9.0]);
        assert_eq!(u.params[..2], [0.1, 1.0]);
    }
}
