//! Drawable scene entries.

use glam::{Mat4, Vec3};

use crate::arena::GenKey;
use crate::gpu::backend::BufferId;
use crate::scene::bounds::Aabb;
use crate::scene::material::MaterialEntry;
use crate::scene::mesh::Mesh;

/// A mesh drawn with a material.
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    /// Geometry.
    pub mesh: GenKey<Mesh>,
    /// Surface.
    pub material: GenKey<MaterialEntry>,
    /// Object → world.
    pub transform: Mat4,
    /// Local bounds under `transform`.
    pub world_aabb: Aabb,
    /// Drawn into shadow maps.
    pub casts_shadows: bool,
}

/// A line-list overlay, always unlit, never shadowed.
#[derive(Debug, Clone)]
pub struct WireRenderer {
    /// Line-list positions on the GPU.
    pub vertices: BufferId,
    /// Number of positions.
    pub vertex_count: u32,
    /// Line color.
    pub color: Vec3,
    /// Object → world.
    pub transform: Mat4,
    /// Local point bounds.
    pub local_aabb: Aabb,
    /// `local_aabb` under `transform`.
    pub world_aabb: Aabb,
}

/// Closed set of things the geometry pass can draw.
#[derive(Debug, Clone)]
pub enum Renderable {
    /// Lit triangle mesh.
    Mesh(MeshRenderer),
    /// Unlit line overlay.
    Wire(WireRenderer),
}

impl Renderable {
    /// Object → world.
    #[must_use]
    pub const fn transform(&self) -> Mat4 {
        match self {
            Self::Mesh(m) => m.transform,
            Self::Wire(w) => w.transform,
        }
    }

    /// World bounds.
    #[must_use]
    pub const fn world_aabb(&self) -> Aabb {
        match self {
            Self::Mesh(m) => m.world_aabb,
            Self::Wire(w) => w.world_aabb,
        }
    }

    /// `true` if the renderable is drawn into shadow maps.
    #[must_use]
    pub const fn casts_shadows(&self) -> bool {
        match self {
            Self::Mesh(m) => m.casts_shadows,
            Self::Wire(_) => false,
        }
    }
}
