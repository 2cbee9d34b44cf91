//! Triangle meshes and tangent-frame derivation.

use glam::{Vec2, Vec3};

use crate::error::{RenderError, Result};
use crate::gpu::backend::MeshBuffers;
use crate::gpu::layout::MeshVertex;
use crate::scene::bounds::Aabb;

/// Indexed triangle-list mesh with a per-vertex tangent frame.
#[derive(Debug, Clone)]
pub struct Mesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
    tangents: Vec<Vec3>,
    bitangents: Vec<Vec3>,
    bounds: Aabb,
    gpu: Option<MeshBuffers>,
}

impl Mesh {
    /// Validate the arrays and derive tangents/bitangents from the UVs.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] if the attribute arrays differ in
    /// length, the index count is not a multiple of 3, or an index is out of
    /// range.
    pub fn new(
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        uvs: Vec<Vec2>,
        indices: Vec<u32>,
    ) -> Result<Self> {
        if normals.len() != positions.len() || uvs.len() != positions.len() {
            return Err(RenderError::Configuration(format!(
                "mesh attribute lengths differ: {} positions, {} normals, {} uvs",
                positions.len(),
                normals.len(),
                uvs.len()
            )));
        }
        if indices.len() % 3 != 0 {
            return Err(RenderError::Configuration(format!(
                "mesh index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(RenderError::Configuration(format!(
                "mesh index {bad} out of range for {} vertices",
                positions.len()
            )));
        }

        let (tangents, bitangents) = derive_tangents(&positions, &normals, &uvs, &indices);
        let bounds = Aabb::from_points(&positions);
        Ok(Self {
            positions,
            normals,
            uvs,
            indices,
            tangents,
            bitangents,
            bounds,
            gpu: None,
        })
    }

    /// Object-space positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Object-space normals.
    #[must_use]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Triangle-list indices.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Derived per-vertex tangents.
    #[must_use]
    pub fn tangents(&self) -> &[Vec3] {
        &self.tangents
    }

    /// Derived per-vertex bitangents.
    #[must_use]
    pub fn bitangents(&self) -> &[Vec3] {
        &self.bitangents
    }

    /// Local bounding box.
    #[must_use]
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// GPU mirror, once registered.
    #[must_use]
    pub const fn gpu(&self) -> Option<MeshBuffers> {
        self.gpu
    }

    pub(crate) fn set_gpu(&mut self, buffers: MeshBuffers) {
        self.gpu = Some(buffers);
    }

    /// Interleaved GPU vertices.
    #[must_use]
    pub fn vertices(&self) -> Vec<MeshVertex> {
        (0..self.positions.len())
            .map(|i| MeshVertex {
                position: self.positions[i].to_array(),
                normal: self.normals[i].to_array(),
                uv: self.uvs[i].to_array(),
                tangent: self.tangents[i].to_array(),
                bitangent: self.bitangents[i].to_array(),
            })
            .collect()
    }
}

/// Per-triangle tangent accumulation, then Gram-Schmidt against the normal.
/// Vertices whose UV triangles are all degenerate get an arbitrary
/// orthonormal basis around their normal.
fn derive_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    indices: &[u32],
) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut tan = vec![Vec3::ZERO; positions.len()];
    let mut bitan = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let e1 = positions[b] - positions[a];
        let e2 = positions[c] - positions[a];
        let d1 = uvs[b] - uvs[a];
        let d2 = uvs[c] - uvs[a];
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < 1e-12 {
            continue;
        }
        let r = det.recip();
        let t = (e1 * d2.y - e2 * d1.y) * r;
        let bt = (e2 * d1.x - e1 * d2.x) * r;
        for i in [a, b, c] {
            tan[i] += t;
            bitan[i] += bt;
        }
    }

    for i in 0..positions.len() {
        let n = normals[i].normalize_or(Vec3::Z);
        let t = tan[i] - n * n.dot(tan[i]);
        if t.length_squared() < 1e-12 {
            let (fallback_t, fallback_b) = n.any_orthonormal_pair();
            tan[i] = fallback_t;
            bitan[i] = fallback_b;
            continue;
        }
        let t = t.normalize();
        // Keep handedness from the accumulated bitangent.
        let mut b = n.cross(t);
        if b.dot(bitan[i]) < 0.0 {
            b = -b;
        }
        tan[i] = t;
        bitan[i] = b;
    }
    (tan, bitan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
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

    #[test]
    fn planar_quad_tangents_follow_uv_axes() {
        let mesh = quad();
        for (t, b) in mesh.tangents().iter().zip(mesh.bitangents()) {
            assert_relative_eq!(t.x, 1.0, epsilon = 1e-5);
            assert_relative_eq!(b.y, 1.0, epsilon = 1e-5);
            assert_relative_eq!(t.dot(Vec3::Z), 0.0, epsilon = 1e-5);
        }
        assert_eq!(
            mesh.bounds(),
            Aabb::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0))
        );
    }

    #[test]
    fn degenerate_uvs_get_orthonormal_basis() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Vec3::Z; 3],
            vec![Vec2::ZERO; 3],
            vec![0, 1, 2],
        )
        .unwrap();
        let t = mesh.tangents()[0];
        let b = mesh.bitangents()[0];
        assert_relative_eq!(t.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(t.dot(b), 0.0, epsilon = 1e-5);
        assert_relative_eq!(t.dot(Vec3::Z), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn invalid_arrays_are_rejected() {
        let bad_len = Mesh::new(vec![Vec3::ZERO; 3], vec![Vec3::Z; 2], vec![Vec2::ZERO; 3], vec![]);
        assert!(matches!(bad_len, Err(RenderError::Configuration(_))));

        let bad_count =
            Mesh::new(vec![Vec3::ZERO; 3], vec![Vec3::Z; 3], vec![Vec2::ZERO; 3], vec![0, 1]);
        assert!(matches!(bad_count, Err(RenderError::Configuration(_))));

        let bad_index =
            Mesh::new(vec![Vec3::ZERO; 3], vec![Vec3::Z; 3], vec![Vec2::ZERO; 3], vec![0, 1, 3]);
        assert!(matches!(bad_index, Err(RenderError::Configuration(_))));
    }

    #[test]
    fn vertices_interleave_attributes() {
        let v = quad().vertices();
        assert_eq!(v.len(), 4);
        assert_eq!(v[2].position, [1.0, 1.0, 0.0]);
        assert_eq!(v[2].uv, [1.0, 1.0]);
    }
}
