//! Six-face shadow cameras shared by sphere and rect lights.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Vec3};

use crate::shadow::CubeShadow;

/// Face forward axes in cube-layer order (+X, -X, +Y, -Y, +Z, -Z).
const FACE_FORWARD: [Vec3; 6] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

/// Up vectors placing each face's texel row 0 where cube sampling
/// expects it (combined with the x-flip in [`face_projection`]).
const FACE_UP: [Vec3; 6] = [
    Vec3::Y,
    Vec3::Y,
    Vec3::NEG_Z,
    Vec3::Z,
    Vec3::Y,
    Vec3::Y,
];

/// Direction through `(u, v)` in `[-1, 1]` on cube face `face`, matching
/// the sampling convention (`v` grows downward).
#[must_use]
pub fn face_direction(face: usize, u: f32, v: f32) -> Vec3 {
    let dir = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

/// Distance at which a light of `intensity` falls below `tolerance`
/// under inverse-square falloff: `sqrt(max(rgb) / (4π · tolerance))`.
#[must_use]
pub fn far_plane(intensity: Vec3, tolerance: f32) -> f32 {
    (intensity.max_element().max(0.0) / (4.0 * PI * tolerance)).sqrt()
}

/// 90° perspective with x mirrored; faces render with culling off.
#[must_use]
pub fn face_projection(near: f32, far: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0))
        * Mat4::perspective_rh(FRAC_PI_2, 1.0, near, far)
}

/// Cube shadow for a light at `position`.
///
/// `near = max(near_epsilon, radius)`; the far plane comes from
/// [`far_plane`] and is pushed out to `2 * near` when the light is too dim
/// to reach past its own near plane.
#[must_use]
pub fn fit_cube(
    position: Vec3,
    radius: f32,
    intensity: Vec3,
    tolerance: f32,
    near_epsilon: f32,
) -> CubeShadow {
    let near = radius.max(near_epsilon);
    let mut far = far_plane(intensity, tolerance);
    if far <= near {
        far = 2.0 * near;
    }
    let projection = face_projection(near, far);
    let face_view_proj = std::array::from_fn(|face| {
        let view = Mat4::look_at_rh(
            position,
            position + FACE_FORWARD[face],
            FACE_UP[face],
        );
        projection * view
    });
    CubeShadow {
        face_view_proj,
        light_position: position,
        near,
        far,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn far_plane_matches_formula() {
        let tol = 1.0 / 256.0;
        let far = far_plane(Vec3::new(2.0, 8.0, 1.0), tol);
        assert_relative_eq!(far, (8.0 / (4.0 * PI * tol)).sqrt(), epsilon = 1e-4);
        assert_relative_eq!(far_plane(Vec3::ZERO, tol), 0.0);
    }

    #[test]
    fn near_and_far_are_clamped() {
        let s = fit_cube(Vec3::ZERO, 0.0, Vec3::splat(10.0), 1.0 / 256.0, 1e-3);
        assert_relative_eq!(s.near, 1e-3);

        let dim = fit_cube(Vec3::ZERO, 2.0, Vec3::splat(1e-4), 1.0 / 256.0, 1e-3);
        assert_relative_eq!(dim.near, 2.0);
        assert!(dim.far > dim.near);
    }

    /// Every face maps its own sampling directions back onto the texel
    /// they were generated from.
    #[test]
    fn faces_agree_with_sampling_convention() {
        let pos = Vec3::new(1.0, 2.0, 3.0);
        let s = fit_cube(pos, 0.1, Vec3::splat(100.0), 1.0 / 256.0, 1e-3);
        for face in 0..6 {
            for (u, v) in [(0.0, 0.0), (0.5, -0.25), (-0.75, 0.5)] {
                let p = pos + face_direction(face, u, v) * 2.0;
                let ndc = s.face_view_proj[face].project_point3(p);
                assert_relative_eq!(ndc.x, u, epsilon = 1e-4);
                assert_relative_eq!(ndc.y, -v, epsilon = 1e-4);
                assert!((0.0..=1.0).contains(&ndc.z));
            }
        }
    }
}
