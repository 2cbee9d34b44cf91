//! Orthographic shadow camera for directional lights.

use glam::{Mat4, Vec3};

use crate::scene::bounds::Aabb;
use crate::shadow::DirectionalShadow;

/// Fit an orthographic camera around the bounding sphere of `scene`.
///
/// The eye sits at `center - radius * direction` looking at the center; the
/// projection spans `[-r, r]` on both axes and `[0, 2r]` in depth, so the
/// whole sphere lands inside the map.
#[must_use]
pub fn fit_directional(direction: Vec3, scene: &Aabb, min_radius: f32) -> DirectionalShadow {
    let dir = direction.normalize_or(Vec3::NEG_Y);
    let (center, radius) = scene.bounding_sphere();
    let r = radius.max(min_radius);

    let eye = center - dir * r;
    let up = if dir.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_at_rh(eye, center, up);
    let projection = Mat4::orthographic_rh(-r, r, -r, r, 0.0, 2.0 * r);

    DirectionalShadow {
        view_proj: projection * view,
        light_position: eye,
        extent: 2.0 * r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn camera_backs_off_by_radius() {
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let shadow = fit_directional(Vec3::NEG_Y, &bounds, 1e-3);
        let r = 3.0_f32.sqrt();
        assert_relative_eq!(shadow.light_position.y, r, epsilon = 1e-5);
        assert_relative_eq!(shadow.extent, 2.0 * r, epsilon = 1e-5);

        // Center lands mid-depth, corners inside the unit square.
        let c = shadow.view_proj.project_point3(Vec3::ZERO);
        assert_relative_eq!(c.z, 0.5, epsilon = 1e-5);
        assert_relative_eq!(c.x, 0.0, epsilon = 1e-5);
        for corner in bounds.corners() {
            let p = shadow.view_proj.project_point3(corner);
            assert!(p.x.abs() <= 1.0 + 1e-5 && p.y.abs() <= 1.0 + 1e-5);
            assert!((0.0..=1.0).contains(&p.z));
        }
    }

    #[test]
    fn empty_scene_uses_minimum_radius() {
        let shadow = fit_directional(Vec3::X, &Aabb::EMPTY, 0.5);
        assert_relative_eq!(shadow.extent, 1.0);
        assert!(shadow.view_proj.is_finite());
    }
}
