//! Analytic light sources.

use glam::{Mat4, Vec2, Vec3};

use crate::arena::GenKey;
use crate::gpu::layout::{DirectionalLightRecord, RectLightRecord, SphereLightRecord};
use crate::shadow::{CubeShadow, DirectionalShadow};

/// Infinitely distant light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels.
    pub direction: Vec3,
    /// RGB radiance.
    pub intensity: Vec3,
    /// Render a shadow map for this light.
    pub casts_shadows: bool,
}

impl DirectionalLight {
    /// Shadow-casting light travelling along `direction`.
    #[must_use]
    pub fn new(direction: Vec3, intensity: Vec3) -> Self {
        Self {
            direction: direction.normalize_or(Vec3::NEG_Y),
            intensity,
            casts_shadows: true,
        }
    }

    /// GPU record; `shadow` is the slot's fresh shadow, if any.
    #[must_use]
    pub fn record(&self, shadow: Option<(u32, &DirectionalShadow)>) -> DirectionalLightRecord {
        let (slot, view_proj) = match shadow {
            Some((slot, s)) if self.casts_shadows => (slot as i32, s.view_proj),
            _ => (-1, Mat4::IDENTITY),
        };
        DirectionalLightRecord {
            view_proj: view_proj.to_cols_array_2d(),
            direction: self.direction.extend(1.0).to_array(),
            intensity: self.intensity.extend(0.0).to_array(),
            shadow: [slot, 0, 0, 0],
        }
    }
}

/// Spherical area light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereLight {
    /// Center.
    pub position: Vec3,
    /// RGB radiance.
    pub intensity: Vec3,
    /// Sphere radius.
    pub radius: f32,
    /// Render a shadow cube for this light.
    pub casts_shadows: bool,
}

impl SphereLight {
    /// Shadow-casting sphere light.
    #[must_use]
    pub const fn new(position: Vec3, intensity: Vec3, radius: f32) -> Self {
        Self {
            position,
            intensity,
            radius,
            casts_shadows: true,
        }
    }

    /// GPU record; `shadow` is the slot's fresh shadow, if any.
    #[must_use]
    pub fn record(&self, shadow: Option<(u32, &CubeShadow)>) -> SphereLightRecord {
        let (slot, near, far) = cube_binding(self.casts_shadows, shadow);
        SphereLightRecord {
            position: self.position.extend(self.radius).to_array(),
            intensity: self.intensity.extend(1.0).to_array(),
            range: [near, far, 0.0, 0.0],
            shadow: [slot, 0, 0, 0],
        }
    }
}

/// Rectangular area light emitting down its local -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectLight {
    /// Light → world.
    pub transform: Mat4,
    /// RGB radiance.
    pub intensity: Vec3,
    /// Half extents along local X and Y.
    pub half_extent: Vec2,
    /// Render a shadow cube for this light.
    pub casts_shadows: bool,
}

impl RectLight {
    /// Shadow-casting rect light.
    #[must_use]
    pub const fn new(transform: Mat4, intensity: Vec3, half_extent: Vec2) -> Self {
        Self {
            transform,
            intensity,
            half_extent,
            casts_shadows: true,
        }
    }

    /// World-space center.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    /// Radius used for the shadow near plane.
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.half_extent.max_element()
    }

    /// GPU record; `shadow` is the slot's fresh shadow, if any.
    #[must_use]
    pub fn record(&self, shadow: Option<(u32, &CubeShadow)>) -> RectLightRecord {
        let (slot, near, far) = cube_binding(self.casts_shadows, shadow);
        RectLightRecord {
            transform: self.transform.to_cols_array_2d(),
            intensity: self.intensity.extend(1.0).to_array(),
            extent: [self.half_extent.x, self.half_extent.y, near, far],
            shadow: [slot, 0, 0, 0],
        }
    }
}

fn cube_binding(casts_shadows: bool, shadow: Option<(u32, &CubeShadow)>) -> (i32, f32, f32) {
    match shadow {
        Some((slot, s)) if casts_shadows => (slot as i32, s.near, s.far),
        _ => (-1, 0.0, 0.0),
    }
}

/// Handle to a light of any kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKey {
    /// Directional light.
    Directional(GenKey<DirectionalLight>),
    /// Sphere light.
    Sphere(GenKey<SphereLight>),
    /// Rect light.
    Rect(GenKey<RectLight>),
}

impl From<GenKey<DirectionalLight>> for LightKey {
    fn from(key: GenKey<DirectionalLight>) -> Self {
        Self::Directional(key)
    }
}

impl From<GenKey<SphereLight>> for LightKey {
    fn from(key: GenKey<SphereLight>) -> Self {
        Self::Sphere(key)
    }
}

impl From<GenKey<RectLight>> for LightKey {
    fn from(key: GenKey<RectLight>) -> Self {
        Self::Rect(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_casting_light_has_no_shadow_slot() {
        let mut light = SphereLight::new(Vec3::ZERO, Vec3::ONE, 0.5);
        light.casts_shadows = false;
        let shadow = CubeShadow {
            face_view_proj: [Mat4::IDENTITY; 6],
            light_position: Vec3::ZERO,
            near: 0.5,
            far: 10.0,
        };
        let record = light.record(Some((1, &shadow)));
        assert_eq!(record.shadow[0], -1);
        assert_eq!(record.intensity[3], 1.0);
    }

    #[test]
    fn rect_radius_is_largest_half_extent() {
        let light = RectLight::new(
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            Vec3::ONE,
            Vec2::new(0.25, 0.75),
        );
        assert_eq!(light.radius(), 0.75);
        assert_eq!(light.position(), Vec3::new(1.0, 2.0, 3.0));
    }
}
