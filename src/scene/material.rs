//! Physically-based material parameters.

use glam::Vec3;

use crate::arena::GenKey;
use crate::gpu::backend::MaterialBindingId;
use crate::gpu::layout::{texture_bits, MaterialRecord};
use crate::scene::texture::Texture;

/// Optional texture per material channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialMaps {
    /// Base color.
    pub diffuse: Option<GenKey<Texture>>,
    /// Tangent-space normal map.
    pub normal: Option<GenKey<Texture>>,
    /// Roughness, or glTF metal-rough when
    /// [`Material::merged_metal_rough`] is set.
    pub roughness: Option<GenKey<Texture>>,
    /// Metalness (ignored when merged).
    pub metalness: Option<GenKey<Texture>>,
    /// Emitted radiance.
    pub emission: Option<GenKey<Texture>>,
}

impl MaterialMaps {
    /// Every bound texture handle.
    pub fn iter(&self) -> impl Iterator<Item = GenKey<Texture>> + '_ {
        [
            self.diffuse,
            self.normal,
            self.roughness,
            self.metalness,
            self.emission,
        ]
        .into_iter()
        .flatten()
    }
}

/// Surface description shared by any number of mesh renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Linear base color.
    pub diffuse: Vec3,
    /// Perceptual roughness in `[0, 1]`.
    pub roughness: f32,
    /// Metalness in `[0, 1]`.
    pub metalness: f32,
    /// Emitted radiance.
    pub emission: Vec3,
    /// Channel textures.
    pub maps: MaterialMaps,
    /// Read roughness from G and metalness from B of the roughness map.
    pub merged_metal_rough: bool,
    /// Skip lighting; output diffuse + emission.
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.8),
            roughness: 0.5,
            metalness: 0.0,
            emission: Vec3::ZERO,
            maps: MaterialMaps::default(),
            merged_metal_rough: false,
            unlit: false,
        }
    }
}

impl Material {
    /// Untextured material with the given base color.
    #[must_use]
    pub fn from_color(diffuse: Vec3) -> Self {
        Self {
            diffuse,
            ..Self::default()
        }
    }

    /// Presence bits for the bound channels.
    #[must_use]
    pub fn texture_bits(&self) -> u32 {
        let m = &self.maps;
        let mut bits = 0;
        if m.diffuse.is_some() {
            bits |= texture_bits::DIFFUSE;
        }
        if m.normal.is_some() {
            bits |= texture_bits::NORMAL;
        }
        if m.roughness.is_some() {
            bits |= texture_bits::ROUGHNESS;
        }
        if m.metalness.is_some() && !self.merged_metal_rough {
            bits |= texture_bits::METALNESS;
        }
        if m.emission.is_some() {
            bits |= texture_bits::EMISSION;
        }
        bits
    }

    /// GPU record.
    #[must_use]
    pub fn record(&self) -> MaterialRecord {
        MaterialRecord {
            diffuse: self.diffuse.extend(1.0).to_array(),
            emission: self.emission.extend(0.0).to_array(),
            params: [self.roughness, self.metalness, 0.0, 0.0],
            flags: [
                self.texture_bits(),
                u32::from(self.merged_metal_rough),
                u32::from(self.unlit),
                0,
            ],
        }
    }
}

/// A registered material.
#[derive(Debug, Clone)]
pub struct MaterialEntry {
    /// Parameters as supplied.
    pub material: Material,
    /// Texture bind set on the GPU.
    pub binding: MaterialBindingId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_metal_rough_drops_metalness_bit() {
        let tex = GenKey::from_parts(0, 0);
        let mut m = Material::default();
        m.maps.roughness = Some(tex);
        m.maps.metalness = Some(tex);
        assert_eq!(
            m.texture_bits(),
            texture_bits::ROUGHNESS | texture_bits::METALNESS
        );

        m.merged_metal_rough = true;
        let record = m.record();
        assert_eq!(record.flags[0], texture_bits::ROUGHNESS);
        assert_eq!(record.flags[1], 1);
    }

    #[test]
    fn untextured_record() {
        let record = Material::from_color(Vec3::new(1.0, 0.0, 0.0)).record();
        assert_eq!(record.diffuse, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(record.flags, [0, 0, 0, 0]);
        assert_eq!(record.params[..2], [0.5, 0.0]);
    }
}
