//! CPU split-sum BRDF integration.
//!
//! Reference for the `BrdfLut` compute program and the fallback used when
//! `ibl.cpu_brdf_lut` is set. X axis = N·V, Y axis = roughness;
//! `specular = F0 * scale + bias`.

use std::f32::consts::PI;

use glam::Vec3;
use half::f16;

/// Integrate the BRDF for one `(N·V, roughness)` pair with GGX importance
/// sampling. Returns `(scale, bias)`.
#[must_use]
pub fn integrate_brdf(ndot_v: f32, roughness: f32, sample_count: u32) -> (f32, f32) {
    let v = Vec3::new((1.0 - ndot_v * ndot_v).max(0.0).sqrt(), 0.0, ndot_v);
    let alpha = roughness * roughness;
    let count = sample_count.max(1);

    let mut a = 0.0_f32;
    let mut b = 0.0_f32;
    for i in 0..count {
        let [u1, u2] = hammersley(i, count);
        let phi = 2.0 * PI * u1;
        let cos_theta = ((1.0 - u2) / (1.0 + (alpha * alpha - 1.0) * u2)).sqrt();
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let h = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

        let v_dot_h = v.dot(h);
        let l = 2.0 * v_dot_h * h - v;
        let n_dot_l = l.z.max(0.0);
        if n_dot_l <= 0.0 {
            continue;
        }
        let n_dot_h = cos_theta.max(0.0);
        let v_dot_h = v_dot_h.clamp(0.0, 1.0);

        let g = geometry_smith_ibl(ndot_v, n_dot_l, roughness);
        let g_vis = g * v_dot_h / (n_dot_h * ndot_v).max(1e-4);
        let fc = (1.0 - v_dot_h).powi(5);
        a += (1.0 - fc) * g_vis;
        b += fc * g_vis;
    }
    (a / count as f32, b / count as f32)
}

/// Smith geometry term with the IBL remapping `k = α² / 2`.
fn geometry_smith_ibl(ndot_v: f32, ndot_l: f32, roughness: f32) -> f32 {
    let k = roughness * roughness / 2.0;
    let ggx_v = ndot_v / (ndot_v * (1.0 - k) + k);
    let ggx_l = ndot_l / (ndot_l * (1.0 - k) + k);
    ggx_v * ggx_l
}

/// Point `i` of an `n`-point Hammersley set.
#[must_use]
pub fn hammersley(i: u32, n: u32) -> [f32; 2] {
    [i as f32 / n as f32, radical_inverse_vdc(i)]
}

/// Base-2 Van der Corput radical inverse.
#[must_use]
pub fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// Full `size × size` table as `Rg16Float` texels (4 bytes each), row 0 at
/// the lowest roughness.
#[must_use]
pub fn brdf_lut_rg16f(size: u32, sample_count: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        let roughness = ((y as f32 + 0.5) / size as f32).max(0.01);
        for x in 0..size {
            let ndot_v = ((x as f32 + 0.5) / size as f32).max(0.001);
            let (scale, bias) = integrate_brdf(ndot_v, roughness, sample_count);
            data.extend_from_slice(&f16::from_f32(scale).to_le_bytes());
            data.extend_from_slice(&f16::from_f32(bias).to_le_bytes());
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn radical_inverse_matches_known_values() {
        assert_relative_eq!(radical_inverse_vdc(0), 0.0);
        assert_relative_eq!(radical_inverse_vdc(1), 0.5);
        assert_relative_eq!(radical_inverse_vdc(2), 0.25);
        assert_relative_eq!(radical_inverse_vdc(3), 0.75);
        assert_eq!(hammersley(2, 4), [0.5, 0.25]);
    }

    #[test]
    fn smooth_head_on_reflects_almost_everything() {
        let (scale, bias) = integrate_brdf(1.0, 0.01, 256);
        assert!(scale > 0.9, "scale {scale}");
        assert!(bias < 0.05, "bias {bias}");
    }

    #[test]
    fn rough_surfaces_lose_energy() {
        let (s_smooth, b_smooth) = integrate_brdf(0.5, 0.1, 256);
        let (s_rough, b_rough) = integrate_brdf(0.5, 0.9, 256);
        assert!(s_rough + b_rough < s_smooth + b_smooth);
        for v in [s_smooth, b_smooth, s_rough, b_rough] {
            assert!((0.0..=1.0 + 1e-3).contains(&v));
        }
    }

    #[test]
    fn table_layout_is_rg16() {
        let data = brdf_lut_rg16f(4, 32);
        assert_eq!(data.len(), 4 * 4 * 4);
        let scale = f16::from_le_bytes([data[0], data[1]]).to_f32();
        let (expected, _) = integrate_brdf(0.125, 0.125, 32);
        assert_relative_eq!(scale, expected, epsilon = 1e-2);
    }
}
