//! Decoded images and their registered GPU forms.

use half::f16;

use crate::error::{RenderError, Result};
use crate::gpu::backend::TextureId;

/// Pixel layout of an [`ImageData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 8-bit linear RGBA.
    Rgba8,
    /// 8-bit sRGB-encoded RGBA.
    Rgba8Srgb,
    /// 32-bit float RGBA (HDR).
    Rgba32Float,
}

impl ImageFormat {
    /// Bytes per pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Rgba8Srgb => 4,
            Self::Rgba32Float => 16,
        }
    }

    /// GPU format used when the image is uploaded as-is.
    #[must_use]
    pub const fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            // Rgba32Float is not filterable without an optional feature.
            Self::Rgba32Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// A decoded image, as handed over by an image loader.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    width: u32,
    height: u32,
    format: ImageFormat,
    pixels: Vec<u8>,
}

impl ImageData {
    /// Wrap tightly packed pixels.
    ///
    /// # Errors
    ///
    /// [`RenderError::ResourceLoad`] if either dimension is zero or the
    /// pixel buffer length does not match `width * height * bpp`.
    pub fn new(width: u32, height: u32, format: ImageFormat, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceLoad(format!(
                "image has zero extent ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(RenderError::ResourceLoad(format!(
                "{width}x{height} {format:?} image needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// HDR image from float RGBA texels.
    ///
    /// # Errors
    ///
    /// See [`ImageData::new`].
    pub fn from_rgba32f(width: u32, height: u32, texels: &[[f32; 4]]) -> Result<Self> {
        Self::new(
            width,
            height,
            ImageFormat::Rgba32Float,
            bytemuck::cast_slice(texels).to_vec(),
        )
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    #[must_use]
    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    /// Raw pixels.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Texels in the layout [`ImageFormat::texture_format`] expects.
    #[must_use]
    pub fn upload_bytes(&self) -> Vec<u8> {
        match self.format {
            ImageFormat::Rgba8 | ImageFormat::Rgba8Srgb => self.pixels.clone(),
            ImageFormat::Rgba32Float => self.to_rgba16f(),
        }
    }

    /// Convert to half-float RGBA (8 bytes per pixel).
    #[must_use]
    pub fn to_rgba16f(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 8);
        match self.format {
            ImageFormat::Rgba32Float => {
                for chunk in self.pixels.chunks_exact(4) {
                    let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    out.extend_from_slice(&f16::from_f32(v).to_le_bytes());
                }
            }
            ImageFormat::Rgba8 | ImageFormat::Rgba8Srgb => {
                for &byte in &self.pixels {
                    let v = f32::from(byte) / 255.0;
                    out.extend_from_slice(&f16::from_f32(v).to_le_bytes());
                }
            }
        }
        out
    }
}

/// A registered 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    /// GPU texture.
    pub gpu: TextureId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Source pixel layout.
    pub format: ImageFormat,
}

/// A registered image-based-lighting environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Radiance cube converted from the equirect source.
    pub cube: TextureId,
    /// Diffuse irradiance cube.
    pub irradiance: TextureId,
    /// GGX-prefiltered cube; mip `m` is roughness `m / (mips - 1)`.
    pub prefiltered: TextureId,
    /// Mips in `prefiltered`.
    pub prefiltered_mips: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_length_mismatch_is_load_failure() {
        let err = ImageData::new(2, 2, ImageFormat::Rgba8, vec![0; 15]).unwrap_err();
        assert!(matches!(err, RenderError::ResourceLoad(_)));
        assert!(ImageData::new(0, 2, ImageFormat::Rgba8, vec![]).is_err());
    }

    #[test]
    fn float_image_converts_to_half() {
        let img = ImageData::from_rgba32f(1, 1, &[[1.0, 0.5, 2.0, 1.0]]).unwrap();
        let bytes = img.upload_bytes();
        assert_eq!(bytes.len(), 8);
        let r = f16::from_le_bytes([bytes[0], bytes[1]]);
        let b = f16::from_le_bytes([bytes[4], bytes[5]]);
        assert_eq!(r.to_f32(), 1.0);
        assert_eq!(b.to_f32(), 2.0);
    }

    #[test]
    fn ldr_upload_is_passthrough() {
        let img = ImageData::new(1, 1, ImageFormat::Rgba8Srgb, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(img.upload_bytes(), vec![1, 2, 3, 4]);
        assert_eq!(
            img.format().texture_format(),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
    }
}
