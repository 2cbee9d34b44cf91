//! Device textures created from backend-neutral descriptions.

use crate::gpu::backend::{TextureDesc, TextureShape};

/// A device texture plus the description it was created from.
///
/// Keeps the default sampled view (shaped per [`TextureShape`]) alive next to
/// the texture; attachment and storage views are created on demand because
/// they address a single layer or mip.
pub struct GpuTexture {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// Full-texture view in the description's shape.
    pub view: wgpu::TextureView,
    /// Creation parameters.
    pub desc: TextureDesc,
}

impl GpuTexture {
    /// Create the texture described by `desc`.
    ///
    /// Zero-layer arrays (a shadow pool with no slots) still get one
    /// layer (one cube for cube arrays) so they can be bound.
    #[must_use]
    pub fn new(device: &wgpu::Device, desc: &TextureDesc) -> Self {
        let layers = match desc.shape {
            TextureShape::D2 => 1,
            TextureShape::D2Array => desc.layers.max(1),
            TextureShape::Cube => 6,
            TextureShape::CubeArray => desc.layers.max(6),
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: layers,
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let dimension = match desc.shape {
            TextureShape::D2 => wgpu::TextureViewDimension::D2,
            TextureShape::D2Array => wgpu::TextureViewDimension::D2Array,
            TextureShape::Cube => wgpu::TextureViewDimension::Cube,
            TextureShape::CubeArray => wgpu::TextureViewDimension::CubeArray,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(dimension),
            ..Default::default()
        });
        Self {
            texture,
            view,
            desc: desc.clone(),
        }
    }

    /// Single-layer, single-mip 2D view for use as a render attachment.
    #[must_use]
    pub fn layer_view(&self, layer: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&self.desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    /// View of one mip across all layers, for compute storage writes.
    #[must_use]
    pub fn storage_view(&self, mip: u32) -> wgpu::TextureView {
        let dimension = match self.desc.shape {
            TextureShape::D2 => wgpu::TextureViewDimension::D2,
            _ => wgpu::TextureViewDimension::D2Array,
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&self.desc.label),
            dimension: Some(dimension),
            base_mip_level: mip,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    /// Upload tightly packed texels into one layer of one mip.
    pub fn write(&self, queue: &wgpu::Queue, layer: u32, mip: u32, data: &[u8]) {
        let width = (self.desc.width >> mip).max(1);
        let height = (self.desc.height >> mip).max(1);
        let texel = self.desc.format.block_copy_size(None).unwrap_or(4);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: mip,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * texel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}
