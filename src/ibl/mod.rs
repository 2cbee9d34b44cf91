//! Image-based lighting precompute.
//!
//! An equirectangular image becomes three cubes (radiance, diffuse
//! irradiance, GGX-prefiltered mips) through a [`graph::PassGraph`]; the
//! split-sum BRDF table is built once and shared by every environment.

/// CPU BRDF integration.
pub mod brdf;
/// Compute pass DAG with barrier insertion.
pub mod graph;

use crate::error::Result;
use crate::gpu::backend::{
    ComputeDispatch, ComputeProgram, RenderBackend, StorageTarget, TextureDesc,
    TextureId, TextureShape,
};
use crate::gpu::layout::ComputeParams;
use crate::options::IblOptions;
use crate::scene::texture::{Environment, ImageData};
use graph::{PassGraph, PassNode, ResourceRef};

/// Compute workgroup edge (matches `@workgroup_size(8, 8, 1)`).
const WORKGROUP: u32 = 8;

/// Builds environments and owns the cached BRDF table.
#[derive(Debug)]
pub struct IblPipeline {
    options: IblOptions,
    brdf_lut: Option<TextureId>,
}

impl IblPipeline {
    /// Pipeline sized from `options`. Nothing is allocated until first use.
    #[must_use]
    pub fn new(options: &IblOptions) -> Self {
        Self {
            options: options.clone(),
            brdf_lut: None,
        }
    }

    /// The cached BRDF table, if already built.
    #[must_use]
    pub const fn cached_brdf_lut(&self) -> Option<TextureId> {
        self.brdf_lut
    }

    /// BRDF lookup table, built on first call.
    ///
    /// # Errors
    ///
    /// Propagates pass-graph scheduling errors.
    pub fn brdf_lut<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Result<TextureId> {
        if let Some(lut) = self.brdf_lut {
            return Ok(lut);
        }
        let size = self.options.brdf_lut_resolution;
        let lut = if self.options.cpu_brdf_lut {
            let lut = backend.create_texture(&TextureDesc::sampled_2d(
                "brdf lut",
                size,
                size,
                wgpu::TextureFormat::Rg16Float,
            ));
            let texels = brdf::brdf_lut_rg16f(size, self.options.sample_count);
            backend.write_texture(lut, 0, 0, &texels);
            log::debug!("integrated {size}x{size} BRDF table on the CPU");
            lut
        } else {
            // Rg16Float is not a storage format; the GPU table carries two
            // unused channels.
            let lut = backend.create_texture(&TextureDesc {
                label: "brdf lut".to_owned(),
                width: size,
                height: size,
                layers: 1,
                mip_levels: 1,
                format: wgpu::TextureFormat::Rgba16Float,
                shape: TextureShape::D2,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING,
            });
            let mut graph = PassGraph::new();
            let _ = graph.add(PassNode {
                name: "brdf lut".to_owned(),
                reads: Vec::new(),
                writes: vec![ResourceRef::new(lut, 0)],
                dispatch: ComputeDispatch {
                    program: ComputeProgram::BrdfLut,
                    label: "brdf lut".to_owned(),
                    input: None,
                    output: StorageTarget { texture: lut, mip: 0 },
                    params: self.params(size, 0, 1, 0.0),
                    workgroups: [groups(size), groups(size), 1],
                },
            });
            let _ = graph.execute(backend)?;
            lut
        };
        self.brdf_lut = Some(lut);
        Ok(lut)
    }

    /// Convert `image` into an [`Environment`].
    ///
    /// The source upload is released once the chain has been flushed.
    ///
    /// # Errors
    ///
    /// Propagates pass-graph scheduling errors; on error every texture
    /// allocated here is released.
    pub fn precompute<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        image: &ImageData,
    ) -> Result<Environment> {
        let opts = &self.options;
        let source = backend.create_texture(&TextureDesc::sampled_2d(
            "environment source",
            image.width(),
            image.height(),
            image.format().texture_format(),
        ));
        backend.write_texture(source, 0, 0, &image.upload_bytes());

        let mips = opts.prefiltered_mip_levels.max(1);
        let cube = backend.create_texture(&TextureDesc::storage_cube(
            "environment cube",
            opts.environment_resolution,
            1,
        ));
        let irradiance = backend.create_texture(&TextureDesc::storage_cube(
            "irradiance cube",
            opts.irradiance_resolution,
            1,
        ));
        let prefiltered = backend.create_texture(&TextureDesc::storage_cube(
            "prefiltered cube",
            opts.prefiltered_resolution,
            mips,
        ));

        let graph = self.environment_graph(source, cube, irradiance, prefiltered, mips);
        let executed = graph.execute(backend);
        backend.destroy_texture(source);
        if let Err(e) = executed {
            for id in [cube, irradiance, prefiltered] {
                backend.destroy_texture(id);
            }
            return Err(e);
        }

        log::info!(
            "environment from {}x{} source: {} cube, {} irradiance, {} prefiltered x{mips}",
            image.width(),
            image.height(),
            opts.environment_resolution,
            opts.irradiance_resolution,
            opts.prefiltered_resolution,
        );
        Ok(Environment {
            cube,
            irradiance,
            prefiltered,
            prefiltered_mips: mips,
        })
    }

    fn environment_graph(
        &self,
        source: TextureId,
        cube: TextureId,
        irradiance: TextureId,
        prefiltered: TextureId,
        mips: u32,
    ) -> PassGraph {
        let opts = &self.options;
        let env = ResourceRef::new(cube, 0);
        let mut graph = PassGraph::new();

        let size = opts.environment_resolution;
        let _ = graph.add(PassNode {
            name: "equirect to cube".to_owned(),
            reads: vec![ResourceRef::new(source, 0)],
            writes: vec![env],
            dispatch: ComputeDispatch {
                program: ComputeProgram::EquirectToCube,
                label: "equirect to cube".to_owned(),
                input: Some(source),
                output: StorageTarget { texture: cube, mip: 0 },
                params: self.params(size, 0, 1, 0.0),
                workgroups: [groups(size), groups(size), 6],
            },
        });

        let size = opts.irradiance_resolution;
        let _ = graph.add(PassNode {
            name: "irradiance".to_owned(),
            reads: vec![env],
            writes: vec![ResourceRef::new(irradiance, 0)],
            dispatch: ComputeDispatch {
                program: ComputeProgram::Irradiance,
                label: "irradiance".to_owned(),
                input: Some(cube),
                output: StorageTarget {
                    texture: irradiance,
                    mip: 0,
                },
                params: self.params(size, 0, 1, 0.0),
                workgroups: [groups(size), groups(size), 6],
            },
        });

        for mip in 0..mips {
            let size = (opts.prefiltered_resolution >> mip).max(1);
            let roughness = prefilter_roughness(mip, mips);
            let name = format!("prefilter mip {mip}");
            let _ = graph.add(PassNode {
                name: name.clone(),
                reads: vec![env],
                writes: vec![ResourceRef::new(prefiltered, mip)],
                dispatch: ComputeDispatch {
                    program: ComputeProgram::Prefilter,
                    label: name,
                    input: Some(cube),
                    output: StorageTarget {
                        texture: prefiltered,
                        mip,
                    },
                    params: self.params(size, mip, mips, roughness),
                    workgroups: [groups(size), groups(size), 6],
                },
            });
        }
        graph
    }

    fn params(&self, face_size: u32, mip: u32, mip_count: u32, roughness: f32) -> ComputeParams {
        ComputeParams {
            face_size,
            mip,
            sample_count: self.options.sample_count,
            mip_count,
            roughness,
            _pad: [0.0; 3],
        }
    }
}

/// Roughness of prefiltered mip `mip` out of `mips`.
#[must_use]
pub fn prefilter_roughness(mip: u32, mips: u32) -> f32 {
    if mips <= 1 {
        0.0
    } else {
        mip as f32 / (mips - 1) as f32
    }
}

const fn groups(size: u32) -> u32 {
    size.div_ceil(WORKGROUP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{Command, HeadlessBackend};

    fn hdr_image() -> ImageData {
        ImageData::from_rgba32f(4, 2, &[[1.0, 0.5, 0.25, 1.0]; 8]).unwrap()
    }

    #[test]
    fn roughness_spans_mip_chain() {
        assert_eq!(prefilter_roughness(0, 5), 0.0);
        assert_eq!(prefilter_roughness(2, 5), 0.5);
        assert_eq!(prefilter_roughness(4, 5), 1.0);
        assert_eq!(prefilter_roughness(0, 1), 0.0);
    }

    #[test]
    fn precompute_dispatches_every_mip_after_conversion() {
        let mut backend = HeadlessBackend::new();
        let ibl = IblPipeline::new(&IblOptions::default());
        let env = ibl.precompute(&mut backend, &hdr_image()).unwrap();
        assert_eq!(env.prefiltered_mips, 5);

        let dispatches: Vec<(ComputeProgram, [u32; 3])> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch {
                    program,
                    workgroups,
                    ..
                } => Some((*program, *workgroups)),
                _ => None,
            })
            .collect();
        assert_eq!(dispatches.len(), 2 + 5);
        assert_eq!(dispatches[0], (ComputeProgram::EquirectToCube, [64, 64, 6]));
        assert_eq!(dispatches[1], (ComputeProgram::Irradiance, [4, 4, 6]));
        // 256 >> 4 = 16 texels → 2 groups.
        assert_eq!(dispatches[6], (ComputeProgram::Prefilter, [2, 2, 6]));
    }

    #[test]
    fn source_is_released_after_flush() {
        let mut backend = HeadlessBackend::new();
        let ibl = IblPipeline::new(&IblOptions::default());
        let _ = ibl.precompute(&mut backend, &hdr_image()).unwrap();
        let cmds = backend.commands();
        let flush = cmds.iter().position(|c| *c == Command::Flush).unwrap();
        let destroy = cmds
            .iter()
            .position(|c| matches!(c, Command::DestroyTexture(_)))
            .unwrap();
        assert!(destroy > flush);
    }

    #[test]
    fn brdf_lut_is_cached() {
        let mut backend = HeadlessBackend::new();
        let mut ibl = IblPipeline::new(&IblOptions::default());
        let a = ibl.brdf_lut(&mut backend).unwrap();
        let b = ibl.brdf_lut(&mut backend).unwrap();
        assert_eq!(a, b);
        let lut_dispatches = backend
            .commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::Dispatch {
                        program: ComputeProgram::BrdfLut,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(lut_dispatches, 1);
    }

    #[test]
    fn cpu_brdf_lut_uploads_rg16() {
        let mut backend = HeadlessBackend::new();
        let mut ibl = IblPipeline::new(&IblOptions {
            cpu_brdf_lut: true,
            brdf_lut_resolution: 8,
            sample_count: 16,
            ..IblOptions::default()
        });
        let lut = ibl.brdf_lut(&mut backend).unwrap();
        assert_eq!(
            backend.texture_desc(lut).map(|d| d.format),
            Some(wgpu::TextureFormat::Rg16Float)
        );
        assert!(backend.commands().iter().any(|c| matches!(
            c,
            Command::WriteTexture { id, len: 256, .. } if *id == lut
        )));
        assert!(!backend
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Dispatch { .. })));
    }
}
