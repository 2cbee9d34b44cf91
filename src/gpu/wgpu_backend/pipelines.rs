//! Bind group layouts and pipelines for every pass.

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::frame::{
    ALBEDO_FORMAT, DEPTH_FORMAT, EMISSION_FORMAT, MATERIAL_FORMAT, NORMAL_FORMAT, OUTPUT_FORMAT,
};
use crate::gpu::backend::ComputeProgram;
use crate::gpu::layout::{
    FrameUniforms, MaterialRecord, MeshVertex, ShadowPassUniforms, TransformRecord,
};
use crate::gpu::pipeline_helpers::{
    create_compute_pipeline, create_screen_space_pipeline, depth_texture, sampler,
    storage_buffer, texture, texture_2d, uniform_buffer,
};
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::shader_key::{ShaderKey, ShaderKind};

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32x3,
    4 => Float32x3,
];
const POSITION_ATTRIBUTE: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

/// Shadow-map texel format of cube distance faces.
pub(super) const DISTANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

pub(super) const fn record_size<T>() -> u64 {
    size_of::<T>() as u64
}

/// Bind group layouts shared between pipelines and per-pass bind groups.
pub(super) struct Layouts {
    /// Frame uniform block (group 0 of geometry and light passes).
    pub(super) frame: wgpu::BindGroupLayout,
    /// Transform and material ranges, selected by dynamic offset.
    pub(super) object: wgpu::BindGroupLayout,
    /// Material texture set.
    pub(super) material: wgpu::BindGroupLayout,
    /// Shadow face uniform range.
    pub(super) shadow_face: wgpu::BindGroupLayout,
    /// Transform range for shadow casters.
    pub(super) shadow_object: wgpu::BindGroupLayout,
    /// G-buffer inputs to the light pass.
    pub(super) gbuffer: wgpu::BindGroupLayout,
    /// Light arrays.
    pub(super) lights: wgpu::BindGroupLayout,
    /// Shadow pools plus environment.
    pub(super) shading: wgpu::BindGroupLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let all = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let layout = |label: &str, entries: &[wgpu::BindGroupLayoutEntry]| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
        };
        let cube_array = wgpu::TextureViewDimension::CubeArray;
        let cube = wgpu::TextureViewDimension::Cube;
        let fragment = wgpu::ShaderStages::FRAGMENT;

        Self {
            frame: layout(
                "Frame Layout",
                &[uniform_buffer(0, all, false, record_size::<FrameUniforms>())],
            ),
            object: layout(
                "Object Layout",
                &[
                    uniform_buffer(0, all, true, record_size::<TransformRecord>()),
                    uniform_buffer(1, all, true, record_size::<MaterialRecord>()),
                ],
            ),
            material: layout(
                "Material Layout",
                &[
                    texture_2d(0),
                    texture_2d(1),
                    texture_2d(2),
                    texture_2d(3),
                    texture_2d(4),
                    sampler(5, wgpu::SamplerBindingType::Filtering),
                ],
            ),
            shadow_face: layout(
                "Shadow Face Layout",
                &[uniform_buffer(0, all, true, record_size::<ShadowPassUniforms>())],
            ),
            shadow_object: layout(
                "Shadow Object Layout",
                &[uniform_buffer(0, all, true, record_size::<TransformRecord>())],
            ),
            gbuffer: layout(
                "GBuffer Layout",
                &[
                    texture_2d(0),
                    texture_2d(1),
                    texture_2d(2),
                    texture_2d(3),
                    depth_texture(4, wgpu::TextureViewDimension::D2),
                ],
            ),
            lights: layout(
                "Lights Layout",
                &[storage_buffer(0), storage_buffer(1), storage_buffer(2)],
            ),
            shading: layout(
                "Shading Layout",
                &[
                    depth_texture(0, wgpu::TextureViewDimension::D2Array),
                    sampler(1, wgpu::SamplerBindingType::Comparison),
                    texture(2, fragment, cube_array, false),
                    texture(3, fragment, cube_array, false),
                    sampler(4, wgpu::SamplerBindingType::NonFiltering),
                    texture(5, fragment, cube, true),
                    texture(6, fragment, cube, true),
                    texture_2d(7),
                    sampler(8, wgpu::SamplerBindingType::Filtering),
                ],
            ),
        }
    }
}

/// Every pipeline the backend draws or dispatches with.
pub(super) struct Pipelines {
    pub(super) layouts: Layouts,
    pub(super) mesh: wgpu::RenderPipeline,
    pub(super) wire: wgpu::RenderPipeline,
    pub(super) shadow_depth: wgpu::RenderPipeline,
    pub(super) shadow_distance: wgpu::RenderPipeline,
    equirect_to_cube: wgpu::ComputePipeline,
    irradiance: wgpu::ComputePipeline,
    prefilter: wgpu::ComputePipeline,
    brdf_lut: wgpu::ComputePipeline,
    lights: FxHashMap<ShaderKey, wgpu::RenderPipeline>,
}

impl Pipelines {
    /// Build the fixed pipelines. Light pipelines are built per key by
    /// [`Pipelines::prepare_light`].
    pub(super) fn new(device: &wgpu::Device, composer: &mut ShaderComposer) -> Result<Self> {
        let layouts = Layouts::new(device);

        let geometry = composer.create_shader_module(device, &ShaderKey::new(ShaderKind::Geometry))?;
        let shadow = composer.create_shader_module(device, &ShaderKey::new(ShaderKind::Shadow))?;
        let mut compute = |kind: ShaderKind| -> Result<wgpu::ComputePipeline> {
            let key = ShaderKey::new(kind);
            let module = composer.create_shader_module(device, &key)?;
            Ok(create_compute_pipeline(device, &key.label(), &module))
        };
        let equirect_to_cube = compute(ShaderKind::EquirectToCube)?;
        let irradiance = compute(ShaderKind::Irradiance)?;
        let prefilter = compute(ShaderKind::Prefilter)?;
        let brdf_lut = compute(ShaderKind::BrdfLut)?;

        let mesh = mesh_pipeline(device, &layouts, &geometry);
        let wire = wire_pipeline(device, &layouts, &geometry);
        let shadow_depth = shadow_pipeline(device, &layouts, &shadow, false);
        let shadow_distance = shadow_pipeline(device, &layouts, &shadow, true);

        Ok(Self {
            layouts,
            mesh,
            wire,
            shadow_depth,
            shadow_distance,
            equirect_to_cube,
            irradiance,
            prefilter,
            brdf_lut,
            lights: FxHashMap::default(),
        })
    }

    pub(super) fn compute(&self, program: ComputeProgram) -> &wgpu::ComputePipeline {
        match program {
            ComputeProgram::EquirectToCube => &self.equirect_to_cube,
            ComputeProgram::Irradiance => &self.irradiance,
            ComputeProgram::Prefilter => &self.prefilter,
            ComputeProgram::BrdfLut => &self.brdf_lut,
        }
    }

    /// Compose and build the light pipeline for `key` unless cached.
    pub(super) fn prepare_light(
        &mut self,
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        key: &ShaderKey,
    ) -> Result<()> {
        if self.lights.contains_key(key) {
            return Ok(());
        }
        let module = composer.create_shader_module(device, key)?;
        let l = &self.layouts;
        let pipeline = create_screen_space_pipeline(
            device,
            &key.label(),
            &module,
            OUTPUT_FORMAT,
            None,
            &[&l.frame, &l.gbuffer, &l.lights, &l.shading],
        );
        log::debug!("built light pipeline {}", key.label());
        let _ = self.lights.insert(key.clone(), pipeline);
        Ok(())
    }

    pub(super) fn light(&self, key: &ShaderKey) -> Option<&wgpu::RenderPipeline> {
        self.lights.get(key)
    }
}

fn gbuffer_targets() -> [Option<wgpu::ColorTargetState>; 4] {
    [ALBEDO_FORMAT, NORMAL_FORMAT, MATERIAL_FORMAT, EMISSION_FORMAT].map(|format| {
        Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })
    })
}

fn depth_state(compare: wgpu::CompareFunction, bias: wgpu::DepthBiasState) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias,
    }
}

fn mesh_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    shader: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Mesh Pipeline Layout"),
        bind_group_layouts: &[&layouts.frame, &layouts.object, &layouts.material],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Mesh Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: record_size::<MeshVertex>(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &MESH_ATTRIBUTES,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &gbuffer_targets(),
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(depth_state(
            wgpu::CompareFunction::Less,
            wgpu::DepthBiasState::default(),
        )),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn wire_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    shader: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Wire Pipeline Layout"),
        bind_group_layouts: &[&layouts.frame, &layouts.object],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Wire Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_wire"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: record_size::<[f32; 3]>(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRIBUTE,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_wire"),
            targets: &gbuffer_targets(),
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            ..Default::default()
        },
        depth_stencil: Some(depth_state(
            wgpu::CompareFunction::LessEqual,
            wgpu::DepthBiasState::default(),
        )),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Depth-only pipeline for directional faces, or depth plus linear
/// distance for cube faces.
fn shadow_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    shader: &wgpu::ShaderModule,
    distance: bool,
) -> wgpu::RenderPipeline {
    let label = if distance { "Shadow Distance" } else { "Shadow Depth" };
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Pipeline Layout")),
        bind_group_layouts: &[&layouts.shadow_face, &layouts.shadow_object],
        push_constant_ranges: &[],
    });
    let targets = [Some(wgpu::ColorTargetState {
        format: DISTANCE_FORMAT,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    })];
    let fragment = distance.then(|| wgpu::FragmentState {
        module: shader,
        entry_point: Some("fs_distance"),
        targets: &targets,
        compilation_options: Default::default(),
    });
    // Slope-scaled bias only matters for the compared depth maps.
    let bias = if distance {
        wgpu::DepthBiasState::default()
    } else {
        wgpu::DepthBiasState {
            constant: 2,
            slope_scale: 2.0,
            clamp: 0.0,
        }
    };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label} Pipeline")),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: record_size::<MeshVertex>(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRIBUTE,
            }],
            compilation_options: Default::default(),
        },
        fragment,
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(depth_state(wgpu::CompareFunction::LessEqual, bias)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
