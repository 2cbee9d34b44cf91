//! [`RenderBackend`] on a real wgpu device.
//!
//! Ids handed to the core index into resource tables owned here. Frame
//! passes record into one command encoder that is submitted by
//! [`RenderBackend::end_frame`]; compute dispatches are queued and split
//! into one compute pass per barrier-delimited segment when flushed.

mod pipelines;
mod timer;

use rustc_hash::FxHashMap;
use web_time::Instant;
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::gpu::backend::{
    BackendCapabilities, BufferDesc, BufferId, BufferUsage, ComputeDispatch, ComputeProgram,
    GeometryPassDesc, LightPassDesc, MaterialBindingId, MaterialTextures, PassTimings,
    RenderBackend, ShadowPassDesc, TextureDesc, TextureId, TextureShape,
};
use crate::gpu::layout::{MaterialRecord, ShadowPassUniforms, TransformRecord};
use crate::gpu::pipeline_helpers::{
    buffer_window, comparison_sampler, linear_sampler, nearest_sampler,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::shader_key::{ShaderKey, ShaderKind};
use crate::gpu::texture::GpuTexture;
use pipelines::{record_size, Pipelines};
use timer::{PassTimer, TimedPass};

/// Textures bound where the core supplies none.
struct Fallbacks {
    /// 1x1 opaque white for empty material slots.
    white: GpuTexture,
    /// 1x1 black cube for a missing environment.
    cube: GpuTexture,
    /// 1x1 black BRDF table.
    lut: GpuTexture,
    /// Material set with every slot on `white`.
    material: wgpu::BindGroup,
}

struct Samplers {
    material: wgpu::Sampler,
    environment: wgpu::Sampler,
    compute: wgpu::Sampler,
    distance: wgpu::Sampler,
    comparison: wgpu::Sampler,
}

/// Executes backend requests on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    timestamps: bool,
    composer: ShaderComposer,
    pipelines: Pipelines,
    samplers: Samplers,
    fallbacks: Fallbacks,
    next_id: u32,
    buffers: FxHashMap<BufferId, wgpu::Buffer>,
    textures: FxHashMap<TextureId, GpuTexture>,
    materials: FxHashMap<MaterialBindingId, wgpu::BindGroup>,
    frame: Option<wgpu::CommandEncoder>,
    timer: PassTimer,
    segments: Vec<Vec<ComputeDispatch>>,
}

impl WgpuBackend {
    /// Compose the fixed shader set and build its pipelines on `context`'s
    /// device.
    ///
    /// # Errors
    ///
    /// [`crate::RenderError::Shader`] if a built-in shader fails to compose.
    pub fn new(context: RenderContext) -> Result<Self> {
        let RenderContext {
            device,
            queue,
            timestamps,
            ..
        } = context;
        let mut composer = ShaderComposer::new()?;
        let pipelines = Pipelines::new(&device, &mut composer)?;

        let samplers = Samplers {
            material: linear_sampler(&device, "material sampler", wgpu::AddressMode::Repeat),
            environment: linear_sampler(
                &device,
                "environment sampler",
                wgpu::AddressMode::ClampToEdge,
            ),
            compute: linear_sampler(&device, "ibl sampler", wgpu::AddressMode::ClampToEdge),
            distance: nearest_sampler(&device, "shadow distance sampler"),
            comparison: comparison_sampler(&device, "shadow compare sampler"),
        };

        let white = GpuTexture::new(
            &device,
            &TextureDesc::sampled_2d("fallback white", 1, 1, wgpu::TextureFormat::Rgba8Unorm),
        );
        white.write(&queue, 0, 0, &[255; 4]);
        let cube = GpuTexture::new(&device, &TextureDesc::storage_cube("fallback cube", 1, 1));
        let lut = GpuTexture::new(
            &device,
            &TextureDesc::sampled_2d("fallback brdf", 1, 1, wgpu::TextureFormat::Rgba16Float),
        );
        let white_set = MaterialTextures::default();
        let material = material_bind_group(
            &device,
            &pipelines,
            &samplers,
            &FxHashMap::default(),
            &white.view,
            "fallback material",
            &white_set,
        );
        let timer = PassTimer::new(&device, &queue, timestamps);

        Ok(Self {
            device,
            queue,
            timestamps,
            composer,
            pipelines,
            samplers,
            fallbacks: Fallbacks {
                white,
                cube,
                lut,
                material,
            },
            next_id: 1,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            materials: FxHashMap::default(),
            frame: None,
            timer,
            segments: Vec::new(),
        })
    }

    /// The device everything is created on.
    #[must_use]
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The submission queue.
    #[must_use]
    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Device texture behind `id`, e.g. the frame's color output.
    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&id).map(|t| &t.texture)
    }

    /// Default view of `id`.
    #[must_use]
    pub fn texture_view(&self, id: TextureId) -> Option<&wgpu::TextureView> {
        self.textures.get(&id).map(|t| &t.view)
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Bind groups 0..=3 of the light accumulation program, or `None` when
    /// any referenced resource has been released.
    fn light_bind_groups(&self, desc: &LightPassDesc<'_>) -> Option<[wgpu::BindGroup; 4]> {
        let view = |id: TextureId| self.textures.get(&id).map(|t| &t.view);
        let g = desc.gbuffer;
        let s = desc.shadows;
        let (
            Some(albedo),
            Some(normal),
            Some(material),
            Some(emission),
            Some(depth),
            Some(directional),
            Some(sphere),
            Some(rect),
        ) = (
            view(g.albedo),
            view(g.normal),
            view(g.material),
            view(g.emission),
            view(g.depth),
            view(s.directional),
            view(s.sphere),
            view(s.rect),
        )
        else {
            log::warn!("light pass references a released texture");
            return None;
        };
        let (Some(frame), Some(dir_lights), Some(sphere_lights), Some(rect_lights)) = (
            self.buffers.get(&desc.frame),
            self.buffers.get(&desc.lights.directional),
            self.buffers.get(&desc.lights.sphere),
            self.buffers.get(&desc.lights.rect),
        ) else {
            log::warn!("light pass references a released buffer");
            return None;
        };
        let fallback = &self.fallbacks;
        let (irradiance, prefiltered, brdf) = desc
            .environment
            .and_then(|env| Some((view(env.irradiance)?, view(env.prefiltered)?, view(env.brdf_lut)?)))
            .unwrap_or((&fallback.cube.view, &fallback.cube.view, &fallback.lut.view));

        let layouts = &self.pipelines.layouts;
        let tex = wgpu::BindingResource::TextureView;
        let frame_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light frame"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame.as_entire_binding(),
            }],
        });
        let gbuffer_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light gbuffer"),
            layout: &layouts.gbuffer,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: tex(albedo) },
                wgpu::BindGroupEntry { binding: 1, resource: tex(normal) },
                wgpu::BindGroupEntry { binding: 2, resource: tex(material) },
                wgpu::BindGroupEntry { binding: 3, resource: tex(emission) },
                wgpu::BindGroupEntry { binding: 4, resource: tex(depth) },
            ],
        });
        let lights_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light arrays"),
            layout: &layouts.lights,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: dir_lights.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: sphere_lights.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: rect_lights.as_entire_binding() },
            ],
        });
        let samplers = &self.samplers;
        let shading_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light shading"),
            layout: &layouts.shading,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: tex(directional) },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&samplers.comparison),
                },
                wgpu::BindGroupEntry { binding: 2, resource: tex(sphere) },
                wgpu::BindGroupEntry { binding: 3, resource: tex(rect) },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&samplers.distance),
                },
                wgpu::BindGroupEntry { binding: 5, resource: tex(irradiance) },
                wgpu::BindGroupEntry { binding: 6, resource: tex(prefiltered) },
                wgpu::BindGroupEntry { binding: 7, resource: tex(brdf) },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::Sampler(&samplers.environment),
                },
            ],
        });
        Some([frame_group, gbuffer_group, lights_group, shading_group])
    }
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let usages = match usage {
        BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
        BufferUsage::Index => wgpu::BufferUsages::INDEX,
        BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
    };
    usages | wgpu::BufferUsages::COPY_DST
}

fn material_bind_group(
    device: &wgpu::Device,
    pipelines: &Pipelines,
    samplers: &Samplers,
    textures: &FxHashMap<TextureId, GpuTexture>,
    white: &wgpu::TextureView,
    label: &str,
    set: &MaterialTextures,
) -> wgpu::BindGroup {
    let view = |slot: Option<TextureId>| {
        slot.and_then(|id| textures.get(&id))
            .map_or(white, |t| &t.view)
    };
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &pipelines.layouts.material,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view(set.diffuse)),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(view(set.normal)),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(view(set.roughness)),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(view(set.metalness)),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(view(set.emission)),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::Sampler(&samplers.material),
            },
        ],
    })
}

fn color_attachment(
    view: &wgpu::TextureView,
    clear: wgpu::Color,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}

fn depth_attachment(view: &wgpu::TextureView) -> wgpu::RenderPassDepthStencilAttachment<'_> {
    wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0),
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    }
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            min_uniform_offset_alignment: self.device.limits().min_uniform_buffer_offset_alignment,
            timestamp_queries: self.timestamps,
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId {
        let id = BufferId::from_raw(self.allocate());
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size: desc
                .size
                .max(wgpu::COPY_BUFFER_ALIGNMENT)
                .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: buffer_usages(desc.usage),
            mapped_at_creation: false,
        });
        let _ = self.buffers.insert(id, buffer);
        id
    }

    fn create_buffer_init(&mut self, desc: &BufferDesc, data: &[u8]) -> BufferId {
        if data.len() as u64 != desc.size || data.is_empty() {
            let id = self.create_buffer(desc);
            self.write_buffer(id, 0, data);
            return id;
        }
        let id = BufferId::from_raw(self.allocate());
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&desc.label),
                contents: data,
                usage: buffer_usages(desc.usage),
            });
        let _ = self.buffers.insert(id, buffer);
        id
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        // Dropping defers the release until in-flight work no longer
        // references the buffer.
        let _ = self.buffers.remove(&id);
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        let Some(buffer) = self.buffers.get(&id) else {
            log::warn!("write to unknown buffer {}", id.raw());
            return;
        };
        if data.is_empty() {
            return;
        }
        if offset + data.len() as u64 > buffer.size() {
            log::warn!(
                "write of {} bytes at {offset} overruns buffer {} ({} bytes)",
                data.len(),
                id.raw(),
                buffer.size()
            );
            return;
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(
                data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize),
                0,
            );
            self.queue.write_buffer(buffer, offset, &padded);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId::from_raw(self.allocate());
        let _ = self.textures.insert(id, GpuTexture::new(&self.device, desc));
        id
    }

    fn write_texture(&mut self, id: TextureId, layer: u32, mip: u32, data: &[u8]) {
        match self.textures.get(&id) {
            Some(texture) => texture.write(&self.queue, layer, mip, data),
            None => log::warn!("write to unknown texture {}", id.raw()),
        }
    }

    fn destroy_texture(&mut self, id: TextureId) {
        let _ = self.textures.remove(&id);
    }

    fn create_material_binding(
        &mut self,
        label: &str,
        textures: &MaterialTextures,
    ) -> MaterialBindingId {
        let id = MaterialBindingId::from_raw(self.allocate());
        let group = material_bind_group(
            &self.device,
            &self.pipelines,
            &self.samplers,
            &self.textures,
            &self.fallbacks.white.view,
            label,
            textures,
        );
        let _ = self.materials.insert(id, group);
        id
    }

    fn prepare_program(&mut self, program: &ShaderKey) -> Result<()> {
        match program.kind {
            ShaderKind::LightAccumulation => {
                self.pipelines
                    .prepare_light(&self.device, &mut self.composer, program)
            }
            // Built with the backend.
            _ => Ok(()),
        }
    }

    fn begin_frame(&mut self) {
        if self.frame.is_some() {
            log::warn!("begin_frame with a frame in flight; dropping it");
        }
        self.frame = Some(self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            },
        ));
        self.timer.reset();
    }

    fn shadow_pass(&mut self, desc: &ShadowPassDesc<'_>) {
        let Some(encoder) = self.frame.as_mut() else {
            log::warn!("shadow pass outside a frame");
            return;
        };
        let (Some(uniforms), Some(transforms)) = (
            self.buffers.get(&desc.uniforms),
            self.buffers.get(&desc.transforms),
        ) else {
            log::warn!("shadow pass references a released buffer");
            return;
        };
        let Some(depth) = self.textures.get(&desc.depth.texture) else {
            log::warn!("shadow pass depth target {} is gone", desc.depth.texture.raw());
            return;
        };
        let distance = match desc.distance {
            Some(target) => match self.textures.get(&target.texture) {
                Some(texture) => Some(texture.layer_view(target.layer)),
                None => {
                    log::warn!("shadow distance target {} is gone", target.texture.raw());
                    return;
                }
            },
            None => None,
        };
        let depth_view = depth.layer_view(desc.depth.layer);
        let layouts = &self.pipelines.layouts;
        let face_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow face"),
            layout: &layouts.shadow_face,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer_window(uniforms, record_size::<ShadowPassUniforms>()),
            }],
        });
        let object_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow object"),
            layout: &layouts.shadow_object,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer_window(transforms, record_size::<TransformRecord>()),
            }],
        });

        // Empty texels read as "nothing closer than infinity".
        let far = wgpu::Color {
            r: f64::from(f32::MAX),
            g: 0.0,
            b: 0.0,
            a: 0.0,
        };
        let color: Vec<_> = distance
            .as_ref()
            .map(|view| color_attachment(view, far))
            .into_iter()
            .collect();
        let started = Instant::now();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow face"),
            color_attachments: &color,
            depth_stencil_attachment: Some(depth_attachment(&depth_view)),
            timestamp_writes: self.timer.writes(TimedPass::Shadow),
            occlusion_query_set: None,
        });
        pass.set_pipeline(if distance.is_some() {
            &self.pipelines.shadow_distance
        } else {
            &self.pipelines.shadow_depth
        });
        pass.set_bind_group(0, &face_group, &[desc.uniform_offset]);
        for caster in desc.casters {
            let (Some(vertices), Some(indices)) = (
                self.buffers.get(&caster.mesh.vertices),
                self.buffers.get(&caster.mesh.indices),
            ) else {
                continue;
            };
            pass.set_bind_group(1, &object_group, &[caster.transform_offset]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..caster.mesh.index_count, 0, 0..1);
        }
        drop(pass);
        self.timer.add_cpu(TimedPass::Shadow, started);
    }

    fn geometry_pass(&mut self, desc: &GeometryPassDesc<'_>) {
        let Some(encoder) = self.frame.as_mut() else {
            log::warn!("geometry pass outside a frame");
            return;
        };
        let g = desc.gbuffer;
        let targets: Option<Vec<&GpuTexture>> = [g.albedo, g.normal, g.material, g.emission, g.depth]
            .iter()
            .map(|id| self.textures.get(id))
            .collect();
        let (Some(targets), Some(frame), Some(transforms), Some(materials)) = (
            targets,
            self.buffers.get(&desc.frame),
            self.buffers.get(&desc.transforms),
            self.buffers.get(&desc.materials),
        ) else {
            log::warn!("geometry pass references a released resource");
            return;
        };

        let layouts = &self.pipelines.layouts;
        let frame_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("geometry frame"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame.as_entire_binding(),
            }],
        });
        let object_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("geometry objects"),
            layout: &layouts.object,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer_window(transforms, record_size::<TransformRecord>()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffer_window(materials, record_size::<MaterialRecord>()),
                },
            ],
        });

        let clear = wgpu::Color::TRANSPARENT;
        let color = [
            color_attachment(&targets[0].view, clear),
            color_attachment(&targets[1].view, clear),
            color_attachment(&targets[2].view, clear),
            color_attachment(&targets[3].view, clear),
        ];
        let started = Instant::now();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("geometry"),
            color_attachments: &color,
            depth_stencil_attachment: Some(depth_attachment(&targets[4].view)),
            timestamp_writes: self.timer.writes(TimedPass::Geometry),
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipelines.mesh);
        pass.set_bind_group(0, &frame_group, &[]);
        for draw in desc.meshes {
            let (Some(vertices), Some(indices)) = (
                self.buffers.get(&draw.mesh.vertices),
                self.buffers.get(&draw.mesh.indices),
            ) else {
                continue;
            };
            let material = self
                .materials
                .get(&draw.material)
                .unwrap_or(&self.fallbacks.material);
            pass.set_bind_group(1, &object_group, &[draw.transform_offset, draw.material_offset]);
            pass.set_bind_group(2, material, &[]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.mesh.index_count, 0, 0..1);
        }

        if !desc.wires.is_empty() {
            pass.set_pipeline(&self.pipelines.wire);
            pass.set_bind_group(0, &frame_group, &[]);
            for wire in desc.wires {
                let Some(vertices) = self.buffers.get(&wire.vertices) else {
                    continue;
                };
                pass.set_bind_group(1, &object_group, &[wire.transform_offset, wire.material_offset]);
                pass.set_vertex_buffer(0, vertices.slice(..));
                pass.draw(0..wire.vertex_count, 0..1);
            }
        }
        drop(pass);
        self.timer.add_cpu(TimedPass::Geometry, started);
    }

    fn light_pass(&mut self, desc: &LightPassDesc<'_>) {
        if self.frame.is_none() {
            log::warn!("light pass outside a frame");
            return;
        }
        let Some([frame_group, gbuffer_group, lights_group, shading_group]) =
            self.light_bind_groups(desc)
        else {
            return;
        };
        let Some(pipeline) = self.pipelines.light(desc.program) else {
            log::error!("light program {} was never prepared", desc.program.label());
            return;
        };
        let (Some(encoder), Some(output)) = (
            self.frame.as_mut(),
            self.textures.get(&desc.output).map(|t| &t.view),
        ) else {
            log::warn!("light pass references a released texture");
            return;
        };

        let [red, green, blue, alpha] = desc.clear_color.map(f64::from);
        let clear = wgpu::Color {
            r: red,
            g: green,
            b: blue,
            a: alpha,
        };
        let color = [color_attachment(output, clear)];
        let started = Instant::now();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("light accumulation"),
            color_attachments: &color,
            depth_stencil_attachment: None,
            timestamp_writes: self.timer.writes(TimedPass::Lighting),
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &frame_group, &[]);
        pass.set_bind_group(1, &gbuffer_group, &[]);
        pass.set_bind_group(2, &lights_group, &[]);
        pass.set_bind_group(3, &shading_group, &[]);
        pass.draw(0..3, 0..1);
        drop(pass);
        self.timer.add_cpu(TimedPass::Lighting, started);
    }

    fn end_frame(&mut self) -> PassTimings {
        let Some(mut encoder) = self.frame.take() else {
            log::warn!("end_frame without begin_frame");
            return PassTimings::default();
        };
        self.timer.resolve(&mut encoder);
        let _ = self.queue.submit(std::iter::once(encoder.finish()));
        self.timer.read(&self.device)
    }

    fn cancel_frame(&mut self) {
        if self.frame.take().is_some() {
            log::debug!("frame cancelled before submission");
        }
    }

    fn dispatch(&mut self, dispatch: &ComputeDispatch) {
        match self.segments.last_mut() {
            Some(segment) => segment.push(dispatch.clone()),
            None => self.segments.push(vec![dispatch.clone()]),
        }
    }

    fn barrier(&mut self, resources: &[TextureId]) {
        // A compute pass boundary orders every storage write before the
        // reads that follow it.
        if self.segments.last().is_some_and(|s| !s.is_empty()) {
            self.segments.push(Vec::new());
        }
        log::trace!("compute barrier over {} textures", resources.len());
    }

    fn flush(&mut self) {
        if self.segments.iter().all(Vec::is_empty) {
            self.segments.clear();
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ibl encoder"),
            });
        let mut dispatched = 0_usize;
        for segment in self.segments.drain(..).filter(|s| !s.is_empty()) {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ibl segment"),
                timestamp_writes: None,
            });
            for dispatch in &segment {
                let Some(group) = compute_bind_group(
                    &self.device,
                    &self.pipelines,
                    &self.samplers,
                    &self.textures,
                    dispatch,
                ) else {
                    log::warn!("dispatch {} references a released texture", dispatch.label);
                    continue;
                };
                pass.set_pipeline(self.pipelines.compute(dispatch.program));
                pass.set_bind_group(0, &group, &[]);
                let [x, y, z] = dispatch.workgroups;
                pass.dispatch_workgroups(x, y, z);
                dispatched += 1;
            }
        }
        let _ = self.queue.submit(std::iter::once(encoder.finish()));
        if let Err(e) = self.device.poll(wgpu::PollType::Wait) {
            log::error!("waiting for compute work failed: {e}");
        }
        log::debug!("flushed {dispatched} compute dispatches");
    }
}

/// Bind group for one dispatch against its pipeline's derived layout.
fn compute_bind_group(
    device: &wgpu::Device,
    pipelines: &Pipelines,
    samplers: &Samplers,
    textures: &FxHashMap<TextureId, GpuTexture>,
    dispatch: &ComputeDispatch,
) -> Option<wgpu::BindGroup> {
    let output = textures.get(&dispatch.output.texture)?;
    let storage = output.storage_view(dispatch.output.mip);
    let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&dispatch.label),
        contents: bytemuck::bytes_of(&dispatch.params),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let layout = pipelines.compute(dispatch.program).get_bind_group_layout(0);

    let group = if dispatch.program == ComputeProgram::BrdfLut {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&dispatch.label),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&storage),
                },
            ],
        })
    } else {
        let source = textures.get(&dispatch.input?)?;
        let expected = if dispatch.program == ComputeProgram::EquirectToCube {
            TextureShape::D2
        } else {
            TextureShape::Cube
        };
        if source.desc.shape != expected {
            log::warn!(
                "dispatch {} expects a {expected:?} source, got {:?}",
                dispatch.label,
                source.desc.shape
            );
            return None;
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&dispatch.label),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&samplers.compute),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&storage),
                },
            ],
        })
    };
    Some(group)
}
