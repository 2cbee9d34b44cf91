//! A [`RenderBackend`] that records commands instead of executing them.
//!
//! Buffer writes are applied to CPU-side byte vectors so callers can read
//! back exactly what the GPU would have received. Passes and dispatches are
//! appended to a command log in submission order.

use rustc_hash::FxHashMap;

use crate::gpu::backend::{
    BackendCapabilities, BufferDesc, BufferId, BufferUsage, ComputeDispatch, ComputeProgram,
    EnvironmentBinding, GeometryPassDesc, LightPassDesc, MaterialBindingId, MaterialTextures, PassTimings,
    RenderBackend, ShadowPassDesc, StorageTarget, TextureDesc, TextureId, TextureLayer,
};
use crate::gpu::shader_key::ShaderKey;
use crate::error::Result;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Buffer allocated.
    CreateBuffer {
        /// New id.
        id: BufferId,
        /// Debug label.
        label: String,
        /// Size in bytes.
        size: u64,
        /// Binding kind.
        usage: BufferUsage,
    },
    /// Buffer released.
    DestroyBuffer(BufferId),
    /// Bytes written into a buffer.
    WriteBuffer {
        /// Target.
        id: BufferId,
        /// Byte offset.
        offset: u64,
        /// Byte count.
        len: usize,
    },
    /// Texture allocated.
    CreateTexture {
        /// New id.
        id: TextureId,
        /// Debug label.
        label: String,
    },
    /// Texels uploaded.
    WriteTexture {
        /// Target.
        id: TextureId,
        /// Layer.
        layer: u32,
        /// Mip.
        mip: u32,
        /// Byte count.
        len: usize,
    },
    /// Texture released.
    DestroyTexture(TextureId),
    /// Material texture set built.
    CreateMaterialBinding {
        /// New id.
        id: MaterialBindingId,
        /// Bound channels.
        textures: MaterialTextures,
    },
    /// Program composed ahead of the first frame.
    PrepareProgram(ShaderKey),
    /// Frame recording started.
    BeginFrame,
    /// Shadow face rendered.
    ShadowPass {
        /// Depth target layer.
        depth: TextureLayer,
        /// Distance target layer (cube faces).
        distance: Option<TextureLayer>,
        /// Offset of the face's uniform range.
        uniform_offset: u32,
        /// Number of casters drawn.
        casters: usize,
    },
    /// G-buffer filled.
    GeometryPass {
        /// Mesh draws.
        meshes: usize,
        /// Wire draws.
        wires: usize,
    },
    /// Lights accumulated.
    LightPass {
        /// Program used.
        program: ShaderKey,
        /// Bound environment textures.
        environment: Option<EnvironmentBinding>,
    },
    /// Frame submitted.
    EndFrame,
    /// Frame dropped.
    CancelFrame,
    /// Compute dispatch queued.
    Dispatch {
        /// Program.
        program: ComputeProgram,
        /// Debug label.
        label: String,
        /// Sampled input.
        input: Option<TextureId>,
        /// Written mip.
        output: StorageTarget,
        /// Workgroup counts.
        workgroups: [u32; 3],
    },
    /// Visibility barrier over the listed textures.
    Barrier(Vec<TextureId>),
    /// Compute work submitted and waited on.
    Flush,
}

/// Recording backend used by tests and dry runs.
#[derive(Debug)]
pub struct HeadlessBackend {
    capabilities: BackendCapabilities,
    next_id: u32,
    buffers: FxHashMap<BufferId, Vec<u8>>,
    textures: FxHashMap<TextureId, TextureDesc>,
    commands: Vec<Command>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Backend reporting a 256-byte uniform alignment and no timestamps.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(BackendCapabilities {
            min_uniform_offset_alignment: 256,
            timestamp_queries: false,
        })
    }

    /// Backend reporting the given capabilities.
    #[must_use]
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            capabilities,
            next_id: 1,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            commands: Vec::new(),
        }
    }

    /// Every command recorded so far.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain the command log.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Current contents of a live buffer.
    #[must_use]
    pub fn buffer_contents(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(Vec::as_slice)
    }

    /// Read one `T` at byte `offset` of a live buffer.
    #[must_use]
    pub fn read_record<T: bytemuck::Pod>(&self, id: BufferId, offset: u64) -> Option<T> {
        let bytes = self.buffers.get(&id)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(size_of::<T>())?;
        bytes
            .get(start..end)
            .map(bytemuck::pod_read_unaligned)
    }

    /// Descriptor of a live texture.
    #[must_use]
    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    /// Number of live buffers.
    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl RenderBackend for HeadlessBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId {
        let id = BufferId::from_raw(self.allocate());
        let _ = self
            .buffers
            .insert(id, vec![0; usize::try_from(desc.size).unwrap_or(0)]);
        self.commands.push(Command::CreateBuffer {
            id,
            label: desc.label.clone(),
            size: desc.size,
            usage: desc.usage,
        });
        id
    }

    fn create_buffer_init(&mut self, desc: &BufferDesc, data: &[u8]) -> BufferId {
        let id = self.create_buffer(desc);
        self.write_buffer(id, 0, data);
        id
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        let _ = self.buffers.remove(&id);
        self.commands.push(Command::DestroyBuffer(id));
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        if let Some(bytes) = self.buffers.get_mut(&id) {
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            match bytes.get_mut(start..start.saturating_add(data.len())) {
                Some(range) => range.copy_from_slice(data),
                None => log::warn!("write past end of buffer {}", id.raw()),
            }
        } else {
            log::warn!("write to unknown buffer {}", id.raw());
        }
        self.commands.push(Command::WriteBuffer {
            id,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId::from_raw(self.allocate());
        let _ = self.textures.insert(id, desc.clone());
        self.commands.push(Command::CreateTexture {
            id,
            label: desc.label.clone(),
        });
        id
    }

    fn write_texture(&mut self, id: TextureId, layer: u32, mip: u32, data: &[u8]) {
        self.commands.push(Command::WriteTexture {
            id,
            layer,
            mip,
            len: data.len(),
        });
    }

    fn destroy_texture(&mut self, id: TextureId) {
        let _ = self.textures.remove(&id);
        self.commands.push(Command::DestroyTexture(id));
    }

    fn create_material_binding(
        &mut self,
        _label: &str,
        textures: &MaterialTextures,
    ) -> MaterialBindingId {
        let id = MaterialBindingId::from_raw(self.allocate());
        self.commands.push(Command::CreateMaterialBinding {
            id,
            textures: *textures,
        });
        id
    }

    fn prepare_program(&mut self, program: &ShaderKey) -> Result<()> {
        self.commands.push(Command::PrepareProgram(program.clone()));
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.commands.push(Command::BeginFrame);
    }

    fn shadow_pass(&mut self, desc: &ShadowPassDesc<'_>) {
        self.commands.push(Command::ShadowPass {
            depth: desc.depth,
            distance: desc.distance,
            uniform_offset: desc.uniform_offset,
            casters: desc.casters.len(),
        });
    }

    fn geometry_pass(&mut self, desc: &GeometryPassDesc<'_>) {
        self.commands.push(Command::GeometryPass {
            meshes: desc.meshes.len(),
            wires: desc.wires.len(),
        });
    }

    fn light_pass(&mut self, desc: &LightPassDesc<'_>) {
        self.commands.push(Command::LightPass {
            program: desc.program.clone(),
            environment: desc.environment,
        });
    }

    fn end_frame(&mut self) -> PassTimings {
        self.commands.push(Command::EndFrame);
        PassTimings::default()
    }

    fn cancel_frame(&mut self) {
        self.commands.push(Command::CancelFrame);
    }

    fn dispatch(&mut self, dispatch: &ComputeDispatch) {
        self.commands.push(Command::Dispatch {
            program: dispatch.program,
            label: dispatch.label.clone(),
            input: dispatch.input,
            output: dispatch.output,
            workgroups: dispatch.workgroups,
        });
    }

    fn barrier(&mut self, resources: &[TextureId]) {
        self.commands.push(Command::Barrier(resources.to_vec()));
    }

    fn flush(&mut self) {
        self.commands.push(Command::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_land_in_buffer_contents() {
        let mut backend = HeadlessBackend::new();
        let id = backend.create_buffer(&BufferDesc {
            label: "b".to_owned(),
            size: 16,
            usage: BufferUsage::Storage,
        });
        backend.write_buffer(id, 4, &[1, 2, 3, 4]);
        assert_eq!(
            backend.buffer_contents(id).unwrap(),
            &[0, 0, 0, 0, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        let value: u32 = backend.read_record(id, 4).unwrap();
        assert_eq!(value, u32::from_le_bytes([1, 2, 3, 4]));
        assert!(backend.read_record::<u64>(id, 12).is_none());
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut backend = HeadlessBackend::new();
        let b = backend.create_buffer(&BufferDesc {
            label: "b".to_owned(),
            size: 4,
            usage: BufferUsage::Uniform,
        });
        let t = backend.create_texture(&TextureDesc::sampled_2d(
            "t",
            1,
            1,
            wgpu::TextureFormat::Rgba8Unorm,
        ));
        assert_ne!(b.raw(), t.raw());
        assert_eq!(backend.commands().len(), 2);
        assert_eq!(backend.take_commands().len(), 2);
        assert!(backend.commands().is_empty());
    }
}
