//! GPU plumbing: the backend seam and its two implementations, the byte
//! layouts shared with WGSL, GPU-mirrored buffers, and shader composition.

/// Command seam between the core and a GPU.
pub mod backend;
/// Recording backend for tests and dry runs.
pub mod headless;
/// `#[repr(C)]` records shared with WGSL.
pub mod layout;
/// Shared wgpu boilerplate for layouts, samplers and pipelines.
pub mod pipeline_helpers;
/// wgpu device and queue initialization.
pub mod render_context;
/// Growable GPU buffers with a CPU-visible capacity.
pub mod resizable_buffer;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Structural shader identity used as a cache key.
pub mod shader_key;
/// Device textures and their views.
pub mod texture;
/// [`backend::RenderBackend`] on a real wgpu device.
pub mod wgpu_backend;
