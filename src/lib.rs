// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits (thresholds in clippy.toml)
#![deny(clippy::cognitive_complexity)]
#![deny(clippy::too_many_lines)]
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::too_many_arguments)]
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! Deferred physically-based rendering core built on wgpu.
//!
//! Lumen owns the GPU side of an interactive 3D viewer: resource handles,
//! GPU-mirrored buffers, shadow mapping, image-based lighting precompute, and
//! the per-frame pass sequence.
//!
//! # Key entry points
//!
//! - [`renderer::Renderer`] - owns a backend, the resource registry, the frame
//!   orchestrator and the IBL pipeline
//! - [`arena::GenKeyVector`] - generational arena behind every resource kind
//! - [`gpu::backend::RenderBackend`] - the command seam; implemented by
//!   [`gpu::wgpu_backend::WgpuBackend`] for real devices and
//!   [`gpu::headless::HeadlessBackend`] for recording/diagnostics
//! - [`options::RendererOptions`] - TOML-backed configuration (shadow pool
//!   capacities, resolutions, IBL mip range)
//!
//! # Architecture
//!
//! Every `add_*` call synchronously builds the resource's GPU mirror and
//! returns a [`arena::GenKey`]. A frame runs a fixed sequence:
//! frame uniforms → shadow passes → geometry pass (G-buffer) → light
//! accumulation. Environments are converted once, on demand, by a small pass
//! graph (equirect → cube → irradiance / prefiltered mips, plus a cached BRDF
//! LUT) which inserts compute barriers from declared read/write sets.

pub mod arena;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod ibl;
pub mod options;
pub mod registry;
pub mod renderer;
pub mod scene;
pub mod shadow;

pub use error::{RenderError, Result};
