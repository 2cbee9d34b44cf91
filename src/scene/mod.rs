//! CPU-side scene resources: meshes, images, materials, lights and the
//! renderables that reference them.

/// Axis-aligned bounding boxes.
pub mod bounds;
/// Analytic light sources.
pub mod light;
/// PBR material parameters.
pub mod material;
/// Triangle meshes with derived tangent frames.
pub mod mesh;
/// Mesh and wire renderables.
pub mod renderable;
/// Images, textures and IBL environments.
pub mod texture;

pub use bounds::Aabb;
pub use light::{DirectionalLight, LightKey, RectLight, SphereLight};
pub use material::{Material, MaterialEntry, MaterialMaps};
pub use mesh::Mesh;
pub use renderable::{MeshRenderer, Renderable, WireRenderer};
pub use texture::{Environment, ImageData, ImageFormat, Texture};
