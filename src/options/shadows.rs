use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Shadows", inline)]
#[serde(default)]
#[allow(missing_docs)]
pub struct ShadowOptions {
    #[schemars(title = "Directional Lights", range(min = 1, max = 16))]
    pub directional_capacity: u32,
    #[schemars(title = "Sphere Lights", range(min = 1, max = 64))]
    pub sphere_capacity: u32,
    #[schemars(title = "Rect Lights", range(min = 1, max = 64))]
    pub rect_capacity: u32,
    #[schemars(title = "Directional Resolution", range(min = 64, max = 8192))]
    pub directional_resolution: u32,
    #[schemars(title = "Cube Resolution", range(min = 16, max = 4096))]
    pub cube_resolution: u32,
    /// Radiance below which a cube shadow stops; sets the far plane.
    #[schemars(skip)]
    pub energy_tolerance: f32,
    #[schemars(skip)]
    pub near_epsilon: f32,
}

impl Default for ShadowOptions {
    fn default() -> Self {
        Self {
            directional_capacity: 4,
            sphere_capacity: 4,
            rect_capacity: 4,
            directional_resolution: 2048,
            cube_resolution: 512,
            energy_tolerance: 1.0 / 256.0,
            near_epsilon: 1e-3,
        }
    }
}
