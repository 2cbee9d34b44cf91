use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Frame", inline)]
#[serde(default)]
#[allow(missing_docs)]
pub struct FrameOptions {
    #[schemars(skip)]
    pub width: u32,
    #[schemars(skip)]
    pub height: u32,
    #[schemars(title = "Clear Color")]
    pub clear_color: [f32; 4],
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
