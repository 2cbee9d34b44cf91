use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Image-Based Lighting", inline)]
#[serde(default)]
#[allow(missing_docs)]
pub struct IblOptions {
    #[schemars(title = "Environment Resolution", range(min = 16, max = 4096))]
    pub environment_resolution: u32,
    #[schemars(title = "Irradiance Resolution", range(min = 4, max = 256))]
    pub irradiance_resolution: u32,
    #[schemars(title = "Prefiltered Resolution", range(min = 16, max = 2048))]
    pub prefiltered_resolution: u32,
    #[schemars(title = "Prefiltered Mips", range(min = 1, max = 12))]
    pub prefiltered_mip_levels: u32,
    #[schemars(skip)]
    pub brdf_lut_resolution: u32,
    #[schemars(title = "Samples", range(min = 16, max = 4096))]
    pub sample_count: u32,
    /// Integrate the BRDF table on the CPU instead of a compute dispatch.
    #[schemars(skip)]
    pub cpu_brdf_lut: bool,
}

impl Default for IblOptions {
    fn default() -> Self {
        Self {
            environment_resolution: 512,
            irradiance_resolution: 32,
            prefiltered_resolution: 256,
            prefiltered_mip_levels: 5,
            brdf_lut_resolution: 256,
            sample_count: 512,
            cpu_brdf_lut: false,
        }
    }
}
