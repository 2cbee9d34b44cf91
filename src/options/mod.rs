//! Renderer options with TOML preset support.
//!
//! Shadow pool capacities and resolutions, IBL precompute sizes and the
//! frame target live here. Options serialize to/from TOML; every section is
//! `#[serde(default)]` so partial files work.

mod frame;
mod ibl;
mod shadows;

use std::path::Path;

pub use frame::FrameOptions;
pub use ibl::IblOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use shadows::ShadowOptions;

use crate::error::{RenderError, Result};

/// Top-level options container.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct RendererOptions {
    /// Shadow pools and cube far-plane heuristic.
    pub shadows: ShadowOptions,
    /// Environment precompute sizes.
    pub ibl: IblOptions,
    /// Output target.
    pub frame: FrameOptions,
}

impl RendererOptions {
    /// Generate JSON Schema describing the UI-exposed options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(RendererOptions)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// I/O failure, TOML syntax errors, or values rejected by
    /// [`RendererOptions::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options: Self = toml::from_str(&content)
            .map_err(|e| RenderError::OptionsParse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Serialization or I/O failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RenderError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the renderer cannot build resources from.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let s = &self.shadows;
        let i = &self.ibl;
        let nonzero = [
            ("shadows.directional_capacity", s.directional_capacity),
            ("shadows.sphere_capacity", s.sphere_capacity),
            ("shadows.rect_capacity", s.rect_capacity),
            ("shadows.directional_resolution", s.directional_resolution),
            ("shadows.cube_resolution", s.cube_resolution),
            ("ibl.environment_resolution", i.environment_resolution),
            ("ibl.irradiance_resolution", i.irradiance_resolution),
            ("ibl.prefiltered_resolution", i.prefiltered_resolution),
            ("ibl.prefiltered_mip_levels", i.prefiltered_mip_levels),
            ("ibl.brdf_lut_resolution", i.brdf_lut_resolution),
            ("ibl.sample_count", i.sample_count),
            ("frame.width", self.frame.width),
            ("frame.height", self.frame.height),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(RenderError::Configuration(format!(
                "{name} must be non-zero"
            )));
        }

        let max_mips = i.prefiltered_resolution.ilog2() + 1;
        if i.prefiltered_mip_levels > max_mips {
            return Err(RenderError::Configuration(format!(
                "ibl.prefiltered_mip_levels {} exceeds {max_mips} for a \
                 {}px cube",
                i.prefiltered_mip_levels, i.prefiltered_resolution
            )));
        }

        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(s.energy_tolerance) || !positive(s.near_epsilon) {
            return Err(RenderError::Configuration(
                "shadows.energy_tolerance and shadows.near_epsilon must be \
                 positive"
                    .to_owned(),
            ));
        }
        Ok(())
    }

    /// List available preset names (TOML file stems) in a directory.
    #[must_use]
    pub fn list_presets(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) =
                        path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = RendererOptions::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: RendererOptions = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
[shadows]
sphere_capacity = 8
";
        let opts: RendererOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.shadows.sphere_capacity, 8);
        // Everything else should be default
        assert_eq!(opts.shadows.directional_capacity, 4);
        assert_eq!(opts.shadows.energy_tolerance, 1.0 / 256.0);
        assert_eq!(opts.ibl.prefiltered_mip_levels, 5);
    }

    #[test]
    fn validation_rejects_zero_and_excess_mips() {
        let mut opts = RendererOptions::default();
        opts.shadows.rect_capacity = 0;
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("rect_capacity"));

        let mut opts = RendererOptions::default();
        opts.ibl.prefiltered_resolution = 16;
        opts.ibl.prefiltered_mip_levels = 6;
        assert!(opts.validate().is_err());
        opts.ibl.prefiltered_mip_levels = 5;
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!(
            "lumen-options-{}",
            std::process::id()
        ));
        let path = dir.join("preset.toml");
        let mut opts = RendererOptions::default();
        opts.ibl.cpu_brdf_lut = true;
        opts.save(&path).unwrap();
        assert_eq!(RendererOptions::load(&path).unwrap(), opts);
        assert_eq!(RendererOptions::list_presets(&dir), vec!["preset"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(RendererOptions::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();
        assert!(props.contains_key("shadows"));
        assert!(props.contains_key("ibl"));

        let shadows = &props["shadows"]["properties"];
        assert!(shadows.get("sphere_capacity").is_some());
        assert!(shadows.get("energy_tolerance").is_none());
    }
}
