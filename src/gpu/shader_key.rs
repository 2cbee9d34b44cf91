//! Structural shader identity.

use std::collections::BTreeMap;

/// Which WGSL program a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    /// G-buffer fill (meshes and wires).
    Geometry,
    /// Shadow face rasterization (depth-only and linear distance).
    Shadow,
    /// Full-screen light accumulation.
    LightAccumulation,
    /// Equirect → cube compute.
    EquirectToCube,
    /// Irradiance convolution compute.
    Irradiance,
    /// GGX prefilter compute.
    Prefilter,
    /// Split-sum BRDF integration compute.
    BrdfLut,
}

impl ShaderKind {
    /// Source file path relative to the shader root.
    #[must_use]
    pub const fn file_path(self) -> &'static str {
        match self {
            Self::Geometry => "geometry.wgsl",
            Self::Shadow => "shadow.wgsl",
            Self::LightAccumulation => "lighting.wgsl",
            Self::EquirectToCube => "ibl/equirect_to_cube.wgsl",
            Self::Irradiance => "ibl/irradiance.wgsl",
            Self::Prefilter => "ibl/prefilter.wgsl",
            Self::BrdfLut => "ibl/brdf_lut.wgsl",
        }
    }
}

/// A preprocessor define value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderDefine {
    /// `#ifdef`-style flag.
    Bool(bool),
    /// Signed integer.
    Int(i32),
    /// Unsigned integer.
    UInt(u32),
}

impl From<ShaderDefine> for naga_oil::compose::ShaderDefValue {
    fn from(value: ShaderDefine) -> Self {
        match value {
            ShaderDefine::Bool(b) => Self::Bool(b),
            ShaderDefine::Int(i) => Self::Int(i),
            ShaderDefine::UInt(u) => Self::UInt(u),
        }
    }
}

/// Program kind plus its define set.
///
/// Defines live in a `BTreeMap`, so two keys built from the same pairs in a
/// different order compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    /// Program.
    pub kind: ShaderKind,
    /// Defines passed to the composer.
    pub defines: BTreeMap<String, ShaderDefine>,
}

impl ShaderKey {
    /// Key with no defines.
    #[must_use]
    pub const fn new(kind: ShaderKind) -> Self {
        Self {
            kind,
            defines: BTreeMap::new(),
        }
    }

    /// Builder-style define.
    #[must_use]
    pub fn with(mut self, name: &str, value: ShaderDefine) -> Self {
        let _ = self.defines.insert(name.to_owned(), value);
        self
    }

    /// Short human-readable label, e.g. `LightAccumulation[MAX_RECT=4]`.
    #[must_use]
    pub fn label(&self) -> String {
        if self.defines.is_empty() {
            return format!("{:?}", self.kind);
        }
        let defs: Vec<String> = self
            .defines
            .iter()
            .map(|(k, v)| match v {
                ShaderDefine::Bool(b) => format!("{k}={b}"),
                ShaderDefine::Int(i) => format!("{k}={i}"),
                ShaderDefine::UInt(u) => format!("{k}={u}"),
            })
            .collect();
        format!("{:?}[{}]", self.kind, defs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn define_order_does_not_matter() {
        let a = ShaderKey::new(ShaderKind::LightAccumulation)
            .with("MAX_DIRECTIONAL", ShaderDefine::UInt(4))
            .with("MAX_SPHERE", ShaderDefine::UInt(2));
        let b = ShaderKey::new(ShaderKind::LightAccumulation)
            .with("MAX_SPHERE", ShaderDefine::UInt(2))
            .with("MAX_DIRECTIONAL", ShaderDefine::UInt(4));
        assert_eq!(a, b);

        let mut set = FxHashSet::default();
        assert!(set.insert(a));
        assert!(!set.insert(b));
    }

    #[test]
    fn different_values_are_distinct() {
        let a = ShaderKey::new(ShaderKind::Geometry).with("X", ShaderDefine::UInt(1));
        let b = ShaderKey::new(ShaderKind::Geometry).with("X", ShaderDefine::UInt(2));
        assert_ne!(a, b);
        assert_eq!(a.label(), "Geometry[X=1]");
    }
}
