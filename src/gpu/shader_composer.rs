use std::borrow::Cow;
use std::collections::HashMap;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor, ShaderLanguage, ShaderType,
};
use rustc_hash::FxHashMap;

use crate::error::{RenderError, Result};
use crate::gpu::shader_key::ShaderKey;

/// Shared modules, in dependency order.
const MODULE_PATHS: &[&str] = &["modules/types.wgsl", "modules/sampling.wgsl"];

/// Supplies WGSL text by path (relative to the shader root).
pub trait ShaderSource {
    /// Source text for `path`, or `None` if unknown.
    fn source(&self, path: &str) -> Option<Cow<'static, str>>;
}

/// The shaders compiled into the crate from `assets/shaders/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedShaders;

impl ShaderSource for EmbeddedShaders {
    fn source(&self, path: &str) -> Option<Cow<'static, str>> {
        let text: &'static str = match path {
            "modules/types.wgsl" => include_str!("../../assets/shaders/modules/types.wgsl"),
            "modules/sampling.wgsl" => include_str!("../../assets/shaders/modules/sampling.wgsl"),
            "geometry.wgsl" => include_str!("../../assets/shaders/geometry.wgsl"),
            "shadow.wgsl" => include_str!("../../assets/shaders/shadow.wgsl"),
            "lighting.wgsl" => include_str!("../../assets/shaders/lighting.wgsl"),
            "ibl/equirect_to_cube.wgsl" => {
                include_str!("../../assets/shaders/ibl/equirect_to_cube.wgsl")
            }
            "ibl/irradiance.wgsl" => include_str!("../../assets/shaders/ibl/irradiance.wgsl"),
            "ibl/prefilter.wgsl" => include_str!("../../assets/shaders/ibl/prefilter.wgsl"),
            "ibl/brdf_lut.wgsl" => include_str!("../../assets/shaders/ibl/brdf_lut.wgsl"),
            _ => return None,
        };
        Some(Cow::Borrowed(text))
    }
}

/// Wraps `naga_oil::compose::Composer` and caches composed programs by
/// [`ShaderKey`].
///
/// Shared modules are registered once at construction. Consuming shaders
/// pull them in with `#import lumen::types` / `#import lumen::sampling`;
/// the key's defines become naga_oil shader defs, so `#ifdef NAME` and
/// `#{NAME}` substitutions resolve per key.
pub struct ShaderComposer {
    composer: Composer,
    source: Box<dyn ShaderSource>,
    cache: FxHashMap<ShaderKey, naga::Module>,
}

impl ShaderComposer {
    /// Composer over the embedded shader set.
    ///
    /// # Errors
    ///
    /// [`RenderError::Shader`] if a shared module fails to parse.
    pub fn new() -> Result<Self> {
        Self::with_source(Box::new(EmbeddedShaders))
    }

    /// Composer over a caller-provided shader set.
    ///
    /// # Errors
    ///
    /// [`RenderError::Shader`] if a shared module is missing or fails to parse.
    pub fn with_source(source: Box<dyn ShaderSource>) -> Result<Self> {
        let mut composer = Composer::default();
        for &path in MODULE_PATHS {
            let text = source.source(path).ok_or_else(|| RenderError::Shader {
                label: path.to_owned(),
                message: "source not found".to_owned(),
            })?;
            let added = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: &text,
                    file_path: path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map(|_| ());
            if let Err(e) = added {
                return Err(RenderError::Shader {
                    label: path.to_owned(),
                    message: e.emit_to_string(&composer),
                });
            }
        }
        Ok(Self {
            composer,
            source,
            cache: FxHashMap::default(),
        })
    }

    /// Composed naga IR for `key`, compiling on first request.
    ///
    /// # Errors
    ///
    /// [`RenderError::Shader`] if the source is missing or fails to compose.
    pub fn module(&mut self, key: &ShaderKey) -> Result<&naga::Module> {
        if !self.cache.contains_key(key) {
            let module = self.compose(key)?;
            log::debug!("composed shader {}", key.label());
            let _ = self.cache.insert(key.clone(), module);
        }
        self.cache.get(key).ok_or_else(|| RenderError::Shader {
            label: key.label(),
            message: "cache miss after compose".to_owned(),
        })
    }

    /// Build a `wgpu::ShaderModule` for `key`.
    ///
    /// # Errors
    ///
    /// See [`ShaderComposer::module`].
    pub fn create_shader_module(
        &mut self,
        device: &wgpu::Device,
        key: &ShaderKey,
    ) -> Result<wgpu::ShaderModule> {
        let label = key.label();
        let module = self.module(key)?.clone();
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
        }))
    }

    /// Number of distinct keys composed so far.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn compose(&mut self, key: &ShaderKey) -> Result<naga::Module> {
        let path = key.kind.file_path();
        let text = self.source.source(path).ok_or_else(|| RenderError::Shader {
            label: path.to_owned(),
            message: "source not found".to_owned(),
        })?;
        let shader_defs: HashMap<_, _> = key
            .defines
            .iter()
            .map(|(name, value)| (name.clone(), (*value).into()))
            .collect();
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source: &text,
                file_path: path,
                shader_type: ShaderType::Wgsl,
                shader_defs,
                ..Default::default()
            })
            .map_err(|e| RenderError::Shader {
                label: key.label(),
                message: e.emit_to_string(&self.composer),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::shader_key::{ShaderDefine, ShaderKind};

    fn light_key() -> ShaderKey {
        ShaderKey::new(ShaderKind::LightAccumulation)
            .with("MAX_DIRECTIONAL", ShaderDefine::UInt(4))
            .with("MAX_SPHERE", ShaderDefine::UInt(4))
            .with("MAX_RECT", ShaderDefine::UInt(4))
    }

    #[test]
    fn all_programs_compose() {
        let mut composer = ShaderComposer::new().unwrap();
        for kind in [
            ShaderKind::Geometry,
            ShaderKind::Shadow,
            ShaderKind::EquirectToCube,
            ShaderKind::Irradiance,
            ShaderKind::Prefilter,
            ShaderKind::BrdfLut,
        ] {
            let key = ShaderKey::new(kind);
            let composed = composer.module(&key).map(|_| ());
            assert!(composed.is_ok(), "{kind:?} failed: {composed:?}");
        }
        let _ = composer.module(&light_key()).unwrap();
        assert_eq!(composer.cached_count(), 7);
    }

    #[test]
    fn same_key_composes_once() {
        let mut composer = ShaderComposer::new().unwrap();
        let _ = composer.module(&light_key()).unwrap();
        let _ = composer.module(&light_key()).unwrap();
        assert_eq!(composer.cached_count(), 1);
    }

    #[test]
    fn missing_source_is_reported() {
        struct Empty;
        impl ShaderSource for Empty {
            fn source(&self, _: &str) -> Option<Cow<'static, str>> {
                None
            }
        }
        let err = ShaderComposer::with_source(Box::new(Empty)).err().unwrap();
        assert!(matches!(err, RenderError::Shader { .. }));
    }
}
