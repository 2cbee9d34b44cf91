use thiserror::Error;

/// Errors that can occur during GPU context initialization.
#[derive(Debug, Error)]
pub enum RenderContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found: {0}")]
    AdapterRequest(#[from] wgpu::RequestAdapterError),
    /// GPU device request failed (limits or features not met).
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    /// The adapter cannot do something the renderer requires.
    #[error("adapter is missing {0}")]
    MissingCapability(String),
}

/// Owns the core wgpu resources: device and queue, plus what was learned
/// about the adapter while requesting them.
#[derive(Debug)]
pub struct RenderContext {
    /// The wgpu logical device.
    pub device: wgpu::Device,
    /// The wgpu command queue.
    pub queue: wgpu::Queue,
    /// Adapter name, backend and driver.
    pub adapter_info: wgpu::AdapterInfo,
    /// `TIMESTAMP_QUERY` was granted.
    pub timestamps: bool,
}

impl RenderContext {
    /// Request an offscreen device on the best available adapter.
    ///
    /// Timestamp queries are enabled when the adapter offers them; the
    /// renderer falls back to CPU encode timing otherwise.
    ///
    /// # Errors
    ///
    /// Returns `RenderContextError` if no adapter is found, the device
    /// request fails, or the adapter cannot write `Rgba16Float` storage
    /// textures.
    pub async fn new_headless() -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let format_features =
            adapter.get_texture_format_features(wgpu::TextureFormat::Rgba16Float);
        if !format_features
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
        {
            return Err(RenderContextError::MissingCapability(
                "Rgba16Float storage textures".to_owned(),
            ));
        }

        let timestamps = adapter
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Primary Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        let adapter_info = adapter.get_info();
        log::info!(
            "GPU: {} ({:?}), timestamps {}",
            adapter_info.name,
            adapter_info.backend,
            if timestamps { "on" } else { "off" }
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            timestamps,
        })
    }

    /// Wrap an externally-owned device and queue (for embedding).
    #[must_use]
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: wgpu::AdapterInfo,
    ) -> Self {
        let timestamps = device.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        Self {
            device,
            queue,
            adapter_info,
            timestamps,
        }
    }
}
