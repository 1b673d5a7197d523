//! wgpu Context
//!
//! The [`GpuContext`] holds the core GPU handles for offscreen work: the
//! adapter description, the device and its queue. There is no window or
//! presentation surface; every render target is a texture owned by the
//! [`GpuDevice`](super::GpuDevice).

use crate::errors::{PrefilterError, Result};

/// Adapter and device selection.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub power_preference: wgpu::PowerPreference,
    pub backends: wgpu::Backends,
    /// Accept a software adapter (e.g. llvmpipe, WARP) if that is all there is.
    pub force_fallback_adapter: bool,
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends: wgpu::Backends::all(),
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

/// Core wgpu handles.
pub struct GpuContext {
    pub adapter_info: wgpu::AdapterInfo,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn new(settings: &DeviceSettings) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: settings.backends,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: settings.force_fallback_adapter,
            })
            .await
            .map_err(|e| PrefilterError::AdapterRequestFailed(e.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using adapter {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Prefilter Device"),
                required_features: settings.required_features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Ok(Self {
            adapter_info,
            device,
            queue,
        })
    }

    /// Blocks on [`GpuContext::new`].
    pub fn new_blocking(settings: &DeviceSettings) -> Result<Self> {
        pollster::block_on(Self::new(settings))
    }

    /// Blocks until all submitted work has completed.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| PrefilterError::SubresourceCopy(format!("device poll failed: {e}")))
    }
}
