//! GPU context initialization.
//!
//! This module provides a thin wrapper around wgpu's instance, adapter,
//! device and queue objects, together with the cache of compiled kernel
//! pipelines.  The adapter is chosen from a caller supplied
//! [`DeviceConfig`].  The `new_blocking` constructor hides the
//! asynchronous adapter and device requests by using the [`pollster`]
//! crate.

use std::sync::{Mutex, MutexGuard};

use log::info;
use wgpu::{Adapter, Device, Instance, Queue};

use crate::config::DeviceConfig;
use crate::error::{KernelError, Result};
use crate::pipeline::PipelineCache;

/// A GPU context encapsulates all state needed to submit compute work.
///
/// `Instance`, `Adapter`, `Device` and `Queue` are internally reference
/// counted.  The pipeline cache lives as long as the context so kernels
/// compiled for one call are reused by later calls with the same
/// configuration.
///
/// The context can be shared between threads.  wgpu error scopes are a
/// single stack per device, so kernel launches and compilations take the
/// context's launch lock for as long as their scopes are pushed.
pub struct GpuContext {
    pub instance: Instance,
    /// The physical device selected for computation.
    pub adapter: Adapter,
    /// Logical device used to create resources and command encoders.
    pub device: Device,
    /// Command submission queue.
    pub queue: Queue,
    pub(crate) pipelines: PipelineCache,
    launch: Mutex<()>,
}

impl GpuContext {
    /// Create a new GPU context synchronously.
    ///
    /// Blocks the current thread while the adapter and device requests
    /// complete.  See [`Self::new_async`] for the asynchronous version.
    pub fn new_blocking(config: &DeviceConfig) -> Result<Self> {
        pollster::block_on(Self::new_async(config))
    }

    /// Create a new GPU context asynchronously.
    pub async fn new_async(config: &DeviceConfig) -> Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });
        let adapter = select_adapter(&instance, config).await?;

        // Downlevel devices may not support compute on all backends.
        let capabilities = adapter.get_downlevel_capabilities();
        if !capabilities.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(KernelError::Unsupported("compute shaders".into()));
        }

        let adapter_info = adapter.get_info();
        info!(
            "selected adapter `{}` ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        // Ask for the adapter's own limits: the convolution kernel prefers
        // 32x32 workgroups, which the downlevel defaults do not allow.
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("wgpu_dconv_hist_device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            pipelines: PipelineCache::new(),
            launch: Mutex::new(()),
        })
    }

    /// Name reported by the selected adapter.
    pub fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }

    /// Limits of the logical device.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Number of distinct kernels compiled on this context so far.
    pub fn compiled_kernels(&self) -> usize {
        self.pipelines.len()
    }

    /// Pipeline cache hits and misses on this context.
    pub fn cache_stats(&self) -> crate::pipeline::CacheStats {
        self.pipelines.stats()
    }

    /// Serialize work that pushes and pops device error scopes.
    pub(crate) fn lock_launches(&self) -> MutexGuard<'_, ()> {
        self.launch.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn select_adapter(instance: &Instance, config: &DeviceConfig) -> Result<Adapter> {
    if config.adapter_name.is_none() {
        return instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                force_fallback_adapter: config.force_fallback,
                compatible_surface: None,
            })
            .await
            .map_err(|e| KernelError::NoAdapter(e.to_string()));
    }

    let adapters = instance.enumerate_adapters(config.backends);
    let names: Vec<String> = adapters.iter().map(|a| a.get_info().name).collect();
    adapters
        .into_iter()
        .find(|a| config.matches_adapter(&a.get_info().name))
        .ok_or_else(|| {
            KernelError::NoAdapter(format!(
                "no adapter name contains `{}` (available: {})",
                config.adapter_name.as_deref().unwrap_or_default(),
                if names.is_empty() { "none".to_string() } else { names.join(", ") }
            ))
        })
}
