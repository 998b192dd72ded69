//! Compiled kernels and the per-context pipeline cache.
//!
//! Kernel sources are generated from their configuration (matrix shape,
//! filter side, dilation, histogram variant) and compiled once per distinct
//! configuration.  [`PipelineCache`] keeps the compiled pipelines keyed by
//! [`KernelKey`] for the lifetime of a [`crate::GpuContext`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

use crate::error::{KernelError, Result};
use crate::histogram::HistogramVariant;
use crate::GpuContext;

/// Identifies one compiled kernel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKey {
    DilatedConv {
        rows: u32,
        cols: u32,
        side: u32,
        dilation: u32,
        block: u32,
    },
    Histogram { variant: HistogramVariant },
}

/// A compute pipeline whose bind group layout holds `inputs` read-only
/// storage buffers at bindings `0..inputs`, followed by one read/write
/// storage buffer for the output at binding `inputs`.
pub struct KernelPipeline {
    pub label: String,
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub inputs: u32,
}

impl KernelPipeline {
    /// Compile `source` and build the pipeline for `entry_point`.
    ///
    /// Shader compilation and pipeline validation errors are returned as
    /// [`KernelError::Device`].
    pub fn new(
        context: &GpuContext,
        label: &str,
        source: &str,
        entry_point: &str,
        inputs: u32,
    ) -> Result<Self> {
        let device = &context.device;
        let _launch = context.lock_launches();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(label),
            source: ShaderSource::Wgsl(source.into()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..=inputs)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: binding < inputs,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label}-bgl")),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label}-layout")),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(KernelError::Device(format!("kernel `{label}`: {err}")));
        }

        debug!("compiled kernel `{label}` (entry point `{entry_point}`, {inputs} inputs)");

        Ok(Self {
            label: label.to_string(),
            pipeline,
            bind_group_layout,
            inputs,
        })
    }
}

/// Hit and miss counters of a [`PipelineCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Compiled pipelines keyed by configuration.
#[derive(Default)]
pub struct PipelineCache {
    inner: Mutex<HashMap<KernelKey, Arc<KernelPipeline>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pipeline for `key`, compiling it with `build` on first use.
    ///
    /// The lock is held while compiling so two threads asking for the same
    /// configuration compile it once.
    pub fn get_or_compile<F>(&self, key: KernelKey, build: F) -> Result<Arc<KernelPipeline>>
    where
        F: FnOnce() -> Result<KernelPipeline>,
    {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pipeline) = map.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("kernel cache hit for {key:?}");
            return Ok(Arc::clone(pipeline));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let pipeline = Arc::new(build()?);
        map.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
