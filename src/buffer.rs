//! Typed GPU buffers and host readback utilities.
//!
//! [`GpuBuffer`] wraps a [`wgpu::Buffer`] together with the number of
//! typed elements it holds.  Buffers are owned by the call that created
//! them and released when dropped, so every exit path of a kernel
//! launch, including error returns, frees its device memory.

use std::marker::PhantomData;

use bytemuck::{cast_slice, Pod};
use wgpu::{Buffer, BufferDescriptor, BufferUsages};

use crate::error::{KernelError, Result};
use crate::GpuContext;

/// A typed GPU buffer.
///
/// The underlying buffer size in bytes is `len * size_of::<T>()`.
pub struct GpuBuffer<T: Pod> {
    pub buffer: Buffer,
    pub len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Create a storage buffer holding a copy of `data`.
    ///
    /// The contents are written through the queue, so the buffer only
    /// needs `STORAGE | COPY_DST`.
    pub fn from_slice(context: &GpuContext, data: &[T], label: &str) -> Result<Self> {
        let bytes = cast_slice(data);
        check_binding_size(context, bytes.len() as u64)?;
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: bytes.len() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        context.queue.write_buffer(&buffer, 0, bytes);
        Ok(Self::wrap(buffer, data.len()))
    }

    /// Create a zero-filled output buffer of `len` elements that a shader
    /// can write (or atomically accumulate into) and that can be copied
    /// to a download buffer.
    pub fn new_output(context: &GpuContext, len: usize, label: &str) -> Result<Self> {
        let size = byte_len::<T>(len);
        check_binding_size(context, size)?;
        // wgpu zero-initializes buffer memory on creation.
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(Self::wrap(buffer, len))
    }

    /// Create a host-mappable buffer sized to hold `len` elements.  It
    /// cannot be bound to a shader.
    pub fn new_download(context: &GpuContext, len: usize) -> Self {
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("download"),
            size: byte_len::<T>(len),
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self::wrap(buffer, len)
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> u64 {
        byte_len::<T>(self.len)
    }

    /// Read a `MAP_READ` buffer back to the CPU.
    ///
    /// Blocks until the GPU has finished all submitted work, then copies
    /// the mapped range out and unmaps the buffer.
    pub fn read_to_vec(&self, context: &GpuContext) -> Result<Vec<T>> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| KernelError::Device(e.to_string()))?;
        rx.recv()
            .map_err(|e| KernelError::BufferMap(e.to_string()))?
            .map_err(|e| KernelError::BufferMap(e.to_string()))?;

        let data = slice.get_mapped_range();
        let result: Vec<T> = cast_slice(&data).to_vec();
        // The mapped view borrows the buffer and must go before unmap.
        drop(data);
        self.buffer.unmap();
        Ok(result)
    }

    fn wrap(buffer: Buffer, len: usize) -> Self {
        Self {
            buffer,
            len,
            _marker: PhantomData,
        }
    }
}

fn byte_len<T>(len: usize) -> u64 {
    (len * std::mem::size_of::<T>()) as u64
}

fn check_binding_size(context: &GpuContext, size: u64) -> Result<()> {
    let limit = u64::from(context.device.limits().max_storage_buffer_binding_size);
    if size > limit {
        return Err(KernelError::ExceedsDeviceLimit {
            what: "storage buffer size",
            requested: size,
            limit,
        });
    }
    Ok(())
}
