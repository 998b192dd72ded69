//! Helpers for launching compiled kernels.
//!
//! [`run_kernel`] encapsulates the wgpu boilerplate of binding buffers,
//! recording a compute pass, copying the output to a host-mappable
//! buffer and reading it back.  It blocks the current thread until the
//! GPU has completed the work.

use bytemuck::Pod;
use log::debug;

use crate::buffer::GpuBuffer;
use crate::context::GpuContext;
use crate::error::{KernelError, Result};
use crate::pipeline::KernelPipeline;

/// Calculate an (x, y) workgroup grid that covers `total_groups`
/// workgroups without exceeding the per-dimension limit.
pub fn split_workgroups(total_groups: u32, limit: u32) -> (u32, u32) {
    if total_groups <= limit {
        (total_groups, 1)
    } else {
        (limit, total_groups.div_ceil(limit))
    }
}

/// Number of workgroups of `block` invocations needed to cover `extent`
/// invocations, rounding up at the edge.
pub fn groups_for(extent: u32, block: u32) -> u32 {
    assert!(block > 0, "block must be > 0");
    extent.div_ceil(block)
}

/// Reject a dispatch grid the device cannot launch.
pub fn check_grid(context: &GpuContext, groups: [u32; 3]) -> Result<()> {
    let limit = context.device.limits().max_compute_workgroups_per_dimension;
    if let Some(&over) = groups.iter().find(|&&g| g > limit) {
        return Err(KernelError::ExceedsDeviceLimit {
            what: "workgroups per dimension",
            requested: u64::from(over),
            limit: u64::from(limit),
        });
    }
    Ok(())
}

/// Dispatch `kernel` over a `groups` workgroup grid and return the
/// contents of `output` afterwards.
///
/// `inputs` are bound in order to the kernel's read-only bindings and
/// `output` to the binding after them.  Validation and out-of-memory
/// errors raised by wgpu during the launch are returned as
/// [`KernelError::Device`] instead of reaching the uncaptured error
/// handler.  Concurrent launches on one context are serialized up to the
/// point where the scopes are popped.
pub fn run_kernel<O: Pod>(
    context: &GpuContext,
    kernel: &KernelPipeline,
    inputs: &[&wgpu::Buffer],
    output: &GpuBuffer<O>,
    groups: [u32; 3],
) -> Result<Vec<O>> {
    if inputs.len() != kernel.inputs as usize {
        return Err(KernelError::invalid(format!(
            "kernel `{}` takes {} inputs, got {}",
            kernel.label,
            kernel.inputs,
            inputs.len()
        )));
    }
    check_grid(context, groups)?;

    let device = &context.device;
    let launch = context.lock_launches();
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let download = GpuBuffer::<O>::new_download(context, output.len);
    let mut entries: Vec<wgpu::BindGroupEntry> = inputs
        .iter()
        .enumerate()
        .map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    entries.push(wgpu::BindGroupEntry {
        binding: kernel.inputs,
        resource: output.buffer.as_entire_binding(),
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{}-bind-group", kernel.label)),
        layout: &kernel.bind_group_layout,
        entries: &entries,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(&format!("{}-encoder", kernel.label)),
    });
    {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label.as_str()),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&kernel.pipeline);
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.dispatch_workgroups(groups[0], groups[1], groups[2]);
    }
    encoder.copy_buffer_to_buffer(&output.buffer, 0, &download.buffer, 0, output.byte_len());
    context.queue.submit([encoder.finish()]);

    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    drop(launch);
    if let Some(err) = validation.or(out_of_memory) {
        return Err(KernelError::Device(err.to_string()));
    }

    debug!(
        "launched `{}` over {}x{}x{} workgroups",
        kernel.label, groups[0], groups[1], groups[2]
    );
    download.read_to_vec(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fits_in_one_dimension() {
        assert_eq!(split_workgroups(10, 65_535), (10, 1));
        assert_eq!(split_workgroups(65_535, 65_535), (65_535, 1));
    }

    #[test]
    fn split_spills_into_second_dimension() {
        // 1024 * 1024 elements in workgroups of 2.
        let (x, y) = split_workgroups(524_288, 65_535);
        assert_eq!(x, 65_535);
        assert_eq!(y, 9);
        assert!(u64::from(x) * u64::from(y) >= 524_288);
    }

    #[test]
    fn groups_round_up() {
        assert_eq!(groups_for(200, 32), 7);
        assert_eq!(groups_for(192, 32), 6);
        assert_eq!(groups_for(1, 32), 1);
    }

    #[test]
    #[should_panic(expected = "block must be > 0")]
    fn zero_block_panics() {
        groups_for(10, 0);
    }
}
