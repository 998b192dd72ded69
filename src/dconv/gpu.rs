//! Dilated convolution as a WGSL compute kernel.
//!
//! One invocation computes one output cell.  Matrix shape, filter side,
//! dilation and offset are baked into the shader as constants, so each
//! distinct configuration compiles once and is then served from the
//! context's pipeline cache.

use log::debug;

use super::{validate, DilatedGeometry, Filter, Matrix};
use crate::buffer::GpuBuffer;
use crate::compute::{groups_for, run_kernel};
use crate::error::{KernelError, Result};
use crate::pipeline::{KernelKey, KernelPipeline};
use crate::GpuContext;

/// Preferred workgroup side (32×32 invocations).
pub const CONV_BLOCK_SIDE: u32 = 32;
/// Workgroup side used when the device cannot run 1024 invocations per
/// workgroup.
pub const CONV_FALLBACK_BLOCK_SIDE: u32 = 16;

/// Largest square workgroup side the device supports, out of
/// [`CONV_BLOCK_SIDE`] and [`CONV_FALLBACK_BLOCK_SIDE`].
pub fn conv_block_side(limits: &wgpu::Limits) -> u32 {
    let side = CONV_BLOCK_SIDE;
    if limits.max_compute_invocations_per_workgroup >= side * side
        && limits.max_compute_workgroup_size_x >= side
        && limits.max_compute_workgroup_size_y >= side
    {
        side
    } else {
        CONV_FALLBACK_BLOCK_SIDE
    }
}

fn conv_shader(rows: u32, cols: u32, geometry: &DilatedGeometry, block: u32) -> String {
    let side = geometry.side;
    let taps = side * side;
    let dilation = geometry.dilation;
    let offset = geometry.offset;
    format!(
        r#"
const ROWS: i32 = {rows};
const COLS: i32 = {cols};
const SIDE: u32 = {side}u;
const TAPS: u32 = {taps}u;
const DILATION: i32 = {dilation};
const OFFSET: i32 = {offset};

@group(0) @binding(0) var<storage, read>       input: array<i32>;
@group(0) @binding(1) var<storage, read>       filter_taps: array<i32>;
@group(0) @binding(2) var<storage, read_write> output: array<i32>;

fn inside(r: i32, c: i32) -> bool {{
    return r >= 0 && r < ROWS && c >= 0 && c < COLS;
}}

@compute @workgroup_size({block}, {block})
fn dconv(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let row = i32(gid.y);
    let col = i32(gid.x);
    if (row >= ROWS || col >= COLS) {{ return; }}

    var acc: i32 = 0;
    for (var t: u32 = 0u; t < TAPS; t = t + 1u) {{
        let r = row - OFFSET + i32(t / SIDE) * DILATION;
        let c = col - OFFSET + i32(t % SIDE) * DILATION;
        if (inside(r, c)) {{
            acc = acc + filter_taps[t] * input[u32(r * COLS + c)];
        }}
    }}
    output[u32(row * COLS + col)] = acc;
}}
"#
    )
}

/// Dilated convolution on the GPU.
///
/// Uploads the matrix and filter as `i32`, launches one invocation per
/// output cell over a grid of square workgroups rounded up to cover the
/// matrix, and reads the result back.
pub fn convolve_gpu(
    context: &GpuContext,
    matrix: &Matrix,
    filter: &Filter,
    dilation: u32,
) -> Result<Matrix> {
    let geometry = validate(filter, dilation)?;
    let rows = shader_extent("matrix rows", matrix.rows())?;
    let cols = shader_extent("matrix columns", matrix.cols())?;
    shader_extent("matrix size", matrix.rows() * matrix.cols())?;
    // Displacements are evaluated in i32 inside the shader.
    shader_extent("receptive field", geometry.effective_dim)?;

    let block = conv_block_side(&context.device.limits());
    let key = KernelKey::DilatedConv {
        rows,
        cols,
        side: geometry.side as u32,
        dilation,
        block,
    };
    let kernel = context.pipelines.get_or_compile(key, || {
        let source = conv_shader(rows, cols, &geometry, block);
        KernelPipeline::new(context, "dconv", &source, "dconv", 2)
    })?;

    let input = GpuBuffer::from_slice(context, matrix.as_slice(), "dconv-input")?;
    let taps = GpuBuffer::from_slice(context, filter.taps(), "dconv-filter")?;
    let output = GpuBuffer::<i32>::new_output(context, matrix.as_slice().len(), "dconv-output")?;

    let groups = [groups_for(cols, block), groups_for(rows, block), 1];
    debug!(
        "dconv {rows}x{cols}, side {}, dilation {dilation}, K_eff {}, block {block}",
        geometry.side, geometry.effective_dim
    );
    let values = run_kernel(context, &kernel, &[&input.buffer, &taps.buffer], &output, groups)?;
    Matrix::new(matrix.rows(), matrix.cols(), values)
}

fn shader_extent(what: &'static str, value: usize) -> Result<u32> {
    if value > i32::MAX as usize {
        return Err(KernelError::invalid(format!(
            "{what} of {value} does not fit the kernel's 32-bit indexing"
        )));
    }
    Ok(value as u32)
}
