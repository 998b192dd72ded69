//! Tile histograms as WGSL compute kernels.
//!
//! WGSL has no 16-bit storage type, so each tile is uploaded as `u32`
//! words holding two elements (low half first).  Tiles are launched one
//! at a time: upload, dispatch, read back the tile's bins.

use log::{debug, trace};

use super::{BinPolicy, HistogramImage, HistogramVariant, TileHistograms, BIN_COUNT, BIN_WIDTH};
use crate::buffer::GpuBuffer;
use crate::compute::{groups_for, run_kernel, split_workgroups};
use crate::error::Result;
use crate::pipeline::{KernelKey, KernelPipeline};
use crate::GpuContext;

fn common_wgsl(block: u32) -> String {
    format!(
        r#"
const BINS: u32 = {BIN_COUNT}u;
const WIDTH: u32 = {BIN_WIDTH}u;
const BLOCK: u32 = {block}u;

@group(0) @binding(0) var<storage, read>       packed: array<u32>;
@group(0) @binding(1) var<storage, read_write> bins: array<atomic<u32>>;

fn element(i: u32) -> u32 {{
    let word = packed[i >> 1u];
    return (word >> ((i & 1u) * 16u)) & 0xffffu;
}}

// Out-of-range values are rejected on the host unless clamping is
// requested, so clamping here never changes an accepted value.
fn bin_of(v: u32) -> u32 {{
    return min(v / WIDTH, BINS - 1u);
}}

fn element_index(wid: vec3<u32>, nwg: vec3<u32>, lid: u32) -> u32 {{
    return (wid.x + wid.y * nwg.x) * BLOCK + lid;
}}
"#
    )
}

fn naive_shader() -> String {
    let mut src = common_wgsl(HistogramVariant::Naive.block_size());
    src.push_str(
        r#"
@compute @workgroup_size(BLOCK)
fn hist_naive(@builtin(workgroup_id)           wid: vec3<u32>,
              @builtin(num_workgroups)         nwg: vec3<u32>,
              @builtin(local_invocation_index) lid: u32) {
    let i = element_index(wid, nwg, lid);
    if (i >= arrayLength(&packed) * 2u) { return; }
    atomicAdd(&bins[bin_of(element(i))], 1u);
}
"#,
    );
    src
}

fn optimized_shader() -> String {
    let mut src = common_wgsl(HistogramVariant::Optimized.block_size());
    src.push_str(
        r#"
var<workgroup> local_bins: array<atomic<u32>, BINS>;

@compute @workgroup_size(BLOCK)
fn hist_opt(@builtin(workgroup_id)           wid: vec3<u32>,
            @builtin(num_workgroups)         nwg: vec3<u32>,
            @builtin(local_invocation_index) lid: u32) {
    if (lid < BINS) {
        atomicStore(&local_bins[lid], 0u);
    }
    workgroupBarrier();

    let i = element_index(wid, nwg, lid);
    if (i < arrayLength(&packed) * 2u) {
        atomicAdd(&local_bins[bin_of(element(i))], 1u);
    }
    workgroupBarrier();

    if (lid < BINS) {
        let count = atomicLoad(&local_bins[lid]);
        if (count > 0u) {
            atomicAdd(&bins[lid], count);
        }
    }
}
"#,
    );
    src
}

/// Pack `u16` elements two per `u32`, low half first.  An odd trailing
/// element is paired with zero.
pub(crate) fn pack_pairs(values: &[u16]) -> Vec<u32> {
    values
        .chunks(2)
        .map(|pair| {
            let lo = u32::from(pair[0]);
            let hi = pair.get(1).map_or(0, |&v| u32::from(v));
            lo | (hi << 16)
        })
        .collect()
}

/// Histograms of every tile computed on the GPU.
///
/// Values the `policy` rejects fail the call before anything is
/// dispatched.  The compiled kernel is shared by all tiles and later
/// calls on the same context.
pub fn histogram_gpu(
    context: &GpuContext,
    image: &HistogramImage,
    variant: HistogramVariant,
    policy: BinPolicy,
) -> Result<TileHistograms> {
    image.check_range(policy)?;

    let kernel = context
        .pipelines
        .get_or_compile(KernelKey::Histogram { variant }, || {
            let (source, entry) = match variant {
                HistogramVariant::Naive => (naive_shader(), "hist_naive"),
                HistogramVariant::Optimized => (optimized_shader(), "hist_opt"),
            };
            KernelPipeline::new(context, &format!("hist-{}", variant.name()), &source, entry, 1)
        })?;

    let limit = context.device.limits().max_compute_workgroups_per_dimension;
    let mut result = TileHistograms::with_tiles(image.tile_count());
    for (index, tile) in image.tiles().enumerate() {
        let total_groups = groups_for(tile.len() as u32, variant.block_size());
        let (groups_x, groups_y) = split_workgroups(total_groups, limit);
        if index == 0 {
            debug!(
                "histogram ({}) over {} tiles, {groups_x}x{groups_y} workgroups of {} per tile",
                variant.name(),
                image.tile_count(),
                variant.block_size()
            );
        }

        let input = GpuBuffer::from_slice(context, &pack_pairs(&tile), "hist-input")?;
        let output = GpuBuffer::<u32>::new_output(context, BIN_COUNT, "hist-bins")?;
        let bins = run_kernel(context, &kernel, &[&input.buffer], &output, [groups_x, groups_y, 1])?;
        trace!("tile {index}: {bins:?}");
        result.push_tile(&bins);
    }
    Ok(result)
}
