//! Tiled 18-bin histograms of `u16` images.
//!
//! A square image whose side is a power of two (at least [`TILE_SIDE`])
//! is cut into `TILE_SIDE × TILE_SIDE` tiles.  Each tile gets its own
//! histogram of [`BIN_COUNT`] bins of width [`BIN_WIDTH`] covering
//! `[0, 180)`, and the per-tile histograms are laid out one after the
//! other in row-major tile order.
//!
//! [`histogram_reference`] computes the result on the CPU and
//! [`histogram_gpu`] on the GPU with either [`HistogramVariant`].

mod gpu;

pub use gpu::histogram_gpu;

use crate::error::{KernelError, Result};

/// Side of one square tile.
pub const TILE_SIDE: usize = 1024;
/// Bins per tile histogram.
pub const BIN_COUNT: usize = 18;
/// Width of every bin.
pub const BIN_WIDTH: u16 = 10;
/// First value without a bin: `BIN_COUNT * BIN_WIDTH`.
pub const BIN_LIMIT: u16 = BIN_COUNT as u16 * BIN_WIDTH;

/// What to do with values at or above [`BIN_LIMIT`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BinPolicy {
    /// Fail the call with [`KernelError::ValueOutOfRange`].
    #[default]
    Reject,
    /// Count the value in the last bin.
    ClampToLast,
}

/// GPU strategy for accumulating a tile histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistogramVariant {
    /// Every invocation increments the global bin of its element.
    Naive,
    /// Invocations count into workgroup-local bins which are merged into
    /// the global bins once per workgroup.
    Optimized,
}

impl HistogramVariant {
    /// Invocations per workgroup.
    pub fn block_size(self) -> u32 {
        match self {
            Self::Naive => 2,
            Self::Optimized => 128,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Optimized => "optimized",
        }
    }
}

/// Bin of `value` under `policy`, or `None` if the value is rejected.
pub fn bin_index(value: u16, policy: BinPolicy) -> Option<usize> {
    let bin = usize::from(value / BIN_WIDTH);
    match policy {
        BinPolicy::Reject => (bin < BIN_COUNT).then_some(bin),
        BinPolicy::ClampToLast => Some(bin.min(BIN_COUNT - 1)),
    }
}

/// Square `u16` image stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramImage {
    side: usize,
    data: Vec<u16>,
}

impl HistogramImage {
    /// Wrap `data` as a `side × side` image.  `side` must be a power of
    /// two no smaller than [`TILE_SIDE`].
    pub fn new(side: usize, data: Vec<u16>) -> Result<Self> {
        let expected = check_side(side)?;
        if data.len() != expected {
            return Err(KernelError::invalid(format!(
                "{side}x{side} image needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { side, data })
    }

    /// An image with every element set to `value`.
    pub fn filled(side: usize, value: u16) -> Result<Self> {
        let len = check_side(side)?;
        Self::new(side, vec![value; len])
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.data
    }

    /// Tiles along one side of the image.
    pub fn tiles_per_side(&self) -> usize {
        self.side / TILE_SIDE
    }

    /// Number of tiles, and of histograms in the result.
    pub fn tile_count(&self) -> usize {
        self.tiles_per_side() * self.tiles_per_side()
    }

    /// Copy of tile (`ti`, `tj`), row-major.
    pub fn tile(&self, ti: usize, tj: usize) -> Vec<u16> {
        let mut tile = Vec::with_capacity(TILE_SIDE * TILE_SIDE);
        for row in ti * TILE_SIDE..(ti + 1) * TILE_SIDE {
            let start = row * self.side + tj * TILE_SIDE;
            tile.extend_from_slice(&self.data[start..start + TILE_SIDE]);
        }
        tile
    }

    /// Iterate over tiles in row-major tile order.
    pub fn tiles(&self) -> impl Iterator<Item = Vec<u16>> + '_ {
        let n = self.tiles_per_side();
        (0..n).flat_map(move |ti| (0..n).map(move |tj| self.tile(ti, tj)))
    }

    /// Fail on the first element (row-major) that `policy` rejects.
    pub fn check_range(&self, policy: BinPolicy) -> Result<()> {
        if policy == BinPolicy::ClampToLast {
            return Ok(());
        }
        match self.data.iter().position(|&v| v >= BIN_LIMIT) {
            Some(index) => Err(KernelError::ValueOutOfRange {
                index,
                value: self.data[index],
            }),
            None => Ok(()),
        }
    }
}

/// Validate `side` and return the element count of the image.
fn check_side(side: usize) -> Result<usize> {
    if !side.is_power_of_two() || side < TILE_SIDE {
        return Err(KernelError::invalid(format!(
            "image side must be a power of two >= {TILE_SIDE}, got {side}"
        )));
    }
    side.checked_mul(side)
        .ok_or_else(|| KernelError::invalid(format!("{side}x{side} image size overflows")))
}

/// Per-tile histograms in row-major tile order, flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileHistograms {
    counts: Vec<u32>,
}

impl TileHistograms {
    pub(crate) fn with_tiles(tiles: usize) -> Self {
        Self {
            counts: Vec::with_capacity(tiles * BIN_COUNT),
        }
    }

    pub(crate) fn push_tile(&mut self, bins: &[u32]) {
        debug_assert_eq!(bins.len(), BIN_COUNT);
        self.counts.extend_from_slice(bins);
    }

    pub fn tile_count(&self) -> usize {
        self.counts.len() / BIN_COUNT
    }

    /// Bins of tile `index`.
    pub fn tile(&self, index: usize) -> &[u32] {
        &self.counts[index * BIN_COUNT..(index + 1) * BIN_COUNT]
    }

    /// The flat `tile_count * BIN_COUNT` buffer.
    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

}

/// Histograms of every tile computed on the CPU.
pub fn histogram_reference(image: &HistogramImage, policy: BinPolicy) -> Result<TileHistograms> {
    image.check_range(policy)?;
    let mut result = TileHistograms::with_tiles(image.tile_count());
    for tile in image.tiles() {
        let mut bins = [0u32; BIN_COUNT];
        for value in tile {
            // check_range has already rejected what the policy does not bin.
            if let Some(bin) = bin_index(value, policy) {
                bins[bin] += 1;
            }
        }
        result.push_tile(&bins);
    }
    Ok(result)
}
