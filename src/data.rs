//! Reader for the raw histogram data file.
//!
//! The file is a flat array of little-endian `u16` values forming a
//! `2^15 × 2^15` row-major square.  [`DataMode`] selects how large a
//! top-left square of it is returned.  Only the rows that the prefix
//! needs are read from disk.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;

use crate::error::{KernelError, Result};
use crate::histogram::HistogramImage;

/// Side of the full square stored in the data file.
pub const FULL_SIDE: usize = 1 << 15;

/// Size of the square extracted from the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// 2^10 × 2^10.
    Small,
    /// 2^13 × 2^13.
    Medium,
    /// The full 2^15 × 2^15 square.
    Full,
}

impl DataMode {
    pub const ALL: [DataMode; 3] = [DataMode::Small, DataMode::Medium, DataMode::Full];

    /// Side of the extracted square.
    pub fn side(self) -> usize {
        match self {
            Self::Small => 1 << 10,
            Self::Medium => 1 << 13,
            Self::Full => FULL_SIDE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "small_image",
            Self::Medium => "medium_image",
            Self::Full => "large_image",
        }
    }
}

impl TryFrom<u8> for DataMode {
    type Error = KernelError;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(Self::Small),
            1 => Ok(Self::Medium),
            2 => Ok(Self::Full),
            other => Err(KernelError::invalid(format!(
                "mode must be one of 0, 1, 2, got {other}"
            ))),
        }
    }
}

/// Load the `mode` prefix of the histogram data file at `path`.
pub fn load_hist_data(path: impl AsRef<Path>, mode: DataMode) -> Result<HistogramImage> {
    load_square_prefix(path, FULL_SIDE, mode.side())
}

/// Read the top-left `prefix_side × prefix_side` square of a file
/// holding a `full_side × full_side` row-major `u16` array.
pub fn load_square_prefix(
    path: impl AsRef<Path>,
    full_side: usize,
    prefix_side: usize,
) -> Result<HistogramImage> {
    if prefix_side > full_side {
        return Err(KernelError::invalid(format!(
            "prefix side {prefix_side} exceeds the stored side {full_side}"
        )));
    }
    let path = path.as_ref();
    debug!(
        "reading {prefix_side}x{prefix_side} prefix of {full_side}x{full_side} data in {}",
        path.display()
    );
    let mut reader = BufReader::new(File::open(path)?);
    let mut row = vec![0u8; full_side * 2];
    let mut data = Vec::with_capacity(prefix_side * prefix_side);
    for _ in 0..prefix_side {
        reader.read_exact(&mut row)?;
        data.extend(
            row[..prefix_side * 2]
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]])),
        );
    }
    HistogramImage::new(prefix_side, data)
}
