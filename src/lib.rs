//! Dilated 2-D convolution and tiled histogram kernels running on the GPU
//! through [wgpu](https://github.com/gfx-rs/wgpu), each paired with CPU
//! reference implementations that the GPU results are checked against.
//!
//! The API is synchronous and blocking: every GPU call uploads its
//! inputs, launches one kernel, and waits for the result to be copied
//! back before returning.  Wrap a call in [`timed`] to get the
//! `(result, elapsed)` pair the benchmarks report.
//!
//! ```no_run
//! use wgpu_dconv_hist::{convolve_gpu, DeviceConfig, Filter, GpuContext, Matrix};
//!
//! let ctx = GpuContext::new_blocking(&DeviceConfig::from_env()?)?;
//! let m = Matrix::from_rows(&[[1, 2, 3], [4, 5, 6], [7, 8, 9]])?;
//! let f = Filter::centered_identity(3)?;
//! assert_eq!(convolve_gpu(&ctx, &m, &f, 2)?, m);
//! # Ok::<(), wgpu_dconv_hist::KernelError>(())
//! ```

pub mod buffer;
pub mod compute;
pub mod config;
pub mod context;
pub mod data;
pub mod dconv;
pub mod error;
pub mod histogram;
pub mod pipeline;
pub mod report;
pub mod timing;

// Re-export the most common types at the crate root.
pub use buffer::GpuBuffer;
pub use config::DeviceConfig;
pub use context::GpuContext;
pub use data::{load_hist_data, load_square_prefix, DataMode};
pub use dconv::{
    convolve_gpu, convolve_reference, convolve_strided, DilatedGeometry, Filter, Matrix,
};
pub use error::{KernelError, Result};
pub use histogram::{
    histogram_gpu, histogram_reference, BinPolicy, HistogramImage, HistogramVariant,
    TileHistograms, BIN_COUNT, BIN_WIDTH, TILE_SIDE,
};
pub use timing::{timed, Timed};
