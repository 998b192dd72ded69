//! Error types shared by the kernels and the GPU runtime layer.

use thiserror::Error;

/// Errors produced while validating arguments or running a kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A histogram element has no bin under [`crate::BinPolicy::Reject`].
    #[error("value {value} at element {index} is outside the binnable range [0, 180)")]
    ValueOutOfRange { index: usize, value: u16 },

    #[error("no suitable GPU adapter found: {0}")]
    NoAdapter(String),

    #[error("adapter does not support {0}")]
    Unsupported(String),

    #[error("failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("{what} of {requested} exceeds the device limit of {limit}")]
    ExceedsDeviceLimit {
        what: &'static str,
        requested: u64,
        limit: u64,
    },

    /// Validation or out-of-memory error captured while launching a kernel.
    #[error("device error: {0}")]
    Device(String),

    #[error("buffer mapping failed: {0}")]
    BufferMap(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, KernelError>;

impl KernelError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
