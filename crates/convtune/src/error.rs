use convtune_runtime::server::{CompilationError, LaunchError};
use thiserror::Error;

/// Errors returned by the convolution engine.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum ConvolutionError {
    /// The caller broke an input contract: undersized buffer, mismatched shapes or types,
    /// invalid parameters, or a missing workspace.
    #[error("Bad parameter\nCaused by:\n  {reason}")]
    BadParameter {
        /// What is wrong with the parameters.
        reason: String,
    },

    /// No strategy can handle the problem.
    #[error("Unsupported convolution\nCaused by:\n  {reason}")]
    Unsupported {
        /// Why the problem is not supported.
        reason: String,
    },

    /// The GEMM algorithm was requested but the device has no GEMM primitive.
    #[error("The GEMM primitive is not available on this device")]
    GemmUnavailable,

    /// The device failed to launch a kernel.
    #[error("A launch error happened\nCaused by:\n  {0}")]
    Launch(#[from] LaunchError),

    /// The device failed to compile a kernel.
    #[error("A compilation error happened\nCaused by:\n  {0}")]
    Compilation(#[from] CompilationError),
}

impl ConvolutionError {
    pub(crate) fn bad_parameter(reason: impl Into<String>) -> Self {
        Self::BadParameter {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}

impl core::fmt::Debug for ConvolutionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}
