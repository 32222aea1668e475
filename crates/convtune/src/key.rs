use crate::{ConvolutionParams, Direction, TensorDescriptor};
use convtune_runtime::tune::AutotuneKey;
use core::fmt::Display;

/// Canonical fingerprint of a convolution problem.
///
/// Covers the direction, the element type, every dim and stride of the three tensors and the
/// convolution parameters, so two problems share a fingerprint only when the same kernels can
/// run both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkConfig(String);

impl NetworkConfig {
    /// Fingerprint of a convolution problem.
    ///
    /// `input` is `x` (or `dx` for backward data) and `output` is `y` (or `dy`).
    pub fn build(
        direction: Direction,
        input: &TensorDescriptor,
        weights: &TensorDescriptor,
        output: &TensorDescriptor,
        params: &ConvolutionParams,
    ) -> Self {
        Self(format!(
            "{direction}-{}-in{input}-wei{weights}-out{output}-pad{}x{}-str{}x{}-dil{}x{}",
            input.dtype(),
            params.padding.0,
            params.padding.1,
            params.stride.0,
            params.stride.1,
            params.dilation.0,
            params.dilation.1,
        ))
    }

    /// Fingerprint of a backward bias reduction.
    pub fn bias(dy: &TensorDescriptor, db: &TensorDescriptor) -> Self {
        Self(format!("bias-{}-out{dy}-db{db}", dy.dtype()))
    }

    /// Fingerprint of the second stage of a two stage strategy.
    pub fn second_pass(&self) -> Self {
        Self(format!("{}x1", self.0))
    }

    /// The fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NetworkConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AutotuneKey for NetworkConfig {}
