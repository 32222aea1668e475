use crate::NetworkConfig;
use convtune_runtime::id::KernelId;
use core::{fmt::Display, time::Duration};

/// Which gradient (or the forward pass) a convolution computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// `y = conv(x, w)`.
    Forward,
    /// `dx` from `dy` and `w`.
    BackwardData,
    /// `dw` from `dy` and `x`.
    BackwardWeights,
}

impl Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Direction::Forward => f.write_str("fwd"),
            Direction::BackwardData => f.write_str("bwd"),
            Direction::BackwardWeights => f.write_str("wrw"),
        }
    }
}

/// Algorithms computing the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ForwardAlgorithm {
    /// Unfold the input and run a matrix multiplication per sample.
    Gemm,
    /// Sliding window kernel.
    Direct,
    /// Reserved. Running it does nothing.
    Fft,
    /// Transform domain kernel for 3x3 filters.
    Winograd,
}

/// Algorithms computing the data gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BackwardDataAlgorithm {
    /// Sliding window kernel.
    Direct,
}

/// Algorithms computing the weight gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BackwardWeightsAlgorithm {
    /// Unfold the input and accumulate a matrix multiplication per sample.
    Gemm,
    /// Batch grouped kernel, with a reduction stage for large batches.
    Direct,
}

/// Strategy families owning compiled kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    /// Sliding window, forward and backward data.
    Direct,
    /// Transform domain, forward.
    Winograd,
    /// Batch grouped weight gradient.
    BackwardWeightsDirect,
    /// Bias gradient reduction.
    BackwardBias,
}

/// Position of a kernel in a multi stage strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The only kernel, or the first one.
    Main,
    /// The second kernel, finishing the work of the main one.
    SecondPass,
}

/// Type marker of the kernels compiled by this crate.
pub struct ConvKernel;

/// Registry key of a compiled convolution kernel.
///
/// Second pass keys carry the [second pass](NetworkConfig::second_pass) fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    /// Strategy family.
    pub family: AlgorithmFamily,
    /// Stage inside the strategy.
    pub stage: Stage,
    /// Kernel variant, such as the tiling of a direct kernel.
    pub variant: usize,
    /// Problem fingerprint.
    pub config: NetworkConfig,
}

impl KernelKey {
    /// Key of a stage of a strategy.
    pub fn new(family: AlgorithmFamily, stage: Stage, variant: usize, config: &NetworkConfig) -> Self {
        let config = match stage {
            Stage::Main => config.clone(),
            Stage::SecondPass => config.second_pass(),
        };

        Self {
            family,
            stage,
            variant,
            config,
        }
    }

    /// The runtime kernel id.
    pub fn id(self) -> KernelId {
        KernelId::new::<ConvKernel>().info(self)
    }
}

/// One benchmarked algorithm.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmPerf<A> {
    /// The algorithm.
    pub algorithm: A,
    /// Measured (or, for GEMM, estimated) device time.
    pub time: Duration,
    /// Workspace needed to run it, in bytes.
    pub memory: usize,
}

/// Sort results by time, then memory, keeping insertion order for ties, and keep the first
/// `count`.
pub(crate) fn rank<A>(mut results: Vec<AlgorithmPerf<A>>, count: usize) -> Vec<AlgorithmPerf<A>> {
    results.sort_by(|a, b| a.time.cmp(&b.time).then(a.memory.cmp(&b.memory)));
    results.truncate(count);
    results
}
