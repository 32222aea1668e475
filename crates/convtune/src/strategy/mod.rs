//! Every strategy takes a [problem](crate::ConvProblem) and either lowers it into one or more
//! [kernel plans](KernelPlan) or explains why it cannot run it.

pub mod backward_weights;
pub mod direct;
pub mod gemm;
pub mod winograd;

use crate::{ConvProblem, KernelKey, Stage};
use convtune_runtime::{
    client::ComputeClient,
    kernel::{CompileOptions, CompiledKernel, KernelPlan},
    server::{CompilationError, ComputeServer},
};

/// Outcome of a strategy construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Applicability<T> {
    /// The strategy can run the problem.
    Applicable(T),
    /// The strategy cannot run the problem. This is not an error.
    NotApplicable(String),
}

impl<T> Applicability<T> {
    pub(crate) fn not_applicable(reason: impl Into<String>) -> Self {
        Self::NotApplicable(reason.into())
    }

    /// The strategy, if applicable.
    pub fn applicable(self) -> Option<T> {
        match self {
            Applicability::Applicable(value) => Some(value),
            Applicability::NotApplicable(_) => None,
        }
    }

    /// Whether the strategy can run the problem.
    pub fn is_applicable(&self) -> bool {
        matches!(self, Applicability::Applicable(_))
    }
}

/// One kernel of a strategy.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    /// Position in the strategy.
    pub stage: Stage,
    /// How to build and launch the kernel.
    pub plan: KernelPlan,
}

/// Fetch the kernels of every stage, compiling the ones that are not registered yet.
///
/// `key` gives the registry key of each stage.
pub(crate) fn compile_stages<S: ComputeServer>(
    client: &ComputeClient<S>,
    stages: &[StagePlan],
    key: impl Fn(Stage) -> KernelKey,
) -> Result<Vec<CompiledKernel<S::Kernel>>, CompilationError> {
    stages
        .iter()
        .map(|stage| client.get_or_compile(key(stage.stage).id(), || stage.plan.clone()))
        .collect()
}

/// Definitions describing the convolution, shared by the direct programs.
///
/// `IN_*` always describes `x` (or `dx`), `OUT_*` describes `y` (or `dy`) and `WEI_*` the filter.
pub(crate) fn conv_defines(problem: &ConvProblem) -> CompileOptions {
    let shape = &problem.shape;
    let params = &problem.params;
    let [in_batch, in_channel, in_row, _] = strides(&problem.input);
    let [wei_batch, wei_channel, wei_row, _] = strides(&problem.weights);
    let [out_batch, out_channel, out_row, _] = strides(&problem.output);

    CompileOptions::default()
        .define("BATCH_SZ", shape.n)
        .define("N_INPUTS", shape.c)
        .define("IN_HEIGHT", shape.h)
        .define("IN_WIDTH", shape.w)
        .define("N_OUTPUTS", shape.k)
        .define("OUT_HEIGHT", shape.out_h)
        .define("OUT_WIDTH", shape.out_w)
        .define("FILTER_H", shape.fh)
        .define("FILTER_W", shape.fw)
        .define("PAD_H", params.padding.0)
        .define("PAD_W", params.padding.1)
        .define("STRIDE_H", params.stride.0)
        .define("STRIDE_W", params.stride.1)
        .define("DILATION_H", params.dilation.0)
        .define("DILATION_W", params.dilation.1)
        .define("IN_BATCH_STRIDE", in_batch)
        .define("IN_CHANNEL_STRIDE", in_channel)
        .define("IN_ROW_STRIDE", in_row)
        .define("WEI_BATCH_STRIDE", wei_batch)
        .define("WEI_CHANNEL_STRIDE", wei_channel)
        .define("WEI_ROW_STRIDE", wei_row)
        .define("OUT_BATCH_STRIDE", out_batch)
        .define("OUT_CHANNEL_STRIDE", out_channel)
        .define("OUT_ROW_STRIDE", out_row)
}

fn strides(desc: &crate::TensorDescriptor) -> [usize; 4] {
    desc.nchw_strides().unwrap_or_default()
}

/// Whether every tensor of the problem has a contiguous innermost dimension.
pub(crate) fn unit_innermost(problem: &ConvProblem) -> bool {
    problem.input.is_unit_innermost()
        && problem.weights.is_unit_innermost()
        && problem.output.is_unit_innermost()
}

pub(crate) fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}
