use super::{Applicability, StagePlan, conv_defines, round_up, unit_innermost};
use crate::{
    AlgorithmFamily, ConvProblem, Direction, KernelKey, NetworkConfig, Stage,
    workspace::batch_groups,
};
use convtune_runtime::{
    DeviceProperties,
    kernel::{CompileOptions, KernelPlan, WorkSize},
};

/// Program of the weight gradient kernels.
pub const PROGRAM: &str = "conv_bwd_weights";
/// Entry point accumulating the gradient of a group of samples.
pub const ENTRY_MAIN: &str = "conv_bwd_weights_main";
/// Entry point summing the partial gradients of every group.
pub const ENTRY_REDUCTION: &str = "conv_bwd_weights_red";

const GROUP_SIZE: usize = 64;
const LARGE_INPUT: usize = 8 * 1024;

/// Batch grouped weight gradient.
///
/// Each work group handles `batch_per_group` samples. With more than one batch group, the main
/// kernel writes one partial gradient per group into the workspace and a reduction kernel sums
/// them into `dw`.
#[derive(Debug, Clone)]
pub struct BackwardWeightsDirectStrategy {
    stages: Vec<StagePlan>,
    workspace: usize,
}

impl BackwardWeightsDirectStrategy {
    /// Lower a backward weights problem.
    pub fn new(problem: &ConvProblem, properties: &DeviceProperties) -> Applicability<Self> {
        let shape = &problem.shape;

        if problem.direction != Direction::BackwardWeights {
            return Applicability::not_applicable("only computes the weight gradient");
        }
        if shape.fw < shape.fh {
            return Applicability::not_applicable("the filter must be at least as wide as high");
        }
        if shape.is_1x1() && shape.in_spatial() > LARGE_INPUT {
            return Applicability::not_applicable(format!(
                "1x1 filters over more than {LARGE_INPUT} input pixels"
            ));
        }
        if !unit_innermost(problem) {
            return Applicability::not_applicable("the innermost dimension must be contiguous");
        }
        if properties.max_work_group_size < GROUP_SIZE {
            return Applicability::not_applicable("work group limit is too small");
        }

        let (batch_per_group, groups) = batch_groups(shape.n, shape.out_spatial());
        let weights_len = shape.k * shape.col_len();
        let partial = groups > 1;

        let main_options = conv_defines(problem)
            .define("BATCH_PER_GROUP", batch_per_group)
            .define("N_BATCH_GROUPS", groups)
            .define("PARTIAL_OUTPUT", usize::from(partial));
        let main = KernelPlan::new(
            PROGRAM,
            ENTRY_MAIN,
            main_options,
            WorkSize::new_1d(GROUP_SIZE),
            WorkSize::new(round_up(shape.col_len(), GROUP_SIZE), shape.k, groups),
        );

        let mut stages = vec![StagePlan::new(Stage::Main, main)];
        let mut workspace = 0;

        if partial {
            let [wei_batch, wei_channel, wei_row, _] =
                problem.weights.nchw_strides().unwrap_or_default();
            let options = CompileOptions::default()
                .define("N_BATCH_GROUPS", groups)
                .define("N_OUTPUTS", shape.k)
                .define("N_INPUTS", shape.c)
                .define("FILTER_H", shape.fh)
                .define("FILTER_W", shape.fw)
                .define("WEI_BATCH_STRIDE", wei_batch)
                .define("WEI_CHANNEL_STRIDE", wei_channel)
                .define("WEI_ROW_STRIDE", wei_row);
            let reduction = KernelPlan::new(
                PROGRAM,
                ENTRY_REDUCTION,
                options,
                WorkSize::new_1d(GROUP_SIZE),
                WorkSize::new_1d(round_up(weights_len, GROUP_SIZE)),
            );

            stages.push(StagePlan::new(Stage::SecondPass, reduction));
            workspace = groups * weights_len * problem.elem_size();
        }

        Applicability::Applicable(Self { stages, workspace })
    }

    /// Kernels to launch, in order.
    pub fn stages(&self) -> &[StagePlan] {
        &self.stages
    }

    /// Workspace needed, in bytes.
    pub fn workspace(&self) -> usize {
        self.workspace
    }

    /// Registry key of a stage.
    pub fn key(&self, stage: Stage, config: &NetworkConfig) -> KernelKey {
        KernelKey::new(AlgorithmFamily::BackwardWeightsDirect, stage, 0, config)
    }
}
