use super::{Applicability, StagePlan};
use crate::{AlgorithmFamily, ConvProblem, DataType, Direction, KernelKey, NetworkConfig, Stage};
use convtune_runtime::{
    DeviceProperties,
    kernel::{CompileOptions, KernelPlan, WorkSize},
    server::ScalarArg,
};

/// Program of the 3x3 transform domain kernel.
pub const PROGRAM: &str = "conv_winograd_3x3";
/// Entry point of the forward kernel.
pub const ENTRY: &str = "conv_winograd_3x3_fwd";

const GROUP_SIZE: usize = 64;
const MAX_CHANNELS: usize = 1024;

/// Parameters compiled into the transform domain kernel, passed back at launch.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinogradParams {
    pub n: i32,
    pub c: i32,
    pub h: i32,
    pub w: i32,
    pub k: i32,
    /// Number of persistent work groups, one per compute unit.
    pub n_groups: i32,
}

/// Transform domain forward convolution of 3x3 filters.
#[derive(Debug, Clone)]
pub struct WinogradStrategy {
    stage: StagePlan,
    params: WinogradParams,
}

impl WinogradStrategy {
    /// Lower a forward problem.
    pub fn new(problem: &ConvProblem, properties: &DeviceProperties) -> Applicability<Self> {
        let shape = &problem.shape;
        let params = &problem.params;

        if problem.direction != Direction::Forward {
            return Applicability::not_applicable("the transform domain kernel is forward only");
        }
        if shape.fh != 3 || shape.fw != 3 {
            return Applicability::not_applicable("the filter must be 3x3");
        }
        if params.stride != (1, 1) || params.dilation != (1, 1) {
            return Applicability::not_applicable("stride and dilation must be 1");
        }
        if params.padding.0 > 1 || params.padding.1 > 1 {
            return Applicability::not_applicable("padding must be at most 1");
        }
        if problem.dtype() != DataType::F32 {
            return Applicability::not_applicable("only f32 is supported");
        }
        if shape.c > MAX_CHANNELS || shape.k > MAX_CHANNELS {
            return Applicability::not_applicable(format!(
                "at most {MAX_CHANNELS} input and output channels"
            ));
        }
        if !problem.is_packed() {
            return Applicability::not_applicable("tensors must be packed");
        }
        if properties.max_work_group_size < GROUP_SIZE {
            return Applicability::not_applicable("work group limit is too small");
        }

        let Some(compiled) = compiled_params(problem, properties) else {
            return Applicability::not_applicable("problem sizes overflow the kernel parameters");
        };

        let options = CompileOptions::default()
            .define("PAD_H", params.padding.0)
            .define("PAD_W", params.padding.1);
        let local = WorkSize::new_1d(GROUP_SIZE);
        let global = WorkSize::new_1d(GROUP_SIZE * compiled.n_groups as usize);

        Applicability::Applicable(Self {
            stage: StagePlan::new(
                Stage::Main,
                KernelPlan::new(PROGRAM, ENTRY, options, local, global),
            ),
            params: compiled,
        })
    }

    /// The kernel to launch.
    pub fn stage(&self) -> &StagePlan {
        &self.stage
    }

    /// Compiled-in parameters.
    pub fn params(&self) -> WinogradParams {
        self.params
    }

    /// Scalar launch arguments: `N, C, H, W, K, n_groups, flags, reserved`.
    pub fn scalars(&self) -> [ScalarArg; 8] {
        let p = self.params;
        [
            ScalarArg::I32(p.n),
            ScalarArg::I32(p.c),
            ScalarArg::I32(p.h),
            ScalarArg::I32(p.w),
            ScalarArg::I32(p.k),
            ScalarArg::I32(p.n_groups),
            ScalarArg::I32(0),
            ScalarArg::I32(0),
        ]
    }

    /// Registry key of the kernel.
    pub fn key(&self, config: &NetworkConfig) -> KernelKey {
        KernelKey::new(AlgorithmFamily::Winograd, Stage::Main, 0, config)
    }
}

fn compiled_params(problem: &ConvProblem, properties: &DeviceProperties) -> Option<WinogradParams> {
    let shape = &problem.shape;
    let to_i32 = |value: usize| i32::try_from(value).ok();

    Some(WinogradParams {
        n: to_i32(shape.n)?,
        c: to_i32(shape.c)?,
        h: to_i32(shape.h)?,
        w: to_i32(shape.w)?,
        k: to_i32(shape.k)?,
        n_groups: i32::try_from(properties.compute_units.max(1)).ok()?,
    })
}
