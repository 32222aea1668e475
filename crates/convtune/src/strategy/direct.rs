use super::{Applicability, StagePlan, conv_defines, round_up, unit_innermost};
use crate::{AlgorithmFamily, ConvProblem, Direction, KernelKey, NetworkConfig, Stage};
use convtune_runtime::{
    DeviceProperties,
    id::ClientId,
    kernel::{KernelPlan, WorkSize},
    local_tuner,
    tune::{LocalTuner, TuneCacheResult},
};

/// Program running 1x1 filters with unit stride and no padding.
pub const PROGRAM_1X1: &str = "conv_direct_1x1";
/// Program running 11x11 filters.
pub const PROGRAM_11X11: &str = "conv_direct_11x11";
/// Program running every other filter.
pub const PROGRAM_GENERIC: &str = "conv_direct_generic";

/// Fastest generic tiling per problem, filled by exhaustive searches.
static TILING_TUNER: LocalTuner<NetworkConfig, ClientId> = local_tuner!("direct-tiling");

/// Output tile and work group of the generic direct kernel.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectTiling {
    /// Output pixels computed by one work item, as `(h, w)`.
    pub out_tile: (usize, usize),
    /// Work group size, as `(x, y)`.
    pub group: (usize, usize),
}

impl DirectTiling {
    /// Every tiling the generic program can be built with. The position in this list is the
    /// kernel variant.
    pub const ALL: [DirectTiling; 9] = [
        DirectTiling::tile((1, 1), (8, 8)),
        DirectTiling::tile((1, 1), (16, 8)),
        DirectTiling::tile((1, 1), (16, 16)),
        DirectTiling::tile((2, 2), (8, 8)),
        DirectTiling::tile((2, 2), (16, 8)),
        DirectTiling::tile((2, 2), (16, 16)),
        DirectTiling::tile((4, 4), (8, 8)),
        DirectTiling::tile((4, 4), (16, 8)),
        DirectTiling::tile((4, 4), (16, 16)),
    ];

    const fn tile(out_tile: (usize, usize), group: (usize, usize)) -> Self {
        Self { out_tile, group }
    }

    /// Tilings whose work group fits the device, with their variant.
    pub fn candidates(properties: &DeviceProperties) -> Vec<(usize, DirectTiling)> {
        Self::ALL
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, tiling)| tiling.group.0 * tiling.group.1 <= properties.max_work_group_size)
            .collect()
    }

    /// The tiling used without tuning: bigger tiles once the output is large enough to keep
    /// every work item busy.
    pub fn heuristic(out_spatial: usize, properties: &DeviceProperties) -> Option<(usize, DirectTiling)> {
        let out_tile = if out_spatial >= 16 { (2, 2) } else { (1, 1) };
        let candidates = Self::candidates(properties);

        candidates
            .iter()
            .find(|(_, tiling)| tiling.out_tile == out_tile)
            .or(candidates.first())
            .copied()
    }

    /// Variant of a tiling, `None` when the generic program cannot be built with it.
    pub fn variant(&self) -> Option<usize> {
        Self::ALL.iter().position(|tiling| tiling == self)
    }
}

/// The program a direct convolution is lowered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectProgram {
    /// 1x1 filter, unit stride and no padding.
    OneByOne,
    /// 11x11 filter.
    ///
    /// Has its own program, and splits the data gradient in two passes over the rows of `dx`.
    /// The second pass is registered under the second pass fingerprint.
    LargeFilter,
    /// Any other filter.
    Generic(DirectTiling),
}

/// Sliding window convolution computing the forward pass or the data gradient.
#[derive(Debug, Clone)]
pub struct DirectStrategy {
    program: DirectProgram,
    variant: usize,
    stages: Vec<StagePlan>,
}

impl DirectStrategy {
    /// Lower a problem, picking the generic tiling heuristically.
    pub fn new(problem: &ConvProblem, properties: &DeviceProperties) -> Applicability<Self> {
        let (out_h, out_w) = destination_spatial(problem);

        match DirectTiling::heuristic(out_h * out_w, properties) {
            Some((_, tiling)) => Self::with_tiling(problem, properties, tiling),
            None => Applicability::not_applicable("no direct tiling fits the work group limit"),
        }
    }

    /// Lower a problem with the tuned tiling when one was registered for this client.
    pub fn tuned(
        problem: &ConvProblem,
        properties: &DeviceProperties,
        client: &ClientId,
    ) -> Applicability<Self> {
        match TILING_TUNER.fastest(client, &problem.config) {
            TuneCacheResult::Hit { fastest_index } => match DirectTiling::ALL.get(fastest_index) {
                Some(tiling) => Self::with_tiling(problem, properties, *tiling),
                None => Self::new(problem, properties),
            },
            TuneCacheResult::Miss => Self::new(problem, properties),
        }
    }

    /// Lower a problem with a given generic tiling, one of [DirectTiling::ALL]. The tiling is
    /// ignored by the 1x1 and 11x11 programs.
    pub fn with_tiling(
        problem: &ConvProblem,
        properties: &DeviceProperties,
        tiling: DirectTiling,
    ) -> Applicability<Self> {
        if problem.direction == Direction::BackwardWeights {
            return Applicability::not_applicable(
                "the direct program computes the forward pass or the data gradient",
            );
        }
        if !unit_innermost(problem) {
            return Applicability::not_applicable("the innermost dimension must be contiguous");
        }

        let shape = &problem.shape;
        let (program, variant) = if shape.is_1x1() && problem.is_unit_stride_unpadded() {
            (DirectProgram::OneByOne, 0)
        } else if shape.fh == 11 && shape.fw == 11 {
            (DirectProgram::LargeFilter, 0)
        } else {
            match tiling.variant() {
                Some(variant) => (DirectProgram::Generic(tiling), variant),
                None => {
                    return Applicability::not_applicable(format!(
                        "the generic program has no {tiling:?} variant"
                    ));
                }
            }
        };

        let stages = lower(problem, properties, program);
        if let Some(stage) = stages
            .iter()
            .find(|stage| stage.plan.local.count() > properties.max_work_group_size)
        {
            return Applicability::not_applicable(format!(
                "work group of {} items exceeds the device limit",
                stage.plan.local.count()
            ));
        }

        Applicability::Applicable(Self {
            program,
            variant,
            stages,
        })
    }

    /// The program used.
    pub fn program(&self) -> DirectProgram {
        self.program
    }

    /// Kernels to launch, in order.
    pub fn stages(&self) -> &[StagePlan] {
        &self.stages
    }

    /// Registry key of a stage.
    pub fn key(&self, stage: Stage, config: &NetworkConfig) -> KernelKey {
        KernelKey::new(AlgorithmFamily::Direct, stage, self.variant, config)
    }
}

/// Remember the fastest generic tiling of a problem for a client.
pub(crate) fn register_tiling(client: &ClientId, config: &NetworkConfig, variant: usize) {
    TILING_TUNER.register(client, config.clone(), variant);
}

/// Spatial dims of the tensor written by the kernel: `y` forward, `dx` backward.
fn destination_spatial(problem: &ConvProblem) -> (usize, usize) {
    let shape = &problem.shape;
    match problem.direction {
        Direction::Forward => (shape.out_h, shape.out_w),
        Direction::BackwardData | Direction::BackwardWeights => (shape.h, shape.w),
    }
}

fn destination_channels(problem: &ConvProblem) -> usize {
    match problem.direction {
        Direction::Forward => problem.shape.k,
        Direction::BackwardData | Direction::BackwardWeights => problem.shape.c,
    }
}

fn lower(problem: &ConvProblem, properties: &DeviceProperties, program: DirectProgram) -> Vec<StagePlan> {
    let (dst_h, dst_w) = destination_spatial(problem);
    let planes = problem.shape.n * destination_channels(problem);
    let forward = problem.direction == Direction::Forward;
    let defines = conv_defines(problem).define("CONV_DIR_FORWARD", usize::from(forward));

    match program {
        DirectProgram::OneByOne => {
            let group = usize::min(256, properties.max_work_group_size);
            let local = WorkSize::new_1d(group);
            let global = WorkSize::new(round_up(dst_h * dst_w, group), planes, 1);
            let options = defines
                .define("OUT_TILE0", 1)
                .define("OUT_TILE1", 1)
                .define("ROW_BEGIN", 0)
                .define("ROW_END", dst_h);

            vec![StagePlan::new(
                Stage::Main,
                KernelPlan::new(PROGRAM_1X1, PROGRAM_1X1, options, local, global),
            )]
        }
        DirectProgram::LargeFilter => {
            let local = WorkSize::new_2d(8, 8);
            let rows = |begin: usize, end: usize| {
                let options = defines
                    .clone()
                    .define("OUT_TILE0", 1)
                    .define("OUT_TILE1", 1)
                    .define("ROW_BEGIN", begin)
                    .define("ROW_END", end);
                let global = WorkSize::new(round_up(dst_w, 8), round_up(end - begin, 8), planes);
                (options, global)
            };

            if forward {
                let (options, global) = rows(0, dst_h);
                return vec![StagePlan::new(
                    Stage::Main,
                    KernelPlan::new(PROGRAM_11X11, PROGRAM_11X11, options, local, global),
                )];
            }

            let half = dst_h.div_ceil(2);
            let (main, main_global) = rows(0, half);
            let (second, second_global) = rows(half, dst_h);
            vec![
                StagePlan::new(
                    Stage::Main,
                    KernelPlan::new(PROGRAM_11X11, PROGRAM_11X11, main, local, main_global),
                ),
                StagePlan::new(
                    Stage::SecondPass,
                    KernelPlan::new(
                        PROGRAM_11X11,
                        format!("{PROGRAM_11X11}_pass2"),
                        second,
                        local,
                        second_global,
                    ),
                ),
            ]
        }
        DirectProgram::Generic(tiling) => {
            let (tile_h, tile_w) = tiling.out_tile;
            let (group_x, group_y) = tiling.group;
            let local = WorkSize::new_2d(group_x, group_y);
            let global = WorkSize::new(
                round_up(dst_w.div_ceil(tile_w), group_x),
                round_up(dst_h.div_ceil(tile_h), group_y),
                planes,
            );
            let options = defines
                .define("OUT_TILE0", tile_w)
                .define("OUT_TILE1", tile_h)
                .define("ROW_BEGIN", 0)
                .define("ROW_END", dst_h);

            vec![StagePlan::new(
                Stage::Main,
                KernelPlan::new(PROGRAM_GENERIC, PROGRAM_GENERIC, options, local, global),
            )]
        }
    }
}
