use crate::{
    ConvProblem, ConvolutionError, ConvolutionServer, GemmCall, GemmPlan,
    NetworkConfig, StagedLaunch, Workspace,
    strategy::{
        backward_weights::BackwardWeightsDirectStrategy, compile_stages, direct::DirectStrategy,
        gemm::GemmStrategy, winograd::WinogradStrategy,
    },
};
use convtune_runtime::{
    client::ComputeClient,
    id::ClientId,
    local_tuner,
    server::{Binding, Bindings, ScalarArg},
    tune::{LocalTuner, TuneCacheResult},
};
use core::time::Duration;

/// GEMM solution picked for each problem, per client.
static GEMM_PLANS: LocalTuner<NetworkConfig, ClientId> = local_tuner!("gemm");

const PADDING_VALUE: ScalarArg = ScalarArg::F32(0.0);

/// Launch the stages of a direct strategy, reading `src` and writing `dst`.
pub(crate) fn direct<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    strategy: &DirectStrategy,
    src: Binding,
    weights: Binding,
    dst: Binding,
) -> Result<Duration, ConvolutionError> {
    let mut kernels = compile_stages(client, strategy.stages(), |stage| {
        strategy.key(stage, &problem.config)
    })?
    .into_iter();
    let bindings = || {
        Bindings::new()
            .with_buffers([src, weights, dst])
            .with_scalar(PADDING_VALUE)
    };

    let main = kernels.next().ok_or_else(|| {
        ConvolutionError::unsupported("the direct strategy has no kernel")
    })?;
    let second = kernels.next().map(|kernel| (kernel, bindings()));

    StagedLaunch::new(client, (main, bindings()), second).run()
}

/// Launch the transform domain kernel.
pub(crate) fn winograd<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    strategy: &WinogradStrategy,
    x: Binding,
    w: Binding,
    y: Binding,
) -> Result<Duration, ConvolutionError> {
    let stage = strategy.stage();
    let kernel = client.get_or_compile(strategy.key(&problem.config).id(), || stage.plan.clone())?;
    let bindings = Bindings::new()
        .with_scalars(strategy.scalars())
        .with_buffers([x, w, y]);

    client.reset_kernel_time();
    client.launch(&kernel, bindings)?;

    Ok(client.kernel_time())
}

/// Launch the batch grouped weight gradient, through the workspace when partial gradients need
/// a reduction.
pub(crate) fn backward_weights_direct<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    strategy: &BackwardWeightsDirectStrategy,
    dy: Binding,
    x: Binding,
    dw: Binding,
    workspace: &Workspace<'_>,
) -> Result<Duration, ConvolutionError> {
    let kernels = compile_stages(client, strategy.stages(), |stage| {
        strategy.key(stage, &problem.config)
    })?;
    let mut kernels = kernels.into_iter();
    let main = kernels.next().ok_or_else(|| {
        ConvolutionError::unsupported("the backward weights strategy has no kernel")
    })?;

    let launch = match kernels.next() {
        Some(reduction) => {
            let partial = workspace
                .binding()
                .filter(|_| workspace.fits(strategy.workspace()))
                .ok_or_else(|| {
                    ConvolutionError::bad_parameter(format!(
                        "the weight gradient reduction needs a workspace of {} bytes, got {}",
                        strategy.workspace(),
                        workspace.size()
                    ))
                })?;

            StagedLaunch::new(
                client,
                (main, main_bindings(dy, x, partial)),
                Some((reduction, Bindings::new().with_buffers([partial, dw]))),
            )
        }
        None => StagedLaunch::new(client, (main, main_bindings(dy, x, dw)), None),
    };

    launch.run()
}

fn main_bindings(dy: Binding, x: Binding, out: Binding) -> Bindings {
    Bindings::new()
        .with_buffers([dy, x, out])
        .with_scalar(PADDING_VALUE)
}

/// Operands of a GEMM convolution.
pub(crate) struct GemmOperands {
    /// `x`.
    pub input: Binding,
    /// `w` forward, `dy` backward weights.
    pub other: Binding,
    /// `y` forward, `dw` backward weights.
    pub output: Binding,
}

/// Run the unfold and matrix multiplication of the first `samples` samples.
///
/// Each sample adds its unfold time to the device timer, and the last one adds the time of
/// every previous sample, so the timer reports the time of the whole batch when profiling is
/// enabled.
pub(crate) fn gemm<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    strategy: &GemmStrategy,
    operands: GemmOperands,
    workspace: &Workspace<'_>,
    samples: usize,
) -> Result<Duration, ConvolutionError> {
    if !client.with_server(|server| server.gemm_available()) {
        return Err(ConvolutionError::GemmUnavailable);
    }

    let col = match strategy.im2col() {
        Some(_) => Some(
            workspace
                .binding()
                .filter(|_| workspace.fits(strategy.workspace()))
                .ok_or_else(|| {
                    ConvolutionError::bad_parameter(format!(
                        "the unfold needs a workspace of {} bytes, got {}",
                        strategy.workspace(),
                        workspace.size()
                    ))
                })?,
        ),
        None => None,
    };

    let backward = problem.direction != crate::Direction::Forward;
    let sample = |index: usize| -> (Binding, Binding, Binding) {
        let input = operands
            .input
            .offset(strategy.input_offset(index));
        let input = Binding::new(input.id, input.offset, strategy.input_sample_bytes());

        if backward {
            let dy = operands.other.offset(strategy.output_offset(index));
            let dy = Binding::new(dy.id, dy.offset, strategy.output_sample_bytes());
            (dy, input, operands.output)
        } else {
            let y = operands.output.offset(strategy.output_offset(index));
            let y = Binding::new(y.id, y.offset, strategy.output_sample_bytes());
            (operands.other, input, y)
        }
    };

    let (a, b, c) = sample(0);
    let plan = gemm_plan(client, problem, strategy, a, col.unwrap_or(b), c)?;
    let profiling = client.profiling_enabled();
    let mut elapsed = Duration::ZERO;

    client.reset_kernel_time();
    for index in 0..samples {
        let (a, input, c) = sample(index);

        let (b, unfold) = match (strategy.im2col(), col) {
            (Some(args), Some(col)) => {
                let time = client.with_server(|server| server.im2col(args, input, col))?;
                (col, time)
            }
            _ => (input, Duration::ZERO),
        };

        let call = GemmCall::new(a, b, c, backward && index > 0);
        client.with_server(|server| server.run_gemm(&plan, call))?;

        if profiling {
            if index + 1 == samples {
                client.accumulate_kernel_time(unfold + elapsed);
            } else {
                client.accumulate_kernel_time(unfold);
            }
            elapsed += client.kernel_time();
        }
    }

    Ok(if profiling {
        client.kernel_time()
    } else {
        Duration::ZERO
    })
}

fn gemm_plan<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    strategy: &GemmStrategy,
    a: Binding,
    b: Binding,
    c: Binding,
) -> Result<GemmPlan, ConvolutionError> {
    let geometry = *strategy.geometry();

    if let TuneCacheResult::Hit { fastest_index } = GEMM_PLANS.fastest(&client.id(), &problem.config)
    {
        return Ok(GemmPlan::new(geometry, fastest_index));
    }

    let plan = client.with_server(|server| server.find_gemm_plan(&geometry, a, b, c))?;
    GEMM_PLANS.register(&client.id(), problem.config.clone(), plan.variant);

    Ok(plan)
}
