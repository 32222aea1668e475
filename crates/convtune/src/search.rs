use crate::{
    AlgorithmPerf, BackwardDataAlgorithm, BackwardWeightsAlgorithm, ConvProblem,
    ConvolutionDescriptor, ConvolutionError, ConvolutionServer, Direction, ForwardAlgorithm,
    SearchOptions, TensorHandleRef, Workspace,
    algorithm::rank,
    launch::{self, GemmOperands},
    strategy::{
        Applicability,
        backward_weights::BackwardWeightsDirectStrategy,
        direct::{self, DirectProgram, DirectStrategy, DirectTiling},
        gemm::GemmStrategy,
        winograd::WinogradStrategy,
    },
    validate::validate,
};
use convtune_runtime::{
    client::ComputeClient, config::GlobalConfig, server::Binding, tune::fastest_index,
};
use core::{fmt::Debug, time::Duration};

impl ConvolutionDescriptor {
    /// Benchmark every forward algorithm able to compute `y = conv(x, w)` and rank them by time,
    /// then by workspace.
    ///
    /// Kernels write to a scratch output, `y` is left untouched. The GEMM time is measured on the
    /// first sample and multiplied by the batch size.
    pub fn find_forward_algorithm<S: ConvolutionServer>(
        &self,
        client: &ComputeClient<S>,
        x: TensorHandleRef<'_>,
        w: TensorHandleRef<'_>,
        y: TensorHandleRef<'_>,
        workspace: Workspace<'_>,
        options: SearchOptions,
    ) -> Result<Vec<AlgorithmPerf<ForwardAlgorithm>>, ConvolutionError> {
        check_request(&options)?;
        let problem = validate(self, Direction::Forward, &x, &w, &y)?;
        let exhaustive = exhaustive(&options);

        let _profiling = client.profiling();
        let scratch = client.empty(y.desc.byte_size())?;
        let mut results = Vec::new();

        match GemmStrategy::new(&problem, gemm_available(client)) {
            Applicability::Applicable(gemm) if workspace.fits(gemm.workspace()) => {
                let operands = GemmOperands {
                    input: x.binding(),
                    other: w.binding(),
                    output: scratch.binding(),
                };
                let time = gemm_time(client, &problem, &gemm, operands, &workspace)?;
                record(client, &mut results, ForwardAlgorithm::Gemm, time, gemm.workspace());
            }
            Applicability::Applicable(gemm) => skip(
                client,
                ForwardAlgorithm::Gemm,
                format!("needs a workspace of {} bytes, got {}", gemm.workspace(), workspace.size()),
            ),
            Applicability::NotApplicable(reason) => skip(client, ForwardAlgorithm::Gemm, reason),
        }

        match WinogradStrategy::new(&problem, client.properties()) {
            Applicability::Applicable(winograd) => {
                let time = launch::winograd(
                    client,
                    &problem,
                    &winograd,
                    x.binding(),
                    w.binding(),
                    scratch.binding(),
                )?;
                record(client, &mut results, ForwardAlgorithm::Winograd, time, 0);
            }
            Applicability::NotApplicable(reason) => skip(client, ForwardAlgorithm::Winograd, reason),
        }

        match direct_time(client, &problem, x.binding(), w.binding(), scratch.binding(), exhaustive)? {
            Applicability::Applicable(time) => {
                record(client, &mut results, ForwardAlgorithm::Direct, time, 0)
            }
            Applicability::NotApplicable(reason) => skip(client, ForwardAlgorithm::Direct, reason),
        }

        finish(client, &problem, results, options.request_count)
    }

    /// Benchmark every algorithm able to compute `dx` from `dy` and `w` and rank them.
    ///
    /// Kernels write to a scratch output, `dx` is left untouched.
    pub fn find_backward_data_algorithm<S: ConvolutionServer>(
        &self,
        client: &ComputeClient<S>,
        dy: TensorHandleRef<'_>,
        w: TensorHandleRef<'_>,
        dx: TensorHandleRef<'_>,
        options: SearchOptions,
    ) -> Result<Vec<AlgorithmPerf<BackwardDataAlgorithm>>, ConvolutionError> {
        check_request(&options)?;
        let problem = validate(self, Direction::BackwardData, &dx, &w, &dy)?;
        let exhaustive = exhaustive(&options);

        let _profiling = client.profiling();
        let scratch = client.empty(dx.desc.byte_size())?;
        let mut results = Vec::new();

        match direct_time(client, &problem, dy.binding(), w.binding(), scratch.binding(), exhaustive)? {
            Applicability::Applicable(time) => {
                record(client, &mut results, BackwardDataAlgorithm::Direct, time, 0)
            }
            Applicability::NotApplicable(reason) => {
                skip(client, BackwardDataAlgorithm::Direct, reason)
            }
        }

        finish(client, &problem, results, options.request_count)
    }

    /// Benchmark every algorithm able to compute `dw` from `dy` and `x` and rank them.
    ///
    /// Kernels write to a scratch output, `dw` is left untouched. The GEMM time is measured on
    /// the first sample and multiplied by the batch size.
    pub fn find_backward_weights_algorithm<S: ConvolutionServer>(
        &self,
        client: &ComputeClient<S>,
        dy: TensorHandleRef<'_>,
        x: TensorHandleRef<'_>,
        dw: TensorHandleRef<'_>,
        workspace: Workspace<'_>,
        options: SearchOptions,
    ) -> Result<Vec<AlgorithmPerf<BackwardWeightsAlgorithm>>, ConvolutionError> {
        check_request(&options)?;
        let problem = validate(self, Direction::BackwardWeights, &x, &dw, &dy)?;

        let _profiling = client.profiling();
        let scratch = client.empty(dw.desc.byte_size())?;
        let mut results = Vec::new();

        match GemmStrategy::new(&problem, gemm_available(client)) {
            Applicability::Applicable(gemm) if workspace.fits(gemm.workspace()) => {
                let operands = GemmOperands {
                    input: x.binding(),
                    other: dy.binding(),
                    output: scratch.binding(),
                };
                let time = gemm_time(client, &problem, &gemm, operands, &workspace)?;
                record(client, &mut results, BackwardWeightsAlgorithm::Gemm, time, gemm.workspace());
            }
            Applicability::Applicable(gemm) => skip(
                client,
                BackwardWeightsAlgorithm::Gemm,
                format!("needs a workspace of {} bytes, got {}", gemm.workspace(), workspace.size()),
            ),
            Applicability::NotApplicable(reason) => {
                skip(client, BackwardWeightsAlgorithm::Gemm, reason)
            }
        }

        match BackwardWeightsDirectStrategy::new(&problem, client.properties()) {
            Applicability::Applicable(strategy) if workspace.fits(strategy.workspace()) => {
                let time = launch::backward_weights_direct(
                    client,
                    &problem,
                    &strategy,
                    dy.binding(),
                    x.binding(),
                    scratch.binding(),
                    &workspace,
                )?;
                record(
                    client,
                    &mut results,
                    BackwardWeightsAlgorithm::Direct,
                    time,
                    strategy.workspace(),
                );
            }
            Applicability::Applicable(strategy) => skip(
                client,
                BackwardWeightsAlgorithm::Direct,
                format!(
                    "needs a workspace of {} bytes, got {}",
                    strategy.workspace(),
                    workspace.size()
                ),
            ),
            Applicability::NotApplicable(reason) => {
                skip(client, BackwardWeightsAlgorithm::Direct, reason)
            }
        }

        finish(client, &problem, results, options.request_count)
    }
}

fn check_request(options: &SearchOptions) -> Result<(), ConvolutionError> {
    if options.request_count < 1 {
        return Err(ConvolutionError::bad_parameter(
            "at least one result must be requested",
        ));
    }
    Ok(())
}

fn exhaustive(options: &SearchOptions) -> bool {
    GlobalConfig::get()
        .autotune
        .level
        .exhaustive(options.exhaustive)
}

fn gemm_available<S: ConvolutionServer>(client: &ComputeClient<S>) -> bool {
    client.with_server(|server| server.gemm_available())
}

/// Time of the GEMM algorithm over the whole batch, estimated from the first sample.
fn gemm_time<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    strategy: &GemmStrategy,
    operands: GemmOperands,
    workspace: &Workspace<'_>,
) -> Result<Duration, ConvolutionError> {
    let sample = launch::gemm(client, problem, strategy, operands, workspace, 1)?;
    let batch = u32::try_from(problem.shape.n).unwrap_or(u32::MAX);

    log::debug!(
        "GEMM time of {} estimated as {batch} x {sample:?} from the first sample",
        problem.config
    );

    Ok(sample.saturating_mul(batch))
}

/// Time of the direct strategy. With an exhaustive search, every generic tiling is benchmarked
/// and the fastest one is kept for later launches on this client.
fn direct_time<S: ConvolutionServer>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    src: Binding,
    weights: Binding,
    dst: Binding,
    exhaustive: bool,
) -> Result<Applicability<Duration>, ConvolutionError> {
    let properties = client.properties();
    let strategy = match DirectStrategy::tuned(problem, properties, &client.id()) {
        Applicability::Applicable(strategy) => strategy,
        Applicability::NotApplicable(reason) => return Ok(Applicability::NotApplicable(reason)),
    };

    if !exhaustive || !matches!(strategy.program(), DirectProgram::Generic(_)) {
        let time = launch::direct(client, problem, &strategy, src, weights, dst)?;
        return Ok(Applicability::Applicable(time));
    }

    let mut variants = Vec::new();
    let mut durations = Vec::new();
    for (variant, tiling) in DirectTiling::candidates(properties) {
        let duration = match DirectStrategy::with_tiling(problem, properties, tiling) {
            Applicability::Applicable(candidate) => {
                let time = launch::direct(client, problem, &candidate, src, weights, dst)?;
                client.log_autotune(
                    &format!("{} - direct tiling {tiling:?} took {time:?}", problem.config),
                    true,
                );
                Some(time)
            }
            Applicability::NotApplicable(_) => None,
        };

        variants.push(variant);
        durations.push(duration);
    }

    match fastest_index(&durations) {
        Some(index) => {
            direct::register_tiling(&client.id(), &problem.config, variants[index]);
            Ok(Applicability::Applicable(durations[index].unwrap_or_default()))
        }
        None => Ok(Applicability::not_applicable("no direct tiling can run the problem")),
    }
}

fn record<S: ConvolutionServer, A: Debug>(
    client: &ComputeClient<S>,
    results: &mut Vec<AlgorithmPerf<A>>,
    algorithm: A,
    time: Duration,
    memory: usize,
) {
    client.log_autotune(
        &format!("{algorithm:?} took {time:?} with a workspace of {memory} bytes"),
        true,
    );
    results.push(AlgorithmPerf::new(algorithm, time, memory));
}

fn skip<S: ConvolutionServer, A: Debug>(client: &ComputeClient<S>, algorithm: A, reason: impl AsRef<str>) {
    let message = format!("Skipping {algorithm:?}: {}", reason.as_ref());
    log::debug!("{message}");
    client.log_autotune(&message, true);
}

fn finish<S: ConvolutionServer, A: Debug>(
    client: &ComputeClient<S>,
    problem: &ConvProblem,
    results: Vec<AlgorithmPerf<A>>,
    request_count: usize,
) -> Result<Vec<AlgorithmPerf<A>>, ConvolutionError> {
    if results.is_empty() {
        return Err(ConvolutionError::unsupported(format!(
            "no algorithm can run {}",
            problem.config
        )));
    }

    let results = rank(results, request_count);
    if let Some(best) = results.first() {
        client.log_autotune(
            &format!(
                "{} - fastest is {:?} in {:?}",
                problem.config, best.algorithm, best.time
            ),
            false,
        );
    }

    Ok(results)
}
