use crate::{
    BackwardDataAlgorithm, BackwardWeightsAlgorithm, ConvolutionDescriptor, ConvolutionError,
    ConvolutionServer, Direction, ForwardAlgorithm, TensorHandleRef, Workspace,
    launch::{self, GemmOperands},
    strategy::{
        Applicability, backward_weights::BackwardWeightsDirectStrategy, direct::DirectStrategy,
        gemm::GemmStrategy, winograd::WinogradStrategy,
    },
    validate::validate,
};
use convtune_runtime::client::ComputeClient;

impl ConvolutionDescriptor {
    /// Compute `y = conv(x, w)` with `algorithm`.
    ///
    /// Kernels compiled by a previous search or launch of the same problem are reused.
    pub fn forward<S: ConvolutionServer>(
        &self,
        client: &ComputeClient<S>,
        x: TensorHandleRef<'_>,
        w: TensorHandleRef<'_>,
        y: TensorHandleRef<'_>,
        algorithm: ForwardAlgorithm,
        workspace: Workspace<'_>,
    ) -> Result<(), ConvolutionError> {
        let problem = validate(self, Direction::Forward, &x, &w, &y)?;

        match algorithm {
            ForwardAlgorithm::Direct => {
                let strategy = applicable(
                    DirectStrategy::tuned(&problem, client.properties(), &client.id()),
                )?;
                launch::direct(client, &problem, &strategy, x.binding(), w.binding(), y.binding())?;
            }
            ForwardAlgorithm::Winograd => {
                let strategy = applicable(WinogradStrategy::new(&problem, client.properties()))?;
                launch::winograd(client, &problem, &strategy, x.binding(), w.binding(), y.binding())?;
            }
            ForwardAlgorithm::Gemm => {
                check_gemm(client)?;
                check_workspace(&workspace, self.forward_workspace_size(w.desc, y.desc))?;

                let strategy = applicable(GemmStrategy::new(&problem, true))?;
                let operands = GemmOperands {
                    input: x.binding(),
                    other: w.binding(),
                    output: y.binding(),
                };
                launch::gemm(client, &problem, &strategy, operands, &workspace, problem.shape.n)?;
            }
            ForwardAlgorithm::Fft => {
                log::info!("FFT convolution is not implemented, nothing is launched");
            }
        }

        Ok(())
    }

    /// Compute `dx` from `dy` and `w` with `algorithm`.
    pub fn backward_data<S: ConvolutionServer>(
        &self,
        client: &ComputeClient<S>,
        dy: TensorHandleRef<'_>,
        w: TensorHandleRef<'_>,
        dx: TensorHandleRef<'_>,
        algorithm: BackwardDataAlgorithm,
    ) -> Result<(), ConvolutionError> {
        let problem = validate(self, Direction::BackwardData, &dx, &w, &dy)?;

        match algorithm {
            BackwardDataAlgorithm::Direct => {
                let strategy = applicable(
                    DirectStrategy::tuned(&problem, client.properties(), &client.id()),
                )?;
                launch::direct(client, &problem, &strategy, dy.binding(), w.binding(), dx.binding())?;
            }
        }

        Ok(())
    }

    /// Compute `dw` from `dy` and `x` with `algorithm`.
    ///
    /// `dw` is overwritten, not accumulated into.
    pub fn backward_weights<S: ConvolutionServer>(
        &self,
        client: &ComputeClient<S>,
        dy: TensorHandleRef<'_>,
        x: TensorHandleRef<'_>,
        dw: TensorHandleRef<'_>,
        algorithm: BackwardWeightsAlgorithm,
        workspace: Workspace<'_>,
    ) -> Result<(), ConvolutionError> {
        let problem = validate(self, Direction::BackwardWeights, &x, &dw, &dy)?;

        match algorithm {
            BackwardWeightsAlgorithm::Gemm => {
                check_gemm(client)?;
                check_workspace(
                    &workspace,
                    self.backward_weights_workspace_size_gemm(dy.desc, dw.desc),
                )?;

                let strategy = applicable(GemmStrategy::new(&problem, true))?;
                let operands = GemmOperands {
                    input: x.binding(),
                    other: dy.binding(),
                    output: dw.binding(),
                };
                launch::gemm(client, &problem, &strategy, operands, &workspace, problem.shape.n)?;
            }
            BackwardWeightsAlgorithm::Direct => {
                let strategy =
                    applicable(BackwardWeightsDirectStrategy::new(&problem, client.properties()))?;
                check_workspace(&workspace, strategy.workspace())?;

                launch::backward_weights_direct(
                    client,
                    &problem,
                    &strategy,
                    dy.binding(),
                    x.binding(),
                    dw.binding(),
                    &workspace,
                )?;
            }
        }

        Ok(())
    }
}

fn applicable<T>(strategy: Applicability<T>) -> Result<T, ConvolutionError> {
    match strategy {
        Applicability::Applicable(strategy) => Ok(strategy),
        Applicability::NotApplicable(reason) => Err(ConvolutionError::unsupported(reason)),
    }
}

fn check_workspace(workspace: &Workspace<'_>, required: usize) -> Result<(), ConvolutionError> {
    if !workspace.fits(required) {
        return Err(ConvolutionError::bad_parameter(format!(
            "a workspace of {required} bytes is required, got {}",
            workspace.size()
        )));
    }
    Ok(())
}

fn check_gemm<S: ConvolutionServer>(client: &ComputeClient<S>) -> Result<(), ConvolutionError> {
    if !client.with_server(|server| server.gemm_available()) {
        return Err(ConvolutionError::GemmUnavailable);
    }
    Ok(())
}
