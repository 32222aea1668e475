use crate::ConvolutionError;
use convtune_runtime::{
    client::ComputeClient,
    kernel::CompiledKernel,
    server::{Bindings, ComputeServer},
};
use core::time::Duration;

type Launch<K> = (CompiledKernel<K>, Bindings);

/// Progress of a [staged launch](StagedLaunch). Kernels not launched yet are owned by the state
/// that launches them.
enum StageState<K> {
    /// Nothing was launched.
    NotStarted {
        main: Launch<K>,
        reduction: Option<Launch<K>>,
    },
    /// The main kernel ran and took `main`.
    MainDispatched { main: Duration, reduction: Launch<K> },
    /// The reduction kernel ran. `total` covers both kernels.
    ReductionDispatched { main: Duration, total: Duration },
    /// Every kernel ran.
    Done { total: Duration },
}

/// A main kernel optionally followed by a reduction kernel, timed as one operation.
///
/// The device timer is reset before the main kernel. After the reduction, the main kernel time
/// is accumulated into the device timer so it reports the time of both kernels.
pub struct StagedLaunch<'a, S: ComputeServer> {
    client: &'a ComputeClient<S>,
    state: StageState<S::Kernel>,
}

impl<'a, S: ComputeServer> StagedLaunch<'a, S> {
    /// Create a launch of `main`, followed by `reduction` when present.
    pub fn new(
        client: &'a ComputeClient<S>,
        main: Launch<S::Kernel>,
        reduction: Option<Launch<S::Kernel>>,
    ) -> Self {
        Self {
            client,
            state: StageState::NotStarted { main, reduction },
        }
    }

    fn step(self) -> Result<Self, ConvolutionError> {
        let client = self.client;
        let state = match self.state {
            StageState::NotStarted {
                main: (kernel, bindings),
                reduction,
            } => {
                client.reset_kernel_time();
                client.launch(&kernel, bindings)?;
                let main = client.kernel_time();

                match reduction {
                    Some(reduction) => StageState::MainDispatched { main, reduction },
                    None => StageState::Done { total: main },
                }
            }
            StageState::MainDispatched {
                main,
                reduction: (kernel, bindings),
            } => {
                client.launch(&kernel, bindings)?;
                client.accumulate_kernel_time(main);

                StageState::ReductionDispatched {
                    main,
                    total: client.kernel_time(),
                }
            }
            StageState::ReductionDispatched { main, total } => {
                log::trace!("main kernel took {main:?} of {total:?}");
                StageState::Done { total }
            }
            done @ StageState::Done { .. } => done,
        };

        Ok(Self { client, state })
    }

    /// Launch every kernel and return the total time.
    pub fn run(mut self) -> Result<Duration, ConvolutionError> {
        loop {
            if let StageState::Done { total } = self.state {
                return Ok(total);
            }
            self = self.step()?;
        }
    }
}
