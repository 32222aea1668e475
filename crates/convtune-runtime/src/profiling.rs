use crate::{client::ComputeClient, server::ComputeServer};

/// Keeps kernel profiling enabled on a client for as long as it lives.
///
/// On drop, the profiling state that was active before the guard was created is restored and
/// the recorded kernel time is reset. This happens on every exit path, including early returns
/// with `?`.
#[must_use = "profiling is disabled again as soon as the guard is dropped"]
pub struct ProfilingGuard<'a, S: ComputeServer> {
    client: &'a ComputeClient<S>,
    prior: bool,
}

impl<'a, S: ComputeServer> ProfilingGuard<'a, S> {
    /// Enable profiling on `client`.
    pub fn new(client: &'a ComputeClient<S>) -> Self {
        let prior = client.enable_profiling(true);
        Self { client, prior }
    }
}

impl<S: ComputeServer> Drop for ProfilingGuard<'_, S> {
    fn drop(&mut self) {
        self.client.enable_profiling(self.prior);
        self.client.reset_kernel_time();
    }
}
