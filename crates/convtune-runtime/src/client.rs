use crate::{
    DeviceProperties,
    cache::KernelCache,
    id::{ClientId, KernelId},
    kernel::{CompiledKernel, KernelPlan},
    logging::ServerLogger,
    profiling::ProfilingGuard,
    server::{Binding, Bindings, CompilationError, ComputeServer, Handle, LaunchError},
    validate_work_group, validate_work_size,
};
use core::{fmt::Display, time::Duration};
use std::sync::Arc;

/// The ComputeClient is the entry point to require tasks from the ComputeServer.
///
/// Every clone of a client talks to the same server and shares the same compiled kernel
/// registry, so a kernel compiled through one clone is reused by all of them.
#[derive(Debug)]
pub struct ComputeClient<Server: ComputeServer> {
    server: Arc<spin::Mutex<Server>>,
    kernels: Arc<KernelCache<Server::Kernel>>,
    logger: Arc<spin::Mutex<ServerLogger>>,
    properties: Arc<DeviceProperties>,
    id: ClientId,
}

impl<S: ComputeServer> Clone for ComputeClient<S> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            kernels: self.kernels.clone(),
            logger: self.logger.clone(),
            properties: self.properties.clone(),
            id: self.id,
        }
    }
}

impl<Server> ComputeClient<Server>
where
    Server: ComputeServer,
{
    /// Create a new client, logging with the global configuration.
    pub fn new(server: Server) -> Self {
        Self::with_logger(server, ServerLogger::default())
    }

    /// Create a new client with an explicit logger.
    pub fn with_logger(server: Server, logger: ServerLogger) -> Self {
        let properties = server.properties().clone();

        Self {
            server: Arc::new(spin::Mutex::new(server)),
            kernels: Arc::new(KernelCache::default()),
            logger: Arc::new(spin::Mutex::new(logger)),
            properties: Arc::new(properties),
            id: ClientId::new(),
        }
    }

    /// Identifier shared by every clone of this client.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Get the device properties.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Given a resource, stores it and returns the resource handle.
    pub fn create(&self, data: &[u8]) -> Result<Handle, LaunchError> {
        self.server.lock().create(data)
    }

    /// Reserves `size` bytes in the storage, and returns a handle over them.
    pub fn empty(&self, size: usize) -> Result<Handle, LaunchError> {
        self.server.lock().empty(size)
    }

    /// Read the bytes behind a binding.
    pub fn read(&self, binding: Binding) -> Result<Vec<u8>, LaunchError> {
        self.server.lock().read(binding)
    }

    /// Fetch the compiled kernel registered for `id`, compiling the plan returned by `plan` when
    /// there is none.
    ///
    /// Compilation happens outside of the registry lock. When two callers race on the same id,
    /// both compile but only the first registered kernel is kept and returned to both.
    pub fn get_or_compile<F>(
        &self,
        id: KernelId,
        plan: F,
    ) -> Result<CompiledKernel<Server::Kernel>, CompilationError>
    where
        F: FnOnce() -> KernelPlan,
    {
        if let Some(kernel) = self.kernels.get(&id) {
            return Ok(kernel);
        }

        let plan = plan();
        let kernel = self.server.lock().compile(&plan)?;
        let compiled = CompiledKernel::new(plan, kernel);

        log::debug!("Compiled kernel {} for {id}", compiled.entry());
        self.logger.lock().log_compilation(&compiled);

        Ok(self.kernels.insert_if_absent(id, compiled))
    }

    /// Whether a kernel is already compiled for `id`.
    pub fn is_compiled(&self, id: &KernelId) -> bool {
        self.kernels.contains(id)
    }

    /// Number of compiled kernels registered for this client.
    pub fn compiled_kernels(&self) -> usize {
        self.kernels.len()
    }

    /// Launch a compiled kernel with the given bindings.
    ///
    /// The work sizes are validated against the device limits before anything is submitted.
    pub fn launch(
        &self,
        kernel: &CompiledKernel<Server::Kernel>,
        bindings: Bindings,
    ) -> Result<(), LaunchError> {
        validate_work_group(&self.properties, &kernel.plan)?;
        validate_work_size(&kernel.plan)?;

        let profiled = {
            let mut server = self.server.lock();
            server.launch(kernel, bindings)?;
            server.profiling_enabled().then(|| server.kernel_time())
        };

        if let Some(duration) = profiled {
            self.logger
                .lock()
                .register_profiled(kernel.entry(), duration);
        }

        Ok(())
    }

    /// Enable profiling until the returned guard is dropped.
    pub fn profiling(&self) -> ProfilingGuard<'_, Server> {
        ProfilingGuard::new(self)
    }

    /// Whether kernel timings are recorded.
    pub fn profiling_enabled(&self) -> bool {
        self.server.lock().profiling_enabled()
    }

    /// Turn kernel timing on or off, returning the previous state.
    pub fn enable_profiling(&self, enabled: bool) -> bool {
        let mut server = self.server.lock();
        let prior = server.profiling_enabled();
        server.enable_profiling(enabled);
        prior
    }

    /// Forget the recorded kernel time.
    pub fn reset_kernel_time(&self) {
        self.server.lock().reset_kernel_time();
    }

    /// The recorded kernel time.
    pub fn kernel_time(&self) -> Duration {
        self.server.lock().kernel_time()
    }

    /// Add `time` to the recorded kernel time.
    pub fn accumulate_kernel_time(&self, time: Duration) {
        self.server.lock().accumulate_kernel_time(time);
    }

    /// Run `func` with exclusive access to the server.
    ///
    /// Used to reach capabilities that are not part of [ComputeServer], such as library
    /// primitives implemented by a specific server.
    pub fn with_server<R, F: FnOnce(&mut Server) -> R>(&self, func: F) -> R {
        let mut server = self.server.lock();
        func(&mut server)
    }

    /// Log an autotune message.
    pub fn log_autotune<I: Display>(&self, msg: &I, detailed: bool) {
        self.logger.lock().log_autotune(msg, detailed);
    }

    /// Log the profiling summary and reset it.
    pub fn profile_summary(&self) {
        self.logger.lock().profile_summary();
    }
}
