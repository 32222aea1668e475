use super::kernels::{self, KernelRun};
use convtune::{ConvolutionServer, GemmCall, GemmGeometry, GemmPlan, Im2ColArgs};
use convtune_runtime::{
    DeviceProperties,
    id::BufferId,
    kernel::{CompiledKernel, KernelPlan},
    server::{Binding, Bindings, CompilationError, ComputeServer, Handle, LaunchError},
};
use core::time::Duration;
use hashbrown::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Programs the dummy device can build.
const PROGRAMS: [&str; 6] = [
    "conv_direct_1x1",
    "conv_direct_11x11",
    "conv_direct_generic",
    "conv_winograd_3x3",
    "conv_bwd_weights",
    "conv_bwd_bias",
];

/// Counters shared between the server and the test, which cannot reach the server once it is
/// owned by the client.
#[derive(Debug, Default, Clone)]
pub struct DummyStats {
    compiled: Arc<AtomicUsize>,
    launched: Arc<AtomicUsize>,
    gemm_runs: Arc<AtomicUsize>,
    gemm_searches: Arc<AtomicUsize>,
    unfolds: Arc<AtomicUsize>,
}

impl DummyStats {
    pub fn compiled(&self) -> usize {
        self.compiled.load(Ordering::Relaxed)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::Relaxed)
    }

    pub fn gemm_runs(&self) -> usize {
        self.gemm_runs.load(Ordering::Relaxed)
    }

    pub fn gemm_searches(&self) -> usize {
        self.gemm_searches.load(Ordering::Relaxed)
    }

    pub fn unfolds(&self) -> usize {
        self.unfolds.load(Ordering::Relaxed)
    }

    /// Everything submitted to the device.
    pub fn submitted(&self) -> usize {
        self.launched() + self.gemm_runs() + self.unfolds()
    }
}

/// A compiled dummy kernel: the entry point and its definitions.
#[derive(Debug, Clone)]
pub struct DummyKernel {
    pub plan: Arc<KernelPlan>,
}

/// The dummy server runs every kernel on the CPU, in f32, and reports a simulated time
/// proportional to the work done so timings are deterministic.
#[derive(Debug)]
pub struct DummyServer {
    memory: HashMap<BufferId, Vec<u8>>,
    properties: DeviceProperties,
    gemm: bool,
    profiling: bool,
    kernel_time: Duration,
    stats: DummyStats,
}

impl DummyServer {
    pub fn new(properties: DeviceProperties, gemm: bool) -> Self {
        Self {
            memory: HashMap::new(),
            properties,
            gemm,
            profiling: false,
            kernel_time: Duration::ZERO,
            stats: DummyStats::default(),
        }
    }

    pub fn stats(&self) -> DummyStats {
        self.stats.clone()
    }

    fn load(&self, binding: &Binding) -> Result<Vec<f32>, LaunchError> {
        let bytes = self.region(binding)?;
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    fn store(&mut self, binding: &Binding, values: &[f32]) -> Result<(), LaunchError> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let memory = self
            .memory
            .get_mut(&binding.id)
            .ok_or_else(|| invalid(binding, "unknown buffer"))?;
        let end = binding.offset + bytes.len();
        if end > memory.len() {
            return Err(invalid(binding, "write out of bounds"));
        }

        memory[binding.offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn region(&self, binding: &Binding) -> Result<&[u8], LaunchError> {
        let memory = self
            .memory
            .get(&binding.id)
            .ok_or_else(|| invalid(binding, "unknown buffer"))?;
        let end = binding.offset + binding.size;

        memory
            .get(binding.offset..end)
            .ok_or_else(|| invalid(binding, "range out of bounds"))
    }

    fn record(&mut self, time: Duration) -> Duration {
        if self.profiling {
            self.kernel_time = time;
            time
        } else {
            Duration::ZERO
        }
    }
}

fn invalid(binding: &Binding, reason: &str) -> LaunchError {
    LaunchError::InvalidBinding {
        reason: format!("{reason}: {binding:?}"),
    }
}

impl ComputeServer for DummyServer {
    type Kernel = DummyKernel;

    fn compile(&mut self, plan: &KernelPlan) -> Result<Self::Kernel, CompilationError> {
        if !PROGRAMS.contains(&plan.program.as_str()) {
            return Err(CompilationError::UnknownProgram {
                program: plan.program.clone(),
            });
        }

        self.stats.compiled.fetch_add(1, Ordering::Relaxed);
        Ok(DummyKernel {
            plan: Arc::new(plan.clone()),
        })
    }

    fn launch(
        &mut self,
        kernel: &CompiledKernel<Self::Kernel>,
        bindings: Bindings,
    ) -> Result<(), LaunchError> {
        let mut buffers = bindings
            .buffers
            .iter()
            .map(|binding| self.load(binding))
            .collect::<Result<Vec<_>, _>>()?;

        let KernelRun { output, work } = kernels::run(
            &kernel.kernel.plan,
            &bindings.scalars,
            &mut buffers,
        )
        .map_err(|reason| LaunchError::Unknown { reason })?;

        self.store(&bindings.buffers[output], &buffers[output])?;
        self.stats.launched.fetch_add(1, Ordering::Relaxed);
        self.record(kernels::simulated_time(&kernel.kernel.plan, work));

        Ok(())
    }

    fn create(&mut self, data: &[u8]) -> Result<Handle, LaunchError> {
        let handle = Handle::new(BufferId::new(), data.len());
        self.memory.insert(handle.id, data.to_vec());
        Ok(handle)
    }

    fn empty(&mut self, size: usize) -> Result<Handle, LaunchError> {
        let handle = Handle::new(BufferId::new(), size);
        self.memory.insert(handle.id, vec![0; size]);
        Ok(handle)
    }

    fn read(&mut self, binding: Binding) -> Result<Vec<u8>, LaunchError> {
        self.region(&binding).map(|bytes| bytes.to_vec())
    }

    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn profiling_enabled(&self) -> bool {
        self.profiling
    }

    fn enable_profiling(&mut self, enabled: bool) {
        self.profiling = enabled;
    }

    fn reset_kernel_time(&mut self) {
        self.kernel_time = Duration::ZERO;
    }

    fn kernel_time(&self) -> Duration {
        self.kernel_time
    }

    fn accumulate_kernel_time(&mut self, time: Duration) {
        self.kernel_time += time;
    }
}

impl ConvolutionServer for DummyServer {
    fn im2col(
        &mut self,
        args: &Im2ColArgs,
        input: Binding,
        col: Binding,
    ) -> Result<Duration, LaunchError> {
        let x = self.load(&input)?;
        let mut columns = self.load(&col)?;

        kernels::im2col(args, &x, &mut columns).map_err(|reason| LaunchError::Unknown { reason })?;

        self.store(&col, &columns)?;
        self.stats.unfolds.fetch_add(1, Ordering::Relaxed);
        Ok(self.record(kernels::unfold_time(args)))
    }

    fn gemm_available(&self) -> bool {
        self.gemm
    }

    fn find_gemm_plan(
        &mut self,
        geometry: &GemmGeometry,
        _a: Binding,
        _b: Binding,
        _c: Binding,
    ) -> Result<GemmPlan, LaunchError> {
        if !self.gemm {
            return Err(LaunchError::Unknown {
                reason: "no GEMM on this device".to_string(),
            });
        }

        self.stats.gemm_searches.fetch_add(1, Ordering::Relaxed);
        Ok(GemmPlan::new(*geometry, 1))
    }

    fn run_gemm(&mut self, plan: &GemmPlan, call: GemmCall) -> Result<(), LaunchError> {
        let a = self.load(&call.a)?;
        let b = self.load(&call.b)?;
        let mut c = self.load(&call.c)?;

        kernels::gemm(&plan.geometry, &a, &b, &mut c, call.accumulate)
            .map_err(|reason| LaunchError::Unknown { reason })?;

        self.store(&call.c, &c)?;
        self.stats.gemm_runs.fetch_add(1, Ordering::Relaxed);
        self.record(kernels::gemm_time(&plan.geometry));

        Ok(())
    }
}
