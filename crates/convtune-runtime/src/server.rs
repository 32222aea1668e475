use crate::{
    DeviceProperties,
    id::BufferId,
    kernel::{CompiledKernel, KernelPlan},
};
use core::{fmt::Debug, time::Duration};
use thiserror::Error;

/// The compute server is responsible for handling resources and computations over resources.
///
/// Everything in the server is mutable, therefore it should be solely accessed through the
/// [compute client](crate::client::ComputeClient) to keep the compiled kernel registry and
/// profiling state consistent between clones of the client.
pub trait ComputeServer: Send + core::fmt::Debug + 'static
where
    Self: Sized,
{
    /// The kernel type once compiled by the device.
    type Kernel: Clone + Send + Sync + Debug + 'static;

    /// Build a kernel from its launch plan.
    fn compile(&mut self, plan: &KernelPlan) -> Result<Self::Kernel, CompilationError>;

    /// Enqueue a kernel with the given bindings.
    ///
    /// When profiling is enabled, the server must record the kernel's execution time so it can
    /// be read back with [kernel_time](ComputeServer::kernel_time).
    fn launch(
        &mut self,
        kernel: &CompiledKernel<Self::Kernel>,
        bindings: Bindings,
    ) -> Result<(), LaunchError>;

    /// Given a resource as bytes, stores it and returns the resource handle.
    fn create(&mut self, data: &[u8]) -> Result<Handle, LaunchError>;

    /// Reserves `size` bytes in the storage, and returns a handle over them.
    fn empty(&mut self, size: usize) -> Result<Handle, LaunchError>;

    /// Read the bytes behind a binding.
    fn read(&mut self, binding: Binding) -> Result<Vec<u8>, LaunchError>;

    /// The properties of the device this server runs on.
    fn properties(&self) -> &DeviceProperties;

    /// Whether kernel timings are currently recorded.
    fn profiling_enabled(&self) -> bool;

    /// Turn kernel timing on or off.
    fn enable_profiling(&mut self, enabled: bool);

    /// Forget the last recorded kernel time.
    fn reset_kernel_time(&mut self);

    /// The last recorded kernel time, or the accumulated time since the last reset when
    /// [accumulate_kernel_time](ComputeServer::accumulate_kernel_time) was used.
    fn kernel_time(&self) -> Duration;

    /// Add `time` to the recorded kernel time.
    fn accumulate_kernel_time(&mut self, time: Duration);
}

/// Server handle containing the [buffer id](BufferId) and its size in bytes.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    /// Buffer id.
    pub id: BufferId,
    /// Size in bytes.
    pub size: usize,
}

impl Handle {
    /// Convert the [handle](Handle) into a [binding](Binding) covering the whole buffer.
    pub fn binding(&self) -> Binding {
        Binding {
            id: self.id,
            offset: 0,
            size: self.size,
        }
    }

    /// A [binding](Binding) starting at `offset` bytes and covering `size` bytes.
    pub fn binding_range(&self, offset: usize, size: usize) -> Binding {
        Binding {
            id: self.id,
            offset,
            size,
        }
    }
}

/// A binding is a view over a region of a buffer, used when launching kernels.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Buffer id.
    pub id: BufferId,
    /// Offset in bytes.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
}

impl Binding {
    /// Shift the start of the binding by `offset` bytes.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset += offset;
        self.size = self.size.saturating_sub(offset);
        self
    }
}

/// A scalar argument passed by value to a kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarArg {
    /// Signed 32 bit integer.
    I32(i32),
    /// 32 bit float.
    F32(f32),
}

impl ScalarArg {
    /// The scalar as an integer. Floats are truncated.
    pub fn as_i32(&self) -> i32 {
        match self {
            ScalarArg::I32(val) => *val,
            ScalarArg::F32(val) => *val as i32,
        }
    }

    /// The scalar as a float.
    pub fn as_f32(&self) -> f32 {
        match self {
            ScalarArg::I32(val) => *val as f32,
            ScalarArg::F32(val) => *val,
        }
    }
}

/// Bindings to execute a kernel.
///
/// Buffers and scalars keep the order in which they were added, which is the order of the
/// kernel arguments.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    /// Buffer bindings
    pub buffers: Vec<Binding>,
    /// Scalar bindings
    pub scalars: Vec<ScalarArg>,
}

impl Bindings {
    /// Create a new bindings struct
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer binding
    pub fn with_buffer(mut self, binding: Binding) -> Self {
        self.buffers.push(binding);
        self
    }

    /// Extend the buffers with `bindings`
    pub fn with_buffers(mut self, bindings: impl IntoIterator<Item = Binding>) -> Self {
        self.buffers.extend(bindings);
        self
    }

    /// Add a scalar parameter
    pub fn with_scalar(mut self, scalar: ScalarArg) -> Self {
        self.scalars.push(scalar);
        self
    }

    /// Extend the scalars with `scalars`
    pub fn with_scalars(mut self, scalars: impl IntoIterator<Item = ScalarArg>) -> Self {
        self.scalars.extend(scalars);
        self
    }
}

/// The kernel could not be built by the device compiler.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum CompilationError {
    /// The source program is not known to the device.
    #[error("Unknown program `{program}`")]
    UnknownProgram {
        /// Name of the program.
        program: String,
    },
    /// The device compiler rejected the program.
    #[error("Failed to build `{program}::{entry}`\nCaused by:\n  {reason}")]
    Rejected {
        /// Name of the program.
        program: String,
        /// Kernel entry point.
        entry: String,
        /// The compiler message.
        reason: String,
    },
}

/// Kernel Launch Errors.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The given kernel can't be compiled.
    #[error("A compilation error happened during launch\nCaused by:\n  {0}")]
    CompilationError(#[from] CompilationError),

    /// The server is out of memory.
    #[error("An out-of-memory error happened during launch\nCaused by:\n  {reason}")]
    OutOfMemory {
        /// The caused of the memory error.
        reason: String,
    },

    /// Too many resources were requested
    #[error("Too many resources were requested during launch\n{0}")]
    TooManyResources(#[from] ResourceLimitError),

    /// A binding refers to memory that does not exist or is too small.
    #[error("Invalid binding during launch\nCaused by:\n  {reason}")]
    InvalidBinding {
        /// What is wrong with the binding.
        reason: String,
    },

    /// Unknown launch error.
    #[error("An unknown error happened during launch\nCaused by:\n  {reason}")]
    Unknown {
        /// The caused of the unknown error.
        reason: String,
    },
}

/// Resource limit errors.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum ResourceLimitError {
    /// Work group exceeds maximum
    #[error(
        "Work group size exceeds maximum.\nRequested {requested} work items, max is {max}."
    )]
    WorkGroupSize {
        /// Requested value
        requested: usize,
        /// Maximum value
        max: usize,
    },
    /// The global work size is not a multiple of the local work size.
    #[error(
        "Global work size {global:?} is not a multiple of the local work size {local:?}."
    )]
    WorkSizeMismatch {
        /// Global work size
        global: (usize, usize, usize),
        /// Local work size
        local: (usize, usize, usize),
    },
}

impl core::fmt::Debug for CompilationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl core::fmt::Debug for LaunchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl core::fmt::Debug for ResourceLimitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}
