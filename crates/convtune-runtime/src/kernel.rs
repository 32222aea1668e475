use core::fmt::Display;
use std::sync::Arc;

/// Three dimensional work size, used for both the local (work group) and the global size of a
/// launch.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkSize {
    /// Size in the x dimension.
    pub x: usize,
    /// Size in the y dimension.
    pub y: usize,
    /// Size in the z dimension.
    pub z: usize,
}

impl WorkSize {
    /// A one dimensional work size.
    pub const fn new_1d(x: usize) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// A two dimensional work size.
    pub const fn new_2d(x: usize, y: usize) -> Self {
        Self { x, y, z: 1 }
    }

    /// Total number of work items.
    pub fn count(&self) -> usize {
        self.x * self.y * self.z
    }

    /// Whether every dimension of `self` divides the matching dimension of `other`.
    pub fn is_divisor_of(&self, other: &WorkSize) -> bool {
        self.x != 0
            && self.y != 0
            && self.z != 0
            && other.x % self.x == 0
            && other.y % self.y == 0
            && other.z % self.z == 0
    }
}

impl From<WorkSize> for (usize, usize, usize) {
    fn from(value: WorkSize) -> Self {
        (value.x, value.y, value.z)
    }
}

/// Ordered compile time definitions passed to the device compiler.
///
/// Definitions keep their insertion order. Defining the same name twice replaces the value in
/// place.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileOptions {
    defines: Vec<(String, usize)>,
}

impl CompileOptions {
    /// Add or replace a definition.
    pub fn define(mut self, name: &str, value: usize) -> Self {
        match self.defines.iter_mut().find(|(key, _)| key == name) {
            Some((_, old)) => *old = value,
            None => self.defines.push((name.to_string(), value)),
        }
        self
    }

    /// The value of a definition, if present.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.defines
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    /// Iterate over the definitions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.defines.iter().map(|(key, value)| (key.as_str(), *value))
    }
}

impl Display for CompileOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            f.write_fmt(format_args!("-D{name}={value}"))?;
        }
        Ok(())
    }
}

/// Everything needed to build and launch a kernel: which program and entry point, the compile
/// time definitions and the launch geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelPlan {
    /// Name of the program (source file) the kernel is built from.
    pub program: String,
    /// Entry point inside the program.
    pub entry: String,
    /// Compile time definitions.
    pub options: CompileOptions,
    /// Local work size.
    pub local: WorkSize,
    /// Global work size.
    pub global: WorkSize,
}

impl KernelPlan {
    /// Create a new kernel plan.
    pub fn new(
        program: impl Into<String>,
        entry: impl Into<String>,
        options: CompileOptions,
        local: WorkSize,
        global: WorkSize,
    ) -> Self {
        Self {
            program: program.into(),
            entry: entry.into(),
            options,
            local,
            global,
        }
    }

    /// Number of work groups launched.
    pub fn work_groups(&self) -> usize {
        let local = self.local.count();
        if local == 0 {
            return 0;
        }
        self.global.count() / local
    }
}

/// A kernel, compiled by the device, along with the plan it was built from.
#[derive(Debug, Clone)]
pub struct CompiledKernel<K> {
    /// The plan used to build the kernel.
    pub plan: Arc<KernelPlan>,
    /// The device representation of the kernel.
    pub kernel: K,
}

impl<K> CompiledKernel<K> {
    /// Create a new compiled kernel.
    pub fn new(plan: KernelPlan, kernel: K) -> Self {
        Self {
            plan: Arc::new(plan),
            kernel,
        }
    }

    /// Entry point name of the kernel.
    pub fn entry(&self) -> &str {
        &self.plan.entry
    }
}

impl<K> Display for CompiledKernel<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let plan = &self.plan;
        f.write_fmt(format_args!(
            "[START_KERNEL_COMPILATION]
program: {}
entry: {}
local: ({}, {}, {})
global: ({}, {}, {})
options: {}
[END_KERNEL_COMPILATION]",
            plan.program,
            plan.entry,
            plan.local.x,
            plan.local.y,
            plan.local.z,
            plan.global.x,
            plan.global.y,
            plan.global.z,
            plan.options,
        ))
    }
}
