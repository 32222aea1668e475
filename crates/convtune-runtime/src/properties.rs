/// Properties of the device a [compute server](crate::server::ComputeServer) runs on.
#[derive(new, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceProperties {
    /// Human readable device name.
    pub name: String,
    /// Number of compute units, used to size persistent kernels.
    pub compute_units: u32,
    /// Maximum number of work items in a single work group.
    pub max_work_group_size: usize,
    /// Local (shared) memory available to a work group, in bytes.
    pub local_memory_size: usize,
}
