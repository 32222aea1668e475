use crate::{
    DeviceProperties,
    kernel::KernelPlan,
    server::{LaunchError, ResourceLimitError},
};

/// Validate the local work size of a kernel fits within the hardware limits
pub fn validate_work_group(
    properties: &DeviceProperties,
    plan: &KernelPlan,
) -> Result<(), LaunchError> {
    let requested = plan.local.count();
    let max = properties.max_work_group_size;
    if requested > max {
        Err(ResourceLimitError::WorkGroupSize { requested, max }.into())
    } else {
        Ok(())
    }
}

/// Validate the global work size is a whole number of work groups
pub fn validate_work_size(plan: &KernelPlan) -> Result<(), LaunchError> {
    let local = plan.local;
    let global = plan.global;

    if local.is_divisor_of(&global) {
        Ok(())
    } else {
        Err(ResourceLimitError::WorkSizeMismatch {
            global: global.into(),
            local: local.into(),
        }
        .into())
    }
}
