#![warn(missing_docs)]

//! Runtime crate for convtune: the accelerator context seen by the convolution engine.
//!
//! It provides the [compute server](server::ComputeServer) abstraction, the cloneable
//! [compute client](client::ComputeClient) sharing one compiled-kernel registry per context,
//! the scoped [profiling guard](profiling::ProfilingGuard), the autotune state and the global
//! configuration and loggers.

#[macro_use]
extern crate derive_new;

/// Identifiers for buffers, clients and kernels.
pub mod id;

/// Compute client module.
pub mod client;
/// Compute server module.
pub mod server;

/// Compiled kernel registry.
pub mod cache;
/// Kernel launch plans.
pub mod kernel;
/// Scoped device profiling.
pub mod profiling;

/// Autotune module
pub mod tune;

/// Global configuration.
pub mod config;
/// Loggers used by the compute client.
pub mod logging;

mod properties;
mod validation;

pub use properties::*;
pub use validation::*;
