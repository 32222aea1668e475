/// Autotune config module.
pub mod autotune;
/// Compilation config module.
pub mod compilation;
/// Profiling config module.
pub mod profiling;

mod base;
mod logger;

pub use base::*;
pub use logger::{BinaryLogLevel, LogCrateLevel, LogLevel, Logger, LoggerConfig};
