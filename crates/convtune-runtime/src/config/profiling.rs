use super::logger::{LogLevel, LoggerConfig};

/// Configuration for kernel profiling logs.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProfilingConfig {
    /// Logger for profiled kernels.
    #[serde(default)]
    pub logger: LoggerConfig<ProfilingLogLevel>,
}

/// Verbosity of the profiling logger.
#[derive(Default, Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum ProfilingLogLevel {
    /// Nothing is logged.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// Only a summary table is logged.
    #[serde(rename = "basic")]
    Basic,
    /// Every profiled kernel is logged along with the summary.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for ProfilingLogLevel {}
