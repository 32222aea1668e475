use super::logger::{BinaryLogLevel, LoggerConfig};

/// Configuration for kernel compilation logging.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CompilationConfig {
    /// Logger for compiled kernels.
    #[serde(default)]
    pub logger: LoggerConfig<CompilationLogLevel>,
}

/// Compilation logging is either on or off.
pub type CompilationLogLevel = BinaryLogLevel;
