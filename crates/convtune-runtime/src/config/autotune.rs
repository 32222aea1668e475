use super::logger::{LogLevel, LoggerConfig};

/// Configuration for the algorithm search.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AutotuneConfig {
    /// Logger for search results and tuning decisions.
    #[serde(default)]
    pub logger: LoggerConfig<AutotuneLogLevel>,

    /// How much work the search is allowed to do.
    #[serde(default)]
    pub level: AutotuneLevel,
}

/// Verbosity of the autotune logger.
#[derive(Default, Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum AutotuneLogLevel {
    /// Nothing is logged.
    #[serde(rename = "disabled")]
    Disabled,
    /// Only the search winners are logged.
    #[default]
    #[serde(rename = "minimal")]
    Minimal,
    /// Every benchmarked candidate is logged.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for AutotuneLogLevel {}

/// How exhaustive the algorithm search is.
#[derive(Default, Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum AutotuneLevel {
    /// Never enumerate kernel tilings, even when the caller asks for it.
    #[serde(rename = "minimal")]
    Minimal,
    /// Enumerate kernel tilings only when the caller asks for it.
    #[default]
    #[serde(rename = "balanced")]
    Balanced,
    /// Always enumerate kernel tilings.
    #[serde(rename = "full")]
    Full,
}

impl AutotuneLevel {
    /// Whether a search should be exhaustive given the caller's request.
    pub fn exhaustive(&self, requested: bool) -> bool {
        match self {
            AutotuneLevel::Minimal => false,
            AutotuneLevel::Balanced => requested,
            AutotuneLevel::Full => true,
        }
    }
}
