use super::{autotune::AutotuneConfig, compilation::CompilationConfig, profiling::ProfilingConfig};
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static CONVTUNE_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Environment variable redirecting every logger.
pub const DEBUG_LOG_ENV: &str = "CONVTUNE_DEBUG_LOG";
/// Environment variable overriding the autotune level.
pub const AUTOTUNE_LEVEL_ENV: &str = "CONVTUNE_AUTOTUNE_LEVEL";

/// Represents the global configuration for convtune, combining profiling, autotuning, and
/// compilation settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration for profiling kernels.
    #[serde(default)]
    pub profiling: ProfilingConfig,

    /// Configuration for the algorithm search.
    #[serde(default)]
    pub autotune: AutotuneConfig,

    /// Configuration for compilation settings.
    #[serde(default)]
    pub compilation: CompilationConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not
    /// set.
    ///
    /// If no configuration is set, it attempts to load one from `convtune.toml` or
    /// `ConvTune.toml` in the current directory or its parents, then applies the environment
    /// overrides. If no file is found, a default configuration is used.
    ///
    /// # Notes
    ///
    /// Calling this function takes a global lock. Read the values you need once and keep them
    /// around instead of calling it in a hot loop.
    pub fn get() -> Arc<Self> {
        let mut state = CONVTUNE_GLOBAL_CONFIG.lock();
        state.get_or_insert_with(|| Arc::new(Self::load())).clone()
    }

    fn load() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(config_file)] {
                Self::from_current_dir().override_from_env()
            } else {
                Self::default()
            }
        }
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`.
    pub fn set(config: Self) {
        let mut state = CONVTUNE_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Parse a configuration from its toml representation.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(self) -> Self {
        self.override_from(|name| std::env::var(name).ok())
    }

    /// Overrides configuration fields using `lookup` to read the variables.
    pub fn override_from<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        use super::{
            autotune::{AutotuneLevel, AutotuneLogLevel},
            compilation::CompilationLogLevel,
            profiling::ProfilingLogLevel,
        };

        if let Some(val) = lookup(DEBUG_LOG_ENV) {
            self.compilation.logger.level = CompilationLogLevel::Full;
            self.profiling.logger.level = ProfilingLogLevel::Full;
            self.autotune.logger.level = AutotuneLogLevel::Full;

            match val.as_str() {
                "stdout" => {
                    self.compilation.logger.stdout = true;
                    self.profiling.logger.stdout = true;
                    self.autotune.logger.stdout = true;
                }
                "stderr" => {
                    self.compilation.logger.stderr = true;
                    self.profiling.logger.stderr = true;
                    self.autotune.logger.stderr = true;
                }
                "1" | "true" => {
                    let file_path = "/tmp/convtune.log";
                    self.compilation.logger.file = Some(file_path.into());
                    self.profiling.logger.file = Some(file_path.into());
                    self.autotune.logger.file = Some(file_path.into());
                }
                "0" | "false" => {
                    self.compilation.logger.level = CompilationLogLevel::Disabled;
                    self.profiling.logger.level = ProfilingLogLevel::Disabled;
                    self.autotune.logger.level = AutotuneLogLevel::Disabled;
                }
                file_path => {
                    self.compilation.logger.file = Some(file_path.into());
                    self.profiling.logger.file = Some(file_path.into());
                    self.autotune.logger.file = Some(file_path.into());
                }
            }
        };

        if let Some(val) = lookup(AUTOTUNE_LEVEL_ENV) {
            match val.as_str() {
                "minimal" | "0" => {
                    self.autotune.level = AutotuneLevel::Minimal;
                }
                "balanced" | "1" => {
                    self.autotune.level = AutotuneLevel::Balanced;
                }
                "full" | "2" => {
                    self.autotune.level = AutotuneLevel::Full;
                }
                other => {
                    log::warn!("Ignoring unknown {AUTOTUNE_LEVEL_ENV} value `{other}`");
                }
            }
        }

        self
    }

    #[cfg(config_file)]
    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<()> {
        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path, content)
    }

    // Loads configuration from `convtune.toml` or `ConvTune.toml` in the current directory or
    // its parents.
    #[cfg(config_file)]
    fn from_current_dir() -> Self {
        let mut dir = match std::env::current_dir() {
            Ok(dir) => dir,
            Err(_) => return Self::default(),
        };

        loop {
            for name in ["convtune.toml", "ConvTune.toml"] {
                let path = dir.join(name);
                if !path.is_file() {
                    continue;
                }
                match Self::from_file_path(&path) {
                    Ok(config) => return config,
                    Err(err) => log::warn!("Ignoring configuration file {path:?}: {err}"),
                }
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    #[cfg(config_file)]
    fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
