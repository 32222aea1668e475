use core::{fmt::Display, time::Duration};

use super::{ProfileLevel, Profiled};
use crate::config::{
    Logger, autotune::AutotuneLogLevel, compilation::CompilationLogLevel,
    profiling::ProfilingLogLevel,
};

/// Server logger, owned by the compute client.
///
/// Logs compiled kernels, per kernel profiled durations and autotune results to the outputs
/// configured in the [global config](crate::config::GlobalConfig).
#[derive(Debug)]
pub struct ServerLogger {
    logger: Option<Logger>,
    profile: Option<ProfileLevel>,
    compilation: bool,
    autotune: Option<AutotuneLogLevel>,
    profiled: Profiled,
}

impl Default for ServerLogger {
    fn default() -> Self {
        Self::new(Logger::new())
    }
}

impl ServerLogger {
    /// Create a server logger writing to `logger`.
    pub fn new(logger: Logger) -> Self {
        let profile = match logger.log_level_profiling() {
            ProfilingLogLevel::Disabled => None,
            ProfilingLogLevel::Basic => Some(ProfileLevel::Basic),
            ProfilingLogLevel::Full => Some(ProfileLevel::Full),
        };
        let compilation = logger.log_level_compilation() == CompilationLogLevel::Full;
        let autotune = match logger.log_level_autotune() {
            AutotuneLogLevel::Disabled => None,
            level => Some(level),
        };

        if profile.is_none() && !compilation && autotune.is_none() {
            return Self::disabled();
        }

        Self {
            logger: Some(logger),
            profile,
            compilation,
            autotune,
            profiled: Profiled::default(),
        }
    }

    /// A logger that drops everything.
    pub fn disabled() -> Self {
        Self {
            logger: None,
            profile: None,
            compilation: false,
            autotune: None,
            profiled: Profiled::default(),
        }
    }

    /// Returns the profile level, none if profiling is deactivated.
    pub fn profile_level(&self) -> Option<ProfileLevel> {
        self.profile
    }

    /// Returns true if compilation info should be logged.
    pub fn compilation_activated(&self) -> bool {
        self.compilation
    }

    /// Log the argument when the compilation logger is activated.
    pub fn log_compilation<I: Display>(&mut self, arg: &I) {
        if !self.compilation {
            return;
        }
        if let Some(logger) = &mut self.logger {
            logger.log_compilation(arg);
        }
    }

    /// Register a profiled kernel.
    pub fn register_profiled<Name: Display>(&mut self, name: Name, duration: Duration) {
        let Some(level) = self.profile else {
            return;
        };
        let name = name.to_string();
        self.profiled.update(&name, duration);

        if let (ProfileLevel::Full, Some(logger)) = (level, &mut self.logger) {
            logger.log_profiling(&format!("| {duration:<10?} | {name}"));
        }
    }

    /// Log an autotune message. Detailed messages are only written with the full level.
    pub fn log_autotune<I: Display>(&mut self, arg: &I, detailed: bool) {
        let Some(level) = self.autotune else {
            return;
        };
        if detailed && level != AutotuneLogLevel::Full {
            return;
        }
        if let Some(logger) = &mut self.logger {
            logger.log_autotune(arg);
        }
    }

    /// Show the profiling summary if activated and reset its state.
    pub fn profile_summary(&mut self) {
        if self.profile.is_none() {
            return;
        }
        let profiled = core::mem::take(&mut self.profiled);

        if let Some(logger) = &mut self.logger {
            if !profiled.is_empty() {
                logger.log_profiling(&profiled);
            }
        }
    }
}
