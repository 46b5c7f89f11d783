//! Tracing setup for test binaries.
//!
//! ```
//! use stackable_testutils::logging::LogSettings;
//!
//! // Can be called at the start of every test, only the first call installs
//! // the subscriber.
//! LogSettings::default().init();
//! ```
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

/// The environment variable used to override the log filter, using the
/// [`EnvFilter`] directive syntax.
pub const DEFAULT_ENV_VAR: &str = "TESTUTILS_LOG";

/// Configures the console subscriber installed for tests.
#[derive(Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// The environment variable to read the filter directives from.
    pub environment_variable: &'static str,

    /// The level used if the environment variable is unset or invalid.
    pub default_level: LevelFilter,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            environment_variable: DEFAULT_ENV_VAR,
            default_level: LevelFilter::INFO,
        }
    }
}

impl LogSettings {
    pub fn with_environment_variable(mut self, environment_variable: &'static str) -> Self {
        self.environment_variable = environment_variable;
        self
    }

    pub fn with_default_level(mut self, level: impl Into<LevelFilter>) -> Self {
        self.default_level = level.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.default_level.into())
            .with_env_var(self.environment_variable)
            .from_env_lossy()
    }

    /// Installs a global subscriber which writes through the test harness,
    /// so output is captured per test.
    ///
    /// Returns `false` if a global subscriber was already installed, which
    /// is expected when multiple tests in the same binary call this.
    pub fn init(self) -> bool {
        fmt()
            .with_env_filter(self.env_filter())
            .with_test_writer()
            .try_init()
            .is_ok()
    }
}
