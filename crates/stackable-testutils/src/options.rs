//! Options to configure default probe timings and endpoints, usable as CLI
//! arguments or environment variables.
use std::time::Duration;

use clap::Args;

use crate::{
    probe::{self, Schedule},
    readiness::DEFAULT_READINESS_URL,
};

/// Default [`Schedule`] and readiness endpoint for a test suite.
///
/// Every option can also be set through the environment, which is usually
/// the more convenient way when running under `cargo test`.
#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Probe Options")]
pub struct ProbeOptions {
    /// How long to poll before an assertion fails, for example `30s` or `1m 30s`.
    #[arg(
        long = "probe-timeout",
        env = "PROBE_TIMEOUT",
        default_value_t = Self::default_timeout()
    )]
    pub timeout: humantime::Duration,

    /// How long to wait between two samples, for example `250ms`.
    #[arg(
        long = "probe-interval",
        env = "PROBE_INTERVAL",
        default_value_t = Self::default_interval()
    )]
    pub interval: humantime::Duration,

    /// The URL of the operator readiness endpoint.
    #[arg(long, env, default_value = DEFAULT_READINESS_URL)]
    pub readiness_url: String,
}

impl ProbeOptions {
    fn default_timeout() -> humantime::Duration {
        Duration::from_secs(10).into()
    }

    fn default_interval() -> humantime::Duration {
        Duration::from_millis(250).into()
    }

    /// Validates the configured timings into a [`Schedule`].
    pub fn schedule(&self) -> Result<Schedule, probe::Error> {
        Schedule::new(*self.timeout, *self.interval)
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
            interval: Self::default_interval(),
            readiness_url: DEFAULT_READINESS_URL.to_owned(),
        }
    }
}
