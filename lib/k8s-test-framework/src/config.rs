//! Framework settings.

use std::{path::PathBuf, time::Duration};

use snafu::{ensure, ResultExt};

use crate::{
    error::{InvalidEnvSnafu, ZeroPollIntervalSnafu},
    wait::PollSettings,
    Result,
};

/// Directory the log files are written to, relative to the working directory.
pub const DEFAULT_RESULT_DIR: &str = "result";

/// Container preferred when picking which container of a pod to read logs
/// from.
pub const DEFAULT_APP_CONTAINER: &str = "xmtpd";

/// Environment variable overriding [`Config::result_dir`].
pub const RESULT_DIR_ENV: &str = "XMTPD_TEST_RESULT_DIR";
/// Environment variable overriding [`Config::app_container`].
pub const APP_CONTAINER_ENV: &str = "XMTPD_TEST_APP_CONTAINER";
/// Environment variable overriding [`Config::poll_interval`], in seconds.
pub const POLL_INTERVAL_ENV: &str = "XMTPD_TEST_POLL_INTERVAL";

/// Settings shared by every helper of the [`crate::Framework`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the log files, one subdirectory per namespace.
    pub result_dir: PathBuf,

    /// Sleep between two evaluations of an awaited condition.
    pub poll_interval: Duration,

    /// How long to wait for replicas to be created. Image pulls on a cold
    /// cluster make this the slowest step.
    pub created_timeout: Duration,

    /// How long to wait for replicas to be scheduled.
    pub scheduled_timeout: Duration,

    /// How long to wait for replicas to become ready.
    pub ready_timeout: Duration,

    /// How long to wait for a pod to reach a terminal phase.
    pub terminated_timeout: Duration,

    /// Container name preferred when selecting which container to read logs
    /// from.
    pub app_container: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            result_dir: PathBuf::from(DEFAULT_RESULT_DIR),
            poll_interval: Duration::from_secs(1),
            created_timeout: Duration::from_secs(60),
            scheduled_timeout: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(30),
            terminated_timeout: Duration::from_secs(30),
            app_container: DEFAULT_APP_CONTAINER.to_owned(),
        }
    }
}

impl Config {
    /// Default settings, overridden by the `XMTPD_TEST_*` environment
    /// variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(result_dir) = lookup(RESULT_DIR_ENV) {
            self.result_dir = PathBuf::from(result_dir);
        }
        if let Some(app_container) = lookup(APP_CONTAINER_ENV) {
            self.app_container = app_container;
        }
        if let Some(poll_interval) = lookup(POLL_INTERVAL_ENV) {
            let secs = poll_interval
                .trim()
                .parse::<u64>()
                .context(InvalidEnvSnafu {
                    name: POLL_INTERVAL_ENV,
                })?;
            ensure!(
                secs > 0,
                ZeroPollIntervalSnafu {
                    name: POLL_INTERVAL_ENV
                }
            );
            self.poll_interval = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Polling settings for a wait bounded by `timeout`.
    pub fn poll(&self, timeout: Duration) -> PollSettings {
        PollSettings {
            timeout,
            interval: self.poll_interval,
        }
    }
}
