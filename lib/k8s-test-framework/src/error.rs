//! Errors returned by the framework.

use std::{num::ParseIntError, path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use snafu::Snafu;

/// Everything that can go wrong while observing the cluster.
///
/// All variants but [`Error::ContainersNotStarted`] are meant to fail the
/// calling test.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to build a Kubernetes client: {source}"))]
    ClientInit { source: kube::Error },

    #[snafu(display("Unable to load kubeconfig context {context:?}: {source}"))]
    Kubeconfig {
        context: String,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Failed to list pods in namespace {namespace}: {source}"))]
    ListPods {
        namespace: String,
        source: kube::Error,
    },

    #[snafu(display("Failed to get pod {namespace}/{pod}: {source}"))]
    GetPod {
        namespace: String,
        pod: String,
        source: kube::Error,
    },

    #[snafu(display("Failed to list CronJobs in namespace {namespace}: {source}"))]
    ListCronJobs {
        namespace: String,
        source: kube::Error,
    },

    #[snafu(display("Failed to create Job {namespace}/{job}: {source}"))]
    CreateJob {
        namespace: String,
        job: String,
        source: kube::Error,
    },

    #[snafu(display("Failed to open log stream of pod {namespace}/{pod}: {source}"))]
    LogStream {
        namespace: String,
        pod: String,
        source: kube::Error,
    },

    #[snafu(display("Failed to copy logs of pod {pod}: {source}"))]
    CopyLog {
        pod: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to create log file {}: {source}", path.display()))]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("No container has been started in pod {pod}"))]
    ContainersNotStarted { pod: String },

    #[snafu(display("Pod {pod} container {container} is not terminated, current state unknown"))]
    ContainerNotTerminated { pod: String, container: String },

    #[snafu(display("CronJob {cron_job} has no job template spec"))]
    MissingJobTemplate { cron_job: String },

    #[snafu(display(
        "{description} timed out after {} seconds. Start of await was '{started_at}'",
        timeout.as_secs_f64()
    ))]
    Timeout {
        description: String,
        timeout: Duration,
        started_at: DateTime<Utc>,
        stack_trace: String,
    },

    #[snafu(display("Invalid value for environment variable {name}: {source}"))]
    InvalidEnv {
        name: &'static str,
        source: ParseIntError,
    },

    #[snafu(display("Environment variable {name} must be at least 1 second"))]
    ZeroPollInterval { name: &'static str },
}

impl Error {
    /// Returns `true` when the pod has no container with logs yet. Log
    /// collection treats this as a skip rather than a failure.
    pub fn is_containers_not_started(&self) -> bool {
        matches!(self, Error::ContainersNotStarted { .. })
    }

    /// Returns `true` for a wait that ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// A `Result` defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_seconds_and_start() {
        let started_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let error = Error::Timeout {
            description: "3 pods READY for name 'xmtpd'".to_owned(),
            timeout: Duration::from_millis(1500),
            started_at,
            stack_trace: String::new(),
        };

        assert_eq!(
            error.to_string(),
            "3 pods READY for name 'xmtpd' timed out after 1.5 seconds. \
             Start of await was '2024-05-01 10:00:00 UTC'"
        );
        assert!(error.is_timeout());
        assert!(!error.is_containers_not_started());
    }

    #[test]
    fn containers_not_started_is_distinguished() {
        let error = Error::ContainersNotStarted {
            pod: "xmtpd-0".to_owned(),
        };
        assert!(error.is_containers_not_started());
        assert_eq!(error.to_string(), "No container has been started in pod xmtpd-0");
    }
}
