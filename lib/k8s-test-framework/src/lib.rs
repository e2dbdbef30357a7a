//! Kubernetes Test Framework.
//!
//! Helpers integration tests use to observe an xmtpd deployment: copy pod
//! logs to disk, wait for replicas to be created, scheduled, ready or
//! terminated, and trigger CronJobs on demand.
//!
//! Every helper talks to the cluster through the [`Cluster`] trait.
//! [`KubeCluster`] is the live implementation; with the `mocks` feature
//! [`mock::MockCluster`] serves scripted objects instead.
//!
//! ```no_run
//! # async fn run() -> k8s_test_framework::Result<()> {
//! use k8s_test_framework::{Framework, LogOptions};
//!
//! let framework = Framework::from_env().await?;
//! framework.await_nr_replicas_ready("xmtp", "xmtpd", 2).await?;
//! for pod in framework.find_pods_from_chart("xmtp", "xmtpd").await? {
//!     let name = pod.metadata.name.unwrap_or_default();
//!     framework.get_app_log("xmtp", &name, "", LogOptions::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_debug_implementations)]

pub mod cluster;
pub mod config;
pub mod cron_job;
mod error;
mod framework;
pub mod log_collectors;
pub mod logs;
pub mod pods;
pub mod replicas;
pub mod wait;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;
#[cfg(any(test, feature = "mocks"))]
pub mod test_util;

pub use cluster::{Cluster, KubeCluster};
pub use config::Config;
pub use error::{Error, Result};
pub use framework::Framework;
pub use log_collectors::LogCollectors;
pub use logs::LogOptions;
pub use wait::PollSettings;
