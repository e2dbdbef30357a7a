//! Background log collection that a test waits on before it exits.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::{cluster::Cluster, logs::LogOptions, Framework};

/// Tracks log collections running in the background.
///
/// Cloning yields a handle to the same set of collections.
#[derive(Debug, Clone, Default)]
pub struct LogCollectors {
    tracker: TaskTracker,
}

impl LogCollectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting the logs of `pod` on the runtime.
    ///
    /// Failures are logged rather than returned: collection runs alongside
    /// the test and must not decide its outcome.
    pub fn spawn<C>(
        &self,
        framework: Arc<Framework<C>>,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        suffix: impl Into<String>,
        options: LogOptions,
    ) where
        C: Cluster + 'static,
    {
        let namespace = namespace.into();
        let pod = pod.into();
        let suffix = suffix.into();

        self.tracker.spawn(async move {
            match framework
                .get_app_log(&namespace, &pod, &suffix, options)
                .await
            {
                Ok(Some(path)) => {
                    debug!(message = "Log collection finished.", %pod, path = %path.display());
                }
                Ok(None) => {}
                Err(error) => {
                    error!(message = "Log collection failed.", %namespace, %pod, %error);
                }
            }
        });
    }

    /// Number of collections still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for every collection started so far. Collections may be spawned
    /// again afterwards.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        mock::MockCluster,
        test_util::{trace_init, ContainerState, TestPod},
    };

    #[tokio::test]
    async fn wait_blocks_until_every_collection_is_written() {
        trace_init();
        let dir = tempfile::tempdir().unwrap();
        let names = ["xmtpd-0", "xmtpd-1", "xmtpd-2"];
        let mut cluster = MockCluster::new().with_pods(
            names
                .iter()
                .map(|name| {
                    TestPod::new(name)
                        .container("xmtpd", ContainerState::Running, 0)
                        .build()
                })
                .collect(),
        );
        for name in names {
            cluster = cluster.with_logs(name, "xmtpd", false, &format!("{name} log\n"));
        }
        let config = Config {
            result_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let framework = Arc::new(Framework::new(cluster, config));

        let collectors = LogCollectors::new();
        for name in names {
            collectors.spawn(
                Arc::clone(&framework),
                "xmtp",
                name,
                "",
                LogOptions::default(),
            );
        }
        collectors.wait().await;

        assert!(collectors.is_empty());
        for name in names {
            let written =
                std::fs::read_to_string(dir.path().join("xmtp").join(format!("{name}.log")))
                    .unwrap();
            assert_eq!(written, format!("{name} log\n"));
        }
    }

    #[tokio::test]
    async fn failed_collection_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            result_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let framework = Arc::new(Framework::new(MockCluster::new(), config));

        let collectors = LogCollectors::new();
        collectors.spawn(framework, "xmtp", "ghost", "", LogOptions::default());
        collectors.wait().await;

        assert_eq!(collectors.len(), 0);
    }
}
