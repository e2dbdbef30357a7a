//! Copy pod logs to local files.
//!
//! Logs land in `<result_dir>/<namespace>/<pod><suffix>.log`.

use std::path::{Path, PathBuf};

use futures::AsyncWriteExt;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};
use kube::{api::LogParams, ResourceExt};
use snafu::ResultExt;
use tokio::fs::{DirBuilder, File};
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info};

use crate::{
    cluster::Cluster,
    error::{ContainerNotTerminatedSnafu, CopyLogSnafu, CreateLogFileSnafu},
    Error, Result,
};

/// Which logs of a pod to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to read. When unset, the app container is picked, see
    /// [`find_app_container`].
    pub container: Option<String>,

    /// Read the logs of the previous invocation of the container.
    pub previous: bool,

    /// Prefix every line with its timestamp.
    pub timestamps: bool,

    /// Only the last lines of the log.
    pub tail_lines: Option<i64>,

    /// Only the lines written in this many recent seconds.
    pub since_seconds: Option<i64>,
}

impl LogOptions {
    /// Read the logs of `container`.
    pub fn for_container(container: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
            ..Self::default()
        }
    }

    fn container_name(&self) -> Option<&str> {
        self.container.as_deref().filter(|name| !name.is_empty())
    }

    /// Query parameters of the log request.
    pub fn to_log_params(&self) -> LogParams {
        LogParams {
            container: self.container_name().map(str::to_owned),
            previous: self.previous,
            timestamps: self.timestamps,
            tail_lines: self.tail_lines,
            since_seconds: self.since_seconds,
            ..LogParams::default()
        }
    }
}

/// Path of the log file of `pod` within `namespace`.
pub fn log_file_path(result_dir: &Path, namespace: &str, pod: &str, suffix: &str) -> PathBuf {
    result_dir
        .join(namespace)
        .join(format!("{pod}{suffix}.log"))
}

fn container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default()
}

fn is_waiting(status: &ContainerStatus) -> bool {
    status
        .state
        .as_ref()
        .is_some_and(|state| state.waiting.is_some())
}

/// A container has logs once it left the `Waiting` state, or when it is
/// waiting after at least one restart.
pub fn container_has_logs(container: &Container, statuses: &[ContainerStatus]) -> bool {
    statuses.iter().any(|status| {
        status.name == container.name && (!is_waiting(status) || status.restart_count > 0)
    })
}

/// The container to read logs from: `preferred` if it has logs, otherwise the
/// first container that has logs.
pub fn find_app_container<'a>(pod: &'a Pod, preferred: &str) -> Option<&'a Container> {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    let statuses = container_statuses(pod);

    containers
        .iter()
        .find(|container| container.name == preferred && container_has_logs(container, statuses))
        .or_else(|| {
            containers
                .iter()
                .find(|container| container_has_logs(container, statuses))
        })
}

/// Fill in the container of `options` when it is unset.
///
/// A waiting container (e.g. in `CrashLoopBackOff`) has no current logs, so
/// the previous invocation is read instead.
pub fn select_container(pod: &Pod, preferred: &str, options: &mut LogOptions) -> Result<()> {
    if options.container_name().is_some() {
        return Ok(());
    }

    let pod_name = pod.name_any();
    let container = find_app_container(pod, preferred).ok_or_else(|| {
        Error::ContainersNotStarted {
            pod: pod_name.clone(),
        }
    })?;
    options.container = Some(container.name.clone());

    if container_statuses(pod)
        .iter()
        .any(|status| status.name == container.name && is_waiting(status))
    {
        options.previous = true;
    }

    if options.previous {
        info!(
            "Multiple containers found in pod {}. Getting logs from previous container {}.",
            pod_name, container.name
        );
    } else {
        info!(
            "Multiple containers found in pod {}. Getting logs from container {}.",
            pod_name, container.name
        );
    }
    Ok(())
}

/// Decide whether the logs of a terminated container are read from its
/// current or previous invocation.
///
/// Returns `None` when the pod reports no status for `container`.
pub fn terminated_log_source(pod: &Pod, container: &str) -> Result<Option<bool>> {
    let Some(status) = container_statuses(pod)
        .iter()
        .find(|status| status.name == container)
    else {
        return Ok(None);
    };

    let terminated = status
        .state
        .as_ref()
        .is_some_and(|state| state.terminated.is_some());
    if terminated {
        info!(
            "Pod {} container {} terminated, retrieving logs.",
            pod.name_any(),
            container
        );
        Ok(Some(false))
    } else if status.restart_count > 0 {
        info!(
            "Pod {} container {} restarted, retrieving previous logs.",
            pod.name_any(),
            container
        );
        Ok(Some(true))
    } else {
        ContainerNotTerminatedSnafu {
            pod: pod.name_any(),
            container,
        }
        .fail()
    }
}

async fn create_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        // A failure here surfaces when the file is created.
        let _ = builder.create(dir).await;
    }
    File::create(path).await.context(CreateLogFileSnafu { path })
}

async fn write_logs<C>(
    cluster: &C,
    file: File,
    namespace: &str,
    pod: &str,
    options: &LogOptions,
) -> Result<u64>
where
    C: Cluster + ?Sized,
{
    let mut writer = file.compat_write();
    let copied = cluster
        .copy_logs(namespace, pod, options, &mut writer)
        .await?;
    writer.close().await.context(CopyLogSnafu { pod })?;
    Ok(copied)
}

/// Write the logs of `pod_name` to its log file and return the file path.
///
/// Returns `None` when no container of the pod has started yet; that is not
/// worth failing a test over.
pub async fn get_app_log<C>(
    cluster: &C,
    result_dir: &Path,
    app_container: &str,
    namespace: &str,
    pod_name: &str,
    suffix: &str,
    mut options: LogOptions,
) -> Result<Option<PathBuf>>
where
    C: Cluster + ?Sized,
{
    let path = log_file_path(result_dir, namespace, pod_name, suffix);
    let file = create_log_file(&path).await?;

    if options.container_name().is_none() {
        let pod = cluster.get_pod(namespace, pod_name).await?;
        match select_container(&pod, app_container, &mut options) {
            Err(error) if error.is_containers_not_started() => {
                info!(
                    "Skipping log collection for pod {} because no container has been started",
                    pod_name
                );
                return Ok(None);
            }
            result => result?,
        }
    }

    let copied = write_logs(cluster, file, namespace, pod_name, &options).await?;
    debug!(message = "Copied pod logs.", pod = %pod_name, bytes = copied);
    info!("Finished reading log file {}", path.display());
    Ok(Some(path))
}

/// Write the logs of the named container of a terminated `pod` to its log
/// file and return the file path.
///
/// Fails when the container neither terminated nor restarted.
pub async fn get_terminated_pod_log<C>(
    cluster: &C,
    result_dir: &Path,
    namespace: &str,
    pod: &Pod,
    suffix: &str,
    mut options: LogOptions,
) -> Result<PathBuf>
where
    C: Cluster + ?Sized,
{
    if let Some(previous) =
        terminated_log_source(pod, options.container_name().unwrap_or_default())?
    {
        options.previous = previous;
    }

    let pod_name = pod.name_any();
    let path = log_file_path(result_dir, namespace, &pod_name, suffix);
    let file = create_log_file(&path).await?;

    write_logs(cluster, file, namespace, &pod_name, &options).await?;
    info!("Finished reading log file {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{
        mock::MockCluster,
        test_util::{trace_init, ContainerState, TestPod},
    };

    #[test]
    fn log_file_layout() {
        assert_eq!(
            log_file_path(Path::new("result"), "xmtp", "xmtpd-0", "-final"),
            PathBuf::from("result/xmtp/xmtpd-0-final.log")
        );
    }

    #[test]
    fn log_params_skip_empty_container() {
        let options = LogOptions {
            container: Some(String::new()),
            previous: true,
            tail_lines: Some(100),
            ..LogOptions::default()
        };
        let params = options.to_log_params();
        assert_eq!(params.container, None);
        assert!(params.previous);
        assert_eq!(params.tail_lines, Some(100));
    }

    #[test]
    fn waiting_container_without_restarts_has_no_logs() {
        let pod = TestPod::new("xmtpd-0")
            .container("init-db", ContainerState::Waiting, 0)
            .container("xmtpd", ContainerState::Waiting, 2)
            .container("sidecar", ContainerState::Running, 0)
            .build();
        let statuses = container_statuses(&pod);
        let containers = &pod.spec.as_ref().unwrap().containers;

        assert!(!container_has_logs(&containers[0], statuses));
        assert!(container_has_logs(&containers[1], statuses));
        assert!(container_has_logs(&containers[2], statuses));
    }

    #[test]
    fn container_without_status_has_no_logs() {
        let pod = TestPod::new("xmtpd-0").container_spec_only("xmtpd").build();
        assert!(find_app_container(&pod, "xmtpd").is_none());
    }

    #[test]
    fn prefers_app_container_then_first_with_logs() {
        let pod = TestPod::new("xmtpd-0")
            .container("proxy", ContainerState::Running, 0)
            .container("xmtpd", ContainerState::Running, 0)
            .build();
        assert_eq!(find_app_container(&pod, "xmtpd").unwrap().name, "xmtpd");

        let pod = TestPod::new("xmtpd-0")
            .container("xmtpd", ContainerState::Waiting, 0)
            .container("proxy", ContainerState::Terminated, 0)
            .build();
        assert_eq!(find_app_container(&pod, "xmtpd").unwrap().name, "proxy");
    }

    #[test]
    fn crash_looping_container_reads_previous_logs() {
        let pod = TestPod::new("xmtpd-0")
            .container("xmtpd", ContainerState::Waiting, 3)
            .build();
        let mut options = LogOptions::default();
        select_container(&pod, "xmtpd", &mut options).unwrap();

        assert_eq!(options.container.as_deref(), Some("xmtpd"));
        assert!(options.previous);
    }

    #[test]
    fn explicit_container_is_kept() {
        let pod = TestPod::new("xmtpd-0").build();
        let mut options = LogOptions::for_container("proxy");
        select_container(&pod, "xmtpd", &mut options).unwrap();
        assert_eq!(options, LogOptions::for_container("proxy"));
    }

    #[test]
    fn terminated_source_follows_container_state() {
        let pod = TestPod::new("job-x")
            .container("done", ContainerState::Terminated, 0)
            .container("restarted", ContainerState::Running, 1)
            .container("running", ContainerState::Running, 0)
            .build();

        assert_eq!(terminated_log_source(&pod, "done").unwrap(), Some(false));
        assert_eq!(terminated_log_source(&pod, "restarted").unwrap(), Some(true));
        assert_eq!(terminated_log_source(&pod, "missing").unwrap(), None);
        assert!(matches!(
            terminated_log_source(&pod, "running").unwrap_err(),
            Error::ContainerNotTerminated { .. }
        ));
    }

    #[tokio::test]
    async fn app_log_is_written_to_result_dir() {
        trace_init();
        let dir = tempfile::tempdir().unwrap();
        let cluster = MockCluster::new()
            .with_pods(vec![TestPod::new("xmtpd-0")
                .container("xmtpd", ContainerState::Running, 0)
                .build()])
            .with_logs("xmtpd-0", "xmtpd", false, "started\nserving\n");

        let path = get_app_log(
            &cluster,
            dir.path(),
            "xmtpd",
            "xmtp",
            "xmtpd-0",
            "-run1",
            LogOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(path, dir.path().join("xmtp").join("xmtpd-0-run1.log"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "started\nserving\n");
        assert_eq!(
            cluster.log_requests(),
            vec![("xmtpd-0".to_owned(), LogOptions::for_container("xmtpd"))]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn namespace_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cluster = MockCluster::new()
            .with_pods(vec![TestPod::new("xmtpd-0")
                .container("xmtpd", ContainerState::Running, 0)
                .build()])
            .with_logs("xmtpd-0", "xmtpd", false, "started\n");

        get_app_log(
            &cluster,
            dir.path(),
            "xmtpd",
            "xmtp",
            "xmtpd-0",
            "",
            LogOptions::default(),
        )
        .await
        .unwrap();

        let mode = std::fs::metadata(dir.path().join("xmtp"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn app_log_is_skipped_when_no_container_started() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = MockCluster::new().with_pods(vec![TestPod::new("xmtpd-0")
            .container("xmtpd", ContainerState::Waiting, 0)
            .build()]);

        let path = get_app_log(
            &cluster,
            dir.path(),
            "xmtpd",
            "xmtp",
            "xmtpd-0",
            "",
            LogOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(path, None);
        assert!(cluster.log_requests().is_empty());
    }

    #[tokio::test]
    async fn app_log_fails_for_unknown_pod() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = MockCluster::new();

        let error = get_app_log(
            &cluster,
            dir.path(),
            "xmtpd",
            "xmtp",
            "ghost",
            "",
            LogOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, Error::GetPod { .. }));
    }

    #[tokio::test]
    async fn terminated_pod_log_reads_previous_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let pod = TestPod::new("register-node-x")
            .container("register-node", ContainerState::Running, 1)
            .build();
        let cluster = MockCluster::new().with_logs(
            "register-node-x",
            "register-node",
            true,
            "node registered\n",
        );

        let path = get_terminated_pod_log(
            &cluster,
            dir.path(),
            "xmtp",
            &pod,
            "",
            LogOptions::for_container("register-node"),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "node registered\n");
        let requests = cluster.log_requests();
        assert!(requests[0].1.previous);
    }
}
