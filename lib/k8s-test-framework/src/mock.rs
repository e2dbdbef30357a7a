//! A scripted in-memory cluster.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use futures::{io::AsyncWrite, AsyncWriteExt};
use k8s_openapi::api::{
    batch::v1::{CronJob, Job},
    core::v1::Pod,
};
use kube::{core::ErrorResponse, ResourceExt};
use snafu::ResultExt;

use crate::{
    cluster::Cluster,
    error::{CopyLogSnafu, CreateJobSnafu, GetPodSnafu, LogStreamSnafu},
    logs::LogOptions,
    Result,
};

type LogKey = (String, String, bool);

#[derive(Debug, Default)]
struct State {
    pod_snapshots: VecDeque<Vec<Pod>>,
    list_pods_calls: usize,
    cron_jobs: Vec<CronJob>,
    created_jobs: Vec<(String, Job)>,
    logs: HashMap<LogKey, Vec<u8>>,
    log_requests: Vec<(String, LogOptions)>,
}

/// [`Cluster`] serving scripted objects.
///
/// Pods are served from a sequence of snapshots: every `list_pods` call
/// advances to the next snapshot, and the last one stays in place. Namespaces
/// are not modelled.
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<State>,
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message,
        reason: reason.to_owned(),
        code,
    })
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve the same pods on every call.
    pub fn with_pods(self, pods: Vec<Pod>) -> Self {
        self.with_pod_snapshots(vec![pods])
    }

    /// Serve each snapshot in turn, repeating the last one.
    pub fn with_pod_snapshots(self, snapshots: Vec<Vec<Pod>>) -> Self {
        self.state().pod_snapshots = snapshots.into();
        self
    }

    pub fn with_cron_jobs(self, cron_jobs: Vec<CronJob>) -> Self {
        self.state().cron_jobs = cron_jobs;
        self
    }

    /// Logs served for `container` of `pod`, for the current (`previous =
    /// false`) or the previous invocation.
    pub fn with_logs(self, pod: &str, container: &str, previous: bool, logs: &str) -> Self {
        self.state().logs.insert(
            (pod.to_owned(), container.to_owned(), previous),
            logs.as_bytes().to_vec(),
        );
        self
    }

    /// Number of `list_pods` calls served so far.
    pub fn list_pods_calls(&self) -> usize {
        self.state().list_pods_calls
    }

    /// Jobs created so far, with their namespace.
    pub fn created_jobs(&self) -> Vec<(String, Job)> {
        self.state().created_jobs.clone()
    }

    /// Log requests served so far, by pod name.
    pub fn log_requests(&self) -> Vec<(String, LogOptions)> {
        self.state().log_requests.clone()
    }

    fn current_pods(state: &State) -> Vec<Pod> {
        state.pod_snapshots.front().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn list_pods(&self, _namespace: &str) -> Result<Vec<Pod>> {
        let mut state = self.state();
        state.list_pods_calls += 1;
        let pods = Self::current_pods(&state);
        if state.pod_snapshots.len() > 1 {
            state.pod_snapshots.pop_front();
        }
        Ok(pods)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let state = self.state();
        Self::current_pods(&state)
            .into_iter()
            .find(|pod| pod.name_any() == name)
            .ok_or_else(|| {
                api_error(404, "NotFound", format!("pods \"{name}\" not found"))
            })
            .context(GetPodSnafu { namespace, pod: name })
    }

    async fn list_cron_jobs(&self, _namespace: &str) -> Result<Vec<CronJob>> {
        Ok(self.state().cron_jobs.clone())
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let mut state = self.state();
        let name = job.name_any();
        let exists = state
            .created_jobs
            .iter()
            .any(|(ns, created)| ns == namespace && created.name_any() == name);
        if exists {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("jobs.batch \"{name}\" already exists"),
            ))
            .context(CreateJobSnafu { namespace, job: name });
        }
        state.created_jobs.push((namespace.to_owned(), job.clone()));
        Ok(job.clone())
    }

    async fn copy_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64> {
        let logs = {
            let mut state = self.state();
            state.log_requests.push((pod.to_owned(), options.clone()));
            let key = (
                pod.to_owned(),
                options.container.clone().unwrap_or_default(),
                options.previous,
            );
            state.logs.get(&key).cloned()
        };
        let logs = logs
            .ok_or_else(|| {
                api_error(
                    400,
                    "BadRequest",
                    format!("container not found in pod \"{pod}\""),
                )
            })
            .context(LogStreamSnafu { namespace, pod })?;

        sink.write_all(&logs).await.context(CopyLogSnafu { pod })?;
        Ok(logs.len() as u64)
    }
}
