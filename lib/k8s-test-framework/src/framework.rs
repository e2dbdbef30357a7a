//! The test framework main entry point.

use std::path::PathBuf;

use k8s_openapi::api::{
    batch::v1::{CronJob, Job},
    core::v1::Pod,
};

use super::{
    cluster::{Cluster, KubeCluster},
    config::Config,
    cron_job, logs,
    logs::LogOptions,
    pods, replicas, Result,
};

/// Framework wraps the cluster access with an easy-to-use rust API
/// optimized for implementing test cases.
#[derive(Debug)]
pub struct Framework<C = KubeCluster> {
    cluster: C,
    config: Config,
}

impl Framework<KubeCluster> {
    /// Connect to the cluster of the current kubeconfig context, with
    /// settings taken from the environment.
    pub async fn from_env() -> Result<Self> {
        let config = Config::from_env()?;
        let cluster = KubeCluster::try_default().await?;
        Ok(Self::new(cluster, config))
    }
}

impl<C: Cluster> Framework<C> {
    /// Create a new [`Framework`] powered by the passed cluster.
    pub fn new(cluster: C, config: Config) -> Self {
        Self { cluster, config }
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// All pods of `namespace`, newest first.
    pub async fn find_all_pods_in_schema(&self, namespace: &str) -> Result<Vec<Pod>> {
        pods::find_all_pods_in_schema(&self.cluster, namespace).await
    }

    /// Pods of `namespace` whose name contains `expected_name`, newest first.
    pub async fn find_pods_from_chart(
        &self,
        namespace: &str,
        expected_name: &str,
    ) -> Result<Vec<Pod>> {
        pods::find_pods_from_chart(&self.cluster, namespace, expected_name).await
    }

    /// Wait until `nr_replicas` pods matching `expected_name` exist.
    pub async fn await_nr_replicas_created(
        &self,
        namespace: &str,
        expected_name: &str,
        nr_replicas: usize,
    ) -> Result<()> {
        let poll = self.config.poll(self.config.created_timeout);
        replicas::await_nr_replicas_created(
            &self.cluster,
            namespace,
            expected_name,
            nr_replicas,
            poll,
        )
        .await
    }

    /// Wait until `nr_replicas` pods matching `expected_name` are scheduled.
    pub async fn await_nr_replicas_scheduled(
        &self,
        namespace: &str,
        expected_name: &str,
        nr_replicas: usize,
    ) -> Result<()> {
        let poll = self.config.poll(self.config.scheduled_timeout);
        replicas::await_nr_replicas_scheduled(
            &self.cluster,
            namespace,
            expected_name,
            nr_replicas,
            poll,
        )
        .await
    }

    /// Wait until `nr_replicas` pods matching `expected_name` are ready.
    pub async fn await_nr_replicas_ready(
        &self,
        namespace: &str,
        expected_name: &str,
        nr_replicas: usize,
    ) -> Result<()> {
        let poll = self.config.poll(self.config.ready_timeout);
        replicas::await_nr_replicas_ready(
            &self.cluster,
            namespace,
            expected_name,
            nr_replicas,
            poll,
        )
        .await
    }

    /// Wait until a pod matching `expected_name` has succeeded or failed.
    pub async fn await_pod_terminated(&self, namespace: &str, expected_name: &str) -> Result<()> {
        let poll = self.config.poll(self.config.terminated_timeout);
        replicas::await_pod_terminated(&self.cluster, namespace, expected_name, poll).await
    }

    /// All CronJobs of `namespace`, newest first.
    pub async fn find_all_cron_jobs_in_schema(&self, namespace: &str) -> Result<Vec<CronJob>> {
        cron_job::find_all_cron_jobs_in_schema(&self.cluster, namespace).await
    }

    /// CronJobs of `namespace` whose name contains `expected_name`, newest
    /// first.
    pub async fn find_cron_jobs_from_chart(
        &self,
        namespace: &str,
        expected_name: &str,
    ) -> Result<Vec<CronJob>> {
        cron_job::find_cron_jobs_from_chart(&self.cluster, namespace, expected_name).await
    }

    /// Run `cron_job` now, as a Job named `new_job_name`.
    pub async fn create_job_from_cron_job(
        &self,
        namespace: &str,
        cron_job: &CronJob,
        new_job_name: &str,
    ) -> Result<Job> {
        cron_job::create_job_from_cron_job(&self.cluster, namespace, cron_job, new_job_name).await
    }

    /// Write the logs of `pod` under the result directory.
    ///
    /// `Ok(None)` means no container of the pod has started yet.
    pub async fn get_app_log(
        &self,
        namespace: &str,
        pod: &str,
        suffix: &str,
        options: LogOptions,
    ) -> Result<Option<PathBuf>> {
        logs::get_app_log(
            &self.cluster,
            &self.config.result_dir,
            &self.config.app_container,
            namespace,
            pod,
            suffix,
            options,
        )
        .await
    }

    /// Write the logs of a container of a terminated `pod` under the result
    /// directory.
    pub async fn get_terminated_pod_log(
        &self,
        namespace: &str,
        pod: &Pod,
        suffix: &str,
        options: LogOptions,
    ) -> Result<PathBuf> {
        logs::get_terminated_pod_log(
            &self.cluster,
            &self.config.result_dir,
            namespace,
            pod,
            suffix,
            options,
        )
        .await
    }
}
