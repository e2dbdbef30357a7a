//! Access to the cluster API.

use std::fmt;

use async_trait::async_trait;
use futures::io::AsyncWrite;
use k8s_openapi::api::{
    batch::v1::{CronJob, Job},
    core::v1::Pod,
};
use kube::{
    api::{ListParams, PostParams},
    config::KubeConfigOptions,
    Api, Client,
};
use snafu::ResultExt;

use crate::{
    error::{
        ClientInitSnafu, CopyLogSnafu, CreateJobSnafu, GetPodSnafu, KubeconfigSnafu,
        ListCronJobsSnafu, ListPodsSnafu, LogStreamSnafu,
    },
    logs::LogOptions,
    Result,
};

/// The subset of the cluster API the helpers read from and write to.
///
/// Objects are passed through exactly as the cluster reports them.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// List every pod of `namespace`, in the order the API returns them.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    /// Get a single pod.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// List every CronJob of `namespace`, in the order the API returns them.
    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>>;

    /// Create `job` and return the object as stored by the cluster.
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job>;

    /// Stream the logs of `pod` into `sink`, returning the number of bytes
    /// copied.
    async fn copy_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64>;
}

/// [`Cluster`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the inferred configuration: the local kubeconfig and its
    /// current context, or the in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context(ClientInitSnafu)?;
        Ok(Self::new(client))
    }

    /// Connect through a named context of the local kubeconfig.
    pub async fn with_context(context: &str) -> Result<Self> {
        let options = KubeConfigOptions {
            context: Some(context.to_owned()),
            ..KubeConfigOptions::default()
        };
        let config = kube::Config::from_kubeconfig(&options)
            .await
            .context(KubeconfigSnafu { context })?;
        let client = Client::try_from(config).context(ClientInitSnafu)?;
        Ok(Self::new(client))
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeCluster")
            .field("default_namespace", &self.client.default_namespace())
            .finish()
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default())
            .await
            .context(ListPodsSnafu { namespace })?;
        Ok(list.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.get(name)
            .await
            .context(GetPodSnafu { namespace, pod: name })
    }

    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>> {
        let cron_jobs: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        let list = cron_jobs
            .list(&ListParams::default())
            .await
            .context(ListCronJobsSnafu { namespace })?;
        Ok(list.items)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        jobs.create(&PostParams::default(), job)
            .await
            .context(CreateJobSnafu {
                namespace,
                job: job.metadata.name.clone().unwrap_or_default(),
            })
    }

    async fn copy_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = options.to_log_params();
        let stream = pods
            .log_stream(pod, &params)
            .await
            .context(LogStreamSnafu { namespace, pod })?;
        futures::io::copy(stream, sink)
            .await
            .context(CopyLogSnafu { pod })
    }
}
