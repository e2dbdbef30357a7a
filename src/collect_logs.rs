use std::sync::Arc;

use clap::Args;
use k8s_test_framework::{Cluster, Framework, LogCollectors, LogOptions};
use kube::ResourceExt;
use tracing::{error, info};

use crate::cli::handle_error;

#[derive(Args, Debug)]
pub struct Opts {
    /// Namespace of the pods.
    pub namespace: String,

    /// Collect every pod whose name contains this.
    pub name: String,

    /// Appended to the pod name in the log file name.
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Container to read. The app container is picked when unset.
    #[arg(long)]
    pub container: Option<String>,

    /// Read the logs of the previous invocation of the container.
    #[arg(long)]
    pub previous: bool,

    /// Prefix every line with its timestamp.
    #[arg(long)]
    pub timestamps: bool,

    /// Only the last lines of the log.
    #[arg(long, value_name = "LINES")]
    pub tail_lines: Option<i64>,

    /// Only the lines written in this many recent seconds.
    #[arg(long, value_name = "SECONDS")]
    pub since_seconds: Option<i64>,
}

impl Opts {
    fn log_options(&self) -> LogOptions {
        LogOptions {
            container: self.container.clone(),
            previous: self.previous,
            timestamps: self.timestamps,
            tail_lines: self.tail_lines,
            since_seconds: self.since_seconds,
        }
    }
}

/// Collect the logs of every matching pod concurrently and wait for all of
/// them. A pod whose collection fails is logged and does not change the exit
/// code.
pub async fn cmd<C>(opts: &Opts, framework: Arc<Framework<C>>) -> exitcode::ExitCode
where
    C: Cluster + 'static,
{
    let pods = match framework
        .find_pods_from_chart(&opts.namespace, &opts.name)
        .await
    {
        Ok(pods) => pods,
        Err(error) => return handle_error(&error),
    };
    if pods.is_empty() {
        error!(
            message = "No pods found.",
            namespace = %opts.namespace,
            name = %opts.name
        );
        return exitcode::NOINPUT;
    }

    let collectors = LogCollectors::new();
    for pod in &pods {
        collectors.spawn(
            Arc::clone(&framework),
            opts.namespace.clone(),
            pod.name_any(),
            opts.suffix.clone(),
            opts.log_options(),
        );
    }
    info!(message = "Collecting pod logs.", pods = pods.len());
    collectors.wait().await;

    exitcode::OK
}
