use std::time::Duration;

use clap::{Args, Subcommand};
use k8s_test_framework::{replicas, Cluster, Framework};
use tracing::info;

use crate::cli::handle_error;

#[derive(Args, Debug)]
pub struct Opts {
    /// Give up after this many seconds instead of the stage's default.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub stage: Stage,
}

#[derive(Subcommand, Debug)]
pub enum Stage {
    /// Wait until the replicas exist.
    Created(Replicas),

    /// Wait until the replicas are bound to a node.
    Scheduled(Replicas),

    /// Wait until the replicas pass their readiness probes.
    Ready(Replicas),

    /// Wait until a pod has succeeded or failed.
    Terminated(Target),
}

#[derive(Args, Debug)]
pub struct Replicas {
    /// Namespace of the pods.
    pub namespace: String,

    /// Count pods whose name contains this.
    pub name: String,

    /// Number of replicas to wait for.
    #[arg(default_value_t = 1)]
    pub replicas: usize,
}

#[derive(Args, Debug)]
pub struct Target {
    /// Namespace of the pod.
    pub namespace: String,

    /// Wait for a pod whose name contains this.
    pub name: String,
}

pub async fn cmd<C: Cluster>(opts: &Opts, framework: &Framework<C>) -> exitcode::ExitCode {
    let config = framework.config();
    let cluster = framework.cluster();
    let poll = |default| config.poll(opts.timeout.map_or(default, Duration::from_secs));

    let result = match &opts.stage {
        Stage::Created(target) => {
            replicas::await_nr_replicas_created(
                cluster,
                &target.namespace,
                &target.name,
                target.replicas,
                poll(config.created_timeout),
            )
            .await
        }
        Stage::Scheduled(target) => {
            replicas::await_nr_replicas_scheduled(
                cluster,
                &target.namespace,
                &target.name,
                target.replicas,
                poll(config.scheduled_timeout),
            )
            .await
        }
        Stage::Ready(target) => {
            replicas::await_nr_replicas_ready(
                cluster,
                &target.namespace,
                &target.name,
                target.replicas,
                poll(config.ready_timeout),
            )
            .await
        }
        Stage::Terminated(target) => {
            replicas::await_pod_terminated(
                cluster,
                &target.namespace,
                &target.name,
                poll(config.terminated_timeout),
            )
            .await
        }
    };

    match result {
        Ok(()) => {
            info!(message = "Await finished.", stage = ?opts.stage);
            exitcode::OK
        }
        Err(error) => handle_error(&error),
    }
}
