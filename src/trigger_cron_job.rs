use clap::Args;
use k8s_openapi::api::core::v1::Pod;
use k8s_test_framework::{
    pods::{self, PodPhase},
    Cluster, Framework, LogOptions, Result,
};
use kube::ResourceExt;
use tracing::{error, info, warn};

use crate::cli::handle_error;

#[derive(Args, Debug)]
pub struct Opts {
    /// Namespace of the CronJob.
    pub namespace: String,

    /// CronJob name, or part of it. The newest match is run.
    pub cron_job: String,

    /// Name of the Job to create.
    pub job_name: String,

    /// Wait for the Job's pod to terminate, then write its logs.
    #[arg(long)]
    pub wait: bool,

    /// Appended to the pod name in the log file name.
    #[arg(long, default_value = "")]
    pub suffix: String,
}

pub async fn cmd<C: Cluster>(opts: &Opts, framework: &Framework<C>) -> exitcode::ExitCode {
    match trigger(opts, framework).await {
        Ok(code) => code,
        Err(error) => handle_error(&error),
    }
}

async fn trigger<C: Cluster>(opts: &Opts, framework: &Framework<C>) -> Result<exitcode::ExitCode> {
    let namespace = opts.namespace.as_str();
    let cron_jobs = framework
        .find_cron_jobs_from_chart(namespace, &opts.cron_job)
        .await?;
    let Some(cron_job) = cron_jobs.first() else {
        error!(message = "No CronJob found.", %namespace, name = %opts.cron_job);
        return Ok(exitcode::NOINPUT);
    };

    framework
        .create_job_from_cron_job(namespace, cron_job, &opts.job_name)
        .await?;
    if !opts.wait {
        return Ok(exitcode::OK);
    }

    framework
        .await_pod_terminated(namespace, &opts.job_name)
        .await?;
    let pods = framework
        .find_pods_from_chart(namespace, &opts.job_name)
        .await?;
    let Some(pod) = pods.iter().find(|pod| pods::is_terminated(pod)) else {
        warn!(message = "Terminated pod vanished before its logs were read.", job = %opts.job_name);
        return Ok(exitcode::TEMPFAIL);
    };

    let path = framework
        .get_terminated_pod_log(namespace, pod, &opts.suffix, job_log_options(pod))
        .await?;
    info!(message = "Wrote Job logs.", pod = %pod.name_any(), path = %path.display());

    match pods::pod_phase(pod) {
        PodPhase::Failed => {
            error!(message = "Job failed.", job = %opts.job_name);
            Ok(exitcode::SOFTWARE)
        }
        _ => Ok(exitcode::OK),
    }
}

fn job_log_options(pod: &Pod) -> LogOptions {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .map(|container| LogOptions::for_container(&container.name))
        .unwrap_or_default()
}
