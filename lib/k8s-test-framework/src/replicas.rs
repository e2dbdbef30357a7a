//! Wait for a number of pod replicas to reach a lifecycle stage.
//!
//! Every wait re-lists the namespace on each poll and matches pods by name
//! substring, so replicas of a Deployment or StatefulSet are found by their
//! common prefix.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::{
    cluster::Cluster,
    pods::{
        are_pod_conditions_met, find_all_pods_in_schema, name_contains, pod_phase, PodPhase,
        CONDITION_TRUE, POD_READY, POD_SCHEDULED,
    },
    wait::{self, PollSettings},
    Result,
};

/// Pods whose name contains `expected_name`.
pub fn created<'a>(pods: &'a [Pod], expected_name: &str) -> Vec<&'a Pod> {
    pods.iter()
        .filter(|pod| name_contains(*pod, expected_name))
        .collect()
}

/// Matching pods the scheduler has placed. Completed pods are ignored.
pub fn scheduled<'a>(pods: &'a [Pod], expected_name: &str) -> Vec<&'a Pod> {
    created(pods, expected_name)
        .into_iter()
        .filter(|pod| pod_phase(pod) != PodPhase::Succeeded)
        .filter(|pod| are_pod_conditions_met(pod, POD_SCHEDULED, CONDITION_TRUE))
        .collect()
}

/// Matching pods reporting `Ready`.
pub fn ready<'a>(pods: &'a [Pod], expected_name: &str) -> Vec<&'a Pod> {
    created(pods, expected_name)
        .into_iter()
        .filter(|pod| are_pod_conditions_met(pod, POD_READY, CONDITION_TRUE))
        .collect()
}

/// First matching pod in a terminal phase.
pub fn terminated<'a>(pods: &'a [Pod], expected_name: &str) -> Option<&'a Pod> {
    pods.iter()
        .find(|pod| name_contains(*pod, expected_name) && pod_phase(pod).is_terminal())
}

fn joined_names(pods: &[&Pod]) -> String {
    pods.iter()
        .map(|pod| pod.name_any())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wait until exactly `nr_replicas` pods matching `expected_name` exist.
pub async fn await_nr_replicas_created<C>(
    cluster: &C,
    namespace: &str,
    expected_name: &str,
    nr_replicas: usize,
    poll: PollSettings,
) -> Result<()>
where
    C: Cluster + ?Sized,
{
    let description = format!("{nr_replicas} pods CREATED for name '{expected_name}'");
    wait::until(&description, poll, move || async move {
        let pods = find_all_pods_in_schema(cluster, namespace).await?;
        let matching = created(&pods, expected_name);
        info!(
            "{} pods CREATED for name '{}': expected={}, pods=[{}]",
            matching.len(),
            expected_name,
            nr_replicas,
            joined_names(&matching)
        );
        Ok(matching.len() == nr_replicas)
    })
    .await
}

/// Wait until exactly `nr_replicas` pods matching `expected_name` are
/// scheduled.
pub async fn await_nr_replicas_scheduled<C>(
    cluster: &C,
    namespace: &str,
    expected_name: &str,
    nr_replicas: usize,
    poll: PollSettings,
) -> Result<()>
where
    C: Cluster + ?Sized,
{
    let description = format!("{nr_replicas} pods SCHEDULED for name '{expected_name}'");
    wait::until(&description, poll, move || async move {
        let pods = find_all_pods_in_schema(cluster, namespace).await?;
        let matching = scheduled(&pods, expected_name);
        for pod in &matching {
            let phase = pod_phase(pod);
            if !matches!(phase, PodPhase::Pending | PodPhase::Running) {
                warn!("Unexpected phase for pod {}: {}", pod.name_any(), phase);
            }
        }
        info!(
            "{} pods SCHEDULED for name '{}': expected={}, pods=[{}]",
            matching.len(),
            expected_name,
            nr_replicas,
            joined_names(&matching)
        );
        Ok(matching.len() == nr_replicas)
    })
    .await
}

/// Wait until exactly `nr_replicas` pods matching `expected_name` are ready.
pub async fn await_nr_replicas_ready<C>(
    cluster: &C,
    namespace: &str,
    expected_name: &str,
    nr_replicas: usize,
    poll: PollSettings,
) -> Result<()>
where
    C: Cluster + ?Sized,
{
    let description = format!("{nr_replicas} pods READY for name '{expected_name}'");
    wait::until(&description, poll, move || async move {
        let pods = find_all_pods_in_schema(cluster, namespace).await?;
        let count = ready(&pods, expected_name).len();
        info!("{} pods READY for name '{}'", count, expected_name);
        Ok(count == nr_replicas)
    })
    .await
}

/// Wait until a pod matching `expected_name` has succeeded or failed.
pub async fn await_pod_terminated<C>(
    cluster: &C,
    namespace: &str,
    expected_name: &str,
    poll: PollSettings,
) -> Result<()>
where
    C: Cluster + ?Sized,
{
    let description = format!("pod TERMINATED for name '{expected_name}'");
    wait::until(&description, poll, move || async move {
        let pods = find_all_pods_in_schema(cluster, namespace).await?;
        match terminated(&pods, expected_name) {
            Some(pod) => {
                info!(
                    "Pod {} has terminated with phase: {}",
                    pod.name_any(),
                    pod_phase(pod)
                );
                Ok(true)
            }
            None => Ok(false),
        }
    })
    .await
}
