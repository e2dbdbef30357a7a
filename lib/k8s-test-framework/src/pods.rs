//! Pod lookups.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};

use crate::{cluster::Cluster, Result};

/// Condition type set once the scheduler has bound the pod to a node.
pub const POD_SCHEDULED: &str = "PodScheduled";
/// Condition type set once every container passes its readiness probe.
pub const POD_READY: &str = "Ready";
/// Status of a condition that holds.
pub const CONDITION_TRUE: &str = "True";

/// Lifecycle phase of a pod, as reported in its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// `Succeeded` and `Failed` are final: the pod will not run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }

    fn as_str(self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase of `pod`; a pod without a reported phase is `Unknown`.
pub fn pod_phase(pod: &Pod) -> PodPhase {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .map_or(PodPhase::Unknown, PodPhase::from)
}

/// Whether `pod` reached a terminal phase.
pub fn is_terminated(pod: &Pod) -> bool {
    pod_phase(pod).is_terminal()
}

/// Whether any condition of `pod` has the given type and status.
pub fn are_pod_conditions_met(pod: &Pod, condition_type: &str, status: &str) -> bool {
    pod.status
        .as_ref()
        .and_then(|pod_status| pod_status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == condition_type && condition.status == status)
        })
}

/// Whether the name of `resource` contains `expected_name`.
pub fn name_contains<K: Resource>(resource: &K, expected_name: &str) -> bool {
    resource.name_any().contains(expected_name)
}

/// Stable sort by creation timestamp, newest first. Objects the API server
/// has not stamped yet go last.
pub fn sort_newest_first<K: Resource>(resources: &mut [K]) {
    resources.sort_by(|a, b| {
        let a = a.creation_timestamp().map(|time| time.0);
        let b = b.creation_timestamp().map(|time| time.0);
        b.cmp(&a)
    });
}

/// All pods of `namespace`, newest first.
pub async fn find_all_pods_in_schema<C>(cluster: &C, namespace: &str) -> Result<Vec<Pod>>
where
    C: Cluster + ?Sized,
{
    let mut pods = cluster.list_pods(namespace).await?;
    sort_newest_first(&mut pods);
    Ok(pods)
}

/// Pods of `namespace` whose name contains `expected_name`, newest first.
pub async fn find_pods_from_chart<C>(
    cluster: &C,
    namespace: &str,
    expected_name: &str,
) -> Result<Vec<Pod>>
where
    C: Cluster + ?Sized,
{
    let pods = find_all_pods_in_schema(cluster, namespace).await?;
    Ok(pods
        .into_iter()
        .filter(|pod| name_contains(pod, expected_name))
        .collect())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{mock::MockCluster, test_util::TestPod};

    fn names(pods: &[Pod]) -> Vec<String> {
        pods.iter().map(ResourceExt::name_any).collect()
    }

    #[test]
    fn phase_parsing() {
        assert_eq!(pod_phase(&TestPod::new("a").phase("Running").build()), PodPhase::Running);
        assert_eq!(pod_phase(&TestPod::new("a").phase("Evicted").build()), PodPhase::Unknown);
        assert_eq!(pod_phase(&TestPod::new("a").build()), PodPhase::Unknown);
        assert!(is_terminated(&TestPod::new("a").phase("Failed").build()));
        assert!(is_terminated(&TestPod::new("a").phase("Succeeded").build()));
        assert!(!is_terminated(&TestPod::new("a").phase("Pending").build()));
        assert_eq!(PodPhase::Succeeded.to_string(), "Succeeded");
    }

    #[test]
    fn conditions_must_match_type_and_status() {
        let pod = TestPod::new("a")
            .condition(POD_SCHEDULED, CONDITION_TRUE)
            .condition(POD_READY, "False")
            .build();

        assert!(are_pod_conditions_met(&pod, POD_SCHEDULED, CONDITION_TRUE));
        assert!(!are_pod_conditions_met(&pod, POD_READY, CONDITION_TRUE));
        assert!(!are_pod_conditions_met(
            &TestPod::new("b").build(),
            POD_SCHEDULED,
            CONDITION_TRUE
        ));
    }

    #[test]
    fn sorts_newest_first_and_unstamped_last() {
        let mut pods = vec![
            TestPod::new("old").created_at(100).build(),
            TestPod::new("unstamped").build(),
            TestPod::new("new").created_at(300).build(),
            TestPod::new("mid-a").created_at(200).build(),
            TestPod::new("mid-b").created_at(200).build(),
        ];
        sort_newest_first(&mut pods);

        assert_eq!(names(&pods), vec!["new", "mid-a", "mid-b", "old", "unstamped"]);
    }

    #[tokio::test]
    async fn find_pods_from_chart_filters_by_substring() {
        let cluster = MockCluster::new().with_pods(vec![
            TestPod::new("xmtpd-node-1").created_at(10).build(),
            TestPod::new("anvil-0").created_at(20).build(),
            TestPod::new("xmtpd-node-2").created_at(30).build(),
        ]);

        let pods = find_pods_from_chart(&cluster, "default", "xmtpd").await.unwrap();
        assert_eq!(names(&pods), vec!["xmtpd-node-2", "xmtpd-node-1"]);

        let all = find_all_pods_in_schema(&cluster, "default").await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
