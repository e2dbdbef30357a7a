//! Fixtures for tests exercising the framework against [`crate::mock::MockCluster`].

use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::core::v1::{
        Container, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
        ContainerStatus, Pod, PodCondition, PodSpec, PodStatus,
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time},
};

/// Install a tracing subscriber writing through the test harness.
pub fn trace_init() {
    let env_filter = std::env::var("TEST_LOG").unwrap_or_else(|_| "info".to_owned());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

/// A creation timestamp `secs` seconds after the epoch.
pub fn timestamp(secs: i64) -> Time {
    Time(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default())
}

/// State of a container in a [`TestPod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Waiting,
    Running,
    Terminated,
}

/// Builder for pods as the API server would report them.
#[derive(Debug, Clone)]
pub struct TestPod {
    name: String,
    created_at: Option<i64>,
    phase: Option<String>,
    conditions: Vec<(String, String)>,
    containers: Vec<(String, Option<(ContainerState, i32)>)>,
}

impl TestPod {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            created_at: None,
            phase: None,
            conditions: Vec::new(),
            containers: Vec::new(),
        }
    }

    pub fn created_at(mut self, secs: i64) -> Self {
        self.created_at = Some(secs);
        self
    }

    pub fn phase(mut self, phase: &str) -> Self {
        self.phase = Some(phase.to_owned());
        self
    }

    pub fn condition(mut self, condition_type: &str, status: &str) -> Self {
        self.conditions
            .push((condition_type.to_owned(), status.to_owned()));
        self
    }

    /// A container with a status in the given state.
    pub fn container(mut self, name: &str, state: ContainerState, restart_count: i32) -> Self {
        self.containers
            .push((name.to_owned(), Some((state, restart_count))));
        self
    }

    /// A container the kubelet has not reported a status for.
    pub fn container_spec_only(mut self, name: &str) -> Self {
        self.containers.push((name.to_owned(), None));
        self
    }

    pub fn build(self) -> Pod {
        let containers = self
            .containers
            .iter()
            .map(|(name, _)| Container {
                name: name.clone(),
                ..Container::default()
            })
            .collect();
        let container_statuses = self
            .containers
            .iter()
            .filter_map(|(name, state)| {
                state.map(|(state, restart_count)| container_status(name, state, restart_count))
            })
            .collect();
        let conditions = self
            .conditions
            .into_iter()
            .map(|(type_, status)| PodCondition {
                type_,
                status,
                ..PodCondition::default()
            })
            .collect();

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                creation_timestamp: self.created_at.map(timestamp),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers,
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                phase: self.phase,
                conditions: Some(conditions),
                container_statuses: Some(container_statuses),
                ..PodStatus::default()
            }),
        }
    }
}

fn container_status(name: &str, state: ContainerState, restart_count: i32) -> ContainerStatus {
    let state = match state {
        ContainerState::Waiting => k8s_openapi::api::core::v1::ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some("CrashLoopBackOff".to_owned()),
                ..ContainerStateWaiting::default()
            }),
            ..Default::default()
        },
        ContainerState::Running => k8s_openapi::api::core::v1::ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        },
        ContainerState::Terminated => k8s_openapi::api::core::v1::ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: 0,
                ..ContainerStateTerminated::default()
            }),
            ..Default::default()
        },
    };
    ContainerStatus {
        name: name.to_owned(),
        state: Some(state),
        restart_count,
        ..ContainerStatus::default()
    }
}
