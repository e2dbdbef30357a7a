//! Consistency checks across a set of manifests.

use std::{collections::BTreeSet, fmt};

use k8s_openapi::api::{
    batch::v1::Job,
    core::v1::{Container, PodSpec},
};

use super::Manifest;

/// Binary the node-registration Job runs.
pub const REGISTRATION_CLI: &str = "xmtpd-cli";

/// Flags the node-registration command must pass: node owner address, admin
/// key, node public key and node ID.
pub const REGISTRATION_FLAGS: [&str; 4] = [
    "--node-owner-address",
    "--admin.private-key",
    "--node-signing-key-pub",
    "--node-id",
];

/// An inconsistency found in a set of manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// A `$(VAR)` reference in a command or its arguments has no matching
    /// environment variable, so the kubelet passes it through verbatim.
    UndefinedVariable {
        workload: String,
        container: String,
        variable: String,
    },
    /// The registration command lacks one of [`REGISTRATION_FLAGS`].
    MissingRegistrationFlag { job: String, flag: &'static str },
    /// No Job runs the registration CLI.
    NoRegistrationJob,
    /// A Service selects no Deployment's pods.
    UnmatchedServiceSelector { service: String },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::UndefinedVariable {
                workload,
                container,
                variable,
            } => write!(
                f,
                "{workload}: container {container} references undefined variable $({variable})"
            ),
            Problem::MissingRegistrationFlag { job, flag } => {
                write!(f, "Job/{job}: registration command is missing {flag}")
            }
            Problem::NoRegistrationJob => {
                write!(f, "no Job runs {REGISTRATION_CLI} register-node")
            }
            Problem::UnmatchedServiceSelector { service } => {
                write!(f, "Service/{service}: selector matches no Deployment")
            }
        }
    }
}

/// Names referenced as `$(NAME)` in `value`. `$$` escapes a dollar sign.
pub fn variable_references(value: &str) -> Vec<&str> {
    let mut references = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('$') {
        let after = &rest[start + 1..];
        if let Some(escaped) = after.strip_prefix('$') {
            rest = escaped;
            continue;
        }
        if let Some(body) = after.strip_prefix('(') {
            if let Some(end) = body.find(')') {
                references.push(&body[..end]);
                rest = &body[end + 1..];
                continue;
            }
        }
        rest = after;
    }
    references
}

fn pod_spec(manifest: &Manifest) -> Option<&PodSpec> {
    match manifest {
        Manifest::Deployment(deployment) => deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref()),
        Manifest::Job(job) => job
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref()),
        Manifest::ConfigMap(_) | Manifest::Service(_) => None,
    }
}

fn all_containers(spec: &PodSpec) -> impl Iterator<Item = &Container> {
    spec.init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
}

/// Variables the kubelet defines for `container`: its `env` entries and the
/// keys of ConfigMaps it imports through `envFrom`, when they are part of the
/// set.
fn defined_variables(container: &Container, manifests: &[Manifest]) -> BTreeSet<String> {
    let mut defined: BTreeSet<String> = container
        .env
        .iter()
        .flatten()
        .map(|var| var.name.clone())
        .collect();

    for source in container.env_from.iter().flatten() {
        let Some(name) = source
            .config_map_ref
            .as_ref()
            .and_then(|config_map_ref| config_map_ref.name.as_deref())
        else {
            continue;
        };
        let prefix = source.prefix.as_deref().unwrap_or_default();
        let config_map = manifests.iter().find_map(|manifest| match manifest {
            Manifest::ConfigMap(config_map) if manifest.name() == name => Some(config_map),
            _ => None,
        });
        if let Some(data) = config_map.and_then(|config_map| config_map.data.as_ref()) {
            defined.extend(data.keys().map(|key| format!("{prefix}{key}")));
        }
    }
    defined
}

fn check_variables(manifests: &[Manifest], problems: &mut Vec<Problem>) {
    for manifest in manifests {
        let Some(spec) = pod_spec(manifest) else {
            continue;
        };
        for container in all_containers(spec) {
            let defined = defined_variables(container, manifests);
            let words = container
                .command
                .iter()
                .flatten()
                .chain(container.args.iter().flatten());
            for word in words {
                for variable in variable_references(word) {
                    if !defined.contains(variable) {
                        problems.push(Problem::UndefinedVariable {
                            workload: manifest.to_string(),
                            container: container.name.clone(),
                            variable: variable.to_owned(),
                        });
                    }
                }
            }
        }
    }
}

fn runs_registration(container: &Container) -> bool {
    let binary = container
        .command
        .as_ref()
        .and_then(|command| command.first())
        .and_then(|binary| binary.rsplit('/').next());
    let subcommand = container.args.iter().flatten().any(|arg| arg == "register-node");
    binary == Some(REGISTRATION_CLI) && subcommand
}

fn registration_container(job: &Job) -> Option<&Container> {
    job.spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|spec| spec.containers.iter().find(|c| runs_registration(c)))
}

/// Jobs running the node-registration CLI.
pub fn registration_jobs(manifests: &[Manifest]) -> Vec<&Job> {
    manifests
        .iter()
        .filter_map(|manifest| match manifest {
            Manifest::Job(job) if registration_container(job).is_some() => Some(job),
            _ => None,
        })
        .collect()
}

fn has_flag(container: &Container, flag: &str) -> bool {
    container
        .command
        .iter()
        .flatten()
        .chain(container.args.iter().flatten())
        .any(|word| {
            word == flag
                || word
                    .strip_prefix(flag)
                    .is_some_and(|value| value.starts_with('='))
        })
}

fn check_registration(manifests: &[Manifest], problems: &mut Vec<Problem>) {
    for job in registration_jobs(manifests) {
        let Some(container) = registration_container(job) else {
            continue;
        };
        for flag in REGISTRATION_FLAGS {
            if !has_flag(container, flag) {
                problems.push(Problem::MissingRegistrationFlag {
                    job: job.metadata.name.clone().unwrap_or_default(),
                    flag,
                });
            }
        }
    }
}

fn check_service_selectors(manifests: &[Manifest], problems: &mut Vec<Problem>) {
    let template_labels: Vec<_> = manifests
        .iter()
        .filter_map(|manifest| match manifest {
            Manifest::Deployment(deployment) => deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.template.metadata.as_ref())
                .and_then(|metadata| metadata.labels.as_ref()),
            _ => None,
        })
        .collect();

    for manifest in manifests {
        let Manifest::Service(service) = manifest else {
            continue;
        };
        let Some(selector) = service
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref())
            .filter(|selector| !selector.is_empty())
        else {
            continue;
        };
        let matched = template_labels.iter().any(|labels| {
            selector
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
        });
        if !matched {
            problems.push(Problem::UnmatchedServiceSelector {
                service: manifest.name().to_owned(),
            });
        }
    }
}

/// Problems within `manifests`, in manifest order.
pub fn check(manifests: &[Manifest]) -> Vec<Problem> {
    let mut problems = Vec::new();
    check_variables(manifests, &mut problems);
    check_registration(manifests, &mut problems);
    check_service_selectors(manifests, &mut problems);
    problems
}

/// [`check`], additionally requiring a node-registration Job.
pub fn check_deployment(manifests: &[Manifest]) -> Vec<Problem> {
    let mut problems = check(manifests);
    if registration_jobs(manifests).is_empty() {
        problems.push(Problem::NoRegistrationJob);
    }
    problems
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use indoc::indoc;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::manifests::parse_documents;

    fn parse(yaml: &str) -> Vec<Manifest> {
        parse_documents(Path::new("test.yaml"), yaml).unwrap()
    }

    const REGISTRATION_JOB: &str = indoc! {r#"
        apiVersion: batch/v1
        kind: Job
        metadata:
          name: register-node
        spec:
          template:
            spec:
              restartPolicy: OnFailure
              containers:
                - name: register-node
                  image: ghcr.io/xmtp/xmtpd-cli:latest
                  command: ["/usr/bin/xmtpd-cli"]
                  args:
                    - register-node
                    - --node-owner-address=$(NODE_OWNER_ADDRESS)
                    - --admin.private-key=$(ADMIN_PRIVATE_KEY)
                    - --node-signing-key-pub
                    - $(NODE_SIGNING_KEY_PUB)
                    - --node-id=$$(literal)
                  env:
                    - name: NODE_OWNER_ADDRESS
                      value: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
                    - name: NODE_SIGNING_KEY_PUB
                      value: "0x02ba5734d8f7091719471e7f7ed6b9df170dc70cc661ca05e688601ad984f068b0"
    "#};

    #[test]
    fn finds_variable_references() {
        assert_eq!(variable_references("--chain-id=$(CHAIN_ID)"), vec!["CHAIN_ID"]);
        assert_eq!(variable_references("$(A):$(B)"), vec!["A", "B"]);
        assert_eq!(variable_references("$$(ESCAPED) $(REAL)"), vec!["REAL"]);
        assert_eq!(variable_references("$HOME $(UNTERMINATED"), Vec::<&str>::new());
        assert_eq!(variable_references("cost: $5"), Vec::<&str>::new());
    }

    #[test]
    fn registration_job_problems() {
        let manifests = parse(REGISTRATION_JOB);
        assert_eq!(registration_jobs(&manifests).len(), 1);

        let problems = check(&manifests);
        assert_eq!(
            problems,
            vec![Problem::UndefinedVariable {
                workload: "Job/register-node".to_owned(),
                container: "register-node".to_owned(),
                variable: "ADMIN_PRIVATE_KEY".to_owned(),
            }]
        );
    }

    #[test]
    fn missing_registration_flag_is_reported() {
        let yaml = REGISTRATION_JOB.replace("--node-id=$$(literal)", "--verbose");
        let problems = check(&parse(&yaml));
        assert!(problems.contains(&Problem::MissingRegistrationFlag {
            job: "register-node".to_owned(),
            flag: "--node-id",
        }));
    }

    #[test]
    fn flag_prefix_is_not_a_match() {
        let yaml = REGISTRATION_JOB.replace("--node-id=$$(literal)", "--node-identity=7");
        let problems = check(&parse(&yaml));
        assert!(problems.contains(&Problem::MissingRegistrationFlag {
            job: "register-node".to_owned(),
            flag: "--node-id",
        }));
    }

    #[test]
    fn env_from_config_map_defines_variables() {
        let yaml = indoc! {r#"
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: anvil-config
            data:
              CHAIN_ID: "31337"
            ---
            apiVersion: apps/v1
            kind: Deployment
            metadata:
              name: anvil
            spec:
              selector:
                matchLabels:
                  app: anvil
              template:
                metadata:
                  labels:
                    app: anvil
                spec:
                  containers:
                    - name: anvil
                      command: ["anvil"]
                      args: ["--chain-id", "$(ANVIL_CHAIN_ID)", "--block-time", "$(BLOCK_TIME)"]
                      envFrom:
                        - prefix: ANVIL_
                          configMapRef:
                            name: anvil-config
        "#};

        let problems = check(&parse(yaml));
        assert_eq!(
            problems,
            vec![Problem::UndefinedVariable {
                workload: "Deployment/anvil".to_owned(),
                container: "anvil".to_owned(),
                variable: "BLOCK_TIME".to_owned(),
            }]
        );
    }

    #[test]
    fn service_selector_must_match_a_deployment() {
        let yaml = indoc! {r#"
            apiVersion: apps/v1
            kind: Deployment
            metadata:
              name: anvil
            spec:
              selector:
                matchLabels:
                  app: anvil
              template:
                metadata:
                  labels:
                    app: anvil
                    tier: chain
                spec:
                  containers:
                    - name: anvil
            ---
            apiVersion: v1
            kind: Service
            metadata:
              name: anvil
            spec:
              selector:
                app: anvil
            ---
            apiVersion: v1
            kind: Service
            metadata:
              name: orphan
            spec:
              selector:
                app: anvil
                tier: storage
        "#};

        let problems = check(&parse(yaml));
        assert_eq!(
            problems,
            vec![Problem::UnmatchedServiceSelector {
                service: "orphan".to_owned()
            }]
        );
    }

    #[test]
    fn deployment_requires_registration_job() {
        let problems = check_deployment(&[]);
        assert_eq!(problems, vec![Problem::NoRegistrationJob]);
        assert_eq!(
            Problem::NoRegistrationJob.to_string(),
            "no Job runs xmtpd-cli register-node"
        );
    }
}
