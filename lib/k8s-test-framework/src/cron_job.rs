//! Trigger CronJobs on demand.

use k8s_openapi::{
    api::batch::v1::{CronJob, Job},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::ResourceExt;
use snafu::OptionExt;
use tracing::info;

use crate::{
    cluster::Cluster,
    error::MissingJobTemplateSnafu,
    pods::{name_contains, sort_newest_first},
    Result,
};

/// All CronJobs of `namespace`, newest first.
pub async fn find_all_cron_jobs_in_schema<C>(cluster: &C, namespace: &str) -> Result<Vec<CronJob>>
where
    C: Cluster + ?Sized,
{
    let mut cron_jobs = cluster.list_cron_jobs(namespace).await?;
    sort_newest_first(&mut cron_jobs);
    Ok(cron_jobs)
}

/// CronJobs of `namespace` whose name contains `expected_name`, newest first.
pub async fn find_cron_jobs_from_chart<C>(
    cluster: &C,
    namespace: &str,
    expected_name: &str,
) -> Result<Vec<CronJob>>
where
    C: Cluster + ?Sized,
{
    let cron_jobs = find_all_cron_jobs_in_schema(cluster, namespace).await?;
    Ok(cron_jobs
        .into_iter()
        .filter(|cron_job| name_contains(cron_job, expected_name))
        .collect())
}

/// Build a Job equivalent to one scheduled run of `cron_job`.
///
/// The Job carries the labels of the job template and a copy of its spec.
pub fn job_from_cron_job(namespace: &str, cron_job: &CronJob, new_job_name: &str) -> Result<Job> {
    let template = cron_job.spec.as_ref().map(|spec| &spec.job_template);
    let spec = template
        .and_then(|template| template.spec.clone())
        .context(MissingJobTemplateSnafu {
            cron_job: cron_job.name_any(),
        })?;
    let labels = template
        .and_then(|template| template.metadata.as_ref())
        .and_then(|metadata| metadata.labels.clone());

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(new_job_name.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels,
            ..ObjectMeta::default()
        },
        spec: Some(spec),
        status: None,
    })
}

/// Create a Job named `new_job_name` from the template of `cron_job`.
pub async fn create_job_from_cron_job<C>(
    cluster: &C,
    namespace: &str,
    cron_job: &CronJob,
    new_job_name: &str,
) -> Result<Job>
where
    C: Cluster + ?Sized,
{
    let job = job_from_cron_job(namespace, cron_job, new_job_name)?;
    let created = cluster.create_job(namespace, &job).await?;
    info!(
        "Successfully created Job {} from CronJob {}",
        new_job_name,
        cron_job.name_any()
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::{
        batch::v1::{CronJobSpec, JobSpec, JobTemplateSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec},
    };
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{mock::MockCluster, test_util::timestamp, Error};

    fn cron_job(name: &str, created_at: i64) -> CronJob {
        let labels = BTreeMap::from([("app".to_owned(), "prune".to_owned())]);
        CronJob {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                creation_timestamp: Some(timestamp(created_at)),
                ..ObjectMeta::default()
            },
            spec: Some(CronJobSpec {
                schedule: "*/5 * * * *".to_owned(),
                job_template: JobTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(JobSpec {
                        backoff_limit: Some(2),
                        template: PodTemplateSpec {
                            spec: Some(PodSpec {
                                containers: vec![Container {
                                    name: "prune".to_owned(),
                                    image: Some("ghcr.io/xmtp/xmtpd-prune:latest".to_owned()),
                                    ..Container::default()
                                }],
                                restart_policy: Some("Never".to_owned()),
                                ..PodSpec::default()
                            }),
                            ..PodTemplateSpec::default()
                        },
                        ..JobSpec::default()
                    }),
                },
                ..CronJobSpec::default()
            }),
            status: None,
        }
    }

    #[test]
    fn job_copies_template_labels_and_spec() {
        let source = cron_job("xmtpd-prune", 10);
        let job = job_from_cron_job("xmtpd", &source, "prune-now").unwrap();

        assert_eq!(job.metadata.name.as_deref(), Some("prune-now"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("xmtpd"));
        assert_eq!(
            job.metadata.labels.unwrap().get("app").map(String::as_str),
            Some("prune")
        );
        assert_eq!(
            job.spec,
            source.spec.unwrap().job_template.spec,
            "job spec must be a copy of the template spec"
        );
    }

    #[test]
    fn missing_template_is_an_error() {
        let mut source = cron_job("broken", 10);
        source.spec.as_mut().unwrap().job_template.spec = None;

        let error = job_from_cron_job("xmtpd", &source, "x").unwrap_err();
        assert!(matches!(error, Error::MissingJobTemplate { cron_job } if cron_job == "broken"));
    }

    #[tokio::test]
    async fn finds_newest_matching_cron_job_and_creates_job() {
        let cluster = MockCluster::new().with_cron_jobs(vec![
            cron_job("xmtpd-prune-old", 10),
            cron_job("other", 30),
            cron_job("xmtpd-prune", 20),
        ]);

        let found = find_cron_jobs_from_chart(&cluster, "xmtpd", "xmtpd-prune")
            .await
            .unwrap();
        let names: Vec<_> = found.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["xmtpd-prune", "xmtpd-prune-old"]);

        let job = create_job_from_cron_job(&cluster, "xmtpd", &found[0], "prune-manual")
            .await
            .unwrap();
        assert_eq!(job.metadata.name.as_deref(), Some("prune-manual"));

        let created = cluster.created_jobs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "xmtpd");
        assert_eq!(created[0].1.metadata.name.as_deref(), Some("prune-manual"));
    }

    #[tokio::test]
    async fn duplicate_job_name_is_rejected() {
        let cluster = MockCluster::new();
        let source = cron_job("xmtpd-prune", 10);

        create_job_from_cron_job(&cluster, "xmtpd", &source, "prune-manual")
            .await
            .unwrap();
        let error = create_job_from_cron_job(&cluster, "xmtpd", &source, "prune-manual")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::CreateJob { .. }));
    }
}
