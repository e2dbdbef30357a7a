//! Tooling around the xmtpd deployment descriptors.
//!
//! The `xmtpd-infra` binary validates the manifests under
//! `deploy/kubernetes` and drives the [`k8s_test_framework`] helpers from the
//! command line: copy pod logs, wait for replicas and trigger CronJobs.

#![deny(missing_debug_implementations)]

pub mod await_pods;
pub mod cli;
pub mod collect_logs;
pub mod manifests;
pub mod trace;
pub mod trigger_cron_job;
pub mod validate;
