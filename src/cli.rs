use std::{io::IsTerminal, path::PathBuf, sync::Arc, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use k8s_test_framework::{
    config::{
        APP_CONTAINER_ENV, DEFAULT_APP_CONTAINER, DEFAULT_RESULT_DIR, POLL_INTERVAL_ENV,
        RESULT_DIR_ENV,
    },
    Cluster, Config, Error, Framework, KubeCluster,
};
use tracing::{debug, error};

use crate::{await_pods, collect_logs, trigger_cron_job, validate};

/// Exit code after Ctrl-C, as a shell reports a process killed by SIGINT.
pub const INTERRUPTED: exitcode::ExitCode = 130;

#[derive(Parser, Debug)]
#[command(name = "xmtpd-infra", version, about, infer_subcommands = true)]
pub struct Opts {
    #[command(flatten)]
    pub root: RootOpts,

    #[command(subcommand)]
    pub sub_command: SubCommand,
}

impl Opts {
    pub const fn log_level(&self) -> &'static str {
        let (quiet_level, verbose_level) = match self.sub_command {
            SubCommand::Validate(_) => {
                if self.root.verbose == 0 {
                    (self.root.quiet.saturating_add(1), self.root.verbose)
                } else {
                    (self.root.quiet, self.root.verbose - 1)
                }
            }
            SubCommand::Cluster(_) => (self.root.quiet, self.root.verbose),
        };
        match quiet_level {
            0 => match verbose_level {
                0 => "info",
                1 => "debug",
                2..=255 => "trace",
            },
            1 => "warn",
            2 => "error",
            3..=255 => "off",
        }
    }

    pub async fn run(self) -> exitcode::ExitCode {
        match self.sub_command {
            SubCommand::Validate(opts) => validate::validate(&opts),
            SubCommand::Cluster(command) => match self.root.framework().await {
                Ok(framework) => command.run(framework).await,
                Err(error) => handle_error(&error),
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct RootOpts {
    /// Kubeconfig context to connect through. The current context is used
    /// when unset.
    #[arg(long, env = "KUBE_CONTEXT")]
    pub context: Option<String>,

    /// Directory log files are written to, one subdirectory per namespace.
    #[arg(long, env = RESULT_DIR_ENV, default_value = DEFAULT_RESULT_DIR)]
    pub result_dir: PathBuf,

    /// Seconds between two evaluations of an awaited condition.
    #[arg(
        long,
        env = POLL_INTERVAL_ENV,
        default_value_t = 1,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,

    /// Container preferred when a pod has several.
    #[arg(long, env = APP_CONTAINER_ENV, default_value = DEFAULT_APP_CONTAINER)]
    pub app_container: String,

    /// Enable more detailed internal logging. Repeat to increase level. Overridden by `--quiet`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce detail of internal logging. Repeat to reduce further. Overrides `--verbose`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Control when ANSI terminal formatting is used.
    ///
    /// `auto` enables it when stderr is a terminal.
    #[arg(long, value_enum, default_value_t = Color::Auto, env = "XMTPD_INFRA_COLOR")]
    pub color: Color,
}

impl RootOpts {
    pub fn config(&self) -> Config {
        Config {
            result_dir: self.result_dir.clone(),
            poll_interval: Duration::from_secs(self.poll_interval),
            app_container: self.app_container.clone(),
            ..Config::default()
        }
    }

    pub async fn framework(&self) -> k8s_test_framework::Result<Framework<KubeCluster>> {
        let cluster = match &self.context {
            Some(context) => KubeCluster::with_context(context).await?,
            None => KubeCluster::try_default().await?,
        };
        debug!(message = "Connected to cluster.", ?cluster);
        Ok(Framework::new(cluster, self.config()))
    }
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Validate the Kubernetes manifests, then exit.
    Validate(validate::Opts),

    #[command(flatten)]
    Cluster(ClusterCommand),
}

/// Commands that talk to a cluster.
#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Copy the logs of matching pods under the result directory.
    Logs(collect_logs::Opts),

    /// Wait for replicas to reach a lifecycle stage.
    Await(await_pods::Opts),

    /// Run a CronJob now, as a one-off Job.
    TriggerCronJob(trigger_cron_job::Opts),
}

impl ClusterCommand {
    pub async fn run<C>(self, framework: Framework<C>) -> exitcode::ExitCode
    where
        C: Cluster + 'static,
    {
        match self {
            ClusterCommand::Logs(opts) => collect_logs::cmd(&opts, Arc::new(framework)).await,
            ClusterCommand::Await(opts) => await_pods::cmd(&opts, &framework).await,
            ClusterCommand::TriggerCronJob(opts) => {
                trigger_cron_job::cmd(&opts, &framework).await
            }
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Auto,
    Always,
    Never,
}

impl Color {
    pub fn use_color(self) -> bool {
        match self {
            Color::Auto => std::io::stderr().is_terminal(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

pub fn exit_code(error: &Error) -> exitcode::ExitCode {
    match error {
        Error::Timeout { .. } => exitcode::TEMPFAIL,
        Error::InvalidEnv { .. } | Error::ZeroPollInterval { .. } | Error::Kubeconfig { .. } => {
            exitcode::CONFIG
        }
        Error::ClientInit { .. } => exitcode::UNAVAILABLE,
        Error::CreateLogFile { .. } | Error::CopyLog { .. } => exitcode::IOERR,
        _ => exitcode::SOFTWARE,
    }
}

pub fn handle_error(error: &Error) -> exitcode::ExitCode {
    error!(message = "Command failed.", %error);
    if let Error::Timeout {
        started_at,
        stack_trace,
        ..
    } = error
    {
        debug!(message = "Stack trace of timed out await.", %started_at, %stack_trace);
    }
    exit_code(error)
}
