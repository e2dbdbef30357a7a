use std::path::PathBuf;

use clap::Args;
use tracing::error;

use crate::manifests::{self, Manifest};

#[derive(Args, Debug)]
pub struct Opts {
    /// Directory holding the manifests. Every `*.yaml` and `*.yml` file is
    /// loaded.
    #[arg(long, env = "XMTPD_INFRA_MANIFESTS_DIR", default_value = "deploy/kubernetes")]
    pub dir: PathBuf,

    /// Do not require a node-registration Job.
    #[arg(long)]
    pub no_registration: bool,
}

/// Load and check the manifests, printing one line per manifest and per
/// problem.
pub fn validate(opts: &Opts) -> exitcode::ExitCode {
    let loaded = match manifests::load_dir(&opts.dir) {
        Ok(loaded) => loaded,
        Err(error) => {
            error!(message = "Failed to load manifests.", %error);
            return load_error_code(&error);
        }
    };

    for (path, manifest) in &loaded {
        println!("√ Loaded {manifest} from {}", path.display());
    }

    let manifests: Vec<Manifest> = loaded.into_iter().map(|(_, manifest)| manifest).collect();
    let problems = if opts.no_registration {
        manifests::check(&manifests)
    } else {
        manifests::check_deployment(&manifests)
    };

    if problems.is_empty() {
        println!("√ {} manifests are consistent", manifests.len());
        exitcode::OK
    } else {
        for problem in &problems {
            println!("x {problem}");
        }
        exitcode::DATAERR
    }
}

fn load_error_code(error: &manifests::Error) -> exitcode::ExitCode {
    match error {
        manifests::Error::ReadDir { source, .. }
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            exitcode::NOINPUT
        }
        manifests::Error::ReadDir { .. } | manifests::Error::ReadFile { .. } => exitcode::IOERR,
        manifests::Error::Parse { .. }
        | manifests::Error::MissingKind { .. }
        | manifests::Error::UnsupportedKind { .. } => exitcode::CONFIG,
    }
}
