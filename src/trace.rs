use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable replacing the level computed from `-v`/`-q`.
pub const LOG_ENV: &str = "XMTPD_INFRA_LOG";

/// Install the global subscriber. Logs go to stderr so that command output on
/// stdout stays clean.
pub fn init(color: bool, levels: &str) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(levels));

    let subscriber = FmtSubscriber::builder()
        .with_ansi(color)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    // Ignore errors when setting, since tests can initialize this
    // multiple times.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
