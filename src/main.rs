use clap::Parser;
use tracing::info;
use xmtpd_infra::{
    cli::{Opts, INTERRUPTED},
    trace,
};

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    trace::init(opts.root.color.use_color(), opts.log_level());

    let code = tokio::select! {
        code = opts.run() => code,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted.");
            INTERRUPTED
        }
    };

    std::process::exit(code);
}
