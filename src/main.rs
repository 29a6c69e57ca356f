use clap::Parser;
use fi_projection::api::{self, Cli};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    // Logs go to stderr so JSON on stdout stays machine-readable.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fi_projection=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = api::run_cli(cli).await {
        eprintln!("Error: {e}");
        for issue in e.issues() {
            eprintln!("  {} {}", issue.code.as_str(), issue.message);
        }
        std::process::exit(1);
    }
}
