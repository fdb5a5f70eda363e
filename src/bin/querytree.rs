// querytree command-line entry point.
// Usage: querytree replay --schema schema.yaml --tree tree.json --commands commands.json [--trace]
//        querytree check --schema schema.yaml --tree tree.json
// Log level is read from RUST_LOG (default: warn); logs go to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    querytree::cli::run();
}
