use tracing_subscriber::{filter::Directive, EnvFilter};

const DEFAULT_DIRECTIVES: [&str; 2] = ["reporting_service=info", "reporting_client=info"];

/// Install the global `fmt` subscriber: `RUST_LOG` plus info level for the
/// reporting crates.
pub fn init_tracing() {
    let filter = DEFAULT_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
