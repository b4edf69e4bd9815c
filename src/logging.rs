use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// RUST_LOG wins, otherwise info for everything
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
