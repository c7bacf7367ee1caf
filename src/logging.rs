//! `tracing-subscriber` initialization, matching the density and shape the
//! teacher wires up at its own process entry point: an `EnvFilter` defaulted
//! to `info`, honoring `RUST_LOG` when set.

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
