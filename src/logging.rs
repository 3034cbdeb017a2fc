use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset; dev builds are chattier.
pub fn default_level() -> &'static str {
    if cfg!(debug_assertions) { "debug" } else { "warn" }
}

/// Install the stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "trace" } else { default_level() })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init();
}
