use tracing_subscriber::{EnvFilter, fmt};

/// Env var read for the log filter, e.g. `TRAINER_LOG=trainer=debug`.
pub const LOG_ENV: &str = "TRAINER_LOG";

/// Installs the global fmt subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
