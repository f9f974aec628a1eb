use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "REPOKIT_LOG";
const DEFAULT_FILTER: &str = "warn";

/// Installs the global stderr subscriber. Calling it again is a no-op.
pub fn init_logging() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    tracing::debug!("tracing initialized");
}
