use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "RESTYLE_LOG";

/// Installs the stderr subscriber. `RESTYLE_LOG` takes an `EnvFilter`
/// directive; the default keeps only warnings.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
