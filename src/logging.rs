use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging to stderr so stdout stays clean for JSON output.
///
/// `RUST_LOG` wins when set; otherwise only this crate's events at `level` are shown.
pub fn init_logging(level: &str) -> Result<(), TryInitError> {
    let default_filter = format!("stackplan={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init()?;

    tracing::debug!(level, "stackplan logging initialized");
    Ok(())
}
