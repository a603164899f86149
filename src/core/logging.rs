use crate::core::SyncError;

/// Installs the stderr subscriber used by the binary. `RUST_LOG` overrides the `info` default.
pub fn init() -> Result<(), SyncError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .map_err(|e| SyncError::Custom(format!("build log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| SyncError::Custom(format!("initialize tracing subscriber: {e}")))?;

    Ok(())
}
