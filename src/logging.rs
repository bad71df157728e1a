use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging on stderr. Console output of the
/// benchmark itself stays on stdout.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_filter = if verbose { "debug" } else { "info,storbench=debug" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    tracing::debug!("storbench logging initialized");
    Ok(())
}
