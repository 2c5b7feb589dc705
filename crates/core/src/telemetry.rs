use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global structured-logging subscriber. `default_filter` applies
/// when `RUST_LOG` is unset; level 0 maps to `info`, level 1 to `debug`.
///
/// Returns an error if a subscriber is already installed, which callers
/// embedding the engine in a larger process can safely ignore.
pub fn setup_logging(default_filter: &str) -> anyhow::Result<()> {
	let filter = match EnvFilter::try_from_default_env() {
		Ok(filter) => filter,
		Err(_) => EnvFilter::try_new(default_filter)?,
	};
	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_target(false))
		.try_init()?;
	Ok(())
}
