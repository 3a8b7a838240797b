//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub fn default_directives(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn,unitrun.coordinator=info",
		1 => "warn,unitrun=info",
		2 => "warn,unitrun=debug",
		_ => "debug,unitrun=trace",
	}
}

/// Installs the global subscriber writing to stderr. `RUST_LOG` wins over
/// `verbose`.
pub fn init_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose > 0)
		.try_init();
}
