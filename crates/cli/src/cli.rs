use std::path::{Path, PathBuf};

use clap::Parser;
use unitrun::config::TargetUrl;
use unitrun::{BackendKind, RunConfig};

/// Runs a browser test page and collects its report.
#[derive(Parser, Debug)]
#[command(name = "unitrun")]
#[command(about = "Run a browser test page and collect its xUnit report")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON config file, or a package.json with a "unitrun" section
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Page to open, overriding the configured URL parts
	#[arg(long)]
	pub url: Option<String>,

	/// Write the report (to FILE, or to the configured path)
	#[arg(long, value_name = "FILE", num_args = 0..=1)]
	pub report: Option<Option<PathBuf>>,

	/// Collect the coverage report (to FILE, or to the configured path)
	#[arg(long, value_name = "FILE", num_args = 0..=1)]
	pub coverage: Option<Option<PathBuf>>,

	/// Drive the browser through a WebDriver server
	#[arg(long, conflicts_with = "provider")]
	pub selenium: bool,

	/// Backend to use (devtools or selenium)
	#[arg(long)]
	pub provider: Option<BackendKind>,

	/// Show the browser window
	#[arg(long)]
	pub head: bool,

	/// DevTools debugging port, or the local WebDriver server port
	#[arg(long, value_name = "PORT")]
	pub driver_port: Option<u16>,

	/// Chrome/Chromium binary for the devtools backend
	#[arg(long, value_name = "PATH")]
	pub chrome_path: Option<PathBuf>,

	/// Milliseconds between completion checks
	#[arg(long, value_name = "MS")]
	pub interval: Option<u64>,

	/// Milliseconds to wait for the page to finish
	#[arg(long, value_name = "MS")]
	pub timeout: Option<u64>,

	/// Implicit element wait in milliseconds
	#[arg(long, value_name = "MS")]
	pub implicit_timeout: Option<u64>,

	/// Navigation timeout in milliseconds
	#[arg(long, value_name = "MS")]
	pub page_load_timeout: Option<u64>,

	/// Script evaluation timeout in milliseconds
	#[arg(long, value_name = "MS")]
	pub script_timeout: Option<u64>,
}

impl Cli {
	/// Config file, then environment overrides, then flags.
	pub fn load_config(&self) -> unitrun::Result<RunConfig> {
		let mut config = match self.config_file() {
			Some(path) => RunConfig::load(&path)?,
			None => RunConfig::default(),
		};
		config.apply_process_env()?;
		self.apply(&mut config);
		Ok(config)
	}

	fn config_file(&self) -> Option<PathBuf> {
		if let Some(path) = &self.config {
			return Some(path.clone());
		}
		let package = Path::new("package.json");
		package.is_file().then(|| package.to_path_buf())
	}

	/// Applies command-line flags on top of `config`.
	pub fn apply(&self, config: &mut RunConfig) {
		if let Some(url) = &self.url {
			config.url = TargetUrl::Full(url.clone());
		}
		if let Some(report) = &self.report {
			config.write_report = true;
			if let Some(path) = report {
				config.report = path.clone();
			}
		}
		if let Some(coverage) = &self.coverage {
			config.write_coverage = true;
			if let Some(path) = coverage {
				config.json_coverage_report = path.clone();
			}
		}
		if self.selenium {
			config.provider = BackendKind::Selenium;
		} else if let Some(provider) = self.provider {
			config.provider = provider;
		}
		if self.head {
			config.head = true;
		}
		if let Some(port) = self.driver_port {
			config.driver_port = Some(port);
		}
		if let Some(path) = &self.chrome_path {
			config.chrome_path = Some(path.clone());
		}

		let timeouts = &mut config.timeouts;
		if let Some(interval) = self.interval {
			timeouts.interval = interval;
		}
		if let Some(timeout) = self.timeout {
			timeouts.timeout = timeout;
		}
		if let Some(implicit) = self.implicit_timeout {
			timeouts.implicit_timeout = implicit;
		}
		if let Some(page_load) = self.page_load_timeout {
			timeouts.page_load_timeout = page_load;
		}
		if let Some(script) = self.script_timeout {
			timeouts.script_timeout = script;
		}
	}
}
