//! Chromium process launch for DevTools sessions.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info};
use unitrun_protocol::cdp::VersionInfo;

use crate::browser_finder::find_chrome_executable;
use crate::cdp_probe::fetch_version;
use crate::error::{Error, Result};
use crate::process;

const PROBE_ATTEMPTS: u32 = 25;
const PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
	/// Explicit browser binary; discovered when `None`.
	pub executable: Option<PathBuf>,
	/// Remote debugging port.
	pub port: u16,
	pub headless: bool,
	/// Extra command-line switches appended after the defaults.
	pub extra_args: Vec<String>,
}

impl LaunchOptions {
	fn args(&self, user_data_dir: &std::path::Path) -> Vec<String> {
		let mut args = vec![
			format!("--remote-debugging-port={}", self.port),
			format!("--user-data-dir={}", user_data_dir.display()),
			"--disable-gpu".to_string(),
			"--no-sandbox".to_string(),
			"--no-first-run".to_string(),
			"--no-default-browser-check".to_string(),
		];
		if self.headless {
			args.push("--headless".to_string());
		}
		args.extend(self.extra_args.iter().cloned());
		args.push("about:blank".to_string());
		args
	}
}

/// A running browser with its DevTools endpoint reachable.
///
/// Owns the process and its throwaway profile directory; [`ChromeProcess::kill`]
/// releases both. Dropping without killing still terminates the process.
#[derive(Debug)]
pub struct ChromeProcess {
	child: Child,
	port: u16,
	version: VersionInfo,
	_user_data_dir: TempDir,
}

impl ChromeProcess {
	/// Starts the browser and waits until `/json/version` answers.
	pub async fn launch(options: &LaunchOptions) -> Result<Self> {
		let executable = find_chrome_executable(options.executable.as_deref()).ok_or_else(|| {
			Error::Context(
				"Could not find Chrome/Chromium executable. \
				 Install Chrome or point CHROME_PATH at the binary."
					.into(),
			)
		})?;
		let user_data_dir = tempfile::Builder::new().prefix("unitrun-profile-").tempdir()?;

		let mut command = Command::new(&executable);
		command
			.args(options.args(user_data_dir.path()))
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true);

		let mut child = command
			.spawn()
			.map_err(|e| Error::Context(format!("Failed to launch Chrome at {}: {}", executable.display(), e)))?;
		debug!(target = "unitrun.runtime", executable = %executable.display(), port = options.port, "browser spawned");

		let mut last_error = "endpoint not reachable".to_string();
		for _ in 0..PROBE_ATTEMPTS {
			tokio::time::sleep(PROBE_INTERVAL).await;

			if let Some(status) = child.try_wait()? {
				return Err(Error::Context(format!(
					"Chrome exited before debugging endpoint became available (status: {status})"
				)));
			}

			match fetch_version(options.port).await {
				Ok(version) => {
					info!(
						target = "unitrun.runtime",
						port = options.port,
						browser = version.browser.as_deref().unwrap_or("unknown"),
						headless = options.headless,
						"browser started"
					);
					return Ok(Self {
						child,
						port: options.port,
						version,
						_user_data_dir: user_data_dir,
					});
				}
				Err(e) => last_error = e.to_string(),
			}
		}

		process::terminate(&mut child).await?;
		Err(Error::Context(format!(
			"Chrome launched but debugging endpoint not available on port {}. Last error: {}",
			options.port, last_error
		)))
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn version(&self) -> &VersionInfo {
		&self.version
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.id()
	}

	/// Terminates the browser and removes its profile directory.
	pub async fn kill(mut self) -> Result<()> {
		process::terminate(&mut self.child).await?;
		debug!(target = "unitrun.runtime", port = self.port, "browser process stopped");
		Ok(())
	}
}
