//! Local automation server process (chromedriver, geckodriver, Selenium).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::browser_finder::find_driver_executable;
use crate::error::{Error, Result};
use crate::process;
use crate::webdriver::WebDriverClient;

/// Placeholder replaced by the server port in [`DriverServerOptions::command`].
pub const PORT_PLACEHOLDER: &str = "{port}";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to start the automation server.
#[derive(Debug, Clone)]
pub struct DriverServerOptions {
	/// Program followed by its arguments; `{port}` is substituted.
	pub command: Vec<String>,
	pub port: u16,
	/// Upper bound for the server to report ready on `/status`.
	pub startup_timeout: Duration,
}

impl DriverServerOptions {
	/// `chromedriver --port={port}`.
	pub fn chromedriver(port: u16) -> Self {
		Self {
			command: vec!["chromedriver".to_string(), format!("--port={PORT_PLACEHOLDER}")],
			port,
			startup_timeout: Duration::from_secs(20),
		}
	}

	fn resolved_command(&self) -> Result<(String, Vec<String>)> {
		let port = self.port.to_string();
		let mut parts = self.command.iter().map(|part| part.replace(PORT_PLACEHOLDER, &port));
		let program = parts
			.next()
			.ok_or_else(|| Error::Context("WebDriver server command is empty".into()))?;
		Ok((program, parts.collect()))
	}
}

/// A running automation server, killed by [`DriverServer::stop`] or on drop.
#[derive(Debug)]
pub struct DriverServer {
	child: Child,
	port: u16,
}

impl DriverServer {
	/// Spawns the server and waits until it reports ready.
	pub async fn start(options: &DriverServerOptions) -> Result<Self> {
		let (program, args) = options.resolved_command()?;
		let executable = find_driver_executable(&program)
			.ok_or_else(|| Error::Context(format!("WebDriver server executable `{program}` was not found")))?;

		info!(target = "unitrun.webdriver", executable = %executable.display(), port = options.port, "starting WebDriver server");
		let mut child = Command::new(&executable)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| Error::Context(format!("Failed to start {}: {}", executable.display(), e)))?;

		if let Some(stdout) = child.stdout.take() {
			tokio::spawn(forward_output(stdout, "stdout"));
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(forward_output(stderr, "stderr"));
		}

		let client = WebDriverClient::new(&format!("http://127.0.0.1:{}", options.port))?;
		let deadline = tokio::time::Instant::now() + options.startup_timeout;
		loop {
			if let Some(status) = child.try_wait()? {
				return Err(Error::Context(format!("WebDriver server exited during startup (status: {status})")));
			}
			match client.status().await {
				Ok(status) if status.ready => break,
				Ok(status) => debug!(target = "unitrun.webdriver", message = %status.message, "WebDriver server not ready"),
				Err(e) => debug!(target = "unitrun.webdriver", error = %e, "WebDriver server not reachable yet"),
			}
			if tokio::time::Instant::now() >= deadline {
				process::terminate(&mut child).await?;
				return Err(Error::Timeout {
					after: options.startup_timeout,
					what: "WebDriver server readiness".to_string(),
				});
			}
			tokio::time::sleep(READY_POLL_INTERVAL).await;
		}

		info!(target = "unitrun.webdriver", port = options.port, "WebDriver server started");
		Ok(Self { child, port: options.port })
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Kills the server process.
	pub async fn stop(mut self) -> Result<()> {
		process::terminate(&mut self.child).await?;
		info!(target = "unitrun.webdriver", port = self.port, "WebDriver server stopped");
		Ok(())
	}
}

async fn forward_output<R: AsyncRead + Unpin>(stream: R, channel: &'static str) {
	let mut lines = BufReader::new(stream).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		debug!(target = "unitrun.webdriver.server", channel, "{line}");
	}
}
