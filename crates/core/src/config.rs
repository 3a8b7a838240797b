//! Run configuration.
//!
//! Layers, later ones winning:
//!
//! 1. [`RunConfig::default`]
//! 2. a JSON file, either a bare config object or a `package.json` with a
//!    `"unitrun"` section ([`RunConfig::load`])
//! 3. environment variables ([`RunConfig::apply_env`])
//! 4. command-line flags, applied by the binary

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unitrun_runtime::DriverServerOptions;
use url::Url;

use crate::backend::{BackendKind, RemoteSessionOptions};
use crate::error::{Error, Result};
use crate::loader::Sentinels;
use crate::poller::PollConfig;

/// Key of the config section inside `package.json`.
pub const PACKAGE_SECTION: &str = "unitrun";

/// chromedriver's own default port.
pub const DEFAULT_DRIVER_PORT: u16 = 9515;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
	pub url: TargetUrl,
	/// Report path, used when [`write_report`](Self::write_report) is set.
	pub report: PathBuf,
	/// Coverage path, used when [`write_coverage`](Self::write_coverage) is set.
	pub json_coverage_report: PathBuf,
	#[serde(skip)]
	pub write_report: bool,
	#[serde(skip)]
	pub write_coverage: bool,
	pub provider: BackendKind,
	/// Show the browser window.
	pub head: bool,
	/// Debugging port for DevTools, server port for a local WebDriver server.
	pub driver_port: Option<u16>,
	pub chrome_path: Option<PathBuf>,
	pub chrome_args: Vec<String>,
	pub timeouts: TimeoutSettings,
	pub sentinels: Sentinels,
	pub webdriver: WebDriverSettings,
}

impl Default for RunConfig {
	fn default() -> Self {
		Self {
			url: TargetUrl::default(),
			report: PathBuf::from("artifacts/xunit-report.xml"),
			json_coverage_report: PathBuf::from("artifacts/coverage.json"),
			write_report: false,
			write_coverage: false,
			provider: BackendKind::default(),
			head: false,
			driver_port: None,
			chrome_path: None,
			chrome_args: Vec::new(),
			timeouts: TimeoutSettings::default(),
			sentinels: Sentinels::default(),
			webdriver: WebDriverSettings::default(),
		}
	}
}

/// Page under test, given whole or in parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetUrl {
	Full(String),
	Parts(UrlParts),
}

impl Default for TargetUrl {
	fn default() -> Self {
		TargetUrl::Parts(UrlParts::default())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UrlParts {
	pub scheme: String,
	pub host: String,
	pub port: u16,
	pub path: String,
	pub query: String,
	/// Host the page is reachable on from a WebDriver browser; replaces
	/// `host` for the selenium provider.
	pub remote_host: Option<String>,
}

impl Default for UrlParts {
	fn default() -> Self {
		Self {
			scheme: "http".to_string(),
			host: "localhost".to_string(),
			port: 1024,
			path: "testing.html".to_string(),
			query: "reporter=XUnit".to_string(),
			remote_host: None,
		}
	}
}

impl UrlParts {
	pub fn build(&self, provider: BackendKind) -> String {
		let host = match (provider, &self.remote_host) {
			(BackendKind::Selenium, Some(host)) => host,
			_ => &self.host,
		};
		format!(
			"{}://{}:{}/{}?{}",
			self.scheme,
			host,
			self.port,
			self.path.trim_start_matches('/'),
			self.query
		)
	}
}

/// Polling and backend timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutSettings {
	pub interval: u64,
	pub timeout: u64,
	pub implicit_timeout: u64,
	pub page_load_timeout: u64,
	pub script_timeout: u64,
}

impl Default for TimeoutSettings {
	fn default() -> Self {
		Self {
			interval: 5000,
			timeout: 240_000,
			implicit_timeout: 5000,
			page_load_timeout: 10_000,
			script_timeout: 10_000,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebDriverSettings {
	pub remote: RemoteSettings,
	/// Local server command; `{port}` is replaced by the server port.
	pub server_command: Vec<String>,
	/// Milliseconds the local server may take to report ready.
	pub startup_timeout: u64,
}

impl Default for WebDriverSettings {
	fn default() -> Self {
		let server = DriverServerOptions::chromedriver(DEFAULT_DRIVER_PORT);
		Self {
			remote: RemoteSettings::default(),
			server_command: server.command,
			startup_timeout: u64::try_from(server.startup_timeout.as_millis()).unwrap_or(u64::MAX),
		}
	}
}

impl WebDriverSettings {
	pub fn session_options(&self, driver_port: Option<u16>, headless: bool) -> RemoteSessionOptions {
		RemoteSessionOptions {
			remote: self.remote.enabled,
			remote_url: self.remote.url(),
			remote_port: self.remote.port,
			server: DriverServerOptions {
				command: self.server_command.clone(),
				port: driver_port.unwrap_or(DEFAULT_DRIVER_PORT),
				startup_timeout: Duration::from_millis(self.startup_timeout),
			},
			browser_name: self.remote.browser_name.clone(),
			headless,
		}
	}
}

/// An automation server started by someone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteSettings {
	pub enabled: bool,
	pub host: String,
	pub port: u16,
	pub path: String,
	pub browser_name: String,
}

impl Default for RemoteSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			host: "localhost".to_string(),
			port: 4444,
			path: "/wd/hub".to_string(),
			browser_name: "chrome".to_string(),
		}
	}
}

impl RemoteSettings {
	pub fn url(&self) -> String {
		format!("http://{}:{}/{}", self.host, self.port, self.path.trim_start_matches('/'))
	}
}

impl RunConfig {
	/// Reads a config file on top of the defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
		let value: Value =
			serde_json::from_str(&text).map_err(|e| Error::Config(format!("{} is not valid JSON: {e}", path.display())))?;
		Self::from_value(value, path.file_name().is_some_and(|name| name == "package.json"))
	}

	fn from_value(mut value: Value, is_package: bool) -> Result<Self> {
		if let Some(section) = value.get_mut(PACKAGE_SECTION) {
			value = section.take();
		} else if is_package {
			return Ok(Self::default());
		}
		serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))
	}

	/// Applies the process environment.
	pub fn apply_process_env(&mut self) -> Result<()> {
		self.apply_env(|key| std::env::var(key).ok())
	}

	/// Applies overrides looked up through `var`.
	pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
		if let Some(report) = var("test_report").filter(|v| !v.is_empty()) {
			self.report = PathBuf::from(report);
		}

		if let TargetUrl::Parts(parts) = &mut self.url {
			if let Some(scheme) = var("test_url_scheme") {
				parts.scheme = scheme;
			}
			if let Some(host) = var("test_url_host") {
				parts.remote_host = Some(host);
			}
			if let Some(port) = var("test_url_port") {
				parts.port = parse_port("test_url_port", &port)?;
			}
			if let Some(path) = var("test_url_path") {
				parts.path = path;
			}
			if let Some(query) = var("test_url_query") {
				parts.query = query;
			}
		}

		let remote = &mut self.webdriver.remote;
		if let Some(enabled) = var("WEBDRIVER_REMOTE_ENABLED") {
			remote.enabled = parse_flag(&enabled);
		}
		if let Some(host) = var("WEBDRIVER_REMOTE_HOST") {
			remote.host = host;
		}
		if let Some(port) = var("WEBDRIVER_REMOTE_PORT") {
			remote.port = parse_port("WEBDRIVER_REMOTE_PORT", &port)?;
		}
		if let Some(path) = var("WEBDRIVER_REMOTE_PATH") {
			remote.path = path;
		}
		if let Some(browser) = var("WEBDRIVER_REMOTE_CAPABILITIES_BROWSERNAME").filter(|v| !v.is_empty()) {
			remote.browser_name = browser;
		}
		Ok(())
	}

	/// The URL to open.
	pub fn target_url(&self) -> Result<Url> {
		let raw = match &self.url {
			TargetUrl::Full(url) => url.clone(),
			TargetUrl::Parts(parts) => parts.build(self.provider),
		};
		Url::parse(&raw).map_err(|e| Error::Config(format!("invalid target URL `{raw}`: {e}")))
	}

	pub fn poll_config(&self) -> Result<PollConfig> {
		let t = &self.timeouts;
		if t.interval == 0 {
			return Err(Error::Config("poll interval must be greater than zero".into()));
		}
		if t.timeout == 0 {
			return Err(Error::Config("poll timeout must be greater than zero".into()));
		}
		Ok(PollConfig {
			interval: Duration::from_millis(t.interval),
			timeout: Duration::from_millis(t.timeout),
			implicit_element_timeout: Duration::from_millis(t.implicit_timeout),
			page_load_timeout: Duration::from_millis(t.page_load_timeout),
			script_timeout: Duration::from_millis(t.script_timeout),
		})
	}

	pub fn report_file(&self) -> Option<&Path> {
		self.write_report.then_some(self.report.as_path())
	}

	pub fn coverage_report_file(&self) -> Option<&Path> {
		self.write_coverage.then_some(self.json_coverage_report.as_path())
	}

	/// Checks everything a run needs before any backend starts.
	pub fn validate(&self) -> Result<()> {
		self.target_url()?;
		self.poll_config()?;
		if self.provider == BackendKind::Selenium && self.webdriver.remote.enabled {
			Url::parse(&self.webdriver.remote.url())
				.map_err(|e| Error::Config(format!("invalid WebDriver server URL: {e}")))?;
		} else if self.provider == BackendKind::Selenium && self.webdriver.server_command.is_empty() {
			return Err(Error::Config("WebDriver server command is empty".into()));
		}
		Ok(())
	}
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
	value
		.trim()
		.parse()
		.map_err(|_| Error::Config(format!("{key} must be a port number, got `{value}`")))
}

fn parse_flag(value: &str) -> bool {
	match value.trim().parse::<f64>() {
		Ok(number) => number != 0.0,
		Err(_) => !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "false" | "no" | "off"),
	}
}
