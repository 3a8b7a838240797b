//! Remote browser backends.
//!
//! Every backend exposes the same small contract so the loader never needs
//! to know which automation protocol is underneath:
//!
//! | operation | effect |
//! |---|---|
//! | [`start_up`](RemoteDriverBackend::start_up) | browser reachable, control channel open |
//! | [`open`](RemoteDriverBackend::open) | navigate and wait for the load signal |
//! | [`query_selector`](RemoteDriverBackend::query_selector) | look up one element |
//! | [`save_screenshot`](RemoteDriverBackend::save_screenshot) | write a PNG |
//! | [`tear_down`](RemoteDriverBackend::tear_down) | release the process and connection |
//!
//! [`RemoteSession`] talks W3C WebDriver to an automation server,
//! [`DevToolsSession`] launches Chromium itself and speaks the DevTools
//! protocol.

mod devtools;
mod webdriver;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use devtools::{DevToolsOptions, DevToolsSession};
pub use webdriver::{RemoteSession, RemoteSessionOptions};

use crate::config::RunConfig;
use crate::error::Result;

/// Which automation protocol drives the browser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
	/// Locally launched Chromium over the DevTools protocol.
	#[default]
	DevTools,
	/// WebDriver session on a (possibly remote) automation server.
	Selenium,
}

impl fmt::Display for BackendKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BackendKind::DevTools => f.write_str("devtools"),
			BackendKind::Selenium => f.write_str("selenium"),
		}
	}
}

impl FromStr for BackendKind {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"devtools" | "chrome" | "cdp" => Ok(BackendKind::DevTools),
			"selenium" | "webdriver" => Ok(BackendKind::Selenium),
			other => Err(format!("unknown provider `{other}` (expected `devtools` or `selenium`)")),
		}
	}
}

/// Session-level timeouts applied once before polling starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
	/// How long element lookups may wait for the element to appear.
	pub implicit: Duration,
	/// Upper bound for a navigation to complete.
	pub page_load: Duration,
	/// Upper bound for a single script evaluation.
	pub script: Duration,
}

impl Default for BackendTimeouts {
	fn default() -> Self {
		Self {
			implicit: Duration::from_millis(5000),
			page_load: Duration::from_millis(10000),
			script: Duration::from_millis(10000),
		}
	}
}

/// Result of [`RemoteDriverBackend::query_selector`].
#[async_trait]
pub trait ElementHandle: Send + Sync {
	/// Whether the selector matched an element.
	fn is_existing(&self) -> bool;

	/// Text content of the element.
	async fn text(&self) -> Result<String>;

	/// The element's `value` property.
	async fn value(&self) -> Result<String>;
}

#[async_trait]
pub trait RemoteDriverBackend: Send + Sync {
	fn kind(&self) -> BackendKind;

	/// Debugging or automation port; `None` until assigned.
	fn port(&self) -> Option<u16>;

	fn is_headless(&self) -> bool;

	/// Brings the browser up. Calling it on a started session is a no-op.
	async fn start_up(&self) -> Result<()>;

	/// Releases whatever [`start_up`](Self::start_up) acquired, including
	/// after a partial start.
	async fn tear_down(&self) -> Result<()>;

	async fn open(&self, url: &str) -> Result<()>;

	async fn query_selector(&self, selector: &str) -> Result<Box<dyn ElementHandle>>;

	/// Writes a PNG of the viewport to `path` and returns it.
	async fn save_screenshot(&self, path: &Path) -> Result<PathBuf>;

	async fn set_timeouts(&self, timeouts: BackendTimeouts) -> Result<()>;
}

/// Builds the backend selected by `config.provider`.
pub fn create(config: &RunConfig) -> Box<dyn RemoteDriverBackend> {
	let headless = !config.head;
	match config.provider {
		BackendKind::DevTools => Box::new(DevToolsSession::new(DevToolsOptions {
			port: config.driver_port,
			headless,
			executable: config.chrome_path.clone(),
			extra_args: config.chrome_args.clone(),
		})),
		BackendKind::Selenium => Box::new(RemoteSession::new(config.webdriver.session_options(config.driver_port, headless))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn provider_names() {
		assert_eq!("selenium".parse::<BackendKind>(), Ok(BackendKind::Selenium));
		assert_eq!("Chrome".parse::<BackendKind>(), Ok(BackendKind::DevTools));
		assert!("firefox".parse::<BackendKind>().is_err());
		assert_eq!(BackendKind::default(), BackendKind::DevTools);
	}

	#[test]
	fn factory_honours_provider_and_head() {
		let mut config = RunConfig::default();
		let backend = create(&config);
		assert_eq!(backend.kind(), BackendKind::DevTools);
		assert!(backend.is_headless());
		assert_eq!(backend.port(), None);

		config.provider = BackendKind::Selenium;
		config.head = true;
		let backend = create(&config);
		assert_eq!(backend.kind(), BackendKind::Selenium);
		assert!(!backend.is_headless());
	}
}
