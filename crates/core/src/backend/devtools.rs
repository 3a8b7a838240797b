//! Chromium driven directly over the DevTools protocol.
//!
//! DevTools has no element-query verb, so [`DevToolsSession::query_selector`]
//! evaluates `document.querySelector(...)` in the page and builds the
//! existence, text and value helpers out of further evaluations. Selectors
//! are embedded as JSON string literals, which are valid JavaScript strings.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use unitrun_protocol::cdp::{
	self, CaptureScreenshotParams, CaptureScreenshotResult, ConsoleApiCalled, EvaluateParams, EvaluateResult, Event, NavigateParams,
	NavigateResult, RemoteObject,
};
use unitrun_runtime::connection::wait_for_event;
use unitrun_runtime::{ChromeProcess, Connection, LaunchOptions, cdp_probe, process};

use super::{BackendKind, BackendTimeouts, ElementHandle, RemoteDriverBackend};
use crate::error::{Error, Result};

const START_ATTEMPTS: u32 = 5;
const START_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How to launch the browser.
#[derive(Debug, Clone, Default)]
pub struct DevToolsOptions {
	/// Requested debugging port; any free port when `None` or taken.
	pub port: Option<u16>,
	pub headless: bool,
	pub executable: Option<PathBuf>,
	pub extra_args: Vec<String>,
}

#[derive(Default)]
struct Attached {
	chrome: Option<ChromeProcess>,
	connection: Option<Arc<Connection>>,
	console: Option<JoinHandle<()>>,
}

/// Locally launched Chromium session.
pub struct DevToolsSession {
	options: DevToolsOptions,
	port: OnceLock<u16>,
	timeouts: Mutex<BackendTimeouts>,
	state: tokio::sync::Mutex<Attached>,
}

impl DevToolsSession {
	pub fn new(options: DevToolsOptions) -> Self {
		Self {
			options,
			port: OnceLock::new(),
			timeouts: Mutex::new(BackendTimeouts::default()),
			state: tokio::sync::Mutex::new(Attached::default()),
		}
	}

	fn assign_port(&self) -> unitrun_runtime::Result<u16> {
		if let Some(port) = self.port.get() {
			return Ok(*port);
		}
		let port = process::resolve_port(self.options.port)?;
		Ok(*self.port.get_or_init(|| port))
	}

	/// One launch + attach attempt. Returns a console subscription taken
	/// before `Runtime.enable` so replayed messages are not missed.
	async fn attach(&self, state: &mut Attached) -> unitrun_runtime::Result<broadcast::Receiver<Event>> {
		let port = self.assign_port()?;
		if state.chrome.is_none() {
			let chrome = ChromeProcess::launch(&LaunchOptions {
				executable: self.options.executable.clone(),
				port,
				headless: self.options.headless,
				extra_args: self.options.extra_args.clone(),
			})
			.await?;
			info!(target = "unitrun.devtools", port, headless = self.options.headless, "chrome started");
			state.chrome = Some(chrome);
		}

		let target = cdp_probe::fetch_page_target(port).await?;
		let ws_url = target
			.web_socket_debugger_url
			.ok_or_else(|| unitrun_runtime::Error::Context(format!("page target {} has no debugger URL", target.id)))?;
		let connection = Connection::connect(&ws_url).await?;
		let events = connection.subscribe();
		tokio::try_join!(
			connection.send(cdp::PAGE_ENABLE, json!({})),
			connection.send(cdp::RUNTIME_ENABLE, json!({})),
		)?;
		state.connection = Some(Arc::new(connection));
		Ok(events)
	}

	async fn connection(&self) -> Result<Arc<Connection>> {
		self.state
			.lock()
			.await
			.connection
			.clone()
			.ok_or_else(|| Error::Query("DevTools session is not started".into()))
	}

	fn script_timeout(&self) -> Duration {
		self.timeouts.lock().script
	}
}

#[async_trait]
impl RemoteDriverBackend for DevToolsSession {
	fn kind(&self) -> BackendKind {
		BackendKind::DevTools
	}

	fn port(&self) -> Option<u16> {
		self.port.get().copied()
	}

	fn is_headless(&self) -> bool {
		self.options.headless
	}

	async fn start_up(&self) -> Result<()> {
		let mut state = self.state.lock().await;
		if state.connection.is_some() {
			return Ok(());
		}

		let mut events = None;
		for attempt in 1..=START_ATTEMPTS {
			match self.attach(&mut state).await {
				Ok(subscription) => {
					events = Some(subscription);
					break;
				}
				Err(e) => {
					warn!(
						target = "unitrun.devtools",
						attempt,
						error = %e,
						"Connection try {attempt} of {START_ATTEMPTS} failed"
					);
					// Relaunch from scratch on the next attempt.
					state.connection = None;
					if let Some(chrome) = state.chrome.take() {
						if let Err(e) = chrome.kill().await {
							debug!(target = "unitrun.devtools", error = %e, "failed to kill browser after a failed attempt");
						}
					}
					tokio::time::sleep(START_RETRY_DELAY).await;
				}
			}
		}

		let Some(events) = events else {
			return Err(Error::Startup("ERRCHROMEDRV: Chrome driver hasn't been created".into()));
		};
		state.console = Some(tokio::spawn(forward_console(events)));
		Ok(())
	}

	async fn tear_down(&self) -> Result<()> {
		let mut state = self.state.lock().await;
		let mut first_error = None;

		if let Some(console) = state.console.take() {
			console.abort();
		}
		if let Some(chrome) = state.chrome.take() {
			if let Err(e) = chrome.kill().await {
				first_error.get_or_insert(e);
			}
		}
		if let Some(connection) = state.connection.take() {
			if let Err(e) = connection.close().await {
				first_error.get_or_insert(e);
			}
		}

		match first_error {
			Some(e) => Err(Error::Teardown(e.to_string())),
			None => {
				debug!(target = "unitrun.devtools", "session released");
				Ok(())
			}
		}
	}

	async fn open(&self, url: &str) -> Result<()> {
		let connection = self.connection().await.map_err(|e| Error::Navigation(e.to_string()))?;
		let page_load = self.timeouts.lock().page_load;
		let mut events = connection.subscribe();

		let result: NavigateResult = connection
			.call(cdp::PAGE_NAVIGATE, &NavigateParams { url: url.to_string() })
			.await
			.map_err(|e| Error::Navigation(e.to_string()))?;
		if let Some(text) = result.error_text {
			return Err(Error::Navigation(text));
		}

		wait_for_event(&mut events, cdp::PAGE_LOAD_EVENT_FIRED, page_load)
			.await
			.map_err(|e| Error::Navigation(e.to_string()))?;
		Ok(())
	}

	async fn query_selector(&self, selector: &str) -> Result<Box<dyn ElementHandle>> {
		let connection = self.connection().await?;
		let timeout = self.script_timeout();
		let query = query_expression(selector)?;
		let object = evaluate(&connection, query.clone(), false, timeout).await?;
		debug!(target = "unitrun.devtools", selector, exists = object.is_node(), "queried selector");
		Ok(Box::new(DevToolsElement {
			connection,
			query,
			exists: object.is_node(),
			timeout,
		}))
	}

	async fn save_screenshot(&self, path: &Path) -> Result<PathBuf> {
		let connection = self.connection().await.map_err(|e| Error::Screenshot(e.to_string()))?;
		let result: CaptureScreenshotResult = connection
			.call(cdp::PAGE_CAPTURE_SCREENSHOT, &CaptureScreenshotParams::default())
			.await
			.map_err(|e| Error::Screenshot(e.to_string()))?;
		let png = BASE64
			.decode(result.data.as_bytes())
			.map_err(|e| Error::Screenshot(format!("invalid screenshot data: {e}")))?;
		tokio::fs::write(path, png)
			.await
			.map_err(|e| Error::Screenshot(format!("failed to write {}: {e}", path.display())))?;
		Ok(path.to_path_buf())
	}

	async fn set_timeouts(&self, timeouts: BackendTimeouts) -> Result<()> {
		*self.timeouts.lock() = timeouts;
		Ok(())
	}
}

struct DevToolsElement {
	connection: Arc<Connection>,
	query: String,
	exists: bool,
	timeout: Duration,
}

#[async_trait]
impl ElementHandle for DevToolsElement {
	fn is_existing(&self) -> bool {
		self.exists
	}

	async fn text(&self) -> Result<String> {
		let object = evaluate(&self.connection, format!("{}.textContent", self.query), true, self.timeout).await?;
		Ok(object.value_text())
	}

	async fn value(&self) -> Result<String> {
		let object = evaluate(&self.connection, format!("{}.value", self.query), true, self.timeout).await?;
		Ok(object.value_text())
	}
}

fn query_expression(selector: &str) -> Result<String> {
	let literal = serde_json::to_string(selector).map_err(|e| Error::Query(e.to_string()))?;
	Ok(format!("document.querySelector({literal})"))
}

async fn evaluate(connection: &Connection, expression: String, return_by_value: bool, timeout: Duration) -> Result<RemoteObject> {
	let params = EvaluateParams {
		expression,
		return_by_value,
	};
	let result: EvaluateResult = tokio::time::timeout(timeout, connection.call(cdp::RUNTIME_EVALUATE, &params))
		.await
		.map_err(|_| Error::Query(format!("script evaluation timed out after {}ms", timeout.as_millis())))?
		.map_err(|e| Error::Query(e.to_string()))?;

	match result.exception_details {
		Some(details) => Err(Error::Query(details.message())),
		None => Ok(result.result),
	}
}

async fn forward_console(mut events: broadcast::Receiver<Event>) {
	loop {
		match events.recv().await {
			Ok(event) if event.method == cdp::RUNTIME_CONSOLE_API_CALLED => {
				let Ok(called) = serde_json::from_value::<ConsoleApiCalled>(event.params) else {
					continue;
				};
				if let Some(text) = called.error_text() {
					error!(target = "unitrun.devtools.console", "[ERROR] {text}");
				}
			}
			Ok(_) => {}
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				warn!(target = "unitrun.devtools", skipped, "console forwarding lagged");
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn selectors_are_embedded_as_string_literals() {
		assert_eq!(
			query_expression("body.tests-finished").unwrap(),
			r#"document.querySelector("body.tests-finished")"#
		);
		assert_eq!(
			query_expression(r#"input[name="a\b"]"#).unwrap(),
			r#"document.querySelector("input[name=\"a\\b\"]")"#
		);
	}

	#[tokio::test]
	async fn operations_before_start_up_fail_cleanly() {
		let session = DevToolsSession::new(DevToolsOptions::default());
		assert!(matches!(session.query_selector("#report").await, Err(Error::Query(_))));
		assert!(matches!(session.open("about:blank").await, Err(Error::Navigation(_))));
		assert!(matches!(
			session.save_screenshot(Path::new("shot.png")).await,
			Err(Error::Screenshot(_))
		));
		assert_eq!(session.port(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn start_up_gives_up_after_five_spaced_attempts() {
		let session = DevToolsSession::new(DevToolsOptions {
			headless: true,
			executable: Some(PathBuf::from("/nonexistent/unitrun/chrome")),
			..DevToolsOptions::default()
		});

		let started = tokio::time::Instant::now();
		let err = session.start_up().await.unwrap_err();

		assert!(matches!(&err, Error::Startup(message) if message == "ERRCHROMEDRV: Chrome driver hasn't been created"));
		assert_eq!(started.elapsed(), START_RETRY_DELAY * START_ATTEMPTS);
		let port = session.port().expect("port assigned on the first attempt");
		assert!(session.start_up().await.is_err());
		assert_eq!(session.port(), Some(port));
		session.tear_down().await.unwrap();
	}

	#[tokio::test]
	async fn tear_down_without_start_is_a_no_op() {
		let session = DevToolsSession::new(DevToolsOptions::default());
		session.tear_down().await.unwrap();
		session.tear_down().await.unwrap();
	}

	#[tokio::test]
	async fn timeouts_are_recorded() {
		let session = DevToolsSession::new(DevToolsOptions::default());
		let timeouts = BackendTimeouts {
			implicit: Duration::from_millis(1),
			page_load: Duration::from_millis(2),
			script: Duration::from_millis(3),
		};
		session.set_timeouts(timeouts).await.unwrap();
		assert_eq!(session.script_timeout(), Duration::from_millis(3));
	}
}
