//! WebDriver session on an automation server.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::{debug, info, warn};
use unitrun_protocol::webdriver::{ElementRef, NewSessionRequest, Timeouts};
use unitrun_runtime::{DriverServer, DriverServerOptions, WebDriverClient, WebDriverSession, process};

use super::{BackendKind, BackendTimeouts, ElementHandle, RemoteDriverBackend};
use crate::error::{Error, Result};

/// Where the automation server lives and which browser it should open.
#[derive(Debug, Clone)]
pub struct RemoteSessionOptions {
	/// Use an already running server at `remote_url` instead of starting one.
	pub remote: bool,
	pub remote_url: String,
	pub remote_port: u16,
	/// Local server to start when not in remote mode.
	pub server: DriverServerOptions,
	pub browser_name: String,
	pub headless: bool,
}

#[derive(Default)]
struct State {
	server: Option<DriverServer>,
	session: Option<WebDriverSession>,
}

pub struct RemoteSession {
	options: RemoteSessionOptions,
	port: OnceLock<u16>,
	state: tokio::sync::Mutex<State>,
}

impl RemoteSession {
	pub fn new(options: RemoteSessionOptions) -> Self {
		let port = OnceLock::new();
		if options.remote {
			let _ = port.set(options.remote_port);
		}
		Self {
			options,
			port,
			state: tokio::sync::Mutex::new(State::default()),
		}
	}

	async fn session(&self) -> Option<WebDriverSession> {
		self.state.lock().await.session.clone()
	}

	async fn start_server(&self) -> Result<DriverServer> {
		let requested = self.options.server.port;
		let port = match self.port.get() {
			Some(port) => *port,
			None => {
				let port = process::resolve_port(Some(requested)).map_err(|e| Error::Startup(e.to_string()))?;
				*self.port.get_or_init(|| port)
			}
		};
		info!(target = "unitrun.webdriver", port, "Starting WebDriver server");
		let options = DriverServerOptions {
			port,
			..self.options.server.clone()
		};
		DriverServer::start(&options)
			.await
			.map_err(|e| Error::Startup(format!("Can't start WebDriver server: {e}")))
	}
}

#[async_trait]
impl RemoteDriverBackend for RemoteSession {
	fn kind(&self) -> BackendKind {
		BackendKind::Selenium
	}

	fn port(&self) -> Option<u16> {
		self.port.get().copied()
	}

	fn is_headless(&self) -> bool {
		self.options.headless
	}

	async fn start_up(&self) -> Result<()> {
		let mut state = self.state.lock().await;
		if state.session.is_some() {
			return Ok(());
		}

		let base_url = if self.options.remote {
			self.options.remote_url.clone()
		} else {
			if state.server.is_none() {
				state.server = Some(self.start_server().await?);
			}
			let port = self.port().unwrap_or(self.options.server.port);
			format!("http://127.0.0.1:{port}")
		};

		debug!(
			target = "unitrun.webdriver",
			%base_url,
			browser = %self.options.browser_name,
			headless = self.options.headless,
			"Building WebDriver session"
		);
		let client = WebDriverClient::new(&base_url).map_err(|e| Error::Startup(e.to_string()))?;
		let session = client
			.new_session(&NewSessionRequest::for_browser(&self.options.browser_name, self.options.headless))
			.await
			.map_err(|e| Error::Startup(e.to_string()))?;
		info!(target = "unitrun.webdriver", session = session.id(), "WebDriver session started");
		state.session = Some(session);
		Ok(())
	}

	async fn tear_down(&self) -> Result<()> {
		let mut state = self.state.lock().await;

		let deleted = match state.session.take() {
			Some(session) => session.delete().await,
			None => Ok(()),
		};
		if let Err(e) = &deleted {
			warn!(target = "unitrun.webdriver", error = %e, "failed to delete WebDriver session");
		}

		// The server goes down even when the session could not be deleted.
		let stopped = match state.server.take() {
			Some(server) => server.stop().await,
			None => Ok(()),
		};

		deleted.and(stopped).map_err(|e| Error::Teardown(e.to_string()))
	}

	async fn open(&self, url: &str) -> Result<()> {
		let session = self
			.session()
			.await
			.ok_or_else(|| Error::Navigation("WebDriver session is not started".into()))?;
		session.navigate(url).await.map_err(|e| Error::Navigation(e.to_string()))
	}

	async fn query_selector(&self, selector: &str) -> Result<Box<dyn ElementHandle>> {
		let session = self
			.session()
			.await
			.ok_or_else(|| Error::Query("WebDriver session is not started".into()))?;
		let element = session
			.find_elements(selector)
			.await
			.map_err(|e| Error::Query(e.to_string()))?
			.into_iter()
			.next();
		debug!(target = "unitrun.webdriver", selector, exists = element.is_some(), "queried selector");
		Ok(Box::new(RemoteElement {
			session,
			selector: selector.to_string(),
			element,
		}))
	}

	async fn save_screenshot(&self, path: &Path) -> Result<PathBuf> {
		let session = self
			.session()
			.await
			.ok_or_else(|| Error::Screenshot("WebDriver session is not started".into()))?;
		let data = session.screenshot().await.map_err(|e| Error::Screenshot(e.to_string()))?;
		let png = BASE64
			.decode(data.as_bytes())
			.map_err(|e| Error::Screenshot(format!("invalid screenshot data: {e}")))?;
		tokio::fs::write(path, png)
			.await
			.map_err(|e| Error::Screenshot(format!("failed to write {}: {e}", path.display())))?;
		Ok(path.to_path_buf())
	}

	async fn set_timeouts(&self, timeouts: BackendTimeouts) -> Result<()> {
		let session = self
			.session()
			.await
			.ok_or_else(|| Error::Query("WebDriver session is not started".into()))?;
		session
			.set_timeouts(Timeouts {
				implicit: millis(timeouts.implicit),
				page_load: millis(timeouts.page_load),
				script: millis(timeouts.script),
			})
			.await
			.map_err(|e| Error::Query(e.to_string()))
	}
}

fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct RemoteElement {
	session: WebDriverSession,
	selector: String,
	element: Option<ElementRef>,
}

impl RemoteElement {
	fn element(&self) -> Result<&ElementRef> {
		self.element
			.as_ref()
			.ok_or_else(|| Error::Query(format!("no element matches `{}`", self.selector)))
	}
}

#[async_trait]
impl ElementHandle for RemoteElement {
	fn is_existing(&self) -> bool {
		self.element.is_some()
	}

	async fn text(&self) -> Result<String> {
		self.session
			.element_text(self.element()?)
			.await
			.map_err(|e| Error::Query(e.to_string()))
	}

	async fn value(&self) -> Result<String> {
		let value = self
			.session
			.element_property(self.element()?, "value")
			.await
			.map_err(|e| Error::Query(e.to_string()))?;
		Ok(match value {
			Value::String(text) => text,
			Value::Null => String::new(),
			other => other.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn options(remote: bool) -> RemoteSessionOptions {
		RemoteSessionOptions {
			remote,
			remote_url: "http://127.0.0.1:9/wd/hub".to_string(),
			remote_port: 9,
			server: DriverServerOptions::chromedriver(9515),
			browser_name: "chrome".to_string(),
			headless: true,
		}
	}

	#[test]
	fn remote_mode_knows_its_port_up_front() {
		assert_eq!(RemoteSession::new(options(true)).port(), Some(9));
		assert_eq!(RemoteSession::new(options(false)).port(), None);
	}

	#[tokio::test]
	async fn unreachable_remote_server_is_a_startup_error() {
		let session = RemoteSession::new(options(true));
		assert!(matches!(session.start_up().await, Err(Error::Startup(_))));
		session.tear_down().await.unwrap();
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn server_is_stopped_even_when_session_delete_fails() {
		use axum::http::StatusCode;
		use axum::routing::{delete, get, post};
		use axum::{Json, Router};
		use serde_json::json;

		let app = Router::new()
			.route("/status", get(|| async { Json(json!({"value": {"ready": true, "message": "ok"}})) }))
			.route(
				"/session",
				post(|| async { Json(json!({"value": {"sessionId": "L1", "capabilities": {}}})) }),
			)
			.route(
				"/session/{id}",
				delete(|| async {
					(
						StatusCode::INTERNAL_SERVER_ERROR,
						Json(json!({"value": {"error": "unknown error", "message": "browser crashed"}})),
					)
				}),
			);
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});

		// A long-lived stand-in process; readiness is answered by the router above.
		let session = RemoteSession::new(RemoteSessionOptions {
			server: DriverServerOptions {
				command: vec!["sleep".to_string(), "3600".to_string()],
				port,
				startup_timeout: Duration::from_secs(5),
			},
			..options(false)
		});
		session.port.set(port).unwrap();
		session.start_up().await.unwrap();
		assert!(session.state.lock().await.server.is_some());

		match session.tear_down().await {
			Err(Error::Teardown(message)) => assert!(message.contains("browser crashed"), "{message}"),
			other => panic!("unexpected result: {other:?}"),
		}
		let state = session.state.lock().await;
		assert!(state.server.is_none());
		assert!(state.session.is_none());
	}

	#[tokio::test]
	async fn queries_before_start_up_fail() {
		let session = RemoteSession::new(options(true));
		assert!(matches!(session.query_selector("#report").await, Err(Error::Query(_))));
		assert!(matches!(session.open("about:blank").await, Err(Error::Navigation(_))));
	}
}
