//! W3C WebDriver HTTP client.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use unitrun_protocol::webdriver::{
	ElementRef, ErrorValue, FindElementsRequest, NewSessionRequest, NewSessionValue, StatusValue, Timeouts, UrlRequest, ValueEnvelope,
};
use url::Url;

use crate::error::{Error, Result};

/// Upper bound for `DELETE /session/{id}` so teardown cannot hang.
pub const SESSION_DELETE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for one automation server (chromedriver, geckodriver, Selenium).
#[derive(Debug, Clone)]
pub struct WebDriverClient {
	http: reqwest::Client,
	base: Url,
}

impl WebDriverClient {
	/// Creates a client for the server rooted at `base_url`,
	/// e.g. `http://localhost:4444/wd/hub`.
	pub fn new(base_url: &str) -> Result<Self> {
		let mut base = Url::parse(base_url)?;
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}
		Ok(Self {
			http: reqwest::Client::new(),
			base,
		})
	}

	pub fn base_url(&self) -> &Url {
		&self.base
	}

	/// Returns the server readiness report.
	pub async fn status(&self) -> Result<StatusValue> {
		self.command(Method::GET, "status", None::<&()>, Some(Duration::from_millis(500)))
			.await
	}

	/// Creates a browser session.
	pub async fn new_session(&self, request: &NewSessionRequest) -> Result<WebDriverSession> {
		let value: NewSessionValue = self.command(Method::POST, "session", Some(request), None).await?;
		debug!(target = "unitrun.webdriver", session = %value.session_id, "WebDriver session created");
		Ok(WebDriverSession {
			client: self.clone(),
			id: value.session_id,
		})
	}

	async fn command<B, T>(&self, method: Method, path: &str, body: Option<&B>, timeout: Option<Duration>) -> Result<T>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		let url = self.base.join(path)?;
		trace!(target = "unitrun.webdriver", %method, %url, "WebDriver command");

		let mut request = self.http.request(method, url);
		if let Some(body) = body {
			request = request.json(body);
		}
		if let Some(timeout) = timeout {
			request = request.timeout(timeout);
		}

		let response = request.send().await?;
		let status = response.status();
		let bytes = response.bytes().await?;
		let envelope: ValueEnvelope<Value> = serde_json::from_slice(&bytes).map_err(|e| {
			Error::Context(format!(
				"Malformed WebDriver response (HTTP {}): {}: {}",
				status,
				e,
				String::from_utf8_lossy(&bytes)
			))
		})?;

		if !status.is_success() {
			return Err(match serde_json::from_value::<ErrorValue>(envelope.value) {
				Ok(error) => Error::WebDriver {
					error: error.error,
					message: error.message,
				},
				Err(_) => Error::Context(format!("WebDriver request failed with HTTP {status}")),
			});
		}

		Ok(serde_json::from_value(envelope.value)?)
	}
}

/// An open WebDriver session.
#[derive(Debug, Clone)]
pub struct WebDriverSession {
	client: WebDriverClient,
	id: String,
}

impl WebDriverSession {
	pub fn id(&self) -> &str {
		&self.id
	}

	async fn command<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		self.command_within(method, path, body, None).await
	}

	async fn command_within<B, T>(&self, method: Method, path: &str, body: Option<&B>, timeout: Option<Duration>) -> Result<T>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		let path = if path.is_empty() {
			format!("session/{}", self.id)
		} else {
			format!("session/{}/{}", self.id, path)
		};
		self.client.command(method, &path, body, timeout).await
	}

	/// Navigates and returns once the page load strategy is satisfied.
	pub async fn navigate(&self, url: &str) -> Result<()> {
		let _: Value = self
			.command(Method::POST, "url", Some(&UrlRequest { url: url.to_string() }))
			.await?;
		Ok(())
	}

	pub async fn set_timeouts(&self, timeouts: Timeouts) -> Result<()> {
		let _: Value = self.command(Method::POST, "timeouts", Some(&timeouts)).await?;
		Ok(())
	}

	/// All elements matching the CSS `selector`; empty when nothing matches.
	pub async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>> {
		self.command(Method::POST, "elements", Some(&FindElementsRequest::css(selector)))
			.await
	}

	/// Rendered text of `element`.
	pub async fn element_text(&self, element: &ElementRef) -> Result<String> {
		self.command(Method::GET, &format!("element/{}/text", element.id), None::<&()>)
			.await
	}

	/// DOM property `name` of `element`.
	pub async fn element_property(&self, element: &ElementRef, name: &str) -> Result<Value> {
		self.command(Method::GET, &format!("element/{}/property/{}", element.id, name), None::<&()>)
			.await
	}

	/// Base64-encoded PNG of the current viewport.
	pub async fn screenshot(&self) -> Result<String> {
		self.command(Method::GET, "screenshot", None::<&()>).await
	}

	/// Ends the session and closes its browser, waiting at most
	/// [`SESSION_DELETE_TIMEOUT`].
	pub async fn delete(&self) -> Result<()> {
		self.delete_within(SESSION_DELETE_TIMEOUT).await
	}

	pub async fn delete_within(&self, timeout: Duration) -> Result<()> {
		let _: Value = self
			.command_within(Method::DELETE, "", None::<&()>, Some(timeout))
			.await?;
		debug!(target = "unitrun.webdriver", session = %self.id, "WebDriver session deleted");
		Ok(())
	}
}
