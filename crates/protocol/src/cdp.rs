//! Chrome DevTools Protocol messages.
//!
//! Requests carry a numeric `id`; the browser answers with a response echoing
//! that id, or pushes an event that has a `method` but no `id`:
//!
//! ```json
//! {"id": 7, "method": "Runtime.evaluate", "params": {"expression": "1 + 1"}}
//! {"id": 7, "result": {"result": {"type": "number", "value": 2}}}
//! {"method": "Page.loadEventFired", "params": {"timestamp": 1234.5}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PAGE_ENABLE: &str = "Page.enable";
pub const PAGE_NAVIGATE: &str = "Page.navigate";
pub const PAGE_CAPTURE_SCREENSHOT: &str = "Page.captureScreenshot";
pub const PAGE_LOAD_EVENT_FIRED: &str = "Page.loadEventFired";
pub const RUNTIME_ENABLE: &str = "Runtime.enable";
pub const RUNTIME_EVALUATE: &str = "Runtime.evaluate";
pub const RUNTIME_CONSOLE_API_CALLED: &str = "Runtime.consoleAPICalled";

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub id: u64,
	pub method: String,
	pub params: Value,
}

/// Reply to a [`Request`] with the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

/// Error member of a failed [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Unsolicited notification pushed by an enabled domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Anything read off the socket. Responses are recognised by their `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
}

/// Mirror object describing a JavaScript value in the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subtype: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub class_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object_id: Option<String>,
}

impl RemoteObject {
	/// `true` when the object is a DOM node, i.e. a selector matched.
	pub fn is_node(&self) -> bool {
		self.kind == "object" && self.subtype.as_deref() == Some("node")
	}

	/// Primitive value rendered as text; `null`/`undefined` become empty.
	pub fn value_text(&self) -> String {
		match &self.value {
			Some(Value::String(text)) => text.clone(),
			Some(Value::Null) | None => String::new(),
			Some(other) => other.to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
	pub expression: String,
	pub return_by_value: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	pub text: String,
	#[serde(default)]
	pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
	/// Most specific message available for the thrown value.
	pub fn message(&self) -> String {
		self.exception
			.as_ref()
			.and_then(|exception| exception.description.clone())
			.unwrap_or_else(|| self.text.clone())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateParams {
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
	#[serde(default)]
	pub frame_id: Option<String>,
	#[serde(default)]
	pub error_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureScreenshotParams {
	pub format: String,
	pub from_surface: bool,
}

impl Default for CaptureScreenshotParams {
	fn default() -> Self {
		Self {
			format: "png".to_string(),
			from_surface: true,
		}
	}
}

/// Base64-encoded image data.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureScreenshotResult {
	pub data: String,
}

/// Params of `Runtime.consoleAPICalled`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleApiCalled {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub args: Vec<RemoteObject>,
}

impl ConsoleApiCalled {
	/// Text worth logging for a `console.error(...)` call, if any.
	///
	/// Error objects are reported by their description (message and stack),
	/// primitives by their value.
	pub fn error_text(&self) -> Option<String> {
		if self.kind != "error" {
			return None;
		}
		let first = self.args.first()?;
		if first.subtype.as_deref() == Some("error") {
			return first.description.clone();
		}
		match &first.value {
			Some(Value::Null) | None => None,
			Some(_) => Some(first.value_text()),
		}
	}
}

/// `/json/version` response subset.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "Browser")]
	pub browser: Option<String>,
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
}

/// One entry of `/json/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub web_socket_debugger_url: Option<String>,
}
