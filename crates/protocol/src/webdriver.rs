//! W3C WebDriver request and response bodies.
//!
//! Every WebDriver response wraps its payload in a `value` member. Errors use
//! the same envelope with an `error` code and a human readable `message`:
//!
//! ```json
//! {"value": {"sessionId": "abc", "capabilities": {"browserName": "chrome"}}}
//! {"value": {"error": "no such window", "message": "target window already closed"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Property name identifying a web element reference.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4a75f06f4c79";

/// `{"value": ...}` wrapper used by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueEnvelope<T> {
	pub value: T,
}

/// Payload of a failed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorValue {
	pub error: String,
	#[serde(default)]
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
	pub capabilities: CapabilitiesRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesRequest {
	pub always_match: Value,
}

impl NewSessionRequest {
	/// Session request for `browser_name`, adding headless switches for the
	/// browsers that understand them.
	pub fn for_browser(browser_name: &str, headless: bool) -> Self {
		let mut always_match = json!({ "browserName": browser_name });
		if headless {
			match browser_name {
				"chrome" | "chromium" => {
					always_match["goog:chromeOptions"] = json!({ "args": ["--headless", "--disable-gpu", "--no-sandbox"] });
				}
				"MicrosoftEdge" | "msedge" => {
					always_match["ms:edgeOptions"] = json!({ "args": ["--headless", "--disable-gpu"] });
				}
				"firefox" => {
					always_match["moz:firefoxOptions"] = json!({ "args": ["-headless"] });
				}
				_ => {}
			}
		}
		Self {
			capabilities: CapabilitiesRequest { always_match },
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionValue {
	pub session_id: String,
	#[serde(default)]
	pub capabilities: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRequest {
	pub url: String,
}

/// Body of `POST /session/{id}/elements`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindElementsRequest {
	pub using: String,
	pub value: String,
}

impl FindElementsRequest {
	pub fn css(selector: &str) -> Self {
		Self {
			using: "css selector".to_string(),
			value: selector.to_string(),
		}
	}
}

/// Reference to an element living in the remote page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
	#[serde(rename = "element-6066-11e4-a52f-4a75f06f4c79")]
	pub id: String,
}

/// Body of `POST /session/{id}/timeouts`, all values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
	pub implicit: u64,
	pub page_load: u64,
	pub script: u64,
}

/// Payload of `GET /status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusValue {
	#[serde(default)]
	pub ready: bool,
	#[serde(default)]
	pub message: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn element_reference_uses_w3c_key() {
		let json = format!(r#"{{"value": [{{"{ELEMENT_KEY}": "e-1"}}]}}"#);
		let envelope: ValueEnvelope<Vec<ElementRef>> = serde_json::from_str(&json).unwrap();
		assert_eq!(envelope.value, vec![ElementRef { id: "e-1".to_string() }]);
	}

	#[test]
	fn timeouts_serialize_camel_case() {
		let body = serde_json::to_value(Timeouts {
			implicit: 5000,
			page_load: 10000,
			script: 10000,
		})
		.unwrap();
		assert_eq!(body, json!({ "implicit": 5000, "pageLoad": 10000, "script": 10000 }));
	}

	#[test]
	fn headless_chrome_session_carries_switches() {
		let request = serde_json::to_value(NewSessionRequest::for_browser("chrome", true)).unwrap();
		let args = &request["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
		assert_eq!(args[0], "--headless");
	}

	#[test]
	fn headed_session_has_only_browser_name() {
		let request = serde_json::to_value(NewSessionRequest::for_browser("firefox", false)).unwrap();
		assert_eq!(request, json!({ "capabilities": { "alwaysMatch": { "browserName": "firefox" } } }));
	}

	#[test]
	fn error_value_parses_without_stacktrace() {
		let envelope: ValueEnvelope<ErrorValue> =
			serde_json::from_str(r#"{"value": {"error": "invalid session id", "message": "session deleted"}}"#).unwrap();
		assert_eq!(envelope.value.error, "invalid session id");
		assert!(envelope.value.stacktrace.is_none());
	}
}
