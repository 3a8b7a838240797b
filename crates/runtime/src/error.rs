//! Error type shared by the runtime helpers.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid URL: {0}")]
	Url(#[from] url::ParseError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Error member of a DevTools response.
	#[error("{message} (code {code})")]
	Protocol { code: i64, message: String },

	/// W3C error payload returned by an automation server.
	#[error("{error}: {message}")]
	WebDriver { error: String, message: String },

	#[error("DevTools connection closed")]
	ConnectionClosed,

	#[error("timed out after {}ms waiting for {what}", .after.as_millis())]
	Timeout { after: Duration, what: String },

	#[error("{0}")]
	Context(String),
}

pub type Result<T> = std::result::Result<T, Error>;
