//! Errors raised while driving a browser test run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::poller::PollState;

/// Phase of a run an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
	Start,
	Navigate,
	Poll,
	Screenshot,
	Coverage,
	Teardown,
}

impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Stage::Start => "start",
			Stage::Navigate => "navigate",
			Stage::Poll => "poll",
			Stage::Screenshot => "screenshot",
			Stage::Coverage => "coverage",
			Stage::Teardown => "teardown",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
pub enum Error {
	/// Browser or driver could not be brought up.
	#[error("{0}")]
	Startup(String),

	/// Raw backend text of a failed navigation.
	#[error("{0}")]
	Navigation(String),

	#[error("{0}")]
	Query(String),

	#[error("{0}")]
	Screenshot(String),

	/// The page reported an exception through its sentinel element.
	#[error("Web page has the exception: {0}")]
	PageException(String),

	#[error("Can't wait anymore, exiting by timeout {}ms.", .0.as_millis())]
	PollTimeout(Duration),

	#[error("{0}")]
	Teardown(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	/// A poller is single-use; this one already left `Idle`.
	#[error("poller already used (state {0:?})")]
	PollerReused(PollState),

	#[error("failed to write {}: {source}", .path.display())]
	Artifact {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("run panicked during {stage}: {message}")]
	Crash { stage: Stage, message: String },

	#[error("interrupted by {signal} during {stage}")]
	Interrupted { signal: &'static str, stage: Stage },
}

impl Error {
	/// Default stage for this error when the caller has no better context.
	pub fn stage(&self) -> Stage {
		match self {
			Error::Startup(_) | Error::Config(_) => Stage::Start,
			Error::Navigation(_) => Stage::Navigate,
			Error::Query(_)
			| Error::PageException(_)
			| Error::PollTimeout(_)
			| Error::PollerReused(_)
			| Error::Artifact { .. } => Stage::Poll,
			Error::Screenshot(_) => Stage::Screenshot,
			Error::Teardown(_) => Stage::Teardown,
			Error::Crash { stage, .. } | Error::Interrupted { stage, .. } => *stage,
		}
	}

	/// Navigation failures the loader retries once.
	pub fn is_connection_refused(&self) -> bool {
		matches!(self, Error::Navigation(text) if text.contains("ERR_CONNECTION_REFUSED"))
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn messages_match_the_harness_wording() {
		assert_eq!(
			Error::PollTimeout(Duration::from_millis(1000)).to_string(),
			"Can't wait anymore, exiting by timeout 1000ms."
		);
		assert_eq!(
			Error::PageException("TypeError: x is undefined".into()).to_string(),
			"Web page has the exception: TypeError: x is undefined"
		);
	}

	#[test]
	fn connection_refused_is_only_a_navigation_property() {
		assert!(Error::Navigation("net::ERR_CONNECTION_REFUSED".into()).is_connection_refused());
		assert!(!Error::Navigation("net::ERR_NAME_NOT_RESOLVED".into()).is_connection_refused());
		assert!(!Error::Query("ERR_CONNECTION_REFUSED".into()).is_connection_refused());
	}

	#[test]
	fn stages() {
		assert_eq!(Error::Startup("x".into()).stage(), Stage::Start);
		assert_eq!(Error::PollTimeout(Duration::ZERO).stage(), Stage::Poll);
		assert_eq!(
			Error::Crash {
				stage: Stage::Coverage,
				message: "boom".into()
			}
			.stage(),
			Stage::Coverage
		);
		assert_eq!(Error::PollerReused(PollState::Finished).stage(), Stage::Poll);
		assert_eq!(Stage::Teardown.to_string(), "teardown");
	}
}
