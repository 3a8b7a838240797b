//! Interval polling with a hard deadline.
//!
//! [`CompletionPoller::start`] runs a predicate every `interval` until it is
//! satisfied, fails, or the overall `timeout` elapses:
//!
//! ```text
//! Idle -> Polling -> Finished
//!                 -> TimedOut
//!                 -> Errored
//! ```
//!
//! The deadline is armed before the backend timeouts are applied and covers
//! everything after it, including a predicate call that is still running.
//! Such a call is dropped, never observed.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{BackendTimeouts, RemoteDriverBackend};
use crate::error::{Error, Result};

/// Outcome of one predicate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
	Flag(bool),
	/// Satisfied when any member is `true`.
	Any(Vec<bool>),
}

impl PollResult {
	pub fn is_satisfied(&self) -> bool {
		match self {
			PollResult::Flag(flag) => *flag,
			PollResult::Any(flags) => flags.iter().any(|flag| *flag),
		}
	}
}

impl From<bool> for PollResult {
	fn from(flag: bool) -> Self {
		PollResult::Flag(flag)
	}
}

impl From<Vec<bool>> for PollResult {
	fn from(flags: Vec<bool>) -> Self {
		PollResult::Any(flags)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
	pub interval: Duration,
	pub timeout: Duration,
	pub implicit_element_timeout: Duration,
	pub page_load_timeout: Duration,
	pub script_timeout: Duration,
}

impl Default for PollConfig {
	fn default() -> Self {
		let backend = BackendTimeouts::default();
		Self {
			interval: Duration::from_millis(5000),
			timeout: Duration::from_millis(240_000),
			implicit_element_timeout: backend.implicit,
			page_load_timeout: backend.page_load,
			script_timeout: backend.script,
		}
	}
}

impl PollConfig {
	pub fn backend_timeouts(&self) -> BackendTimeouts {
		BackendTimeouts {
			implicit: self.implicit_element_timeout,
			page_load: self.page_load_timeout,
			script: self.script_timeout,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
	Idle,
	Polling,
	Finished,
	TimedOut,
	Errored,
}

impl PollState {
	pub fn is_terminal(self) -> bool {
		matches!(self, PollState::Finished | PollState::TimedOut | PollState::Errored)
	}
}

#[derive(Debug)]
pub struct CompletionPoller {
	config: PollConfig,
	state: PollState,
	ticks: u32,
}

impl CompletionPoller {
	pub fn new(config: PollConfig) -> Self {
		Self {
			config,
			state: PollState::Idle,
			ticks: 0,
		}
	}

	pub fn config(&self) -> &PollConfig {
		&self.config
	}

	pub fn state(&self) -> PollState {
		self.state
	}

	/// Number of predicate calls that completed.
	pub fn ticks(&self) -> u32 {
		self.ticks
	}

	/// Polls `predicate` until it is satisfied.
	///
	/// Calls never overlap: the next one is scheduled only after the previous
	/// one returned. A predicate error ends polling immediately.
	pub async fn start<F, Fut, R>(&mut self, backend: &dyn RemoteDriverBackend, mut predicate: F) -> Result<()>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<R>>,
		R: Into<PollResult>,
	{
		if self.state != PollState::Idle {
			return Err(Error::PollerReused(self.state));
		}

		let config = self.config;
		let deadline = tokio::time::Instant::now() + config.timeout;
		self.state = PollState::Polling;
		info!(
			target = "unitrun.poller",
			interval = ?config.interval,
			timeout = ?config.timeout,
			"Starting interval checker"
		);

		let ticks = &mut self.ticks;
		let polling = async {
			if let Err(e) = backend.set_timeouts(config.backend_timeouts()).await {
				warn!(target = "unitrun.poller", error = %e, "failed to apply backend timeouts");
			}
			loop {
				tokio::time::sleep(config.interval).await;
				debug!(target = "unitrun.poller", attempt = *ticks + 1, "A new checking attempt");
				let result: PollResult = predicate().await?.into();
				*ticks += 1;
				debug!(target = "unitrun.poller", ?result, "Checking returned");
				if result.is_satisfied() {
					return Ok(());
				}
				debug!(target = "unitrun.poller", "Waiting {}ms before next checking attempt", config.interval.as_millis());
			}
		};

		let outcome = match tokio::time::timeout_at(deadline, polling).await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::PollTimeout(config.timeout)),
		};

		self.state = match &outcome {
			Ok(()) => PollState::Finished,
			Err(Error::PollTimeout(_)) => PollState::TimedOut,
			Err(_) => PollState::Errored,
		};
		match &outcome {
			Ok(()) => info!(target = "unitrun.poller", ticks = self.ticks, "Interval checking finished"),
			Err(e) => info!(target = "unitrun.poller", error = %e, "Interval checking stopped"),
		}
		outcome
	}
}
