//! One full browser run: configuration in, artifacts and an exit code out.
//!
//! The backend is torn down exactly once on every path. A run that fails,
//! panics or is interrupted by SIGINT/SIGTERM ends up in the same place: the
//! run future is dropped, a screenshot is attempted where it makes sense,
//! and [`StopLatch`] admits a single teardown.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::backend::{self, RemoteDriverBackend};
use crate::config::RunConfig;
use crate::error::{Error, Result, Stage};
use crate::loader::BrowserTestLoader;
use crate::report::{ReportFile, report_head, screenshot_path};

/// Result of one run.
#[derive(Debug)]
pub enum RunOutcome {
	Success { report: String, coverage: Option<String> },
	Failure { stage: Stage, error: Error },
}

impl RunOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, RunOutcome::Success { .. })
	}

	/// `0` on success, `1` otherwise.
	pub fn exit_code(&self) -> i32 {
		if self.is_success() { 0 } else { 1 }
	}
}

/// Admits the first caller only.
#[derive(Debug, Default)]
pub struct StopLatch(AtomicBool);

impl StopLatch {
	/// `true` for the first call, `false` afterwards.
	pub fn trigger(&self) -> bool {
		!self.0.swap(true, Ordering::SeqCst)
	}

	pub fn is_triggered(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

type StageFailure = (Stage, Error);

pub struct RunCoordinator {
	config: RunConfig,
}

impl RunCoordinator {
	/// Validates `config`; nothing is started yet.
	pub fn new(config: RunConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self { config })
	}

	pub fn config(&self) -> &RunConfig {
		&self.config
	}

	/// Runs with the configured backend until done or until SIGINT/SIGTERM.
	pub async fn run(&self) -> RunOutcome {
		let backend = backend::create(&self.config);
		self.run_with(backend, shutdown_signal()).await
	}

	/// Runs `backend`, abandoning the run when `shutdown` resolves first.
	///
	/// Each call owns its latch, so a coordinator may drive several runs.
	pub async fn run_with<S>(&self, backend: Box<dyn RemoteDriverBackend>, shutdown: S) -> RunOutcome
	where
		S: Future<Output = &'static str>,
	{
		let report_file = self.config.report_file().map(ReportFile::new);
		let mut loader = match self.config.poll_config() {
			Ok(poll) => BrowserTestLoader::new(backend, poll, self.config.sentinels.clone()),
			Err(error) => return RunOutcome::Failure { stage: Stage::Start, error },
		};

		if let Some(file) = &report_file {
			if let Err(error) = file.clear() {
				return RunOutcome::Failure { stage: Stage::Start, error };
			}
		}

		let latch = StopLatch::default();
		let stage = Mutex::new(Stage::Start);
		info!(target = "unitrun.coordinator", provider = %self.config.provider, "Starting loader");
		let result = {
			let drive = AssertUnwindSafe(self.drive(&mut loader, report_file.as_ref(), &stage)).catch_unwind();
			tokio::select! {
				caught = drive => caught.unwrap_or_else(|panic| {
					let stage = *stage.lock();
					Err((stage, Error::Crash { stage, message: panic_message(panic.as_ref()) }))
				}),
				signal = shutdown => {
					let stage = *stage.lock();
					warn!(target = "unitrun.coordinator", signal, %stage, "run interrupted");
					Err((stage, Error::Interrupted { signal, stage }))
				}
			}
		};

		let outcome = match result {
			Ok((report, coverage)) => RunOutcome::Success { report, coverage },
			Err((stage, error)) => {
				error!(target = "unitrun.coordinator", %stage, "An error occurred: {error}");
				RunOutcome::Failure { stage, error }
			}
		};

		self.stop(&mut loader, &latch).await;
		outcome
	}

	async fn drive(
		&self,
		loader: &mut BrowserTestLoader,
		report_file: Option<&ReportFile>,
		stage: &Mutex<Stage>,
	) -> std::result::Result<(String, Option<String>), StageFailure> {
		let url = self.config.target_url().map_err(|e| (Stage::Start, e))?;
		loader.start(url.as_str()).await.map_err(|e| (e.stage(), e))?;

		*stage.lock() = Stage::Poll;
		let report = match loader.get_report().await {
			Ok(report) => report,
			Err(error) => {
				*stage.lock() = Stage::Screenshot;
				let path = screenshot_path(report_file.map(ReportFile::path));
				return match loader.get_screenshot(&path).await {
					Ok(path) => {
						info!(target = "unitrun.coordinator", path = %path.display(), "failure screenshot saved");
						Err((Stage::Poll, error))
					}
					Err(screenshot_error) => {
						error!(target = "unitrun.coordinator", stage = %Stage::Poll, "An error occurred: {error}");
						Err((Stage::Screenshot, screenshot_error))
					}
				};
			}
		};

		info!(target = "unitrun.coordinator", "Here is the part of report contents below");
		info!(target = "unitrun.coordinator", "{}", report_head(&report));
		if let Some(file) = report_file {
			file.save(&report).map_err(|e| (Stage::Poll, e))?;
			info!(target = "unitrun.coordinator", path = %file.path().display(), "report saved");
		}

		let coverage = match self.config.coverage_report_file() {
			Some(path) => {
				*stage.lock() = Stage::Coverage;
				Some(self.collect_coverage(loader, path).await.map_err(|e| (Stage::Coverage, e))?)
			}
			None => None,
		};

		Ok((report, coverage))
	}

	async fn collect_coverage(&self, loader: &BrowserTestLoader, path: &Path) -> Result<String> {
		let text = loader.get_coverage_report().await?;
		let file = ReportFile::new(path);
		file.clear()?;
		file.save(&text)?;
		info!(target = "unitrun.coordinator", path = %path.display(), "coverage report saved");
		Ok(text)
	}

	/// Tears the loader down unless that already happened. Failures are
	/// logged and leave the outcome alone.
	async fn stop(&self, loader: &mut BrowserTestLoader, latch: &StopLatch) {
		if !latch.trigger() {
			warn!(target = "unitrun.coordinator", "teardown already done, skipping");
			return;
		}

		info!(target = "unitrun.coordinator", "Stopping loader");
		match AssertUnwindSafe(loader.stop()).catch_unwind().await {
			Ok(Ok(())) => info!(target = "unitrun.coordinator", "Loader stopped"),
			Ok(Err(e)) => error!(target = "unitrun.coordinator", stage = %Stage::Teardown, "Loader threw during stop: {e}"),
			Err(panic) => error!(
				target = "unitrun.coordinator",
				stage = %Stage::Teardown,
				"Loader panicked during stop: {}",
				panic_message(panic.as_ref())
			),
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}

/// Resolves with the name of the first termination signal received.
#[cfg(unix)]
pub async fn shutdown_signal() -> &'static str {
	use tokio::signal::unix::{SignalKind, signal};

	let (mut interrupt, mut terminate) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
		(Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
		_ => {
			warn!(target = "unitrun.coordinator", "cannot install signal handlers");
			return std::future::pending().await;
		}
	};
	tokio::select! {
		_ = interrupt.recv() => "SIGINT",
		_ = terminate.recv() => "SIGTERM",
	}
}

/// Resolves with the name of the first termination signal received.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> &'static str {
	match tokio::signal::ctrl_c().await {
		Ok(()) => "SIGINT",
		Err(_) => std::future::pending().await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn latch_admits_once() {
		let latch = StopLatch::default();
		assert!(!latch.is_triggered());
		assert!(latch.trigger());
		assert!(!latch.trigger());
		assert!(latch.is_triggered());
	}

	#[test]
	fn exit_codes() {
		let ok = RunOutcome::Success {
			report: String::new(),
			coverage: None,
		};
		let failed = RunOutcome::Failure {
			stage: Stage::Poll,
			error: Error::PollTimeout(std::time::Duration::from_millis(1)),
		};
		assert_eq!(ok.exit_code(), 0);
		assert_eq!(failed.exit_code(), 1);
	}

	#[test]
	fn invalid_config_is_rejected_up_front() {
		let mut config = RunConfig::default();
		config.timeouts.interval = 0;
		assert!(matches!(RunCoordinator::new(config), Err(Error::Config(_))));
	}

	#[test]
	fn panic_payloads() {
		assert_eq!(panic_message(&"boom"), "boom");
		assert_eq!(panic_message(&String::from("bang")), "bang");
		assert_eq!(panic_message(&42_u8), "unknown panic");
	}
}
