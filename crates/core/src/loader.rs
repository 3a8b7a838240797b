//! Runs one test page in a backend and pulls its report out of the DOM.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::RemoteDriverBackend;
use crate::error::{Error, Result};
use crate::poller::{CompletionPoller, PollConfig};

const NAVIGATION_RETRY_DELAY: Duration = Duration::from_millis(500);

/// DOM elements the test page uses to signal its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Sentinels {
	/// Present once every test has run.
	pub finished: String,
	/// Element whose value is the report.
	pub report: String,
	/// Element whose text describes an exception thrown by the page.
	pub exception: String,
	/// Element whose value is the coverage report.
	pub coverage: String,
}

impl Default for Sentinels {
	fn default() -> Self {
		Self {
			finished: "body.tests-finished".to_string(),
			report: "#report".to_string(),
			exception: "#exception".to_string(),
			coverage: "#coverageReport".to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
	Created,
	Started,
	ReportReady,
	Failed,
	Stopped,
}

pub struct BrowserTestLoader {
	backend: Box<dyn RemoteDriverBackend>,
	poll: PollConfig,
	sentinels: Sentinels,
	state: LoaderState,
	report: Option<String>,
}

impl BrowserTestLoader {
	pub fn new(backend: Box<dyn RemoteDriverBackend>, poll: PollConfig, sentinels: Sentinels) -> Self {
		Self {
			backend,
			poll,
			sentinels,
			state: LoaderState::Created,
			report: None,
		}
	}

	pub fn backend(&self) -> &dyn RemoteDriverBackend {
		self.backend.as_ref()
	}

	pub fn state(&self) -> LoaderState {
		self.state
	}

	/// Starts the backend and navigates to `url`.
	///
	/// A navigation refused at the connection level is retried once after
	/// 500 ms; every other failure is returned as is.
	pub async fn start(&mut self, url: &str) -> Result<()> {
		let result = self.start_inner(url).await;
		self.state = if result.is_ok() { LoaderState::Started } else { LoaderState::Failed };
		result
	}

	async fn start_inner(&self, url: &str) -> Result<()> {
		self.backend.start_up().await?;
		match self.load_url(url).await {
			Err(e) if e.is_connection_refused() => {
				tokio::time::sleep(NAVIGATION_RETRY_DELAY).await;
				info!(target = "unitrun.loader", %url, "Try go to URL another one");
				self.load_url(url).await
			}
			other => other,
		}
	}

	async fn load_url(&self, url: &str) -> Result<()> {
		info!(target = "unitrun.loader", %url, "Going to URL");
		match self.backend.open(url).await {
			Ok(()) => {
				info!(target = "unitrun.loader", %url, "URL loaded");
				Ok(())
			}
			Err(e) => {
				warn!(target = "unitrun.loader", %url, error = %e, "Unable go to URL");
				Err(e)
			}
		}
	}

	/// Waits for the page to finish and returns the report text.
	///
	/// Every tick checks the finished and exception sentinels together. The
	/// tick is satisfied when the page finished without an exception; an
	/// exception sentinel fails the wait at once.
	pub async fn get_report(&mut self) -> Result<String> {
		let result = self.wait_for_report().await;
		match &result {
			Ok(text) => {
				self.report = Some(text.clone());
				self.state = LoaderState::ReportReady;
			}
			Err(_) => self.state = LoaderState::Failed,
		}
		result
	}

	async fn wait_for_report(&self) -> Result<String> {
		let backend = self.backend.as_ref();
		let sentinels = &self.sentinels;
		let report = Mutex::new(None);
		let cache = &report;

		let mut poller = CompletionPoller::new(self.poll);
		poller
			.start(backend, move || async move {
				let (finished, clean) = tokio::try_join!(
					check_finished(backend, sentinels, cache),
					check_no_exception(backend, sentinels)
				)?;
				Ok::<_, Error>(finished && clean)
			})
			.await?;

		report
			.into_inner()
			.ok_or_else(|| Error::Query(format!("`{}` appeared without a report", sentinels.finished)))
	}

	/// Value of the coverage sentinel.
	pub async fn get_coverage_report(&self) -> Result<String> {
		info!(target = "unitrun.loader", "Retrieving coverage report");
		let element = self.backend.query_selector(&self.sentinels.coverage).await?;
		let text = element.value().await?;
		info!(target = "unitrun.loader", bytes = text.len(), "Coverage report retrieved");
		Ok(text)
	}

	/// Saves a screenshot to `path`, creating its directory first.
	pub async fn get_screenshot(&self, path: &Path) -> Result<PathBuf> {
		if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(dir)
				.await
				.map_err(|e| Error::Screenshot(format!("failed to create {}: {e}", dir.display())))?;
		}
		info!(target = "unitrun.loader", path = %path.display(), "Taking screenshot");
		let path = self.backend.save_screenshot(path).await?;
		info!(target = "unitrun.loader", path = %path.display(), "Screenshot has been taken");
		Ok(path)
	}

	/// Tears the backend down. The caller owns when this happens.
	pub async fn stop(&mut self) -> Result<()> {
		self.state = LoaderState::Stopped;
		self.backend.tear_down().await
	}

	/// Report fetched by the last successful [`get_report`](Self::get_report).
	pub fn report(&self) -> Option<&str> {
		self.report.as_deref()
	}
}

async fn check_finished(backend: &dyn RemoteDriverBackend, sentinels: &Sentinels, cache: &Mutex<Option<String>>) -> Result<bool> {
	let finished = backend.query_selector(&sentinels.finished).await?;
	let done = finished.is_existing();
	debug!(target = "unitrun.loader", selector = %sentinels.finished, done, "Check testing is done");
	if !done {
		return Ok(false);
	}

	let report = backend.query_selector(&sentinels.report).await?;
	let text = report.value().await?;
	info!(target = "unitrun.loader", bytes = text.len(), "Report retrieved");
	*cache.lock() = Some(text);
	Ok(true)
}

async fn check_no_exception(backend: &dyn RemoteDriverBackend, sentinels: &Sentinels) -> Result<bool> {
	let exception = backend.query_selector(&sentinels.exception).await?;
	if !exception.is_existing() {
		return Ok(true);
	}
	let text = exception.text().await?;
	Err(Error::PageException(text))
}
