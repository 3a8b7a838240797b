//! Scripted in-memory backend for exercising the loader and coordinator
//! without a browser.
//!
//! ```ignore
//! let backend = FakeBackend::default()
//!     .with_element("body.tests-finished", 2, "", "")
//!     .with_element("#report", 0, "", "<testsuite/>");
//! backend.script(|s| s.open_errors.push_back("net::ERR_CONNECTION_REFUSED".into()));
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{BackendKind, BackendTimeouts, ElementHandle, RemoteDriverBackend};
use crate::error::{Error, Result};

/// An element that shows up after `misses` unsuccessful lookups.
#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
	pub misses: u32,
	pub text: String,
	pub value: String,
}

/// What the fake does when called.
#[derive(Debug, Default)]
pub struct Script {
	pub elements: HashMap<String, ScriptedElement>,
	/// Consumed one per `open`; an empty queue means success.
	pub open_errors: VecDeque<String>,
	/// Delay before `open` answers.
	pub open_delay: Option<Duration>,
	pub fail_start: Option<String>,
	pub fail_teardown: Option<String>,
	pub fail_screenshot: Option<String>,
	pub fail_set_timeouts: bool,
	/// Panic when this selector is queried.
	pub panic_on_query: Option<String>,
}

/// What the fake was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Calls {
	pub start_up: u32,
	pub tear_down: u32,
	pub opened: Vec<(String, tokio::time::Instant)>,
	pub lookups: HashMap<String, u32>,
	pub screenshots: Vec<PathBuf>,
	pub set_timeouts: u32,
	pub timeouts: Option<BackendTimeouts>,
}

#[derive(Default)]
pub struct FakeBackend {
	kind: BackendKind,
	headless: bool,
	script: Mutex<Script>,
	calls: Arc<Mutex<Calls>>,
}

impl FakeBackend {
	pub fn new(kind: BackendKind, headless: bool) -> Self {
		Self {
			kind,
			headless,
			..Self::default()
		}
	}

	pub fn with_element(self, selector: &str, misses: u32, text: &str, value: &str) -> Self {
		self.script.lock().elements.insert(
			selector.to_string(),
			ScriptedElement {
				misses,
				text: text.to_string(),
				value: value.to_string(),
			},
		);
		self
	}

	/// Adjusts the script in place.
	pub fn script(&self, update: impl FnOnce(&mut Script)) {
		update(&mut self.script.lock());
	}

	pub fn calls(&self) -> Calls {
		self.calls.lock().clone()
	}

	/// Handle for inspecting calls after the backend was moved into a loader.
	pub fn recorder(&self) -> Arc<Mutex<Calls>> {
		Arc::clone(&self.calls)
	}
}

#[async_trait]
impl RemoteDriverBackend for FakeBackend {
	fn kind(&self) -> BackendKind {
		self.kind
	}

	fn port(&self) -> Option<u16> {
		None
	}

	fn is_headless(&self) -> bool {
		self.headless
	}

	async fn start_up(&self) -> Result<()> {
		self.calls.lock().start_up += 1;
		match self.script.lock().fail_start.clone() {
			Some(message) => Err(Error::Startup(message)),
			None => Ok(()),
		}
	}

	async fn tear_down(&self) -> Result<()> {
		self.calls.lock().tear_down += 1;
		match self.script.lock().fail_teardown.clone() {
			Some(message) => Err(Error::Teardown(message)),
			None => Ok(()),
		}
	}

	async fn open(&self, url: &str) -> Result<()> {
		self.calls.lock().opened.push((url.to_string(), tokio::time::Instant::now()));
		let delay = self.script.lock().open_delay;
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		match self.script.lock().open_errors.pop_front() {
			Some(text) => Err(Error::Navigation(text)),
			None => Ok(()),
		}
	}

	async fn query_selector(&self, selector: &str) -> Result<Box<dyn ElementHandle>> {
		let lookups = {
			let mut calls = self.calls.lock();
			let count = calls.lookups.entry(selector.to_string()).or_default();
			*count += 1;
			*count
		};

		let script = self.script.lock();
		if script.panic_on_query.as_deref() == Some(selector) {
			drop(script);
			panic!("scripted panic while querying {selector}");
		}
		let element = script.elements.get(selector).filter(|element| lookups > element.misses).cloned();
		Ok(Box::new(FakeElement { element }))
	}

	async fn save_screenshot(&self, path: &Path) -> Result<PathBuf> {
		self.calls.lock().screenshots.push(path.to_path_buf());
		if let Some(message) = self.script.lock().fail_screenshot.clone() {
			return Err(Error::Screenshot(message));
		}
		std::fs::write(path, b"\x89PNG\r\n\x1a\n").map_err(|e| Error::Screenshot(e.to_string()))?;
		Ok(path.to_path_buf())
	}

	async fn set_timeouts(&self, timeouts: BackendTimeouts) -> Result<()> {
		{
			let mut calls = self.calls.lock();
			calls.set_timeouts += 1;
			calls.timeouts = Some(timeouts);
		}
		if self.script.lock().fail_set_timeouts {
			return Err(Error::Query("session is gone".into()));
		}
		Ok(())
	}
}

struct FakeElement {
	element: Option<ScriptedElement>,
}

#[async_trait]
impl ElementHandle for FakeElement {
	fn is_existing(&self) -> bool {
		self.element.is_some()
	}

	async fn text(&self) -> Result<String> {
		Ok(self.element.as_ref().map(|e| e.text.clone()).unwrap_or_default())
	}

	async fn value(&self) -> Result<String> {
		Ok(self.element.as_ref().map(|e| e.value.clone()).unwrap_or_default())
	}
}
