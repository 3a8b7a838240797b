//! Browser test-execution driver.
//!
//! Opens a test page in a remote-controlled browser, waits for the page to
//! signal that its suite finished, and collects the report (and optionally
//! coverage) the page leaves in its DOM.
//!
//! - [`backend`]: the [`RemoteDriverBackend`] contract with a WebDriver and a
//!   DevTools implementation
//! - [`poller`]: interval polling under a hard deadline
//! - [`loader`]: one run against one backend
//! - [`coordinator`]: configuration, artifacts, teardown and exit code

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod loader;
pub mod poller;
pub mod report;
pub mod testing;

pub use backend::{BackendKind, BackendTimeouts, ElementHandle, RemoteDriverBackend};
pub use config::RunConfig;
pub use coordinator::{RunCoordinator, RunOutcome};
pub use error::{Error, Result, Stage};
pub use loader::{BrowserTestLoader, Sentinels};
pub use poller::{CompletionPoller, PollConfig, PollResult};
