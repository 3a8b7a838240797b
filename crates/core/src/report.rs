//! Report and coverage files written after a run.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Number of report characters echoed to the log.
pub const MAX_REPORT_LENGTH: usize = 1024;

/// Fallback screenshot name when no report file is configured.
pub const DEFAULT_SCREENSHOT: &str = "unitrun-failure.png";

/// A text artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
	path: PathBuf,
}

impl ReportFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Removes a previous file, if any.
	pub fn clear(&self) -> Result<()> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(self.artifact_error(source)),
		}
	}

	/// Writes `text`, creating parent directories as needed.
	pub fn save(&self, text: &str) -> Result<()> {
		if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			std::fs::create_dir_all(dir).map_err(|source| self.artifact_error(source))?;
		}
		std::fs::write(&self.path, text).map_err(|source| self.artifact_error(source))
	}

	fn artifact_error(&self, source: io::Error) -> Error {
		Error::Artifact {
			path: self.path.clone(),
			source,
		}
	}
}

/// Screenshot written next to the report: `report.xml` becomes `report.png`.
pub fn screenshot_path(report_file: Option<&Path>) -> PathBuf {
	match report_file {
		Some(path) => path.with_extension("png"),
		None => PathBuf::from(DEFAULT_SCREENSHOT),
	}
}

/// First [`MAX_REPORT_LENGTH`] characters of `report`, marked when cut.
pub fn report_head(report: &str) -> String {
	match report.char_indices().nth(MAX_REPORT_LENGTH) {
		Some((end, _)) => format!("{}...", &report[..end]),
		None => report.to_string(),
	}
}
