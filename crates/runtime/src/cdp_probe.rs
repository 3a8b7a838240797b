//! DevTools HTTP endpoint probing.

use std::time::Duration;

use tracing::debug;
use unitrun_protocol::cdp::{TargetDescriptor, VersionInfo};

use crate::error::{Error, Result};

fn http_client() -> Result<reqwest::Client> {
	Ok(reqwest::Client::builder().timeout(Duration::from_millis(400)).build()?)
}

/// Resolves `/json/version` metadata from the browser listening on `port`.
pub async fn fetch_version(port: u16) -> Result<VersionInfo> {
	let client = http_client()?;
	let mut last_error = "no response".to_string();

	for host in ["127.0.0.1", "localhost", "[::1]"] {
		let url = format!("http://{host}:{port}/json/version");
		let response = match client.get(&url).send().await {
			Ok(response) => response,
			Err(e) => {
				last_error = e.to_string();
				continue;
			}
		};

		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}

		return Ok(response.json().await?);
	}

	Err(Error::Context(format!("Failed to connect to port {port}: {last_error}")))
}

/// Returns the first page target, opening a blank one when none exists.
pub async fn fetch_page_target(port: u16) -> Result<TargetDescriptor> {
	let client = http_client()?;
	let targets: Vec<TargetDescriptor> = client
		.get(format!("http://127.0.0.1:{port}/json/list"))
		.send()
		.await?
		.error_for_status()?
		.json()
		.await?;

	if let Some(page) = targets.into_iter().find(|target| target.kind == "page" && target.web_socket_debugger_url.is_some()) {
		return Ok(page);
	}

	debug!(target = "unitrun.runtime", port, "no page target, opening a blank one");
	let target = client
		.put(format!("http://127.0.0.1:{port}/json/new?about:blank"))
		.send()
		.await?
		.error_for_status()?
		.json()
		.await?;
	Ok(target)
}
