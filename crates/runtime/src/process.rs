//! Process and port lifecycle helpers.

use std::net::TcpListener;

use tokio::process::Child;
use tracing::debug;

use crate::error::Result;

/// Returns `true` when `port` can be bound on localhost.
pub fn port_available(port: u16) -> bool {
	TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Picks the port a launched process should listen on.
///
/// The requested port wins while it is free; otherwise (or when nothing was
/// requested) the OS hands out an unused one.
pub fn resolve_port(requested: Option<u16>) -> Result<u16> {
	if let Some(port) = requested {
		if port_available(port) {
			return Ok(port);
		}
		debug!(target = "unitrun.runtime", port, "requested port is taken, picking another");
	}
	let listener = TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

/// Kills `child` unless it already exited, then reaps it.
pub async fn terminate(child: &mut Child) -> Result<()> {
	if let Some(status) = child.try_wait()? {
		debug!(target = "unitrun.runtime", %status, "process already exited");
		return Ok(());
	}
	child.kill().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bound_port_is_reported_unavailable() {
		let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		assert!(!port_available(port));
		drop(listener);
		assert!(port_available(port));
	}

	#[test]
	fn taken_port_is_replaced() {
		let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let taken = listener.local_addr().unwrap().port();
		let port = resolve_port(Some(taken)).unwrap();
		assert_ne!(port, taken);
	}

	#[test]
	fn free_requested_port_is_kept() {
		let port = {
			let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
			listener.local_addr().unwrap().port()
		};
		assert_eq!(resolve_port(Some(port)).unwrap(), port);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn terminate_tolerates_exited_child() {
		let mut child = tokio::process::Command::new("true").spawn().unwrap();
		child.wait().await.unwrap();
		terminate(&mut child).await.unwrap();
	}
}
