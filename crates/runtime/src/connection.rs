//! DevTools WebSocket connection.
//!
//! Correlates responses with pending requests by id and fans events out to
//! subscribers:
//!
//! 1. [`Connection::send`] allocates the next id and parks a oneshot sender
//! 2. the request is written to the socket
//! 3. a background reader task parses every incoming frame
//! 4. responses complete the parked sender, events go to the broadcast channel
//!
//! When the socket closes every parked request fails with
//! [`Error::ConnectionClosed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use unitrun_protocol::cdp::{Event, Message, Request};

use crate::error::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type Callbacks = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

const EVENT_CAPACITY: usize = 256;

/// Connection to a single DevTools target.
pub struct Connection {
	last_id: AtomicU64,
	callbacks: Callbacks,
	sink: tokio::sync::Mutex<WsSink>,
	events: broadcast::Sender<Event>,
	closed: Arc<AtomicBool>,
	reader: JoinHandle<()>,
}

impl Connection {
	/// Opens the WebSocket at `ws_url` and starts the reader task.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		let (stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
		let (sink, mut source) = stream.split();

		let callbacks: Callbacks = Arc::new(Mutex::new(HashMap::new()));
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		let closed = Arc::new(AtomicBool::new(false));

		let reader = {
			let callbacks = Arc::clone(&callbacks);
			let events = events.clone();
			let closed = Arc::clone(&closed);
			tokio::spawn(async move {
				while let Some(frame) = source.next().await {
					match frame {
						Ok(WsMessage::Text(text)) => dispatch(&text, &callbacks, &events),
						Ok(WsMessage::Close(_)) => break,
						Ok(_) => {}
						Err(e) => {
							warn!(target = "unitrun.runtime", error = %e, "DevTools socket error");
							break;
						}
					}
				}
				closed.store(true, Ordering::SeqCst);
				// Dropping the senders wakes every waiter with ConnectionClosed.
				callbacks.lock().clear();
				debug!(target = "unitrun.runtime", "DevTools reader stopped");
			})
		};

		debug!(target = "unitrun.runtime", %ws_url, "DevTools connection open");
		Ok(Self {
			last_id: AtomicU64::new(1),
			callbacks,
			sink: tokio::sync::Mutex::new(sink),
			events,
			closed,
			reader,
		})
	}

	/// Sends `method` and waits for its result.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);

		let request = Request {
			id,
			method: method.to_string(),
			params,
		};
		trace!(target = "unitrun.runtime", id, method, "DevTools request");
		let text = serde_json::to_string(&request)?;
		if let Err(e) = self.sink.lock().await.send(WsMessage::Text(text)).await {
			self.callbacks.lock().remove(&id);
			return Err(e.into());
		}

		rx.await.map_err(|_| Error::ConnectionClosed)?
	}

	/// Typed variant of [`Connection::send`].
	pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
	where
		P: Serialize + ?Sized,
		R: DeserializeOwned,
	{
		let value = self.send(method, serde_json::to_value(params)?).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Receives every event pushed after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.events.subscribe()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Sends a close frame and stops the reader.
	pub async fn close(&self) -> Result<()> {
		if !self.is_closed() {
			let _ = self.sink.lock().await.send(WsMessage::Close(None)).await;
		}
		self.closed.store(true, Ordering::SeqCst);
		self.reader.abort();
		self.callbacks.lock().clear();
		Ok(())
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

/// Waits until an event named `method` arrives on `events`.
pub async fn wait_for_event(events: &mut broadcast::Receiver<Event>, method: &str, timeout: Duration) -> Result<Event> {
	let wait = async {
		loop {
			match events.recv().await {
				Ok(event) if event.method == method => return Ok(event),
				Ok(_) => {}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(target = "unitrun.runtime", skipped, "DevTools event subscriber lagged");
				}
				Err(broadcast::error::RecvError::Closed) => return Err(Error::ConnectionClosed),
			}
		}
	};

	tokio::time::timeout(timeout, wait).await.map_err(|_| Error::Timeout {
		after: timeout,
		what: method.to_string(),
	})?
}

fn dispatch(text: &str, callbacks: &Callbacks, events: &broadcast::Sender<Event>) {
	match serde_json::from_str::<Message>(text) {
		Ok(Message::Response(response)) => {
			let Some(callback) = callbacks.lock().remove(&response.id) else {
				warn!(target = "unitrun.runtime", id = response.id, "response for unknown request");
				return;
			};
			let result = match response.error {
				Some(error) => Err(Error::Protocol {
					code: error.code,
					message: error.message,
				}),
				None => Ok(response.result.unwrap_or(Value::Null)),
			};
			let _ = callback.send(result);
		}
		Ok(Message::Event(event)) => {
			trace!(target = "unitrun.runtime", method = %event.method, "DevTools event");
			let _ = events.send(event);
		}
		Err(e) => warn!(target = "unitrun.runtime", error = %e, "unparseable DevTools frame"),
	}
}
