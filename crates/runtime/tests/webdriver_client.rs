//! WebDriver client against an in-process axum server.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use unitrun_protocol::webdriver::{ELEMENT_KEY, NewSessionRequest, Timeouts};
use unitrun_runtime::{Error, WebDriverClient};

#[derive(Default)]
struct Recorded {
	urls: Vec<String>,
	timeouts: Vec<Value>,
	capabilities: Vec<Value>,
	deleted: usize,
}

type Shared = Arc<Mutex<Recorded>>;

async fn fake_server() -> (String, Shared) {
	let recorded: Shared = Arc::default();

	let app = Router::new()
		.route("/wd/hub/status", get(|| async { Json(json!({"value": {"ready": true, "message": "ok"}})) }))
		.route(
			"/wd/hub/session",
			post(|State(recorded): State<Shared>, Json(body): Json<Value>| async move {
				recorded.lock().capabilities.push(body["capabilities"].clone());
				Json(json!({"value": {"sessionId": "S1", "capabilities": {"browserName": "chrome"}}}))
			}),
		)
		.route(
			"/wd/hub/session/{id}/url",
			post(|State(recorded): State<Shared>, Json(body): Json<Value>| async move {
				let url = body["url"].as_str().unwrap_or_default().to_string();
				if url.contains("refused") {
					return (
						StatusCode::INTERNAL_SERVER_ERROR,
						Json(json!({"value": {"error": "unknown error", "message": "net::ERR_CONNECTION_REFUSED"}})),
					);
				}
				recorded.lock().urls.push(url);
				(StatusCode::OK, Json(json!({"value": null})))
			}),
		)
		.route(
			"/wd/hub/session/{id}/timeouts",
			post(|State(recorded): State<Shared>, Json(body): Json<Value>| async move {
				recorded.lock().timeouts.push(body);
				Json(json!({"value": null}))
			}),
		)
		.route(
			"/wd/hub/session/{id}/elements",
			post(|Json(body): Json<Value>| async move {
				let found = if body["value"] == "#report" {
					json!([{ ELEMENT_KEY: "E1" }])
				} else {
					json!([])
				};
				Json(json!({ "value": found }))
			}),
		)
		.route(
			"/wd/hub/session/{id}/element/{element}/text",
			get(|Path((_, element)): Path<(String, String)>| async move { Json(json!({"value": format!("text of {element}")})) }),
		)
		.route(
			"/wd/hub/session/{id}/element/{element}/property/{name}",
			get(|| async { Json(json!({"value": "<testsuite/>"})) }),
		)
		.route("/wd/hub/session/{id}/screenshot", get(|| async { Json(json!({"value": "iVBORw0KGgo="})) }))
		.route(
			"/wd/hub/session/{id}",
			delete(|State(recorded): State<Shared>| async move {
				recorded.lock().deleted += 1;
				Json(json!({"value": null}))
			}),
		)
		.with_state(Arc::clone(&recorded));

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});

	(format!("http://{addr}/wd/hub"), recorded)
}

#[tokio::test]
async fn status_reports_ready() {
	let (base, _) = fake_server().await;
	let client = WebDriverClient::new(&base).unwrap();
	assert!(client.status().await.unwrap().ready);
}

#[tokio::test]
async fn session_lifecycle() -> anyhow::Result<()> {
	let (base, recorded) = fake_server().await;
	let client = WebDriverClient::new(&base)?;

	let session = client.new_session(&NewSessionRequest::for_browser("chrome", true)).await?;
	assert_eq!(session.id(), "S1");

	session
		.set_timeouts(Timeouts {
			implicit: 5000,
			page_load: 10000,
			script: 10000,
		})
		.await?;
	session.navigate("http://localhost:1024/testing.html").await?;

	let report = session.find_elements("#report").await?;
	assert_eq!(report.len(), 1);
	assert_eq!(report[0].id, "E1");
	assert!(session.find_elements("#exception").await?.is_empty());

	assert_eq!(session.element_text(&report[0]).await?, "text of E1");
	assert_eq!(session.element_property(&report[0], "value").await?, json!("<testsuite/>"));
	assert_eq!(session.screenshot().await?, "iVBORw0KGgo=");

	session.delete().await?;

	let recorded = recorded.lock();
	assert_eq!(recorded.urls, vec!["http://localhost:1024/testing.html".to_string()]);
	assert_eq!(recorded.timeouts[0]["pageLoad"], 10000);
	assert_eq!(recorded.capabilities[0]["alwaysMatch"]["browserName"], "chrome");
	assert_eq!(recorded.deleted, 1);
	Ok(())
}

#[tokio::test]
async fn error_envelope_is_surfaced() {
	let (base, _) = fake_server().await;
	let client = WebDriverClient::new(&base).unwrap();
	let session = client
		.new_session(&NewSessionRequest::for_browser("chrome", false))
		.await
		.unwrap();

	let err = session.navigate("http://refused.invalid/").await.unwrap_err();
	match &err {
		Error::WebDriver { error, message } => {
			assert_eq!(error, "unknown error");
			assert!(message.contains("ERR_CONNECTION_REFUSED"));
		}
		other => panic!("unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn hung_session_delete_is_bounded() {
	let app = Router::new()
		.route(
			"/session",
			post(|| async { Json(json!({"value": {"sessionId": "S9", "capabilities": {}}})) }),
		)
		.route(
			"/session/{id}",
			delete(|| async {
				tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
				Json(json!({"value": null}))
			}),
		);
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});

	let client = WebDriverClient::new(&format!("http://{addr}")).unwrap();
	let session = client
		.new_session(&NewSessionRequest::for_browser("chrome", true))
		.await
		.unwrap();

	let started = std::time::Instant::now();
	let err = session
		.delete_within(std::time::Duration::from_millis(200))
		.await
		.unwrap_err();
	assert!(matches!(&err, Error::Http(e) if e.is_timeout()), "unexpected error: {err:?}");
	assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
