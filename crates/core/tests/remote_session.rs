//! RemoteSession in remote mode against an in-process axum WebDriver server.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use unitrun::backend::{RemoteSession, RemoteSessionOptions};
use unitrun::{BackendTimeouts, Error, RemoteDriverBackend};
use unitrun_runtime::DriverServerOptions;

const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4a75f06f4c79";

#[derive(Default)]
struct Recorded {
	requests: Vec<String>,
	timeouts: Vec<Value>,
}

type Shared = Arc<Mutex<Recorded>>;

async fn fake_hub(fail_delete: bool) -> (RemoteSessionOptions, Shared) {
	let recorded: Shared = Arc::default();

	let app = Router::new()
		.route(
			"/wd/hub/session",
			post({
				let recorded = Arc::clone(&recorded);
				move |Json(body): Json<Value>| async move {
					let browser = body["capabilities"]["alwaysMatch"]["browserName"].as_str().unwrap_or_default().to_string();
					recorded.lock().requests.push(format!("new session {browser}"));
					Json(json!({"value": {"sessionId": "R1", "capabilities": {}}}))
				}
			}),
		)
		.route(
			"/wd/hub/session/{id}/url",
			post({
				let recorded = Arc::clone(&recorded);
				move |Json(body): Json<Value>| async move {
					recorded.lock().requests.push(format!("navigate {}", body["url"].as_str().unwrap_or_default()));
					Json(json!({"value": null}))
				}
			}),
		)
		.route(
			"/wd/hub/session/{id}/timeouts",
			post({
				let recorded = Arc::clone(&recorded);
				move |Json(body): Json<Value>| async move {
					recorded.lock().timeouts.push(body);
					Json(json!({"value": null}))
				}
			}),
		)
		.route(
			"/wd/hub/session/{id}/elements",
			post(|Json(body): Json<Value>| async move {
				let found = match body["value"].as_str() {
					Some("body.tests-finished") => json!([{ ELEMENT_KEY: "FIN" }]),
					Some("#report") => json!([{ ELEMENT_KEY: "REP" }]),
					_ => json!([]),
				};
				Json(json!({ "value": found }))
			}),
		)
		.route(
			"/wd/hub/session/{id}/element/REP/text",
			get(|| async { Json(json!({"value": "3 passed"})) }),
		)
		.route(
			"/wd/hub/session/{id}/element/REP/property/value",
			get(|| async { Json(json!({"value": "<testsuite tests=\"3\"/>"})) }),
		)
		.route(
			"/wd/hub/session/{id}/element/FIN/property/value",
			get(|| async { Json(json!({"value": null})) }),
		)
		.route("/wd/hub/session/{id}/screenshot", get(|| async { Json(json!({"value": "iVBORw0KGgo="})) }))
		.route(
			"/wd/hub/session/{id}",
			delete({
				let recorded = Arc::clone(&recorded);
				move || async move {
					recorded.lock().requests.push("delete session".to_string());
					if fail_delete {
						(
							StatusCode::NOT_FOUND,
							Json(json!({"value": {"error": "invalid session id", "message": "session already gone"}})),
						)
					} else {
						(StatusCode::OK, Json(json!({"value": null})))
					}
				}
			}),
		);

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});

	let options = RemoteSessionOptions {
		remote: true,
		remote_url: format!("http://{addr}/wd/hub"),
		remote_port: addr.port(),
		server: DriverServerOptions::chromedriver(9515),
		browser_name: "firefox".to_string(),
		headless: true,
	};
	(options, recorded)
}

#[tokio::test]
async fn selector_helpers_follow_the_server() -> anyhow::Result<()> {
	let (options, recorded) = fake_hub(false).await;
	let port = options.remote_port;
	let session = RemoteSession::new(options);

	session.start_up().await?;
	assert_eq!(session.port(), Some(port));
	session.open("http://localhost:1024/testing.html?reporter=XUnit").await?;

	let finished = session.query_selector("body.tests-finished").await?;
	assert!(finished.is_existing());
	assert_eq!(finished.value().await?, "");

	let report = session.query_selector("#report").await?;
	assert!(report.is_existing());
	assert_eq!(report.text().await?, "3 passed");
	assert_eq!(report.value().await?, "<testsuite tests=\"3\"/>");

	let exception = session.query_selector("#exception").await?;
	assert!(!exception.is_existing());
	match exception.text().await {
		Err(Error::Query(message)) => assert!(message.contains("#exception")),
		other => panic!("unexpected result: {other:?}"),
	}
	assert!(matches!(exception.value().await, Err(Error::Query(_))));

	session.tear_down().await?;
	assert_eq!(
		recorded.lock().requests,
		vec![
			"new session firefox".to_string(),
			"navigate http://localhost:1024/testing.html?reporter=XUnit".to_string(),
			"delete session".to_string(),
		]
	);
	Ok(())
}

#[tokio::test]
async fn timeouts_are_forwarded_in_milliseconds() -> anyhow::Result<()> {
	let (options, recorded) = fake_hub(false).await;
	let session = RemoteSession::new(options);
	session.start_up().await?;

	session
		.set_timeouts(BackendTimeouts {
			implicit: Duration::from_millis(5000),
			page_load: Duration::from_millis(10_000),
			script: Duration::from_millis(7000),
		})
		.await?;

	let timeouts = recorded.lock().timeouts.clone();
	assert_eq!(timeouts, vec![json!({"implicit": 5000, "pageLoad": 10000, "script": 7000})]);
	session.tear_down().await?;
	Ok(())
}

#[tokio::test]
async fn screenshot_is_decoded_to_file() -> anyhow::Result<()> {
	let (options, _) = fake_hub(false).await;
	let dir = tempfile::tempdir()?;
	let session = RemoteSession::new(options);
	session.start_up().await?;

	let path = dir.path().join("shot.png");
	assert_eq!(session.save_screenshot(&path).await?, path);
	assert_eq!(std::fs::read(&path)?, b"\x89PNG\r\n\x1a\n");
	session.tear_down().await?;
	Ok(())
}

#[tokio::test]
async fn failed_session_delete_is_a_teardown_error() {
	let (options, recorded) = fake_hub(true).await;
	let session = RemoteSession::new(options);
	session.start_up().await.unwrap();

	match session.tear_down().await {
		Err(Error::Teardown(message)) => assert!(message.contains("session already gone")),
		other => panic!("unexpected result: {other:?}"),
	}
	assert_eq!(recorded.lock().requests.last().map(String::as_str), Some("delete session"));

	// The session was released; nothing is left to delete.
	session.tear_down().await.unwrap();
	assert_eq!(recorded.lock().requests.iter().filter(|r| *r == "delete session").count(), 1);
}
