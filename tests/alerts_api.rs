use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use courtwatch::api::{self, AppState};
use courtwatch::status::{FileStatusReporter, StatusReporter};
use courtwatch::store::JsonAlertStore;

// ── Test infrastructure ──────────────────────────────────────

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
    _dir: tempfile::TempDir,
    data_dir: std::path::PathBuf,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        let store = Arc::new(JsonAlertStore::open(&data_dir).await.unwrap());
        let state = Arc::new(AppState {
            store,
            data_dir: data_dir.clone(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(api::serve(listener, state, shutdown.clone()));
        Self {
            addr,
            shutdown,
            task,
            _dir: dir,
            data_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

fn tuesday_evening() -> Value {
    json!({
        "name": "Tuesday evening",
        "date": "2025-03-11",
        "startTime": "1830",
        "endTime": "2000",
        "courts": [1, 2]
    })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_answers_ok() {
    let server = TestServer::start().await;
    let body = reqwest::get(server.url("/health")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "ok");
    server.stop().await;
}

#[tokio::test]
async fn alert_lifecycle() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/alerts"))
        .json(&tuesday_evening())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["active"], true);
    assert_eq!(created["startTime"], "1830");

    let list: Vec<Value> = client
        .get(server.url("/api/alerts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.as_str());

    let resp = client
        .patch(server.url(&format!("/api/alerts/{id}")))
        .json(&json!({"active": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let patched: Value = resp.json().await.unwrap();
    assert_eq!(patched["active"], false);
    assert_eq!(patched["name"], "Tuesday evening");

    let resp = client
        .delete(server.url(&format!("/api/alerts/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .delete(server.url(&format!("/api/alerts/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn update_rejects_invalid_and_unknown() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/api/alerts"))
        .json(&tuesday_evening())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let resp = client
        .put(server.url(&format!("/api/alerts/{id}")))
        .json(&json!({"courts": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .put(server.url(&format!("/api/alerts/{}", ulid::Ulid::new())))
        .json(&json!({"name": "ghost"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Alert not found");

    // The rejected update left the alert untouched.
    let list: Vec<Value> = client
        .get(server.url("/api/alerts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list[0]["courts"], json!([1, 2]));

    server.stop().await;
}

#[tokio::test]
async fn alerts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Arc::new(JsonAlertStore::open(dir.path()).await.unwrap());
        let state = Arc::new(AppState {
            store,
            data_dir: dir.path().to_path_buf(),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(api::serve(listener, state, shutdown.clone()));
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/alerts"))
            .json(&tuesday_evening())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    let reopened = JsonAlertStore::open(dir.path()).await.unwrap();
    let alerts = courtwatch::store::AlertStore::list_all(&reopened).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].name, "Tuesday evening");
}

#[tokio::test]
async fn debug_status_reflects_reporter() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let status: Value = client
        .get(server.url("/api/debug/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isRunning"], false);

    client
        .post(server.url("/api/alerts"))
        .json(&tuesday_evening())
        .send()
        .await
        .unwrap();
    let reporter = FileStatusReporter::new(&server.data_dir);
    reporter.record_cycle_start(Duration::from_secs(60), 1, 1).await;

    let status: Value = client
        .get(server.url("/api/debug/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isRunning"], true);
    assert_eq!(status["checkInterval"], 60_000);
    assert_eq!(status["alerts"]["total"], 1);
    assert_eq!(status["alerts"]["active"], 1);
    assert!(status["nextCheck"].is_string());

    reporter.mark_stopped().await;
    let status: Value = client
        .get(server.url("/api/debug/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isRunning"], false);

    server.stop().await;
}
