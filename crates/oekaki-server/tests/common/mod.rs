use std::net::SocketAddr;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use oekaki_core::net::messages::SessionResponse;
use oekaki_server::build_app;
use oekaki_server::config::ServerConfig;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url())
    }
}

/// Body of a create-room request with password "1234" and 60 second rounds.
pub fn create_body(name: &str, host: &str, rounds: u32) -> Value {
    json!({
        "name": name,
        "password": "1234",
        "host_username": host,
        "rounds_total": rounds,
        "round_time_sec": 60,
    })
}

pub async fn create_room(server: &TestServer, name: &str, host: &str, rounds: u32) -> SessionResponse {
    let resp = reqwest::Client::new()
        .post(server.url("/rooms"))
        .json(&create_body(name, host, rounds))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

pub async fn join_room(server: &TestServer, name: &str, username: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.url(&format!("/rooms/{name}/join")))
        .json(&json!({ "password": "1234", "username": username }))
        .send()
        .await
        .unwrap()
}

pub async fn post_as(server: &TestServer, token: &str, path: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.url(path))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

pub async fn get_as(server: &TestServer, token: &str, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(server.url(path))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

/// The symbolic error code of a failed response.
pub async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}
