//! Shared test fixtures: a local stand-in for the webhook, occupancy and
//! launcher query endpoints.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct StubState {
    pub messages: Arc<Mutex<Vec<String>>>,
    pub webhook_status: Arc<AtomicU16>,
    pub players: Arc<AtomicU32>,
    pub query_bodies: Arc<Mutex<VecDeque<String>>>,
    pub query_hits: Arc<AtomicUsize>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            messages: Arc::default(),
            webhook_status: Arc::new(AtomicU16::new(204)),
            players: Arc::default(),
            query_bodies: Arc::default(),
            query_hits: Arc::default(),
        }
    }
}

/// HTTP server on an ephemeral local port, stopped on drop.
pub struct StubServer {
    pub addr: SocketAddr,
    pub state: StubState,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let state = StubState::default();
        let app = Router::new()
            .route("/webhook", post(webhook))
            .route("/status", get(status))
            .route("/query", get(query))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let addr = listener.local_addr().expect("No local address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn set_players(&self, players: u32) {
        self.state.players.store(players, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.state.messages.lock().clone()
    }

    /// Poll until at least `count` webhook messages arrived or 5s passed.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<String> {
        for _ in 0..500 {
            if self.state.messages.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.messages()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn webhook(State(state): State<StubState>, Json(body): Json<Value>) -> StatusCode {
    if let Some(content) = body.get("content").and_then(Value::as_str) {
        state.messages.lock().push(content.to_string());
    }
    StatusCode::from_u16(state.webhook_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::NO_CONTENT)
}

async fn status(State(state): State<StubState>) -> Json<Value> {
    Json(json!({ "result": { "players": state.players.load(Ordering::SeqCst) } }))
}

async fn query(State(state): State<StubState>) -> String {
    state.query_hits.fetch_add(1, Ordering::SeqCst);
    state
        .query_bodies
        .lock()
        .pop_front()
        .unwrap_or_else(|| r#"{"status":0,"result":{"players":0}}"#.to_string())
}

pub fn append_line(path: &Path, line: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("Failed to open log file");
    writeln!(file, "{line}").expect("Failed to append log line");
}

/// Poll `condition` every 10ms for up to 5s.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
