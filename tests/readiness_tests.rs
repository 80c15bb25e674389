//! Readiness confirmation against a local launcher query stand-in.

#[path = "common.rs"]
mod common;

use common::StubServer;
use dzkeeper::process::{LauncherQuery, ReadinessCheck, ReadinessError};
use dzkeeper::reliability::RetryConfig;
use std::sync::atomic::Ordering;
use std::time::Duration;

const TIMEOUT_BODY: &str = r#"{"status":1,"error":"Timeout has occurred"}"#;
const INVALID_MOD_BODY: &str = r#"{"status":1,"error":"steam workshop id not found - 1559212036"}"#;

fn query(stub: &StubServer, max_retries: u32) -> LauncherQuery {
    LauncherQuery::new(
        reqwest::Client::new(),
        stub.url("/query"),
        Duration::ZERO,
        RetryConfig::fixed(max_retries, Duration::from_millis(10)),
    )
}

fn script(stub: &StubServer, bodies: &[&str]) {
    let mut queue = stub.state.query_bodies.lock();
    queue.extend(bodies.iter().map(ToString::to_string));
}

#[tokio::test]
async fn test_success_on_first_query() {
    let stub = StubServer::start().await;
    query(&stub, 3).confirm().await.expect("server is listed");
    assert_eq!(stub.state.query_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeouts_are_retried_until_success() {
    let stub = StubServer::start().await;
    script(&stub, &[TIMEOUT_BODY, TIMEOUT_BODY]);

    query(&stub, 3).confirm().await.expect("third query succeeds");
    assert_eq!(stub.state.query_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_workshop_item_stops_immediately() {
    let stub = StubServer::start().await;
    script(&stub, &[INVALID_MOD_BODY]);

    let err = query(&stub, 5).confirm().await.expect_err("mod is invalid");
    assert!(matches!(
        &err,
        ReadinessError::InvalidWorkshopItem { id } if id == "1559212036"
    ));
    assert_eq!(stub.state.query_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let stub = StubServer::start().await;
    script(&stub, &[TIMEOUT_BODY; 10]);

    let err = query(&stub, 2).confirm().await.expect_err("never succeeds");
    assert!(matches!(err, ReadinessError::QueryTimeout));
    assert_eq!(stub.state.query_hits.load(Ordering::SeqCst), 3);
}
