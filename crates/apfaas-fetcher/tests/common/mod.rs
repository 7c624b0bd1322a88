//! Local function endpoint used by the fetcher integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use apfaas_core::{QueryParams, RequestRecord};
use axum::extract::RawQuery;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const RESPONSE_ID: &str = "rid-ok";

async fn ok() -> ([(&'static str, &'static str); 2], &'static str) {
    ([("response-id", RESPONSE_ID), ("x-cache", "HIT")], "hello")
}

async fn missing_id() -> &'static str {
    "nobody to correlate with"
}

async fn error() -> (StatusCode, [(&'static str, &'static str); 2], &'static str) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [("response-id", "rid-error"), ("x-cache", "MISS")],
        "boom",
    )
}

async fn redirect() -> (StatusCode, [(&'static str, &'static str); 3]) {
    (
        StatusCode::FOUND,
        [
            ("location", "/ok"),
            ("response-id", "rid-hop"),
            ("x-cache", "MISS"),
        ],
    )
}

async fn redirect_to_error() -> (StatusCode, [(&'static str, &'static str); 2]) {
    (
        StatusCode::FOUND,
        [("location", "/error"), ("response-id", "rid-hop")],
    )
}

async fn slow() -> ([(&'static str, &'static str); 1], &'static str) {
    tokio::time::sleep(Duration::from_secs(3)).await;
    ([("response-id", "rid-slow")], "late")
}

async fn query(RawQuery(query): RawQuery) -> ([(&'static str, &'static str); 1], String) {
    ([("response-id", "rid-query")], query.unwrap_or_default())
}

async fn echo(
    Json(body): Json<serde_json::Value>,
) -> ([(&'static str, &'static str); 1], Json<serde_json::Value>) {
    ([("response-id", "rid-echo")], Json(body))
}

/// Serve the test routes on an ephemeral port of the current runtime.
pub async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/ok", get(ok))
        .route("/missing-id", get(missing_id))
        .route("/error", get(error))
        .route("/redirect", get(redirect))
        .route("/redirect-error", get(redirect_to_error))
        .route("/slow", get(slow))
        .route("/query", get(query))
        .route("/echo", post(echo));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Reads each request head, writes `reply` verbatim and closes the socket.
pub async fn raw_server(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let _ = socket.write_all(reply).await;
            let _ = socket.shutdown().await;
        }
    });
    addr
}

pub fn record(addr: SocketAddr, method: &str, path: &str) -> RequestRecord {
    RequestRecord {
        function_name: "city-weather".to_string(),
        endpoint: format!("http://{}", addr),
        path: path.to_string(),
        method: method.to_string(),
        query: QueryParams::default(),
        body: None,
    }
}
