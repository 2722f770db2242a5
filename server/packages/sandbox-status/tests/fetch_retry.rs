// Retrying fetch coverage against a local axum server and a closed port.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use reqwest::Method;

use sandbox_status::config::ApiConfig;
use sandbox_status::http_client::{
    client_builder, fetch_with_retry, HttpFetcher, RequestOptions, RetryOptions, RetryPolicy,
};

#[derive(Clone, Default)]
struct Hits(Arc<AtomicU32>);

impl Hits {
    fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

async fn failing(State(hits): State<Hits>) -> (StatusCode, &'static str) {
    hits.0.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn slow_first(State(hits): State<Hits>) -> &'static str {
    let attempt = hits.0.fetch_add(1, Ordering::SeqCst);
    if attempt == 0 {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    "eventually"
}

async fn echo(headers: HeaderMap, body: String) -> String {
    let marker = headers
        .get("x-marker")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    format!("{marker}:{body}")
}

async fn spawn_server(hits: Hits) -> SocketAddr {
    let app = Router::new()
        .route("/fail", get(failing))
        .route("/slow", get(slow_first))
        .route("/echo", post(echo))
        .with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

fn fetcher() -> HttpFetcher {
    let client = client_builder().no_proxy().build().expect("client");
    HttpFetcher::with_client(client, ApiConfig::default())
}

#[tokio::test]
async fn server_error_is_returned_without_retry() {
    let hits = Hits::default();
    let addr = spawn_server(hits.clone()).await;

    let response = fetcher()
        .fetch(
            &format!("http://{addr}/fail"),
            &RequestOptions::get(),
            RetryOptions {
                max_retries: Some(3),
                retry_delay: Some(Duration::from_millis(10)),
                timeout: Some(Duration::from_secs(5)),
            },
        )
        .await
        .expect("response");

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text().await.expect("body"), "upstream exploded");
    assert_eq!(hits.count(), 1);
}

#[tokio::test]
async fn connection_refused_exhausts_all_attempts() {
    let addr = closed_port().await;
    let client = client_builder().no_proxy().build().expect("client");
    let policy = RetryPolicy {
        max_retries: 2,
        retry_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(5),
    };

    let started = std::time::Instant::now();
    let err = fetch_with_retry(
        &client,
        &format!("http://{addr}/unreachable"),
        &RequestOptions::get(),
        policy,
    )
    .await
    .expect_err("nothing is listening");

    assert!(err.to_string().starts_with("Fetch failed after 3 attempts: "), "{err}");
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn slow_attempt_times_out_and_next_attempt_succeeds() {
    let hits = Hits::default();
    let addr = spawn_server(hits.clone()).await;

    let response = fetcher()
        .fetch(
            &format!("http://{addr}/slow"),
            &RequestOptions::get(),
            RetryOptions {
                max_retries: Some(1),
                retry_delay: Some(Duration::from_millis(10)),
                timeout: Some(Duration::from_millis(200)),
            },
        )
        .await
        .expect("second attempt answers");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), "eventually");
    assert_eq!(hits.count(), 2);
}

#[tokio::test]
async fn slow_target_without_retries_fails_with_timeout() {
    let hits = Hits::default();
    let addr = spawn_server(hits.clone()).await;

    let err = fetcher()
        .fetch(
            &format!("http://{addr}/slow"),
            &RequestOptions::get(),
            RetryOptions {
                max_retries: Some(0),
                retry_delay: None,
                timeout: Some(Duration::from_millis(100)),
            },
        )
        .await
        .expect_err("times out");

    assert_eq!(
        err.to_string(),
        "Fetch failed after 1 attempts: request timed out after 100ms"
    );
    assert_eq!(hits.count(), 1);
}

#[tokio::test]
async fn request_options_are_forwarded() {
    let addr = spawn_server(Hits::default()).await;
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("x-marker", "retry".parse().expect("header value"));
    let options = RequestOptions::get()
        .with_method(Method::POST)
        .with_headers(headers)
        .with_body("payload");

    let response = fetcher()
        .fetch(
            &format!("http://{addr}/echo"),
            &options,
            RetryOptions::default(),
        )
        .await
        .expect("response");

    assert_eq!(response.text().await.expect("body"), "retry:payload");
}
