use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use sandbox_status::config::CredentialConfig;
use sandbox_status::router::{build_router, AppState, AuthConfig};
use sandbox_status::sessions::{SessionRegistry, SessionSource};

struct TestApp {
    app: Router,
    registry: Arc<SessionRegistry>,
}

impl TestApp {
    fn new(credentials: CredentialConfig) -> Self {
        Self::with_auth(credentials, AuthConfig::disabled())
    }

    fn with_auth(credentials: CredentialConfig, auth: AuthConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let app = build_router(AppState::new(auth, credentials, registry.clone()));
        Self { app, registry }
    }

    fn with_source(credentials: CredentialConfig, source: Arc<dyn SessionSource>) -> Self {
        let app = build_router(AppState::new(AuthConfig::disabled(), credentials, source));
        Self {
            app,
            registry: Arc::new(SessionRegistry::new()),
        }
    }
}

async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("request handled");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or(Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, value)
}

async fn send_json(app: &Router, method: Method, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("request");
    send_request(app, request).await
}
