use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use axum::Router;
use sandbox_status_error::{ErrorType, ProblemDetails, SandboxError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::{OpenApi, ToSchema};

use crate::config::CredentialConfig;
use crate::sessions::{SandboxSession, SessionSource};

const HEALTH_PATH: &str = "/v1/health";
const CREDENTIAL_NOT_CONFIGURED: &str =
    "E2B API key is not configured. Please set E2B_API_KEY in your .env.local file.";
const CREDENTIAL_INVALID: &str = "Invalid E2B API key configuration";

#[derive(Debug)]
pub struct AppState {
    auth: AuthConfig,
    credentials: CredentialConfig,
    sessions: Arc<dyn SessionSource>,
}

impl AppState {
    pub fn new(
        auth: AuthConfig,
        credentials: CredentialConfig,
        sessions: Arc<dyn SessionSource>,
    ) -> Self {
        Self {
            auth,
            credentials,
            sessions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl AuthConfig {
    pub fn disabled() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: String) -> Self {
        Self { token: Some(token) }
    }
}

pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let mut router = Router::new()
        .route("/api/sandbox-status", get(get_sandbox_status))
        .route(HEALTH_PATH, get(get_health))
        .route("/v1/openapi.json", get(get_openapi))
        .with_state(shared.clone());

    if shared.auth.token.is_some() {
        router = router.layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_token,
        ));
    }

    let http_logging = match std::env::var("SANDBOX_STATUS_LOG_HTTP") {
        Ok(value) if value == "0" || value.eq_ignore_ascii_case("false") => false,
        _ => true,
    };
    if http_logging {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|req: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    uri = %req.uri()
                )
            })
            .on_request(|_req: &Request<_>, span: &Span| {
                tracing::info!(parent: span, "request");
            })
            .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                tracing::info!(
                    parent: span,
                    status = %res.status(),
                    latency_ms = latency.as_millis()
                );
            });
        router = router.layer(trace_layer);
    }

    router
}

#[derive(OpenApi)]
#[openapi(
    paths(get_sandbox_status, get_health),
    components(schemas(StatusReport, SandboxInfo, HealthResponse, ProblemDetails, ErrorType)),
    tags(
        (name = "sandbox", description = "Sandbox status"),
        (name = "meta", description = "Service metadata")
    )
)]
pub struct ApiDoc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem: ProblemDetails = match &self {
            ApiError::Sandbox(err) => err.to_problem_details(),
        };
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(problem)).into_response()
    }
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = match &state.auth.token {
        Some(token) => token.as_str(),
        None => return Ok(next.run(req).await),
    };
    if req.uri().path() == HEALTH_PATH {
        return Ok(next.run(req).await);
    }

    let provided = extract_token(req.headers());
    if provided.as_deref() == Some(expected) {
        Ok(next.run(req).await)
    } else {
        Err(SandboxError::TokenInvalid {
            message: Some("missing or invalid token".to_string()),
        }
        .into())
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            let value = value.trim();
            if let Some(stripped) = value.strip_prefix("Bearer ") {
                return Some(stripped.to_string());
            }
            if let Some(stripped) = value.strip_prefix("Token ") {
                return Some(stripped.to_string());
            }
        }
    }

    if let Some(value) = headers.get("x-sandbox-token") {
        if let Ok(value) = value.to_str() {
            return Some(value.to_string());
        }
    }

    None
}

pub fn add_token_header(headers: &mut HeaderMap, token: &str) {
    let value = format!("Bearer {token}");
    if let Ok(header) = HeaderValue::from_str(&value) {
        headers.insert(axum::http::header::AUTHORIZATION, header);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInfo {
    pub sandbox_id: String,
    pub url: String,
    pub files_tracked: Vec<String>,
    pub last_health_check: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub success: bool,
    pub active: bool,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub requires_setup: bool,
    /// `None` omits the key; `Some(None)` reports an explicit `null`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_sandbox_data"
    )]
    #[schema(value_type = Option<SandboxInfo>)]
    #[schemars(with = "Option<SandboxInfo>")]
    pub sandbox_data: Option<Option<SandboxInfo>>,
    pub message: String,
}

fn present_sandbox_data<'de, D>(deserializer: D) -> Result<Option<Option<SandboxInfo>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<SandboxInfo>::deserialize(deserializer).map(Some)
}

impl StatusReport {
    fn setup_required() -> Self {
        Self {
            success: false,
            active: false,
            healthy: false,
            error: Some(CREDENTIAL_NOT_CONFIGURED.to_string()),
            requires_setup: true,
            sandbox_data: None,
            message: "E2B API key configuration required".to_string(),
        }
    }

    fn failed(err: &SandboxError) -> Self {
        let mut error = err.to_string();
        let mut requires_setup = false;
        if error.contains("401") || error.contains("Invalid API key") {
            error = CREDENTIAL_INVALID.to_string();
            requires_setup = true;
        }
        Self {
            success: false,
            active: false,
            healthy: false,
            error: Some(error),
            requires_setup,
            sandbox_data: None,
            message: "Failed to check sandbox status".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/api/sandbox-status",
    responses(
        (status = 200, body = StatusReport),
        (status = 401, body = ProblemDetails),
        (status = 500, body = StatusReport)
    ),
    tag = "sandbox"
)]
async fn get_sandbox_status(State(state): State<Arc<AppState>>) -> Response {
    match check_sandbox_status(&state) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "sandbox status check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusReport::failed(&err)),
            )
                .into_response()
        }
    }
}

fn check_sandbox_status(state: &AppState) -> Result<StatusReport, SandboxError> {
    if !state.credentials.is_configured() {
        return Ok(StatusReport::setup_required());
    }
    let session = state.sessions.current()?;
    Ok(report_for_session(session.as_ref(), OffsetDateTime::now_utc()))
}

// A cached session counts as healthy; the sandbox itself is not probed.
fn report_for_session(
    session: Option<&SandboxSession>,
    checked_at: OffsetDateTime,
) -> StatusReport {
    let active = session.is_some();
    let mut healthy = false;
    let mut sandbox_data = None;

    if let Some(session) = session {
        match sandbox_info(session, checked_at) {
            Ok(info) => {
                healthy = true;
                sandbox_data = Some(info);
            }
            Err(err) => {
                tracing::error!(
                    sandbox_id = session.sandbox_id(),
                    error = %err,
                    "sandbox health check failed"
                );
            }
        }
    }

    let message = if healthy {
        "Sandbox is active and healthy"
    } else if active {
        "Sandbox exists but is not responding"
    } else {
        "No active sandbox"
    };

    StatusReport {
        success: true,
        active,
        healthy,
        error: None,
        requires_setup: false,
        sandbox_data: Some(sandbox_data),
        message: message.to_string(),
    }
}

fn sandbox_info(
    session: &SandboxSession,
    checked_at: OffsetDateTime,
) -> Result<SandboxInfo, SandboxError> {
    let last_health_check = checked_at
        .format(&Rfc3339)
        .map_err(|err| SandboxError::Internal {
            message: format!("failed to format health check time: {err}"),
        })?;
    Ok(SandboxInfo {
        sandbox_id: session.sandbox_id().to_string(),
        url: session.url().to_string(),
        files_tracked: session.files().snapshot()?,
        last_health_check,
    })
}

#[utoipa::path(
    get,
    path = "/v1/health",
    responses((status = 200, body = HealthResponse)),
    tag = "meta"
)]
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn get_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
