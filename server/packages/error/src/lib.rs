use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    TokenInvalid,
    StateUnavailable,
    FetchFailed,
    Internal,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "urn:sandbox-status:error:invalid_request",
            Self::TokenInvalid => "urn:sandbox-status:error:token_invalid",
            Self::StateUnavailable => "urn:sandbox-status:error:state_unavailable",
            Self::FetchFailed => "urn:sandbox-status:error:fetch_failed",
            Self::Internal => "urn:sandbox-status:error:internal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::TokenInvalid => "Token Invalid",
            Self::StateUnavailable => "State Unavailable",
            Self::FetchFailed => "Fetch Failed",
            Self::Internal => "Internal Error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::TokenInvalid => 401,
            Self::StateUnavailable => 500,
            Self::FetchFailed => 502,
            Self::Internal => 500,
        }
    }
}

/// RFC 7807 problem details body returned for failed API calls.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("token invalid")]
    TokenInvalid { message: Option<String> },
    #[error("sandbox state unavailable: {message}")]
    StateUnavailable { message: String },
    #[error("fetch failed after {attempts} attempts: {message}")]
    FetchFailed { attempts: u32, message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SandboxError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::TokenInvalid { .. } => ErrorType::TokenInvalid,
            Self::StateUnavailable { .. } => ErrorType::StateUnavailable,
            Self::FetchFailed { .. } => ErrorType::FetchFailed,
            Self::Internal { .. } => ErrorType::Internal,
        }
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let detail = match self {
            Self::TokenInvalid { message } => message.clone(),
            _ => Some(self.to_string()),
        };
        ProblemDetails::new(self.error_type(), detail)
    }
}
