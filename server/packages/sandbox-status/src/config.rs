use std::env;
use std::fmt;
use std::time::Duration;

pub const E2B_API_KEY_ENV: &str = "E2B_API_KEY";
pub const E2B_API_KEY_PLACEHOLDER: &str = "your_e2b_api_key";

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Defaults applied to outbound API calls when a caller leaves a retry knob unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Credential used to talk to the sandbox provider.
#[derive(Clone, Default)]
pub struct CredentialConfig {
    api_key: Option<String>,
}

impl CredentialConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var(E2B_API_KEY_ENV).ok(),
        }
    }

    pub fn missing() -> Self {
        Self { api_key: None }
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    /// Unset, blank and placeholder keys all count as not configured.
    pub fn is_configured(&self) -> bool {
        match self.api_key.as_deref() {
            Some(key) => !key.trim().is_empty() && key != E2B_API_KEY_PLACEHOLDER,
            None => false,
        }
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = self.api_key.as_ref().map(|_| "<redacted>");
        f.debug_struct("CredentialConfig")
            .field("api_key", &api_key)
            .finish()
    }
}
