use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use sandbox_status::config::{ApiConfig, CredentialConfig, E2B_API_KEY_ENV};
use sandbox_status::http_client::{HttpFetcher, RequestOptions, RetryOptions};
use sandbox_status::router::{build_router, AppState, AuthConfig};
use sandbox_status::sessions::SessionRegistry;
use sandbox_status::telemetry;
use sandbox_status_error::SandboxError;

#[derive(Parser, Debug)]
#[command(
    name = "sandbox-status",
    version,
    about = "Sandbox status server and retrying fetch client"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the sandbox status API.
    Server(ServerArgs),
    /// Fetch a URL with retries and print the response.
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 2468)]
    port: u16,
    /// Require this bearer token on every route except /v1/health.
    #[arg(long)]
    token: Option<String>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    url: String,
    #[arg(long, short = 'X', default_value = "GET")]
    method: String,
    /// Request header as `name: value`; repeatable.
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,
    #[arg(long, short = 'd')]
    data: Option<String>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Fetch(args) => run_fetch(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sandbox-status failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(args: ServerArgs) -> Result<(), SandboxError> {
    let credentials = CredentialConfig::from_env();
    if !credentials.is_configured() {
        tracing::warn!(env = E2B_API_KEY_ENV, "sandbox credential is not configured");
    }
    let auth = match args.token {
        Some(token) => AuthConfig::with_token(token),
        None => AuthConfig::disabled(),
    };

    let registry = Arc::new(SessionRegistry::new());
    let router = build_router(AppState::new(auth, credentials, registry));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|err| SandboxError::InvalidRequest {
            message: format!("invalid listen address: {err}"),
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| SandboxError::Internal {
            message: format!("failed to bind {addr}: {err}"),
        })?;
    tracing::info!(%addr, "sandbox-status listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| SandboxError::Internal {
            message: err.to_string(),
        })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn run_fetch(args: FetchArgs) -> Result<(), SandboxError> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes()).map_err(|err| {
        SandboxError::InvalidRequest {
            message: format!("invalid method {}: {err}", args.method),
        }
    })?;
    let mut options = RequestOptions::get()
        .with_method(method)
        .with_headers(parse_headers(&args.headers)?);
    if let Some(data) = args.data {
        options = options.with_body(data);
    }
    let retry = RetryOptions {
        max_retries: args.max_retries,
        retry_delay: args.retry_delay_ms.map(Duration::from_millis),
        timeout: args.timeout_ms.map(Duration::from_millis),
    };

    let fetcher = HttpFetcher::new(ApiConfig::default())?;
    let response = fetcher.fetch(&args.url, &options, retry).await?;
    let status = response.status();
    let body = response.text().await.map_err(|err| SandboxError::Internal {
        message: format!("failed to read response body: {err}"),
    })?;
    println!("HTTP {status}");
    println!("{body}");
    Ok(())
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, SandboxError> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| SandboxError::InvalidRequest {
                message: format!("header must be `name: value`, got {entry}"),
            })?;
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|err| {
            SandboxError::InvalidRequest {
                message: format!("invalid header name {name}: {err}"),
            }
        })?;
        let value = HeaderValue::from_str(value.trim()).map_err(|err| {
            SandboxError::InvalidRequest {
                message: format!("invalid header value for {name}: {err}"),
            }
        })?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_headers() {
        let headers = parse_headers(&[
            "Accept: application/json".to_string(),
            "x-trace:abc".to_string(),
            "x-trace: def".to_string(),
        ])
        .expect("headers");
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert_eq!(headers.get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn rejects_header_without_separator() {
        let err = parse_headers(&["no-colon".to_string()]).expect_err("invalid");
        assert!(matches!(err, SandboxError::InvalidRequest { .. }));
    }

    #[test]
    fn cli_parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "sandbox-status",
            "fetch",
            "https://example.com",
            "--max-retries",
            "2",
            "--timeout-ms",
            "500",
            "-H",
            "accept: */*",
        ])
        .expect("parse");
        match cli.command {
            Command::Fetch(args) => {
                assert_eq!(args.url, "https://example.com");
                assert_eq!(args.max_retries, Some(2));
                assert_eq!(args.timeout_ms, Some(500));
                assert_eq!(args.retry_delay_ms, None);
                assert_eq!(args.headers.len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
