//! Sandbox status reporting and retrying HTTP fetch utilities.

pub mod config;
pub mod http_client;
pub mod router;
pub mod sessions;
pub mod telemetry;
