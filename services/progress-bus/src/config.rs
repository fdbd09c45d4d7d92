//! Progress bus configuration.
//!
//! Environment variables are the sole config source:
//! - `TCP_SERVER_PORT`       - bus listen port (default 9001)
//! - `TCP_SERVER_HTTP_PORT`  - trigger/SSE gateway port (default 9010)
//! - `CHAT_HUB_HTTP_ADDR`    - hub base URL for the room glue
//!                             (default `http://chat-hub:8090`; empty disables)
//! - `JWT_SECRET`            - HS256 secret for the SSE handshake (required)
//! - `SSE_KEEPALIVE_SECONDS` - SSE ping cadence (default 15)

use std::env;
use std::time::Duration;

pub const DEFAULT_TCP_PORT: u16 = 9001;
pub const DEFAULT_HTTP_PORT: u16 = 9010;
pub const DEFAULT_CHAT_HUB_ADDR: &str = "http://chat-hub:8090";
pub const DEFAULT_SSE_KEEPALIVE_SECONDS: u64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_port: u16,
    pub http_port: u16,
    pub chat_hub_addr: Option<String>,
    pub jwt_secret: String,
    pub sse_keepalive: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            tcp_port: env_u16("TCP_SERVER_PORT", DEFAULT_TCP_PORT)?,
            http_port: env_u16("TCP_SERVER_HTTP_PORT", DEFAULT_HTTP_PORT)?,
            chat_hub_addr: env_addr("CHAT_HUB_HTTP_ADDR", DEFAULT_CHAT_HUB_ADDR),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            sse_keepalive: Duration::from_secs(env_u64(
                "SSE_KEEPALIVE_SECONDS",
                DEFAULT_SSE_KEEPALIVE_SECONDS,
            )?),
        })
    }
}

fn env_u16(var: &'static str, default: u16) -> Result<u16, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

/// An explicitly empty address disables the glue.
fn env_addr(var: &'static str, default: &str) -> Option<String> {
    match env::var(var) {
        Ok(value) if value.is_empty() => None,
        Ok(value) => Some(value),
        Err(_) => Some(default.to_owned()),
    }
}
