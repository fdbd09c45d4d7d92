//! Chat hub configuration.
//!
//! Environment variables are the sole config source:
//! - `WS_SERVER_PORT` - listener port (default 8090)
//! - `JWT_SECRET`     - HS256 secret for the WS handshake (required)

use std::env;

pub const DEFAULT_WS_PORT: u16 = 8090;

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    pub jwt_secret: String,
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
        let ws_port = match env::var("WS_SERVER_PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "WS_SERVER_PORT",
                value,
            })?,
            Err(_) => DEFAULT_WS_PORT,
        };
        Ok(Config {
            ws_port,
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
        })
    }
}
