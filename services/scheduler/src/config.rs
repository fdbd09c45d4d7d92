//! Scheduler configuration.
//!
//! Environment variables are the sole config source:
//! - `UDP_SERVER_HTTP_ADDR`      - notification bus trigger base URL
//!                                 (default `http://udp-server:9020`)
//! - `JIKAN_API_BASE_URL`        - Jikan base (default `https://api.jikan.moe/v4`)
//! - `JIKAN_RATE_LIMIT_SECONDS`  - min seconds between Jikan calls (default 1)
//! - `MANGADEX_API_BASE_URL`     - MangaDex base (default `https://api.mangadex.org`)
//! - `MAL_CLIENT_ID`             - enables the MyAnimeList v2 adapter (optional)

use std::env;
use std::time::Duration;

pub const DEFAULT_UDP_HTTP_ADDR: &str = "http://udp-server:9020";
pub const DEFAULT_JIKAN_BASE_URL: &str = "https://api.jikan.moe/v4";
pub const DEFAULT_JIKAN_RATE_LIMIT_SECONDS: u64 = 1;
pub const DEFAULT_MANGADEX_BASE_URL: &str = "https://api.mangadex.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub udp_http_addr: String,
    pub jikan_base_url: String,
    pub jikan_rate_limit: Duration,
    pub mangadex_base_url: String,
    pub mal_client_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rate_limit_secs = match env::var("JIKAN_RATE_LIMIT_SECONDS") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "JIKAN_RATE_LIMIT_SECONDS",
                value,
            })?,
            Err(_) => DEFAULT_JIKAN_RATE_LIMIT_SECONDS,
        };
        Ok(Config {
            udp_http_addr: env::var("UDP_SERVER_HTTP_ADDR")
                .unwrap_or_else(|_| DEFAULT_UDP_HTTP_ADDR.to_owned()),
            jikan_base_url: env::var("JIKAN_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_JIKAN_BASE_URL.to_owned()),
            jikan_rate_limit: Duration::from_secs(rate_limit_secs),
            mangadex_base_url: env::var("MANGADEX_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MANGADEX_BASE_URL.to_owned()),
            mal_client_id: env::var("MAL_CLIENT_ID").ok().filter(|id| !id.is_empty()),
        })
    }
}
