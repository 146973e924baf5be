//! Runtime configuration from the environment.
//!
//! | Variable                      | Default | Meaning                                  |
//! |-------------------------------|---------|------------------------------------------|
//! | `CHARTDATA_PORT`              | `3000`  | HTTP server port                         |
//! | `CHARTDATA_BASE_URL`          | -       | Base for relative resource URLs          |
//! | `CHARTDATA_HTTP_TIMEOUT_SECS` | -       | Request timeout for HTTP resources       |
//! | `CHARTDATA_USER_AGENT`        | -       | User agent sent with HTTP requests       |
//!
//! A `.env` file in the working directory is loaded first when present.

use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::error::{ConfigError, FetchResult};
use crate::loader::{DefaultFetcher, HttpFetcher};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub base_url: Option<Url>,
    pub http_timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_url: None,
            http_timeout: None,
            user_agent: None,
        }
    }
}

impl Config {
    /// Load `.env` (if present) then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(port) = get("CHARTDATA_PORT") {
            config.port = port.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "CHARTDATA_PORT",
                value: port.clone(),
                message: e.to_string(),
            })?;
        }

        if let Some(base) = get("CHARTDATA_BASE_URL") {
            config.base_url = Some(Url::parse(&base).map_err(|e| ConfigError::Invalid {
                name: "CHARTDATA_BASE_URL",
                value: base.clone(),
                message: e.to_string(),
            })?);
        }

        if let Some(secs) = get("CHARTDATA_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "CHARTDATA_HTTP_TIMEOUT_SECS",
                value: secs.clone(),
                message: e.to_string(),
            })?;
            config.http_timeout = Some(Duration::from_secs(secs));
        }

        config.user_agent = get("CHARTDATA_USER_AGENT");

        Ok(config)
    }

    /// The fetcher described by this config.
    pub fn fetcher(&self) -> FetchResult<DefaultFetcher> {
        Ok(DefaultFetcher::new(self.http_fetcher()?))
    }

    /// Like [`Config::fetcher`] but without local file access.
    pub fn remote_fetcher(&self) -> FetchResult<DefaultFetcher> {
        Ok(DefaultFetcher::remote_only(self.http_fetcher()?))
    }

    fn http_fetcher(&self) -> FetchResult<HttpFetcher> {
        HttpFetcher::with_settings(self.http_timeout, self.user_agent.as_deref())
    }
}
