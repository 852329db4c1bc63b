pub mod cache;
pub mod error;
pub mod loading;
pub mod query;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod time;

use jiff::SignedDuration;
use payloads::APIClient;
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

pub use cache::QueryCache;
pub use error::{AppError, ErrorKind};
pub use loading::{LoadingKind, LoadingOptions, LoadingState, LoadingTracker};
pub use query::{PageState, PaginatedQuery, QueryOptions, RecordStore};
pub use retry::{RetryConfig, with_retry};
pub use store::{AppState, AppStore};

use crate::time::TimeSource;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

pub struct Config {
    /// Base address of the record store, e.g. `https://xyz.supabase.co`
    pub backend_url: String,
    pub backend_api_key: SecretString,
    pub cache_ttl: SignedDuration,
    pub default_page_size: u64,
    pub retry_max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        use std::env::var;

        let backend_url = var("BACKEND_URL")
            .map_err(|_| ConfigError::Missing("BACKEND_URL"))?;
        let backend_api_key = var("BACKEND_API_KEY")
            .map_err(|_| ConfigError::Missing("BACKEND_API_KEY"))?;

        Ok(Config {
            backend_url,
            backend_api_key: SecretString::from(backend_api_key),
            cache_ttl: SignedDuration::from_secs(parse_or(
                "CACHE_TTL_SECS",
                300,
            )?),
            default_page_size: parse_or("DEFAULT_PAGE_SIZE", 20)?,
            retry_max_retries: parse_or("RETRY_MAX_RETRIES", 3)?,
            retry_base_delay: Duration::from_millis(parse_or(
                "RETRY_BASE_DELAY_MS",
                1000,
            )?),
            retry_max_delay: Duration::from_millis(parse_or(
                "RETRY_MAX_DELAY_MS",
                30_000,
            )?),
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_max_retries,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            ..Default::default()
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            page_size: self.default_page_size,
            retry: Some(self.retry_config()),
            ..Default::default()
        }
    }

    pub fn api_client(&self) -> APIClient {
        APIClient::new(&self.backend_url, self.backend_api_key.clone())
    }

    pub fn query_cache(&self, time_source: TimeSource) -> QueryCache {
        QueryCache::new(time_source).with_default_ttl(self.cache_ttl)
    }
}

/// Parse an optional variable, falling back to `default` when it is unset.
fn parse_or<T: FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
