//! Runtime configuration from `AGROADB_*` environment variables
//!
//! | Variable                    | Default | Meaning                          |
//! |-----------------------------|---------|----------------------------------|
//! | `AGROADB_TIMEOUT_MS`        | 10000   | global deadline per lookup       |
//! | `AGROADB_HTTP_TIMEOUT_MS`   | 8000    | per HTTP request                 |
//! | `AGROADB_RETRY_MAX`         | 2       | retries per strategy, at most 5  |
//! | `AGROADB_RETRY_DELAY_MS`    | 250     | fixed pause between retries      |
//! | `AGROADB_CACHE_TTL_SECS`    | 300     | result cache TTL, 0 disables it  |
//! | `AGROADB_CACHE_CAPACITY`    | 1000    | result cache entries             |
//! | `AGROADB_USER_AGENT`        |         | User-Agent for outbound requests |
//! | `AGROADB_<SOURCE>_TOKEN`    |         | credential for one source        |
//! | `AGROADB_<SOURCE>_URL`      |         | base URL override for one source |
//!
//! A missing token is not an error: that source reports
//! `credentials_missing` at lookup time.

use crate::catalog::SOURCE_NAMES;
use crate::errors::ConfigError;
use agroadb_resilience::RetryPolicy;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "AGROADB";

/// Upper bound for `AGROADB_RETRY_MAX`
pub const MAX_RETRIES: u32 = 5;

/// Credentials and endpoint override for one source
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    pub token: Option<String>,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSettings")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub timeout: Duration,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub user_agent: String,
    sources: HashMap<String, SourceSettings>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            http_timeout: Duration::from_millis(8_000),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1_000,
            user_agent: format!("agroadb-lookup/{}", env!("CARGO_PKG_VERSION")),
            sources: HashMap::new(),
        }
    }
}

impl LookupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` passes `std::env::var`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| {
            lookup(&format!("{}_{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self {
            timeout: millis(&get, "TIMEOUT_MS")?.unwrap_or(defaults.timeout),
            http_timeout: millis(&get, "HTTP_TIMEOUT_MS")?.unwrap_or(defaults.http_timeout),
            retry: RetryPolicy::new(
                retries(&get)?.unwrap_or(defaults.retry.max_retries),
                millis(&get, "RETRY_DELAY_MS")?.unwrap_or(defaults.retry.delay),
            ),
            cache_ttl: number(&get, "CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: number(&get, "CACHE_CAPACITY")?.unwrap_or(defaults.cache_capacity),
            user_agent: get("USER_AGENT").unwrap_or(defaults.user_agent),
            sources: HashMap::new(),
        };

        for source in SOURCE_NAMES {
            let upper = source.to_ascii_uppercase();
            let settings = SourceSettings {
                token: get(&format!("{}_TOKEN", upper)),
                base_url: get(&format!("{}_URL", upper)).map(|u| u.trim_end_matches('/').to_string()),
            };
            if settings != SourceSettings::default() {
                config.sources.insert(source.to_string(), settings);
            }
        }

        Ok(config)
    }

    pub fn with_token(mut self, source: &str, token: impl Into<String>) -> Self {
        self.sources.entry(source.to_string()).or_default().token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, source: &str, url: impl Into<String>) -> Self {
        self.sources.entry(source.to_string()).or_default().base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache_ttl = ttl;
        self.cache_capacity = capacity;
        self
    }

    pub fn token(&self, source: &str) -> Option<String> {
        self.sources.get(source).and_then(|s| s.token.clone())
    }

    /// Configured base URL for a source, or `default`
    pub fn base_url(&self, source: &str, default: &str) -> String {
        self.sources
            .get(source)
            .and_then(|s| s.base_url.clone())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn cache_enabled(&self) -> bool {
        !self.cache_ttl.is_zero() && self.cache_capacity > 0
    }

    /// Pooled client shared by every HTTP strategy
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: format!("{}_USER_AGENT", ENV_PREFIX),
                value: self.user_agent.clone(),
                reason: e.to_string(),
            })
    }
}

fn number<T, G>(get: &G, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key: format!("{}_{}", ENV_PREFIX, name),
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn retries<G>(get: &G) -> Result<Option<u32>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match number::<u32, G>(get, "RETRY_MAX")? {
        Some(n) if n > MAX_RETRIES => Err(ConfigError::Invalid {
            key: format!("{}_RETRY_MAX", ENV_PREFIX),
            value: n.to_string(),
            reason: format!("at most {} retries per strategy", MAX_RETRIES),
        }),
        other => Ok(other),
    }
}

fn millis<G>(get: &G, name: &str) -> Result<Option<Duration>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(number::<u64, G>(get, name)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<LookupConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LookupConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, LookupConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.cache_enabled());
        assert_eq!(config.token("serasa"), None);
    }

    #[test]
    fn test_overrides_and_source_settings() {
        let config = from_pairs(&[
            ("AGROADB_TIMEOUT_MS", "2500"),
            ("AGROADB_RETRY_MAX", "0"),
            ("AGROADB_RETRY_DELAY_MS", "50"),
            ("AGROADB_CACHE_TTL_SECS", "0"),
            ("AGROADB_SERASA_TOKEN", "abc"),
            ("AGROADB_DATAJUD_URL", "http://localhost:9200/"),
            ("AGROADB_RECEITA_CPF_TOKEN", "  "),
        ])
        .unwrap();

        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.retry, RetryPolicy::new(0, Duration::from_millis(50)));
        assert!(!config.cache_enabled());
        assert_eq!(config.token("serasa").as_deref(), Some("abc"));
        assert_eq!(config.token("receita_cpf"), None);
        assert_eq!(
            config.base_url("datajud", "https://api-publica.datajud.cnj.jus.br"),
            "http://localhost:9200"
        );
        assert_eq!(config.base_url("serasa", "https://default"), "https://default");
    }

    #[test]
    fn test_malformed_number_is_invalid() {
        let err = from_pairs(&[("AGROADB_HTTP_TIMEOUT_MS", "soon")]).unwrap_err();
        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "AGROADB_HTTP_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
        }
    }

    #[test]
    fn test_retry_count_is_bounded() {
        let config = from_pairs(&[("AGROADB_RETRY_MAX", "5")]).unwrap();
        assert_eq!(config.retry.max_retries, MAX_RETRIES);

        let err = from_pairs(&[("AGROADB_RETRY_MAX", "1000")]).unwrap_err();
        match err {
            ConfigError::Invalid { key, value, reason } => {
                assert_eq!(key, "AGROADB_RETRY_MAX");
                assert_eq!(value, "1000");
                assert!(reason.contains("at most 5"));
            }
        }
    }

    #[test]
    fn test_debug_hides_tokens() {
        let config = LookupConfig::default().with_token("serasa", "very-secret");
        assert!(!format!("{:?}", config).contains("very-secret"));
    }
}
