//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Port used when `PORT` is absent or unparseable
pub const DEFAULT_PORT: u16 = 8080;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Upstream origins and request shaping
    pub upstream: UpstreamConfig,
    /// Cache TTL policy and maintenance
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Origins tried in order; a 401/403 moves on to the next one
    pub origins: Vec<String>,
    /// Per-attempt timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Headers sent with every upstream request, in order
    pub headers: Vec<(String, String)>,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` for upstream calls
    pub system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origins: vec![
                "https://api.sofascore.com".to_string(),
                "https://www.sofascore.com".to_string(),
            ],
            timeout: Duration::from_secs(5),
            headers: default_browser_headers(),
            system_proxy: true,
        }
    }
}

/// Headers that make upstream requests look like the SofaScore web app
fn default_browser_headers() -> Vec<(String, String)> {
    [
        ("Accept", "application/json, text/plain, */*"),
        ("Accept-Language", "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121 Safari/537.36",
        ),
        ("Origin", "https://www.sofascore.com"),
        ("Referer", "https://www.sofascore.com/"),
        ("Sec-Fetch-Site", "same-origin"),
        ("Sec-Fetch-Mode", "cors"),
        ("Sec-Fetch-Dest", "empty"),
        ("X-Requested-With", "XMLHttpRequest"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Cache TTL policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for ordinary responses
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// TTL when the request carries a truthy `fast` flag
    #[serde(with = "humantime_serde")]
    pub fast_ttl: Duration,
    /// TTL when upstream answered 401/403 on every origin
    #[serde(with = "humantime_serde")]
    pub auth_failure_ttl: Duration,
    /// `max-age` advertised on preflight responses
    #[serde(with = "humantime_serde")]
    pub preflight_ttl: Duration,
    /// How often stale entries are purged (`0s` disables the sweeper)
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(15),
            fast_ttl: Duration::from_secs(3),
            auth_failure_ttl: Duration::from_secs(30),
            preflight_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional YAML file, and the environment
    ///
    /// `SOFA_PROXY_*` variables override file values (nested keys split on
    /// `__`). `PORT` is applied last and falls back to the default when it
    /// does not parse.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("SOFA_PROXY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Ok(raw) = env::var("PORT") {
            config.server.port = parse_port(Some(&raw));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the proxy cannot run with
    ///
    /// # Errors
    ///
    /// Returns an error if no origins are configured or an origin is not an
    /// absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.origins.is_empty() {
            return Err(Error::Config(
                "upstream.origins must list at least one origin".to_string(),
            ));
        }
        for origin in &self.upstream.origins {
            let parsed = url::Url::parse(origin)
                .map_err(|e| Error::Config(format!("Invalid upstream origin {origin}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "Upstream origin {origin} must use http or https"
                )));
            }
        }
        Ok(())
    }
}

/// Parse a listening port, defaulting to [`DEFAULT_PORT`] when absent or invalid
#[must_use]
pub fn parse_port(raw: Option<&str>) -> u16 {
    match raw.map(str::trim).map(str::parse::<u16>) {
        Some(Ok(port)) if port != 0 => port,
        Some(_) => {
            tracing::warn!(value = ?raw, default = DEFAULT_PORT, "Invalid PORT, using default");
            DEFAULT_PORT
        }
        None => DEFAULT_PORT,
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Bare integers count as seconds; figment reads `SOFA_PROXY_*=3` as one
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Secs(u64),
        Text(String),
    }

    /// Deserialize a duration given as seconds (`3`) or a human-readable
    /// string (`"30s"`, `"5m"`, `"100ms"`)
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => parse(&text).map_err(serde::de::Error::custom),
        }
    }

    fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let number = |raw: &str| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration {s:?}: {e}"))
        };

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins)?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration {s:?} is too large"))
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
