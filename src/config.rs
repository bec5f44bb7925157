//! Service configuration from the environment

use crate::core::batch::{DEFAULT_BATCH_CONCURRENCY, DEFAULT_MAX_BATCH};
use crate::download::profile::{CookieSource, TransportSettings};
use crate::error::MediaError;
use crate::ratelimit::{RateBackend, RateLimits};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Origins allowed by CORS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// `*` or a comma separated list
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == "*" {
            return AllowedOrigins::Any;
        }
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

/// Everything `serve` needs to assemble the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Required `X-API-KEY` value; `None` disables authentication
    pub api_key: Option<String>,
    pub rate_limits: RateLimits,
    pub rate_backend: RateBackend,
    pub allowed_origins: AllowedOrigins,
    pub bind: SocketAddr,
    /// Parent of every scratch directory
    pub scratch_dir: PathBuf,
    pub batch_concurrency: usize,
    pub max_batch: usize,
    pub transport: TransportSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limits: RateLimits::default(),
            rate_backend: RateBackend::Sliding,
            allowed_origins: AllowedOrigins::Any,
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            scratch_dir: std::env::temp_dir(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            max_batch: DEFAULT_MAX_BATCH,
            transport: TransportSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self, MediaError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or blank variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MediaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        config.api_key = var("API_KEY");

        let limit = parse_var::<u32>("RATE_LIMIT", var("RATE_LIMIT"))?.unwrap_or(config.rate_limits.limit);
        let period = parse_var::<u64>("RATE_PERIOD", var("RATE_PERIOD"))?
            .map(Duration::from_secs)
            .unwrap_or(config.rate_limits.period);
        config.rate_limits = RateLimits::new(limit, period)?;

        if let Some(backend) = var("RATE_BACKEND") {
            config.rate_backend = backend.parse()?;
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            config.allowed_origins = AllowedOrigins::parse(&origins);
        }
        if let Some(bind) = parse_var::<SocketAddr>("MEDIAFETCH_BIND", var("MEDIAFETCH_BIND"))? {
            config.bind = bind;
        }
        if let Some(dir) = var("MEDIAFETCH_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(n) = parse_var::<usize>("MEDIAFETCH_BATCH_CONCURRENCY", var("MEDIAFETCH_BATCH_CONCURRENCY"))? {
            config.batch_concurrency = positive("MEDIAFETCH_BATCH_CONCURRENCY", n)?;
        }
        if let Some(n) = parse_var::<usize>("MEDIAFETCH_MAX_BATCH", var("MEDIAFETCH_MAX_BATCH"))? {
            config.max_batch = positive("MEDIAFETCH_MAX_BATCH", n)?;
        }
        if let Some(flag) = var("MEDIAFETCH_INSECURE_TLS") {
            config.transport.insecure_tls_fallback = parse_flag("MEDIAFETCH_INSECURE_TLS", &flag)?;
        }
        config.transport.proxy = var("MEDIAFETCH_PROXY");
        if let Some(timeout) = var("MEDIAFETCH_TIMEOUT") {
            config.transport.timeout = humantime::parse_duration(&timeout)
                .map_err(|e| invalid("MEDIAFETCH_TIMEOUT", &timeout, e))?;
        }
        config.transport.cookies = match (var("MEDIAFETCH_COOKIES_FROM_BROWSER"), var("MEDIAFETCH_COOKIES_FILE")) {
            (Some(browser), None) => Some(CookieSource::Browser(browser)),
            (None, Some(file)) => Some(CookieSource::File(PathBuf::from(file))),
            (None, None) => None,
            (Some(browser), Some(_)) => {
                return Err(invalid(
                    "MEDIAFETCH_COOKIES_FROM_BROWSER",
                    &browser,
                    "set either this or MEDIAFETCH_COOKIES_FILE",
                ))
            }
        };
        if let Some(rate) = var("MEDIAFETCH_BANDWIDTH") {
            config.transport.bandwidth_bps =
                Some(parse_bandwidth(&rate).ok_or_else(|| invalid("MEDIAFETCH_BANDWIDTH", &rate, "expected e.g. 2MiB/s"))?);
        }

        Ok(config)
    }
}

fn invalid(name: &str, value: &str, reason: impl std::fmt::Display) -> MediaError {
    MediaError::InvalidInput(format!("Invalid value for {}: '{}' ({})", name, value, reason))
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>, MediaError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(name, &raw, e)))
        .transpose()
}

fn positive(name: &str, value: usize) -> Result<usize, MediaError> {
    if value == 0 {
        return Err(invalid(name, "0", "must be at least 1"));
    }
    Ok(value)
}

fn parse_flag(name: &str, value: &str) -> Result<bool, MediaError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value, "expected true or false")),
    }
}

/// Parse a bandwidth such as `2MiB/s` or `500KB` into bytes per second
pub fn parse_bandwidth(rate: &str) -> Option<u64> {
    let rate = rate.trim().to_uppercase();
    let rate = rate.trim_end_matches("/S");
    if rate.is_empty() {
        return None;
    }

    let number_end = rate
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, _)| i + 1)?;
    let number: f64 = rate[..number_end].parse().ok()?;
    if number <= 0.0 {
        return None;
    }

    let multiplier: u64 = match rate[number_end..].trim() {
        "B" | "" => 1,
        "KB" => 1000,
        "KIB" => 1024,
        "MB" => 1000 * 1000,
        "MIB" => 1024 * 1024,
        "GB" => 1000 * 1000 * 1000,
        "GIB" => 1024 * 1024 * 1024,
        _ => return None,
    };

    Some((number * multiplier as f64) as u64)
}
