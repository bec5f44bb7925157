//! Immutable per-attempt request profiles

use crate::error::MediaError;
use reqwest::{Client, ClientBuilder};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Browser identities rotated across attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserProfile {
    Chrome,
    Edge,
    Firefox,
    Opera,
    Safari,
}

impl BrowserProfile {
    /// Fixed rotation order
    pub const POOL: [BrowserProfile; 5] = [
        BrowserProfile::Chrome,
        BrowserProfile::Edge,
        BrowserProfile::Firefox,
        BrowserProfile::Opera,
        BrowserProfile::Safari,
    ];

    /// Profile used for the given zero-based attempt
    pub fn for_attempt(attempt: u32) -> Self {
        Self::POOL[attempt as usize % Self::POOL.len()]
    }

    pub fn user_agent(&self) -> &'static str {
        match self {
            BrowserProfile::Chrome => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
            BrowserProfile::Edge => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
            BrowserProfile::Firefox => "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
            BrowserProfile::Opera => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 OPR/105.0.0.0",
            BrowserProfile::Safari => "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        }
    }
}

/// How much transport security a fetch keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsMode {
    /// Negotiated TLS with full certificate verification
    Standard,
    /// Verified, but at most TLS 1.2
    CappedTls12,
    /// Verified, but at most TLS 1.1
    CappedTls11,
    /// Certificate verification disabled
    Unverified,
}

impl TlsMode {
    pub fn trust(&self) -> TransportTrust {
        match self {
            TlsMode::Standard => TransportTrust::Verified,
            TlsMode::CappedTls12 | TlsMode::CappedTls11 => TransportTrust::Downgraded,
            TlsMode::Unverified => TransportTrust::Unverified,
        }
    }
}

/// Trust level recorded on every successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportTrust {
    Verified,
    Downgraded,
    Unverified,
}

impl TransportTrust {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportTrust::Verified => "verified",
            TransportTrust::Downgraded => "downgraded",
            TransportTrust::Unverified => "unverified",
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self != TransportTrust::Verified
    }
}

impl fmt::Display for TransportTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login cookies handed to the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    /// Browser to read cookies from, in the extractor's `BROWSER[:PROFILE]` form
    Browser(String),
    /// Netscape-format cookie file
    File(PathBuf),
}

impl CookieSource {
    /// Extractor arguments selecting this source
    pub fn extractor_args(&self) -> [String; 2] {
        match self {
            CookieSource::Browser(browser) => ["--cookies-from-browser".to_string(), browser.clone()],
            CookieSource::File(path) => ["--cookies".to_string(), path.to_string_lossy().into_owned()],
        }
    }
}

/// Transport settings shared by every strategy
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Per-request timeout
    pub timeout: Duration,
    /// Proxy URL (http/https/socks)
    pub proxy: Option<String>,
    /// Fixed user agent instead of the rotating pool
    pub user_agent: Option<String>,
    /// Allow TLS-capped and unverified fallbacks
    pub insecure_tls_fallback: bool,
    /// Connections per download for the accelerated downloader
    pub accelerator_connections: u32,
    /// Download bandwidth cap in bytes per second for direct streaming
    pub bandwidth_bps: Option<u64>,
    /// Cookies for sign-in or age gated sources
    pub cookies: Option<CookieSource>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
            user_agent: None,
            insecure_tls_fallback: false,
            accelerator_connections: 8,
            bandwidth_bps: None,
            cookies: None,
        }
    }
}

/// Request configuration for one attempt; built fresh, never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProfile {
    user_agent: String,
    tls: TlsMode,
    timeout: Duration,
    proxy: Option<String>,
    cookies: Option<CookieSource>,
}

impl RequestProfile {
    /// Derive the profile of the given zero-based attempt
    pub fn for_attempt(settings: &TransportSettings, attempt: u32, tls: TlsMode) -> Self {
        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(|| BrowserProfile::for_attempt(attempt).user_agent().to_string());
        Self {
            user_agent,
            tls,
            timeout: settings.timeout,
            proxy: settings.proxy.clone(),
            cookies: settings.cookies.clone(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn tls(&self) -> TlsMode {
        self.tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn cookies(&self) -> Option<&CookieSource> {
        self.cookies.as_ref()
    }

    /// Build an HTTP client honoring this profile
    pub fn build_client(&self) -> Result<Client, MediaError> {
        let mut builder = ClientBuilder::new()
            .timeout(self.timeout)
            .connect_timeout(self.timeout.min(Duration::from_secs(15)))
            .user_agent(self.user_agent.as_str())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .http1_only();

        builder = match self.tls {
            TlsMode::Standard => builder,
            TlsMode::CappedTls12 => builder.max_tls_version(reqwest::tls::Version::TLS_1_2),
            TlsMode::CappedTls11 => builder
                .min_tls_version(reqwest::tls::Version::TLS_1_0)
                .max_tls_version(reqwest::tls::Version::TLS_1_1),
            TlsMode::Unverified => builder.danger_accept_invalid_certs(true),
        };

        if let Some(proxy_url) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| MediaError::InvalidInput(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| MediaError::Generic(format!("Failed to build HTTP client: {}", e)))
    }
}
