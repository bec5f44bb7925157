//! Command line argument parsing

use crate::config::{parse_bandwidth, ServiceConfig};
use crate::download::profile::{CookieSource, TransportSettings};
use crate::error::MediaError;
use crate::ratelimit::{RateBackend, RateLimits};
use crate::utils::url::extract_links;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// mediafetch - video download service and command line downloader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Download one or more URLs into a folder
    Get(GetArgs),
    /// Print metadata of a URL as JSON
    Info(InfoArgs),
}

/// Transport options shared by every command
#[derive(clap::Args, Debug, Default, Clone)]
pub struct TransportArgs {
    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<humantime::Duration>,

    /// Download bandwidth cap for direct streams (e.g., 2MiB/s, 500KiB/s)
    #[arg(long, value_name = "RATE")]
    pub bandwidth: Option<String>,

    /// Proxy URL (http/https/socks)
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Override User-Agent header
    #[arg(long, value_name = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Allow weaker TLS and unverified certificates as a last resort
    #[arg(long)]
    pub insecure_tls: bool,

    /// Connections per download for aria2c
    #[arg(long, value_name = "N")]
    pub connections: Option<u32>,

    /// Hand the extractor cookies from this browser (e.g., firefox, chrome:Profile 1)
    #[arg(long, value_name = "BROWSER", conflicts_with = "cookies")]
    pub cookies_from_browser: Option<String>,

    /// Hand the extractor cookies from a Netscape cookie file
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,
}

impl TransportArgs {
    /// Overlay the flags that were given onto `settings`
    pub fn apply(&self, settings: &mut TransportSettings) -> Result<(), MediaError> {
        if let Some(timeout) = self.timeout {
            settings.timeout = timeout.into();
        }
        if let Some(rate) = &self.bandwidth {
            settings.bandwidth_bps = Some(parse_bandwidth(rate).ok_or_else(|| {
                MediaError::InvalidInput(format!("Invalid bandwidth '{}', expected e.g. 2MiB/s", rate))
            })?);
        }
        if let Some(proxy) = &self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(user_agent) = &self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if self.insecure_tls {
            settings.insecure_tls_fallback = true;
        }
        if let Some(connections) = self.connections {
            settings.accelerator_connections = connections;
        }
        if let Some(browser) = &self.cookies_from_browser {
            settings.cookies = Some(CookieSource::Browser(browser.clone()));
        } else if let Some(file) = &self.cookies {
            settings.cookies = Some(CookieSource::File(file.clone()));
        }
        Ok(())
    }
}

#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Require this value in the X-API-KEY header
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Requests admitted per period and client
    #[arg(long, value_name = "N")]
    pub rate_limit: Option<u32>,

    /// Rate limit period (e.g., 60s, 1h)
    #[arg(long, value_name = "DURATION")]
    pub rate_period: Option<humantime::Duration>,

    /// Rate limit accounting: sliding or fixed
    #[arg(long, value_name = "BACKEND")]
    pub rate_backend: Option<RateBackend>,

    /// Parent directory for scratch files
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Batch downloads in flight at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub transport: TransportArgs,
}

impl ServeArgs {
    /// Flags win over the environment
    pub fn apply(&self, config: &mut ServiceConfig) -> Result<(), MediaError> {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            config.api_key = Some(key.to_string());
        }
        if self.rate_limit.is_some() || self.rate_period.is_some() {
            config.rate_limits = RateLimits::new(
                self.rate_limit.unwrap_or(config.rate_limits.limit),
                self.rate_period
                    .map(Duration::from)
                    .unwrap_or(config.rate_limits.period),
            )?;
        }
        if let Some(backend) = self.rate_backend {
            config.rate_backend = backend;
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.batch_concurrency = concurrency.max(1);
        }
        self.transport.apply(&mut config.transport)
    }
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Video or direct media URLs
    pub urls: Vec<String>,

    /// Text file to pull additional links from
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Quality (best, 1080p, 720p, 480p, 360p, audio, audio-mp3) or a format expression
    #[arg(short, long, value_name = "FORMAT", default_value = "best")]
    pub format: String,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Downloads in flight at once
    #[arg(long, default_value = "2")]
    pub concurrency: usize,

    /// Disable progress output
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub transport: TransportArgs,
}

impl GetArgs {
    /// Positional URLs followed by links found in `--input`, de-duplicated in order
    pub fn collect_urls(&self) -> Result<Vec<String>, MediaError> {
        let mut urls: Vec<String> = Vec::new();
        let mut push = |url: String| {
            if !urls.contains(&url) {
                urls.push(url);
            }
        };

        for url in &self.urls {
            push(url.trim().to_string());
        }
        if let Some(path) = &self.input {
            let text = std::fs::read_to_string(path)?;
            for link in extract_links(&text) {
                push(link);
            }
        }

        if urls.is_empty() {
            return Err(MediaError::InvalidInput(
                "No URLs given; pass them as arguments or with --input".to_string(),
            ));
        }
        Ok(urls)
    }
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Video or direct media URL
    pub url: String,

    /// Print a readable summary instead of JSON
    #[arg(long)]
    pub summary: bool,

    #[command(flatten)]
    pub transport: TransportArgs,
}

impl Args {
    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_args_verbosity_level() {
        assert_eq!(parse(&["mediafetch", "serve"]).verbosity_level(), VerbosityLevel::Normal);
        assert_eq!(parse(&["mediafetch", "-q", "serve"]).verbosity_level(), VerbosityLevel::Quiet);
        assert_eq!(
            parse(&["mediafetch", "info", "https://a.example/v", "--verbose"]).verbosity_level(),
            VerbosityLevel::Verbose
        );
    }

    #[test]
    fn test_get_defaults() {
        match parse(&["mediafetch", "get", "https://a.example/v"]).command {
            Command::Get(get) => {
                assert_eq!(get.format, "best");
                assert_eq!(get.output, PathBuf::from("."));
                assert_eq!(get.concurrency, 2);
                assert!(!get.no_progress);
                assert!(!get.transport.insecure_tls);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_transport_flags_apply() {
        let args = parse(&[
            "mediafetch",
            "get",
            "https://a.example/v",
            "--timeout",
            "1m",
            "--bandwidth",
            "1MiB/s",
            "--proxy",
            "http://proxy:8080",
            "--insecure-tls",
            "--connections",
            "4",
        ]);
        let Command::Get(get) = args.command else {
            panic!("expected get");
        };

        let mut settings = TransportSettings::default();
        get.transport.apply(&mut settings).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.bandwidth_bps, Some(1024 * 1024));
        assert_eq!(settings.proxy.as_deref(), Some("http://proxy:8080"));
        assert!(settings.insecure_tls_fallback);
        assert_eq!(settings.accelerator_connections, 4);
        assert_eq!(settings.cookies, None);
    }

    #[test]
    fn test_cookie_flags() {
        let args = parse(&["mediafetch", "info", "https://a.example/v", "--cookies-from-browser", "firefox"]);
        let Command::Info(info) = args.command else {
            panic!("expected info");
        };
        let mut settings = TransportSettings::default();
        info.transport.apply(&mut settings).unwrap();
        assert_eq!(settings.cookies, Some(CookieSource::Browser("firefox".to_string())));

        let args = parse(&["mediafetch", "serve", "--cookies", "/srv/cookies.txt"]);
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        let mut config = ServiceConfig::default();
        serve.apply(&mut config).unwrap();
        assert_eq!(
            config.transport.cookies,
            Some(CookieSource::File(PathBuf::from("/srv/cookies.txt")))
        );

        assert!(Args::try_parse_from([
            "mediafetch",
            "get",
            "https://a.example/v",
            "--cookies-from-browser",
            "chrome",
            "--cookies",
            "c.txt",
        ])
        .is_err());
    }

    #[test]
    fn test_invalid_bandwidth_is_rejected() {
        let transport = TransportArgs {
            bandwidth: Some("fast".to_string()),
            ..Default::default()
        };
        let err = transport.apply(&mut TransportSettings::default()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }

    #[test]
    fn test_serve_flags_override_config() {
        let args = parse(&[
            "mediafetch",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--api-key",
            "secret123",
            "--rate-limit",
            "2",
            "--rate-period",
            "3s",
            "--rate-backend",
            "fixed",
        ]);
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };

        let mut config = ServiceConfig::default();
        serve.apply(&mut config).unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.api_key.as_deref(), Some("secret123"));
        assert_eq!(config.rate_limits.limit, 2);
        assert_eq!(config.rate_limits.period, Duration::from_secs(3));
        assert_eq!(config.rate_backend, RateBackend::Fixed);
    }

    #[test]
    fn test_collect_urls_merges_input_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "first https://cdn.example.com/a.mp4, then https://cdn.example.com/b.mp4.\nagain https://cdn.example.com/a.mp4"
        )
        .unwrap();

        let args = GetArgs {
            urls: vec!["https://cdn.example.com/b.mp4".to_string()],
            input: Some(file.path().to_path_buf()),
            format: "best".to_string(),
            output: PathBuf::from("."),
            concurrency: 1,
            no_progress: true,
            transport: TransportArgs::default(),
        };
        assert_eq!(
            args.collect_urls().unwrap(),
            vec!["https://cdn.example.com/b.mp4", "https://cdn.example.com/a.mp4"]
        );
    }

    #[test]
    fn test_collect_urls_requires_one() {
        let args = GetArgs {
            urls: Vec::new(),
            input: None,
            format: "best".to_string(),
            output: PathBuf::from("."),
            concurrency: 1,
            no_progress: true,
            transport: TransportArgs::default(),
        };
        assert!(args.collect_urls().is_err());
    }
}
