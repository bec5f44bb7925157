//! # mediafetch
//!
//! Video download service: metadata lookup, deterministic format selection,
//! downloads through an ordered chain of transports under one retry
//! controller, batch packaging into zip archives and keyed rate limiting.
//!
//! ## Features
//!
//! - Quality labels (`best`, `1080p` .. `360p`, `audio`, `audio-mp3`) mapped to format expressions
//! - Extractor, accelerated, direct HTTP and command line transports with opt-in degraded TLS
//! - Scratch storage owned by the returned artifact and removed on every exit path
//! - Sliding and fixed window rate limiting behind one trait
//! - axum HTTP service and a command line downloader
//!
//! ## Example
//!
//! ```rust,no_run
//! use mediafetch::core::{MediaRequest, Orchestrator};
//! use mediafetch::download::{RetryExecutor, Toolbox, TransportSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::from_toolbox(
//!         TransportSettings::default(),
//!         &Toolbox::discover(),
//!         RetryExecutor::new(),
//!         std::env::temp_dir(),
//!     );
//!
//!     let request = MediaRequest::parse("VIDEO_URL", Some("720p"))?;
//!     let (artifact, transport) = orchestrator
//!         .download(&request, None)
//!         .await
//!         .into_result()
//!         .map_err(|(_, message)| message)?;
//!     println!("{} via {}", artifact.file_name(), transport.strategy);
//!     artifact.persist_to(std::path::Path::new("./clip.mp4")).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod ratelimit;
pub mod server;
pub mod utils;

// Re-export main types
pub use config::ServiceConfig;
pub use core::{
    Artifact, BatchCoordinator, BatchEntry, BatchResult, DownloadOutcome, FormatSelection, MediaInfo, MediaRequest,
    Orchestrator,
};
pub use error::{ErrorKind, MediaError};
pub use ratelimit::{Admission, AdmissionGate, RateBackend, RateLimits};

/// Result type alias for mediafetch operations
pub type Result<T> = std::result::Result<T, MediaError>;
