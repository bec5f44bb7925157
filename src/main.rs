//! Main entry point for the mediafetch CLI

use anyhow::Context;
use clap::Parser;
use futures::stream::{self, StreamExt};
use mediafetch::cli::{Args, Command, GetArgs, InfoArgs, OutputFormatter, ServeArgs, VerbosityLevel};
use mediafetch::core::{MediaRequest, Orchestrator};
use mediafetch::download::{RetryExecutor, Toolbox, TransportSettings};
use mediafetch::utils::filename::generate_unique_filename;
use mediafetch::ServiceConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();
    let verbosity = args.verbosity_level();
    init_logging(&args)?;
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    match args.command {
        Command::Serve(serve) => run_serve(serve).await,
        Command::Get(get) => run_get(get, OutputFormatter::new(verbosity)).await,
        Command::Info(info) => run_info(info, OutputFormatter::new(verbosity)).await,
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = ServiceConfig::from_env().context("Invalid service configuration")?;
    args.apply(&mut config).context("Invalid service options")?;
    if config.transport.insecure_tls_fallback {
        warn!("Insecure TLS fallback enabled; degraded fetches are flagged in X-Transport-Trust");
    }

    mediafetch::server::serve(config).await?;
    Ok(())
}

fn orchestrator(settings: TransportSettings) -> Orchestrator {
    Orchestrator::from_toolbox(settings, &Toolbox::discover(), RetryExecutor::new(), std::env::temp_dir())
}

async fn run_get(args: GetArgs, formatter: OutputFormatter) -> anyhow::Result<()> {
    let urls = args.collect_urls()?;
    let mut settings = TransportSettings::default();
    args.transport.apply(&mut settings)?;
    if settings.insecure_tls_fallback {
        formatter.warning("Insecure TLS fallback enabled");
    }

    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let formatter = Arc::new(if args.no_progress {
        formatter.without_progress()
    } else {
        formatter
    });
    let orchestrator = Arc::new(orchestrator(settings));
    let numbered = urls.len() > 1;
    formatter.info(&format!(
        "Downloading {} URL(s) into {}",
        urls.len(),
        args.output.display()
    ));
    info!("Starting {} downloads with quality {}", urls.len(), args.format);

    let start_time = Instant::now();
    let results: Vec<bool> = stream::iter(urls.into_iter().enumerate())
        .map(|(position, url)| {
            let orchestrator = orchestrator.clone();
            let formatter = formatter.clone();
            let format = args.format.clone();
            let output = args.output.clone();
            async move {
                let index = numbered.then_some(position + 1);
                fetch_one(&orchestrator, &formatter, &url, &format, index, &output).await
            }
        })
        .buffered(args.concurrency.max(1))
        .collect()
        .await;

    let succeeded = results.iter().filter(|ok| **ok).count();
    let failed = results.len() - succeeded;
    formatter.print_summary(succeeded, failed, start_time.elapsed());

    if failed > 0 {
        anyhow::bail!("{} of {} downloads failed", failed, results.len());
    }
    Ok(())
}

/// Download one URL into `output`; failures are reported, not returned
async fn fetch_one(
    orchestrator: &Orchestrator,
    formatter: &OutputFormatter,
    url: &str,
    format: &str,
    index: Option<usize>,
    output: &Path,
) -> bool {
    let request = match MediaRequest::parse(url, Some(format)) {
        Ok(request) => request,
        Err(e) => {
            formatter.error(&format!("{}: {}", url, e.sanitized_message()));
            return false;
        }
    };

    let label = index.map_or_else(|| "⬇".to_string(), |i| format!("{:03}", i));
    let progress = formatter.progress_sink(&label);
    let started = Instant::now();
    let outcome = orchestrator
        .download_indexed(&request, index, progress.as_ref().map(|(_, sink)| sink.clone()))
        .await;
    if let Some((bar, _)) = &progress {
        bar.finish_and_clear();
    }

    let (artifact, transport) = match outcome.into_result() {
        Ok(done) => done,
        Err((kind, message)) => {
            formatter.error(&format!("{}: {} [{}]", url, message, kind));
            return false;
        }
    };

    let size = artifact.byte_size();
    let saved = match generate_unique_filename(output, &artifact.file_name()) {
        Ok(name) => artifact.persist_to(&output.join(name)).await,
        Err(e) => Err(e.into()),
    };
    match saved {
        Ok(path) => {
            formatter.print_download_complete(&path, size, &transport, started.elapsed());
            true
        }
        Err(e) => {
            formatter.error(&format!("{}: {}", url, e.sanitized_message()));
            false
        }
    }
}

async fn run_info(args: InfoArgs, formatter: OutputFormatter) -> anyhow::Result<()> {
    let mut settings = TransportSettings::default();
    args.transport.apply(&mut settings)?;
    let request = MediaRequest::parse(&args.url, None)?;

    let info = orchestrator(settings).info(&request).await?;
    if args.summary {
        formatter.print_media_info(&info);
    } else {
        println!("{}", serde_json::to_string_pretty(info.as_ref())?);
    }
    Ok(())
}

/// Initialize logging system
fn init_logging(args: &Args) -> anyhow::Result<()> {
    // The service logs lifecycle events; the downloader only logs problems
    let default_level = match (&args.command, args.verbosity_level()) {
        (_, VerbosityLevel::Verbose) => "debug",
        (_, VerbosityLevel::Quiet) => "error",
        (Command::Serve(_), VerbosityLevel::Normal) => "info",
        (_, VerbosityLevel::Normal) => "warn",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
