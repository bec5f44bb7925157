//! Output formatting and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::media::MediaInfo;
use crate::core::outcome::TransportReport;
use crate::core::progress::{format_bytes, format_bytes_per_second, format_duration, Phase, ProgressEvent, ProgressSink};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";

/// Terminal output for the `get` and `info` commands
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    bars: MultiProgress,
    show_progress: bool,
}

impl OutputFormatter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            bars: MultiProgress::new(),
            show_progress: verbosity != VerbosityLevel::Quiet,
        }
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Progress bar for one download, fed by the returned sink
    pub fn progress_sink(&self, label: &str) -> Option<(ProgressBar, ProgressSink)> {
        if !self.show_progress {
            return None;
        }

        let bar = self.bars.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(label.to_string());
        bar.set_message("Fetching metadata...");
        bar.enable_steady_tick(Duration::from_millis(120));

        let target = bar.clone();
        let sink: ProgressSink = Arc::new(move |event: ProgressEvent| update_bar(&target, &event));
        Some((bar, sink))
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.println(format!("ℹ️  {}", message));
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("⚠️  {}", message.yellow());
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("❌ {}", message.red());
    }

    /// Print media summary
    pub fn print_media_info(&self, info: &MediaInfo) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!("📹 {}", info.title.bold());
        if let Some(uploader) = &info.uploader {
            println!("👤 {}", uploader);
        }
        if let Some(duration) = info.duration {
            println!("⏱️  {}", format_duration(Duration::from_secs_f64(duration.max(0.0))));
        }
        println!("📊 {} formats available", info.formats.len());
        if self.verbosity == VerbosityLevel::Verbose {
            for format in &info.formats {
                let size = format
                    .filesize
                    .map(|s| format!(" ({})", format_bytes(s)))
                    .unwrap_or_default();
                println!(
                    "  📋 {} | {} | {}{}",
                    format.format_id,
                    format.ext,
                    format.resolution().unwrap_or_else(|| "audio only".to_string()),
                    size
                );
            }
        }
        println!();
    }

    /// Print one finished download
    pub fn print_download_complete(&self, path: &Path, size: u64, transport: &TransportReport, elapsed: Duration) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        self.println(format!(
            "✅ {} ({}, {}) via {}",
            path.display().to_string().green(),
            format_bytes(size),
            format_duration(elapsed),
            transport.strategy
        ));
        if transport.trust.is_degraded() {
            self.println(format!(
                "⚠️  {}",
                format!("Fetched with {} TLS", transport.trust).yellow()
            ));
        }
    }

    /// Print totals of a multi-URL run
    pub fn print_summary(&self, succeeded: usize, failed: usize, elapsed: Duration) {
        if self.verbosity == VerbosityLevel::Quiet && failed == 0 {
            return;
        }

        let line = format!(
            "Downloaded {} of {} in {}",
            succeeded,
            succeeded + failed,
            format_duration(elapsed)
        );
        if failed == 0 {
            self.println(format!("✅ {}", line.green()));
        } else {
            self.println(format!("⚠️  {} ({} failed)", line.yellow(), failed));
        }
    }

    /// Print above any active bars
    fn println(&self, line: String) {
        if self.bars.println(&line).is_err() {
            println!("{}", line);
        }
    }
}

fn update_bar(bar: &ProgressBar, event: &ProgressEvent) {
    match event.phase {
        Phase::FetchingMetadata => bar.set_message("Fetching metadata..."),
        Phase::Downloading => {
            if let Some(total) = event.bytes_total {
                bar.set_length(total);
            }
            bar.set_position(event.bytes_done);
            match event.rate {
                Some(rate) => bar.set_message(format_bytes_per_second(rate)),
                None => bar.set_message("Downloading..."),
            }
        }
        Phase::Postprocessing => bar.set_message("Post-processing..."),
    }
}
