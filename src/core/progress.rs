//! Progress tracking for downloads

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Stage of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FetchingMetadata,
    Downloading,
    Postprocessing,
}

/// Progress notification delivered to a [`ProgressSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    /// Bytes per second
    pub rate: Option<f64>,
}

impl ProgressEvent {
    /// Event without byte counts, for phase changes
    pub fn phase(phase: Phase) -> Self {
        Self {
            phase,
            bytes_done: 0,
            bytes_total: None,
            rate: None,
        }
    }

    /// Download progress as a percentage (0.0 to 100.0)
    pub fn percent(&self) -> Option<f64> {
        self.bytes_total
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_done as f64 / total as f64 * 100.0).min(100.0))
    }

    /// Estimated time remaining
    pub fn eta(&self) -> Option<Duration> {
        let total = self.bytes_total?;
        let rate = self.rate.filter(|r| *r > 0.0)?;
        let remaining = total.saturating_sub(self.bytes_done);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

/// Observer of progress events
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Span the transfer rate is measured over
const RATE_WINDOW: Duration = Duration::from_secs(3);

/// Turns byte counts from a transfer into [`ProgressEvent`]s
pub struct ProgressTracker {
    sink: Option<ProgressSink>,
    total: Option<u64>,
    done: u64,
    /// `(when, bytes_done)` over the trailing [`RATE_WINDOW`]
    samples: VecDeque<(Instant, u64)>,
    /// Rate reported by the transfer itself
    reported_rate: Option<f64>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(sink: Option<ProgressSink>, total: Option<u64>) -> Self {
        Self {
            sink,
            total: total.filter(|t| *t > 0),
            done: 0,
            samples: VecDeque::from([(Instant::now(), 0)]),
            reported_rate: None,
        }
    }

    /// Record `bytes` more transferred and notify the sink
    pub fn advance(&mut self, bytes: u64) {
        self.done += bytes;
        self.record();
        self.emit();
    }

    /// Set the absolute transferred count and notify the sink
    pub fn update(&mut self, bytes_done: u64, bytes_total: Option<u64>) {
        self.update_with_rate(bytes_done, bytes_total, None);
    }

    /// Like [`update`](Self::update), with the rate measured by the transfer itself
    pub fn update_with_rate(&mut self, bytes_done: u64, bytes_total: Option<u64>, rate: Option<f64>) {
        if bytes_done < self.done {
            // Next stream of a multi-stream download
            self.samples.clear();
        }
        self.done = bytes_done;
        if bytes_total.is_some() {
            self.total = bytes_total;
        }
        self.reported_rate = rate.filter(|r| r.is_finite() && *r >= 0.0);
        self.record();
        self.emit();
    }

    pub fn bytes_done(&self) -> u64 {
        self.done
    }

    /// Current event without notifying anyone
    pub fn snapshot(&self) -> ProgressEvent {
        ProgressEvent {
            phase: Phase::Downloading,
            bytes_done: self.done,
            bytes_total: self.total,
            rate: self.reported_rate.or_else(|| self.trailing_rate()),
        }
    }

    fn record(&mut self) {
        let now = Instant::now();
        self.samples.push_back((now, self.done));
        while self.samples.len() > 1
            && self
                .samples
                .front()
                .is_some_and(|(at, _)| now.duration_since(*at) > RATE_WINDOW)
        {
            self.samples.pop_front();
        }
    }

    fn trailing_rate(&self) -> Option<f64> {
        let (first_at, first_done) = self.samples.front()?;
        let (last_at, last_done) = self.samples.back()?;
        let elapsed = last_at.duration_since(*first_at);
        if elapsed.is_zero() {
            return None;
        }
        Some(last_done.saturating_sub(*first_done) as f64 / elapsed.as_secs_f64())
    }

    fn emit(&self) {
        if let Some(sink) = &self.sink {
            sink(self.snapshot());
        }
    }
}

/// Notify a sink, if there is one
pub fn notify(sink: Option<&ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = sink {
        sink(event);
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// Format bytes per second as human-readable string
pub fn format_bytes_per_second(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second as u64))
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
