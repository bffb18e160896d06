//! Progress tracking for a retrieval run.
//!
//! Progress is counted in pages handed to batches, with the number of
//! records accumulated so far. Updates are emitted every
//! `min_percentage_step` percent or, on long runs, at a fixed interval.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const MIN_RUN_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Progress tracking state for one retrieval.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Pages processed so far (fetched, failed or skipped).
    pub pages_processed: u32,
    /// Total pages reported by page 0.
    pub total_pages: u32,
    /// Records accumulated so far.
    pub records: u64,
    /// Timestamp when the retrieval started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between progress updates.
    pub update_interval: Duration,
    /// Current rate (records per second).
    pub current_rate: f64,
    /// Last reported completion percentage (0-100).
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Create a new progress state with default cadence.
    pub fn new(total_pages: u32) -> Self {
        let now = Instant::now();
        Self {
            pages_processed: 0,
            total_pages,
            records: 0,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Account for `pages` more pages that produced `records` records.
    pub fn update(&mut self, pages: u32, records: u64) {
        self.pages_processed = self
            .pages_processed
            .saturating_add(pages)
            .min(self.total_pages);
        self.records = self.records.saturating_add(records);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.records as f64 / elapsed;
        }
    }

    /// Whether a progress update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.pages_processed == 0 {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.start_time.elapsed() >= MIN_RUN_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Completion percentage (0-100) by pages.
    pub fn percentage(&self) -> f64 {
        if self.total_pages == 0 {
            return 100.0;
        }
        (self.pages_processed as f64 / self.total_pages as f64) * 100.0
    }

    /// Estimate remaining time from the page rate so far.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let remaining = self.total_pages.saturating_sub(self.pages_processed);
        if remaining == 0 || self.pages_processed == 0 {
            return None;
        }
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let per_page = elapsed / self.pages_processed as f64;
        Some(Duration::from_secs_f64(per_page * remaining as f64))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Pages {}/{} ({:.1}%) | {} records",
            self.pages_processed,
            self.total_pages,
            self.percentage(),
            self.records
        )];

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.0} records/sec", self.current_rate));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
